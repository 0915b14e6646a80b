//! Exit policy applied after a process terminates.

use log::{debug, warn};

use crate::errors::{CommandError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitPolicy {
    pub die_on_failure: bool,
}

impl ExitPolicy {
    pub fn new(die_on_failure: bool) -> Self {
        Self { die_on_failure }
    }

    /// Decide what an exit code means for the host program.
    ///
    /// `None` (still running, or killed by a signal) never triggers.
    pub fn evaluate(&self, identifier: &str, args: &[String], code: Option<i32>) -> Result<()> {
        let code = match code {
            None | Some(0) => return Ok(()),
            Some(code) => code,
        };
        let command = describe(identifier, args);

        if self.die_on_failure {
            debug!("{} exited with {}, failing", command, code);
            return Err(CommandError::Failed { command, code });
        }

        warn!("Process \"{}\" has exited with code {} (ignored)", command, code);
        Ok(())
    }
}

/// `exec arg1 arg2`, as shown in diagnostics.
pub fn describe(identifier: &str, args: &[String]) -> String {
    if args.is_empty() {
        identifier.to_string()
    } else {
        format!("{} {}", identifier, args.join(" "))
    }
}
