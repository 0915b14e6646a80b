// src/errors.rs

//! Typed errors raised by the command core.
//!
//! The core never terminates the host process itself. Every fatal condition
//! is returned as a [`CommandError`] and the binary decides the exit status
//! through [`CommandError::exit_code`].

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("PATH env variable was not found!")]
    MissingSearchPath,

    #[error("Could not find \"{0}\" in PATH")]
    NotFound(String),

    #[error("Process \"{command}\" has exited with code {code}")]
    Failed { command: String, code: i32 },

    #[error("Failed to spawn \"{identifier}\": {source}")]
    Spawn {
        identifier: String,
        #[source]
        source: std::io::Error,
    },

    #[error("\"{identifier}\" was declared {declared}; call it with the matching variant")]
    VariantMismatch {
        identifier: String,
        declared: &'static str,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CommandError {
    /// Status the host program should exit with for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CommandError::Failed { code, .. } => *code,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, CommandError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_keeps_process_code() {
        let err = CommandError::Failed {
            command: "false".to_string(),
            code: 7,
        };
        assert_eq!(err.exit_code(), 7);
        assert_eq!(err.to_string(), "Process \"false\" has exited with code 7");
    }

    #[test]
    fn configuration_errors_exit_with_one() {
        assert_eq!(CommandError::MissingSearchPath.exit_code(), 1);
        let err = CommandError::NotFound("nope".to_string());
        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.to_string(), "Could not find \"nope\" in PATH");
    }
}
