use anyhow::{Context, Result};
use regex::{Captures, Regex};
use std::io::{self, BufRead};
use std::sync::LazyLock;

use crate::command::{Console, StdinSource};

static VAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("static pattern")
});

/// Replaces `${VAR}` and `$VAR` with values from the environment table.
/// Unset variables expand to nothing.
pub fn expand_vars(template: &str) -> String {
    VAR_RE
        .replace_all(template, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            crate::env::get(name).unwrap_or_default()
        })
        .into_owned()
}

/// Split a step line into words without involving a shell.
pub fn split_words(line: &str) -> Result<Vec<String>> {
    shell_words::split(line).with_context(|| format!("Failed to parse step: {}", line))
}

/// Producer that asks on the console and reads one line from the host's
/// stdin. End of input or an empty line ends the session.
pub fn prompt_producer(prompt: String, console: Console) -> StdinSource {
    StdinSource::producer(move || {
        console.write(format!("{} ", prompt).as_bytes()).ok();
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                let line = line.trim_end_matches(['\n', '\r']);
                if line.is_empty() {
                    None
                } else {
                    Some(format!("{}\n", line))
                }
            }
        }
    })
}
