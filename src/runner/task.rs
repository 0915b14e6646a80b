use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum Target {
    /// Single step line
    Single(String),
    /// List of sequential steps
    List(Vec<Step>),
    /// Full form with a description for `--list`
    Full {
        description: Option<String>,
        #[serde(default)]
        steps: Vec<Step>,
    },
}

impl Target {
    pub fn description(&self) -> Option<&str> {
        match self {
            Target::Full { description, .. } => description.as_deref(),
            _ => None,
        }
    }

    pub fn steps(&self) -> Vec<Step> {
        match self {
            Target::Single(line) => vec![Step::Line(line.clone())],
            Target::List(steps) => steps.clone(),
            Target::Full { steps, .. } => steps.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum Step {
    /// `"<command> args..."`, split without a shell
    Line(String),
    /// Explicit argument list, no splitting
    Call {
        run: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Run targets from the build file of a sub-directory
    Enter {
        enter: PathBuf,
        #[serde(default)]
        targets: Vec<String>,
    },
}
