pub mod cli;
pub mod command;
pub mod config;
pub mod env;
pub mod errors;
pub mod handlers;
pub mod runner;
pub mod utils;

pub use command::{Command, CommandConfig, Mode, ProcessHandle, StdinSource, declare_command};
pub use errors::CommandError;
