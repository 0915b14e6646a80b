pub mod env;
pub mod list;
pub mod task;
