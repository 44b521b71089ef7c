//! Command execution on behalf of the agent
//!
//! Independent of the conversation: results are handed back to the caller,
//! who decides whether to feed them into the history.

pub mod command_line;
pub mod executor;

pub use command_line::{split_command_line, CommandSpec};
pub use executor::{
    CommandExecutor, CommandResult, ExecutionError, ExecutorConfig, OutputChunk, ShellConfig,
};
