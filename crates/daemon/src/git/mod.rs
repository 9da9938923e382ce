// Git plumbing: subprocess execution, mirror commands, remote URL handling.

pub mod cli;
pub mod executor;
pub mod remote;

#[cfg(test)]
pub(crate) mod testing;

pub use cli::{GitCli, GitCommandOutput, GitError};
pub use executor::{CommandExecutor, CommandResult, ProcessCommandExecutor};
