// Git access: the snapshot port trait and its `git` binary adapter.

pub mod cli;
pub mod ports;

pub use cli::{CommandExecutor, CommandResult, GitCli, GitCliFactory, ProcessCommandExecutor};
pub use ports::{GitError, GitResult, PortsFactory, SnapshotPorts};
