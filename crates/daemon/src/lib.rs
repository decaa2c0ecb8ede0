// snapkeep-daemon library: backup core, workers and the control socket.
// The `snapkeepd` binary and the `snapkeep` CLI both build on it.

pub mod backup;
pub mod config;
pub mod control;
pub mod git;
pub mod runtime;
pub mod scan;
pub mod security;
pub mod startup;
pub mod watcher;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;
