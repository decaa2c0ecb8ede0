// RPC method names served on the daemon control socket.

pub const RPC_PING: &str = "rpc.ping";
pub const DAEMON_STATUS: &str = "daemon.status";
pub const DAEMON_RELOAD: &str = "daemon.reload";
pub const DAEMON_SHUTDOWN: &str = "daemon.shutdown";

/// All methods the daemon currently dispatches.
pub const IMPLEMENTED_METHODS: &[&str] = &[RPC_PING, DAEMON_STATUS, DAEMON_RELOAD, DAEMON_SHUTDOWN];
