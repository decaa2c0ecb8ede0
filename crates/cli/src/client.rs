// JSON-RPC client for the daemon control socket.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use snapkeep_common::protocol::jsonrpc::{Request, RequestId, Response};
use snapkeep_daemon::config::global_dir;
use snapkeep_daemon::startup::DaemonPaths;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::timeout;

const DEFAULT_TIMEOUT_SECS: u64 = 3;

/// Nothing is listening on the control socket.
#[derive(Debug)]
pub struct DaemonUnavailable {
    socket_path: PathBuf,
    source: io::Error,
}

impl fmt::Display for DaemonUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "daemon is not running (socket `{}`)", self.socket_path.display())
    }
}

impl std::error::Error for DaemonUnavailable {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// An error object returned by the daemon.
#[derive(Debug)]
pub struct RemoteError {
    pub code: i32,
    pub message: String,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "daemon json-rpc error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for RemoteError {}

#[derive(Debug)]
pub struct DaemonClient {
    socket_path: PathBuf,
    timeout: Duration,
    next_request_id: AtomicI64,
}

impl DaemonClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            next_request_id: AtomicI64::new(1),
        }
    }

    /// Client for the socket under the global config directory.
    pub fn from_env() -> Result<Self> {
        let base_dir = global_dir().context("could not determine config directory")?;
        Ok(Self::new(DaemonPaths::under(base_dir).socket_path))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn call<R>(&self, method: &str, params: Option<Value>) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);

        match self.call_once(id, method, params.clone()).await {
            Ok(response) => Ok(response),
            // Neither a missing daemon nor an error reply changes on retry.
            Err(error)
                if error.downcast_ref::<DaemonUnavailable>().is_some()
                    || error.downcast_ref::<RemoteError>().is_some() =>
            {
                Err(error)
            }
            Err(first_error) => {
                // Retry once for transient socket drops / daemon restarts.
                self.call_once(id, method, params).await.map_err(|second_error| {
                    second_error.context(format!(
                        "json-rpc call failed after retry; first error: {first_error:#}"
                    ))
                })
            }
        }
    }

    async fn call_once<R>(&self, id: i64, method: &str, params: Option<Value>) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let request = Request::new(method, params, RequestId::Number(id));
        let mut payload =
            serde_json::to_vec(&request).context("failed to serialize json-rpc request")?;
        payload.push(b'\n');

        let stream = timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .context("timed out connecting to daemon socket")?
            .map_err(|err| {
                if is_daemon_unavailable_kind(err.kind()) {
                    let socket_path = self.socket_path.clone();
                    anyhow!(DaemonUnavailable { socket_path, source: err })
                } else {
                    anyhow!(err).context(format!(
                        "failed to connect to daemon socket `{}`",
                        self.socket_path.display()
                    ))
                }
            })?;

        let (read_half, mut write_half) = stream.into_split();
        timeout(self.timeout, write_half.write_all(&payload))
            .await
            .context("timed out writing json-rpc request")?
            .context("failed writing json-rpc request to daemon socket")?;

        let mut reader = BufReader::new(read_half);
        let mut response_line = Vec::new();
        timeout(self.timeout, reader.read_until(b'\n', &mut response_line))
            .await
            .context("timed out waiting for json-rpc response")?
            .context("failed reading json-rpc response from daemon socket")?;

        if response_line.is_empty() {
            anyhow::bail!("daemon returned an empty json-rpc response");
        }

        let response: Response = serde_json::from_slice(&response_line)
            .context("failed to decode daemon json-rpc response")?;

        if let Some(error) = response.error {
            return Err(anyhow!(RemoteError { code: error.code, message: error.message }));
        }

        let result = response.result.context("daemon json-rpc response missing `result` field")?;
        serde_json::from_value(result).context("unexpected json-rpc result shape")
    }
}

fn is_daemon_unavailable_kind(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused)
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use serde_json::json;
    use snapkeep_common::protocol::jsonrpc::Request;
    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::UnixListener;

    use super::{DaemonClient, DaemonUnavailable, RemoteError};

    fn bind(path: &PathBuf) -> Option<UnixListener> {
        match UnixListener::bind(path) {
            Ok(listener) => Some(listener),
            Err(error) if error.kind() == io::ErrorKind::PermissionDenied => {
                eprintln!("skipping unix socket test: bind is not permitted in this environment");
                None
            }
            Err(error) => panic!("listener should bind: {error}"),
        }
    }

    #[tokio::test]
    async fn calls_json_rpc_over_unix_socket() {
        let tmp = TempDir::new().unwrap();
        let socket_path = tmp.path().join("daemon.sock");
        let Some(listener) = bind(&socket_path) else { return };

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept should succeed");
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            reader.read_line(&mut line).await.expect("request should be readable");
            let request: Request =
                serde_json::from_str(line.trim()).expect("request should decode");
            assert_eq!(request.method, "daemon.status");
            assert!(request.protocol_version.is_some());

            let response = json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": { "workers": [] }
            })
            .to_string()
                + "\n";
            write_half.write_all(response.as_bytes()).await.expect("response write should succeed");
        });

        let client = DaemonClient::new(socket_path);
        let result: serde_json::Value =
            client.call("daemon.status", None).await.expect("json-rpc call should succeed");
        assert_eq!(result["workers"], json!([]));

        server.await.expect("server should finish");
    }

    #[tokio::test]
    async fn retries_once_when_first_connection_drops() {
        let tmp = TempDir::new().unwrap();
        let socket_path = tmp.path().join("daemon.sock");
        let Some(listener) = bind(&socket_path) else { return };
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_for_server = Arc::clone(&attempts);

        let server = tokio::spawn(async move {
            for _ in 0..2 {
                let (stream, _) = listener.accept().await.expect("accept should succeed");
                let attempt = attempts_for_server.fetch_add(1, Ordering::SeqCst);

                if attempt == 0 {
                    drop(stream);
                    continue;
                }

                let (read_half, mut write_half) = stream.into_split();
                let mut reader = BufReader::new(read_half);
                let mut request = Vec::new();
                reader.read_until(b'\n', &mut request).await.expect("request should be readable");

                let response = json!({ "jsonrpc": "2.0", "id": 1, "result": { "ok": true } })
                    .to_string()
                    + "\n";
                write_half
                    .write_all(response.as_bytes())
                    .await
                    .expect("response write should succeed");
                return;
            }
        });

        let client = DaemonClient::new(socket_path);
        let result: serde_json::Value =
            client.call("rpc.ping", None).await.expect("json-rpc call should succeed after retry");
        assert_eq!(result["ok"], true);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        server.await.expect("server should finish");
    }

    #[tokio::test]
    async fn surfaces_daemon_error_objects() {
        let tmp = TempDir::new().unwrap();
        let socket_path = tmp.path().join("daemon.sock");
        let Some(listener) = bind(&socket_path) else { return };

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept should succeed");
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut request = Vec::new();
            reader.read_until(b'\n', &mut request).await.expect("request should be readable");
            let response = json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32601, "message": "Method not found" }
            })
            .to_string()
                + "\n";
            write_half.write_all(response.as_bytes()).await.unwrap();
        });

        let client = DaemonClient::new(socket_path);
        let error = client
            .call::<serde_json::Value>("daemon.frobnicate", None)
            .await
            .expect_err("error response should fail the call");
        let remote = error.downcast_ref::<RemoteError>().expect("remote error in chain");
        assert_eq!(remote.code, -32601);

        server.await.expect("server should finish");
    }

    #[tokio::test]
    async fn tags_missing_socket_as_daemon_unavailable() {
        let tmp = TempDir::new().unwrap();
        let client = DaemonClient::new(tmp.path().join("missing.sock"));
        let error = client
            .call::<serde_json::Value>("rpc.ping", None)
            .await
            .expect_err("missing socket should fail");

        assert!(error.downcast_ref::<DaemonUnavailable>().is_some());
    }
}
