// Control socket: JSON-RPC 2.0 over a Unix domain socket.
//
// Framing is newline-delimited JSON, matching the CLI client. Methods:
// `rpc.ping`, `daemon.status`, `daemon.reload`, `daemon.shutdown`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use snapkeep_common::protocol::jsonrpc::{
    is_supported_protocol_version, Request, RequestId, Response, RpcError, INTERNAL_ERROR,
    INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
};
use snapkeep_common::protocol::rpc_methods::{
    DAEMON_RELOAD, DAEMON_SHUTDOWN, DAEMON_STATUS, RPC_PING,
};
use snapkeep_common::types::{ReloadReport, StatusReport};
use tokio::io::{self, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::Registry;
use crate::worker::WorkerManager;

#[derive(Clone)]
pub struct ControlState {
    manager: Arc<WorkerManager>,
    registry_path: PathBuf,
    shutdown_notifier: Option<broadcast::Sender<()>>,
}

impl ControlState {
    pub fn new(manager: Arc<WorkerManager>, registry_path: PathBuf) -> Self {
        Self { manager, registry_path, shutdown_notifier: None }
    }

    pub fn with_shutdown_notifier(mut self, notifier: broadcast::Sender<()>) -> Self {
        self.shutdown_notifier = Some(notifier);
        self
    }

    pub fn manager(&self) -> &Arc<WorkerManager> {
        &self.manager
    }

    /// Re-read the registry and restart workers from it.
    pub async fn reload(&self) -> Result<usize> {
        let registry = Registry::load_from(&self.registry_path).with_context(|| {
            format!("failed to load registry `{}`", self.registry_path.display())
        })?;
        let count = self.manager.reload_workers(&registry.repositories()).await;
        info!(workers = count, "workers reloaded from registry");
        Ok(count)
    }
}

/// Serve until a shutdown signal arrives on `shutdown_rx`.
pub async fn serve_unix_until_shutdown(
    listener: UnixListener,
    state: ControlState,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("control socket shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, _) = accepted.context("failed to accept control connection")?;
                let connection_state = state.clone();
                tokio::spawn(async move {
                    if let Err(error) = serve_connection(stream, connection_state).await {
                        warn!(?error, "control connection failed");
                    }
                });
            }
        }
    }
}

/// Handle a single stream. Each request line yields one response line.
pub async fn serve_connection<IO>(stream: IO, state: ControlState) -> Result<()>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = io::split(stream);
    let mut reader = BufReader::new(read_half);

    loop {
        let mut request_line = Vec::new();
        let bytes_read = reader
            .read_until(b'\n', &mut request_line)
            .await
            .context("failed to read json-rpc request")?;

        if bytes_read == 0 {
            return Ok(());
        }

        trim_line_endings(&mut request_line);
        if request_line.iter().all(|byte| byte.is_ascii_whitespace()) {
            continue;
        }

        let response = handle_raw_request(&request_line, &state).await;
        let mut encoded =
            serde_json::to_vec(&response).context("failed to serialize json-rpc response")?;
        encoded.push(b'\n');

        write_half.write_all(&encoded).await.context("failed to write json-rpc response")?;
        write_half.flush().await.context("failed to flush json-rpc response")?;
    }
}

fn trim_line_endings(line: &mut Vec<u8>) {
    while matches!(line.last(), Some(b'\n' | b'\r')) {
        line.pop();
    }
}

pub async fn handle_raw_request(raw: &[u8], state: &ControlState) -> Response {
    let request = match serde_json::from_slice::<Request>(raw) {
        Ok(request) => request,
        Err(error) => {
            return Response::error(
                RequestId::Null,
                RpcError {
                    code: PARSE_ERROR,
                    message: "Parse error".to_string(),
                    data: Some(json!({ "reason": error.to_string() })),
                },
            );
        }
    };

    if request.jsonrpc != "2.0" {
        return Response::error(request.id, RpcError::new(INVALID_REQUEST, "Invalid Request"));
    }

    if let Some(version) = request.protocol_version.as_deref() {
        if !is_supported_protocol_version(version) {
            return Response::error(
                request.id,
                RpcError {
                    code: INVALID_REQUEST,
                    message: format!("unsupported protocol version `{version}`"),
                    data: None,
                },
            );
        }
    }

    dispatch_request(request, state).await
}

pub async fn dispatch_request(request: Request, state: &ControlState) -> Response {
    match request.method.as_str() {
        RPC_PING => Response::success(request.id, json!({ "ok": true })),
        DAEMON_STATUS => {
            let report = StatusReport { workers: state.manager.worker_statuses().await };
            to_response(request.id, &report)
        }
        DAEMON_RELOAD => match state.reload().await {
            Ok(workers) => to_response(request.id, &ReloadReport { workers }),
            Err(error) => {
                warn!(?error, "reload request failed");
                Response::error(request.id, RpcError::new(INTERNAL_ERROR, format!("{error:#}")))
            }
        },
        DAEMON_SHUTDOWN => {
            if let Some(notifier) = &state.shutdown_notifier {
                let _ = notifier.send(());
            }
            Response::success(request.id, json!({ "ok": true }))
        }
        other => Response::error(
            request.id,
            RpcError::new(METHOD_NOT_FOUND, format!("Method not found: {other}")),
        ),
    }
}

fn to_response<T: serde::Serialize>(id: RequestId, value: &T) -> Response {
    match serde_json::to_value(value) {
        Ok(result) => Response::success(id, result),
        Err(error) => Response::error(id, RpcError::new(INTERNAL_ERROR, error.to_string())),
    }
}
