//! Provider spawned as a child process, framed as one JSON message per line.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{Transport, TransportKind};
use crate::endpoint::StdioEndpoint;
use crate::error::{SessionError, SessionResult};
use crate::protocol::{
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RpcError, codes, methods,
};

/// Time a child gets to exit after its stdin is closed before it is killed.
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// Stdio channel to a spawned provider.
///
/// The child is spawned with `kill_on_drop`, so dropping the transport
/// without calling [`Transport::close`] still reaps the process.
#[derive(Debug)]
pub struct StdioTransport {
    endpoint: String,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl StdioTransport {
    /// Spawns the provider process.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TransportUnavailable`] when the process cannot
    /// be started or its pipes cannot be captured.
    pub fn spawn(config: &StdioEndpoint, identifier: impl Into<String>) -> SessionResult<Self> {
        let endpoint = identifier.into();

        let mut command = Command::new(config.command());
        command
            .args(config.arguments())
            .envs(config.environment())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = config.working_dir() {
            command.current_dir(cwd);
        }

        let mut child = command
            .spawn()
            .map_err(|err| SessionError::unavailable(&endpoint, format!("spawn failed: {err}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::unavailable(&endpoint, "stdin was not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::unavailable(&endpoint, "stdout was not captured"))?;

        if let Some(stderr) = child.stderr.take() {
            drain_stderr(endpoint.clone(), stderr);
        }

        info!(endpoint = %endpoint, pid = ?child.id(), "spawned capability provider");

        Ok(Self {
            endpoint,
            child: Some(child),
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
        })
    }

    async fn write_line(&mut self, value: &impl serde::Serialize) -> SessionResult<()> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| SessionError::transport("provider stdin already closed"))?;

        stdin
            .write_all(&line)
            .await
            .map_err(|err| SessionError::transport(format!("write to provider failed: {err}")))?;
        stdin
            .flush()
            .await
            .map_err(|err| SessionError::transport(format!("flush to provider failed: {err}")))
    }

    async fn read_message(&mut self) -> SessionResult<JsonRpcMessage> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await
                .map_err(|err| SessionError::transport(format!("read from provider failed: {err}")))?
                .ok_or_else(|| SessionError::transport("provider closed its stdout"))?;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            debug!(endpoint = %self.endpoint, bytes = trimmed.len(), "received frame");
            return JsonRpcMessage::parse(trimmed).inspect_err(|err| {
                warn!(endpoint = %self.endpoint, %err, "provider wrote a non JSON-RPC frame");
            });
        }
    }

    async fn answer_peer_request(&mut self, request: JsonRpcRequest) -> SessionResult<()> {
        let id = Value::from(request.id);
        let response = if request.method == methods::PING {
            JsonRpcResponse::success(id, json!({}))
        } else {
            warn!(
                endpoint = %self.endpoint,
                method = %request.method,
                "provider sent an unsupported request"
            );
            JsonRpcResponse::failure(
                id,
                RpcError::new(codes::METHOD_NOT_FOUND, "Method not found"),
            )
        };
        self.write_line(&response).await
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn round_trip(&mut self, request: JsonRpcRequest) -> SessionResult<JsonRpcResponse> {
        let expected = Value::from(request.id.clone());
        self.write_line(&request).await?;

        loop {
            match self.read_message().await? {
                JsonRpcMessage::Response(response) => {
                    if response.id == expected {
                        return Ok(response);
                    }
                    return Err(SessionError::protocol(format!(
                        "response id {} does not match request id {expected}",
                        response.id
                    )));
                }
                JsonRpcMessage::Request(peer) => self.answer_peer_request(peer).await?,
                JsonRpcMessage::Notification(note) => {
                    debug!(endpoint = %self.endpoint, method = %note.method, "provider notification");
                }
            }
        }
    }

    async fn notify(&mut self, notification: JsonRpcNotification) -> SessionResult<()> {
        self.write_line(&notification).await
    }

    async fn close(&mut self) -> SessionResult<()> {
        drop(self.stdin.take());

        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        match timeout(EXIT_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(endpoint = %self.endpoint, %status, "provider exited");
                Ok(())
            }
            Ok(Err(err)) => Err(SessionError::transport(format!(
                "waiting for provider failed: {err}"
            ))),
            Err(_) => {
                warn!(endpoint = %self.endpoint, "provider ignored stdin close, killing");
                child
                    .kill()
                    .await
                    .map_err(|err| SessionError::transport(format!("kill failed: {err}")))
            }
        }
    }
}

fn drain_stderr(endpoint: String, stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(target: "bridge_session::provider_stderr", endpoint = %endpoint, "{line}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let endpoint = StdioEndpoint::new("definitely-not-a-real-provider-binary");
        let err = StdioTransport::spawn(&endpoint, "stdio:missing").unwrap_err();
        assert!(matches!(err, SessionError::TransportUnavailable { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn echoes_response_from_shell_provider() {
        let script = r#"read line; echo '{"jsonrpc":"2.0","id":1,"result":{"ok":true}}'"#;
        let endpoint = StdioEndpoint::new("sh").args(["-c", script]);
        let mut transport = StdioTransport::spawn(&endpoint, "stdio:sh").unwrap();

        let response = transport
            .round_trip(JsonRpcRequest::new(1, methods::PING, None))
            .await
            .unwrap();
        assert_eq!(response.into_result().unwrap(), json!({"ok": true}));
        transport.close().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn answers_provider_ping_with_string_id() {
        let script = r#"read line
echo '{"jsonrpc":"2.0","id":"srv-1","method":"ping"}'
read pong
case "$pong" in
  *'"id":"srv-1"'*'"result":{}'*) echo '{"jsonrpc":"2.0","id":1,"result":{"ok":true}}' ;;
  *) echo "unexpected pong: $pong" ;;
esac"#;
        let endpoint = StdioEndpoint::new("sh").args(["-c", script]);
        let mut transport = StdioTransport::spawn(&endpoint, "stdio:sh").unwrap();

        let response = transport
            .round_trip(JsonRpcRequest::new(1, methods::PING, None))
            .await
            .unwrap();
        assert_eq!(response.into_result().unwrap(), json!({"ok": true}));
        transport.close().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn garbage_on_stdout_is_a_protocol_error() {
        let script = "read line; echo 'Starting server...'";
        let endpoint = StdioEndpoint::new("sh").args(["-c", script]);
        let mut transport = StdioTransport::spawn(&endpoint, "stdio:sh").unwrap();

        let err = transport
            .round_trip(JsonRpcRequest::new(1, methods::PING, None))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Protocol { .. }));
        assert!(err.is_fatal());
        transport.close().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn early_exit_is_a_transport_error() {
        let endpoint = StdioEndpoint::new("sh").args(["-c", "exit 0"]);
        let mut transport = StdioTransport::spawn(&endpoint, "stdio:sh").unwrap();

        let err = transport
            .round_trip(JsonRpcRequest::new(1, methods::PING, None))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Transport { .. } | SessionError::Protocol { .. }
        ));
        transport.close().await.unwrap();
    }
}
