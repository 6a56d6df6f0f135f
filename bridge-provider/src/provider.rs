//! JSON-RPC method dispatch for a capability provider.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bridge_primitives::{Capability, ProviderManifest};
use bridge_session::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcMessage,
    JsonRpcRequest, JsonRpcResponse, LATEST_PROTOCOL_VERSION, ListToolsParams, ListToolsResult,
    RpcError, SUPPORTED_PROTOCOL_VERSIONS, codes, methods,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::table::CapabilityTable;

/// A named set of capabilities answering JSON-RPC messages.
///
/// The provider is transport agnostic: stdio, HTTP and in-process servers all
/// feed it decoded messages through [`CapabilityProvider::handle`].
#[derive(Debug)]
pub struct CapabilityProvider {
    manifest: ProviderManifest,
    table: Arc<CapabilityTable>,
    page_size: Option<usize>,
    calls: AtomicU64,
}

impl CapabilityProvider {
    /// Creates a provider serving `table`.
    #[must_use]
    pub fn new(manifest: ProviderManifest, table: CapabilityTable) -> Self {
        Self {
            manifest,
            table: Arc::new(table),
            page_size: None,
            calls: AtomicU64::new(0),
        }
    }

    /// Splits `tools/list` answers into pages of at most `size` entries.
    #[must_use]
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size.max(1));
        self
    }

    /// Provider identity.
    #[must_use]
    pub fn manifest(&self) -> &ProviderManifest {
        &self.manifest
    }

    /// Capability table.
    #[must_use]
    pub fn table(&self) -> &CapabilityTable {
        &self.table
    }

    /// Number of `tools/call` requests handled so far.
    #[must_use]
    pub fn calls_served(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Handles one line of framed text, answering parse failures with a
    /// JSON-RPC parse error.
    pub async fn handle_text(&self, text: &str) -> Option<Value> {
        match serde_json::from_str::<Value>(text) {
            Ok(message) => self.handle(message).await,
            Err(err) => {
                warn!(%err, "received unparseable frame");
                Some(error_value(
                    Value::Null,
                    RpcError::new(codes::PARSE_ERROR, "Parse error"),
                ))
            }
        }
    }

    /// Handles one decoded message and returns the response to send, if any.
    ///
    /// Notifications and stray responses produce `None`.
    pub async fn handle(&self, message: Value) -> Option<Value> {
        let id = message.get("id").cloned().unwrap_or(Value::Null);

        let request = match JsonRpcMessage::from_value(message) {
            Ok(JsonRpcMessage::Request(request)) => request,
            Ok(JsonRpcMessage::Notification(note)) => {
                debug!(method = %note.method, "notification received");
                return None;
            }
            Ok(JsonRpcMessage::Response(response)) => {
                debug!(id = %response.id, "ignoring response from client");
                return None;
            }
            Err(err) => {
                warn!(%err, "invalid request envelope");
                return Some(error_value(
                    id,
                    RpcError::new(codes::INVALID_REQUEST, "Invalid Request"),
                ));
            }
        };

        let id = Value::from(request.id.clone());
        let response = match self.dispatch(request).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(id, error),
        };
        serde_json::to_value(response).ok()
    }

    async fn dispatch(&self, request: JsonRpcRequest) -> Result<Value, RpcError> {
        match request.method.as_str() {
            methods::INITIALIZE => {
                let params: InitializeParams = decode_params(request.params)?;
                self.initialize(&params)
            }
            methods::PING => Ok(json!({})),
            methods::TOOLS_LIST => {
                let params: ListToolsParams = match request.params {
                    Some(Value::Null) | None => ListToolsParams::default(),
                    params => decode_params(params)?,
                };
                self.list(params.cursor.as_deref())
            }
            methods::TOOLS_CALL => {
                let params: CallToolParams = decode_params(request.params)?;
                self.call(params).await
            }
            other => {
                debug!(method = other, "method not found");
                Err(RpcError::new(
                    codes::METHOD_NOT_FOUND,
                    format!("Method not found: {other}"),
                ))
            }
        }
    }

    fn initialize(&self, params: &InitializeParams) -> Result<Value, RpcError> {
        let protocol_version =
            if SUPPORTED_PROTOCOL_VERSIONS.contains(&params.protocol_version.as_str()) {
                params.protocol_version.clone()
            } else {
                LATEST_PROTOCOL_VERSION.to_owned()
            };

        info!(
            client = %params.client_info.name,
            requested = %params.protocol_version,
            agreed = %protocol_version,
            provider = %self.manifest.name(),
            "client initialized"
        );

        let mut capabilities = Map::new();
        capabilities.insert("tools".to_owned(), json!({"listChanged": false}));

        encode(&InitializeResult {
            protocol_version,
            capabilities,
            server_info: self.manifest.clone(),
            instructions: self.manifest.instructions().map(ToOwned::to_owned),
        })
    }

    fn list(&self, cursor: Option<&str>) -> Result<Value, RpcError> {
        let all = self.table.list();
        let start = match cursor {
            None => 0,
            Some(cursor) => cursor
                .parse::<usize>()
                .ok()
                .filter(|offset| *offset <= all.len())
                .ok_or_else(|| {
                    RpcError::new(codes::INVALID_PARAMS, format!("Invalid cursor: {cursor}"))
                })?,
        };

        let end = self
            .page_size
            .map_or(all.len(), |size| (start + size).min(all.len()));
        let tools: Vec<Capability> = all[start..end].to_vec();
        let next_cursor = (end < all.len()).then(|| end.to_string());

        encode(&ListToolsResult { tools, next_cursor })
    }

    async fn call(&self, params: CallToolParams) -> Result<Value, RpcError> {
        let entry = self.table.get(&params.name).ok_or_else(|| {
            RpcError::new(
                codes::INVALID_PARAMS,
                format!("Unknown tool: {}", params.name),
            )
        })?;
        self.calls.fetch_add(1, Ordering::Relaxed);

        if let Err(violations) = entry.capability().input_shape().validate(&params.arguments) {
            let detail = violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            debug!(capability = %params.name, %detail, "arguments rejected");
            return encode(&CallToolResult::error(format!(
                "Invalid arguments for {}: {detail}",
                params.name
            )));
        }

        let result = match entry.call(params.arguments).await {
            Ok(value) => {
                let text = match &value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                CallToolResult {
                    structured_content: Some(json!({ "result": value })),
                    ..CallToolResult::text(text)
                }
            }
            Err(err) => {
                debug!(capability = %params.name, error = %err, "capability failed");
                CallToolResult::error(format!("Error executing tool {}: {err}", params.name))
            }
        };

        encode(&result)
    }
}

fn decode_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcError> {
    serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|err| RpcError::new(codes::INVALID_PARAMS, format!("Invalid params: {err}")))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value)
        .map_err(|err| RpcError::new(codes::INTERNAL_ERROR, format!("Internal error: {err}")))
}

fn error_value(id: Value, error: RpcError) -> Value {
    serde_json::to_value(JsonRpcResponse::failure(id, error)).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    async fn request(provider: &CapabilityProvider, id: u64, method: &str, params: Value) -> Value {
        provider
            .handle(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn initialize_negotiates_version() {
        let provider = Catalog::Math.provider().unwrap();
        let response = request(
            &provider,
            1,
            "initialize",
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test", "version": "0"}
            }),
        )
        .await;

        assert_eq!(response["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(response["result"]["serverInfo"]["name"], "Math");

        let response = request(
            &provider,
            2,
            "initialize",
            json!({
                "protocolVersion": "2099-01-01",
                "clientInfo": {"name": "test", "version": "0"}
            }),
        )
        .await;
        assert_eq!(response["result"]["protocolVersion"], LATEST_PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn string_ids_are_echoed() {
        let provider = Catalog::Math.provider().unwrap();
        let response = provider
            .handle(json!({"jsonrpc": "2.0", "id": "req-1", "method": "ping"}))
            .await
            .unwrap();
        assert_eq!(response["id"], "req-1");
        assert_eq!(response["result"], json!({}));
        assert!(response.get("error").is_none());
    }

    #[tokio::test]
    async fn list_paginates() {
        let provider = Catalog::Math.provider().unwrap().with_page_size(1);

        let first = request(&provider, 1, "tools/list", json!({})).await;
        assert_eq!(first["result"]["tools"][0]["name"], "add");
        assert_eq!(first["result"]["nextCursor"], "1");

        let second = request(&provider, 2, "tools/list", json!({"cursor": "1"})).await;
        assert_eq!(second["result"]["tools"][0]["name"], "multiply");
        assert!(second["result"].get("nextCursor").is_none());

        let bad = request(&provider, 3, "tools/list", json!({"cursor": "x"})).await;
        assert_eq!(bad["error"]["code"], codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn call_success_and_domain_error() {
        let provider = Catalog::Bmi.provider().unwrap();

        let ok = request(
            &provider,
            1,
            "tools/call",
            json!({"name": "calculate_bmi", "arguments": {"weight_kg": 70, "height_m": 1.75}}),
        )
        .await;
        assert_eq!(ok["result"]["isError"], false);
        assert_eq!(ok["result"]["content"][0]["text"], "22.86");
        assert_eq!(ok["result"]["structuredContent"]["result"], 22.86);

        let failed = request(
            &provider,
            2,
            "tools/call",
            json!({"name": "calculate_bmi", "arguments": {"weight_kg": -1, "height_m": 1.75}}),
        )
        .await;
        assert!(failed.get("error").is_none());
        assert_eq!(failed["result"]["isError"], true);
        assert!(
            failed["result"]["content"][0]["text"]
                .as_str()
                .unwrap()
                .contains("greater than zero")
        );
        assert_eq!(provider.calls_served(), 2);
    }

    #[tokio::test]
    async fn invalid_arguments_are_reported_as_tool_errors() {
        let provider = Catalog::Math.provider().unwrap();
        let response = request(
            &provider,
            1,
            "tools/call",
            json!({"name": "add", "arguments": {"a": "ten", "b": 8}}),
        )
        .await;
        assert_eq!(response["result"]["isError"], true);
    }

    #[tokio::test]
    async fn protocol_errors() {
        let provider = Catalog::Weather.provider().unwrap();

        let unknown_method = request(&provider, 1, "resources/list", json!({})).await;
        assert_eq!(unknown_method["error"]["code"], codes::METHOD_NOT_FOUND);

        let unknown_tool = request(
            &provider,
            2,
            "tools/call",
            json!({"name": "nope", "arguments": {}}),
        )
        .await;
        assert_eq!(unknown_tool["error"]["code"], codes::INVALID_PARAMS);

        let garbage = provider.handle_text("not json").await.unwrap();
        assert_eq!(garbage["error"]["code"], codes::PARSE_ERROR);

        let invalid = provider.handle(json!({"id": 4, "method": "ping"})).await.unwrap();
        assert_eq!(invalid["error"]["code"], codes::INVALID_REQUEST);
        assert_eq!(invalid["id"], 4);

        let note = provider
            .handle(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await;
        assert!(note.is_none());
    }
}
