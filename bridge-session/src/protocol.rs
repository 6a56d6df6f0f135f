//! JSON-RPC 2.0 envelopes and the capability-protocol payloads carried in them.

use std::fmt;

use bridge_primitives::{Capability, ProviderManifest};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::{SessionError, SessionResult};

/// Wire version tag every envelope must carry.
pub const JSONRPC_VERSION: &str = "2.0";

/// Newest protocol revision this client speaks.
pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";

/// Revisions accepted from a provider during the handshake.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Standard JSON-RPC error codes.
pub mod codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i64 = -32700;
    /// The payload is not a valid request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method does not exist.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal provider error.
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// Method names used on the wire.
pub mod methods {
    /// Session handshake request.
    pub const INITIALIZE: &str = "initialize";
    /// Notification sent once the handshake result was accepted.
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Liveness check.
    pub const PING: &str = "ping";
    /// Capability enumeration.
    pub const TOOLS_LIST: &str = "tools/list";
    /// Capability invocation.
    pub const TOOLS_CALL: &str = "tools/call";
}

/// Request id as allowed by JSON-RPC 2.0: a number or a string.
///
/// This client numbers its own requests; peers may use either form and get
/// their id echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    /// Numeric id.
    Number(Number),
    /// String id.
    String(String),
}

impl MessageId {
    /// The id as an unsigned integer, when it is one.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(number) => number.as_u64(),
            Self::String(_) => None,
        }
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        Self::Number(id.into())
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self::String(id.to_owned())
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self::String(id)
    }
}

impl From<MessageId> for Value {
    fn from(id: MessageId) -> Self {
        match id {
            MessageId::Number(number) => Value::Number(number),
            MessageId::String(text) => Value::String(text),
        }
    }
}

impl PartialEq<u64> for MessageId {
    fn eq(&self, other: &u64) -> bool {
        self.as_u64() == Some(*other)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(number) => write!(f, "{number}"),
            Self::String(text) => write!(f, "{text:?}"),
        }
    }
}

/// Request envelope, sent by either side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Correlation id, unique per session.
    pub id: MessageId,
    /// Method name.
    pub method: String,
    /// Optional parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Creates a request envelope.
    #[must_use]
    pub fn new(id: impl Into<MessageId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// Envelope without an id; no response is expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Method name.
    pub method: String,
    /// Optional parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Creates a notification envelope.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            method: method.into(),
            params,
        }
    }
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Numeric code.
    pub code: i64,
    /// Human readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Builds an error object without extra data.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// Response envelope; exactly one of `result` or `error` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Id of the request being answered. `null` for parse errors.
    pub id: Value,
    /// Success payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl JsonRpcResponse {
    /// Successful response.
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Failed response.
    #[must_use]
    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Returns the numeric id when the provider echoed one.
    #[must_use]
    pub fn numeric_id(&self) -> Option<u64> {
        self.id.as_u64()
    }

    /// Converts the envelope into its payload.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Rpc`] when the provider reported an error and
    /// [`SessionError::Protocol`] when neither field is present.
    pub fn into_result(self) -> SessionResult<Value> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(SessionError::Rpc {
                code: error.code,
                message: error.message,
            }),
            (Some(result), None) => Ok(result),
            (None, None) => Err(SessionError::protocol(
                "response carries neither result nor error",
            )),
        }
    }
}

/// Classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcMessage {
    /// A request initiated by the peer.
    Request(JsonRpcRequest),
    /// A notification from the peer.
    Notification(JsonRpcNotification),
    /// A response to one of our requests.
    Response(JsonRpcResponse),
}

impl JsonRpcMessage {
    /// Classifies an already-parsed JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Protocol`] when the value is not a JSON-RPC 2.0
    /// envelope.
    pub fn from_value(value: Value) -> SessionResult<Self> {
        let Value::Object(envelope) = &value else {
            return Err(SessionError::protocol("message is not a JSON object"));
        };

        if envelope.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(SessionError::protocol("missing or unsupported jsonrpc version"));
        }

        let has_method = envelope.contains_key("method");
        let has_id = envelope.get("id").is_some_and(|id| !id.is_null());
        let is_response = envelope.contains_key("result") || envelope.contains_key("error");

        let decoded = if has_method && has_id {
            serde_json::from_value(value).map(Self::Request)
        } else if has_method {
            serde_json::from_value(value).map(Self::Notification)
        } else if is_response {
            serde_json::from_value(value).map(Self::Response)
        } else {
            return Err(SessionError::protocol("unrecognized JSON-RPC envelope"));
        };

        decoded.map_err(|err| SessionError::protocol(format!("malformed envelope: {err}")))
    }

    /// Parses and classifies one line of text.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Protocol`] for text that is not JSON or not an
    /// envelope.
    pub fn parse(text: &str) -> SessionResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|err| SessionError::protocol(format!("invalid JSON from provider: {err}")))?;
        Self::from_value(value)
    }
}

/// Client identity sent with the handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    pub version: String,
}

/// Parameters of the `initialize` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Requested protocol revision.
    pub protocol_version: String,
    /// Client capability flags. Empty for this client.
    #[serde(default)]
    pub capabilities: Map<String, Value>,
    /// Client identity.
    pub client_info: ClientInfo,
}

/// Result of the `initialize` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Revision the provider settled on.
    pub protocol_version: String,
    /// Provider capability flags.
    #[serde(default)]
    pub capabilities: Map<String, Value>,
    /// Provider identity.
    pub server_info: ProviderManifest,
    /// Optional usage notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Parameters of `tools/list`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListToolsParams {
    /// Opaque pagination cursor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// One page of `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    /// Capabilities on this page.
    pub tools: Vec<Capability>,
    /// Cursor for the next page, absent on the last one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Parameters of `tools/call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallToolParams {
    /// Capability to run.
    pub name: String,
    /// Argument mapping.
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// Result of `tools/call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// Unstructured output blocks.
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    /// Optional machine readable output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    /// Set when the capability itself failed.
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Successful result with one text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            structured_content: None,
            is_error: false,
        }
    }

    /// Failed result with the error message as a text block.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::text(message)
        }
    }
}

/// One item of capability output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// Text payload.
        text: String,
    },
    /// Base64 image.
    Image {
        /// Base64 data.
        data: String,
        /// MIME type.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// Embedded resource, kept opaque.
    Resource {
        /// Raw resource object.
        resource: Value,
    },
    /// Any block type this client does not interpret.
    #[serde(other)]
    Unsupported,
}

impl ContentBlock {
    /// Returns the text payload for text blocks.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn classifies_envelopes() {
        let request = JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#).unwrap();
        assert!(matches!(request, JsonRpcMessage::Request(ref r) if r.id == 7));

        let note =
            JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .unwrap();
        assert!(matches!(note, JsonRpcMessage::Notification(_)));

        let response =
            JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).unwrap();
        assert!(matches!(response, JsonRpcMessage::Response(ref r) if r.numeric_id() == Some(1)));
    }

    #[test]
    fn string_ids_are_requests_too() {
        let JsonRpcMessage::Request(request) =
            JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","id":"srv-1","method":"ping"}"#).unwrap()
        else {
            panic!("expected a request");
        };
        assert_eq!(request.id, MessageId::from("srv-1"));
        assert_eq!(request.id.as_u64(), None);

        let echoed = JsonRpcResponse::success(request.id.into(), json!({}));
        assert_eq!(serde_json::to_value(&echoed).unwrap()["id"], "srv-1");
    }

    #[test]
    fn rejects_non_envelopes() {
        assert!(JsonRpcMessage::parse("hello world").is_err());
        assert!(JsonRpcMessage::parse(r#"{"id":1,"result":{}}"#).is_err());
        assert!(JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","id":1}"#).is_err());
        assert!(JsonRpcMessage::parse("[1,2]").is_err());
    }

    #[test]
    fn error_response_maps_to_rpc_error() {
        let response = JsonRpcResponse::failure(
            json!(3),
            RpcError::new(codes::METHOD_NOT_FOUND, "Method not found"),
        );
        let err = response.into_result().unwrap_err();
        assert!(matches!(err, SessionError::Rpc { code: -32601, .. }));
    }

    #[test]
    fn call_result_decodes_with_unknown_blocks() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "8"},
                {"type": "audio", "data": "xx"}
            ],
            "isError": false
        }))
        .unwrap();

        assert_eq!(result.content.len(), 2);
        assert_eq!(result.content[0].as_text(), Some("8"));
        assert_eq!(result.content[1], ContentBlock::Unsupported);
    }

    #[test]
    fn list_result_carries_cursor() {
        let page: ListToolsResult = serde_json::from_value(json!({
            "tools": [{"name": "add", "description": "Add two numbers"}],
            "nextCursor": "2"
        }))
        .unwrap();
        assert_eq!(page.tools[0].name().as_str(), "add");
        assert_eq!(page.next_cursor.as_deref(), Some("2"));
    }
}
