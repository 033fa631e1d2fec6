//! Typed representation of the Model Context Protocol wire format.
//!
//! Everything in this crate maps 1:1 onto the JSON-RPC 2.0 envelope and the
//! MCP payload schemas. Envelope `params`/`result` fields are kept as raw
//! [`serde_json::Value`]s so that fields added by newer protocol revisions
//! survive a decode/encode round trip unchanged; typed views are obtained via
//! the `TryFrom` conversions on [`ClientRequest`], [`ServerRequest`],
//! [`ClientNotification`] and [`ServerNotification`].

use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol revisions this crate understands, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Newest protocol revision this crate models.
pub const MCP_SCHEMA_VERSION: &str = "2025-06-18";

// JSON-RPC error codes, including the MCP-specific extensions.
pub const PARSE_ERROR_CODE: i64 = -32700;
pub const INVALID_REQUEST_ERROR_CODE: i64 = -32600;
pub const METHOD_NOT_FOUND_ERROR_CODE: i64 = -32601;
pub const INVALID_PARAMS_ERROR_CODE: i64 = -32602;
pub const INTERNAL_ERROR_CODE: i64 = -32603;
pub const SERVER_NOT_INITIALIZED_ERROR_CODE: i64 = -32002;
pub const REQUEST_CANCELLED_ERROR_CODE: i64 = -32800;

/// The payload of a successful JSON-RPC response.
pub type Result = Value;

/// A request sent by either peer. Implementors are uninhabited marker types;
/// the trait only ties a method name to its params/result shapes.
pub trait ModelContextProtocolRequest {
    const METHOD: &'static str;
    type Params: DeserializeOwned + Serialize + Send + Sync + std::fmt::Debug;
    type Result: DeserializeOwned + Serialize + Send + Sync + std::fmt::Debug;
}

/// A notification sent by either peer.
pub trait ModelContextProtocolNotification {
    const METHOD: &'static str;
    type Params: DeserializeOwned + Serialize + Send + Sync + std::fmt::Debug;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JSONRPCMessage {
    // Order matters: `Request` must be tried before `Notification` because
    // untagged deserialization ignores unknown fields and every request is
    // also a structurally valid notification.
    Request(JSONRPCRequest),
    Notification(JSONRPCNotification),
    Response(JSONRPCResponse),
    Error(JSONRPCError),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Integer(i64),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::String(s) => write!(f, "{s}"),
            RequestId::Integer(i) => write!(f, "{i}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressToken {
    String(String),
    Integer(i64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JSONRPCRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JSONRPCNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JSONRPCResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    pub result: Result,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JSONRPCError {
    pub jsonrpc: String,
    pub id: RequestId,
    pub error: JSONRPCErrorError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JSONRPCErrorError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Failure to view a raw envelope as a typed MCP message.
///
/// The two variants map onto distinct wire errors: an unknown method is
/// `-32601`, malformed params for a known method are `-32602`. Neither is a
/// decode failure of the envelope itself.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("unknown method: {0}")]
    UnknownMethod(String),
    #[error("invalid params for {method}: {source}")]
    InvalidParams {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

fn parse_params<P: DeserializeOwned>(
    method: &str,
    params: Option<Value>,
) -> std::result::Result<P, ConversionError> {
    serde_json::from_value(params.unwrap_or(Value::Null)).map_err(|source| {
        ConversionError::InvalidParams {
            method: method.to_string(),
            source,
        }
    })
}

// ---------------------------------------------------------------------------
// Request marker types
// ---------------------------------------------------------------------------

macro_rules! mcp_request {
    ($name:ident, $method:literal, $params:ty, $result:ty) => {
        #[derive(Debug)]
        pub enum $name {}

        impl ModelContextProtocolRequest for $name {
            const METHOD: &'static str = $method;
            type Params = $params;
            type Result = $result;
        }
    };
}

macro_rules! mcp_notification {
    ($name:ident, $method:literal, $params:ty) => {
        #[derive(Debug)]
        pub enum $name {}

        impl ModelContextProtocolNotification for $name {
            const METHOD: &'static str = $method;
            type Params = $params;
        }
    };
}

mcp_request!(
    InitializeRequest,
    "initialize",
    InitializeRequestParams,
    InitializeResult
);
mcp_request!(PingRequest, "ping", Option<Value>, Result);
mcp_request!(
    ListToolsRequest,
    "tools/list",
    Option<ListToolsRequestParams>,
    ListToolsResult
);
mcp_request!(
    CallToolRequest,
    "tools/call",
    CallToolRequestParams,
    CallToolResult
);
mcp_request!(
    ListResourcesRequest,
    "resources/list",
    Option<ListResourcesRequestParams>,
    ListResourcesResult
);
mcp_request!(
    ListResourceTemplatesRequest,
    "resources/templates/list",
    Option<ListResourceTemplatesRequestParams>,
    ListResourceTemplatesResult
);
mcp_request!(
    ReadResourceRequest,
    "resources/read",
    ReadResourceRequestParams,
    ReadResourceResult
);
mcp_request!(
    SubscribeRequest,
    "resources/subscribe",
    SubscribeRequestParams,
    Result
);
mcp_request!(
    UnsubscribeRequest,
    "resources/unsubscribe",
    UnsubscribeRequestParams,
    Result
);
mcp_request!(
    ListPromptsRequest,
    "prompts/list",
    Option<ListPromptsRequestParams>,
    ListPromptsResult
);
mcp_request!(
    GetPromptRequest,
    "prompts/get",
    GetPromptRequestParams,
    GetPromptResult
);
mcp_request!(
    SetLevelRequest,
    "logging/setLevel",
    SetLevelRequestParams,
    Result
);
mcp_request!(
    CompleteRequest,
    "completion/complete",
    CompleteRequestParams,
    CompleteResult
);
mcp_request!(
    CreateMessageRequest,
    "sampling/createMessage",
    CreateMessageRequestParams,
    CreateMessageResult
);
mcp_request!(
    ElicitRequest,
    "elicitation/create",
    ElicitRequestParams,
    ElicitResult
);
mcp_request!(
    ListTasksRequest,
    "tasks/list",
    Option<ListTasksRequestParams>,
    ListTasksResult
);
mcp_request!(GetTaskRequest, "tasks/get", GetTaskRequestParams, Task);
mcp_request!(
    CancelTaskRequest,
    "tasks/cancel",
    CancelTaskRequestParams,
    Task
);

mcp_notification!(InitializedNotification, "notifications/initialized", Option<Value>);
mcp_notification!(
    CancelledNotification,
    "notifications/cancelled",
    CancelledNotificationParams
);
mcp_notification!(
    ProgressNotification,
    "notifications/progress",
    ProgressNotificationParams
);
mcp_notification!(
    LoggingMessageNotification,
    "notifications/message",
    LoggingMessageNotificationParams
);
mcp_notification!(
    ResourceUpdatedNotification,
    "notifications/resources/updated",
    ResourceUpdatedNotificationParams
);
mcp_notification!(
    ResourceListChangedNotification,
    "notifications/resources/list_changed",
    Option<Value>
);
mcp_notification!(
    ToolListChangedNotification,
    "notifications/tools/list_changed",
    Option<Value>
);
mcp_notification!(
    PromptListChangedNotification,
    "notifications/prompts/list_changed",
    Option<Value>
);

// ---------------------------------------------------------------------------
// Typed views over raw envelopes
// ---------------------------------------------------------------------------

/// Requests a server accepts from a client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientRequest {
    InitializeRequest(InitializeRequestParams),
    PingRequest(Option<Value>),
    ListToolsRequest(Option<ListToolsRequestParams>),
    CallToolRequest(CallToolRequestParams),
    ListResourcesRequest(Option<ListResourcesRequestParams>),
    ListResourceTemplatesRequest(Option<ListResourceTemplatesRequestParams>),
    ReadResourceRequest(ReadResourceRequestParams),
    SubscribeRequest(SubscribeRequestParams),
    UnsubscribeRequest(UnsubscribeRequestParams),
    ListPromptsRequest(Option<ListPromptsRequestParams>),
    GetPromptRequest(GetPromptRequestParams),
    SetLevelRequest(SetLevelRequestParams),
    CompleteRequest(CompleteRequestParams),
    ListTasksRequest(Option<ListTasksRequestParams>),
    GetTaskRequest(GetTaskRequestParams),
    CancelTaskRequest(CancelTaskRequestParams),
}

impl TryFrom<JSONRPCRequest> for ClientRequest {
    type Error = ConversionError;

    fn try_from(req: JSONRPCRequest) -> std::result::Result<Self, Self::Error> {
        let JSONRPCRequest { method, params, .. } = req;
        let request = match method.as_str() {
            InitializeRequest::METHOD => {
                ClientRequest::InitializeRequest(parse_params(&method, params)?)
            }
            PingRequest::METHOD => ClientRequest::PingRequest(parse_params(&method, params)?),
            ListToolsRequest::METHOD => {
                ClientRequest::ListToolsRequest(parse_params(&method, params)?)
            }
            CallToolRequest::METHOD => {
                ClientRequest::CallToolRequest(parse_params(&method, params)?)
            }
            ListResourcesRequest::METHOD => {
                ClientRequest::ListResourcesRequest(parse_params(&method, params)?)
            }
            ListResourceTemplatesRequest::METHOD => {
                ClientRequest::ListResourceTemplatesRequest(parse_params(&method, params)?)
            }
            ReadResourceRequest::METHOD => {
                ClientRequest::ReadResourceRequest(parse_params(&method, params)?)
            }
            SubscribeRequest::METHOD => {
                ClientRequest::SubscribeRequest(parse_params(&method, params)?)
            }
            UnsubscribeRequest::METHOD => {
                ClientRequest::UnsubscribeRequest(parse_params(&method, params)?)
            }
            ListPromptsRequest::METHOD => {
                ClientRequest::ListPromptsRequest(parse_params(&method, params)?)
            }
            GetPromptRequest::METHOD => {
                ClientRequest::GetPromptRequest(parse_params(&method, params)?)
            }
            SetLevelRequest::METHOD => {
                ClientRequest::SetLevelRequest(parse_params(&method, params)?)
            }
            CompleteRequest::METHOD => {
                ClientRequest::CompleteRequest(parse_params(&method, params)?)
            }
            ListTasksRequest::METHOD => {
                ClientRequest::ListTasksRequest(parse_params(&method, params)?)
            }
            GetTaskRequest::METHOD => ClientRequest::GetTaskRequest(parse_params(&method, params)?),
            CancelTaskRequest::METHOD => {
                ClientRequest::CancelTaskRequest(parse_params(&method, params)?)
            }
            _ => return Err(ConversionError::UnknownMethod(method)),
        };
        Ok(request)
    }
}

impl ClientRequest {
    pub fn method(&self) -> &'static str {
        match self {
            ClientRequest::InitializeRequest(_) => InitializeRequest::METHOD,
            ClientRequest::PingRequest(_) => PingRequest::METHOD,
            ClientRequest::ListToolsRequest(_) => ListToolsRequest::METHOD,
            ClientRequest::CallToolRequest(_) => CallToolRequest::METHOD,
            ClientRequest::ListResourcesRequest(_) => ListResourcesRequest::METHOD,
            ClientRequest::ListResourceTemplatesRequest(_) => ListResourceTemplatesRequest::METHOD,
            ClientRequest::ReadResourceRequest(_) => ReadResourceRequest::METHOD,
            ClientRequest::SubscribeRequest(_) => SubscribeRequest::METHOD,
            ClientRequest::UnsubscribeRequest(_) => UnsubscribeRequest::METHOD,
            ClientRequest::ListPromptsRequest(_) => ListPromptsRequest::METHOD,
            ClientRequest::GetPromptRequest(_) => GetPromptRequest::METHOD,
            ClientRequest::SetLevelRequest(_) => SetLevelRequest::METHOD,
            ClientRequest::CompleteRequest(_) => CompleteRequest::METHOD,
            ClientRequest::ListTasksRequest(_) => ListTasksRequest::METHOD,
            ClientRequest::GetTaskRequest(_) => GetTaskRequest::METHOD,
            ClientRequest::CancelTaskRequest(_) => CancelTaskRequest::METHOD,
        }
    }
}

/// Requests a client accepts from a server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerRequest {
    PingRequest(Option<Value>),
    CreateMessageRequest(CreateMessageRequestParams),
    ElicitRequest(ElicitRequestParams),
}

impl TryFrom<JSONRPCRequest> for ServerRequest {
    type Error = ConversionError;

    fn try_from(req: JSONRPCRequest) -> std::result::Result<Self, Self::Error> {
        let JSONRPCRequest { method, params, .. } = req;
        let request = match method.as_str() {
            PingRequest::METHOD => ServerRequest::PingRequest(parse_params(&method, params)?),
            CreateMessageRequest::METHOD => {
                ServerRequest::CreateMessageRequest(parse_params(&method, params)?)
            }
            ElicitRequest::METHOD => ServerRequest::ElicitRequest(parse_params(&method, params)?),
            _ => return Err(ConversionError::UnknownMethod(method)),
        };
        Ok(request)
    }
}

/// Notifications a server accepts from a client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientNotification {
    InitializedNotification(Option<Value>),
    CancelledNotification(CancelledNotificationParams),
    ProgressNotification(ProgressNotificationParams),
}

impl TryFrom<JSONRPCNotification> for ClientNotification {
    type Error = ConversionError;

    fn try_from(n: JSONRPCNotification) -> std::result::Result<Self, Self::Error> {
        let JSONRPCNotification { method, params, .. } = n;
        let notification = match method.as_str() {
            InitializedNotification::METHOD => {
                ClientNotification::InitializedNotification(parse_params(&method, params)?)
            }
            CancelledNotification::METHOD => {
                ClientNotification::CancelledNotification(parse_params(&method, params)?)
            }
            ProgressNotification::METHOD => {
                ClientNotification::ProgressNotification(parse_params(&method, params)?)
            }
            _ => return Err(ConversionError::UnknownMethod(method)),
        };
        Ok(notification)
    }
}

/// Notifications a client accepts from a server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerNotification {
    CancelledNotification(CancelledNotificationParams),
    ProgressNotification(ProgressNotificationParams),
    LoggingMessageNotification(LoggingMessageNotificationParams),
    ResourceUpdatedNotification(ResourceUpdatedNotificationParams),
    ResourceListChangedNotification(Option<Value>),
    ToolListChangedNotification(Option<Value>),
    PromptListChangedNotification(Option<Value>),
}

impl TryFrom<JSONRPCNotification> for ServerNotification {
    type Error = ConversionError;

    fn try_from(n: JSONRPCNotification) -> std::result::Result<Self, Self::Error> {
        let JSONRPCNotification { method, params, .. } = n;
        let notification = match method.as_str() {
            CancelledNotification::METHOD => {
                ServerNotification::CancelledNotification(parse_params(&method, params)?)
            }
            ProgressNotification::METHOD => {
                ServerNotification::ProgressNotification(parse_params(&method, params)?)
            }
            LoggingMessageNotification::METHOD => {
                ServerNotification::LoggingMessageNotification(parse_params(&method, params)?)
            }
            ResourceUpdatedNotification::METHOD => {
                ServerNotification::ResourceUpdatedNotification(parse_params(&method, params)?)
            }
            ResourceListChangedNotification::METHOD => {
                ServerNotification::ResourceListChangedNotification(parse_params(&method, params)?)
            }
            ToolListChangedNotification::METHOD => {
                ServerNotification::ToolListChangedNotification(parse_params(&method, params)?)
            }
            PromptListChangedNotification::METHOD => {
                ServerNotification::PromptListChangedNotification(parse_params(&method, params)?)
            }
            _ => return Err(ConversionError::UnknownMethod(method)),
        };
        Ok(notification)
    }
}

// ---------------------------------------------------------------------------
// initialize
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequestParams {
    pub capabilities: ClientCapabilities,
    pub client_info: Implementation,
    pub protocol_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub capabilities: ServerCapabilities,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub protocol_version: String,
    pub server_info: Implementation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roots: Option<ClientCapabilitiesRoots>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elicitation: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCapabilitiesRoots {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completions: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<ServerCapabilitiesPrompts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ServerCapabilitiesResources>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ServerCapabilitiesTools>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilitiesPrompts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilitiesResources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilitiesTools {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

// ---------------------------------------------------------------------------
// tools
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListToolsRequestParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    pub tools: Vec<Tool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: ToolInputSchema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInputSchema {
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallToolRequestParams {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
}

// ---------------------------------------------------------------------------
// content blocks
// ---------------------------------------------------------------------------

/// Discriminated on the `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text(TextContent),
    #[serde(rename = "image")]
    Image(ImageContent),
    #[serde(rename = "audio")]
    Audio(AudioContent),
    #[serde(rename = "resource_link")]
    ResourceLink(ResourceLink),
    #[serde(rename = "resource")]
    Resource(EmbeddedResource),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageContent {
    /// Base64-encoded image bytes, passed through verbatim.
    pub data: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioContent {
    pub data: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLink {
    pub uri: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedResource {
    pub resource: ResourceContents,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,
}

/// Text and blob variants are distinguished by their payload field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceContents {
    Text(TextResourceContents),
    Blob(BlobResourceContents),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextResourceContents {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobResourceContents {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Base64-encoded bytes, passed through verbatim.
    pub blob: String,
}

// ---------------------------------------------------------------------------
// resources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListResourcesRequestParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResourcesResult {
    pub resources: Vec<Resource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub uri: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListResourceTemplatesRequestParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResourceTemplatesResult {
    pub resource_templates: Vec<ResourceTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplate {
    pub uri_template: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadResourceRequestParams {
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadResourceResult {
    pub contents: Vec<ResourceContents>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeRequestParams {
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsubscribeRequestParams {
    pub uri: String,
}

// ---------------------------------------------------------------------------
// prompts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListPromptsRequestParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPromptsResult {
    pub prompts: Vec<Prompt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<PromptArgument>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetPromptRequestParams {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetPromptResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub messages: Vec<PromptMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: ContentBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

// ---------------------------------------------------------------------------
// completion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteRequestParams {
    pub argument: CompleteRequestParamsArgument,
    pub r#ref: CompletionReference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteRequestParamsArgument {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CompletionReference {
    #[serde(rename = "ref/prompt")]
    Prompt(PromptReference),
    #[serde(rename = "ref/resource")]
    Resource(ResourceTemplateReference),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptReference {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceTemplateReference {
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteResult {
    pub completion: CompleteResultCompletion,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteResultCompletion {
    pub values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

// ---------------------------------------------------------------------------
// logging
// ---------------------------------------------------------------------------

/// Severity ordering follows the declaration order: `Debug` is the least
/// severe, `Emergency` the most.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetLevelRequestParams {
    pub level: LoggingLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingMessageNotificationParams {
    pub level: LoggingLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    pub data: Value,
}

// ---------------------------------------------------------------------------
// sampling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageRequestParams {
    pub messages: Vec<SamplingMessage>,
    pub max_tokens: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_preferences: Option<ModelPreferences>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingMessage {
    pub role: Role,
    pub content: ContentBlock,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPreferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<ModelHint>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_priority: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intelligence_priority: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_priority: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelHint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageResult {
    pub role: Role,
    pub content: ContentBlock,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// elicitation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElicitRequestParams {
    pub message: String,
    pub requested_schema: ElicitRequestParamsRequestedSchema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElicitRequestParamsRequestedSchema {
    pub r#type: String,
    pub properties: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElicitResult {
    pub action: ElicitResultAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElicitResultAction {
    Accept,
    Decline,
    Cancel,
}

// ---------------------------------------------------------------------------
// long-running tasks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Working,
    InputRequired,
    Completed,
    Failed,
    Cancelled,
    Expired,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::Expired
        )
    }
}

/// Pollable snapshot of a long-running task. `created_at` is milliseconds
/// since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_id: String,
    pub status: TaskStatus,
    pub created_at: u64,
    pub ttl_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JSONRPCErrorError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListTasksRequestParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTasksResult {
    pub tasks: Vec<Task>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTaskRequestParams {
    pub task_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelTaskRequestParams {
    pub task_id: String,
}

// ---------------------------------------------------------------------------
// notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledNotificationParams {
    pub request_id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressNotificationParams {
    pub progress_token: ProgressToken,
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceUpdatedNotificationParams {
    pub uri: String,
}
