//! Capability-keyed handler registration.
//!
//! Hosts describe what they serve through an explicit builder: each tool,
//! resource, or prompt carries its metadata plus a type-erased async
//! handler. The advertised [`ServerCapabilities`] are derived from what was
//! actually registered.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use mcp_types::CallToolResult;
use mcp_types::CompleteRequestParams;
use mcp_types::CompleteResult;
use mcp_types::GetPromptResult;
use mcp_types::Prompt;
use mcp_types::PromptArgument;
use mcp_types::ReadResourceResult;
use mcp_types::Resource;
use mcp_types::ResourceTemplate;
use mcp_types::ServerCapabilities;
use mcp_types::ServerCapabilitiesPrompts;
use mcp_types::ServerCapabilitiesResources;
use mcp_types::ServerCapabilitiesTools;
use mcp_types::Tool;
use mcp_types::ToolInputSchema;
use schemars::JsonSchema;
use serde_json::Value;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::context::RequestContext;
use crate::error::HandlerError;

pub type HandlerFuture<T> = Pin<Box<dyn Future<Output = Result<T, HandlerError>> + Send>>;

type ToolFn =
    Arc<dyn Fn(RequestContext, Option<Value>, CancellationToken) -> HandlerFuture<CallToolResult> + Send + Sync>;
type ResourceFn = Arc<
    dyn Fn(RequestContext, ResourceRequest, CancellationToken) -> HandlerFuture<ReadResourceResult>
        + Send
        + Sync,
>;
type PromptFn =
    Arc<dyn Fn(RequestContext, Option<Value>, CancellationToken) -> HandlerFuture<GetPromptResult> + Send + Sync>;
type CompletionFn = Arc<
    dyn Fn(RequestContext, CompleteRequestParams, CancellationToken) -> HandlerFuture<CompleteResult>
        + Send
        + Sync,
>;

/// A matched `resources/read` target: the concrete URI plus any variables
/// captured from the registration's template.
pub struct ResourceRequest {
    pub uri: String,
    pub variables: HashMap<String, String>,
}

pub struct ToolRegistration {
    spec: Tool,
    handler: ToolFn,
}

impl ToolRegistration {
    pub fn spec(&self) -> &Tool {
        &self.spec
    }

    pub fn invoke(
        &self,
        ctx: RequestContext,
        arguments: Option<Value>,
        cancel: CancellationToken,
    ) -> HandlerFuture<CallToolResult> {
        (self.handler)(ctx, arguments, cancel)
    }
}

pub struct ResourceRegistration {
    uri_template: String,
    name: String,
    description: Option<String>,
    mime_type: Option<String>,
    handler: ResourceFn,
}

impl ResourceRegistration {
    pub fn invoke(
        &self,
        ctx: RequestContext,
        request: ResourceRequest,
        cancel: CancellationToken,
    ) -> HandlerFuture<ReadResourceResult> {
        (self.handler)(ctx, request, cancel)
    }
}

pub struct PromptRegistration {
    spec: Prompt,
    handler: PromptFn,
}

impl PromptRegistration {
    pub fn spec(&self) -> &Prompt {
        &self.spec
    }

    pub fn invoke(
        &self,
        ctx: RequestContext,
        arguments: Option<Value>,
        cancel: CancellationToken,
    ) -> HandlerFuture<GetPromptResult> {
        (self.handler)(ctx, arguments, cancel)
    }
}

#[derive(Default)]
pub struct HandlerRegistry {
    tools: Vec<ToolRegistration>,
    resources: Vec<ResourceRegistration>,
    prompts: Vec<PromptRegistration>,
    completion: Option<CompletionFn>,
    expose_tasks: bool,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool with an explicit wire-level schema.
    pub fn tool<F>(mut self, spec: Tool, handler: F) -> Self
    where
        F: Fn(RequestContext, Option<Value>, CancellationToken) -> HandlerFuture<CallToolResult>
            + Send
            + Sync
            + 'static,
    {
        self.tools.push(ToolRegistration {
            spec,
            handler: Arc::new(handler),
        });
        self
    }

    /// Register a tool whose input schema is derived from `P`.
    pub fn tool_for<P, F>(self, name: &str, description: &str, handler: F) -> Self
    where
        P: JsonSchema,
        F: Fn(RequestContext, Option<Value>, CancellationToken) -> HandlerFuture<CallToolResult>
            + Send
            + Sync
            + 'static,
    {
        let spec = Tool {
            name: name.to_string(),
            title: None,
            description: Some(description.to_string()),
            input_schema: input_schema_for::<P>(),
            output_schema: None,
            annotations: None,
        };
        self.tool(spec, handler)
    }

    /// Register a resource. Static URIs are templates without variables.
    pub fn resource<F>(
        mut self,
        uri_template: &str,
        name: &str,
        description: Option<String>,
        mime_type: Option<String>,
        handler: F,
    ) -> Self
    where
        F: Fn(RequestContext, ResourceRequest, CancellationToken) -> HandlerFuture<ReadResourceResult>
            + Send
            + Sync
            + 'static,
    {
        self.resources.push(ResourceRegistration {
            uri_template: uri_template.to_string(),
            name: name.to_string(),
            description,
            mime_type,
            handler: Arc::new(handler),
        });
        self
    }

    pub fn prompt<F>(
        mut self,
        name: &str,
        description: Option<String>,
        arguments: Vec<PromptArgument>,
        handler: F,
    ) -> Self
    where
        F: Fn(RequestContext, Option<Value>, CancellationToken) -> HandlerFuture<GetPromptResult>
            + Send
            + Sync
            + 'static,
    {
        self.prompts.push(PromptRegistration {
            spec: Prompt {
                name: name.to_string(),
                title: None,
                description,
                arguments: if arguments.is_empty() {
                    None
                } else {
                    Some(arguments)
                },
            },
            handler: Arc::new(handler),
        });
        self
    }

    pub fn completion<F>(mut self, handler: F) -> Self
    where
        F: Fn(RequestContext, CompleteRequestParams, CancellationToken) -> HandlerFuture<CompleteResult>
            + Send
            + Sync
            + 'static,
    {
        self.completion = Some(Arc::new(handler));
        self
    }

    /// Advertise the `tasks/*` method family.
    pub fn expose_tasks(mut self) -> Self {
        self.expose_tasks = true;
        self
    }

    // ----- lookup --------------------------------------------------------

    pub fn find_tool(&self, name: &str) -> Option<&ToolRegistration> {
        self.tools.iter().find(|t| t.spec.name == name)
    }

    pub fn find_prompt(&self, name: &str) -> Option<&PromptRegistration> {
        self.prompts.iter().find(|p| p.spec.name == name)
    }

    /// Resolve a concrete URI against the registrations, static entries
    /// first so an exact URI shadows an overlapping template.
    pub fn find_resource(&self, uri: &str) -> Option<(&ResourceRegistration, ResourceRequest)> {
        let statics = self
            .resources
            .iter()
            .filter(|r| !crate::uri_template::is_template(&r.uri_template));
        let templated = self
            .resources
            .iter()
            .filter(|r| crate::uri_template::is_template(&r.uri_template));

        for registration in statics.chain(templated) {
            if let Some(variables) = crate::uri_template::match_uri(&registration.uri_template, uri)
            {
                return Some((
                    registration,
                    ResourceRequest {
                        uri: uri.to_string(),
                        variables,
                    },
                ));
            }
        }
        None
    }

    pub fn completion_handler(&self) -> Option<&CompletionFn> {
        self.completion.as_ref()
    }

    pub fn tasks_exposed(&self) -> bool {
        self.expose_tasks
    }

    // ----- listing -------------------------------------------------------

    pub fn list_tools(&self) -> Vec<Tool> {
        self.tools.iter().map(|t| t.spec.clone()).collect()
    }

    pub fn list_prompts(&self) -> Vec<Prompt> {
        self.prompts.iter().map(|p| p.spec.clone()).collect()
    }

    pub fn list_resources(&self) -> Vec<Resource> {
        self.resources
            .iter()
            .filter(|r| !crate::uri_template::is_template(&r.uri_template))
            .map(|r| Resource {
                uri: r.uri_template.clone(),
                name: r.name.clone(),
                title: None,
                description: r.description.clone(),
                mime_type: r.mime_type.clone(),
                size: None,
            })
            .collect()
    }

    pub fn list_resource_templates(&self) -> Vec<ResourceTemplate> {
        self.resources
            .iter()
            .filter(|r| crate::uri_template::is_template(&r.uri_template))
            .map(|r| ResourceTemplate {
                uri_template: r.uri_template.clone(),
                name: r.name.clone(),
                title: None,
                description: r.description.clone(),
                mime_type: r.mime_type.clone(),
            })
            .collect()
    }

    /// Capabilities follow from what was registered; nothing is advertised
    /// that cannot be served.
    pub fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            completions: self.completion.as_ref().map(|_| json!({})),
            experimental: None,
            logging: Some(json!({})),
            prompts: (!self.prompts.is_empty()).then_some(ServerCapabilitiesPrompts {
                list_changed: Some(true),
            }),
            resources: (!self.resources.is_empty()).then_some(ServerCapabilitiesResources {
                list_changed: Some(true),
                subscribe: Some(true),
            }),
            tools: (!self.tools.is_empty()).then_some(ServerCapabilitiesTools {
                list_changed: Some(true),
            }),
            tasks: self.expose_tasks.then(|| json!({})),
        }
    }
}

/// JSON Schema for `P`, flattened into the wire shape `tools/list` carries.
pub fn input_schema_for<P: JsonSchema>() -> ToolInputSchema {
    let schema = schemars::r#gen::SchemaGenerator::default().into_root_schema_for::<P>();
    let value = serde_json::to_value(schema).unwrap_or_else(|_| json!({"type": "object"}));
    ToolInputSchema {
        r#type: "object".to_string(),
        properties: value.get("properties").cloned(),
        required: value
            .get("required")
            .and_then(|r| serde_json::from_value(r.clone()).ok()),
    }
}
