//! Built-in registry served by the `mcp-server` binary.
//!
//! A small conformance surface exercising every engine seam: plain and
//! long-running tools, cancellable sleeps, static and templated resources,
//! a prompt with completion, and a logging probe. Integration tests drive
//! the binary through these.

use std::sync::Arc;
use std::time::Duration;

use mcp_runtime::HandlerError;
use mcp_runtime::HandlerRegistry;
use mcp_runtime::RequestError;
use mcp_runtime::RequestOptions;
use mcp_runtime::SessionManager;
use mcp_runtime::TaskStore;
use mcp_types::CallToolResult;
use mcp_types::CompleteResult;
use mcp_types::CompleteResultCompletion;
use mcp_types::CompletionReference;
use mcp_types::ContentBlock;
use mcp_types::CreateMessageRequestParams;
use mcp_types::ElicitRequestParams;
use mcp_types::ElicitRequestParamsRequestedSchema;
use mcp_types::ElicitResultAction;
use mcp_types::GetPromptResult;
use mcp_types::LoggingLevel;
use mcp_types::PromptArgument;
use mcp_types::PromptMessage;
use mcp_types::ReadResourceResult;
use mcp_types::ResourceContents;
use mcp_types::Role;
use mcp_types::SamplingMessage;
use mcp_types::TextContent;
use mcp_types::TextResourceContents;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;

#[derive(Debug, Deserialize, JsonSchema)]
struct EchoArgs {
    message: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SleepArgs {
    /// How long to sleep, in milliseconds.
    ms: u64,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct TouchResourceArgs {
    uri: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct StartTaskArgs {
    /// Task TTL in milliseconds; the store default applies when absent.
    ttl_ms: Option<u64>,
    /// When set, the task completes on its own after this long.
    work_ms: Option<u64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct LogMessageArgs {
    /// Severity name, e.g. "debug" or "warning".
    level: String,
    message: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct GreetingArgs {
    name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RequestSamplingArgs {
    prompt: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RequestApprovalArgs {
    /// Human-readable description of the action needing approval.
    action: String,
}

fn parse_args<T: serde::de::DeserializeOwned>(arguments: Option<Value>) -> Result<T, HandlerError> {
    serde_json::from_value(arguments.unwrap_or_else(|| json!({})))
        .map_err(|e| HandlerError::InvalidParams(e.to_string()))
}

fn text_result(text: String) -> CallToolResult {
    CallToolResult {
        content: vec![ContentBlock::Text(TextContent {
            text,
            annotations: None,
        })],
        is_error: None,
        structured_content: None,
    }
}

/// The registry the reference binary serves.
pub fn reference_registry(
    session_manager: &Arc<SessionManager>,
    tasks: &TaskStore,
) -> HandlerRegistry {
    let manager = session_manager.clone();
    let task_store = tasks.clone();

    HandlerRegistry::new()
        .tool_for::<EchoArgs, _>("echo", "Echo the message back verbatim", |_ctx, args, _cancel| {
            Box::pin(async move {
                let args: EchoArgs = parse_args(args)?;
                Ok(text_result(args.message))
            })
        })
        .tool_for::<SleepArgs, _>(
            "sleep",
            "Sleep for the given number of milliseconds, reporting progress",
            |ctx, args, cancel| {
                Box::pin(async move {
                    let args: SleepArgs = parse_args(args)?;
                    let progress = ctx.progress();
                    let step = Duration::from_millis(args.ms.max(1) / 10 + 1);
                    for i in 0..10u32 {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                // The response is suppressed anyway; stop
                                // doing work promptly.
                                return Ok(text_result("cancelled".to_string()));
                            }
                            _ = tokio::time::sleep(step) => {
                                progress.emit(f64::from(i + 1) / 10.0, Some(1.0), None);
                            }
                        }
                    }
                    Ok(text_result(format!("slept {} ms", args.ms)))
                })
            },
        )
        .tool_for::<TouchResourceArgs, _>(
            "touch_resource",
            "Mark a resource as updated, fanning out to subscribers",
            move |_ctx, args, _cancel| {
                let manager = manager.clone();
                Box::pin(async move {
                    let args: TouchResourceArgs = parse_args(args)?;
                    let delivered = manager.notify_resource_updated(&args.uri).await;
                    Ok(CallToolResult {
                        content: vec![],
                        is_error: None,
                        structured_content: Some(json!({ "delivered": delivered })),
                    })
                })
            },
        )
        .tool_for::<StartTaskArgs, _>(
            "start_task",
            "Create a long-running task; poll it via tasks/get",
            move |ctx, args, _cancel| {
                let task_store = task_store.clone();
                Box::pin(async move {
                    let args: StartTaskArgs = parse_args(args)?;
                    let handle = task_store
                        .create(
                            ctx.request_id().clone(),
                            ctx.session_id().to_string(),
                            args.ttl_ms.map(Duration::from_millis),
                        )
                        .await;
                    let task_id = handle.task_id().to_string();
                    if let Some(work_ms) = args.work_ms {
                        let cancel = handle.cancellation();
                        tokio::spawn(async move {
                            tokio::select! {
                                _ = cancel.cancelled() => {}
                                _ = tokio::time::sleep(Duration::from_millis(work_ms)) => {
                                    handle.complete(json!({ "ok": true })).await;
                                }
                            }
                        });
                    }
                    Ok(CallToolResult {
                        content: vec![],
                        is_error: None,
                        structured_content: Some(json!({ "taskId": task_id })),
                    })
                })
            },
        )
        .tool_for::<LogMessageArgs, _>(
            "log_message",
            "Emit a log record through the session's logging channel",
            |ctx, args, _cancel| {
                Box::pin(async move {
                    let args: LogMessageArgs = parse_args(args)?;
                    let level: LoggingLevel = serde_json::from_value(json!(args.level))
                        .map_err(|_| {
                            HandlerError::InvalidParams(format!("unknown level: {}", args.level))
                        })?;
                    ctx.log(level, Some("reference".to_string()), json!(args.message))
                        .await;
                    Ok(text_result("logged".to_string()))
                })
            },
        )
        .tool_for::<RequestSamplingArgs, _>(
            "request_sampling",
            "Ask the client to run a model completion over the prompt",
            |ctx, args, _cancel| {
                Box::pin(async move {
                    let args: RequestSamplingArgs = parse_args(args)?;
                    let params = CreateMessageRequestParams {
                        messages: vec![SamplingMessage {
                            role: Role::User,
                            content: ContentBlock::Text(TextContent {
                                text: args.prompt,
                                annotations: None,
                            }),
                        }],
                        max_tokens: 64,
                        system_prompt: None,
                        include_context: None,
                        temperature: None,
                        stop_sequences: None,
                        model_preferences: None,
                        metadata: None,
                    };
                    match ctx.sample(params, RequestOptions::default()).await {
                        Ok(result) => {
                            let text = match result.content {
                                ContentBlock::Text(t) => t.text,
                                _ => "<non-text completion>".to_string(),
                            };
                            Ok(text_result(format!("sampled: {text}")))
                        }
                        Err(RequestError::Rpc(error)) => Ok(CallToolResult {
                            content: vec![ContentBlock::Text(TextContent {
                                text: format!("sampling rejected: code {}", error.code),
                                annotations: None,
                            })],
                            is_error: Some(true),
                            structured_content: None,
                        }),
                        Err(e) => Err(HandlerError::Internal(e.to_string())),
                    }
                })
            },
        )
        .tool_for::<RequestApprovalArgs, _>(
            "request_approval",
            "Elicit a yes/no approval from the client's user",
            |ctx, args, _cancel| {
                Box::pin(async move {
                    let args: RequestApprovalArgs = parse_args(args)?;
                    let params = ElicitRequestParams {
                        message: format!("Allow the server to {}?", args.action),
                        requested_schema: ElicitRequestParamsRequestedSchema {
                            r#type: "object".to_string(),
                            properties: json!({}),
                            required: None,
                        },
                    };
                    match ctx.elicit(params, RequestOptions::default()).await {
                        Ok(result) => {
                            let verdict = match result.action {
                                ElicitResultAction::Accept => "approved",
                                ElicitResultAction::Decline => "declined",
                                ElicitResultAction::Cancel => "cancelled",
                            };
                            Ok(text_result(verdict.to_string()))
                        }
                        Err(RequestError::Rpc(error)) => Ok(CallToolResult {
                            content: vec![ContentBlock::Text(TextContent {
                                text: format!("elicitation rejected: code {}", error.code),
                                annotations: None,
                            })],
                            is_error: Some(true),
                            structured_content: None,
                        }),
                        Err(e) => Err(HandlerError::Internal(e.to_string())),
                    }
                })
            },
        )
        .resource(
            "memo://welcome",
            "welcome",
            Some("A static welcome memo".to_string()),
            Some("text/plain".to_string()),
            |_ctx, request, _cancel| {
                Box::pin(async move {
                    Ok(ReadResourceResult {
                        contents: vec![ResourceContents::Text(TextResourceContents {
                            uri: request.uri,
                            mime_type: Some("text/plain".to_string()),
                            text: "welcome to the reference server".to_string(),
                        })],
                    })
                })
            },
        )
        .resource(
            "memo://{slug}",
            "memo",
            Some("Any memo by slug".to_string()),
            Some("text/plain".to_string()),
            |_ctx, request, _cancel| {
                Box::pin(async move {
                    let slug = request
                        .variables
                        .get("slug")
                        .cloned()
                        .unwrap_or_default();
                    Ok(ReadResourceResult {
                        contents: vec![ResourceContents::Text(TextResourceContents {
                            uri: request.uri,
                            mime_type: Some("text/plain".to_string()),
                            text: format!("memo: {slug}"),
                        })],
                    })
                })
            },
        )
        .prompt(
            "greeting",
            Some("A short greeting".to_string()),
            vec![PromptArgument {
                name: "name".to_string(),
                description: Some("Who to greet".to_string()),
                required: Some(true),
            }],
            |_ctx, arguments, _cancel| {
                Box::pin(async move {
                    let args: GreetingArgs = parse_args(arguments)?;
                    Ok(GetPromptResult {
                        description: None,
                        messages: vec![PromptMessage {
                            role: Role::User,
                            content: ContentBlock::Text(TextContent {
                                text: format!("Hello, {}!", args.name),
                                annotations: None,
                            }),
                        }],
                    })
                })
            },
        )
        .completion(|_ctx, params, _cancel| {
            Box::pin(async move {
                let values = match &params.r#ref {
                    CompletionReference::Prompt(_) => ["alice", "bob", "carol"]
                        .iter()
                        .filter(|v| v.starts_with(params.argument.value.as_str()))
                        .map(|v| (*v).to_string())
                        .collect(),
                    CompletionReference::Resource(_) => vec![],
                };
                Ok(CompleteResult {
                    completion: CompleteResultCompletion {
                        values,
                        total: None,
                        has_more: Some(false),
                    },
                })
            })
        })
        .expose_tasks()
}
