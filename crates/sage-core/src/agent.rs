//! Agent Loop (C8): drives the tool-calling dialogue between a chat model
//! and the tool registry to a final assistant text (spec.md §4.5).

use std::sync::Arc;

use crate::error::AppError;
use crate::llm::{ChatMessage, ChatModel, ChatReply};
use crate::memory::ChatMemoryWindow;
use crate::models::{Source, ToolCallRecord};
use crate::tools::{ToolContext, ToolRegistry};

/// Fixed apology returned when the step cap is exceeded (spec.md §4.5 step 5).
const STEP_CAP_APOLOGY: &str = "I'm sorry, I wasn't able to finish working through this \
    request within my allotted steps. Please try rephrasing your question or breaking it \
    into smaller parts.";

/// Fallback substituted when the model returns empty text (spec.md §4.5 step 6).
const EMPTY_REPLY_FALLBACK: &str = "I didn't produce a response for that — this can happen \
    when the request is ambiguous, when a tool call returned no usable information, or when \
    the model's output was filtered. Could you rephrase or provide more detail?";

#[derive(Debug)]
pub struct AgentTurnOutcome {
    pub text: String,
    pub degraded: bool,
    pub sources: Option<Vec<Source>>,
    pub tool_calls: Vec<ToolCallRecord>,
}

/// Runs the loop of spec.md §4.5 to completion: append the user message,
/// call the model, execute any requested tool, and repeat until final text
/// or the step cap. `memory` is mutated in place so the caller can persist
/// whatever the final window looked like if it wants to.
pub async fn run(
    model: Arc<dyn ChatModel>,
    registry: &ToolRegistry,
    memory: &mut ChatMemoryWindow,
    user_message: &str,
    tool_ctx: &ToolContext,
    step_cap: usize,
) -> Result<AgentTurnOutcome, AppError> {
    memory.push(ChatMessage::user(user_message));

    let specs = registry.specs();
    let mut malformed_in_a_row = 0u8;
    let mut tool_call_count = 0usize;

    for step in 0..step_cap {
        let reply = model
            .chat(&memory.as_slice(), &specs)
            .await
            .map_err(provider_error_to_app_error)?;

        match reply {
            ChatReply::Text(text) => {
                let final_text = if text.trim().is_empty() {
                    EMPTY_REPLY_FALLBACK.to_string()
                } else {
                    text
                };
                memory.push(ChatMessage::assistant(final_text.clone()));

                let sources = if tool_call_count > 0 {
                    let segments = tool_ctx.retrieval_sink.take();
                    if segments.is_empty() {
                        None
                    } else {
                        Some(
                            segments
                                .into_iter()
                                .map(|s| Source {
                                    filename: s.filename.unwrap_or_else(|| "unknown".to_string()),
                                    excerpt: s.text,
                                    score: s.score,
                                })
                                .collect(),
                        )
                    }
                } else {
                    None
                };

                return Ok(AgentTurnOutcome {
                    text: final_text,
                    degraded: false,
                    sources,
                    tool_calls: tool_ctx.record_sink.drain(),
                });
            }
            ChatReply::ToolCall(call) => {
                let missing = registry.missing_required_args(&call.name, &call.arguments);
                if !missing.is_empty() {
                    malformed_in_a_row += 1;
                    if malformed_in_a_row >= 2 {
                        return Err(AppError::InvalidInput(format!(
                            "model repeated a malformed tool call to '{}' (missing: {})",
                            call.name,
                            missing.join(", ")
                        )));
                    }
                    memory.push(ChatMessage::tool_result(
                        call.id.clone(),
                        format!(
                            "Error: call to '{}' is missing required argument(s): {}. \
                             Please retry with all required arguments.",
                            call.name,
                            missing.join(", ")
                        ),
                    ));
                    continue;
                }
                malformed_in_a_row = 0;

                let result = registry
                    .execute(step, &call.name, call.arguments.clone(), tool_ctx)
                    .await;
                tool_call_count += 1;
                memory.push(ChatMessage::tool_result(call.id.clone(), result));
            }
        }
    }

    memory.push(ChatMessage::assistant(STEP_CAP_APOLOGY.to_string()));
    Ok(AgentTurnOutcome {
        text: STEP_CAP_APOLOGY.to_string(),
        degraded: true,
        sources: None,
        tool_calls: tool_ctx.record_sink.drain(),
    })
}

fn provider_error_to_app_error(err: crate::llm::ProviderError) -> AppError {
    use crate::llm::ProviderError;
    match err {
        ProviderError::Timeout(secs) => {
            AppError::ProviderTimeout(format!("provider timed out after {secs}s"))
        }
        ProviderError::Network(e) => AppError::ProviderTimeout(e.to_string()),
        ProviderError::Rejected(msg) => AppError::ProviderRejected(msg),
        ProviderError::MalformedResponse(msg) => AppError::ProviderRejected(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::llm::{ChatModel, ChatReply, ProviderError, ToolSpec};
    use crate::models::ProviderKind;
    use crate::tools::{build_default_registry, RecordSink, RetrievalSink};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedModel {
        replies: std::sync::Mutex<Vec<ChatReply>>,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn new(replies: Vec<ChatReply>) -> Self {
            Self {
                replies: std::sync::Mutex::new(replies),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn chat(
            &self,
            _memory: &[ChatMessage],
            _tools: &[ToolSpec],
        ) -> Result<ChatReply, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Ok(ChatReply::Text("done".to_string()))
            } else {
                Ok(replies.remove(0))
            }
        }

        fn model_id(&self) -> &str {
            "scripted"
        }

        fn provider_kind(&self) -> ProviderKind {
            ProviderKind::Local
        }
    }

    fn test_context() -> ToolContext {
        let config = Config::for_tests();
        ToolContext {
            allowed_directory: PathBuf::from(&config.allowed_directory),
            conversation_id: "agent-test".to_string(),
            embedding_client: Arc::new(crate::embedding::EmbeddingClient::new(
                &config.embedding_api_url,
                None,
                &config.embedding_model,
            )),
            vector_client: Arc::new(
                crate::vector::VectorIndexClient::new("postgres://invalid/unused").unwrap(),
            ),
            vector_max_results: config.vector_max_results,
            vector_min_score: config.vector_min_score,
            record_sink: RecordSink::new(),
            retrieval_sink: RetrievalSink::new(),
        }
    }

    #[tokio::test]
    async fn simple_text_reply_returns_immediately() {
        let model: Arc<dyn ChatModel> =
            Arc::new(ScriptedModel::new(vec![ChatReply::Text("hello there".to_string())]));
        let registry = build_default_registry(&Config::for_tests());
        let mut memory = ChatMemoryWindow::empty(10);
        let ctx = test_context();

        let outcome = run(model, &registry, &mut memory, "hi", &ctx, 8)
            .await
            .unwrap();

        assert_eq!(outcome.text, "hello there");
        assert!(!outcome.degraded);
        assert!(outcome.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn empty_reply_is_replaced_by_fallback() {
        let model: Arc<dyn ChatModel> =
            Arc::new(ScriptedModel::new(vec![ChatReply::Text(String::new())]));
        let registry = build_default_registry(&Config::for_tests());
        let mut memory = ChatMemoryWindow::empty(10);
        let ctx = test_context();

        let outcome = run(model, &registry, &mut memory, "hi", &ctx, 8)
            .await
            .unwrap();

        assert_eq!(outcome.text, EMPTY_REPLY_FALLBACK);
    }

    #[tokio::test]
    async fn tool_call_then_final_text_executes_exactly_once() {
        let model: Arc<dyn ChatModel> = Arc::new(ScriptedModel::new(vec![
            ChatReply::ToolCall(crate::llm::ToolCall {
                id: "call-1".to_string(),
                name: "getCurrentTime".to_string(),
                arguments: serde_json::json!({}),
            }),
            ChatReply::Text("the time is now".to_string()),
        ]));
        let registry = build_default_registry(&Config::for_tests());
        let mut memory = ChatMemoryWindow::empty(10);
        let ctx = test_context();

        let outcome = run(model, &registry, &mut memory, "what time is it", &ctx, 8)
            .await
            .unwrap();

        assert_eq!(outcome.text, "the time is now");
        assert_eq!(outcome.tool_calls.len(), 1);
    }

    #[tokio::test]
    async fn step_cap_exceeded_returns_degraded_apology() {
        let replies: Vec<ChatReply> = (0..10)
            .map(|_| {
                ChatReply::ToolCall(crate::llm::ToolCall {
                    id: "x".to_string(),
                    name: "getCurrentTime".to_string(),
                    arguments: serde_json::json!({}),
                })
            })
            .collect();
        let model: Arc<dyn ChatModel> = Arc::new(ScriptedModel::new(replies));
        let registry = build_default_registry(&Config::for_tests());
        let mut memory = ChatMemoryWindow::empty(10);
        let ctx = test_context();

        let outcome = run(model, &registry, &mut memory, "loop forever", &ctx, 2)
            .await
            .unwrap();

        assert!(outcome.degraded);
        assert_eq!(outcome.text, STEP_CAP_APOLOGY);
        // 2 steps, one record per invocation
        assert_eq!(outcome.tool_calls.len(), 2);
    }

    #[tokio::test]
    async fn malformed_args_twice_in_a_row_fails_terminally() {
        let model: Arc<dyn ChatModel> = Arc::new(ScriptedModel::new(vec![
            ChatReply::ToolCall(crate::llm::ToolCall {
                id: "1".to_string(),
                name: "readFile".to_string(),
                arguments: serde_json::json!({}), // missing required 'path'
            }),
            ChatReply::ToolCall(crate::llm::ToolCall {
                id: "2".to_string(),
                name: "readFile".to_string(),
                arguments: serde_json::json!({}),
            }),
        ]));
        let registry = build_default_registry(&Config::for_tests());
        let mut memory = ChatMemoryWindow::empty(10);
        let ctx = test_context();

        let result = run(model, &registry, &mut memory, "read a file", &ctx, 8).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }
}
