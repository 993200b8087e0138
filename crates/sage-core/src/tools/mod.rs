//! Tool Registry (C4): named, typed, side-effectful functions the agent loop
//! may invoke (spec.md §4.2).
//!
//! A `ToolDescriptor` is a pure function of its arguments plus the ambient
//! context `{allowedDirectory, conversationId, embeddingClient, vectorClient,
//! recordSink}` spec.md §3 names. The record sink is request-scoped — passed
//! in through `ToolContext`, not held in a process-wide singleton, per the
//! design note in spec.md §9 against a global mutable execution-history list.

mod calculator;
mod filesystem;
mod finance;
mod knowledge;
mod stubs;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;

use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::llm::ToolSpec;
use crate::models::{ToolCallRecord, ToolCallStatus};
use crate::vector::VectorIndexClient;

/// `{name, description, parameterSchema, invoke}` (spec.md §3). `invoke`
/// takes structured JSON arguments (SPEC_FULL.md §11.4) plus the ambient
/// `ToolContext`, and returns the human-readable string the agent loop
/// re-enters into memory.
#[async_trait]
pub trait ToolDescriptor: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameter_schema(&self) -> serde_json::Value;
    async fn invoke(&self, args: serde_json::Value, ctx: &ToolContext) -> anyhow::Result<String>;
}

/// Ambient context threaded into every tool invocation. Constructed once per
/// request by the agent loop; never shared across requests.
#[derive(Clone)]
pub struct ToolContext {
    pub allowed_directory: PathBuf,
    pub conversation_id: String,
    pub embedding_client: Arc<EmbeddingClient>,
    pub vector_client: Arc<VectorIndexClient>,
    pub vector_max_results: usize,
    pub vector_min_score: f32,
    pub record_sink: RecordSink,
    pub retrieval_sink: RetrievalSink,
}

/// Request-scoped capture of the most recent `searchKnowledge` hits, so the
/// agent loop can populate an assistant message's `sources` field (spec.md
/// §3, SPEC_FULL.md §12.3) without `searchKnowledge` needing to know about
/// messages at all — it only returns the formatted string every other tool
/// returns, and separately deposits the structured matches here.
#[derive(Clone, Default)]
pub struct RetrievalSink(Arc<Mutex<Vec<crate::models::VectorSegment>>>);

impl RetrievalSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, segments: Vec<crate::models::VectorSegment>) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = segments;
        }
    }

    pub fn take(&self) -> Vec<crate::models::VectorSegment> {
        self.0
            .lock()
            .map(|mut s| std::mem::take(&mut *s))
            .unwrap_or_default()
    }
}

/// Request-scoped collector of `ToolCallRecord`s, replacing the donor's
/// process-wide execution-history singleton (spec.md §9 design note). Cloned
/// cheaply (an `Arc<Mutex<_>>` inside) so every tool invocation and the
/// agent loop share one sink for the duration of a single request.
#[derive(Clone, Default)]
pub struct RecordSink(Arc<Mutex<Vec<ToolCallRecord>>>);

impl RecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, record: ToolCallRecord) {
        if let Ok(mut records) = self.0.lock() {
            records.push(record);
        }
    }

    /// Take the accumulated records for emission as the `agent-history` SSE
    /// event. Emitted once, at turn end (spec.md §4.6).
    pub fn drain(&self) -> Vec<ToolCallRecord> {
        self.0.lock().map(|mut r| std::mem::take(&mut *r)).unwrap_or_default()
    }
}

/// A registry mapping tool names to descriptors (spec.md §4.2). Built once
/// at process start from configuration and shared read-only across requests.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolDescriptor>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn ToolDescriptor>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolDescriptor>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// The schema surface handed to the chat provider so it can emit
    /// structured arguments (spec.md §3).
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| {
                let tool = &self.tools[name];
                ToolSpec {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    parameters: tool.parameter_schema(),
                }
            })
            .collect()
    }

    /// Invoke `name` with `args`, recording exactly one `COMPLETED|FAILED`
    /// record into `ctx.record_sink` per call (spec.md §4.2, §8 scenarios 2
    /// and 5 — one invocation, one `agent-history` entry). Tool failures are
    /// recovered locally per spec.md §7: this never returns an `Err` for a
    /// registered tool, only a human-readable string that the agent loop
    /// re-enters into memory.
    pub async fn execute(
        &self,
        step: usize,
        name: &str,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> String {
        let tool = match self.get(name) {
            Some(tool) => tool,
            None => {
                ctx.record_sink.record(ToolCallRecord {
                    step,
                    tool_name: name.to_string(),
                    input: args,
                    result: Some(format!("unknown tool '{name}'")),
                    duration_ms: 0,
                    status: ToolCallStatus::Failed,
                });
                return format!("Error: unknown tool '{name}'.");
            }
        };

        let started = Instant::now();
        let outcome = tool.invoke(args.clone(), ctx).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                ctx.record_sink.record(ToolCallRecord {
                    step,
                    tool_name: name.to_string(),
                    input: args,
                    result: Some(result.clone()),
                    duration_ms,
                    status: ToolCallStatus::Completed,
                });
                result
            }
            Err(err) => {
                let message = format!("Error executing '{name}': {err}");
                ctx.record_sink.record(ToolCallRecord {
                    step,
                    tool_name: name.to_string(),
                    input: args,
                    result: Some(message.clone()),
                    duration_ms,
                    status: ToolCallStatus::Failed,
                });
                message
            }
        }
    }

    /// Check a tool call's arguments against the registered tool's declared
    /// `required` parameters (spec.md §4.5). Shallow presence check — the
    /// schema only needs to be rich enough for the provider to emit
    /// structured arguments, not a full JSON-Schema validator.
    pub fn missing_required_args(&self, name: &str, args: &serde_json::Value) -> Vec<String> {
        let Some(tool) = self.get(name) else {
            return Vec::new();
        };
        let schema = tool.parameter_schema();
        let Some(required) = schema.get("required").and_then(|r| r.as_array()) else {
            return Vec::new();
        };

        required
            .iter()
            .filter_map(|r| r.as_str())
            .filter(|key| args.get(key).map(|v| v.is_null()).unwrap_or(true))
            .map(|s| s.to_string())
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registers every tool spec.md §4.2 names, in the order it lists them.
pub fn build_default_registry(config: &Config) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(knowledge::SearchKnowledgeTool));
    registry.register(Arc::new(filesystem::ReadFileTool::new(
        config.file_read_max_chars,
    )));
    registry.register(Arc::new(filesystem::ListDirectoryTool));
    registry.register(Arc::new(filesystem::SearchFilesTool::new(
        config.search_files_max_bytes,
    )));
    registry.register(Arc::new(filesystem::GetFileInfoTool));
    registry.register(Arc::new(calculator::CalculateTool::new(
        config.financial_keywords.clone(),
    )));
    registry.register(Arc::new(finance::CalculateAmortizationTool));
    registry.register(Arc::new(finance::CalculateIrrTool));
    registry.register(Arc::new(finance::CalculateBondPriceTool));
    registry.register(Arc::new(finance::CalculateBondDurationTool));
    registry.register(Arc::new(finance::CalculateOptionPriceTool));
    registry.register(Arc::new(stubs::GetCurrentTimeTool));
    registry.register(Arc::new(stubs::GetWeatherTool));

    registry
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;
    use crate::config::Config;

    /// A `ToolContext` wired against an unreachable database/embedding
    /// endpoint, for tools whose unit tests never exercise the I/O paths
    /// (the calculator, finance tools, and stubs).
    pub fn dummy_context() -> ToolContext {
        let config = Config::for_tests();
        ToolContext {
            allowed_directory: PathBuf::from(&config.allowed_directory),
            conversation_id: "agent-test".to_string(),
            embedding_client: Arc::new(EmbeddingClient::new(
                &config.embedding_api_url,
                config.embedding_api_key.as_deref(),
                &config.embedding_model,
            )),
            vector_client: Arc::new(
                VectorIndexClient::new("postgres://invalid/unused")
                    .expect("lazy connection construction never touches the network"),
            ),
            vector_max_results: config.vector_max_results,
            vector_min_score: config.vector_min_score,
            record_sink: RecordSink::new(),
            retrieval_sink: RetrievalSink::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sink_drains_exactly_what_was_recorded() {
        let sink = RecordSink::new();
        sink.record(ToolCallRecord {
            step: 0,
            tool_name: "getCurrentTime".to_string(),
            input: serde_json::json!({}),
            result: None,
            duration_ms: 0,
            status: ToolCallStatus::Started,
        });
        let drained = sink.drain();
        assert_eq!(drained.len(), 1);
        assert!(sink.drain().is_empty());
    }

    #[test]
    fn registry_specs_are_sorted_and_non_empty() {
        let config = crate::config::Config::for_tests();
        let registry = build_default_registry(&config);
        let specs = registry.specs();
        assert!(specs.len() >= 12);
        let mut sorted = specs.clone();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            specs.iter().map(|s| &s.name).collect::<Vec<_>>(),
            sorted.iter().map(|s| &s.name).collect::<Vec<_>>()
        );
    }
}
