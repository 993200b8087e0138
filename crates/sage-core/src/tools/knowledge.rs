//! `searchKnowledge` tool: embeds the query (C1), searches the vector index
//! (C2), and formats the surviving matches for the model (spec.md §4.2).

use async_trait::async_trait;
use serde_json::json;

use super::{ToolContext, ToolDescriptor};

pub struct SearchKnowledgeTool;

const DEFAULT_MAX_RESULTS: usize = 5;

#[async_trait]
impl ToolDescriptor for SearchKnowledgeTool {
    fn name(&self) -> &str {
        "searchKnowledge"
    }

    fn description(&self) -> &str {
        "Search the knowledge base for passages relevant to a query. Use this before \
         answering questions that depend on facts from uploaded documents."
    }

    fn parameter_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "The search query"},
                "maxResults": {"type": "integer", "description": "Maximum matches to return (default 5)"}
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: serde_json::Value, ctx: &ToolContext) -> anyhow::Result<String> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("searchKnowledge requires a 'query' argument"))?;

        let max_results = args
            .get("maxResults")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_RESULTS.min(ctx.vector_max_results.max(1)))
            .max(1);

        let embedding = ctx.embedding_client.embed(query).await?;
        let matches = ctx
            .vector_client
            .search(&embedding, max_results, ctx.vector_min_score)?;

        ctx.retrieval_sink.set(matches.clone());

        if matches.is_empty() {
            return Ok(
                "No knowledge base passages matched this query above the similarity threshold."
                    .to_string(),
            );
        }

        let formatted = matches
            .iter()
            .map(|m| {
                format!(
                    "[source={}, score={:.3}]\n{}",
                    m.filename.as_deref().unwrap_or("unknown"),
                    m.score,
                    m.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n---\n");

        Ok(formatted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_schema_requires_query() {
        let tool = SearchKnowledgeTool;
        let schema = tool.parameter_schema();
        assert_eq!(schema["required"][0], "query");
    }
}
