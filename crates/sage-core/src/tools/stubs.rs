//! `getCurrentTime` and `getWeather`: trivial stubs kept for contract
//! stability (spec.md §4.2). Neither has a real backing service in this
//! core; a production deployment would replace `getWeather` with a real
//! provider without changing the tool's name or schema.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use super::{ToolContext, ToolDescriptor};

pub struct GetCurrentTimeTool;

#[async_trait]
impl ToolDescriptor for GetCurrentTimeTool {
    fn name(&self) -> &str {
        "getCurrentTime"
    }

    fn description(&self) -> &str {
        "Return the current UTC date and time in ISO 8601 format."
    }

    fn parameter_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }

    async fn invoke(&self, _args: serde_json::Value, _ctx: &ToolContext) -> anyhow::Result<String> {
        Ok(Utc::now().to_rfc3339())
    }
}

pub struct GetWeatherTool;

#[async_trait]
impl ToolDescriptor for GetWeatherTool {
    fn name(&self) -> &str {
        "getWeather"
    }

    fn description(&self) -> &str {
        "Return a placeholder weather report for a named city. Not backed by a real weather \
         service in this deployment."
    }

    fn parameter_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"]
        })
    }

    async fn invoke(&self, args: serde_json::Value, _ctx: &ToolContext) -> anyhow::Result<String> {
        let city = args
            .get("city")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("'city' argument required"))?;
        Ok(format!(
            "Weather lookup for {city} is not available in this deployment; this is a \
             placeholder response."
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::tests_support::dummy_context;

    #[tokio::test]
    async fn current_time_is_rfc3339() {
        let tool = GetCurrentTimeTool;
        let ctx = dummy_context();
        let result = tool.invoke(json!({}), &ctx).await.unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&result).is_ok());
    }

    #[tokio::test]
    async fn weather_requires_city() {
        let tool = GetWeatherTool;
        let ctx = dummy_context();
        assert!(tool.invoke(json!({}), &ctx).await.is_err());
    }
}
