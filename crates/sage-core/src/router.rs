//! Router (C7): chooses one chat-model handle for the current request from
//! policy + request features (spec.md §4.1).
//!
//! A pure function of `(config, message) -> (handle, RoutingDecision)` with
//! no back-reference into the chat service, per the cyclic-knowledge design
//! note in spec.md §9 — the router never asks the service for anything.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;

use crate::config::{Config, RoutingStrategy};
use crate::llm::ChatModel;
use crate::models::{BusinessType, ProviderKind, RoutingDecision};

/// The two chat-model handles the router picks between. Held by the caller
/// (the HTTP handler), not by the router itself — the router is stateless.
pub struct ModelRegistry {
    pub local: Arc<dyn ChatModel>,
    pub remote: Arc<dyn ChatModel>,
}

impl ModelRegistry {
    fn resolve(&self, model_id: &str) -> Option<Arc<dyn ChatModel>> {
        if model_id == self.local.model_id() {
            Some(self.local.clone())
        } else if model_id == self.remote.model_id() {
            Some(self.remote.clone())
        } else {
            None
        }
    }
}

/// Detect the coarse business type of a message by deterministic,
/// first-match-wins keyword rules (spec.md §4.1). Keyword lists are
/// configuration, not code, so callers can extend them without a rebuild.
pub fn detect_business_type(
    text: &str,
    tool_keywords: &[String],
    complexity_keywords: &[String],
) -> BusinessType {
    let trimmed = text.trim();

    if tool_keywords.iter().any(|kw| text.contains(kw.as_str())) {
        return BusinessType::ToolCalling;
    }
    if complexity_keywords
        .iter()
        .any(|kw| text.contains(kw.as_str()))
    {
        return BusinessType::ComplexQuery;
    }
    if trimmed.chars().count() > 200 {
        return BusinessType::LongContext;
    }
    if trimmed.is_empty() {
        return BusinessType::GeneralChat;
    }
    BusinessType::SimpleQa
}

/// Select one chat-model handle and record the decision. Never fails the
/// request: an unregistered configured model silently falls back to local
/// and the substitution is reported in the decision's `reason`.
pub fn route(
    config: &Config,
    models: &ModelRegistry,
    message: &str,
) -> (Arc<dyn ChatModel>, RoutingDecision) {
    match config.routing_strategy {
        RoutingStrategy::Percentage => route_percentage(config, models),
        RoutingStrategy::BusinessType => route_business_type(config, models, message),
    }
}

fn route_percentage(config: &Config, models: &ModelRegistry) -> (Arc<dyn ChatModel>, RoutingDecision) {
    let roll: u8 = rand::thread_rng().gen_range(0..100);
    let use_remote = (roll as u32) < (config.percentage_remote as u32);

    let handle = if use_remote {
        models.remote.clone()
    } else {
        models.local.clone()
    };

    let decision = RoutingDecision {
        model_id: handle.model_id().to_string(),
        provider: handle.provider_kind(),
        business_type: None,
        reason: format!(
            "PERCENTAGE strategy: roll={roll} < pRemote={} -> {}",
            config.percentage_remote,
            if use_remote { "remote" } else { "local" }
        ),
    };
    (handle, decision)
}

fn route_business_type(
    config: &Config,
    models: &ModelRegistry,
    message: &str,
) -> (Arc<dyn ChatModel>, RoutingDecision) {
    let business_type =
        detect_business_type(message, &config.tool_keywords, &config.complexity_keywords);

    let mapped_model_id = config.business_type_map.get(business_type.as_str());

    let (handle, reason) = match mapped_model_id.and_then(|id| models.resolve(id)) {
        Some(handle) => (
            handle,
            format!(
                "BUSINESS_TYPE strategy: {} -> configured model '{}'",
                business_type.as_str(),
                mapped_model_id.unwrap()
            ),
        ),
        None => {
            let reason = match mapped_model_id {
                Some(unregistered) => format!(
                    "BUSINESS_TYPE strategy: {} -> configured model '{}' is not registered, \
                     falling back to local",
                    business_type.as_str(),
                    unregistered
                ),
                None => format!(
                    "BUSINESS_TYPE strategy: {} has no configured mapping, falling back to local",
                    business_type.as_str()
                ),
            };
            if mapped_model_id.is_some() {
                tracing::warn!(%reason, "router falling back to local model");
            }
            (models.local.clone(), reason)
        }
    };

    let decision = RoutingDecision {
        model_id: handle.model_id().to_string(),
        provider: handle.provider_kind(),
        business_type: Some(business_type),
        reason,
    };
    (handle, decision)
}

pub fn default_business_type_map() -> HashMap<String, String> {
    HashMap::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords() -> (Vec<String>, Vec<String>) {
        (
            vec![
                "计算".to_string(),
                "查询".to_string(),
                "天气".to_string(),
                "时间".to_string(),
                "IRR".to_string(),
                "NPV".to_string(),
                "债券".to_string(),
                "期权".to_string(),
                "摊销".to_string(),
            ],
            vec![
                "分析".to_string(),
                "比较".to_string(),
                "总结".to_string(),
                "推理".to_string(),
                "判断".to_string(),
                "评估".to_string(),
                "建议".to_string(),
                "方案".to_string(),
            ],
        )
    }

    #[test]
    fn detects_tool_calling_first() {
        let (tool_kw, complexity_kw) = keywords();
        // Contains both a tool keyword and a complexity keyword; tool wins (first match).
        let bt = detect_business_type("请分析并计算这笔贷款的摊销表", &tool_kw, &complexity_kw);
        assert_eq!(bt, BusinessType::ToolCalling);
    }

    #[test]
    fn detects_complex_query() {
        let (tool_kw, complexity_kw) = keywords();
        let bt = detect_business_type("请比较这两份方案的优劣", &tool_kw, &complexity_kw);
        assert_eq!(bt, BusinessType::ComplexQuery);
    }

    #[test]
    fn boundary_200_chars_is_simple_qa() {
        let (tool_kw, complexity_kw) = keywords();
        let text = "a".repeat(200);
        assert_eq!(
            detect_business_type(&text, &tool_kw, &complexity_kw),
            BusinessType::SimpleQa
        );
    }

    #[test]
    fn boundary_201_chars_is_long_context() {
        let (tool_kw, complexity_kw) = keywords();
        let text = "a".repeat(201);
        assert_eq!(
            detect_business_type(&text, &tool_kw, &complexity_kw),
            BusinessType::LongContext
        );
    }

    #[test]
    fn empty_message_is_general_chat() {
        let (tool_kw, complexity_kw) = keywords();
        assert_eq!(
            detect_business_type("   ", &tool_kw, &complexity_kw),
            BusinessType::GeneralChat
        );
    }

    #[test]
    fn plain_short_message_is_simple_qa() {
        let (tool_kw, complexity_kw) = keywords();
        assert_eq!(
            detect_business_type("你好", &tool_kw, &complexity_kw),
            BusinessType::SimpleQa
        );
    }
}
