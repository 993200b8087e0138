//! Process configuration, loaded once at startup from the environment.

use anyhow::{Context, Result};
use std::collections::HashMap;

/// Model routing strategy. See `router.rs` for the selection algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingStrategy {
    Percentage,
    BusinessType,
}

impl RoutingStrategy {
    fn from_env_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "PERCENTAGE" => Ok(Self::Percentage),
            "BUSINESS_TYPE" => Ok(Self::BusinessType),
            other => anyhow::bail!("unknown ROUTING_STRATEGY '{other}'"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model_name: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub http_host: String,
    pub http_port: u16,

    /// Routing (C7)
    pub routing_strategy: RoutingStrategy,
    pub percentage_remote: u8,
    pub business_type_map: HashMap<String, String>,
    pub tool_keywords: Vec<String>,
    pub complexity_keywords: Vec<String>,

    /// Chat memory window (C6)
    pub context_window: usize,

    /// Retrieval (C1 + C2)
    pub embedding_api_url: String,
    pub embedding_api_key: Option<String>,
    pub embedding_model: String,
    pub vector_max_results: usize,
    pub vector_min_score: f32,

    /// Chat providers (C3)
    pub local_model: ModelConfig,
    pub remote_model: ModelConfig,

    /// Tools (C4)
    pub allowed_directory: String,
    pub agent_step_cap: usize,
    pub file_read_max_chars: usize,
    pub search_files_max_bytes: u64,
    pub financial_keywords: Vec<String>,

    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(v) => v
            .parse()
            .with_context(|| format!("{key} must be a valid value, got '{v}'")),
        Err(_) => Ok(default),
    }
}

fn parse_keyword_map(raw: &str) -> HashMap<String, String> {
    // "TOOL_CALLING=qwen-remote,COMPLEX_QUERY=qwen-remote"
    raw.split(',')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?.trim();
            let value = parts.next()?.trim();
            if key.is_empty() || value.is_empty() {
                None
            } else {
                Some((key.to_string(), value.to_string()))
            }
        })
        .collect()
}

fn parse_keyword_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Default business-type keyword lists, matching spec.md §4.1. Configuration
/// supplied lists must produce identical behaviour to these defaults.
const DEFAULT_TOOL_KEYWORDS: &str =
    "计算,查询,天气,时间,IRR,NPV,债券,期权,摊销";
const DEFAULT_COMPLEXITY_KEYWORDS: &str =
    "分析,比较,总结,推理,判断,评估,建议,方案";
/// Default financial-calculation keyword list the `calculate` tool refuses
/// in favour of the specialised finance tools (spec.md §4.2).
const DEFAULT_FINANCIAL_KEYWORDS: &str =
    "本金,利率,摊销,贷款,月供,还款,IRR,NPV,久期,期权";

impl Config {
    pub fn from_env() -> Result<Self> {
        let routing_strategy =
            RoutingStrategy::from_env_str(&env_or("ROUTING_STRATEGY", "PERCENTAGE"))?;

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            http_host: env_or("HTTP_HOST", "0.0.0.0"),
            http_port: env_parse("HTTP_PORT", 3000u16)?,

            routing_strategy,
            percentage_remote: env_parse("PERCENTAGE_REMOTE", 0u8)?,
            business_type_map: parse_keyword_map(&env_or("BUSINESS_TYPE_MAP", "")),
            tool_keywords: parse_keyword_list(&env_or("TOOL_KEYWORDS", DEFAULT_TOOL_KEYWORDS)),
            complexity_keywords: parse_keyword_list(&env_or(
                "COMPLEXITY_KEYWORDS",
                DEFAULT_COMPLEXITY_KEYWORDS,
            )),

            context_window: env_parse("CONTEXT_WINDOW", 10usize)?,

            embedding_api_url: env_or("EMBEDDING_API_URL", "http://localhost:11434/api"),
            embedding_api_key: std::env::var("EMBEDDING_API_KEY").ok(),
            embedding_model: env_or("EMBEDDING_MODEL", "nomic-embed-text"),
            vector_max_results: env_parse("VECTOR_MAX_RESULTS", 5usize)?,
            vector_min_score: env_parse("VECTOR_MIN_SCORE", 0.5f32)?,

            local_model: ModelConfig {
                base_url: env_or("LOCAL_MODEL_BASE_URL", "http://localhost:11434"),
                api_key: std::env::var("LOCAL_MODEL_API_KEY").ok(),
                model_name: env_or("LOCAL_MODEL_NAME", "qwen2.5"),
                timeout_secs: env_parse("LOCAL_MODEL_TIMEOUT", 120u64)?,
            },
            remote_model: ModelConfig {
                base_url: env_or(
                    "REMOTE_MODEL_BASE_URL",
                    "https://dashscope.aliyuncs.com/compatible-mode/v1",
                ),
                api_key: std::env::var("REMOTE_MODEL_API_KEY").ok(),
                model_name: env_or("REMOTE_MODEL_NAME", "qwen-plus"),
                timeout_secs: env_parse("REMOTE_MODEL_TIMEOUT", 60u64)?,
            },

            allowed_directory: env_or("ALLOWED_DIRECTORY", "./uploads"),
            agent_step_cap: env_parse("AGENT_STEP_CAP", 8usize)?,
            file_read_max_chars: env_parse("FILE_READ_MAX_CHARS", 5000usize)?,
            search_files_max_bytes: env_parse("SEARCH_FILES_MAX_BYTES", 100 * 1024u64)?,
            financial_keywords: parse_keyword_list(&env_or(
                "FINANCIAL_KEYWORDS",
                DEFAULT_FINANCIAL_KEYWORDS,
            )),

            chunk_size: env_parse("CHUNK_SIZE", 800usize)?,
            chunk_overlap: env_parse("CHUNK_OVERLAP", 100usize)?,
        })
    }

    /// A fully-populated config with no environment dependency, used by
    /// unit tests that need a `Config` but don't exercise `from_env`.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            database_url: "postgres://localhost/sage_test".to_string(),
            http_host: "127.0.0.1".to_string(),
            http_port: 3000,
            routing_strategy: RoutingStrategy::Percentage,
            percentage_remote: 0,
            business_type_map: HashMap::new(),
            tool_keywords: parse_keyword_list(DEFAULT_TOOL_KEYWORDS),
            complexity_keywords: parse_keyword_list(DEFAULT_COMPLEXITY_KEYWORDS),
            context_window: 10,
            embedding_api_url: "http://localhost:11434/api".to_string(),
            embedding_api_key: None,
            embedding_model: "nomic-embed-text".to_string(),
            vector_max_results: 5,
            vector_min_score: 0.5,
            local_model: ModelConfig {
                base_url: "http://localhost:11434".to_string(),
                api_key: None,
                model_name: "qwen2.5".to_string(),
                timeout_secs: 120,
            },
            remote_model: ModelConfig {
                base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string(),
                api_key: None,
                model_name: "qwen-plus".to_string(),
                timeout_secs: 60,
            },
            allowed_directory: "./uploads".to_string(),
            agent_step_cap: 8,
            file_read_max_chars: 5000,
            search_files_max_bytes: 100 * 1024,
            financial_keywords: parse_keyword_list(DEFAULT_FINANCIAL_KEYWORDS),
            chunk_size: 800,
            chunk_overlap: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_business_type_map() {
        let map = parse_keyword_map("TOOL_CALLING=qwen-remote, COMPLEX_QUERY=qwen-remote");
        assert_eq!(map.get("TOOL_CALLING").unwrap(), "qwen-remote");
        assert_eq!(map.get("COMPLEX_QUERY").unwrap(), "qwen-remote");
    }

    #[test]
    fn parses_keyword_list() {
        let list = parse_keyword_list(DEFAULT_TOOL_KEYWORDS);
        assert!(list.contains(&"IRR".to_string()));
        assert!(list.contains(&"天气".to_string()));
    }

    #[test]
    fn rejects_unknown_strategy() {
        assert!(RoutingStrategy::from_env_str("banana").is_err());
    }
}
