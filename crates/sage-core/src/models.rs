//! Core data types shared across the router, agent loop, store, and stream
//! adapter: `Message`, `VectorSegment`, `RoutingDecision`, `ToolCallRecord`,
//! and the conversation-id prefixing rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which kind of dialogue a conversation id denotes. Assigned once, at
/// first-message time, and never changed (spec.md §3 invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationKind {
    Chat,
    Agent,
}

impl ConversationKind {
    pub fn prefix(self) -> &'static str {
        match self {
            ConversationKind::Chat => "chat-",
            ConversationKind::Agent => "agent-",
        }
    }
}

/// Construct a fresh conversation id with the given kind's prefix. This is
/// the single path by which new conversation ids are minted, so a
/// conversation id can never be created without its prefix or re-prefixed
/// later (SPEC_FULL.md §12.2).
pub fn new_conversation_id(kind: ConversationKind) -> String {
    format!("{}{}", kind.prefix(), Uuid::new_v4())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "tool" => Some(Role::Tool),
            _ => None,
        }
    }
}

/// A retrieval hit attached to an assistant message that was produced with
/// grounding from `searchKnowledge`. Serialised into `messages.sources`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub filename: String,
    pub excerpt: String,
    pub score: f32,
}

/// A message persisted in, or about to be appended to, the conversation
/// store. Immutable once written (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: String,
    pub user_id: Option<String>,
    pub role: String,
    pub content: String,
    pub sources: Option<Vec<Source>>,
    pub created_at: DateTime<Utc>,
}

/// A passage returned from the vector index (C2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSegment {
    pub text: String,
    pub filename: Option<String>,
    pub document_id: Option<String>,
    pub chunk_index: Option<i32>,
    pub score: f32,
}

/// The coarse classification the router assigns a message under the
/// BUSINESS_TYPE strategy (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusinessType {
    ComplexQuery,
    LongContext,
    HighPrecision,
    SimpleQa,
    ToolCalling,
    GeneralChat,
}

impl BusinessType {
    pub fn as_str(self) -> &'static str {
        match self {
            BusinessType::ComplexQuery => "COMPLEX_QUERY",
            BusinessType::LongContext => "LONG_CONTEXT",
            BusinessType::HighPrecision => "HIGH_PRECISION",
            BusinessType::SimpleQa => "SIMPLE_QA",
            BusinessType::ToolCalling => "TOOL_CALLING",
            BusinessType::GeneralChat => "GENERAL_CHAT",
        }
    }
}

/// Which chat-model handle produced a turn. Attached to the handle at
/// registration time rather than sniffed from a Rust type (spec.md §9,
/// SPEC_FULL.md §11.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    Local,
    Remote,
}

/// The outcome of a routing decision for one request. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub model_id: String,
    pub provider: ProviderKind,
    pub business_type: Option<BusinessType>,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolCallStatus {
    Started,
    Completed,
    Failed,
}

/// Observability record of one tool invocation within a turn. Emitted once
/// per call into the request-scoped record sink and surfaced verbatim as the
/// `agent-history` SSE event; never persisted by default (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub step: usize,
    pub tool_name: String,
    pub input: serde_json::Value,
    pub result: Option<String>,
    pub duration_ms: u64,
    pub status: ToolCallStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_ids_carry_the_requested_prefix() {
        let chat_id = new_conversation_id(ConversationKind::Chat);
        let agent_id = new_conversation_id(ConversationKind::Agent);
        assert!(chat_id.starts_with("chat-"));
        assert!(agent_id.starts_with("agent-"));
    }

    #[test]
    fn role_round_trips_through_its_string_form() {
        for role in [Role::User, Role::Assistant, Role::Tool] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
    }
}
