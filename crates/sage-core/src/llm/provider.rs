//! Chat Model Abstraction (C3): a uniform call surface over local and remote
//! chat providers, supporting tool use. Differences in wire format are a
//! provider concern (spec.md §4.3) — both `LocalProvider` and
//! `RemoteProvider` implement this one trait.

use async_trait::async_trait;

use super::types::{ChatMessage, ChatReply, ProviderError, ToolSpec};
use crate::models::ProviderKind;

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// A single round: given the memory window and available tools, return
    /// either final text or a tool-call request. Providers that speak a
    /// streaming wire format internally collect the full response before
    /// returning — segmentation for the client happens downstream, in the
    /// stream adapter (C9), not here.
    async fn chat(
        &self,
        memory: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ChatReply, ProviderError>;

    /// Stable identifier used in `RoutingDecision::model_id`.
    fn model_id(&self) -> &str;

    /// Attached at registration time rather than inferred from a Rust type
    /// (spec.md §9 design note on class-identity sniffing).
    fn provider_kind(&self) -> ProviderKind;
}
