//! Chat Model Abstraction (C3). `provider` defines the `ChatModel` trait and
//! wire-independent types every provider speaks; `local` and `remote` are the
//! two concrete providers spec.md §4.3 names.

pub mod local;
pub mod provider;
pub mod remote;
pub mod types;

pub use provider::ChatModel;
pub use types::{ChatMessage, ChatReply, ChatRole, ProviderError, ToolCall, ToolSpec};
