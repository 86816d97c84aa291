//! 记忆层：对话轮次记录与持久化

pub mod async_persistence;
pub mod conversation;
pub mod persistence;

#[cfg(feature = "async-sqlite")]
pub use async_persistence::SqliteTurnStore;
pub use conversation::{ConversationStore, ConversationTurn, Role, CONTEXT_HEADER};
pub use persistence::{InMemoryTurnStore, TurnStore};
