//! Conversation state
//!
//! Data model, the pure reducer that advances it, and the observable handle
//! the presentation layer subscribes to.

mod chat;
mod conversation;
mod reducer;

#[cfg(test)]
mod proptests;

pub use chat::{ChatSnapshot, ChatState};
pub use conversation::{
    AggregateRank, AssistantMessage, Conversation, ConversationSummary, Message, Stage,
    Stage1Response, Stage2Ranking, Stage3Result, StageLoading, StageMetadata,
    DEFAULT_CONVERSATION_TITLE,
};
pub use reducer::{reduce, Update};
