//! Conversation API
//!
//! CRUD access to the council backend plus the streaming transport, behind
//! traits so the session controller can run against a mock.

mod error;
mod http;
mod types;

pub use error::{ApiError, ApiErrorKind};
pub use http::HttpBackend;
pub use types::{CreateConversationRequest, SendMessageRequest, StreamMessageRequest};

use crate::state::{AssistantMessage, Conversation, ConversationSummary};
use crate::stream::StreamTransport;
use async_trait::async_trait;
use std::sync::Arc;

/// Request/response access to stored conversations
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ApiError>;

    async fn create_conversation(&self) -> Result<Conversation, ApiError>;

    async fn get_conversation(&self, id: &str) -> Result<Conversation, ApiError>;

    async fn delete_conversation(&self, id: &str) -> Result<(), ApiError>;

    /// Run a whole turn without streaming and return the finished reply
    async fn send_message(&self, id: &str, content: &str) -> Result<AssistantMessage, ApiError>;
}

/// Everything the session controller needs from the backend
pub trait Backend: StreamTransport + ConversationStore {}
impl<T: StreamTransport + ConversationStore> Backend for T {}

#[async_trait]
impl<T: ConversationStore + ?Sized> ConversationStore for Arc<T> {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ApiError> {
        (**self).list_conversations().await
    }

    async fn create_conversation(&self) -> Result<Conversation, ApiError> {
        (**self).create_conversation().await
    }

    async fn get_conversation(&self, id: &str) -> Result<Conversation, ApiError> {
        (**self).get_conversation(id).await
    }

    async fn delete_conversation(&self, id: &str) -> Result<(), ApiError> {
        (**self).delete_conversation(id).await
    }

    async fn send_message(&self, id: &str, content: &str) -> Result<AssistantMessage, ApiError> {
        (**self).send_message(id, content).await
    }
}
