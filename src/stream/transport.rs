//! Streaming transport seam
//!
//! A transport issues one request per turn and hands back the raw response
//! body as a byte stream. Framing and decoding happen above it.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Shown when the backend cannot be reached
pub const CONNECT_FAILED_MESSAGE: &str = "Network error: Unable to connect to server";
/// Shown when the body breaks off mid-stream
pub const READ_FAILED_MESSAGE: &str = "Stream reading failed";
/// Shown when the body ends without `complete` or `error`
pub const UNEXPECTED_END_MESSAGE: &str = "Stream ended unexpectedly without completion";

/// Raw response body chunks
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// File attached to a turn, passed through to the backend untouched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    #[serde(rename = "type")]
    pub media_type: String,
    #[serde(rename = "isImage", default)]
    pub is_image: bool,
    pub content: String,
}

/// Everything needed to open the stream for one turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRequest {
    pub conversation_id: String,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub council_models: Option<Vec<String>>,
    pub chairman_model: Option<String>,
}

/// Why the stream could not be opened or read
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("server responded with status {status}")]
    Status { status: u16 },
    #[error("read failed: {0}")]
    Read(String),
}

impl TransportError {
    /// Short message safe to show to the user.
    ///
    /// The underlying detail only goes to the log.
    pub fn user_message(&self) -> String {
        match self {
            TransportError::Connect(_) => CONNECT_FAILED_MESSAGE.to_string(),
            TransportError::Status { status } => format!("Server error: {status}"),
            TransportError::Read(_) => READ_FAILED_MESSAGE.to_string(),
        }
    }
}

/// Opens the per-turn event stream
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Send the turn and return the response body once the status is known
    /// to be successful
    async fn open_stream(&self, request: &TurnRequest) -> Result<ByteStream, TransportError>;
}

#[async_trait]
impl<T: StreamTransport + ?Sized> StreamTransport for Arc<T> {
    async fn open_stream(&self, request: &TurnRequest) -> Result<ByteStream, TransportError> {
        (**self).open_stream(request).await
    }
}
