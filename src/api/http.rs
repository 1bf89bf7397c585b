//! HTTP backend over `reqwest`

use super::{
    ApiError, ConversationStore, CreateConversationRequest, SendMessageRequest,
    StreamMessageRequest,
};
use crate::config::ClientConfig;
use crate::state::{AssistantMessage, Conversation, ConversationSummary};
use crate::stream::{ByteStream, StreamTransport, TransportError, TurnRequest};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

/// Talks to the council backend
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build a client with the configured connect timeout.
    ///
    /// No overall request timeout is set: a council turn can stream for
    /// minutes.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ApiError::unknown(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self::new(client, config.api_base.clone()))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/conversations{}", self.base_url, path)
    }
}

fn request_error(e: &reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::network(format!("Request timeout: {e}"))
    } else if e.is_connect() {
        ApiError::network(format!("Connection failed: {e}"))
    } else {
        ApiError::unknown(format!("Request failed: {e}"))
    }
}

/// Map a non-success status to an error, keeping the body for the message
async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::from_status(status.as_u16(), &body))
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let response = check_status(response).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| ApiError::unknown(format!("Failed to parse response: {e}")))
}

#[async_trait]
impl ConversationStore for HttpBackend {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ApiError> {
        let response = self
            .client
            .get(self.url(""))
            .send()
            .await
            .map_err(|e| request_error(&e))?;
        read_json(response).await
    }

    async fn create_conversation(&self) -> Result<Conversation, ApiError> {
        let response = self
            .client
            .post(self.url(""))
            .json(&CreateConversationRequest::default())
            .send()
            .await
            .map_err(|e| request_error(&e))?;
        read_json(response).await
    }

    async fn get_conversation(&self, id: &str) -> Result<Conversation, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/{id}")))
            .send()
            .await
            .map_err(|e| request_error(&e))?;
        read_json(response).await
    }

    async fn delete_conversation(&self, id: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.url(&format!("/{id}")))
            .send()
            .await
            .map_err(|e| request_error(&e))?;
        check_status(response).await?;
        Ok(())
    }

    async fn send_message(&self, id: &str, content: &str) -> Result<AssistantMessage, ApiError> {
        let response = self
            .client
            .post(self.url(&format!("/{id}/message")))
            .json(&SendMessageRequest { content })
            .send()
            .await
            .map_err(|e| request_error(&e))?;
        read_json(response).await
    }
}

#[async_trait]
impl StreamTransport for HttpBackend {
    async fn open_stream(&self, request: &TurnRequest) -> Result<ByteStream, TransportError> {
        let url = self.url(&format!("/{}/message/stream", request.conversation_id));
        let response = self
            .client
            .post(&url)
            .json(&StreamMessageRequest::from(request))
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(conv_id = %request.conversation_id, error = %e, "Stream request failed");
                TransportError::Connect(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::warn!(
                conv_id = %request.conversation_id,
                status = status.as_u16(),
                body = %body,
                "Stream request rejected"
            );
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }

        Ok(response
            .bytes_stream()
            .map_err(|e| TransportError::Read(e.to_string()))
            .boxed())
    }
}
