//! API request and response bodies

use crate::stream::{Attachment, TurnRequest};
use serde::Serialize;

/// Body of `POST /api/conversations`; the backend takes no fields
#[derive(Debug, Default, Serialize)]
pub struct CreateConversationRequest {}

/// Body of `POST /api/conversations/{id}/message/stream`
#[derive(Debug, Serialize)]
pub struct StreamMessageRequest<'a> {
    pub content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub council_models: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chairman_model: Option<&'a str>,
    pub attachments: &'a [Attachment],
}

impl<'a> From<&'a TurnRequest> for StreamMessageRequest<'a> {
    fn from(request: &'a TurnRequest) -> Self {
        Self {
            content: &request.content,
            council_models: request.council_models.as_deref(),
            chairman_model: request.chairman_model.as_deref(),
            attachments: &request.attachments,
        }
    }
}

/// Body of `POST /api/conversations/{id}/message`
#[derive(Debug, Serialize)]
pub struct SendMessageRequest<'a> {
    pub content: &'a str,
}
