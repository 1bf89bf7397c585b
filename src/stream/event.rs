//! Typed progress events
//!
//! Every frame carries a JSON object with a `type` discriminator. Known kinds
//! decode into dedicated variants; unknown kinds are passed through untouched
//! so newer backends do not break older clients.

use super::Frame;
use crate::state::{Stage1Response, Stage2Ranking, Stage3Result, StageMetadata};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Message used when an `error` event carries none
const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";

/// Event kinds with a defined meaning
const KNOWN_KINDS: [&str; 9] = [
    "stage1_start",
    "stage1_complete",
    "stage2_start",
    "stage2_complete",
    "stage3_start",
    "stage3_complete",
    "title_complete",
    "complete",
    "error",
];

/// A decoded stream event
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Stage1Start,
    Stage1Complete(Vec<Stage1Response>),
    Stage2Start,
    Stage2Complete {
        rankings: Vec<Stage2Ranking>,
        metadata: Option<StageMetadata>,
    },
    Stage3Start,
    Stage3Complete(Stage3Result),
    TitleComplete { title: String },
    /// Terminal: the turn finished
    Complete,
    /// Terminal: the turn failed
    Error { message: String },
    /// Any other `type`, forwarded as-is
    Other { kind: String, payload: Value },
}

impl StreamEvent {
    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error {
            message: message.into(),
        }
    }

    /// Whether this event ends the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete | StreamEvent::Error { .. })
    }

    pub fn kind(&self) -> &str {
        match self {
            StreamEvent::Stage1Start => "stage1_start",
            StreamEvent::Stage1Complete(_) => "stage1_complete",
            StreamEvent::Stage2Start => "stage2_start",
            StreamEvent::Stage2Complete { .. } => "stage2_complete",
            StreamEvent::Stage3Start => "stage3_start",
            StreamEvent::Stage3Complete(_) => "stage3_complete",
            StreamEvent::TitleComplete { .. } => "title_complete",
            StreamEvent::Complete => "complete",
            StreamEvent::Error { .. } => "error",
            StreamEvent::Other { kind, .. } => kind,
        }
    }
}

/// A frame that could not be turned into an event
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),
    #[error("frame has no string \"type\" field")]
    MissingType,
    #[error("invalid payload for {kind} event: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Wire shape of the known events
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    Stage1Start,
    Stage1Complete {
        data: Vec<Stage1Response>,
    },
    Stage2Start,
    Stage2Complete {
        data: Vec<Stage2Ranking>,
        #[serde(default)]
        metadata: Option<StageMetadata>,
    },
    Stage3Start,
    Stage3Complete {
        data: Stage3Result,
    },
    TitleComplete {
        #[serde(default)]
        data: Option<TitleData>,
        #[serde(default)]
        title: Option<String>,
    },
    Complete,
    Error {
        #[serde(default)]
        message: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct TitleData {
    title: String,
}

impl WireEvent {
    fn into_event(self) -> Result<StreamEvent, &'static str> {
        Ok(match self {
            WireEvent::Stage1Start => StreamEvent::Stage1Start,
            WireEvent::Stage1Complete { data } => StreamEvent::Stage1Complete(data),
            WireEvent::Stage2Start => StreamEvent::Stage2Start,
            WireEvent::Stage2Complete { data, metadata } => StreamEvent::Stage2Complete {
                rankings: data,
                metadata,
            },
            WireEvent::Stage3Start => StreamEvent::Stage3Start,
            WireEvent::Stage3Complete { data } => StreamEvent::Stage3Complete(data),
            WireEvent::TitleComplete { data, title } => {
                let title = data
                    .map(|d| d.title)
                    .or(title)
                    .ok_or("missing field `title`")?;
                StreamEvent::TitleComplete { title }
            }
            WireEvent::Complete => StreamEvent::Complete,
            WireEvent::Error { message } => StreamEvent::Error {
                message: message.unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string()),
            },
        })
    }
}

/// Decode one frame payload into an event
pub fn decode(frame: &Frame) -> Result<StreamEvent, DecodeError> {
    let value: Value = serde_json::from_str(&frame.payload).map_err(DecodeError::Json)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingType)?
        .to_string();

    if !KNOWN_KINDS.contains(&kind.as_str()) {
        return Ok(StreamEvent::Other {
            kind,
            payload: value,
        });
    }

    let wire: WireEvent = serde_json::from_value(value).map_err(|source| DecodeError::Payload {
        kind: kind.clone(),
        source,
    })?;
    wire.into_event().map_err(|reason| DecodeError::Payload {
        kind,
        source: serde::de::Error::custom(reason),
    })
}
