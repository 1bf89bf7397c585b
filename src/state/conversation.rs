//! Conversation and message types
//!
//! Field names follow the backend's JSON so stored conversations and stream
//! payloads deserialize directly.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Title shown until the backend generates one
pub const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";

/// A conversation with its full message history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            created_at,
            title: None,
            messages: Vec::new(),
        }
    }

    /// The assistant message currently receiving stage updates, if any
    pub fn open_assistant(&self) -> Option<&AssistantMessage> {
        match self.messages.last() {
            Some(Message::Assistant(message)) => Some(message),
            _ => None,
        }
    }
}

/// Entry in the conversation list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_title", deserialize_with = "deserialize_title")]
    pub title: String,
    #[serde(default)]
    pub message_count: usize,
}

impl ConversationSummary {
    /// List entry for a conversation that was just created
    pub fn fresh(conversation: &Conversation) -> Self {
        Self {
            id: conversation.id.clone(),
            created_at: conversation.created_at,
            title: conversation
                .title
                .clone()
                .unwrap_or_else(default_title),
            message_count: 0,
        }
    }
}

fn default_title() -> String {
    DEFAULT_CONVERSATION_TITLE.to_string()
}

fn deserialize_title<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_title))
}

/// One message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User { content: String },
    Assistant(AssistantMessage),
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self, Message::Assistant(_))
    }
}

/// Assistant reply, filled stage by stage while a turn streams
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub stage1: Option<Vec<Stage1Response>>,
    #[serde(default)]
    pub stage2: Option<Vec<Stage2Ranking>>,
    #[serde(default)]
    pub stage3: Option<Stage3Result>,
    #[serde(default)]
    pub metadata: Option<StageMetadata>,
    #[serde(default)]
    pub loading: StageLoading,
}

impl AssistantMessage {
    /// Empty placeholder appended when a turn is sent
    pub fn placeholder() -> Self {
        Self::default()
    }

    pub fn is_filled(&self, stage: Stage) -> bool {
        match stage {
            Stage::One => self.stage1.is_some(),
            Stage::Two => self.stage2.is_some(),
            Stage::Three => self.stage3.is_some(),
        }
    }
}

/// The three phases of a council turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Individual responses
    One,
    /// Peer rankings
    Two,
    /// Final synthesis
    Three,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::One, Stage::Two, Stage::Three];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::One => "stage1",
            Stage::Two => "stage2",
            Stage::Three => "stage3",
        }
    }
}

/// Per-stage progress flags
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageLoading {
    #[serde(default)]
    pub stage1: bool,
    #[serde(default)]
    pub stage2: bool,
    #[serde(default)]
    pub stage3: bool,
}

impl StageLoading {
    pub fn get(&self, stage: Stage) -> bool {
        match stage {
            Stage::One => self.stage1,
            Stage::Two => self.stage2,
            Stage::Three => self.stage3,
        }
    }

    pub fn set(&mut self, stage: Stage, loading: bool) {
        match stage {
            Stage::One => self.stage1 = loading,
            Stage::Two => self.stage2 = loading,
            Stage::Three => self.stage3 = loading,
        }
    }

    pub fn any(&self) -> bool {
        self.stage1 || self.stage2 || self.stage3
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// First-stage answer from one council member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage1Response {
    #[serde(alias = "responder")]
    pub model: String,
    #[serde(alias = "text")]
    pub response: String,
}

/// One council member's evaluation of the anonymized answers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage2Ranking {
    #[serde(alias = "responder")]
    pub model: String,
    #[serde(alias = "ranking_text")]
    pub ranking: String,
    /// Labels such as `Response B`, best first
    #[serde(default)]
    pub parsed_ranking: Option<Vec<String>>,
}

/// The chairman's synthesized answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage3Result {
    #[serde(alias = "responder")]
    pub model: String,
    #[serde(alias = "text")]
    pub response: String,
}

/// De-anonymization data sent alongside the peer rankings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageMetadata {
    /// `Response A` -> `openai/gpt-4o`
    #[serde(default)]
    pub label_to_model: BTreeMap<String, String>,
    #[serde(default)]
    pub aggregate_rankings: Vec<AggregateRank>,
}

/// Average placement of one model across all peer rankings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRank {
    pub model: String,
    pub average_rank: f64,
    pub rankings_count: usize,
}

/// Accept RFC 3339 timestamps as well as the naive ISO form the backend
/// writes (`2024-05-01T12:00:00.123456`), which is taken as UTC.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|dt| dt.and_utc()))
}
