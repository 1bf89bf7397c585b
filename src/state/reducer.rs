//! Pure conversation reducer
//!
//! `reduce` never mutates its input: given the same conversation and update
//! it always produces the same next conversation, with no I/O.

use super::{
    AssistantMessage, Conversation, Message, Stage, Stage1Response, Stage2Ranking, Stage3Result,
    StageMetadata,
};
use crate::ranking::{aggregate_rankings, with_parsed_rankings};

/// A single state-update operation
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Append the user message and an empty assistant placeholder together
    AppendTurn { content: String },
    StageStarted(Stage),
    Stage1Completed(Vec<Stage1Response>),
    Stage2Completed {
        rankings: Vec<Stage2Ranking>,
        metadata: Option<StageMetadata>,
    },
    Stage3Completed(Stage3Result),
    SetTitle(String),
    /// The turn ended (successfully or not); nothing is loading anymore
    FinishTurn,
}

impl Update {
    pub fn name(&self) -> &'static str {
        match self {
            Update::AppendTurn { .. } => "append_turn",
            Update::StageStarted(_) => "stage_started",
            Update::Stage1Completed(_) => "stage1_completed",
            Update::Stage2Completed { .. } => "stage2_completed",
            Update::Stage3Completed(_) => "stage3_completed",
            Update::SetTitle(_) => "set_title",
            Update::FinishTurn => "finish_turn",
        }
    }
}

/// Produce the conversation that results from applying `update`.
///
/// Stage updates only ever touch the last message, and only when it is an
/// assistant message; otherwise (state was reset mid-stream) they are no-ops.
pub fn reduce(conversation: &Conversation, update: &Update) -> Conversation {
    let mut next = conversation.clone();

    match update {
        Update::AppendTurn { content } => {
            next.messages.push(Message::user(content.clone()));
            next.messages
                .push(Message::Assistant(AssistantMessage::placeholder()));
        }
        Update::SetTitle(title) => {
            next.title = Some(title.clone());
        }
        stage_update => {
            let Some(Message::Assistant(open)) = next.messages.last_mut() else {
                tracing::debug!(
                    conv_id = %conversation.id,
                    update = stage_update.name(),
                    "Last message is not an assistant placeholder, ignoring update"
                );
                return next;
            };
            apply_to_open(open, stage_update, &conversation.id);
        }
    }

    next
}

fn apply_to_open(open: &mut AssistantMessage, update: &Update, conv_id: &str) {
    match update {
        Update::StageStarted(stage) => open.loading.set(*stage, true),

        Update::Stage1Completed(responses) => {
            if open.stage1.is_none() {
                open.stage1 = Some(responses.clone());
            } else {
                log_duplicate(conv_id, Stage::One);
            }
            open.loading.set(Stage::One, false);
        }

        Update::Stage2Completed { rankings, metadata } => {
            if open.stage2.is_none() {
                let rankings = with_parsed_rankings(rankings);
                open.metadata = metadata.clone().map(|mut metadata| {
                    if metadata.aggregate_rankings.is_empty() {
                        metadata.aggregate_rankings =
                            aggregate_rankings(&rankings, &metadata.label_to_model);
                    }
                    metadata
                });
                open.stage2 = Some(rankings);
            } else {
                log_duplicate(conv_id, Stage::Two);
            }
            open.loading.set(Stage::Two, false);
        }

        Update::Stage3Completed(result) => {
            if open.stage3.is_none() {
                open.stage3 = Some(result.clone());
            } else {
                log_duplicate(conv_id, Stage::Three);
            }
            open.loading.set(Stage::Three, false);
        }

        Update::FinishTurn => open.loading.clear(),

        Update::AppendTurn { .. } | Update::SetTitle(_) => {}
    }
}

fn log_duplicate(conv_id: &str, stage: Stage) {
    tracing::debug!(
        conv_id = %conv_id,
        stage = stage.as_str(),
        "Stage already filled, keeping first payload"
    );
}
