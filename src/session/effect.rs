//! Planning what a stream event does
//!
//! `plan` is pure: it maps one decoded event to the reducer update plus the
//! side effects the controller has to carry out. The controller executes the
//! plan only after the staleness guard lets it through.

use crate::state::{Stage, Update};
use crate::stream::StreamEvent;

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

/// Side effects applied next to the state update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Store as the last error and send on the error channel
    PublishError { message: String },

    /// Reload the conversation list from the backend
    RefreshConversations,

    /// Rename the bound conversation's list entry
    RenameListEntry { title: String },

    /// Clear the controller-level loading flag
    EndLoading,
}

/// Result of planning one event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPlan {
    pub update: Option<Update>,
    pub effects: Vec<Effect>,
    /// Set for terminal events
    pub outcome: Option<SessionOutcome>,
}

impl EventPlan {
    pub fn ignore() -> Self {
        Self::default()
    }

    pub fn update(update: Update) -> Self {
        Self {
            update: Some(update),
            ..Self::default()
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_outcome(mut self, outcome: SessionOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Map one event to its update and effects
pub fn plan(event: StreamEvent) -> EventPlan {
    match event {
        StreamEvent::Stage1Start => EventPlan::update(Update::StageStarted(Stage::One)),
        StreamEvent::Stage2Start => EventPlan::update(Update::StageStarted(Stage::Two)),
        StreamEvent::Stage3Start => EventPlan::update(Update::StageStarted(Stage::Three)),

        StreamEvent::Stage1Complete(responses) => EventPlan::update(Update::Stage1Completed(responses)),
        StreamEvent::Stage2Complete { rankings, metadata } => {
            EventPlan::update(Update::Stage2Completed { rankings, metadata })
        }
        StreamEvent::Stage3Complete(result) => EventPlan::update(Update::Stage3Completed(result)),

        StreamEvent::TitleComplete { title } => EventPlan::update(Update::SetTitle(title.clone()))
            .with_effect(Effect::RenameListEntry { title }),

        StreamEvent::Complete => EventPlan::update(Update::FinishTurn)
            .with_effect(Effect::EndLoading)
            .with_effect(Effect::RefreshConversations)
            .with_outcome(SessionOutcome::Completed),

        StreamEvent::Error { message } => EventPlan::update(Update::FinishTurn)
            .with_effect(Effect::EndLoading)
            .with_effect(Effect::PublishError {
                message: message.clone(),
            })
            .with_outcome(SessionOutcome::Failed(message)),

        StreamEvent::Other { kind, .. } => {
            tracing::debug!(kind = %kind, "Ignoring unknown stream event");
            EventPlan::ignore()
        }
    }
}
