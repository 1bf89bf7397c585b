//! Session controller
//!
//! Owns the single active session slot. Every `send_turn` replaces whatever
//! session was running, applies the optimistic append, and spawns a task that
//! consumes the event stream until the first terminal event.
//!
//! Lock order is always slot first, then the chat state's write lock. No lock
//! is ever held across an await point.

use super::effect::{plan, Effect, EventPlan, SessionOutcome};
use super::guard::{check, Ticket, Verdict};
use crate::api::{ApiError, Backend};
use crate::config::CouncilSettings;
use crate::state::{
    ChatSnapshot, ChatState, Conversation, ConversationSummary, Update,
    DEFAULT_CONVERSATION_TITLE,
};
use crate::stream::{
    decode, Attachment, Frame, FrameBuffer, StreamEvent, TurnRequest, UNEXPECTED_END_MESSAGE,
};
use futures::StreamExt;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Longest message the backend accepts, in characters
pub const MAX_MESSAGE_LENGTH: usize = 50 * 1024;

const ERROR_CHANNEL_CAPACITY: usize = 64;

/// Why a turn could not be started
#[derive(Debug, Error)]
pub enum SendError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("message is {len} characters long, the limit is {max}")]
    MessageTooLong { len: usize, max: usize },
    #[error("conversation {id} is not the open conversation")]
    InactiveConversation { id: String },
    #[error(transparent)]
    Api(#[from] ApiError),
}

fn validate_content(content: &str, attachments: &[Attachment]) -> Result<(), SendError> {
    if content.trim().is_empty() && attachments.is_empty() {
        return Err(SendError::EmptyMessage);
    }
    let len = content.chars().count();
    if len > MAX_MESSAGE_LENGTH {
        return Err(SendError::MessageTooLong {
            len,
            max: MAX_MESSAGE_LENGTH,
        });
    }
    Ok(())
}

// ============================================================================
// Shared slot and state
// ============================================================================

struct ActiveSession {
    ticket: Ticket,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Slot {
    next_epoch: u64,
    /// Bumped on every navigation so late conversation loads can be discarded
    navigation: u64,
    active: Option<ActiveSession>,
}

impl Slot {
    /// Epoch of the live session
    fn active_epoch(&self) -> Option<u64> {
        self.active.as_ref().map(|active| active.ticket.epoch)
    }
}

/// State shared by the controller, its session tasks and their handles
struct Shared {
    state: ChatState,
    slot: Mutex<Slot>,
    errors: broadcast::Sender<String>,
}

impl Shared {
    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancel the active session, or only the one with `epoch` if given.
    ///
    /// Runs under the slot lock, so once this returns no mutation from the
    /// cancelled session can be applied.
    fn cancel_session(&self, epoch: Option<u64>) -> bool {
        let mut slot = self.lock_slot();
        let targeted = match (&slot.active, epoch) {
            (Some(active), Some(epoch)) => active.ticket.epoch == epoch,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !targeted {
            return false;
        }
        let Some(active) = slot.active.take() else {
            return false;
        };
        active.cancel.cancel();
        self.state.update(|snapshot| std::mem::take(&mut snapshot.loading));
        tracing::info!(
            conv_id = %active.ticket.conversation_id,
            epoch = active.ticket.epoch,
            "Session cancelled"
        );
        true
    }

    /// Check the ticket and, if it is still current, apply the plan's update
    /// and effects as one published change.
    fn apply(&self, ticket: &Ticket, plan: &EventPlan) -> Verdict {
        let slot = self.lock_slot();
        let active_epoch = slot.active_epoch();
        let mut verdict = Verdict::Detached;
        let mut published = None;

        self.state.update(|snapshot| {
            verdict = check(ticket, active_epoch, snapshot.current_id());
            if verdict != Verdict::Apply {
                return false;
            }
            let mut changed = plan.update.as_ref().is_some_and(|u| snapshot.apply(u));
            for effect in &plan.effects {
                changed |= match effect {
                    Effect::EndLoading => std::mem::take(&mut snapshot.loading),
                    Effect::RenameListEntry { title } => {
                        snapshot.rename_entry(&ticket.conversation_id, title)
                    }
                    Effect::PublishError { message } => {
                        snapshot.last_error = Some(message.clone());
                        published = Some(message.clone());
                        true
                    }
                    Effect::RefreshConversations => false,
                };
            }
            changed
        });

        if let Some(message) = published {
            let _ = self.errors.send(message);
        }
        drop(slot);
        verdict
    }

    /// Replace the list with a fresh copy unless a newer session started
    fn replace_list(&self, ticket: &Ticket, conversations: Vec<ConversationSummary>) -> bool {
        let slot = self.lock_slot();
        if slot.next_epoch != ticket.epoch {
            return false;
        }
        self.state.set_conversations(conversations);
        true
    }

    /// Free the slot when the session ends on its own
    fn release(&self, ticket: &Ticket) {
        let mut slot = self.lock_slot();
        let holds = slot
            .active
            .as_ref()
            .is_some_and(|active| active.ticket.epoch == ticket.epoch);
        if holds {
            slot.active = None;
            self.state.update(|snapshot| std::mem::take(&mut snapshot.loading));
        }
    }

    fn begin_navigation(&self) -> u64 {
        let mut slot = self.lock_slot();
        slot.navigation += 1;
        slot.navigation
    }

    /// Show `conversation` unless another navigation started in the meantime
    fn finish_navigation(&self, navigation: u64, conversation: Option<Conversation>) -> bool {
        let slot = self.lock_slot();
        if slot.navigation != navigation {
            return false;
        }
        self.state.set_current(conversation);
        true
    }
}

// ============================================================================
// Session task
// ============================================================================

struct Session<B> {
    shared: Arc<Shared>,
    backend: Arc<B>,
    ticket: Ticket,
    cancel: CancellationToken,
}

impl<B: Backend + 'static> Session<B> {
    async fn run(self, request: TurnRequest) -> SessionOutcome {
        let outcome = self.consume(&request).await;
        self.shared.release(&self.ticket);

        match &outcome {
            SessionOutcome::Completed => tracing::info!(
                conv_id = %self.ticket.conversation_id,
                epoch = self.ticket.epoch,
                "Session completed"
            ),
            SessionOutcome::Failed(message) => tracing::warn!(
                conv_id = %self.ticket.conversation_id,
                epoch = self.ticket.epoch,
                error = %message,
                "Session failed"
            ),
            SessionOutcome::Cancelled => tracing::debug!(
                conv_id = %self.ticket.conversation_id,
                epoch = self.ticket.epoch,
                "Session stopped after cancellation"
            ),
        }
        outcome
    }

    async fn consume(&self, request: &TurnRequest) -> SessionOutcome {
        let opened = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return SessionOutcome::Cancelled,
            opened = self.backend.open_stream(request) => opened,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(
                    conv_id = %self.ticket.conversation_id,
                    error = %e,
                    "Failed to open event stream"
                );
                return self.fail(e.user_message());
            }
        };

        let mut buffer = FrameBuffer::new();
        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return SessionOutcome::Cancelled,
                next = stream.next() => next,
            };
            match next {
                Some(Ok(chunk)) => {
                    for frame in buffer.push(&chunk) {
                        if let Some(outcome) = self.handle_frame(&frame) {
                            return outcome;
                        }
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(
                        conv_id = %self.ticket.conversation_id,
                        error = %e,
                        "Event stream read failed"
                    );
                    return self.fail(e.user_message());
                }
                None => break,
            }
        }

        if let Some(frame) = buffer.finish() {
            if let Some(outcome) = self.handle_frame(&frame) {
                return outcome;
            }
        }

        tracing::warn!(
            conv_id = %self.ticket.conversation_id,
            "Event stream ended without a terminal event"
        );
        self.fail(UNEXPECTED_END_MESSAGE.to_string())
    }

    fn handle_frame(&self, frame: &Frame) -> Option<SessionOutcome> {
        match decode(frame) {
            Ok(event) => self.dispatch(event),
            Err(e) => {
                tracing::warn!(
                    conv_id = %self.ticket.conversation_id,
                    error = %e,
                    "Skipping undecodable frame"
                );
                None
            }
        }
    }

    /// Apply one event; returns the outcome once the session should stop
    fn dispatch(&self, event: StreamEvent) -> Option<SessionOutcome> {
        let kind = event.kind().to_owned();
        let plan = plan(event);

        match self.shared.apply(&self.ticket, &plan) {
            Verdict::Apply => {}
            Verdict::Detached => {
                tracing::debug!(
                    conv_id = %self.ticket.conversation_id,
                    epoch = self.ticket.epoch,
                    kind = %kind,
                    "Session detached, dropping event"
                );
                return Some(SessionOutcome::Cancelled);
            }
            Verdict::Stale => {
                tracing::debug!(
                    conv_id = %self.ticket.conversation_id,
                    epoch = self.ticket.epoch,
                    kind = %kind,
                    "Conversation no longer open, dropping event"
                );
                return plan.outcome;
            }
        }

        if plan.effects.contains(&Effect::RefreshConversations) {
            tokio::spawn(refresh_list(
                Arc::clone(&self.shared),
                Arc::clone(&self.backend),
                self.ticket.clone(),
            ));
        }
        plan.outcome
    }

    fn fail(&self, message: String) -> SessionOutcome {
        self.dispatch(StreamEvent::error(message.clone()))
            .unwrap_or(SessionOutcome::Failed(message))
    }
}

/// Reload the conversation list after a completed turn.
///
/// Runs detached: the session has already ended by the time the list
/// arrives.
async fn refresh_list<B: Backend>(shared: Arc<Shared>, backend: Arc<B>, ticket: Ticket) {
    match backend.list_conversations().await {
        Ok(conversations) => {
            if !shared.replace_list(&ticket, conversations) {
                tracing::debug!(
                    conv_id = %ticket.conversation_id,
                    epoch = ticket.epoch,
                    "Newer session started, discarding refreshed list"
                );
            }
        }
        Err(e) => tracing::warn!(
            conv_id = %ticket.conversation_id,
            error = %e,
            "Failed to refresh conversation list"
        ),
    }
}

// ============================================================================
// Public handles
// ============================================================================

/// Handle to one in-flight turn
pub struct SessionHandle {
    ticket: Ticket,
    shared: Arc<Shared>,
    task: JoinHandle<SessionOutcome>,
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("epoch", &self.ticket.epoch)
            .field("conversation_id", &self.ticket.conversation_id)
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    pub fn epoch(&self) -> u64 {
        self.ticket.epoch
    }

    pub fn conversation_id(&self) -> &str {
        &self.ticket.conversation_id
    }

    /// Cancel this session if it is still the active one
    pub fn cancel(&self) -> bool {
        self.shared.cancel_session(Some(self.ticket.epoch))
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session task to stop
    pub async fn wait(self) -> SessionOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(epoch = self.ticket.epoch, error = %e, "Session task failed");
                SessionOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Drives council turns against a backend and publishes progress to a
/// [`ChatState`]
pub struct SessionController<B> {
    backend: Arc<B>,
    shared: Arc<Shared>,
    settings: Arc<CouncilSettings>,
}

impl<B> Clone for SessionController<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            shared: Arc::clone(&self.shared),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl<B: Backend + 'static> SessionController<B> {
    pub fn new(backend: B, state: ChatState, settings: CouncilSettings) -> Self {
        let (errors, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);
        Self {
            backend: Arc::new(backend),
            shared: Arc::new(Shared {
                state,
                slot: Mutex::new(Slot::default()),
                errors,
            }),
            settings: Arc::new(settings),
        }
    }

    pub fn state(&self) -> &ChatState {
        &self.shared.state
    }

    pub fn settings(&self) -> &CouncilSettings {
        &self.settings
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.shared.state.subscribe()
    }

    /// Receive each terminal error message once
    pub fn subscribe_errors(&self) -> broadcast::Receiver<String> {
        self.shared.errors.subscribe()
    }

    /// Whether a turn is currently streaming
    pub fn is_busy(&self) -> bool {
        self.shared.lock_slot().active_epoch().is_some()
    }

    /// Start a turn in the open conversation `conversation_id`.
    ///
    /// Cancels any running session first. The user message and an empty
    /// assistant placeholder are appended before the request goes out.
    pub fn send_turn(
        &self,
        conversation_id: &str,
        content: &str,
        attachments: Vec<Attachment>,
    ) -> Result<SessionHandle, SendError> {
        validate_content(content, &attachments)?;

        let mut slot = self.shared.lock_slot();
        let mut appended = false;
        self.shared.state.update(|snapshot| {
            if snapshot.current_id() != Some(conversation_id) {
                return false;
            }
            snapshot.apply(&Update::AppendTurn {
                content: content.to_string(),
            });
            snapshot.loading = true;
            snapshot.last_error = None;
            appended = true;
            true
        });
        if !appended {
            return Err(SendError::InactiveConversation {
                id: conversation_id.to_string(),
            });
        }

        if let Some(previous) = slot.active.take() {
            previous.cancel.cancel();
            tracing::info!(
                conv_id = %previous.ticket.conversation_id,
                epoch = previous.ticket.epoch,
                "Superseding active session"
            );
        }
        slot.next_epoch += 1;
        let ticket = Ticket::new(slot.next_epoch, conversation_id);
        let cancel = CancellationToken::new();
        slot.active = Some(ActiveSession {
            ticket: ticket.clone(),
            cancel: cancel.clone(),
        });
        drop(slot);

        tracing::info!(conv_id = %conversation_id, epoch = ticket.epoch, "Starting council session");

        let request = TurnRequest {
            conversation_id: conversation_id.to_string(),
            content: content.to_string(),
            attachments,
            council_models: Some(self.settings.council_models.clone()),
            chairman_model: Some(self.settings.chairman_model.clone()),
        };
        let session = Session {
            shared: Arc::clone(&self.shared),
            backend: Arc::clone(&self.backend),
            ticket: ticket.clone(),
            cancel,
        };
        let task = tokio::spawn(session.run(request));

        Ok(SessionHandle {
            ticket,
            shared: Arc::clone(&self.shared),
            task,
        })
    }

    /// Send in the open conversation, creating one first if none is open
    pub async fn send(
        &self,
        content: &str,
        attachments: Vec<Attachment>,
    ) -> Result<SessionHandle, SendError> {
        validate_content(content, &attachments)?;
        let conversation_id = match self.shared.state.current_id() {
            Some(id) => id,
            None => self.open_new_conversation().await?,
        };
        self.send_turn(&conversation_id, content, attachments)
    }

    async fn open_new_conversation(&self) -> Result<String, ApiError> {
        self.shared.begin_navigation();
        let conversation = self.backend.create_conversation().await?;
        let id = conversation.id.clone();
        tracing::info!(conv_id = %id, "Created conversation");

        let summary = ConversationSummary {
            title: DEFAULT_CONVERSATION_TITLE.to_string(),
            ..ConversationSummary::fresh(&conversation)
        };
        self.shared.state.update(|snapshot| {
            snapshot.insert_entry(summary);
            snapshot.current = Some(Conversation {
                messages: Vec::new(),
                ..conversation
            });
            true
        });
        Ok(id)
    }

    /// Stop the active session; content stays as last observed
    pub fn cancel(&self) -> bool {
        self.shared.cancel_session(None)
    }

    /// Open a stored conversation
    pub async fn select_conversation(&self, id: &str) -> Result<(), ApiError> {
        self.cancel();
        let navigation = self.shared.begin_navigation();
        let conversation = self.backend.get_conversation(id).await?;
        if !self.shared.finish_navigation(navigation, Some(conversation)) {
            tracing::debug!(conv_id = %id, "Selection superseded, discarding loaded conversation");
        }
        Ok(())
    }

    /// Close the open conversation; the next send creates a new one
    pub fn new_conversation(&self) {
        self.cancel();
        let navigation = self.shared.begin_navigation();
        self.shared.finish_navigation(navigation, None);
    }

    pub async fn delete_conversation(&self, id: &str) -> Result<(), ApiError> {
        if self.shared.state.current_id().as_deref() == Some(id) {
            self.new_conversation();
        }
        self.backend.delete_conversation(id).await?;
        self.shared.state.update(|snapshot| snapshot.remove_entry(id));
        Ok(())
    }

    pub async fn load_conversations(&self) -> Result<(), ApiError> {
        let conversations = self.backend.list_conversations().await?;
        self.shared.state.set_conversations(conversations);
        Ok(())
    }
}
