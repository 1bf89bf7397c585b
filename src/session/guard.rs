//! Staleness guard
//!
//! A session may only mutate state while it is still the active session and
//! the conversation it was started for is still the one on screen.

/// Identity a session carries with every mutation it attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub epoch: u64,
    pub conversation_id: String,
}

impl Ticket {
    pub fn new(epoch: u64, conversation_id: impl Into<String>) -> Self {
        Self {
            epoch,
            conversation_id: conversation_id.into(),
        }
    }
}

/// Outcome of checking a ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Mutation may proceed
    Apply,
    /// The session was cancelled or replaced
    Detached,
    /// The session is live but the user moved to another conversation
    Stale,
}

/// Decide whether a mutation from `ticket` may be applied.
///
/// `active_epoch` is `None` when no session is active (or the active one was
/// cancelled); `active_conversation` is the id of the conversation currently
/// shown.
pub fn check(ticket: &Ticket, active_epoch: Option<u64>, active_conversation: Option<&str>) -> Verdict {
    if active_epoch != Some(ticket.epoch) {
        return Verdict::Detached;
    }
    if active_conversation != Some(ticket.conversation_id.as_str()) {
        return Verdict::Stale;
    }
    Verdict::Apply
}
