//! Streaming sessions
//!
//! One session per user turn: it opens the event stream, applies each event
//! to the chat state through the staleness guard, and ends at the first
//! terminal event, on cancellation, or with a synthesized error.

mod controller;
mod effect;
mod guard;

#[cfg(test)]
pub mod testing;

pub use controller::{SendError, SessionController, SessionHandle, MAX_MESSAGE_LENGTH};
pub use effect::{plan, Effect, EventPlan, SessionOutcome};
pub use guard::{check, Ticket, Verdict};
