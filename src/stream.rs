//! Event stream plumbing
//!
//! Bytes from the transport go through the frame buffer, then the decoder.

mod event;
mod frame;
mod transport;

#[cfg(test)]
mod proptests;

pub use event::{decode, DecodeError, StreamEvent};
pub use frame::{split_frames, Frame, FrameBuffer, DATA_PREFIX};
pub use transport::{
    Attachment, ByteStream, StreamTransport, TransportError, TurnRequest, CONNECT_FAILED_MESSAGE,
    READ_FAILED_MESSAGE, UNEXPECTED_END_MESSAGE,
};
