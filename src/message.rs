//! Inbound message envelope delivered to the application.

use bytes::Bytes;

use crate::error::Kind;
use crate::status::Status;

/// An item delivered by `Peer::read`.
///
/// This favors tagged variants over a single struct with a negative-sentinel
/// `msg_type` field for control frames — `Status` and error changes get
/// their own variants instead of borrowing the payload's type tag.
#[derive(Debug, Clone)]
pub enum Message {
    /// The peer's [`Status`] changed.
    StatusChange(Status),
    /// A terminal or per-frame error occurred.
    Error { kind: Kind, detail: String },
    /// An application frame arrived.
    Payload { msg_type: i32, payload: Bytes },
}
