//! Session Updates
//!
//! Identifiers and the notifications a [`SessionController`] broadcasts to
//! whatever is presenting the conversation (terminal, GUI, test harness).
//!
//! # Design Philosophy
//!
//! The controller owns all conversation state. Presentation layers never
//! mutate it; they subscribe to [`SessionUpdate`]s and either apply them
//! incrementally or re-read a [`SessionSnapshot`] when they fall behind.
//!
//! [`SessionController`]: crate::controller::SessionController

use serde::{Deserialize, Serialize};

use crate::attachments::Attachment;
use crate::backend::GroundingMetadata;
use crate::error::{SessionError, TransportError};
use crate::session::{Message, MessageState};

/// Message identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new unique message ID
    #[must_use]
    pub fn new() -> Self {
        Self(format!("msg_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new unique session ID
    #[must_use]
    pub fn new() -> Self {
        Self(format!("session_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifier of one `send_message` unit of work
///
/// Monotonic within a process so log lines sort in send order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl RequestId {
    /// Allocate the next request ID
    #[must_use]
    pub fn next() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req_{}", self.0)
    }
}

/// How a request ended
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestOutcome {
    /// The assistant message reached `Complete`
    Completed,
    /// The transport failed; the assistant message is `Failed`
    Failed(TransportError),
    /// Superseded by a newer send, `stop()` or `start_new_chat()`
    Cancelled,
}

/// Notifications broadcast by the session controller
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SessionUpdate {
    /// A message was appended to the log
    MessageAdded {
        /// The new message, as inserted
        message: Message,
    },

    /// Streamed text was appended to a message
    Delta {
        /// Message receiving the text
        message_id: MessageId,
        /// The appended text
        text: String,
    },

    /// A message changed lifecycle state
    MessageState {
        /// The message
        message_id: MessageId,
        /// Its new state
        state: MessageState,
    },

    /// Non-streamed content was set on a message in one go
    ContentSet {
        /// The message
        message_id: MessageId,
        /// The full content
        content: Option<String>,
    },

    /// Grounding metadata arrived for a message
    Grounding {
        /// The message
        message_id: MessageId,
        /// Reported metadata
        grounding: GroundingMetadata,
    },

    /// A request became the session's active request
    RequestStarted {
        /// The request
        request_id: RequestId,
    },

    /// A request ended
    RequestFinished {
        /// The request
        request_id: RequestId,
        /// How it ended
        outcome: RequestOutcome,
    },

    /// The pending attachment set changed
    AttachmentsChanged {
        /// Number of pending attachments
        count: usize,
    },

    /// Session-level error for dedicated error affordances
    Error {
        /// The error
        error: SessionError,
    },

    /// History, attachments and error were discarded
    Cleared,
}

/// Full view of a session at one point in time
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Session ID
    pub session_id: SessionId,
    /// Model requests are sent to
    pub model: String,
    /// Preset title, empty when none
    pub title: String,
    /// Suggested first prompt, empty when none
    pub initial_prompt: String,
    /// Conversation history in insertion order
    pub messages: Vec<Message>,
    /// Attachments queued for the next send
    pub pending_attachments: Vec<Attachment>,
    /// Last session-level error
    pub last_error: Option<SessionError>,
    /// Whether a request is active
    pub in_progress: bool,
}
