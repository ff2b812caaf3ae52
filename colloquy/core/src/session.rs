//! Message Log
//!
//! The ordered history of a conversation. Messages are only ever appended;
//! after insertion, the one message that may still change is the trailing
//! assistant message while its response is being produced. Once a message
//! reaches `Complete` or `Failed` it is frozen.
//!
//! # Design Philosophy
//!
//! The log is plain data with no knowledge of transports or tasks. The
//! controller serializes access to it; every mutator here refuses to touch
//! anything other than the trailing, unfrozen assistant message, so a stale
//! writer cannot corrupt history even if it slips past the controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attachments::Attachment;
use crate::backend::{Content, GroundingMetadata, Part, Role};
use crate::error::TransportError;
use crate::messages::MessageId;

/// Who authored a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Participant {
    /// The person using the app
    User,
    /// The generative model
    Assistant,
}

/// Lifecycle of a message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageState {
    /// Waiting for the first chunk or the full response
    Pending,
    /// Receiving chunks
    Streaming,
    /// Finished successfully
    Complete,
    /// Finished with a transport error
    Failed(TransportError),
}

impl MessageState {
    /// Whether the message can no longer change
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed(_))
    }
}

/// A message in the conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,
    /// Who sent this message
    pub participant: Participant,
    /// Text, absent until the first text arrives
    pub content: Option<String>,
    /// Lifecycle state
    pub state: MessageState,
    /// Media bound to a user message
    pub attachments: Vec<Attachment>,
    /// Grounding metadata reported for an assistant message
    pub grounding: Option<GroundingMetadata>,
    /// When the message was created
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a finished user message
    pub fn user(content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            id: MessageId::new(),
            participant: Participant::User,
            content: Some(content.into()),
            state: MessageState::Complete,
            attachments,
            grounding: None,
            created_at: Utc::now(),
        }
    }

    /// Create an assistant placeholder awaiting a response
    #[must_use]
    pub fn pending_assistant() -> Self {
        Self {
            id: MessageId::new(),
            participant: Participant::Assistant,
            content: None,
            state: MessageState::Pending,
            attachments: Vec::new(),
            grounding: None,
            created_at: Utc::now(),
        }
    }

    /// Create a finished assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            state: MessageState::Complete,
            content: Some(content.into()),
            ..Self::pending_assistant()
        }
    }

    /// Content or the empty string
    #[must_use]
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    pub(crate) fn to_content(&self) -> Content {
        let role = match self.participant {
            Participant::User => Role::User,
            Participant::Assistant => Role::Model,
        };
        let mut parts = Vec::with_capacity(1 + self.attachments.len());
        if let Some(text) = self.content.as_deref().filter(|t| !t.is_empty()) {
            parts.push(Part::Text(text.to_string()));
        }
        parts.extend(self.attachments.iter().filter_map(Attachment::to_part));
        Content { role, parts }
    }
}

/// A message used to seed history, e.g. from a preset
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedMessage {
    /// Author
    pub participant: Participant,
    /// Text
    pub text: String,
}

impl SeedMessage {
    /// Seed a user turn
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            participant: Participant::User,
            text: text.into(),
        }
    }

    /// Seed an assistant turn
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            participant: Participant::Assistant,
            text: text.into(),
        }
    }
}

/// Ordered, append-only conversation history
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log pre-populated with finished messages
    ///
    /// Seeds without text are dropped.
    #[must_use]
    pub fn from_seed(seed: &[SeedMessage]) -> Self {
        let messages = seed
            .iter()
            .filter(|s| !s.text.is_empty())
            .map(|s| match s.participant {
                Participant::User => Message::user(s.text.clone(), Vec::new()),
                Participant::Assistant => Message::assistant(s.text.clone()),
            })
            .collect();
        Self { messages }
    }

    /// Append a user message
    pub fn push_user(&mut self, content: String, attachments: Vec<Attachment>) -> &Message {
        self.push(Message::user(content, attachments))
    }

    /// Append a pending assistant placeholder
    pub fn push_pending_assistant(&mut self) -> &Message {
        self.push(Message::pending_assistant())
    }

    fn push(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        let idx = self.messages.len() - 1;
        &self.messages[idx]
    }

    /// The trailing assistant message if it has the given ID and is not frozen
    fn open_assistant(&mut self, id: &MessageId) -> Option<&mut Message> {
        self.messages.last_mut().filter(|m| {
            &m.id == id && m.participant == Participant::Assistant && !m.state.is_frozen()
        })
    }

    /// Apply one streamed chunk
    ///
    /// Moves the message to `Streaming` and appends `delta` when it has text.
    /// Content stays `None` until some text arrives.
    /// Returns `None` if `id` is not the open trailing assistant message.
    pub fn apply_delta(&mut self, id: &MessageId, delta: Option<&str>) -> Option<&Message> {
        let msg = self.open_assistant(id)?;
        msg.state = MessageState::Streaming;
        if let Some(text) = delta.filter(|t| !t.is_empty()) {
            msg.content.get_or_insert_with(String::new).push_str(text);
        }
        Some(msg)
    }

    /// Record grounding metadata on the open trailing assistant message
    pub fn set_grounding(&mut self, id: &MessageId, grounding: GroundingMetadata) -> bool {
        match self.open_assistant(id) {
            Some(msg) => {
                msg.grounding = Some(grounding);
                true
            }
            None => false,
        }
    }

    /// Freeze the open trailing assistant message as `Complete`
    ///
    /// `content`, when given and non-empty, replaces whatever was streamed.
    pub fn complete(&mut self, id: &MessageId, content: Option<String>) -> Option<&Message> {
        let msg = self.open_assistant(id)?;
        if let Some(content) = content.filter(|c| !c.is_empty()) {
            msg.content = Some(content);
        }
        msg.state = MessageState::Complete;
        Some(msg)
    }

    /// Freeze the open trailing assistant message as `Failed`, keeping partial content
    pub fn fail(&mut self, id: &MessageId, error: TransportError) -> Option<&Message> {
        let msg = self.open_assistant(id)?;
        msg.state = MessageState::Failed(error);
        Some(msg)
    }

    /// Discard all history
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Get message by ID
    #[must_use]
    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// Most recent message
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// All messages in insertion order
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Conversation history to send with the next request
    ///
    /// Only finished exchanges are included: a user turn whose reply failed,
    /// was cancelled or is still open is left out together with that reply.
    #[must_use]
    pub fn history_contents(&self) -> Vec<Content> {
        let mut contents = Vec::with_capacity(self.messages.len());
        for (idx, msg) in self.messages.iter().enumerate() {
            if msg.state != MessageState::Complete {
                continue;
            }
            if msg.participant == Participant::User {
                let reply_unfinished = self.messages.get(idx + 1).is_some_and(|next| {
                    next.participant == Participant::Assistant
                        && next.state != MessageState::Complete
                });
                if reply_unfinished {
                    continue;
                }
            }
            let content = msg.to_content();
            if !content.parts.is_empty() {
                contents.push(content);
            }
        }
        contents
    }
}
