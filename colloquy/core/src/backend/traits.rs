//! Generative Backend Traits
//!
//! Trait definitions for the remote generative service. The session controller
//! only talks to this abstraction, so the vendor client can be swapped for a
//! scripted one in tests.
//!
//! # Design Philosophy
//!
//! The [`GenerativeBackend`] trait provides a common interface for:
//! - Sending a conversation and receiving one full response
//! - Sending a conversation and receiving the response as a lazy stream of chunks
//! - Health checking the service
//!
//! Implementations handle provider-specific details (API formats, auth, etc.)

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Author of a request turn, in the service's terms
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Human turn
    User,
    /// Model turn
    Model,
}

impl Role {
    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// One piece of a request turn
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Part {
    /// Plain text
    Text(String),
    /// Bytes sent inline
    InlineData {
        /// MIME type of `data`
        mime_type: String,
        /// Raw bytes
        data: Vec<u8>,
    },
    /// Remote file reference
    FileData {
        /// MIME type of the file
        mime_type: String,
        /// File URI
        uri: String,
    },
}

/// One turn of a conversation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Content {
    /// Author
    pub role: Role,
    /// Parts in order
    pub parts: Vec<Part>,
}

impl Content {
    /// A user turn holding only text
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text(text.into())],
        }
    }
}

/// Sampling parameters
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GenerationConfig {
    /// Temperature (service default when `None`)
    pub temperature: Option<f32>,
    /// Output token cap (service default when `None`)
    pub max_output_tokens: Option<u32>,
}

impl GenerationConfig {
    /// Whether every field is left to the service default
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.temperature.is_none() && self.max_output_tokens.is_none()
    }
}

/// A request to the generative service
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GenerateRequest {
    /// Model to use (backend-specific identifier)
    pub model: String,
    /// Prior turns followed by the new user turn
    pub contents: Vec<Content>,
    /// System instruction
    pub system_instruction: Option<String>,
    /// Sampling parameters
    pub generation: GenerationConfig,
}

impl GenerateRequest {
    /// Create a request for a model
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Set the conversation turns
    #[must_use]
    pub fn with_contents(mut self, contents: Vec<Content>) -> Self {
        self.contents = contents;
        self
    }

    /// Append one turn
    #[must_use]
    pub fn with_turn(mut self, content: Content) -> Self {
        self.contents.push(content);
        self
    }

    /// Set the system instruction
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_instruction = Some(system.into());
        self
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.generation.temperature = Some(temperature.clamp(0.0, 2.0));
        self
    }

    /// Set the output token cap
    #[must_use]
    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.generation.max_output_tokens = Some(max);
        self
    }
}

/// A web source backing a grounded answer
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingSource {
    /// Page title
    pub title: Option<String>,
    /// Page URI
    pub uri: String,
}

/// Grounding metadata reported alongside a response
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingMetadata {
    /// Search queries the service issued
    pub web_search_queries: Vec<String>,
    /// Sources cited
    pub sources: Vec<GroundingSource>,
}

/// Full response from a non-streaming request
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GenerateResponse {
    /// Response text, absent when the service returned none
    pub text: Option<String>,
    /// Grounding metadata
    pub grounding: Option<GroundingMetadata>,
    /// Model that generated the response
    pub model: String,
    /// Tokens used (if reported)
    pub tokens_used: Option<u32>,
    /// Response generation time in milliseconds
    pub duration_ms: Option<u64>,
}

/// One increment of a streamed response
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Chunk {
    /// Text delta
    pub text: Option<String>,
    /// Grounding metadata carried by this chunk
    pub grounding: Option<GroundingMetadata>,
}

impl Chunk {
    /// A chunk carrying only text
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            grounding: None,
        }
    }
}

/// Lazy, finite sequence of chunks
///
/// Ends with `None` on normal completion. An `Err` item ends the response
/// abnormally. Dropping the stream abandons consumption; the service is not
/// told to stop.
pub type ChunkStream = BoxStream<'static, Result<Chunk, TransportError>>;

/// Generative backend trait
///
/// Implement this trait to add support for a different service.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Get the backend name (e.g., "Gemini")
    fn name(&self) -> &str;

    /// Send a request and wait for the complete response
    async fn generate(&self, request: &GenerateRequest)
        -> Result<GenerateResponse, TransportError>;

    /// Send a request and get the response as a chunk stream
    async fn generate_stream(&self, request: &GenerateRequest)
        -> Result<ChunkStream, TransportError>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool {
        true
    }
}
