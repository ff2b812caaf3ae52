//! Colloquy Core - Headless Streaming Chat Sessions
//!
//! This crate manages one logical conversation with a remote generative
//! service: streamed or single-shot replies, attachments batched onto the next
//! message, cancellation of the single in-flight request, and error surfacing.
//! It has no UI dependencies; a front end subscribes to updates and renders
//! them.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Presentation Adapter                      │
//! │            (colloquy CLI, or any other front end)             │
//! │                              │                                │
//! │          send_message / stop / start_new_chat (down)          │
//! │              SessionUpdate / SessionSnapshot (up)             │
//! └──────────────────────────────┼────────────────────────────────┘
//!                                │
//! ┌──────────────────────────────┼────────────────────────────────┐
//! │                         COLLOQUY CORE                         │
//! │  ┌───────────────────────────┴─────────────────────────────┐  │
//! │  │                    SessionController                     │  │
//! │  │  ┌────────────┐  ┌──────────────┐  ┌──────────────────┐  │  │
//! │  │  │ MessageLog │  │ Attachment   │  │ GenerativeBackend│  │  │
//! │  │  │            │  │ Store        │  │ (Gemini)         │  │  │
//! │  │  └────────────┘  └──────────────┘  └──────────────────┘  │  │
//! │  └──────────────────────────────────────────────────────────┘  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`SessionController`]: Owns the conversation and the in-flight request
//! - [`SessionUpdate`]: Notifications for front ends
//! - [`MessageLog`]: Ordered, append-only history
//! - [`AttachmentStore`]: Media waiting for the next send
//! - [`GenerativeBackend`]: Transport abstraction, implemented by [`GeminiBackend`]
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use colloquy_core::{load_config, GeminiBackend, SendMode, SessionController};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let backend = GeminiBackend::from_settings(&config.backend)?;
//!     let controller = SessionController::new(Arc::new(backend), config.session);
//!
//!     let mut updates = controller.subscribe();
//!     let handle = controller.send_message("Hello!", SendMode::Streaming)?;
//!
//!     tokio::spawn(async move {
//!         while let Ok(update) = updates.recv().await {
//!             // Render update
//!         }
//!     });
//!
//!     handle.outcome().await;
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`attachments`]: Attachments and the pending Attachment Store
//! - [`backend`]: Generative backend abstraction and the Gemini client
//! - [`config`]: TOML + environment configuration
//! - [`controller`]: The Session Controller
//! - [`error`]: Transport and session errors
//! - [`messages`]: IDs, updates and snapshots for front ends
//! - [`presets`]: Built-in starting points for a session
//! - [`session`]: Messages and the Message Log
//! - [`validation`]: Input validation

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod attachments;
pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod messages;
pub mod presets;
pub mod session;
pub mod validation;

// Re-exports for convenience
pub use attachments::{
    mime_type_for_path, Attachment, AttachmentId, AttachmentKind, AttachmentPayload,
    AttachmentStore, LoadingState,
};
pub use backend::{
    Chunk, ChunkStream, Content, GeminiBackend, GenerateRequest, GenerateResponse,
    GenerationConfig, GenerativeBackend, GroundingMetadata, GroundingSource, Part, Platform,
    Role,
};
pub use controller::{RequestHandle, SendMode, SessionController};
pub use error::{SessionError, TransportError, TransportErrorKind};
pub use messages::{
    MessageId, RequestId, RequestOutcome, SessionId, SessionSnapshot, SessionUpdate,
};
pub use presets::{builtin_presets, find_preset, Preset};
pub use session::{Message, MessageLog, MessageState, Participant, SeedMessage};
pub use validation::{InputValidator, SessionLimits, ValidationResult};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, BackendSettings, ColloquyConfig,
    ColloquyToml, ConfigError, ConfigOverrides, ConfigSource, PlatformKind, SessionConfig,
};
