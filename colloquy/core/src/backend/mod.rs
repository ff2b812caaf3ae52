//! Generative Backend Integration
//!
//! This module provides abstracted access to the remote generative service
//! through a common trait interface.
//!
//! # Available Backends
//!
//! - **Gemini**: Generative Language REST API (default) or Vertex AI, chosen
//!   with [`Platform`]
//!
//! # Usage
//!
//! ```ignore
//! use colloquy_core::backend::{Content, GeminiBackend, GenerateRequest, GenerativeBackend};
//!
//! let backend = GeminiBackend::from_settings(&settings)?;
//! let request = GenerateRequest::new("gemini-2.5-flash").with_turn(Content::user_text("Hello!"));
//! let mut stream = backend.generate_stream(&request).await?;
//! ```

mod gemini;
mod traits;

pub use gemini::{GeminiBackend, Platform, DEFAULT_BASE_URL};
pub use traits::{
    Chunk, ChunkStream, Content, GenerateRequest, GenerateResponse, GenerationConfig,
    GenerativeBackend, GroundingMetadata, GroundingSource, Part, Role,
};
