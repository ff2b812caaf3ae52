//! Input Validation
//!
//! Checks an outgoing user turn before the session touches its state:
//! - Blank input with nothing sendable attached
//! - Oversized messages
//! - Control character injection
//! - Too many or too large attachments
//!
//! All validation is fail-safe: when in doubt, reject the input. A rejected
//! turn never reaches the Message Log.

use serde::{Deserialize, Serialize};

use crate::attachments::Attachment;

/// Configuration limits for a session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLimits {
    /// Maximum size of a single message in bytes (default: 100KB)
    pub max_message_size: usize,
    /// Maximum attachments bound to one message (default: 16)
    pub max_attachments: usize,
    /// Maximum size of one attachment in bytes (default: 20MB)
    pub max_attachment_bytes: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_message_size: 100 * 1024, // 100KB
            max_attachments: 16,
            max_attachment_bytes: 20 * 1024 * 1024, // 20MB, the inline request cap
        }
    }
}

/// Result of input validation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationResult {
    /// Input is valid
    Valid,
    /// Input is invalid with reason
    Invalid(String),
}

impl ValidationResult {
    /// Check if the result indicates valid input
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Get the error message if invalid
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Valid => None,
            Self::Invalid(msg) => Some(msg),
        }
    }
}

/// Input validator for outgoing turns
#[derive(Clone, Debug, Default)]
pub struct InputValidator {
    limits: SessionLimits,
}

impl InputValidator {
    /// Create a new input validator with the given limits
    #[must_use]
    pub fn new(limits: SessionLimits) -> Self {
        Self { limits }
    }

    /// Validate a user message together with the attachments it will carry
    #[must_use]
    pub fn validate_message(&self, content: &str, attachments: &[Attachment]) -> ValidationResult {
        // Attachments that produce no request part do not count as content
        if content.trim().is_empty() && !attachments.iter().any(Attachment::is_sendable) {
            return ValidationResult::Invalid("Message is empty".to_string());
        }

        if content.len() > self.limits.max_message_size {
            return ValidationResult::Invalid(format!(
                "Message too large: {} bytes (max: {})",
                content.len(),
                self.limits.max_message_size
            ));
        }

        // Newline, tab and carriage return are fine
        if content
            .chars()
            .any(|c| c.is_control() && c != '\n' && c != '\t' && c != '\r')
        {
            return ValidationResult::Invalid(
                "Message contains invalid control characters".to_string(),
            );
        }

        if attachments.len() > self.limits.max_attachments {
            return ValidationResult::Invalid(format!(
                "Too many attachments: {} (max: {})",
                attachments.len(),
                self.limits.max_attachments
            ));
        }

        if let Some(big) = attachments
            .iter()
            .find(|a| a.size() > self.limits.max_attachment_bytes)
        {
            return ValidationResult::Invalid(format!(
                "Attachment '{}' too large: {} bytes (max: {})",
                big.display_name,
                big.size(),
                self.limits.max_attachment_bytes
            ));
        }

        ValidationResult::Valid
    }
}
