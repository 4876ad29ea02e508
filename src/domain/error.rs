//! Validation errors for domain messages.

use thiserror::Error;

/// A message field failed validation.
///
/// Raised when assembling outbound messages from caller input and when an
/// inbound frame decodes into a structurally valid but semantically invalid
/// message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid {field}: {reason}")]
pub struct ParameterError {
    field: &'static str,
    reason: String,
}

impl ParameterError {
    /// Create a new error for `field`.
    #[must_use]
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }

    /// Name of the offending field.
    #[must_use]
    pub fn field(&self) -> &'static str { self.field }

    /// Human-readable description of the violated constraint.
    #[must_use]
    pub fn reason(&self) -> &str { &self.reason }
}
