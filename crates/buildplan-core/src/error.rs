//! Error types for descriptor resolution.

use serde::Serialize;
use serde_json::{json, Value};

/// Errors produced while parsing, merging, or validating descriptors.
///
/// Every variant is recoverable by the caller; the resolver never panics on
/// bad input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("no descriptors to resolve")]
    NoDescriptors,

    #[error("missing required key '{key}'")]
    MissingRequiredKey { key: String },

    #[error(
        "version conflict for '{id}': '{existing}' (from {existing_origin}) vs '{incoming}' (from {incoming_origin})"
    )]
    VersionConflict {
        id: String,
        existing: String,
        existing_origin: String,
        incoming: String,
        incoming_origin: String,
    },

    #[error("malformed descriptor {origin}: {reason}")]
    MalformedDescriptor { origin: String, reason: String },

    #[error("unresolvable reference '{reference}' at '{key}': {reason}")]
    UnresolvableReference {
        reference: String,
        key: String,
        reason: String,
    },

    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

impl ConfigError {
    pub(crate) fn malformed(origin: &str, reason: impl Into<String>) -> Self {
        Self::MalformedDescriptor {
            origin: origin.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unresolvable(
        reference: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::UnresolvableReference {
            reference: reference.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Stable kind name, used for automation and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoDescriptors => "NoDescriptorsError",
            Self::MissingRequiredKey { .. } => "MissingRequiredKeyError",
            Self::VersionConflict { .. } => "VersionConflictError",
            Self::MalformedDescriptor { .. } => "MalformedDescriptorError",
            Self::UnresolvableReference { .. } => "UnresolvableReferenceError",
            Self::InvalidValue { .. } => "InvalidValueError",
        }
    }

    /// Machine-readable details: the offending key and values.
    pub fn data(&self) -> Value {
        match self {
            Self::NoDescriptors => Value::Null,
            Self::MissingRequiredKey { key } => json!({ "key": key }),
            Self::VersionConflict {
                id,
                existing,
                existing_origin,
                incoming,
                incoming_origin,
            } => json!({
                "id": id,
                "existing": { "version": existing, "origin": existing_origin },
                "incoming": { "version": incoming, "origin": incoming_origin },
            }),
            Self::MalformedDescriptor { origin, reason } => {
                json!({ "origin": origin, "reason": reason })
            }
            Self::UnresolvableReference {
                reference,
                key,
                reason,
            } => json!({ "reference": reference, "key": key, "reason": reason }),
            Self::InvalidValue { key, reason } => json!({ "key": key, "reason": reason }),
        }
    }

    /// Structured report suitable for serialization.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
            data: self.data(),
        }
    }
}

/// Serializable form of a [`ConfigError`].
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub data: Value,
}
