//! Error types for the property store.
//!
//! Validation failures ([`StoreError::UnsupportedType`],
//! [`StoreError::InvalidKeyName`], [`StoreError::InvalidDefaultValue`]) are
//! returned synchronously to whoever called `create`. Everything else comes
//! out of a backing container and is always delivered to the runtime's
//! error sink, whether or not the caller also sees it.

use bastion_types::{KeyError, PrimitiveType};

/// Errors that can occur in the property store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The value type has no registered codec.
    #[error("no codec registered for type {type_name}")]
    UnsupportedType {
        /// Rust type name of the rejected type.
        type_name: &'static str,
    },

    /// A property name or namespace violates the key grammar.
    #[error("invalid key: {0}")]
    InvalidKeyName(#[from] KeyError),

    /// A textual default value is empty or whitespace.
    #[error("default value for {key} must not be blank")]
    InvalidDefaultValue {
        /// The key the default was supplied for.
        key: String,
    },

    /// The stored value has a different primitive type than requested.
    #[error("type mismatch at {key}: expected {expected}, found {found}")]
    TypeMismatch {
        /// The key being accessed.
        key: String,
        /// The primitive type the codec expects.
        expected: PrimitiveType,
        /// The primitive type actually stored.
        found: PrimitiveType,
    },

    /// The stored value has the right primitive type but cannot be decoded
    /// (e.g. an integer that is not a valid `char`).
    #[error("stored value at {key} cannot be decoded as {value_type}")]
    InvalidStoredValue {
        /// The key being accessed.
        key: String,
        /// The value type the codec decodes into.
        value_type: &'static str,
    },

    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A stored value could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other backing container failure.
    #[error("backing container error: {0}")]
    Backend(String),

    /// The background write worker is no longer running.
    #[error("write worker has stopped")]
    WorkerStopped,

    /// A lock guard from a different store runtime was presented.
    #[error("lock guard belongs to a different store runtime")]
    ForeignLock,
}

impl StoreError {
    /// Whether this error came from the backing container rather than from
    /// validation.
    pub const fn is_io(&self) -> bool {
        matches!(
            self,
            Self::Dragonfly(_) | Self::Serialization(_) | Self::Backend(_) | Self::WorkerStopped
        )
    }
}
