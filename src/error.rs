use thiserror::Error;

/// Errors that can occur when using a typed map
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    /// The requested key ID has no entry
    #[error("Value does not exist for the key: {0}")]
    KeyNotFound(String),
    /// The entry exists but its declared type is not compatible with the requested type
    #[error("Key type {requested} is not assignable from the existing value type {declared}")]
    TypeMismatch { requested: String, declared: String },
    /// The entry's holder does not support value replacement
    #[error("Entry does not support value replacement: {0}")]
    ImmutableEntry(String),
    /// A construction argument was rejected, such as a duplicate key ID
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl MapError {
    pub(crate) fn mismatch(
        requested: &crate::TypeDescriptor,
        declared: &crate::TypeDescriptor,
    ) -> Self {
        MapError::TypeMismatch {
            requested: requested.to_string(),
            declared: declared.to_string(),
        }
    }
}
