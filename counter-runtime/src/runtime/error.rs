use thiserror::Error;

/// Error returned by a document store operation.
/// Absence of a document on read is not an error, see `DocumentStore::read`.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum StoreError {
    /// Document with this id already exists in this partition.
    #[error("document already exists: {id}")]
    Conflict { id: String },

    /// Document targeted by replace does not exist.
    #[error("document not found: {id}")]
    NotFound { id: String },

    /// Conditional write was rejected because document was modified since it was read.
    #[error("document was modified concurrently: {id}")]
    PreconditionFailed { id: String },

    /// Database or container backing this store does not exist.
    #[error("database or container not found: {reason}")]
    ContainerNotFound { reason: String },

    /// Document does not have the shape expected by the caller.
    #[error("malformed document: {reason}")]
    MalformedDocument { reason: String },

    /// Credential could not be used to sign requests.
    #[error("invalid store credential: {reason}")]
    InvalidCredential { reason: String },

    /// Store operation failed because of internal error in store implementation or transport.
    /// If this happens, something is very broken (similar to 503 response in http).
    #[error("internal store error: {reason}")]
    InternalError { reason: String },
}

impl StoreError {
    /// Errors caused by a concurrent writer winning the race for the same document.
    pub fn is_write_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::PreconditionFailed { .. } | Self::NotFound { .. })
    }
}

#[derive(Error, Debug, Eq, PartialEq)]
pub enum SettingsError {
    #[error("store endpoint or key is missing")]
    MissingEndpointOrKey,
}
