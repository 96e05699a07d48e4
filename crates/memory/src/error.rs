//! Memory engine error type. These never terminate a session: the tool
//! surface turns them into a textual payload the model sees and may act on.

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("underlying store failure: {0}")]
    Store(#[from] sled::Error),

    #[error("failed to (de)serialize a stored record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("entity not found: {0}")]
    EntityNotFound(String),
}

pub type Result<T> = std::result::Result<T, MemoryError>;
