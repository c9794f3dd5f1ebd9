use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Unknown attendance status: {0}")]
    UnknownStatus(String),

    #[error("Unknown classification: {0}")]
    UnknownClassification(String),

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TreeError {
    #[error("Invalid path segment: {0:?}")]
    InvalidSegment(String),

    #[error("Update payload for {0:?} must be a JSON object")]
    UpdateNotObject(String),

    #[error("Push payload for {0:?} has no data")]
    EmptyPush(String),

    #[error("Cannot replace the root with a non-object value")]
    RootNotObject,
}
