#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("space '{space}' does not exist")]
    NoSuchSpace { space: String },
    #[error("user '{user}' does not exist")]
    NoSuchUser { user: String },
    #[error("duplicate key '{key}' in unique index 'primary' of space '{space}'")]
    DuplicateKey { space: String, key: String },
    #[error("space '{space}' has no primary index")]
    MissingPrimaryIndex { space: String },
    #[error("space '{space}': invalid index '{index}': {message}")]
    InvalidIndex {
        space: String,
        index: String,
        message: String,
    },
    #[error("space '{space}': field '{field}': {message}")]
    FormatViolation {
        space: String,
        field: String,
        message: String,
    },
    #[error("failed to encode record for space '{space}': {source}")]
    Encode {
        space: String,
        source: serde_json::Error,
    },
    #[error("failed to decode record from space '{space}': {source}")]
    Decode {
        space: String,
        source: serde_json::Error,
    },
    #[error("{message}")]
    Persistence { message: String },
}

impl StoreError {
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }
}
