use thiserror::Error;

/// Machine-readable classification of a store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    KeyNotFound,
    ElementNotFound,
    KeyExists,
    InvalidInput,
    Connection,
    Command,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Key '{0}' not found")]
    KeyNotFound(String),

    #[error("Element '{element}' not found in '{key}'")]
    ElementNotFound { key: String, element: String },

    #[error("Key '{0}' already exists")]
    KeyExists(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Redis client error: {0}")]
    Client(#[from] redis::RedisError),

    #[error("Unexpected reply: {0}")]
    Unexpected(String),
}

impl StoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            StoreError::KeyNotFound(_) => ErrorCode::KeyNotFound,
            StoreError::ElementNotFound { .. } => ErrorCode::ElementNotFound,
            StoreError::KeyExists(_) => ErrorCode::KeyExists,
            StoreError::InvalidInput(_) => ErrorCode::InvalidInput,
            StoreError::Connection(_) => ErrorCode::Connection,
            StoreError::Client(_) | StoreError::Unexpected(_) => ErrorCode::Command,
        }
    }

    /// The targeted key or element no longer exists server-side.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::KeyNotFound | ErrorCode::ElementNotFound
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_covers_keys_and_elements() {
        assert!(StoreError::KeyNotFound("a".into()).is_not_found());
        assert!(StoreError::ElementNotFound {
            key: "a".into(),
            element: "f".into()
        }
        .is_not_found());
        assert!(!StoreError::KeyExists("a".into()).is_not_found());
        assert!(!StoreError::Connection("down".into()).is_not_found());
    }

    #[test]
    fn codes_follow_variants() {
        assert_eq!(StoreError::KeyNotFound("user:1".into()).code(), ErrorCode::KeyNotFound);
        let element = StoreError::ElementNotFound {
            key: "user:1".into(),
            element: "age".into(),
        };
        assert_eq!(element.code(), ErrorCode::ElementNotFound);
        assert_eq!(StoreError::InvalidInput("empty".into()).code(), ErrorCode::InvalidInput);
    }
}
