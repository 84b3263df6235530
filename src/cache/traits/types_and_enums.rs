//! Core error types shared by every hot-key component
//!
//! Errors are plain enums with hand-written `Display` so they can be cloned into
//! logs and snapshots without pulling in an error framework.

/// Cache operation error types
#[derive(Debug, Clone, PartialEq)]
pub enum CacheOperationError {
    /// Configuration rejected at construction time
    InvalidConfiguration(String),
    /// Lifecycle call made in the wrong state
    InvalidState(String),
    /// Background thread could not be created
    InitializationFailed(String),
    /// Storage collaborator failed; returned by custom `HotKeyStorage` implementations
    StorageError(String),
    /// Source fetch function failed
    FetchFailed(String),
}

impl std::fmt::Display for CacheOperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheOperationError::InvalidConfiguration(msg) => {
                write!(f, "Invalid configuration: {}", msg)
            }
            CacheOperationError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            CacheOperationError::InitializationFailed(msg) => {
                write!(f, "Initialization failed: {}", msg)
            }
            CacheOperationError::StorageError(msg) => write!(f, "Storage error: {}", msg),
            CacheOperationError::FetchFailed(msg) => write!(f, "Fetch failed: {}", msg),
        }
    }
}

impl std::error::Error for CacheOperationError {}

impl CacheOperationError {
    /// Create invalid state error
    #[inline(always)]
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create configuration error
    #[inline(always)]
    pub fn configuration_error(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create initialization error
    #[inline(always)]
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create storage error
    #[inline(always)]
    pub fn storage_error(msg: impl Into<String>) -> Self {
        Self::StorageError(msg.into())
    }

    /// Create fetch error
    #[inline(always)]
    pub fn fetch_failed(msg: impl Into<String>) -> Self {
        Self::FetchFailed(msg.into())
    }
}
