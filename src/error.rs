/// Centralized error types for semdex using thiserror
///
/// Embedding failures are a closed set of kinds so the indexing pipeline can
/// decide between "skip", "count as error" and "abort startup" without ever
/// looking at message text.
use thiserror::Error;

/// Main error type for the semantic index
#[derive(Error, Debug)]
pub enum SemdexError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector database error: {0}")]
    VectorDb(#[from] VectorDbError),

    #[error("Indexing error: {0}")]
    Indexing(#[from] IndexingError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Discriminant of an [`EmbeddingError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingErrorKind {
    ConnectionFailed,
    ModelNotFound,
    ContextLengthExceeded,
    InvalidResponse,
    InitializationFailed,
}

/// Errors surfaced by an embedding provider
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Cannot connect to embedding service at {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("Embedding model '{0}' not found")]
    ModelNotFound(String),

    #[error("Input text exceeds the context length of model '{0}'")]
    ContextLengthExceeded(String),

    #[error("Invalid response from embedding service: {0}")]
    InvalidResponse(String),

    #[error("Failed to initialize embedding model: {0}")]
    InitializationFailed(String),
}

impl EmbeddingError {
    pub fn kind(&self) -> EmbeddingErrorKind {
        match self {
            EmbeddingError::ConnectionFailed { .. } => EmbeddingErrorKind::ConnectionFailed,
            EmbeddingError::ModelNotFound(_) => EmbeddingErrorKind::ModelNotFound,
            EmbeddingError::ContextLengthExceeded(_) => EmbeddingErrorKind::ContextLengthExceeded,
            EmbeddingError::InvalidResponse(_) => EmbeddingErrorKind::InvalidResponse,
            EmbeddingError::InitializationFailed(_) => EmbeddingErrorKind::InitializationFailed,
        }
    }

    /// A file that cannot be embedded at current model limits is skipped, not failed
    pub fn is_skippable(&self) -> bool {
        self.kind() == EmbeddingErrorKind::ContextLengthExceeded
    }
}

/// Errors related to vector database operations
#[derive(Error, Debug)]
pub enum VectorDbError {
    #[error("Failed to open vector database: {0}")]
    OpenFailed(String),

    #[error("Failed to initialize vector table: {0}")]
    InitializationFailed(String),

    #[error("Failed to write documents: {0}")]
    WriteFailed(String),

    #[error("Failed to query documents: {0}")]
    QueryFailed(String),

    #[error("Failed to delete documents: {0}")]
    DeleteFailed(String),

    #[error("Embedding has {actual} dimensions but the index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Vector database is not initialized")]
    NotInitialized,
}

/// Errors related to the indexing pipeline
#[derive(Error, Debug)]
pub enum IndexingError {
    #[error("Failed to scan directory '{dir}': {reason}")]
    ScanFailed { dir: String, reason: String },

    #[error("Index is read-only: another semdex process holds the writer lock")]
    ReadOnly,

    #[error("Failed to start file watcher: {0}")]
    WatcherFailed(String),
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

/// Errors related to input validation
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Directory not registered: {0}")]
    DirectoryNotRegistered(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("{field} must be {constraint}, got {actual}")]
    ConstraintViolation {
        field: String,
        constraint: String,
        actual: String,
    },
}

/// Errors related to the directory registry file
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Failed to load registry from '{path}': {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("Failed to save registry to '{path}': {reason}")]
    SaveFailed { path: String, reason: String },

    #[error("Failed to lock registry '{path}': {reason}")]
    LockFailed { path: String, reason: String },

    #[error("Directory already registered: {0}")]
    AlreadyRegistered(String),
}

// Conversion from anyhow::Error to SemdexError
impl From<anyhow::Error> for SemdexError {
    fn from(err: anyhow::Error) -> Self {
        SemdexError::Other(format!("{:#}", err))
    }
}

impl SemdexError {
    /// Create a new error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        SemdexError::Other(msg.into())
    }

    /// Recover the typed store error from an anyhow chain when there is one
    pub fn from_store(err: anyhow::Error) -> Self {
        match err.downcast::<VectorDbError>() {
            Ok(e) => SemdexError::VectorDb(e),
            Err(other) => SemdexError::Other(format!("{:#}", other)),
        }
    }

    /// Check if this is a caller error (validation) vs system error
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            SemdexError::Validation(_) | SemdexError::Config(ConfigError::InvalidValue { .. })
        )
    }

    /// Embedding failures that drop one queued item without stalling the pipeline
    pub fn is_per_item(&self) -> bool {
        matches!(
            self,
            SemdexError::Embedding(e) if matches!(
                e.kind(),
                EmbeddingErrorKind::ConnectionFailed
                    | EmbeddingErrorKind::ModelNotFound
                    | EmbeddingErrorKind::InvalidResponse
            )
        )
    }
}

pub type Result<T, E = SemdexError> = std::result::Result<T, E>;
