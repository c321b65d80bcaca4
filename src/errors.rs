use thiserror::Error;

// --- Repository / Storage Errors ---

#[derive(Error, Debug)]
pub enum RepoError {
    /// A conditional write hit an existing unique pair (e.g. the viewer
    /// already likes this meme). Callers reinterpret this as "already in
    /// that state" rather than a failure.
    #[error("Record already exists: {0}")]
    Conflict(String),

    #[error("Database backend error: {0}")]
    BackendError(#[from] anyhow::Error),

    #[error("Corrupt record in backend: {0}")]
    DataCorruption(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File upload failed: {0}")]
    UploadFailed(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMedia(String),

    #[error("Storage backend error: {0}")]
    BackendError(#[from] anyhow::Error),
}

// --- AI Collaborator Errors ---

#[derive(Error, Debug)]
pub enum AiError {
    #[error("AI API key is not configured")]
    MissingApiKey,

    #[error("AI request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AI service returned an error: {0}")]
    Service(String),

    /// The model produced text we could not parse into the structure we
    /// asked for, even after stripping code fences. No partial state is
    /// applied when this happens.
    #[error("Malformed AI response: {0}")]
    MalformedResponse(String),
}

// --- Top-level Store Error ---

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Not signed in")]
    SignInRequired,

    #[error("Meme not found with ID: {0}")]
    MemeNotFound(String),

    #[error(transparent)]
    Repository(#[from] RepoError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Ai(#[from] AiError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization error: {0}")]
    Init(String),
}

impl From<crate::config::ConfigError> for StoreError {
    fn from(err: crate::config::ConfigError) -> Self {
        StoreError::Config(err.to_string())
    }
}
