#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Non-2xx response; carries the server-provided body text verbatim.
    #[error("{0}")]
    Api(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Internal: {0}")]
    Internal(String),
}
