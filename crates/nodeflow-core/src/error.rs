use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM provider not supported: {0}")]
    UnsupportedProvider(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Tool errors
    #[error("Tool simulation failed: {tool}: {message}")]
    ToolSimulation { tool: String, message: String },

    // Graph errors
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    #[error("Invalid connection at index {index}: {reason}")]
    InvalidConnection { index: usize, reason: String },

    #[error("No start node selected")]
    StartNodeMissing,

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    // Run errors
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Run cancelled")]
    Cancelled,

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FlowError>;
