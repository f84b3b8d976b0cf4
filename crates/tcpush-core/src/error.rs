//! Error types for tcpush.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Push context errors
    #[error("Invalid template context: {0}")]
    InvalidContext(String),

    // Template and graph errors
    #[error("String: '{0}' isn't a time expression")]
    MalformedTimeExpression(String),

    #[error("Template render error: {0}")]
    Render(String),

    #[error("Graph parse error: {0}")]
    GraphParse(String),

    #[error("Unsupported graph version: {0}")]
    UnsupportedVersion(String),

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Invalid task definition: {0}")]
    InvalidTask(String),

    // Push job errors
    #[error("Unknown project: {0}")]
    UnknownProject(String),

    #[error("Pushlog error: {0}")]
    Pushlog(String),

    #[error("Graph not found at {0}")]
    GraphNotFound(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Error task could not be built: {0}")]
    ErrorTask(String),

    // Queue errors
    #[error("Task {task_id} submission failed: {message}")]
    Queue { task_id: String, message: String },

    // Infrastructure errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error came from rendering or interpreting a graph.
    ///
    /// Graph errors are replaced by the error task at the scheduler boundary;
    /// every other error reaches the caller.
    pub fn is_graph_error(&self) -> bool {
        matches!(
            self,
            Error::MalformedTimeExpression(_)
                | Error::Render(_)
                | Error::GraphParse(_)
                | Error::UnsupportedVersion(_)
                | Error::Expression(_)
                | Error::InvalidTask(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::GraphParse(err.to_string())
    }
}
