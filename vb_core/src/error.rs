/// Core error type for veribits
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("External error: {0}")]
    External(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Command name outside the executor allow-list
    #[error("Command not allowed: {0}")]
    CommandNotAllowed(String),

    /// Spawning or supervising a child process failed
    #[error("Process error: {0}")]
    Process(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Database(_) => "database",
            Error::External(_) => "external",
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::CommandNotAllowed(_) => "command_not_allowed",
            Error::Process(_) => "process",
            Error::Io(_) => "io",
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
