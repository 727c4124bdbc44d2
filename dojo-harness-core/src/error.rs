use crate::models::OutputStream;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid UTF-8 on {stream}: {source}")]
    InvalidUtf8 {
        stream: OutputStream,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("Shell interpreter not found: {0}")]
    ShellNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HarnessError>;
