use std::fmt;
use thiserror::Error;

/// Why an ingestion was refused or rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionFailure {
    /// The upload was not delimited text (wrong content type, unreadable body).
    NotTabular,
    /// The storage engine rejected DDL or the bulk load.
    StorageRejected,
}

impl fmt::Display for IngestionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestionFailure::NotTabular => write!(f, "not tabular"),
            IngestionFailure::StorageRejected => write!(f, "storage rejected load"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Ingestion failed ({reason}): {message}")]
    Ingestion {
        reason: IngestionFailure,
        message: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Upload not found: {0}")]
    UploadNotFound(u64),

    #[error("Table has already been taken: {0}")]
    TableTaken(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    pub fn not_tabular(message: impl Into<String>) -> Self {
        Error::Ingestion {
            reason: IngestionFailure::NotTabular,
            message: message.into(),
        }
    }

    pub fn storage_rejected(message: impl Into<String>) -> Self {
        Error::Ingestion {
            reason: IngestionFailure::StorageRejected,
            message: message.into(),
        }
    }

    /// Stable machine-readable code used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Io(_) => "IO_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::MalformedInput(_) => "MALFORMED_INPUT",
            Error::InvalidIdentifier(_) => "INVALID_IDENTIFIER",
            Error::Ingestion { reason: IngestionFailure::NotTabular, .. } => "NOT_TABULAR",
            Error::Ingestion { reason: IngestionFailure::StorageRejected, .. } => "STORAGE_REJECTED",
            Error::Storage(_) => "STORAGE_ERROR",
            Error::UploadNotFound(_) => "UPLOAD_NOT_FOUND",
            Error::TableTaken(_) => "TABLE_TAKEN",
            Error::Execution(_) => "EXECUTION_ERROR",
            Error::Transport(_) => "TRANSPORT_ERROR",
            Error::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
