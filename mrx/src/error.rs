//! Error types for MRX decoding and encoding

use std::io;
use thiserror::Error;

/// Result type for MRX operations
pub type Result<T> = std::result::Result<T, MrxError>;

/// Errors that can occur while decoding or encoding an MRX stream
#[derive(Error, Debug)]
pub enum MrxError {
    /// The byte source or sink failed with something other than a clean end of stream.
    #[error("I/O failure while {context}: {source}")]
    IoFailure {
        /// What the engine was doing when the failure happened.
        context: String,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// I/O error while decoding an in-memory value.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The stream ended part way through a KLV record.
    #[error("Stream truncated: expected {expected_remaining} more bytes to complete the current KLV")]
    StreamTruncated {
        /// Bytes still missing from the record being assembled.
        expected_remaining: u64,
    },

    /// The stream ended before a partition's declared header or index bytes were read.
    #[error("Stream interrupted: partition declared {expected} bytes of {section}, stream ended after {consumed}")]
    StreamInterrupted {
        /// `"header metadata"` or `"index table"`.
        section: &'static str,
        /// Declared byte count.
        expected: u64,
        /// Bytes consumed before the stream ended.
        consumed: u64,
    },

    /// The byte source produced no data at all.
    #[error("Empty stream: no bytes were read from the source")]
    EmptyStream,

    /// The stream is not a usable MRX file.
    #[error("Invalid file: {0}")]
    InvalidFile(String),

    /// A KLV record could not be interpreted.
    #[error("Invalid KLV at offset {offset}: {message}")]
    InvalidKlv {
        /// Byte offset of the record.
        offset: u64,
        /// Description of the problem.
        message: String,
    },

    /// A partition pack could not be interpreted.
    #[error("Invalid partition: {0}")]
    InvalidPartition(String),

    /// A fixed-layout value was shorter than its layout requires.
    #[error("Insufficient data: need {needed} bytes, have {available}")]
    InsufficientData {
        /// Bytes required.
        needed: usize,
        /// Bytes present.
        available: usize,
    },

    /// Streams handed to the encoder disagree about their essence type.
    #[error("Mixed essence types: {0}")]
    MixedEssenceTypes(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A pipeline task panicked or was cancelled.
    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl MrxError {
    /// Create an I/O failure with context.
    pub fn io_failure(context: impl Into<String>, source: io::Error) -> Self {
        Self::IoFailure {
            context: context.into(),
            source,
        }
    }

    /// Create an invalid file error.
    pub fn invalid_file(message: impl Into<String>) -> Self {
        Self::InvalidFile(message.into())
    }

    /// Create an invalid KLV error.
    pub fn invalid_klv(offset: u64, message: impl Into<String>) -> Self {
        Self::InvalidKlv {
            offset,
            message: message.into(),
        }
    }

    /// Create an invalid partition error.
    pub fn invalid_partition(message: impl Into<String>) -> Self {
        Self::InvalidPartition(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
