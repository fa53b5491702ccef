//! Error handling.

use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::put_object::PutObjectError;
use aws_smithy_types::byte_stream::error::Error as ByteStreamError;
use std::error::Error;
use std::path::PathBuf;
use strum_macros::Display;
use thiserror::Error;
use tracing::{event, Level};

/// Maximum number of characters of error text sent to the coordinating service.
pub const MAX_ERROR_CHARS: usize = 1024;

/// Transformer error type
///
/// This type encapsulates the various errors that may occur while handling a request.
/// Each variant belongs to one [ErrorKind].
#[derive(Debug, Error)]
pub enum TransformerError {
    /// Error opening the input file
    #[error("failed to open input file {path}")]
    InputOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error decoding the contents of a tree file
    #[error("failed to decode tree file {path}")]
    FileFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The requested tree is not present in the input file
    #[error("tree {tree} not found in input file")]
    TreeNotFound { tree: String },

    /// The requested tree is not a valid row container
    #[error("tree {tree} is malformed")]
    TreeFormat {
        tree: String,
        #[source]
        source: serde_json::Error,
    },

    /// Error writing the output file
    #[error("failed to write output file {path}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error removing the local output file after upload
    #[error("failed to remove output file {path}")]
    OutputRemove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error (de)compressing file data
    #[error("failed to (de)compress file data")]
    Compression(#[from] std::io::Error),

    /// A branch required by the selection or reconstruction is missing from an entry
    #[error("branch {branch} missing from entry {entry}")]
    BranchMissing { branch: String, entry: usize },

    /// A branch holds a value of the wrong type
    #[error("branch {branch} of entry {entry} is not {expected}")]
    BranchType {
        branch: String,
        entry: usize,
        expected: &'static str,
    },

    /// A kinematic input used by the reconstruction is not finite
    #[error("non-finite {quantity} in entry {entry}")]
    NonFinite { quantity: String, entry: usize },

    /// The background transform task panicked or was cancelled
    #[error("transform task failed")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// Error reading the output file for upload
    #[error("error reading output file for upload")]
    S3ByteStream(#[from] ByteStreamError),

    /// Error while uploading an object to S3
    #[error("error uploading object to S3 storage")]
    S3PutObject(#[from] SdkError<PutObjectError>),

    /// Error sending a status or completion record
    #[error("error reporting to {url}")]
    Report {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Error deserialising a request message
    #[error("request message is not valid JSON")]
    RequestJson(#[source] serde_json::Error),

    /// Error validating a request message
    #[error("request message is not valid")]
    RequestValidation(#[from] validator::ValidationErrors),

    /// Error serialising a record for publication
    #[error("failed to serialise {record}")]
    Serialise {
        record: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Error communicating with the message broker
    #[error("message broker error")]
    Queue(#[from] lapin::Error),

    /// Error serving the metrics endpoints
    #[error("metrics server on {addr} failed")]
    MetricsServer {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Invalid selection expression
    #[error("invalid selection expression {expression:?}")]
    InvalidSelection { expression: String },

    /// Invalid configuration
    #[error("invalid configuration: {message}")]
    Config { message: String },
}

/// Error taxonomy reported to the coordinating service and used for metrics labels.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ErrorKind {
    #[strum(serialize = "IOError")]
    Io,
    #[strum(serialize = "ComputeError")]
    Compute,
    #[strum(serialize = "UploadError")]
    Upload,
    #[strum(serialize = "ReportError")]
    Report,
    #[strum(serialize = "RequestError")]
    Request,
    #[strum(serialize = "QueueError")]
    Queue,
    #[strum(serialize = "ConfigError")]
    Config,
}

impl TransformerError {
    /// Return the [ErrorKind] of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransformerError::InputOpen { .. }
            | TransformerError::FileFormat { .. }
            | TransformerError::TreeNotFound { .. }
            | TransformerError::TreeFormat { .. }
            | TransformerError::OutputWrite { .. }
            | TransformerError::OutputRemove { .. }
            | TransformerError::Compression(_)
            | TransformerError::MetricsServer { .. } => ErrorKind::Io,

            TransformerError::BranchMissing { .. }
            | TransformerError::BranchType { .. }
            | TransformerError::NonFinite { .. }
            | TransformerError::TaskJoin(_) => ErrorKind::Compute,

            TransformerError::S3ByteStream(_)
            | TransformerError::S3PutObject(_) => ErrorKind::Upload,

            TransformerError::Report { .. } => ErrorKind::Report,

            TransformerError::RequestJson(_)
            | TransformerError::RequestValidation(_)
            | TransformerError::Serialise { .. } => ErrorKind::Request,

            TransformerError::Queue(_) => ErrorKind::Queue,

            TransformerError::InvalidSelection { .. } | TransformerError::Config { .. } => {
                ErrorKind::Config
            }
        }
    }

    /// Return the error message followed by its chain of causes.
    ///
    /// Consecutive duplicate messages are removed.
    pub fn describe(&self) -> String {
        let mut messages = vec![self.to_string()];
        let mut current = self.source();
        while let Some(source) = current {
            messages.push(source.to_string());
            current = source.source();
        }
        messages.dedup();
        messages.join(": ")
    }

    /// Return [describe](TransformerError::describe) truncated to [MAX_ERROR_CHARS] characters.
    pub fn truncated(&self) -> String {
        truncate_chars(&self.describe(), MAX_ERROR_CHARS)
    }

    /// Log the error and its causes.
    pub fn log(&self) {
        event!(Level::ERROR, kind = %self.kind(), "{}", self);
        let mut current = self.source();
        while let Some(source) = current {
            event!(Level::ERROR, "Caused by: {}", source);
            current = source.source();
        }
    }
}

/// Truncate a string to at most `max` characters, respecting character boundaries.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((index, _)) => text[..index].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_transformer_error(
        error: TransformerError,
        kind: ErrorKind,
        message: &str,
        described: &str,
    ) {
        assert_eq!(kind, error.kind());
        assert_eq!(message, error.to_string());
        assert_eq!(described, error.describe());
    }

    #[test]
    fn input_open_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let error = TransformerError::InputOpen {
            path: "/data/in.json".into(),
            source: io_error,
        };
        test_transformer_error(
            error,
            ErrorKind::Io,
            "failed to open input file /data/in.json",
            "failed to open input file /data/in.json: no such file",
        );
    }

    #[test]
    fn file_format_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let cause = json_error.to_string();
        let error = TransformerError::FileFormat {
            path: "in.json".into(),
            source: json_error,
        };
        test_transformer_error(
            error,
            ErrorKind::Io,
            "failed to decode tree file in.json",
            &format!("failed to decode tree file in.json: {}", cause),
        );
    }

    #[test]
    fn tree_not_found_error() {
        let error = TransformerError::TreeNotFound {
            tree: "NOMINAL".to_string(),
        };
        let message = "tree NOMINAL not found in input file";
        test_transformer_error(error, ErrorKind::Io, message, message);
    }

    #[test]
    fn branch_missing_error() {
        let error = TransformerError::BranchMissing {
            branch: "n_jets".to_string(),
            entry: 3,
        };
        let message = "branch n_jets missing from entry 3";
        test_transformer_error(error, ErrorKind::Compute, message, message);
    }

    #[test]
    fn branch_type_error() {
        let error = TransformerError::BranchType {
            branch: "jet_0_p4".to_string(),
            entry: 0,
            expected: "a 4-vector",
        };
        let message = "branch jet_0_p4 of entry 0 is not a 4-vector";
        test_transformer_error(error, ErrorKind::Compute, message, message);
    }

    #[test]
    fn non_finite_error() {
        let error = TransformerError::NonFinite {
            quantity: "jet 2 4-momentum".to_string(),
            entry: 7,
        };
        let message = "non-finite jet 2 4-momentum in entry 7";
        test_transformer_error(error, ErrorKind::Compute, message, message);
    }

    #[test]
    fn byte_stream_error() {
        // ByteStreamError provides a From impl for std::io:Error.
        let error = TransformerError::S3ByteStream(
            std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into(),
        );
        assert_eq!(ErrorKind::Upload, error.kind());
        assert_eq!("error reading output file for upload", error.to_string());
    }

    #[test]
    fn request_validation_error() {
        let mut validation_errors = validator::ValidationErrors::new();
        validation_errors.add("file_id", validator::ValidationError::new("foo"));
        let error = TransformerError::RequestValidation(validation_errors);
        test_transformer_error(
            error,
            ErrorKind::Request,
            "request message is not valid",
            "request message is not valid: file_id: Validation error: foo [{}]",
        );
    }

    #[test]
    fn invalid_selection_error() {
        let error = TransformerError::InvalidSelection {
            expression: "n_jets =>".to_string(),
        };
        let message = "invalid selection expression \"n_jets =>\"";
        test_transformer_error(error, ErrorKind::Config, message, message);
    }

    #[test]
    fn duplicate_causes_removed() {
        let io_error = std::io::Error::new(
            std::io::ErrorKind::Other,
            "failed to (de)compress file data",
        );
        let error = TransformerError::Compression(io_error);
        assert_eq!("failed to (de)compress file data", error.describe());
    }

    #[test]
    fn error_kind_display() {
        assert_eq!("IOError", ErrorKind::Io.to_string());
        assert_eq!("ComputeError", ErrorKind::Compute.to_string());
        assert_eq!("UploadError", ErrorKind::Upload.to_string());
        assert_eq!("ReportError", ErrorKind::Report.to_string());
    }

    #[test]
    fn truncate_short() {
        assert_eq!("abc", truncate_chars("abc", 1024));
    }

    #[test]
    fn truncate_long() {
        let text = "x".repeat(2000);
        assert_eq!(1024, truncate_chars(&text, MAX_ERROR_CHARS).len());
    }

    #[test]
    fn truncate_multibyte() {
        let text = "é".repeat(1100);
        let truncated = truncate_chars(&text, MAX_ERROR_CHARS);
        assert_eq!(1024, truncated.chars().count());
    }

    #[test]
    fn truncated_error() {
        let error = TransformerError::TreeNotFound {
            tree: "t".repeat(2000),
        };
        assert_eq!(1024, error.truncated().chars().count());
    }
}
