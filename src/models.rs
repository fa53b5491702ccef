//! Data types exchanged with the message broker and the coordinating service

use crate::error::truncate_chars;
use crate::transform::TransformSummary;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use strum_macros::Display;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use url::Url;
use validator::{Validate, ValidationError};

/// A request to transform one file
///
/// Received as JSON from the request queue.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(rename_all = "kebab-case")]
pub struct TransformRequest {
    /// Identifier of the transform request this file belongs to. Also the result bucket name.
    #[validate(length(min = 1, message = "request-id must not be empty"))]
    pub request_id: String,
    /// Path of the input file
    #[validate(length(min = 1, message = "file-path must not be empty"))]
    pub file_path: String,
    /// Identifier of the file within the request
    #[validate(length(min = 1, message = "file-id must not be empty"))]
    pub file_id: String,
    /// Base URL of the coordinating service
    #[validate(custom = "validate_endpoint")]
    pub service_endpoint: Url,
    /// Name of the tree the coordinating service expects to be read
    #[validate(length(min = 1, message = "tree-name must not be empty"))]
    pub tree_name: String,
}

impl TransformRequest {
    /// Name of the output object for this request's file.
    pub fn output_object_name(&self) -> String {
        output_object_name(&self.file_path)
    }
}

/// Name of the output object for an input path: the path with each `/` replaced by `:`.
pub fn output_object_name(file_path: &str) -> String {
    file_path.replace('/', ":")
}

/// Validate a service endpoint URL
fn validate_endpoint(endpoint: &Url) -> Result<(), ValidationError> {
    if !matches!(endpoint.scheme(), "http" | "https") {
        let mut error = ValidationError::new("service-endpoint must be an HTTP(S) URL");
        error.add_param("scheme".into(), &endpoint.scheme());
        return Err(error);
    }
    Ok(())
}

/// Lifecycle status of a file
#[derive(Clone, Copy, Debug, Display, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StatusCode {
    Start,
    Complete,
    Failure,
}

/// A status update posted to `<endpoint>/<file-id>/status`
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StatusUpdate {
    /// RFC 3339 time at which the update was created
    pub timestamp: String,
    pub status_code: StatusCode,
    pub info: String,
}

impl StatusUpdate {
    /// Return a StatusUpdate stamped with the current time.
    pub fn new(status_code: StatusCode, info: &str) -> Self {
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        StatusUpdate {
            timestamp,
            status_code,
            info: info.to_string(),
        }
    }
}

/// Final outcome of a file
#[derive(Clone, Copy, Debug, Display, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CompletionStatus {
    Success,
    Failure,
}

/// Completion record put to `<endpoint>/file-complete`
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileComplete {
    pub file_path: String,
    pub file_id: String,
    pub status: CompletionStatus,
    pub num_messages: u64,
    /// Wall time in seconds, rounded to two decimal places
    pub total_time: f64,
    pub total_events: u64,
    pub total_bytes: u64,
    /// Events per second
    pub avg_rate: f64,
}

impl FileComplete {
    /// Return a successful completion record.
    ///
    /// # Arguments
    ///
    /// * `request`: The completed request
    /// * `summary`: Counters of the transform
    /// * `elapsed`: Time from receipt of the request to the end of the upload
    pub fn success(
        request: &TransformRequest,
        summary: &TransformSummary,
        elapsed: Duration,
    ) -> Self {
        let seconds = elapsed.as_secs_f64();
        let avg_rate = if seconds > 0.0 {
            summary.entries_written as f64 / seconds
        } else {
            0.0
        };
        FileComplete {
            file_path: request.file_path.clone(),
            file_id: request.file_id.clone(),
            status: CompletionStatus::Success,
            num_messages: 0,
            total_time: (seconds * 100.0).round() / 100.0,
            total_events: summary.entries_written,
            total_bytes: summary.bytes_written,
            avg_rate,
        }
    }

    /// Return a failed completion record with zeroed counters.
    pub fn failure(request: &TransformRequest) -> Self {
        FileComplete {
            file_path: request.file_path.clone(),
            file_id: request.file_id.clone(),
            status: CompletionStatus::Failure,
            num_messages: 0,
            total_time: 0.0,
            total_events: 0,
            total_bytes: 0,
            avg_rate: 0.0,
        }
    }
}

/// The request message that failed, as received, with an added `error` field.
///
/// Published to the failure exchange.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ErrorRecord {
    #[serde(skip)]
    pub request_id: String,
    pub payload: Map<String, Value>,
}

impl ErrorRecord {
    /// Return an ErrorRecord, truncating the error text to `max_chars` characters.
    ///
    /// # Arguments
    ///
    /// * `request`: The decoded request
    /// * `payload`: The request message as received
    /// * `error`: Error text
    /// * `max_chars`: Maximum number of characters of error text
    pub fn new(
        request: &TransformRequest,
        payload: &Map<String, Value>,
        error: &str,
        max_chars: usize,
    ) -> Self {
        let mut payload = payload.clone();
        payload.insert(
            "error".to_string(),
            Value::String(truncate_chars(error, max_chars)),
        );
        ErrorRecord {
            request_id: request.request_id.clone(),
            payload,
        }
    }

    /// The error text.
    pub fn error(&self) -> Option<&str> {
        self.payload.get("error").and_then(Value::as_str)
    }
}
