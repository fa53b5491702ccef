//! Status and completion reporting to the coordinating service.

use crate::error::TransformerError;
use crate::models::{FileComplete, StatusCode, StatusUpdate};

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

/// Status reporter trait.
///
/// Defines the interface used by the worker to report progress of a file to the coordinating
/// service. Reports are never retried.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    /// Post a lifecycle status update for a file.
    ///
    /// # Arguments
    ///
    /// * `endpoint`: Base URL of the coordinating service
    /// * `file_id`: Identifier of the file
    /// * `status_code`: Lifecycle status
    /// * `info`: Free-form description
    async fn post_status(
        &self,
        endpoint: &Url,
        file_id: &str,
        status_code: StatusCode,
        info: &str,
    ) -> Result<(), TransformerError>;

    /// Put the final completion record for a file.
    ///
    /// # Arguments
    ///
    /// * `endpoint`: Base URL of the coordinating service
    /// * `record`: Completion record
    async fn put_file_complete(
        &self,
        endpoint: &Url,
        record: &FileComplete,
    ) -> Result<(), TransformerError>;
}

/// Join a path onto an endpoint, whether or not the endpoint has a trailing slash.
fn endpoint_url(endpoint: &Url, path: &str) -> String {
    format!("{}/{}", endpoint.as_str().trim_end_matches('/'), path)
}

/// HTTP status reporter.
///
/// Implements [StatusReporter] using JSON over HTTP.
#[derive(Debug)]
pub struct HttpStatusReporter {
    reqwest_client: reqwest::Client,
}

impl HttpStatusReporter {
    /// Create a new HTTP status reporter.
    pub fn new() -> Self {
        Self {
            reqwest_client: reqwest::Client::new(),
        }
    }

    /// Send a JSON body and fail on any non-success response status.
    async fn send<T: Serialize + Sync>(
        &self,
        method: reqwest::Method,
        url: String,
        body: &T,
    ) -> Result<(), TransformerError> {
        tracing::debug!("{} {}", method, url);
        let result = self
            .reqwest_client
            .request(method, &url)
            .json(body)
            .send()
            .await
            .and_then(|response| response.error_for_status());
        match result {
            Ok(_) => Ok(()),
            Err(source) => Err(TransformerError::Report { url, source }),
        }
    }
}

impl Default for HttpStatusReporter {
    /// Create a default HTTP status reporter.
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusReporter for HttpStatusReporter {
    async fn post_status(
        &self,
        endpoint: &Url,
        file_id: &str,
        status_code: StatusCode,
        info: &str,
    ) -> Result<(), TransformerError> {
        let url = endpoint_url(endpoint, &format!("{}/status", file_id));
        let update = StatusUpdate::new(status_code, info);
        self.send(reqwest::Method::POST, url, &update).await
    }

    async fn put_file_complete(
        &self,
        endpoint: &Url,
        record: &FileComplete,
    ) -> Result<(), TransformerError> {
        let url = endpoint_url(endpoint, "file-complete");
        self.send(reqwest::Method::PUT, url, record).await
    }
}
