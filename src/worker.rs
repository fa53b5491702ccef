//! Request worker.
//!
//! Handles one transform request per queue message:
//!
//! 1. post a `start` status;
//! 2. transform the input file into the output directory;
//! 3. upload the output to the object store, if one is configured, and delete the local copy;
//! 4. post a `complete` status and a successful completion record.
//!
//! Any error in these steps switches to the failure protocol: publish an [ErrorRecord] to the
//! failure exchange, post a `failure` status and put a failed completion record. Either way the
//! message is then settled exactly once. Requests are never retried by the worker.

use crate::error::{TransformerError, MAX_ERROR_CHARS};
use crate::messaging::{Delivery, FailurePublisher, Settlement};
use crate::metrics;
use crate::models::{ErrorRecord, FileComplete, StatusCode, TransformRequest};
use crate::object_store::ObjectStore;
use crate::status::StatusReporter;
use crate::transform::{transform_file, TransformOptions, TransformSummary};
use crate::validated_json::ValidatedJson;

use clap::ValueEnum;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::watch;
use tokio_stream::{Stream, StreamExt};
use tracing::Instrument;

/// When inbound messages are acknowledged
#[derive(Clone, Copy, Debug, Default, PartialEq, ValueEnum)]
pub enum AckPolicy {
    /// Acknowledge every message once handled, whatever the outcome
    #[default]
    Always,
    /// Acknowledge completed requests; return failed requests to the queue
    OnSuccess,
}

/// Worker configuration, built once at startup.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Directory in which output files are written
    pub output_dir: PathBuf,
    pub transform: TransformOptions,
    pub ack_policy: AckPolicy,
}

/// Result of handling one message.
#[derive(Debug)]
pub enum Outcome {
    /// The request completed and was reported as such
    Completed(TransformSummary),
    /// The request failed and the failure protocol ran to completion
    Failed(TransformerError),
    /// The message was not a valid request and could not be reported
    Malformed(TransformerError),
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Outcome::Completed(_) => metrics::OUTCOME_COMPLETED,
            Outcome::Failed(_) => metrics::OUTCOME_FAILED,
            Outcome::Malformed(_) => metrics::OUTCOME_MALFORMED,
        }
    }
}

/// Orchestrates transform, upload, status reporting and settlement of requests.
pub struct RequestWorker<'a> {
    config: &'a WorkerConfig,
    reporter: &'a dyn StatusReporter,
    object_store: Option<&'a dyn ObjectStore>,
    failures: &'a dyn FailurePublisher,
}

impl<'a> RequestWorker<'a> {
    /// Return a new RequestWorker.
    ///
    /// # Arguments
    ///
    /// * `config`: Worker configuration
    /// * `reporter`: Status reporter
    /// * `object_store`: Object store for outputs, or `None` to leave outputs in the output
    ///   directory
    /// * `failures`: Publisher for failed requests
    pub fn new(
        config: &'a WorkerConfig,
        reporter: &'a dyn StatusReporter,
        object_store: Option<&'a dyn ObjectStore>,
        failures: &'a dyn FailurePublisher,
    ) -> Self {
        RequestWorker {
            config,
            reporter,
            object_store,
            failures,
        }
    }

    /// Consume deliveries in order until the stream ends or shutdown is signalled.
    ///
    /// Shutdown is only observed between requests; a request that has been received is always
    /// handled and settled. Broker errors and errors in the failure protocol stop consumption.
    ///
    /// # Arguments
    ///
    /// * `deliveries`: Stream of inbound messages
    /// * `shutdown`: Set to `true` to request shutdown
    pub async fn run<S>(
        &self,
        mut deliveries: S,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), TransformerError>
    where
        S: Stream<Item = Result<Delivery, TransformerError>> + Unpin,
    {
        loop {
            if *shutdown.borrow() {
                tracing::info!("Shutdown requested, no longer consuming requests");
                break;
            }
            let next = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        tracing::info!("Shutdown channel closed, no longer consuming requests");
                        break;
                    }
                    continue;
                }
                next = deliveries.next() => next,
            };
            match next {
                Some(delivery) => {
                    self.process(delivery?).await?;
                }
                None => {
                    tracing::info!("Request queue closed");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Handle one message and settle it.
    ///
    /// Returns an error only if settlement fails or the failure protocol itself fails. In the
    /// latter case the message has already been settled.
    pub async fn process(&self, delivery: Delivery) -> Result<Outcome, TransformerError> {
        let decoded = ValidatedJson::<TransformRequest>::from_slice(&delivery.body);
        let (request, payload) = match decoded {
            Ok((ValidatedJson(request), payload)) => (request, payload),
            Err(error) => {
                error.log();
                let outcome = Outcome::Malformed(error);
                return self.settle(delivery, outcome).await;
            }
        };

        let span = tracing::info_span!(
            "request",
            request_id = %request.request_id,
            file_id = %request.file_id
        );
        match self.handle(&request).instrument(span.clone()).await {
            Ok(summary) => self.settle(delivery, Outcome::Completed(summary)).await,
            Err(error) => {
                let reported = self
                    .report_failure(&request, &payload, &error)
                    .instrument(span)
                    .await;
                let outcome = self.settle(delivery, Outcome::Failed(error)).await?;
                reported.map(|_| outcome)
            }
        }
    }

    /// Run a request up to and including its completion record.
    pub async fn handle(
        &self,
        request: &TransformRequest,
    ) -> Result<TransformSummary, TransformerError> {
        let start = Instant::now();
        let endpoint = &request.service_endpoint;
        self.reporter
            .post_status(
                endpoint,
                &request.file_id,
                StatusCode::Start,
                &format!("tree-name: {}", request.tree_name),
            )
            .await?;

        let object_name = request.output_object_name();
        let output = self.config.output_dir.join(&object_name);
        let summary = {
            let input = PathBuf::from(&request.file_path);
            let output = output.clone();
            let options = self.config.transform.clone();
            let _timer = metrics::TRANSFORM_TIME.start_timer();
            tokio::task::spawn_blocking(move || transform_file(&input, &output, &options))
                .await??
        };
        metrics::EVENTS_WRITTEN.inc_by(summary.entries_written);

        if let Some(object_store) = self.object_store {
            object_store
                .upload_file(&request.request_id, &object_name, &output)
                .await?;
            metrics::BYTES_UPLOADED.inc_by(summary.bytes_written);
            std::fs::remove_file(&output).map_err(|source| TransformerError::OutputRemove {
                path: output.clone(),
                source,
            })?;
        }
        let elapsed = start.elapsed();

        self.reporter
            .post_status(endpoint, &request.file_id, StatusCode::Complete, "Success")
            .await?;
        let record = FileComplete::success(request, &summary, elapsed);
        self.reporter.put_file_complete(endpoint, &record).await?;
        tracing::info!(
            "Completed {} with {} of {} events selected in {}s",
            request.file_path,
            summary.entries_written,
            summary.entries_read,
            record.total_time
        );
        Ok(summary)
    }

    /// Publish the failed request message, then post the failure status and completion record.
    ///
    /// Stops at the first step that fails.
    async fn report_failure(
        &self,
        request: &TransformRequest,
        payload: &Map<String, Value>,
        error: &TransformerError,
    ) -> Result<(), TransformerError> {
        error.log();
        let message = error.truncated();
        let record = ErrorRecord::new(request, payload, &message, MAX_ERROR_CHARS);
        self.failures.publish_failure(&record).await?;
        let endpoint = &request.service_endpoint;
        self.reporter
            .post_status(
                endpoint,
                &request.file_id,
                StatusCode::Failure,
                &format!("error: {}", message),
            )
            .await?;
        self.reporter
            .put_file_complete(endpoint, &FileComplete::failure(request))
            .await
    }

    /// Settle a delivery according to the ack policy and count its outcome.
    async fn settle(
        &self,
        delivery: Delivery,
        outcome: Outcome,
    ) -> Result<Outcome, TransformerError> {
        let settlement = match (self.config.ack_policy, &outcome) {
            (AckPolicy::Always, _) | (AckPolicy::OnSuccess, Outcome::Completed(_)) => {
                Settlement::Ack
            }
            (AckPolicy::OnSuccess, Outcome::Failed(_)) => Settlement::Nack { requeue: true },
            // A malformed message would fail again on every redelivery.
            (AckPolicy::OnSuccess, Outcome::Malformed(_)) => Settlement::Nack { requeue: false },
        };
        delivery.settle(settlement).await?;
        metrics::record_request(outcome.label());
        Ok(outcome)
    }
}
