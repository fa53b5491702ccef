//! This file defines the ditau-transformer binary entry point.

use ditau_transformer::app;
use ditau_transformer::cli::{self, CommandLineArgs, ResultDestination};
use ditau_transformer::error::TransformerError;
use ditau_transformer::messaging::RabbitMq;
use ditau_transformer::metrics;
use ditau_transformer::object_store::ObjectStore;
use ditau_transformer::s3_client::S3Client;
use ditau_transformer::server;
use ditau_transformer::status::HttpStatusReporter;
use ditau_transformer::tracing;
use ditau_transformer::transform::transform_file;
use ditau_transformer::worker::RequestWorker;

use axum_server::Handle;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::watch;

/// Application entry point
#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    tracing::init_tracing();
    metrics::register_metrics();
    let result = match &args.path {
        Some(path) => transform_single_file(&args, path).await,
        None => consume_requests(&args).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error.log();
            ExitCode::FAILURE
        }
    }
}

/// Transform one file without the queue, status reporting or upload.
async fn transform_single_file(
    args: &CommandLineArgs,
    path: &Path,
) -> Result<(), TransformerError> {
    let options = args.transform_options()?;
    let input = path.to_path_buf();
    let output = args.direct_output(path);
    ::tracing::info!("Transforming {} to {}", input.display(), output.display());
    let summary =
        tokio::task::spawn_blocking(move || transform_file(&input, &output, &options)).await??;
    ::tracing::info!(
        "Selected {} of {} events, wrote {} bytes",
        summary.entries_written,
        summary.entries_read,
        summary.bytes_written
    );
    Ok(())
}

/// Consume transform requests from the queue until shutdown.
async fn consume_requests(args: &CommandLineArgs) -> Result<(), TransformerError> {
    let config = args.worker_config()?;
    let (uri, queue) = args.queue()?;
    let object_store = match args.result_destination {
        ResultDestination::ObjectStore => {
            Some(S3Client::new(args.s3_url()?, args.s3_credentials()).await)
        }
        ResultDestination::Volume => None,
    };

    let handle = args.metrics_addr().map(|addr| {
        let handle = Handle::new();
        let server = server::serve(addr, app::router(), handle.clone());
        tokio::spawn(async move {
            if let Err(error) = server.await {
                error.log();
            }
        });
        handle
    });
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(server::shutdown_signal(
        shutdown_tx,
        handle.clone(),
        args.graceful_shutdown_timeout,
    ));

    let rabbit = RabbitMq::connect(uri, queue).await?;
    let reporter = HttpStatusReporter::new();
    let worker = RequestWorker::new(
        &config,
        &reporter,
        object_store.as_ref().map(|store| store as &dyn ObjectStore),
        &rabbit,
    );
    let result = match rabbit.deliveries().await {
        Ok(deliveries) => worker.run(deliveries, shutdown_rx).await,
        Err(error) => Err(error),
    };
    let closed = rabbit.close().await;
    if let Some(handle) = handle {
        handle.graceful_shutdown(Some(Duration::from_secs(args.graceful_shutdown_timeout)));
    }
    result?;
    closed
}
