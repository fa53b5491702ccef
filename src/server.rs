//! Metrics web server and shutdown signalling

use crate::error::TransformerError;

use std::{net::SocketAddr, time::Duration};

use axum::Router;
use axum_server::Handle;
use tokio::signal;
use tokio::sync::watch;

/// Serve a router until its handle is shut down
///
/// # Arguments
///
/// * `addr`: Address on which to listen
/// * `router`: The [axum::Router] to serve
/// * `handle`: Handle used to shut the server down
pub async fn serve(
    addr: SocketAddr,
    router: Router,
    handle: Handle,
) -> Result<(), TransformerError> {
    tracing::info!("Serving metrics on {}", addr);
    axum_server::bind(addr)
        .handle(handle)
        .serve(router.into_make_service())
        .await
        .map_err(|source| TransformerError::MetricsServer { addr, source })
}

/// Graceful shutdown handler
///
/// Installs signal handlers to catch Ctrl-C or SIGTERM, then tells the worker to stop consuming
/// and shuts the metrics server down, if there is one.
///
/// # Arguments
///
/// * `shutdown`: Set to `true` when a signal is received
/// * `handle`: Handle of the metrics server
/// * `timeout`: Seconds allowed for open connections to close
pub async fn shutdown_signal(shutdown: watch::Sender<bool>, handle: Option<Handle>, timeout: u64) {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", error);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(error) => {
                tracing::error!("Failed to install SIGTERM handler: {}", error);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Signal received, starting graceful shutdown");
    trigger_shutdown(&shutdown, handle.as_ref(), timeout);
}

/// Request shutdown of the worker and the metrics server.
fn trigger_shutdown(shutdown: &watch::Sender<bool>, handle: Option<&Handle>, timeout: u64) {
    // No receivers means the worker has already stopped.
    if shutdown.send(true).is_err() {
        tracing::debug!("Worker already stopped");
    }
    if let Some(handle) = handle {
        handle.graceful_shutdown(Some(Duration::from_secs(timeout)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_shutdown_notifies_worker() {
        let (tx, rx) = watch::channel(false);
        trigger_shutdown(&tx, None, 1);
        assert!(*rx.borrow());
    }

    #[test]
    fn trigger_shutdown_without_worker() {
        let (tx, rx) = watch::channel(false);
        drop(rx);
        trigger_shutdown(&tx, None, 1);
    }

    #[tokio::test]
    async fn serve_until_shutdown() {
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let handle = Handle::new();
        let server = tokio::spawn(serve(addr, crate::app::router(), handle.clone()));

        let url = format!("http://{}/healthz", addr);
        let mut response = reqwest::get(&url).await;
        for _ in 0..50 {
            if response.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            response = reqwest::get(&url).await;
        }
        assert_eq!(reqwest::StatusCode::OK, response.unwrap().status());

        let (tx, _rx) = watch::channel(false);
        trigger_shutdown(&tx, Some(&handle), 1);
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn serve_address_in_use() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let err = serve(addr, crate::app::router(), Handle::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransformerError::MetricsServer { .. }));
    }
}
