use std::net::Ipv4Addr;
use std::ops::RangeInclusive;
use std::sync::Arc;

use docsift::{api, config, logging, processing::ProcessingService};
use tokio::net::TcpListener;

const FALLBACK_PORTS: RangeInclusive<u16> = 5000..=5099;

#[tokio::main]
async fn main() {
    config::init_config();
    logging::init_tracing();
    let config = config::get_config();

    let service = ProcessingService::new().expect("Failed to initialize processing service");
    let app = api::create_router(
        Arc::new(service),
        config.api_keys.clone(),
        config.max_payload_bytes,
    );

    let (listener, port) = bind_listener(config.server_port)
        .await
        .expect("Failed to bind listener");
    tracing::info!(
        port,
        max_payload_bytes = config.max_payload_bytes,
        fetch_timeout_secs = config.fetch_timeout_secs,
        api_keys = config.api_keys.len(),
        "docsift listening on http://0.0.0.0:{port}"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received; draining in-flight requests");
}

/// Bind the configured port, or the first free port in `FALLBACK_PORTS` when none is set.
async fn bind_listener(configured: Option<u16>) -> std::io::Result<(TcpListener, u16)> {
    if let Some(port) = configured {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
        return Ok((listener, port));
    }

    for port in FALLBACK_PORTS {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => return Ok((listener, port)),
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        format!(
            "No available port found in range {}-{}",
            FALLBACK_PORTS.start(),
            FALLBACK_PORTS.end()
        ),
    ))
}
