//! # Metrics HTTP Endpoint
//!
//! A lightweight `/metrics` listener exposing the `MetricsRegistry` in
//! Prometheus text format. Deliberately hand-rolled over raw `tokio::net`
//! rather than pulling in a full HTTP framework — this endpoint serves
//! exactly one route.

use crate::metrics::MetricsRegistry;
use prometheus::Encoder;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Serves `GET /metrics` on `addr` until `shutdown` is cancelled.
pub async fn serve(addr: std::net::SocketAddr, metrics: Arc<MetricsRegistry>, shutdown: CancellationToken) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "metrics endpoint listening");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("metrics endpoint shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (mut stream, _) = accepted?;
                let metrics = metrics.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    // We only need to see the request line; ignore the body/headers.
                    let _ = stream.read(&mut buf).await;

                    let encoder = prometheus::TextEncoder::new();
                    let families = metrics.registry.gather();
                    let mut body = Vec::new();
                    if encoder.encode(&families, &mut body).is_err() {
                        body.clear();
                    }

                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        encoder.format_type(),
                        body.len()
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.write_all(&body).await;
                    let _ = stream.shutdown().await;
                });
            }
        }
    }
}
