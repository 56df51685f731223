//! # Client-Facing Socket Server
//!
//! Accepts length-prefixed JSON connections and dispatches each
//! `Envelope` to the Supervisor. One thread-per-connection is realized
//! here as one spawned `tokio` task per accepted connection, the
//! async-native equivalent of a thread-per-client-connection pool.

use crate::supervisor::Supervisor;
use orchestrator_domain::protocol::{Envelope, ErrorBody, ResponseEnvelope};
use orchestrator_domain::OrchestratorError;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub async fn serve(addr: SocketAddr, supervisor: Arc<Supervisor>, shutdown: CancellationToken) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "supervisor listening");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("supervisor socket server shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let supervisor = supervisor.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, supervisor).await {
                        tracing::warn!(%peer, error = %e, "client connection ended with error");
                    }
                });
            }
        }
    }
}

async fn handle_connection(mut stream: tokio::net::TcpStream, supervisor: Arc<Supervisor>) -> Result<(), OrchestratorError> {
    let (mut read_half, mut write_half) = stream.split();
    loop {
        let envelope: Envelope = match crate::wire::read_frame(&mut read_half).await? {
            Some(envelope) => envelope,
            None => return Ok(()),
        };

        let request_id = envelope.request_id;
        let pipeline_id = envelope.command.pipeline_id();
        let response = match supervisor.handle_command(request_id, envelope.command).await {
            Ok(response) => ResponseEnvelope::success(request_id, pipeline_id, response),
            Err(e) => ResponseEnvelope::failure(
                request_id,
                pipeline_id,
                ErrorBody { error_type: e.error_type().to_string(), public_error_message: e.public_error_message() },
            ),
        };

        crate::wire::write_frame(&mut write_half, &response).await?;
    }
}
