//! HTTP Egress Sink Implementation
//!
//! Every request claims one outbound stream (completed streams first) and
//! streams its reassembled payload as the response body, waiting for late
//! data while the stream is still transmitting. Once drained, the stream is
//! dropped from the gateway. The path is irrelevant; the sink is the
//! gateway's entire external output surface.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::Bytes;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use mixgate_core::{ClaimedStream, Gateway};

#[derive(Debug, Error)]
pub enum EgressError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct EgressServerConfig {
    pub bind_addr: SocketAddr,
    /// How long a request may wait for a servable stream before 404
    pub claim_window: Duration,
}

impl EgressServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            claim_window: Duration::from_secs(5),
        }
    }

    pub fn with_claim_window(mut self, claim_window: Duration) -> Self {
        self.claim_window = claim_window;
        self
    }
}

#[derive(Clone)]
struct AppState {
    gateway: Arc<Gateway>,
    claim_window: Duration,
}

/// HTTP server draining outbound streams
pub struct EgressServer {
    config: EgressServerConfig,
    gateway: Arc<Gateway>,
}

impl EgressServer {
    pub fn new(config: EgressServerConfig, gateway: Arc<Gateway>) -> Self {
        Self { config, gateway }
    }

    pub async fn start(self) -> Result<(), EgressError> {
        let state = AppState {
            gateway: self.gateway,
            claim_window: self.config.claim_window,
        };

        let app = Router::new()
            .fallback(serve_stream)
            .with_state(state)
            .layer(TraceLayer::new_for_http());

        let listener = TcpListener::bind(self.config.bind_addr).await?;
        info!("Egress sink listening on {}", listener.local_addr()?);

        axum::serve(listener, app).await?;
        Ok(())
    }
}

/// Serve one outbound stream as the response body
async fn serve_stream(State(state): State<AppState>) -> Response {
    let claimed =
        match tokio::time::timeout(state.claim_window, state.gateway.streams().claim()).await {
            Ok(claimed) => claimed,
            Err(_) => {
                debug!("No outbound stream within {:?}", state.claim_window);
                return StatusCode::NOT_FOUND.into_response();
            }
        };

    debug!(
        "Serving outbound stream {} ({} streams tracked)",
        claimed.stream_id,
        state.gateway.streams().len()
    );

    let (tx, rx) = mpsc::channel::<Result<Bytes, Infallible>>(16);
    tokio::spawn(drain_stream(state.gateway.clone(), claimed, tx));

    Body::from_stream(ReceiverStream::new(rx)).into_response()
}

/// Drain a claimed stream into the response channel, waiting for late data
/// while the stream is still transmitting. Removes the stream when done.
async fn drain_stream(
    gateway: Arc<Gateway>,
    claimed: ClaimedStream,
    tx: mpsc::Sender<Result<Bytes, Infallible>>,
) {
    let stream_id = claimed.stream_id;

    loop {
        let ready = claimed.data_ready.notified();

        if let Some(chunk) = claimed.queue.dequeue() {
            if tx.send(Ok(chunk)).await.is_err() {
                warn!(
                    "Egress client disconnected while stream {} was draining",
                    stream_id
                );
                break;
            }
            continue;
        }

        if gateway.streams().is_ended(stream_id) {
            // a chunk may have landed between the dequeue and the phase check
            if claimed.queue.is_empty() {
                break;
            }
            continue;
        }

        ready.await;
    }

    let errored = gateway.streams().ended_with_error(stream_id);
    gateway.streams().remove(stream_id);
    debug!(
        "Outbound stream {} fully served{}",
        stream_id,
        if errored { " (ended with error)" } else { "" }
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use mixgate_core::GatewayConfig;
    use mixgate_proto::{Packet, PacketHeader, PacketType};

    fn test_gateway() -> Arc<Gateway> {
        let config =
            GatewayConfig::from_parts(256, false, "127.0.0.1:0", "127.0.0.1:0").unwrap();
        Arc::new(Gateway::new(config).unwrap())
    }

    fn packet(packet_type: PacketType, stream_id: u64, sequence: u64, payload: &str) -> Packet {
        Packet::new(
            PacketHeader::new(packet_type, stream_id, sequence),
            Bytes::copy_from_slice(payload.as_bytes()),
        )
    }

    #[test]
    fn test_config_defaults() {
        let config = EgressServerConfig::new("127.0.0.1:0".parse().unwrap());
        assert_eq!(config.claim_window, Duration::from_secs(5));

        let config = config.with_claim_window(Duration::from_millis(100));
        assert_eq!(config.claim_window, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_drain_ended_stream_delivers_all_chunks() {
        let gateway = test_gateway();
        gateway.streams().apply(&packet(PacketType::Start, 7, 0, ""));
        gateway
            .streams()
            .apply(&packet(PacketType::Data, 7, 1, "HELLO"));
        gateway
            .streams()
            .apply(&packet(PacketType::Data, 7, 2, " WORLD"));
        gateway.streams().apply(&packet(PacketType::End, 7, 3, ""));

        let claimed = gateway.streams().try_claim().unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        drain_stream(gateway.clone(), claimed, tx).await;

        let mut body = Vec::new();
        while let Some(Ok(chunk)) = rx.recv().await {
            body.extend_from_slice(&chunk);
        }
        assert_eq!(body, b"HELLO WORLD");
        assert!(gateway.streams().is_empty());
    }

    #[tokio::test]
    async fn test_drain_waits_for_late_data() {
        let gateway = test_gateway();
        gateway.streams().apply(&packet(PacketType::Start, 7, 0, ""));

        let claimed = gateway.streams().try_claim().unwrap();
        let (tx, mut rx) = mpsc::channel(16);

        let drainer = tokio::spawn(drain_stream(gateway.clone(), claimed, tx));

        // data arrives over two later rounds
        tokio::time::sleep(Duration::from_millis(20)).await;
        gateway
            .streams()
            .apply(&packet(PacketType::Data, 7, 1, "late"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        gateway.streams().apply(&packet(PacketType::End, 7, 2, ""));

        tokio::time::timeout(Duration::from_secs(2), drainer)
            .await
            .expect("drain should finish once the stream ends")
            .unwrap();

        let mut body = Vec::new();
        while let Some(Ok(chunk)) = rx.recv().await {
            body.extend_from_slice(&chunk);
        }
        assert_eq!(body, b"late");
        assert!(gateway.streams().is_empty());
    }
}
