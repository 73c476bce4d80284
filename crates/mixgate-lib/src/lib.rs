//! Mix-net Gateway - unified entry point
//!
//! This crate re-exports the gateway crates and provides [`start`], which
//! wires a [`Gateway`] to its ingress proxy and egress sink, plus a loopback
//! round driver for running the pipeline without a mix-net deployment.
//!
//! # Quick Start
//!
//! ```ignore
//! use mixgate_lib::{start, GatewayConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GatewayConfig::from_parts(1024, true, "127.0.0.1:9000", "127.0.0.1:9001")?;
//!     let gateway = start(config)?;
//!
//!     // hand `gateway` to the mix-net adapter: it calls
//!     // `next_client_message` at the start of every lightning round and
//!     // `check_final_messages` with each round's output.
//!     Ok(())
//! }
//! ```
//!
//! ## Key Components
//!
//! - **Gateway**: shared state (frame codec, ingress queue, stream table)
//! - **IngressProxy**: TCP listener packetizing incoming byte streams
//! - **EgressServer**: HTTP sink serving reassembled outbound streams
//! - **LoopbackMix**: identity round driver standing in for the mix-net

pub mod loopback;

// Re-export protocol types
pub use mixgate_proto::{
    sort_packets, FrameCodec, Packet, PacketError, PacketHeader, PacketType, RESERVED_STREAM_ID,
};

// Re-export gateway state and hooks
pub use mixgate_core::{
    ClaimedStream, Gateway, GatewayConfig, GatewayError, MessageQueue, StreamPhase, StreamTable,
};

// Re-export servers
pub use mixgate_egress::{EgressError, EgressServer, EgressServerConfig};
pub use mixgate_ingress::{IngressError, IngressProxy, IngressProxyConfig};

pub use loopback::{LoopbackMix, LoopbackMixConfig};

use std::sync::Arc;
use tracing::error;

/// Build the gateway and, when enabled, spawn its ingress and egress servers.
///
/// Fails fast when the configured message size cannot hold the packet
/// protocol. Must be called within a tokio runtime; the servers run until
/// the process exits and a dead listener does not tear the process down.
pub fn start(config: GatewayConfig) -> Result<Arc<Gateway>, GatewayError> {
    let gateway = Arc::new(Gateway::new(config)?);

    if gateway.config().enable {
        let ingress = IngressProxy::new(
            IngressProxyConfig {
                bind_addr: gateway.config().addr_in,
            },
            gateway.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = ingress.start().await {
                error!("Ingress proxy exited: {}", e);
            }
        });

        let egress = EgressServer::new(
            EgressServerConfig::new(gateway.config().addr_out),
            gateway.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = egress.start().await {
                error!("Egress sink exited: {}", e);
            }
        });
    }

    Ok(gateway)
}
