//! Gateway error types

use thiserror::Error;

use mixgate_proto::PacketError;

/// Errors surfaced by the gateway core.
///
/// Only configuration problems are fatal; per-packet and per-connection
/// failures are handled locally by the components that hit them.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid {which} address '{value}': {source}")]
    InvalidAddress {
        which: &'static str,
        value: String,
        source: std::net::AddrParseError,
    },

    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),
}
