//! Gateway configuration

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Scalar gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Mix-net message size in bytes; every frame is exactly this long
    pub message_size: usize,
    /// Start the ingress proxy and egress sink
    pub enable: bool,
    /// TCP listen address for incoming data streams
    pub addr_in: SocketAddr,
    /// HTTP listen address for serving outgoing data streams
    pub addr_out: SocketAddr,
}

impl GatewayConfig {
    /// Build a config from raw address strings, validating them up front
    pub fn from_parts(
        message_size: usize,
        enable: bool,
        addr_in: &str,
        addr_out: &str,
    ) -> Result<Self, GatewayError> {
        let addr_in = addr_in
            .parse()
            .map_err(|source| GatewayError::InvalidAddress {
                which: "ingress",
                value: addr_in.to_string(),
                source,
            })?;
        let addr_out = addr_out
            .parse()
            .map_err(|source| GatewayError::InvalidAddress {
                which: "egress",
                value: addr_out.to_string(),
                source,
            })?;

        Ok(Self {
            message_size,
            enable,
            addr_in,
            addr_out,
        })
    }
}
