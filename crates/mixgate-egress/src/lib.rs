//! HTTP Egress Sink
//!
//! Serves the gateway's reassembled outbound streams: one HTTP request
//! drains one stream.

mod server;

pub use server::{EgressError, EgressServer, EgressServerConfig};
