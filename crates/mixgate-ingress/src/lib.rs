//! TCP Ingress Proxy
//!
//! Accepts incoming TCP connections and splits each into a sequenced packet
//! stream staged on the gateway's ingress queue for mix-net pickup.

mod server;

pub use server::{IngressError, IngressProxy, IngressProxyConfig};
