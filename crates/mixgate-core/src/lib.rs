//! Gateway State and Mix-net Hooks
//!
//! One [`Gateway`] value owns everything the gateway process shares: the
//! frame codec with its cached protocol size, the ingress FIFO staged for
//! mix-net pickup, and the egress stream table rebuilt from final-round
//! packets. Servers and mix-net adapters hold it behind an `Arc`.

pub mod config;
pub mod error;
pub mod gateway;
pub mod queue;
pub mod streams;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use gateway::Gateway;
pub use queue::MessageQueue;
pub use streams::{ClaimedStream, StreamPhase, StreamTable};
