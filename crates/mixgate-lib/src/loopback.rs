//! Loopback mix driver
//!
//! Stands in for the mix-net when running the gateway by itself: every round
//! it collects exactly one message per client and hands the batch straight
//! back to the gateway, an identity mix with no shuffling, duplication or
//! loss.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use mixgate_core::{Gateway, GatewayError};

#[derive(Debug, Clone)]
pub struct LoopbackMixConfig {
    /// Number of simulated mix-net clients; one message each per round
    pub num_clients: usize,
    /// Time between lightning rounds
    pub round_interval: Duration,
}

impl Default for LoopbackMixConfig {
    fn default() -> Self {
        Self {
            num_clients: 8,
            round_interval: Duration::from_millis(50),
        }
    }
}

/// Identity round driver feeding the gateway's own hooks back to it
pub struct LoopbackMix {
    config: LoopbackMixConfig,
    gateway: Arc<Gateway>,
}

impl LoopbackMix {
    pub fn new(config: LoopbackMixConfig, gateway: Arc<Gateway>) -> Self {
        Self { config, gateway }
    }

    /// Run lightning rounds until the task is cancelled
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.config.round_interval);
        let mut round: u64 = 0;

        loop {
            interval.tick().await;
            round += 1;

            if let Err(e) = self.run_round(round) {
                warn!("Round {} failed: {}", round, e);
            }
        }
    }

    /// One lightning round: every client submits one message and the batch
    /// is delivered unchanged
    fn run_round(&self, round: u64) -> Result<(), GatewayError> {
        let mut messages = Vec::with_capacity(self.config.num_clients);
        for client_id in 0..self.config.num_clients {
            messages.push(self.gateway.next_client_message(client_id as u64)?.to_vec());
        }

        if self
            .gateway
            .check_final_messages(&messages, self.config.num_clients)
        {
            debug!("Round {} complete", round);
        } else {
            warn!("Round {}: unique message count mismatch", round);
        }

        Ok(())
    }
}
