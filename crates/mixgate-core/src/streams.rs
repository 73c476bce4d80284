//! Egress stream table
//!
//! Rebuilds per-stream output queues from final-round packets and tracks each
//! stream's lifecycle. Claiming a stream for serving happens in one critical
//! section, so two egress handlers can never drain the same stream.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tracing::debug;

use mixgate_proto::{Packet, PacketType};

use crate::queue::MessageQueue;

/// Lifecycle of an outbound stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// Stream is still transmitting through the mix-net
    Transmitting,
    /// Stream has exited the mix-net completely
    Ended,
}

struct StreamEntry {
    phase: StreamPhase,
    /// Terminated by an Error packet rather than a clean End
    errored: bool,
    /// Held by an egress handler; at most one at a time
    claimed: bool,
    queue: Arc<MessageQueue>,
    data_ready: Arc<Notify>,
}

impl StreamEntry {
    fn new(phase: StreamPhase) -> Self {
        Self {
            phase,
            errored: false,
            claimed: false,
            queue: Arc::new(MessageQueue::new()),
            data_ready: Arc::new(Notify::new()),
        }
    }
}

/// A stream claimed for serving by exactly one egress handler
pub struct ClaimedStream {
    pub stream_id: u64,
    /// Reassembled payload chunks in sequence order
    pub queue: Arc<MessageQueue>,
    /// Fired when data is enqueued or the stream ends
    pub data_ready: Arc<Notify>,
}

/// Tracks outbound streams leaving the mix-net
pub struct StreamTable {
    streams: Mutex<HashMap<u64, StreamEntry>>,
    /// Fired when a stream is created or transitions to Ended
    stream_ready: Notify,
}

impl StreamTable {
    pub fn new() -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            stream_ready: Notify::new(),
        }
    }

    /// Apply one final-round packet to the table.
    ///
    /// Callers must have deduplicated the round and sorted it by
    /// (stream_id, sequence), so within one invocation payload chunks are
    /// enqueued in sequence order. Dummies never reach the table.
    pub fn apply(&self, packet: &Packet) {
        let id = packet.header.stream_id;

        match packet.header.packet_type {
            PacketType::Start => {
                let created = {
                    let mut streams = self.streams.lock().unwrap();
                    match streams.entry(id) {
                        Entry::Vacant(entry) => {
                            entry.insert(StreamEntry::new(StreamPhase::Transmitting));
                            true
                        }
                        Entry::Occupied(_) => {
                            debug!("Duplicate START for stream {}, ignored", id);
                            false
                        }
                    }
                };

                if created {
                    self.stream_ready.notify_waiters();
                }
            }

            PacketType::Data => {
                // grab the handles under the table lock, enqueue outside it
                let target = {
                    let streams = self.streams.lock().unwrap();
                    match streams.get(&id) {
                        Some(entry) if entry.phase == StreamPhase::Transmitting => {
                            Some((entry.queue.clone(), entry.data_ready.clone()))
                        }
                        Some(_) => {
                            debug!("Late DATA for ended stream {}, dropped", id);
                            None
                        }
                        None => {
                            debug!("DATA for unknown stream {}, dropped", id);
                            None
                        }
                    }
                };

                if let Some((queue, data_ready)) = target {
                    queue.enqueue(packet.payload.clone());
                    data_ready.notify_waiters();
                }
            }

            PacketType::End | PacketType::Error => {
                let errored = packet.header.packet_type == PacketType::Error;
                let notify = {
                    let mut streams = self.streams.lock().unwrap();
                    match streams.entry(id) {
                        Entry::Occupied(mut entry)
                            if entry.get().phase == StreamPhase::Transmitting =>
                        {
                            let entry = entry.get_mut();
                            entry.phase = StreamPhase::Ended;
                            entry.errored = errored;
                            debug!(
                                "Stream {} ended{}",
                                id,
                                if errored { " with error" } else { "" }
                            );
                            Some(entry.data_ready.clone())
                        }
                        Entry::Occupied(_) => None,
                        Entry::Vacant(entry) => {
                            // terminal without a prior Start: track as an
                            // already-drained stream
                            let mut stream = StreamEntry::new(StreamPhase::Ended);
                            stream.errored = errored;
                            entry.insert(stream);
                            None
                        }
                    }
                };

                if let Some(data_ready) = notify {
                    data_ready.notify_waiters();
                }
                self.stream_ready.notify_waiters();
            }

            PacketType::Dummy => {}
        }
    }

    /// Claim an unclaimed stream, preferring Ended over Transmitting.
    ///
    /// The observe-and-claim happens under one lock; a claimed stream is
    /// invisible to other callers until it is removed.
    pub fn try_claim(&self) -> Option<ClaimedStream> {
        let mut streams = self.streams.lock().unwrap();

        let stream_id = *streams
            .iter()
            .filter(|(_, entry)| !entry.claimed)
            .min_by_key(|(_, entry)| match entry.phase {
                StreamPhase::Ended => 0u8,
                StreamPhase::Transmitting => 1u8,
            })?
            .0;

        let entry = streams.get_mut(&stream_id)?;
        entry.claimed = true;

        Some(ClaimedStream {
            stream_id,
            queue: entry.queue.clone(),
            data_ready: entry.data_ready.clone(),
        })
    }

    /// Claim a stream, waiting until one becomes available
    pub async fn claim(&self) -> ClaimedStream {
        loop {
            let ready = self.stream_ready.notified();
            if let Some(claimed) = self.try_claim() {
                return claimed;
            }
            ready.await;
        }
    }

    /// Current phase of a stream
    pub fn phase(&self, stream_id: u64) -> Option<StreamPhase> {
        self.streams
            .lock()
            .unwrap()
            .get(&stream_id)
            .map(|entry| entry.phase)
    }

    pub fn is_ended(&self, stream_id: u64) -> bool {
        matches!(self.phase(stream_id), Some(StreamPhase::Ended))
    }

    /// Whether the stream was terminated by an Error packet
    pub fn ended_with_error(&self, stream_id: u64) -> bool {
        self.streams
            .lock()
            .unwrap()
            .get(&stream_id)
            .map(|entry| entry.errored)
            .unwrap_or(false)
    }

    /// Drop a stream after it has been served
    pub fn remove(&self, stream_id: u64) {
        self.streams.lock().unwrap().remove(&stream_id);
    }

    pub fn len(&self) -> usize {
        self.streams.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.lock().unwrap().is_empty()
    }
}

impl Default for StreamTable {
    fn default() -> Self {
        Self::new()
    }
}
