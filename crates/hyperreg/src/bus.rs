//! Subscription Bus: fan-out of `CHANGE` events to interested subscribers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::identity::{Category, Entry, EntryId};

/// Kind of change a [`ChangeEvent`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// An event published whenever an entry is created, updated, or deleted.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    /// What kind of change occurred.
    pub kind: ChangeKind,
    /// The entry after the change (for `Deleted`, the entry as it was).
    pub entry: Entry,
    /// When the commit that produced this event happened.
    pub committed_at: chrono::DateTime<chrono::Utc>,
}

impl ChangeEvent {
    /// Build a change event for `entry`, stamped with the current time.
    pub fn new(kind: ChangeKind, entry: Entry) -> Self {
        Self {
            kind,
            entry,
            committed_at: chrono::Utc::now(),
        }
    }
}

/// A delivered event, carrying the subscriber's own monotonic sequence
/// number so it can deduplicate redeliveries.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Per-subscriber monotonically increasing sequence number.
    pub sequence_id: u64,
    /// The event being delivered.
    pub event: ChangeEvent,
}

/// What a subscriber is interested in. All set fields must match
/// (conjunction); an unset field imposes no constraint.
#[derive(Debug, Clone, Default)]
pub struct Interest {
    /// Only events for entries in this category.
    pub category: Option<Category>,
    /// Only events for this specific entry id.
    pub entry_id: Option<EntryId>,
    /// Only events for entries carrying at least one of these facet values
    /// for the given key.
    pub facet_filter: Option<(String, Vec<String>)>,
}

impl Interest {
    fn matches(&self, entry: &Entry) -> bool {
        if let Some(category) = &self.category {
            if entry.category != *category {
                return false;
            }
        }
        if let Some(id) = &self.entry_id {
            if &entry.id != id {
                return false;
            }
        }
        if let Some((key, values)) = &self.facet_filter {
            let facets = entry.derived_facets();
            let matched = facets
                .iter()
                .any(|(k, v)| k == key && values.contains(v));
            if !matched {
                return false;
            }
        }
        true
    }
}

struct Subscriber {
    interest: Interest,
    sender: mpsc::Sender<Delivery>,
    sequence: AtomicU64,
    dropped_total: AtomicU64,
}

/// In-process fan-out bus. Each subscriber owns a bounded inbox; a full
/// inbox is handled by dropping the oldest buffered item rather than
/// blocking the publisher (the bus is a lock-free producer over a bounded
/// queue consumer, per the concurrency model).
pub struct Bus {
    subscribers: DashMap<Uuid, Arc<Subscriber>>,
    max_inbox: usize,
}

impl Bus {
    /// Create a bus whose subscriber inboxes hold at most `max_inbox`
    /// buffered deliveries before drop-oldest kicks in.
    pub fn new(max_inbox: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            max_inbox,
        }
    }

    /// Register a new subscriber, returning its id and the receiving end of
    /// its inbox.
    pub fn subscribe(&self, interest: Interest) -> (Uuid, mpsc::Receiver<Delivery>) {
        let (tx, rx) = mpsc::channel(self.max_inbox.max(1));
        let id = Uuid::new_v4();
        self.subscribers.insert(
            id,
            Arc::new(Subscriber {
                interest,
                sender: tx,
                sequence: AtomicU64::new(0),
                dropped_total: AtomicU64::new(0),
            }),
        );
        (id, rx)
    }

    /// Remove a subscriber.
    pub fn unsubscribe(&self, id: Uuid) {
        self.subscribers.remove(&id);
    }

    /// Total deliveries dropped due to slow-consumer backpressure, across
    /// all subscribers that have ever existed at this call. Used by
    /// `/v1/registry/stats`.
    pub fn dropped_total(&self, id: Uuid) -> u64 {
        self.subscribers
            .get(&id)
            .map(|s| s.dropped_total.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Publish a change event to every matching subscriber.
    ///
    /// Per-entry ordering is preserved because each subscriber's inbox is a
    /// single FIFO channel and publishers serialize through the Registry's
    /// own per-entry mutation path; there is no cross-entry ordering
    /// guarantee.
    pub async fn publish(&self, event: ChangeEvent) {
        let matching: Vec<_> = self
            .subscribers
            .iter()
            .filter(|entry| entry.value().interest.matches(&event.entry))
            .map(|entry| entry.value().clone())
            .collect();

        for subscriber in matching {
            let sequence_id = subscriber.sequence.fetch_add(1, Ordering::Relaxed);
            let delivery = Delivery {
                sequence_id,
                event: event.clone(),
            };

            if let Err(mpsc::error::TrySendError::Full(delivery)) =
                subscriber.sender.try_send(delivery)
            {
                // Slow-consumer policy: drop the oldest buffered item, then
                // retry once. Never block the publisher.
                let _ = subscriber.sender.try_recv();
                subscriber.dropped_total.fetch_add(1, Ordering::Relaxed);
                let _ = subscriber.sender.try_send(delivery);
            }
        }
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
