//! # Statistics
//!
//! Per-connector and per-channel message counters. Counters are the only state
//! written concurrently by many connector tasks, so every update is atomic.

use crate::constants::SOURCE_METADATA_ID;
use crate::message::Status;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// `None` addresses the channel aggregate, `Some(id)` a single connector
type StatisticsKey = (String, Option<u32>);

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    filtered: AtomicU64,
    sent: AtomicU64,
    error: AtomicU64,
}

impl Counters {
    fn increment(&self, status: Status) {
        let counter = match status {
            Status::Received => &self.received,
            Status::Filtered => &self.filtered,
            Status::Sent => &self.sent,
            Status::Error => &self.error,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            error: self.error.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.received.store(0, Ordering::Relaxed);
        self.filtered.store(0, Ordering::Relaxed);
        self.sent.store(0, Ordering::Relaxed);
        self.error.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time copy of a counter set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub received: u64,
    pub filtered: u64,
    pub sent: u64,
    pub error: u64,
}

/// One family of counters (either current or lifetime)
#[derive(Debug, Default)]
pub struct Statistics {
    counters: DashMap<StatisticsKey, Arc<Counters>>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters_for(&self, channel_id: &str, metadata_id: Option<u32>) -> Arc<Counters> {
        self.counters
            .entry((channel_id.to_string(), metadata_id))
            .or_default()
            .clone()
    }

    /// Count a status for a connector and roll it into the channel aggregate.
    ///
    /// The channel aggregate counts RECEIVED from the source only and SENT from
    /// destinations only; FILTERED and ERROR come from any connector.
    pub fn record(&self, channel_id: &str, metadata_id: u32, status: Status) {
        self.counters_for(channel_id, Some(metadata_id)).increment(status);

        let counts_for_channel = match status {
            Status::Received => metadata_id == SOURCE_METADATA_ID,
            Status::Sent => metadata_id != SOURCE_METADATA_ID,
            Status::Filtered | Status::Error => true,
            _ => false,
        };
        if counts_for_channel {
            self.counters_for(channel_id, None).increment(status);
        }
    }

    pub fn connector(&self, channel_id: &str, metadata_id: u32) -> StatisticsSnapshot {
        self.snapshot(channel_id, Some(metadata_id))
    }

    pub fn channel(&self, channel_id: &str) -> StatisticsSnapshot {
        self.snapshot(channel_id, None)
    }

    fn snapshot(&self, channel_id: &str, metadata_id: Option<u32>) -> StatisticsSnapshot {
        self.counters
            .get(&(channel_id.to_string(), metadata_id))
            .map(|c| c.snapshot())
            .unwrap_or_default()
    }

    /// Reset the given connectors of a channel, or every counter of it when
    /// `metadata_ids` is `None`. The channel aggregate is always reset.
    pub fn reset(&self, channel_id: &str, metadata_ids: Option<&[u32]>) {
        for entry in self.counters.iter() {
            let (channel, metadata_id) = entry.key();
            if channel != channel_id {
                continue;
            }
            let selected = match (metadata_id, metadata_ids) {
                (None, _) => true,
                (Some(_), None) => true,
                (Some(id), Some(ids)) => ids.contains(id),
            };
            if selected {
                entry.value().reset();
            }
        }
    }

    pub fn remove_channel(&self, channel_id: &str) {
        self.counters.retain(|(channel, _), _| channel != channel_id);
    }
}

/// Resettable current counters alongside lifetime counters that are never reset
#[derive(Debug, Default)]
pub struct StatisticsRegistry {
    current: Statistics,
    lifetime: Statistics,
}

impl StatisticsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, channel_id: &str, metadata_id: u32, status: Status) {
        self.current.record(channel_id, metadata_id, status);
        self.lifetime.record(channel_id, metadata_id, status);
    }

    pub fn current(&self) -> &Statistics {
        &self.current
    }

    pub fn lifetime(&self) -> &Statistics {
        &self.lifetime
    }

    pub fn reset(&self, channel_id: &str, metadata_ids: Option<&[u32]>) {
        self.current.reset(channel_id, metadata_ids);
    }
}
