//! # Usage Tracking
//!
//! Per-texture recency and camera distance, fed by batch extraction and
//! read by the eviction policy.
//!
//! Distances are aggregated per extraction cycle: within a cycle the
//! minimum observed distance wins; when a new cycle starts, the previous
//! cycle's minimum becomes the recorded distance.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;

use crate::streaming::handle::TextureId;

/// Last observed use of one texture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UsageRecord {
    /// Time of the last use, on the manager's clock.
    pub last_used_nanos: u64,
    /// Smallest distance seen during `last_cycle`.
    pub min_distance_this_cycle: f32,
    /// Distance the eviction policy looks at.
    pub recorded_distance: f32,
    /// Extraction cycle of the last use.
    pub last_cycle: u64,
}

impl UsageRecord {
    fn first(now: Duration, distance: f32, cycle: u64) -> Self {
        Self {
            last_used_nanos: duration_nanos(now),
            min_distance_this_cycle: distance,
            recorded_distance: distance,
            last_cycle: cycle,
        }
    }

    fn observe(&mut self, now: Duration, distance: f32, cycle: u64) {
        if cycle != self.last_cycle {
            self.last_cycle = cycle;
            self.min_distance_this_cycle = distance;
        } else {
            self.min_distance_this_cycle = self.min_distance_this_cycle.min(distance);
        }
        self.recorded_distance = self.min_distance_this_cycle;
        self.last_used_nanos = self.last_used_nanos.max(duration_nanos(now));
    }

    /// Time since the last use (zero if `now` is earlier).
    #[must_use]
    pub fn idle_for(&self, now: Duration) -> Duration {
        Duration::from_nanos(duration_nanos(now).saturating_sub(self.last_used_nanos))
    }
}

fn duration_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Unload thresholds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EvictionPolicy {
    /// Idle longer than this -> unloadable.
    pub unload_delay: Duration,
    /// Farther than this -> unloadable.
    pub unload_distance: f32,
}

impl EvictionPolicy {
    /// Whether a texture with `record` may be unloaded at `now`.
    ///
    /// Either condition suffices. Pure: the same inputs always give the same answer.
    #[must_use]
    pub fn can_be_unloaded(&self, record: &UsageRecord, now: Duration) -> bool {
        record.idle_for(now) > self.unload_delay || record.recorded_distance > self.unload_distance
    }
}

/// Thread-safe usage map.
#[derive(Debug, Default)]
pub struct UsageTracker {
    records: Mutex<HashMap<TextureId, UsageRecord>>,
}

impl UsageTracker {
    /// Empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one use of `texture` at `distance` during extraction `cycle`.
    pub fn record_use(&self, texture: TextureId, now: Duration, distance: f32, cycle: u64) {
        self.records
            .lock()
            .entry(texture)
            .and_modify(|r| r.observe(now, distance, cycle))
            .or_insert_with(|| UsageRecord::first(now, distance, cycle));
    }

    /// Records a batch of uses from one extraction cycle.
    pub fn record_batch(&self, visible: &[(TextureId, f32)], now: Duration, cycle: u64) {
        let mut records = self.records.lock();
        for &(texture, distance) in visible {
            records
                .entry(texture)
                .and_modify(|r| r.observe(now, distance, cycle))
                .or_insert_with(|| UsageRecord::first(now, distance, cycle));
        }
    }

    /// The record for `texture`, if it was ever used.
    #[must_use]
    pub fn record(&self, texture: TextureId) -> Option<UsageRecord> {
        self.records.lock().get(&texture).copied()
    }

    /// Whether `texture` may be unloaded. Never-used textures may.
    #[must_use]
    pub fn can_be_unloaded(&self, texture: TextureId, policy: &EvictionPolicy, now: Duration) -> bool {
        self.record(texture)
            .map_or(true, |record| policy.can_be_unloaded(&record, now))
    }

    /// Drops the record for `texture`.
    pub fn forget(&self, texture: TextureId) {
        self.records.lock().remove(&texture);
    }

    /// Number of tracked textures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}
