//! Snapshot ring buffer
//!
//! Holds the most recent authoritative snapshots in arrival order. Only the
//! renderer reads it; nothing gameplay-relevant is decided from it.

use std::collections::VecDeque;

use crate::game::constants::SNAPSHOT_BUFFER_CAPACITY;
use crate::game::snapshot::Snapshot;

/// Two snapshots around a render time and the blend factor between them
#[derive(Debug, Clone, Copy)]
pub struct Bracket<'a> {
    pub older: &'a Snapshot,
    pub newer: &'a Snapshot,
    /// 0 renders `older`, 1 renders `newer`
    pub t: f32,
}

#[derive(Debug, Clone)]
pub struct SnapshotRingBuffer {
    snapshots: VecDeque<Snapshot>,
    capacity: usize,
}

impl SnapshotRingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a snapshot, evicting the oldest when full
    pub fn push(&mut self, snapshot: Snapshot) {
        if self.snapshots.len() == self.capacity {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.iter()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    /// Select the snapshots bracketing `render_time` (server millis).
    ///
    /// `older` is the newest snapshot at or before the render time, `newer`
    /// the oldest at or after it. Without a match on one side, the oldest
    /// (respectively newest) buffered snapshot stands in.
    pub fn bracket(&self, render_time: i64) -> Option<Bracket<'_>> {
        let first = self.snapshots.front()?;
        let last = self.snapshots.back()?;

        let mut older: Option<&Snapshot> = None;
        let mut newer: Option<&Snapshot> = None;
        for snapshot in &self.snapshots {
            let time = snapshot.server_time as i64;
            if time <= render_time && older.map_or(true, |o| snapshot.server_time > o.server_time) {
                older = Some(snapshot);
            }
            if time >= render_time && newer.map_or(true, |n| snapshot.server_time < n.server_time) {
                newer = Some(snapshot);
            }
        }

        let older = older.unwrap_or(first);
        let newer = newer.unwrap_or(last);
        let span = newer.server_time as i64 - older.server_time as i64;
        let t = if span == 0 {
            0.0
        } else {
            ((render_time - older.server_time as i64) as f64 / span as f64).clamp(0.0, 1.0) as f32
        };

        Some(Bracket { older, newer, t })
    }
}

impl Default for SnapshotRingBuffer {
    fn default() -> Self {
        Self::new(SNAPSHOT_BUFFER_CAPACITY)
    }
}
