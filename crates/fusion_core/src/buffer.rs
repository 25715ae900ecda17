//! Time-ordered buffer of state checkpoints and measurements.
//!
//! Entries live in a `VecDeque` sorted by timestamp: eviction pops from the
//! front, in-order inserts push to the back and out-of-order inserts splice
//! into the middle. Entries with equal timestamps keep their arrival order.

use std::collections::VecDeque;
use std::fmt::Write as _;

use contracts::{BufferConfig, BufferStats, SensorHandle, SensorRegistry, Time};

use crate::entry::{BufferEntry, EntryKind};

/// Synchronized buffer
#[derive(Debug, Default)]
pub struct SyncBuffer {
    entries: VecDeque<BufferEntry>,
}

impl SyncBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&BufferEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &BufferEntry> + '_ {
        self.entries.iter()
    }

    /// Append an entry that is at least as new as every retained entry
    pub fn push_back(&mut self, entry: BufferEntry) {
        debug_assert!(self
            .entries
            .back()
            .is_none_or(|last| last.timestamp() <= entry.timestamp()));
        self.entries.push_back(entry);
    }

    /// Insert at the sorted position, after every entry with an equal timestamp.
    ///
    /// Returns the index of the inserted entry.
    pub fn insert_sorted(&mut self, entry: BufferEntry) -> usize {
        let t = entry.timestamp();
        let index = self.entries.partition_point(|e| e.timestamp() <= t);
        self.entries.insert(index, entry);
        index
    }

    pub fn remove(&mut self, index: usize) -> Option<BufferEntry> {
        self.entries.remove(index)
    }

    /// Detach every entry from `at` onwards
    pub fn split_off(&mut self, at: usize) -> VecDeque<BufferEntry> {
        self.entries.split_off(at)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Ordered subsequence of entries matching `predicate`
    pub fn query<P>(&self, mut predicate: P) -> Vec<&BufferEntry>
    where
        P: FnMut(&BufferEntry) -> bool,
    {
        self.entries.iter().filter(|e| predicate(*e)).collect()
    }

    /// Index of the newest state checkpoint
    pub fn latest_state_index(&self) -> Option<usize> {
        self.entries.iter().rposition(BufferEntry::is_state)
    }

    /// Newest state checkpoint
    pub fn latest_state(&self) -> Option<&BufferEntry> {
        self.latest_state_index().and_then(|i| self.entries.get(i))
    }

    /// Oldest state checkpoint
    pub fn oldest_state(&self) -> Option<&BufferEntry> {
        self.entries.iter().find(|e| e.is_state())
    }

    /// Newest initialization checkpoint
    pub fn latest_init_state(&self) -> Option<&BufferEntry> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.kind() == EntryKind::InitState)
    }

    /// Newest state checkpoint produced for `sensor`
    pub fn latest_state_of(&self, sensor: SensorHandle) -> Option<&BufferEntry> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.is_state() && e.sensor() == sensor)
    }

    /// Newest measurement of `sensor`
    pub fn latest_measurement_of(&self, sensor: SensorHandle) -> Option<&BufferEntry> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.is_measurement() && e.sensor() == sensor)
    }

    /// Every retained measurement of `sensor`, oldest first
    pub fn measurements_of(&self, sensor: SensorHandle) -> Vec<&BufferEntry> {
        self.query(|e| e.is_measurement() && e.sensor() == sensor)
    }

    /// Index of the newest state checkpoint strictly before `index`
    pub fn state_before(&self, index: usize) -> Option<usize> {
        self.entries
            .iter()
            .take(index)
            .rposition(BufferEntry::is_state)
    }

    /// State checkpoint closest in time to `t`; the older one wins a tie
    pub fn closest_state(&self, t: Time) -> Option<&BufferEntry> {
        self.entries
            .iter()
            .filter(|e| e.is_state())
            .min_by(|a, b| a.timestamp().abs_diff(t).total_cmp(&b.timestamp().abs_diff(t)))
    }

    /// Entries strictly newer than `t`
    pub fn entries_after(&self, t: Time) -> Vec<&BufferEntry> {
        let start = self.entries.partition_point(|e| e.timestamp() <= t);
        self.entries.range(start..).collect()
    }

    /// Measurements of `sensor` after the newest checkpoint at or before `t`,
    /// up to and including `t`.
    pub fn intermediate_measurements(&self, sensor: SensorHandle, t: Time) -> Vec<&BufferEntry> {
        let end = self.entries.partition_point(|e| e.timestamp() <= t);
        let start = self.state_before(end).map_or(0, |i| i + 1);
        self.entries
            .range(start..end)
            .filter(|e| e.is_measurement() && e.sensor() == sensor)
            .collect()
    }

    /// Whether timestamps are non-decreasing
    pub fn is_sorted(&self) -> bool {
        self.entries
            .iter()
            .zip(self.entries.iter().skip(1))
            .all(|(a, b)| a.timestamp() <= b.timestamp())
    }

    /// Drop the oldest entries until the buffer fits `bound`.
    ///
    /// The newest state checkpoint is never dropped, and measurements left
    /// without an older checkpoint are dropped with the checkpoint before
    /// them. Returns the number of evicted entries.
    pub fn evict(&mut self, bound: &BufferConfig) -> usize {
        let mut evicted = 0;

        while self.exceeds(bound) {
            let Some(latest) = self.latest_state_index() else {
                break;
            };
            if latest == 0 {
                break;
            }
            self.entries.pop_front();
            evicted += 1;
            evicted += self.drop_leading_measurements();
        }

        evicted
    }

    fn exceeds(&self, bound: &BufferConfig) -> bool {
        if self.entries.len() > bound.max_entries {
            return true;
        }
        match (bound.max_span_s, self.entries.front(), self.entries.back()) {
            (Some(max_span), Some(oldest), Some(newest)) => {
                newest.timestamp() - oldest.timestamp() > max_span
            }
            _ => false,
        }
    }

    fn drop_leading_measurements(&mut self) -> usize {
        let mut dropped = 0;
        while self.entries.front().is_some_and(BufferEntry::is_measurement) {
            self.entries.pop_front();
            dropped += 1;
        }
        dropped
    }

    /// Buffer status
    pub fn stats(&self) -> BufferStats {
        let states = self.entries.iter().filter(|e| e.is_state()).count();
        let out_of_order = self
            .entries
            .iter()
            .filter(|e| e.kind() == EntryKind::MeasurementOutOfOrder)
            .count();

        BufferStats {
            total_entries: self.entries.len(),
            states,
            measurements: self.entries.len() - states,
            out_of_order_measurements: out_of_order,
            oldest_timestamp: self.entries.front().map(BufferEntry::timestamp),
            newest_timestamp: self.entries.back().map(BufferEntry::timestamp),
        }
    }

    /// One diagnostic line per entry
    pub fn render(&self, registry: &SensorRegistry) -> String {
        let mut out = String::new();
        for (index, entry) in self.entries.iter().enumerate() {
            let _ = writeln!(out, "{index}\t{}", entry.display(registry));
        }
        out
    }
}
