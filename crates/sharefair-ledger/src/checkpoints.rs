//! Append-only `(time-index, value)` histories.
//!
//! A [`Checkpoints`] sequence is strictly increasing in time-index. Writing
//! at the time-index of the last entry overwrites that entry; writing at an
//! earlier time-index is rejected. Lookups binary-search for the latest
//! entry at or before the query time, so an answer about the past never
//! changes once the clock has moved on.
//!
//! [`CheckpointStore`] keeps one such sequence per key.

use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use sharefair_types::{Amount, TimeIndex};

use crate::{LedgerError, Result};

/// One recorded value and the time-index it took effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Time-index of the write.
    pub time_index: TimeIndex,
    /// Value as of that time-index.
    pub value: Amount,
}

/// Tail of a history at some moment, for rewinding later writes.
///
/// Writes only ever touch the last entry or append, so the length and the
/// last entry are enough to restore the history exactly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TailMark {
    len: usize,
    last: Option<Checkpoint>,
}

/// Ordered history of a single value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Checkpoints {
    entries: Vec<Checkpoint>,
}

impl Checkpoints {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a history from previously exported entries.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidSnapshot`] if the entries are not strictly
    ///   increasing in time-index
    pub fn from_entries(entries: Vec<Checkpoint>) -> Result<Self> {
        for window in entries.windows(2) {
            if window[1].time_index <= window[0].time_index {
                return Err(LedgerError::InvalidSnapshot(format!(
                    "checkpoint at {} follows checkpoint at {}",
                    window[1].time_index, window[0].time_index
                )));
            }
        }
        Ok(Self { entries })
    }

    /// Check that a write at `time_index` would be accepted.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NonMonotonicTime`] if `time_index` precedes the last entry
    pub fn ensure_writable(&self, time_index: TimeIndex) -> Result<()> {
        match self.entries.last() {
            Some(last) if last.time_index > time_index => Err(LedgerError::NonMonotonicTime {
                last: last.time_index,
                new: time_index,
            }),
            _ => Ok(()),
        }
    }

    /// Record `value` as of `time_index`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NonMonotonicTime`] if `time_index` precedes the last entry
    pub fn record(&mut self, time_index: TimeIndex, value: Amount) -> Result<()> {
        self.ensure_writable(time_index)?;
        match self.entries.last_mut() {
            Some(last) if last.time_index == time_index => last.value = value,
            _ => self.entries.push(Checkpoint { time_index, value }),
        }
        Ok(())
    }

    /// Value as of `time_index`; zero before the first entry.
    pub fn value_at(&self, time_index: TimeIndex) -> Amount {
        let idx = self.entries.partition_point(|c| c.time_index <= time_index);
        idx.checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .map_or(0, |c| c.value)
    }

    /// Most recent value; zero if nothing was recorded.
    pub fn latest(&self) -> Amount {
        self.entries.last().map_or(0, |c| c.value)
    }

    /// Time-index of the most recent entry.
    pub fn last_time_index(&self) -> Option<TimeIndex> {
        self.entries.last().map(|c| c.time_index)
    }

    /// Number of recorded entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in time order.
    pub fn entries(&self) -> &[Checkpoint] {
        &self.entries
    }

    /// Current tail position.
    pub fn mark(&self) -> TailMark {
        TailMark {
            len: self.entries.len(),
            last: self.entries.last().copied(),
        }
    }

    /// Entries that may have changed since `mark`: the entry that was last
    /// at the time (it can be overwritten) and everything appended after it.
    pub fn since(&self, mark: TailMark) -> &[Checkpoint] {
        self.entries
            .get(mark.len.saturating_sub(1)..)
            .unwrap_or_default()
    }

    /// Undo every write made after `mark` was taken.
    pub fn rewind(&mut self, mark: TailMark) {
        self.entries.truncate(mark.len);
        if let (Some(last), Some(entry)) = (mark.last, self.entries.last_mut()) {
            *entry = last;
        }
    }
}

/// One [`Checkpoints`] history per key.
#[derive(Clone, Debug)]
pub struct CheckpointStore<K> {
    histories: HashMap<K, Checkpoints>,
}

impl<K> Default for CheckpointStore<K> {
    fn default() -> Self {
        Self {
            histories: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Copy> CheckpointStore<K> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that a write for `key` at `time_index` would be accepted.
    pub fn ensure_writable(&self, key: &K, time_index: TimeIndex) -> Result<()> {
        self.histories
            .get(key)
            .map_or(Ok(()), |h| h.ensure_writable(time_index))
    }

    /// Record `value` for `key` as of `time_index`.
    pub fn record(&mut self, key: K, time_index: TimeIndex, value: Amount) -> Result<()> {
        self.histories.entry(key).or_default().record(time_index, value)
    }

    /// Value for `key` as of `time_index`; zero for unknown keys.
    pub fn query(&self, key: &K, time_index: TimeIndex) -> Amount {
        self.histories.get(key).map_or(0, |h| h.value_at(time_index))
    }

    /// Most recent value for `key`.
    pub fn latest(&self, key: &K) -> Amount {
        self.histories.get(key).map_or(0, Checkpoints::latest)
    }

    /// Full history for `key`.
    pub fn history(&self, key: &K) -> Option<&Checkpoints> {
        self.histories.get(key)
    }

    /// Install a complete history for `key`, replacing any existing one.
    pub fn insert_history(&mut self, key: K, history: Checkpoints) {
        self.histories.insert(key, history);
    }

    /// Tail position of `key`'s history; empty for unknown keys.
    pub fn mark(&self, key: &K) -> TailMark {
        self.histories.get(key).map(Checkpoints::mark).unwrap_or_default()
    }

    /// Entries of `key` that may have changed since `mark`.
    pub fn since(&self, key: &K, mark: TailMark) -> &[Checkpoint] {
        self.histories
            .get(key)
            .map(|h| h.since(mark))
            .unwrap_or_default()
    }

    /// Undo writes to `key` made after `mark`. A key that had no history
    /// at the time is dropped.
    pub fn rewind(&mut self, key: &K, mark: TailMark) {
        if mark.len == 0 {
            self.histories.remove(key);
        } else if let Some(history) = self.histories.get_mut(key) {
            history.rewind(mark);
        }
    }

    /// All keys with their histories, in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &Checkpoints)> {
        self.histories.iter()
    }
}
