//! Wall-clock to time-index mapping.
//!
//! The ledger is indexed by discrete time slots of `time_slot_secs`
//! seconds since the Unix epoch. Revenue received in a slot becomes
//! claimable once the clock has moved past that slot.

use sharefair_types::TimeIndex;

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Maps Unix time onto ledger time-indexes.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    slot_secs: u64,
}

impl Clock {
    /// Create a clock with the given slot length. A zero length is treated as one second.
    pub fn new(slot_secs: u64) -> Self {
        Self {
            slot_secs: slot_secs.max(1),
        }
    }

    /// Slot length in seconds.
    pub fn slot_secs(&self) -> u64 {
        self.slot_secs
    }

    /// Time-index containing `unix_secs`.
    pub fn time_index_at(&self, unix_secs: u64) -> TimeIndex {
        unix_secs / self.slot_secs
    }

    /// Current time-index, never behind `floor`.
    ///
    /// The ledger rejects a clock that moves backwards, so a wall-clock step
    /// back is absorbed by staying on the ledger's last time-index.
    pub fn now(&self, floor: TimeIndex) -> TimeIndex {
        self.time_index_at(unix_now()).max(floor)
    }
}
