//! Solvency history store
//!
//! Fixed-capacity ring buffer of `(timestamp, ratio, assets, liabilities)`
//! records. Appends are rate-limited by a minimum interval and evict the
//! oldest record once the arena is full, so capacity is structural and
//! eviction is O(1).
//!
//! # Invariants
//!
//! 1. `len() <= max_entries`
//! 2. Timestamps are strictly ascending in logical order.
//! 3. Adjacent records are at least `min_interval_secs` apart.
//! 4. No record carries `EMPTY_TIMESTAMP`.

use crate::amount::SolvencyRatio;
use crate::clock::{Timestamp, EMPTY_TIMESTAMP};
use crate::snapshot::ValuationSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_MAX_ENTRIES: usize = 1_000;
pub const DEFAULT_MIN_INTERVAL_SECS: u64 = 3_600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

fn default_min_interval_secs() -> u64 {
    DEFAULT_MIN_INTERVAL_SECS
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            min_interval_secs: DEFAULT_MIN_INTERVAL_SECS,
        }
    }
}

impl HistoryConfig {
    pub fn validate(&self) -> Result<(), HistoryError> {
        if self.max_entries == 0 {
            return Err(HistoryError::ZeroCapacity);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    ZeroCapacity,
    NotAscending { index: usize },
    ReservedTimestamp { index: usize },
    TooClose {
        index: usize,
        gap: u64,
        min_interval: u64,
    },
    /// Stored ratio differs from the one derived from the entry's snapshots.
    RatioMismatch { index: usize },
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryError::ZeroCapacity => write!(f, "history capacity must be at least 1"),
            HistoryError::NotAscending { index } => {
                write!(f, "history entry {} is not after its predecessor", index)
            }
            HistoryError::ReservedTimestamp { index } => {
                write!(f, "history entry {} uses the reserved empty timestamp", index)
            }
            HistoryError::TooClose {
                index,
                gap,
                min_interval,
            } => write!(
                f,
                "history entry {} is {}s after its predecessor (minimum {}s)",
                index, gap, min_interval
            ),
            HistoryError::RatioMismatch { index } => {
                write!(f, "history entry {} ratio does not match its snapshots", index)
            }
        }
    }
}

impl std::error::Error for HistoryError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: Timestamp,
    pub ratio: SolvencyRatio,
    pub assets: ValuationSnapshot,
    pub liabilities: ValuationSnapshot,
}

/// What happened to a candidate history point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordOutcome {
    Recorded,
    /// Recorded after evicting the oldest record.
    RecordedWithEviction { evicted: Timestamp },
    /// Too soon after the last record.
    Throttled {
        last: Timestamp,
        next_eligible: Timestamp,
    },
    /// Not after the last record (clock went backwards or stood still).
    OutOfOrder { last: Timestamp },
    ReservedTimestamp,
}

impl RecordOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(
            self,
            RecordOutcome::Recorded | RecordOutcome::RecordedWithEviction { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryInfo {
    pub total_entries: usize,
    pub max_entries: usize,
    /// `EMPTY_TIMESTAMP` when the store is empty.
    pub oldest_timestamp: Timestamp,
    /// `EMPTY_TIMESTAMP` when the store is empty.
    pub newest_timestamp: Timestamp,
    pub min_interval: u64,
}

/// Column view of a history range: parallel arrays in ascending time order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolvencyHistory {
    pub timestamps: Vec<Timestamp>,
    pub ratios: Vec<SolvencyRatio>,
    pub asset_snapshots: Vec<ValuationSnapshot>,
    pub liability_snapshots: Vec<ValuationSnapshot>,
}

impl From<Vec<HistoryEntry>> for SolvencyHistory {
    fn from(entries: Vec<HistoryEntry>) -> Self {
        let mut history = Self {
            timestamps: Vec::with_capacity(entries.len()),
            ratios: Vec::with_capacity(entries.len()),
            asset_snapshots: Vec::with_capacity(entries.len()),
            liability_snapshots: Vec::with_capacity(entries.len()),
        };
        for entry in entries {
            history.timestamps.push(entry.timestamp);
            history.ratios.push(entry.ratio);
            history.asset_snapshots.push(entry.assets);
            history.liability_snapshots.push(entry.liabilities);
        }
        history
    }
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    config: HistoryConfig,
    /// Arena; grows to `max_entries` and is then overwritten in place.
    slots: Vec<HistoryEntry>,
    /// Physical index of the oldest record once the arena is full.
    head: usize,
}

impl HistoryStore {
    pub fn new(config: HistoryConfig) -> Result<Self, HistoryError> {
        config.validate()?;
        Ok(Self {
            config,
            slots: Vec::with_capacity(config.max_entries.min(DEFAULT_MAX_ENTRIES)),
            head: 0,
        })
    }

    /// Rebuild from previously exported records (oldest first), checking
    /// them against the config they were recorded under. Only the newest
    /// `max_entries` are kept.
    pub fn from_entries(
        config: HistoryConfig,
        entries: Vec<HistoryEntry>,
    ) -> Result<Self, HistoryError> {
        let mut store = Self::new(config)?;
        let mut last: Option<Timestamp> = None;
        for (index, entry) in entries.iter().enumerate() {
            if entry.timestamp == EMPTY_TIMESTAMP {
                return Err(HistoryError::ReservedTimestamp { index });
            }
            if let Some(prev) = last {
                if entry.timestamp <= prev {
                    return Err(HistoryError::NotAscending { index });
                }
                let gap = entry.timestamp - prev;
                if gap < config.min_interval_secs {
                    return Err(HistoryError::TooClose {
                        index,
                        gap,
                        min_interval: config.min_interval_secs,
                    });
                }
            }
            let derived = SolvencyRatio::from_totals(
                entry.assets.total_value(),
                entry.liabilities.total_value(),
            );
            if entry.ratio != derived {
                return Err(HistoryError::RatioMismatch { index });
            }
            last = Some(entry.timestamp);
        }
        let skip = entries.len().saturating_sub(config.max_entries);
        store.slots.extend(entries.into_iter().skip(skip));
        Ok(store)
    }

    /// Move the records into a store with a different config, keeping the
    /// newest `max_entries`. Existing spacing is not re-checked; the new
    /// interval applies to points recorded from here on.
    pub fn reconfigure(self, config: HistoryConfig) -> Result<Self, HistoryError> {
        let mut store = Self::new(config)?;
        let entries = self.to_vec();
        let skip = entries.len().saturating_sub(config.max_entries);
        store.slots.extend(entries.into_iter().skip(skip));
        Ok(store)
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.config.max_entries
    }

    fn physical(&self, logical: usize) -> usize {
        (self.head + logical) % self.slots.len()
    }

    /// Record by logical position, 0 being the oldest.
    pub fn get(&self, logical: usize) -> Option<&HistoryEntry> {
        if logical >= self.slots.len() {
            return None;
        }
        self.slots.get(self.physical(logical))
    }

    pub fn oldest(&self) -> Option<&HistoryEntry> {
        self.get(0)
    }

    pub fn newest(&self) -> Option<&HistoryEntry> {
        self.slots.len().checked_sub(1).and_then(|i| self.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> + '_ {
        (0..self.slots.len()).map(move |i| &self.slots[self.physical(i)])
    }

    /// Decide whether a point at `now` may be appended.
    pub fn admission(&self, now: Timestamp) -> RecordOutcome {
        if now == EMPTY_TIMESTAMP {
            return RecordOutcome::ReservedTimestamp;
        }
        let Some(last) = self.newest().map(|e| e.timestamp) else {
            return RecordOutcome::Recorded;
        };
        if now <= last {
            return RecordOutcome::OutOfOrder { last };
        }
        let next_eligible = last.saturating_add(self.config.min_interval_secs);
        if now < next_eligible {
            return RecordOutcome::Throttled {
                last,
                next_eligible,
            };
        }
        if self.slots.len() == self.config.max_entries {
            if let Some(oldest) = self.oldest() {
                return RecordOutcome::RecordedWithEviction {
                    evicted: oldest.timestamp,
                };
            }
        }
        RecordOutcome::Recorded
    }

    /// Append a point if the rate and ordering rules allow it. Snapshots are
    /// only cloned when the point is admitted.
    pub fn record(
        &mut self,
        now: Timestamp,
        ratio: &SolvencyRatio,
        assets: &ValuationSnapshot,
        liabilities: &ValuationSnapshot,
    ) -> RecordOutcome {
        let outcome = self.admission(now);
        if !outcome.is_recorded() {
            return outcome;
        }
        let entry = HistoryEntry {
            timestamp: now,
            ratio: ratio.clone(),
            assets: assets.clone(),
            liabilities: liabilities.clone(),
        };
        if self.slots.len() < self.config.max_entries {
            self.slots.push(entry);
        } else {
            let slot = self.head;
            self.slots[slot] = entry;
            self.head = (self.head + 1) % self.slots.len();
        }
        outcome
    }

    /// First logical index for which `pred` is false; `pred` must be true
    /// for a prefix of the records.
    fn partition_point(&self, pred: impl Fn(&HistoryEntry) -> bool) -> usize {
        let (mut lo, mut hi) = (0usize, self.slots.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if pred(&self.slots[self.physical(mid)]) {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Records with `start <= timestamp <= end`, oldest first. An inverted
    /// or non-matching range yields an empty vector.
    pub fn range(&self, start: Timestamp, end: Timestamp) -> Vec<HistoryEntry> {
        if start > end || self.slots.is_empty() {
            return Vec::new();
        }
        let lower = self.partition_point(|e| e.timestamp < start);
        let upper = self.partition_point(|e| e.timestamp <= end);
        (lower..upper)
            .map(|i| self.slots[self.physical(i)].clone())
            .collect()
    }

    pub fn info(&self) -> HistoryInfo {
        HistoryInfo {
            total_entries: self.len(),
            max_entries: self.config.max_entries,
            oldest_timestamp: self.oldest().map_or(EMPTY_TIMESTAMP, |e| e.timestamp),
            newest_timestamp: self.newest().map_or(EMPTY_TIMESTAMP, |e| e.timestamp),
            min_interval: self.config.min_interval_secs,
        }
    }

    /// All records, oldest first.
    pub fn to_vec(&self) -> Vec<HistoryEntry> {
        self.iter().cloned().collect()
    }
}
