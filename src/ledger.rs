//! Solvency Ledger
//!
//! Owns the current asset and liability snapshots, the access guard, the
//! alert policy and the history store. Every piece of state sits behind a
//! single `RwLock`, so a mutation runs as one critical section
//! (authorize → validate → replace → recompute → alert → record) and a
//! reader never sees a snapshot pair from two different generations.
//!
//! # Invariants
//!
//! 1. **Fail closed**: an unauthorized caller or an invalid snapshot leaves
//!    every field untouched.
//! 2. **Replace, never merge**: an accepted snapshot becomes the side's full
//!    current state.
//! 3. **Monotonic capture time**: `captured_at` never decreases across updates.
//! 4. **Derived metrics**: totals, ratio and solvency are recomputed from the
//!    snapshots on every read; nothing derived is stored.

use crate::access::{AccessError, AccessGuard, Capability};
use crate::address::Principal;
use crate::alert::{AlertKind, AlertPolicy, AlertThresholds, RiskAlert, RiskBand, ThresholdError};
use crate::amount::{Amount, SolvencyRatio};
use crate::clock::{format_timestamp, Clock, Timestamp, EMPTY_TIMESTAMP};
use crate::history::{
    HistoryConfig, HistoryEntry, HistoryError, HistoryInfo, HistoryStore, RecordOutcome,
    SolvencyHistory,
};
use crate::snapshot::{SnapshotError, SnapshotSubmission, ValuationSnapshot};
use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const ALERT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    Unauthorized {
        caller: Principal,
        required: Capability,
    },
    InvalidSnapshot(SnapshotError),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Unauthorized { caller, required } => write!(
                f,
                "unauthorized: {} lacks the {} capability",
                caller,
                required.as_str()
            ),
            LedgerError::InvalidSnapshot(err) => write!(f, "invalid snapshot: {}", err),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<AccessError> for LedgerError {
    fn from(err: AccessError) -> Self {
        LedgerError::Unauthorized {
            caller: err.caller,
            required: err.required,
        }
    }
}

impl From<SnapshotError> for LedgerError {
    fn from(err: SnapshotError) -> Self {
        LedgerError::InvalidSnapshot(err)
    }
}

/// Rejected ledger configuration or export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupError {
    History(HistoryError),
    Thresholds(ThresholdError),
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::History(err) => write!(f, "history: {}", err),
            SetupError::Thresholds(err) => write!(f, "alerts: {}", err),
        }
    }
}

impl std::error::Error for SetupError {}

impl From<HistoryError> for SetupError {
    fn from(err: HistoryError) -> Self {
        SetupError::History(err)
    }
}

impl From<ThresholdError> for SetupError {
    fn from(err: ThresholdError) -> Self {
        SetupError::Thresholds(err)
    }
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerSide {
    Assets,
    Liabilities,
}

impl LedgerSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerSide::Assets => "assets",
            LedgerSide::Liabilities => "liabilities",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub owner: Principal,
    pub history: HistoryConfig,
    pub alerts: AlertThresholds,
}

impl LedgerConfig {
    pub fn new(owner: Principal) -> Self {
        Self {
            owner,
            history: HistoryConfig::default(),
            alerts: AlertThresholds::default(),
        }
    }
}

/// Result of an accepted update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateReceipt {
    pub side: LedgerSide,
    pub generation: u64,
    pub captured_at: Timestamp,
    pub ratio: SolvencyRatio,
    pub is_solvent: bool,
    pub band: RiskBand,
    pub history: RecordOutcome,
    pub alert: Option<RiskAlert>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SolvencyMetrics {
    pub total_assets: Amount,
    pub total_liabilities: Amount,
    pub ratio: SolvencyRatio,
    pub ratio_percent: String,
    pub is_solvent: bool,
    pub band: RiskBand,
    /// Capture time of the most recent update, `EMPTY_TIMESTAMP` if none.
    pub updated_at: Timestamp,
    pub generation: u64,
}

/// Serializable image of the whole ledger, written at shutdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerExport {
    pub exported_at: Timestamp,
    pub owner: Principal,
    pub sources: Vec<Principal>,
    pub assets: ValuationSnapshot,
    pub liabilities: ValuationSnapshot,
    pub history_config: HistoryConfig,
    pub alerts: AlertThresholds,
    pub history: Vec<HistoryEntry>,
}

impl LedgerExport {
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let contents = serde_json::to_string_pretty(self).context("Failed to encode export")?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write export to {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read export from {}", path.display()))?;
        let export = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to decode export {}", path.display()))?;
        Ok(export)
    }
}

// =============================================================================
// LEDGER
// =============================================================================

#[derive(Debug)]
struct LedgerState {
    guard: AccessGuard,
    assets: ValuationSnapshot,
    liabilities: ValuationSnapshot,
    history: HistoryStore,
    alerts: AlertPolicy,
    last_captured_at: Timestamp,
    generation: u64,
}

impl LedgerState {
    fn ratio(&self) -> SolvencyRatio {
        SolvencyRatio::from_totals(self.assets.total_value(), self.liabilities.total_value())
    }

    fn is_solvent(&self) -> bool {
        self.assets.total_value() >= self.liabilities.total_value()
    }
}

pub struct SolvencyLedger {
    state: RwLock<LedgerState>,
    clock: Arc<dyn Clock>,
    alert_tx: broadcast::Sender<RiskAlert>,
}

impl fmt::Debug for SolvencyLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolvencyLedger")
            .field("state", &*self.state.read())
            .field("clock", &self.clock)
            .finish()
    }
}

impl SolvencyLedger {
    /// Empty snapshot pair, empty history, owner as the only source.
    pub fn new(config: LedgerConfig, clock: Arc<dyn Clock>) -> Result<Self, SetupError> {
        let state = LedgerState {
            guard: AccessGuard::new(config.owner),
            assets: ValuationSnapshot::empty(EMPTY_TIMESTAMP),
            liabilities: ValuationSnapshot::empty(EMPTY_TIMESTAMP),
            history: HistoryStore::new(config.history)?,
            alerts: AlertPolicy::new(config.alerts)?,
            last_captured_at: EMPTY_TIMESTAMP,
            generation: 0,
        };
        info!(
            owner = %config.owner,
            max_entries = config.history.max_entries,
            min_interval_secs = config.history.min_interval_secs,
            "Solvency ledger created"
        );
        Ok(Self::from_state(state, clock))
    }

    /// Rebuild a ledger from an export under the settings it was exported
    /// with.
    pub fn restore(export: LedgerExport, clock: Arc<dyn Clock>) -> Result<Self, SetupError> {
        let history_config = export.history_config;
        let thresholds = export.alerts;
        Self::restore_with(export, history_config, thresholds, clock)
    }

    /// Rebuild a ledger from an export, then apply `history_config` and
    /// `thresholds` in place of the exported ones. Snapshots were validated
    /// while decoding; history ordering, spacing and ratios are checked
    /// against the exported history config before the new one is applied.
    pub fn restore_with(
        export: LedgerExport,
        history_config: HistoryConfig,
        thresholds: AlertThresholds,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SetupError> {
        let mut history = HistoryStore::from_entries(export.history_config, export.history)?;
        if history_config != export.history_config {
            warn!(
                exported_max_entries = export.history_config.max_entries,
                exported_min_interval_secs = export.history_config.min_interval_secs,
                max_entries = history_config.max_entries,
                min_interval_secs = history_config.min_interval_secs,
                "History config differs from export; applying configured values"
            );
            let before = history.len();
            history = history.reconfigure(history_config)?;
            if history.len() < before {
                warn!(
                    dropped = before - history.len(),
                    "Restored history truncated to configured capacity"
                );
            }
        }
        if thresholds != export.alerts {
            warn!("Alert thresholds differ from export; applying configured values");
        }
        let mut alerts = AlertPolicy::new(thresholds)?;

        let mut guard = AccessGuard::new(export.owner);
        let owner_is_source = export.sources.contains(&export.owner);
        for source in export.sources {
            // restoring as the owner cannot fail
            let _ = guard.authorize(&export.owner, source, true);
        }
        if !owner_is_source {
            let _ = guard.authorize(&export.owner, export.owner, false);
        }

        let last_captured_at = export
            .assets
            .captured_at()
            .max(export.liabilities.captured_at())
            .max(history.info().newest_timestamp);

        if last_captured_at != EMPTY_TIMESTAMP {
            alerts.set_baseline(&SolvencyRatio::from_totals(
                export.assets.total_value(),
                export.liabilities.total_value(),
            ));
        }

        let state = LedgerState {
            guard,
            assets: export.assets,
            liabilities: export.liabilities,
            history,
            alerts,
            last_captured_at,
            generation: 0,
        };

        info!(
            owner = %state.guard.owner(),
            history_entries = state.history.len(),
            last_captured_at = %format_timestamp(last_captured_at),
            "Solvency ledger restored from export"
        );
        Ok(Self::from_state(state, clock))
    }

    fn from_state(state: LedgerState, clock: Arc<dyn Clock>) -> Self {
        let (alert_tx, _) = broadcast::channel(ALERT_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(state),
            clock,
            alert_tx,
        }
    }

    /// Receive every `RiskAlert` emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<RiskAlert> {
        self.alert_tx.subscribe()
    }

    // -------------------------------------------------------------------------
    // Mutators
    // -------------------------------------------------------------------------

    pub fn update_assets(
        &self,
        caller: &Principal,
        submission: SnapshotSubmission,
    ) -> Result<UpdateReceipt, LedgerError> {
        self.update(caller, LedgerSide::Assets, submission)
    }

    pub fn update_liabilities(
        &self,
        caller: &Principal,
        submission: SnapshotSubmission,
    ) -> Result<UpdateReceipt, LedgerError> {
        self.update(caller, LedgerSide::Liabilities, submission)
    }

    /// Replace one side wholesale, then recompute, alert and maybe record.
    pub fn update(
        &self,
        caller: &Principal,
        side: LedgerSide,
        submission: SnapshotSubmission,
    ) -> Result<UpdateReceipt, LedgerError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        if let Err(err) = state.guard.require_source(caller) {
            warn!(caller = %caller, side = side.as_str(), "Rejected update from unauthorized caller");
            return Err(err.into());
        }

        let now = self.clock.now().max(state.last_captured_at);
        let snapshot = ValuationSnapshot::from_submission(submission, now).map_err(|err| {
            warn!(caller = %caller, side = side.as_str(), error = %err, "Rejected invalid snapshot");
            LedgerError::InvalidSnapshot(err)
        })?;

        debug!(
            caller = %caller,
            side = side.as_str(),
            entries = snapshot.len(),
            total_value = %snapshot.total_value(),
            captured_at = now,
            "Snapshot accepted"
        );

        match side {
            LedgerSide::Assets => state.assets = snapshot,
            LedgerSide::Liabilities => state.liabilities = snapshot,
        }
        state.last_captured_at = now;
        state.generation += 1;

        let ratio = state.ratio();
        let is_solvent = state.is_solvent();
        let band = state.alerts.classify(&ratio);
        let alert = state.alerts.evaluate(&ratio, now);
        let history = state
            .history
            .record(now, &ratio, &state.assets, &state.liabilities);

        match history {
            RecordOutcome::Recorded => {
                debug!(timestamp = now, ratio = %ratio, "History point recorded");
            }
            RecordOutcome::RecordedWithEviction { evicted } => {
                debug!(timestamp = now, evicted, ratio = %ratio, "History point recorded, oldest evicted");
            }
            RecordOutcome::Throttled { next_eligible, .. } => {
                debug!(timestamp = now, next_eligible, "History point skipped (too soon)");
            }
            RecordOutcome::OutOfOrder { last } => {
                debug!(timestamp = now, last, "History point skipped (not after last record)");
            }
            RecordOutcome::ReservedTimestamp => {
                debug!("History point skipped (reserved timestamp)");
            }
        }

        if let Some(alert) = &alert {
            log_alert(alert);
            // no subscribers is fine
            let _ = self.alert_tx.send(alert.clone());
        }

        Ok(UpdateReceipt {
            side,
            generation: state.generation,
            captured_at: now,
            ratio,
            is_solvent,
            band,
            history,
            alert,
        })
    }

    /// Owner-only grant/revoke of the valuation-source capability. Returns
    /// whether the authorized set changed.
    pub fn set_oracle(
        &self,
        caller: &Principal,
        target: Principal,
        authorized: bool,
    ) -> Result<bool, LedgerError> {
        let mut state = self.state.write();
        match state.guard.authorize(caller, target, authorized) {
            Ok(changed) => {
                if changed {
                    state.generation += 1;
                    info!(target = %target, authorized, "Valuation source updated");
                }
                Ok(changed)
            }
            Err(err) => {
                warn!(caller = %caller, target = %target, "Rejected oracle change from non-owner");
                Err(err.into())
            }
        }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub fn verify_solvency(&self) -> (bool, SolvencyRatio) {
        let state = self.state.read();
        (state.is_solvent(), state.ratio())
    }

    pub fn solvency_ratio(&self) -> SolvencyRatio {
        self.state.read().ratio()
    }

    pub fn protocol_assets(&self) -> ValuationSnapshot {
        self.state.read().assets.clone()
    }

    pub fn protocol_liabilities(&self) -> ValuationSnapshot {
        self.state.read().liabilities.clone()
    }

    pub fn metrics(&self) -> SolvencyMetrics {
        let state = self.state.read();
        let ratio = state.ratio();
        SolvencyMetrics {
            total_assets: state.assets.total_value().clone(),
            total_liabilities: state.liabilities.total_value().clone(),
            ratio_percent: ratio.to_percent_string(),
            is_solvent: state.is_solvent(),
            band: state.alerts.classify(&ratio),
            ratio,
            updated_at: state.last_captured_at,
            generation: state.generation,
        }
    }

    pub fn history(&self, start: Timestamp, end: Timestamp) -> Vec<HistoryEntry> {
        self.state.read().history.range(start, end)
    }

    pub fn history_columns(&self, start: Timestamp, end: Timestamp) -> SolvencyHistory {
        SolvencyHistory::from(self.history(start, end))
    }

    pub fn history_info(&self) -> HistoryInfo {
        self.state.read().history.info()
    }

    pub fn is_authorized(&self, principal: &Principal) -> bool {
        self.state.read().guard.is_authorized(principal)
    }

    pub fn owner(&self) -> Principal {
        self.state.read().guard.owner()
    }

    pub fn sources(&self) -> Vec<Principal> {
        self.state.read().guard.sources()
    }

    /// Band after the last accepted update; `None` before the first one.
    pub fn current_band(&self) -> Option<RiskBand> {
        self.state.read().alerts.current_band()
    }

    pub fn thresholds(&self) -> AlertThresholds {
        *self.state.read().alerts.thresholds()
    }

    pub fn export(&self) -> LedgerExport {
        let state = self.state.read();
        LedgerExport {
            exported_at: self.clock.now(),
            owner: state.guard.owner(),
            sources: state.guard.sources(),
            assets: state.assets.clone(),
            liabilities: state.liabilities.clone(),
            history_config: *state.history.config(),
            alerts: *state.alerts.thresholds(),
            history: state.history.to_vec(),
        }
    }
}

fn log_alert(alert: &RiskAlert) {
    match alert.kind {
        AlertKind::CriticalSolvency => error!(
            kind = %alert.kind,
            ratio = %alert.current_value,
            threshold = alert.threshold,
            band = %alert.band,
            "🚨 Solvency entered critical band"
        ),
        AlertKind::LowSolvency | AlertKind::Warning => warn!(
            kind = %alert.kind,
            ratio = %alert.current_value,
            threshold = alert.threshold,
            band = %alert.band,
            "⚠️ Solvency risk increased"
        ),
        AlertKind::Recovered => info!(
            kind = %alert.kind,
            ratio = %alert.current_value,
            threshold = alert.threshold,
            band = %alert.band,
            "Solvency recovered"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::clock::ManualClock;
    use crate::snapshot::SnapshotEntry;

    const START: Timestamp = 1_700_000_000;

    fn owner() -> Principal {
        Address::from_low_u64(0xA11CE)
    }

    fn oracle() -> Principal {
        Address::from_low_u64(0x0AC1E)
    }

    fn token(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    fn submission(values: &[(u64, u64)]) -> SnapshotSubmission {
        SnapshotSubmission::from_entries(
            values
                .iter()
                .map(|&(t, v)| SnapshotEntry::new(token(t), 1u64, v)),
        )
    }

    fn make_ledger() -> (SolvencyLedger, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(START));
        let ledger = SolvencyLedger::new(LedgerConfig::new(owner()), clock.clone()).unwrap();
        ledger.set_oracle(&owner(), oracle(), true).unwrap();
        (ledger, clock)
    }

    #[test]
    fn test_empty_ledger_reads() {
        let (ledger, _) = make_ledger();
        assert_eq!(ledger.verify_solvency(), (true, SolvencyRatio::from_bps(10_000)));
        assert!(ledger.protocol_assets().is_empty());
        assert_eq!(ledger.history_info().total_entries, 0);
        assert_eq!(ledger.current_band(), None);
        assert_eq!(ledger.metrics().updated_at, EMPTY_TIMESTAMP);
    }

    #[test]
    fn test_unauthorized_update_leaves_state() {
        let (ledger, _) = make_ledger();
        ledger
            .update_assets(&oracle(), submission(&[(1, 500)]))
            .unwrap();
        let before = ledger.protocol_assets();

        let intruder = Address::from_low_u64(0xBAD);
        let err = ledger
            .update_assets(&intruder, submission(&[(1, 1)]))
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::Unauthorized {
                caller: intruder,
                required: Capability::ValuationSource
            }
        );
        assert_eq!(ledger.protocol_assets(), before);
        assert_eq!(ledger.history_info().total_entries, 1);
    }

    #[test]
    fn test_invalid_snapshot_leaves_state() {
        let (ledger, clock) = make_ledger();
        ledger
            .update_liabilities(&oracle(), submission(&[(1, 100)]))
            .unwrap();
        let generation = ledger.metrics().generation;
        clock.advance(10_000);

        let err = ledger
            .update_liabilities(&oracle(), submission(&[(1, 5), (1, 6)]))
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InvalidSnapshot(SnapshotError::DuplicateToken(token(1)))
        );
        assert_eq!(ledger.protocol_liabilities().total_value(), &Amount::from_u64(100));
        assert_eq!(ledger.metrics().generation, generation);
        assert_eq!(ledger.history_info().total_entries, 1);
    }

    #[test]
    fn test_replace_not_merge() {
        let (ledger, clock) = make_ledger();
        ledger
            .update_assets(&oracle(), submission(&[(1, 100), (2, 200)]))
            .unwrap();
        clock.advance(5);
        ledger.update_assets(&oracle(), submission(&[(3, 7)])).unwrap();

        let assets = ledger.protocol_assets();
        assert_eq!(assets.len(), 1);
        assert!(assets.get(&token(1)).is_none());
        assert_eq!(assets.total_value(), &Amount::from_u64(7));
        assert_eq!(assets.captured_at(), START + 5);
    }

    #[test]
    fn test_capture_time_is_monotonic() {
        let (ledger, clock) = make_ledger();
        ledger.update_assets(&oracle(), submission(&[(1, 1)])).unwrap();
        clock.set(START - 100);
        let receipt = ledger.update_assets(&oracle(), submission(&[(1, 2)])).unwrap();
        assert_eq!(receipt.captured_at, START);
        assert_eq!(receipt.history, RecordOutcome::OutOfOrder { last: START });
    }

    #[test]
    fn test_receipt_and_metrics() {
        let (ledger, clock) = make_ledger();
        ledger
            .update_assets(&oracle(), submission(&[(1, 2_000_000), (2, 3_500_000), (3, 1_000_000)]))
            .unwrap();
        clock.advance(1);
        let receipt = ledger
            .update_liabilities(&oracle(), submission(&[(3, 5_000_000)]))
            .unwrap();
        assert_eq!(receipt.ratio, SolvencyRatio::from_bps(13_000));
        assert!(receipt.is_solvent);
        assert_eq!(receipt.band, RiskBand::Warning);
        assert!(matches!(receipt.history, RecordOutcome::Throttled { .. }));

        let metrics = ledger.metrics();
        assert_eq!(metrics.total_assets, Amount::from_u64(6_500_000));
        assert_eq!(metrics.total_liabilities, Amount::from_u64(5_000_000));
        assert_eq!(metrics.ratio_percent, "130.00%");
        assert_eq!(metrics.updated_at, START + 1);
    }

    #[test]
    fn test_set_oracle_owner_only() {
        let (ledger, _) = make_ledger();
        let newcomer = Address::from_low_u64(77);
        assert!(ledger.set_oracle(&oracle(), newcomer, true).is_err());
        assert!(!ledger.is_authorized(&newcomer));
        assert_eq!(ledger.set_oracle(&owner(), newcomer, true), Ok(true));
        assert!(ledger.is_authorized(&newcomer));
        assert_eq!(ledger.set_oracle(&owner(), oracle(), false), Ok(true));
        assert!(ledger.update_assets(&oracle(), submission(&[])).is_err());
    }

    #[tokio::test]
    async fn test_alerts_are_broadcast() {
        let (ledger, clock) = make_ledger();
        let mut rx = ledger.subscribe();
        ledger
            .update_assets(&oracle(), submission(&[(1, 6_500_000)]))
            .unwrap();
        ledger
            .update_liabilities(&oracle(), submission(&[(2, 5_000_000)]))
            .unwrap();
        clock.advance(60);
        ledger.update_assets(&oracle(), submission(&[(1, 15_000)])).unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, AlertKind::Warning);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.kind, AlertKind::CriticalSolvency);
        assert_eq!(second.current_value, SolvencyRatio::from_bps(30));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_export_restore_round_trip() {
        let (ledger, clock) = make_ledger();
        for step in 0..3u64 {
            ledger
                .update_assets(&oracle(), submission(&[(1, 1_000 + step)]))
                .unwrap();
            ledger
                .update_liabilities(&oracle(), submission(&[(2, 900)]))
                .unwrap();
            clock.advance(3_600);
        }
        let export = ledger.export();
        let restored = SolvencyLedger::restore(export.clone(), clock.clone()).unwrap();

        assert_eq!(restored.protocol_assets(), ledger.protocol_assets());
        assert_eq!(restored.protocol_liabilities(), ledger.protocol_liabilities());
        assert_eq!(restored.history_info(), ledger.history_info());
        assert_eq!(restored.sources(), ledger.sources());
        assert_eq!(restored.current_band(), ledger.current_band());
        assert_eq!(restored.export().history, export.history);
    }

    #[test]
    fn test_restore_with_configured_settings() {
        let (ledger, clock) = make_ledger();
        for step in 0..4u64 {
            ledger
                .update_assets(&oracle(), submission(&[(1, 1_000 + step)]))
                .unwrap();
            clock.advance(3_600);
        }
        let export = ledger.export();
        assert_eq!(export.history.len(), 4);

        let history_config = HistoryConfig {
            max_entries: 2,
            min_interval_secs: 7_200,
        };
        let thresholds = AlertThresholds {
            healthy_bps: 14_000,
            ..AlertThresholds::default()
        };
        let restored =
            SolvencyLedger::restore_with(export.clone(), history_config, thresholds, clock.clone())
                .unwrap();

        let info = restored.history_info();
        assert_eq!(info.total_entries, 2);
        assert_eq!(info.max_entries, 2);
        assert_eq!(info.min_interval, 7_200);
        assert_eq!(restored.history(0, Timestamp::MAX), export.history[2..].to_vec());
        assert_eq!(restored.thresholds(), thresholds);
        assert_eq!(restored.export().history_config, history_config);
    }
}
