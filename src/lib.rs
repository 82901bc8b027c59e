//! Solvency Ledger Library
//!
//! Authoritative record of protocol assets and liabilities, the solvency
//! ratio derived from them, a bounded rate-limited history of past states,
//! and threshold-crossing risk alerts. Exposed to the service binary, the
//! simulation binary and the integration tests.

pub mod access;
pub mod address;
pub mod alert;
pub mod amount;
pub mod api;
pub mod clock;
pub mod config;
pub mod history;
pub mod ledger;
pub mod middleware;
pub mod simulation;
pub mod snapshot;

pub use access::{AccessError, AccessGuard, Capability};
pub use address::{Address, Principal, TokenId};
pub use alert::{AlertKind, AlertPolicy, AlertThresholds, RiskAlert, RiskBand};
pub use amount::{Amount, SolvencyRatio};
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use history::{HistoryConfig, HistoryEntry, HistoryInfo, HistoryStore, RecordOutcome};
pub use ledger::{
    LedgerConfig, LedgerError, LedgerExport, LedgerSide, SolvencyLedger, SolvencyMetrics,
    UpdateReceipt,
};
pub use snapshot::{SnapshotEntry, SnapshotSubmission, ValuationSnapshot};
