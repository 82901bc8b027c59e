//! Valuation snapshots
//!
//! One side of the ledger (assets or liabilities) at a point in time: a list
//! of `{token, amount, value}` triples plus the capture time assigned by the
//! ledger. Snapshots are validated on construction and immutable afterwards.
//!
//! # Invariants
//!
//! 1. No two entries share a token identifier.
//! 2. The sum of `value` fields fits in 256 bits.

use crate::address::TokenId;
use crate::amount::Amount;
use crate::clock::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub token: TokenId,
    /// Quantity in the token's native unit.
    pub amount: Amount,
    /// Worth of `amount` in the common accounting unit (1e8 scale).
    pub value: Amount,
}

impl SnapshotEntry {
    pub fn new(token: TokenId, amount: impl Into<Amount>, value: impl Into<Amount>) -> Self {
        Self {
            token,
            amount: amount.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    DuplicateToken(TokenId),
    LengthMismatch {
        tokens: usize,
        amounts: usize,
        values: usize,
    },
    ValueOverflow,
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::DuplicateToken(token) => {
                write!(f, "duplicate token {} in snapshot", token)
            }
            SnapshotError::LengthMismatch {
                tokens,
                amounts,
                values,
            } => write!(
                f,
                "array length mismatch: {} tokens, {} amounts, {} values",
                tokens, amounts, values
            ),
            SnapshotError::ValueOverflow => write!(f, "total snapshot value overflows 256 bits"),
        }
    }
}

impl std::error::Error for SnapshotError {}

/// Parallel-array form submitted by a valuation source:
/// `values[i]` is the accounting-unit worth of `amounts[i]` of `tokens[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSubmission {
    pub tokens: Vec<TokenId>,
    pub amounts: Vec<Amount>,
    pub values: Vec<Amount>,
}

impl SnapshotSubmission {
    pub fn new(tokens: Vec<TokenId>, amounts: Vec<Amount>, values: Vec<Amount>) -> Self {
        Self {
            tokens,
            amounts,
            values,
        }
    }

    pub fn from_entries(entries: impl IntoIterator<Item = SnapshotEntry>) -> Self {
        let mut submission = Self::default();
        for entry in entries {
            submission.tokens.push(entry.token);
            submission.amounts.push(entry.amount);
            submission.values.push(entry.value);
        }
        submission
    }

    pub fn into_entries(self) -> Result<Vec<SnapshotEntry>, SnapshotError> {
        if self.tokens.len() != self.amounts.len() || self.tokens.len() != self.values.len() {
            return Err(SnapshotError::LengthMismatch {
                tokens: self.tokens.len(),
                amounts: self.amounts.len(),
                values: self.values.len(),
            });
        }
        Ok(self
            .tokens
            .into_iter()
            .zip(self.amounts)
            .zip(self.values)
            .map(|((token, amount), value)| SnapshotEntry {
                token,
                amount,
                value,
            })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SnapshotRecord")]
pub struct ValuationSnapshot {
    entries: Vec<SnapshotEntry>,
    captured_at: Timestamp,
    total_value: Amount,
}

/// Wire form; `total_value` is recomputed on load rather than trusted.
#[derive(Deserialize)]
struct SnapshotRecord {
    entries: Vec<SnapshotEntry>,
    captured_at: Timestamp,
}

impl TryFrom<SnapshotRecord> for ValuationSnapshot {
    type Error = SnapshotError;

    fn try_from(record: SnapshotRecord) -> Result<Self, Self::Error> {
        Self::new(record.entries, record.captured_at)
    }
}

impl ValuationSnapshot {
    pub fn new(entries: Vec<SnapshotEntry>, captured_at: Timestamp) -> Result<Self, SnapshotError> {
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.token) {
                return Err(SnapshotError::DuplicateToken(entry.token));
            }
        }
        let total_value = Amount::checked_sum(entries.iter().map(|e| &e.value))
            .ok_or(SnapshotError::ValueOverflow)?;

        Ok(Self {
            entries,
            captured_at,
            total_value,
        })
    }

    pub fn from_submission(
        submission: SnapshotSubmission,
        captured_at: Timestamp,
    ) -> Result<Self, SnapshotError> {
        Self::new(submission.into_entries()?, captured_at)
    }

    pub fn empty(captured_at: Timestamp) -> Self {
        Self {
            entries: Vec::new(),
            captured_at,
            total_value: Amount::zero(),
        }
    }

    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    pub fn captured_at(&self) -> Timestamp {
        self.captured_at
    }

    pub fn total_value(&self) -> &Amount {
        &self.total_value
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, token: &TokenId) -> Option<&SnapshotEntry> {
        self.entries.iter().find(|e| &e.token == token)
    }

    /// Back to parallel arrays, in entry order.
    pub fn to_submission(&self) -> SnapshotSubmission {
        SnapshotSubmission::from_entries(self.entries.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;

    fn token(n: u64) -> TokenId {
        Address::from_low_u64(n)
    }

    #[test]
    fn test_total_value() {
        let snapshot = ValuationSnapshot::new(
            vec![
                SnapshotEntry::new(token(1), 1_000u64, 2_000_000u64),
                SnapshotEntry::new(token(2), 100u64, 3_500_000u64),
                SnapshotEntry::new(token(3), 1_000_000u64, 1_000_000u64),
            ],
            42,
        )
        .unwrap();
        assert_eq!(snapshot.total_value(), &Amount::from_u64(6_500_000));
        assert_eq!(snapshot.captured_at(), 42);
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.get(&token(2)).unwrap().amount, Amount::from_u64(100));
    }

    #[test]
    fn test_duplicate_token_rejected() {
        let err = ValuationSnapshot::new(
            vec![
                SnapshotEntry::new(token(1), 1u64, 1u64),
                SnapshotEntry::new(token(2), 1u64, 1u64),
                SnapshotEntry::new(token(1), 5u64, 5u64),
            ],
            1,
        )
        .unwrap_err();
        assert_eq!(err, SnapshotError::DuplicateToken(token(1)));
    }

    #[test]
    fn test_value_overflow_rejected() {
        let err = ValuationSnapshot::new(
            vec![
                SnapshotEntry::new(token(1), 1u64, Amount::max_value()),
                SnapshotEntry::new(token(2), 1u64, 1u64),
            ],
            1,
        )
        .unwrap_err();
        assert_eq!(err, SnapshotError::ValueOverflow);
    }

    #[test]
    fn test_submission_length_mismatch() {
        let submission = SnapshotSubmission::new(
            vec![token(1), token(2)],
            vec![Amount::from_u64(1)],
            vec![Amount::from_u64(1), Amount::from_u64(2)],
        );
        assert_eq!(
            ValuationSnapshot::from_submission(submission, 1).unwrap_err(),
            SnapshotError::LengthMismatch {
                tokens: 2,
                amounts: 1,
                values: 2
            }
        );
    }

    #[test]
    fn test_deserialize_recomputes_and_validates() {
        let snapshot =
            ValuationSnapshot::new(vec![SnapshotEntry::new(token(9), 3u64, 7u64)], 5).unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: ValuationSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);

        let dup = format!(
            r#"{{"entries":[{{"token":"{t}","amount":"1","value":"1"}},{{"token":"{t}","amount":"1","value":"1"}}],"captured_at":1}}"#,
            t = token(9)
        );
        assert!(serde_json::from_str::<ValuationSnapshot>(&dup).is_err());
    }
}
