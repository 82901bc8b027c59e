//! Access guard
//!
//! Single capability object consulted by every ledger mutator. The owner
//! grants and revokes the valuation-source capability; only principals that
//! hold it may submit snapshots.

use crate::address::Principal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// May grant/revoke valuation sources.
    Owner,
    /// May submit asset/liability snapshots.
    ValuationSource,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Owner => "owner",
            Capability::ValuationSource => "valuation_source",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessError {
    pub caller: Principal,
    pub required: Capability,
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} lacks the {} capability",
            self.caller,
            self.required.as_str()
        )
    }
}

impl std::error::Error for AccessError {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessGuard {
    owner: Principal,
    sources: BTreeSet<Principal>,
}

impl AccessGuard {
    /// The owner starts out as the only valuation source.
    pub fn new(owner: Principal) -> Self {
        let mut sources = BTreeSet::new();
        sources.insert(owner);
        Self { owner, sources }
    }

    pub fn owner(&self) -> Principal {
        self.owner
    }

    pub fn is_authorized(&self, principal: &Principal) -> bool {
        self.sources.contains(principal)
    }

    pub fn require_source(&self, caller: &Principal) -> Result<(), AccessError> {
        if self.is_authorized(caller) {
            Ok(())
        } else {
            Err(AccessError {
                caller: *caller,
                required: Capability::ValuationSource,
            })
        }
    }

    pub fn require_owner(&self, caller: &Principal) -> Result<(), AccessError> {
        if caller == &self.owner {
            Ok(())
        } else {
            Err(AccessError {
                caller: *caller,
                required: Capability::Owner,
            })
        }
    }

    /// Grant or revoke the valuation-source capability. Returns whether the
    /// set changed.
    pub fn authorize(
        &mut self,
        caller: &Principal,
        target: Principal,
        authorized: bool,
    ) -> Result<bool, AccessError> {
        self.require_owner(caller)?;
        let changed = if authorized {
            self.sources.insert(target)
        } else {
            self.sources.remove(&target)
        };
        Ok(changed)
    }

    /// Authorized sources in address order.
    pub fn sources(&self) -> Vec<Principal> {
        self.sources.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;

    #[test]
    fn test_owner_grants_and_revokes() {
        let owner = Address::from_low_u64(1);
        let oracle = Address::from_low_u64(2);
        let mut guard = AccessGuard::new(owner);

        assert!(guard.is_authorized(&owner));
        assert!(!guard.is_authorized(&oracle));

        assert_eq!(guard.authorize(&owner, oracle, true), Ok(true));
        assert_eq!(guard.authorize(&owner, oracle, true), Ok(false));
        assert!(guard.require_source(&oracle).is_ok());

        assert_eq!(guard.authorize(&owner, oracle, false), Ok(true));
        assert_eq!(
            guard.require_source(&oracle),
            Err(AccessError {
                caller: oracle,
                required: Capability::ValuationSource
            })
        );
    }

    #[test]
    fn test_non_owner_cannot_grant() {
        let owner = Address::from_low_u64(1);
        let oracle = Address::from_low_u64(2);
        let intruder = Address::from_low_u64(3);
        let mut guard = AccessGuard::new(owner);
        guard.authorize(&owner, oracle, true).unwrap();

        // even an authorized source cannot grant
        let err = guard.authorize(&oracle, intruder, true).unwrap_err();
        assert_eq!(err.required, Capability::Owner);
        assert!(!guard.is_authorized(&intruder));
        assert_eq!(guard.sources(), vec![owner, oracle]);
    }
}
