//! Wide unsigned arithmetic for token quantities, valuations and ratios.
//!
//! Amounts are bounded to 256 bits, the width used by token economics on
//! the valuation side. Accumulation is done on `BigUint` and checked against
//! that bound, so an overflowing sum is detected instead of wrapping.

use num_bigint::BigUint;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Bit width of the accounting unit.
pub const AMOUNT_BITS: u64 = 256;

/// Ratio scale: 10_000 == 100.00%.
pub const RATIO_SCALE: u64 = 10_000;

/// Ratio reported when liabilities are zero and assets are positive.
pub const ZERO_LIABILITY_RATIO: u64 = 20_000;

/// Ratio reported when both sides are zero.
pub const EMPTY_LEDGER_RATIO: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    Empty,
    InvalidDigits(String),
    Overflow,
    Negative,
    DivisionByZero,
}

impl fmt::Display for AmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmountError::Empty => write!(f, "amount is empty"),
            AmountError::InvalidDigits(raw) => write!(f, "invalid amount digits: {}", raw),
            AmountError::Overflow => write!(f, "amount exceeds {} bits", AMOUNT_BITS),
            AmountError::Negative => write!(f, "amount must not be negative"),
            AmountError::DivisionByZero => write!(f, "division by zero"),
        }
    }
}

impl std::error::Error for AmountError {}

/// Unsigned quantity that always fits in 256 bits.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(BigUint);

impl Amount {
    pub fn zero() -> Self {
        Self(BigUint::default())
    }

    pub fn from_u64(value: u64) -> Self {
        Self(BigUint::from(value))
    }

    pub fn from_u128(value: u128) -> Self {
        Self(BigUint::from(value))
    }

    pub fn from_biguint(value: BigUint) -> Result<Self, AmountError> {
        if value.bits() > AMOUNT_BITS {
            return Err(AmountError::Overflow);
        }
        Ok(Self(value))
    }

    /// Largest representable amount (2^256 - 1).
    pub fn max_value() -> Self {
        Self((BigUint::from(1u8) << AMOUNT_BITS) - 1u8)
    }

    pub fn is_zero(&self) -> bool {
        self.0.bits() == 0
    }

    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    pub fn checked_add(&self, other: &Amount) -> Option<Amount> {
        Self::from_biguint(&self.0 + &other.0).ok()
    }

    /// `self * numerator / denominator`, truncating. The intermediate product
    /// is unbounded; only the result has to fit.
    pub fn mul_div(&self, numerator: &Amount, denominator: &Amount) -> Result<Amount, AmountError> {
        if denominator.is_zero() {
            return Err(AmountError::DivisionByZero);
        }
        Self::from_biguint(&self.0 * &numerator.0 / &denominator.0)
    }

    /// Sum with overflow detection. `None` if the total leaves 256 bits.
    pub fn checked_sum<'a, I>(amounts: I) -> Option<Amount>
    where
        I: IntoIterator<Item = &'a Amount>,
    {
        let mut total = BigUint::default();
        for amount in amounts {
            total += &amount.0;
            if total.bits() > AMOUNT_BITS {
                return None;
            }
        }
        Some(Self(total))
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl From<u128> for Amount {
    fn from(value: u128) -> Self {
        Self::from_u128(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    /// Accepts decimal digits or `0x`-prefixed hex.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(AmountError::Empty);
        }
        if trimmed.starts_with('-') {
            return Err(AmountError::Negative);
        }
        let (digits, radix) = match trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            Some(hex) => (hex, 16),
            None => (trimmed, 10),
        };
        let value = BigUint::parse_bytes(digits.as_bytes(), radix)
            .ok_or_else(|| AmountError::InvalidDigits(trimmed.to_string()))?;
        Self::from_biguint(value)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a non-negative integer or a decimal/hex string")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Amount, E> {
        Ok(Amount::from_u64(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Amount, E> {
        u64::try_from(value)
            .map(Amount::from_u64)
            .map_err(|_| E::custom(AmountError::Negative))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Amount, E> {
        value.parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }
}

/// Asset/liability ratio in basis points ×100 (10_000 == 100.00%).
///
/// Unbounded: a tiny nonzero liability total yields an arbitrarily large
/// ratio. Only an exact-zero liability total uses the sentinel values.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SolvencyRatio(BigUint);

impl SolvencyRatio {
    pub fn from_bps(bps: u64) -> Self {
        Self(BigUint::from(bps))
    }

    pub fn from_totals(total_assets: &Amount, total_liabilities: &Amount) -> Self {
        if total_liabilities.is_zero() {
            return if total_assets.is_zero() {
                Self::from_bps(EMPTY_LEDGER_RATIO)
            } else {
                Self::from_bps(ZERO_LIABILITY_RATIO)
            };
        }
        Self(total_assets.as_biguint() * RATIO_SCALE / total_liabilities.as_biguint())
    }

    pub fn at_least(&self, bps: u64) -> bool {
        self.0 >= BigUint::from(bps)
    }

    pub fn as_u64_saturating(&self) -> u64 {
        u64::try_from(&self.0).unwrap_or(u64::MAX)
    }

    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    /// "130.00%" style rendering.
    pub fn to_percent_string(&self) -> String {
        let whole = &self.0 / 100u32;
        let frac = u64::try_from(&self.0 % 100u32).unwrap_or(0);
        format!("{}.{:02}%", whole, frac)
    }
}

impl fmt::Display for SolvencyRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for SolvencyRatio {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SolvencyRatio {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Same wire format as an amount, minus the 256-bit bound.
        struct RatioVisitor;

        impl<'de> Visitor<'de> for RatioVisitor {
            type Value = SolvencyRatio;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a non-negative integer ratio")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<SolvencyRatio, E> {
                Ok(SolvencyRatio::from_bps(value))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<SolvencyRatio, E> {
                BigUint::parse_bytes(value.trim().as_bytes(), 10)
                    .map(SolvencyRatio)
                    .ok_or_else(|| E::custom(AmountError::InvalidDigits(value.to_string())))
            }
        }

        deserializer.deserialize_any(RatioVisitor)
    }
}
