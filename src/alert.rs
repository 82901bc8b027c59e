//! Risk classification and band-crossing alerts.

use crate::amount::SolvencyRatio;
use crate::clock::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const DEFAULT_HEALTHY_BPS: u64 = 15_000;
pub const DEFAULT_WARNING_BPS: u64 = 12_000;
pub const DEFAULT_HIGH_RISK_BPS: u64 = 10_500;

/// Ordered by severity: `Healthy < Warning < HighRisk < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskBand {
    Healthy,
    Warning,
    HighRisk,
    Critical,
}

impl RiskBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskBand::Healthy => "HEALTHY",
            RiskBand::Warning => "WARNING",
            RiskBand::HighRisk => "HIGH_RISK",
            RiskBand::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertThresholds {
    /// Ratio at or above which the protocol is HEALTHY.
    #[serde(default = "default_healthy_bps")]
    pub healthy_bps: u64,
    #[serde(default = "default_warning_bps")]
    pub warning_bps: u64,
    /// Below this the protocol is CRITICAL.
    #[serde(default = "default_high_risk_bps")]
    pub high_risk_bps: u64,
}

fn default_healthy_bps() -> u64 {
    DEFAULT_HEALTHY_BPS
}

fn default_warning_bps() -> u64 {
    DEFAULT_WARNING_BPS
}

fn default_high_risk_bps() -> u64 {
    DEFAULT_HIGH_RISK_BPS
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            healthy_bps: DEFAULT_HEALTHY_BPS,
            warning_bps: DEFAULT_WARNING_BPS,
            high_risk_bps: DEFAULT_HIGH_RISK_BPS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdError(pub AlertThresholds);

impl fmt::Display for ThresholdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "alert thresholds must be strictly descending and nonzero (healthy={}, warning={}, high_risk={})",
            self.0.healthy_bps, self.0.warning_bps, self.0.high_risk_bps
        )
    }
}

impl std::error::Error for ThresholdError {}

impl AlertThresholds {
    pub fn validate(&self) -> Result<(), ThresholdError> {
        if self.healthy_bps > self.warning_bps
            && self.warning_bps > self.high_risk_bps
            && self.high_risk_bps > 0
        {
            Ok(())
        } else {
            Err(ThresholdError(*self))
        }
    }

    pub fn classify(&self, ratio: &SolvencyRatio) -> RiskBand {
        if ratio.at_least(self.healthy_bps) {
            RiskBand::Healthy
        } else if ratio.at_least(self.warning_bps) {
            RiskBand::Warning
        } else if ratio.at_least(self.high_risk_bps) {
            RiskBand::HighRisk
        } else {
            RiskBand::Critical
        }
    }

    /// Lowest ratio still inside `band`; CRITICAL has no floor.
    pub fn floor(&self, band: RiskBand) -> Option<u64> {
        match band {
            RiskBand::Healthy => Some(self.healthy_bps),
            RiskBand::Warning => Some(self.warning_bps),
            RiskBand::HighRisk => Some(self.high_risk_bps),
            RiskBand::Critical => None,
        }
    }

    /// Boundary nearest to a ratio in `entered` that was crossed to get there.
    fn crossed_boundary(&self, entered: RiskBand, worsening: bool) -> u64 {
        if worsening {
            match entered {
                RiskBand::Healthy => self.healthy_bps,
                RiskBand::Warning => self.healthy_bps,
                RiskBand::HighRisk => self.warning_bps,
                RiskBand::Critical => self.high_risk_bps,
            }
        } else {
            self.floor(entered).unwrap_or(self.high_risk_bps)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertKind {
    #[serde(rename = "CRITICAL_SOLVENCY")]
    CriticalSolvency,
    #[serde(rename = "LOW_SOLVENCY")]
    LowSolvency,
    #[serde(rename = "WARNING")]
    Warning,
    #[serde(rename = "SOLVENCY_RECOVERED")]
    Recovered,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::CriticalSolvency => "CRITICAL_SOLVENCY",
            AlertKind::LowSolvency => "LOW_SOLVENCY",
            AlertKind::Warning => "WARNING",
            AlertKind::Recovered => "SOLVENCY_RECOVERED",
        }
    }

    fn entering(band: RiskBand) -> Self {
        match band {
            RiskBand::Critical => AlertKind::CriticalSolvency,
            RiskBand::HighRisk => AlertKind::LowSolvency,
            RiskBand::Warning | RiskBand::Healthy => AlertKind::Warning,
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emitted when the ratio moves into a different risk band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAlert {
    pub id: Uuid,
    pub kind: AlertKind,
    pub current_value: SolvencyRatio,
    pub threshold: u64,
    pub timestamp: Timestamp,
    pub previous_band: Option<RiskBand>,
    pub band: RiskBand,
}

/// Tracks the last observed band so that only crossings produce alerts.
#[derive(Debug, Clone)]
pub struct AlertPolicy {
    thresholds: AlertThresholds,
    last_band: Option<RiskBand>,
}

impl AlertPolicy {
    pub fn new(thresholds: AlertThresholds) -> Result<Self, ThresholdError> {
        thresholds.validate()?;
        Ok(Self {
            thresholds,
            last_band: None,
        })
    }

    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    pub fn classify(&self, ratio: &SolvencyRatio) -> RiskBand {
        self.thresholds.classify(ratio)
    }

    pub fn current_band(&self) -> Option<RiskBand> {
        self.last_band
    }

    /// Set the baseline band without alerting.
    pub fn set_baseline(&mut self, ratio: &SolvencyRatio) {
        self.last_band = Some(self.classify(ratio));
    }

    /// Classify `ratio` and return an alert if the band changed. The first
    /// evaluation only alerts when it lands outside HEALTHY.
    pub fn evaluate(&mut self, ratio: &SolvencyRatio, now: Timestamp) -> Option<RiskAlert> {
        let band = self.classify(ratio);
        let previous = self.last_band.replace(band);

        let worsening = match previous {
            Some(prev) if prev == band => return None,
            Some(prev) => band > prev,
            None if band == RiskBand::Healthy => return None,
            None => true,
        };

        let kind = if worsening {
            AlertKind::entering(band)
        } else {
            AlertKind::Recovered
        };

        Some(RiskAlert {
            id: Uuid::new_v4(),
            kind,
            current_value: ratio.clone(),
            threshold: self.thresholds.crossed_boundary(band, worsening),
            timestamp: now,
            previous_band: previous,
            band,
        })
    }
}
