//! Market simulation harness
//!
//! Drives a `SolvencyLedger` through price scenarios on a manual clock:
//! a portfolio of simulated tokens is revalued against an 8-decimal price
//! book and pushed as asset/liability snapshots by a dedicated oracle
//! principal.
//!
//! Scenarios:
//! - `Crash`: healthy start, prices crash, the reported reserve collapses
//! - `Volatility`: hourly sine-shaped ETH/BTC swings around the start price
//! - `RandomWalk`: seeded multiplicative price walk over the full portfolio

use crate::address::{Address, Principal, TokenId};
use crate::alert::{AlertThresholds, RiskAlert};
use crate::amount::{Amount, AmountError};
use crate::clock::{Clock, ManualClock, Timestamp};
use crate::history::{HistoryConfig, HistoryEntry};
use crate::ledger::{
    LedgerConfig, LedgerError, SetupError, SolvencyLedger, SolvencyMetrics, UpdateReceipt,
};
use crate::snapshot::{SnapshotEntry, SnapshotSubmission};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

pub const PRICE_DECIMALS: u32 = 8;
pub const PRICE_SCALE: u64 = 100_000_000;

pub const DEFAULT_SIM_START: Timestamp = 1_700_000_000;
pub const HOUR: u64 = 3_600;

// =============================================================================
// TOKENS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimToken {
    pub symbol: &'static str,
    pub address: TokenId,
    pub decimals: u32,
    /// Whole-dollar starting price.
    pub initial_usd: u64,
    pub stable: bool,
}

impl SimToken {
    const fn new(symbol: &'static str, id: u8, decimals: u32, initial_usd: u64, stable: bool) -> Self {
        let mut bytes = [0u8; 20];
        bytes[19] = id;
        Self {
            symbol,
            address: Address::new(bytes),
            decimals,
            initial_usd,
            stable,
        }
    }

    pub fn initial_price(&self) -> Amount {
        Amount::from_u64(self.initial_usd * PRICE_SCALE)
    }

    /// `whole` units in base denomination.
    pub fn units(&self, whole: u64) -> Amount {
        Amount::from_u128(whole as u128 * 10u128.pow(self.decimals))
    }
}

pub const WETH: SimToken = SimToken::new("WETH", 1, 18, 2_000, false);
pub const WBTC: SimToken = SimToken::new("WBTC", 2, 18, 35_000, false);
pub const USDC: SimToken = SimToken::new("USDC", 3, 6, 1, true);
pub const USDT: SimToken = SimToken::new("USDT", 4, 6, 1, true);
pub const DAI: SimToken = SimToken::new("DAI", 5, 18, 1, true);
/// Priced at half an ETH.
pub const USDC_ETH_LP: SimToken = SimToken::new("USDC-ETH-LP", 6, 18, 1_000, false);
pub const DAI_USDC_LP: SimToken = SimToken::new("DAI-USDC-LP", 7, 18, 2, true);
pub const PROTOCOL_TOKEN: SimToken = SimToken::new("PROT", 8, 18, 5, false);

pub const ALL_TOKENS: [SimToken; 8] = [
    WETH,
    WBTC,
    USDC,
    USDT,
    DAI,
    USDC_ETH_LP,
    DAI_USDC_LP,
    PROTOCOL_TOKEN,
];

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationError {
    UnknownToken(TokenId),
    Amount(AmountError),
    Ledger(LedgerError),
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::UnknownToken(token) => write!(f, "no price for token {}", token),
            SimulationError::Amount(err) => write!(f, "valuation failed: {}", err),
            SimulationError::Ledger(err) => write!(f, "ledger rejected update: {}", err),
        }
    }
}

impl std::error::Error for SimulationError {}

impl From<AmountError> for SimulationError {
    fn from(err: AmountError) -> Self {
        SimulationError::Amount(err)
    }
}

impl From<LedgerError> for SimulationError {
    fn from(err: LedgerError) -> Self {
        SimulationError::Ledger(err)
    }
}

// =============================================================================
// PRICES
// =============================================================================

/// Token prices scaled by `PRICE_SCALE`.
#[derive(Debug, Clone)]
pub struct PriceBook {
    prices: HashMap<TokenId, Amount>,
}

impl Default for PriceBook {
    fn default() -> Self {
        let prices = ALL_TOKENS
            .iter()
            .map(|t| (t.address, t.initial_price()))
            .collect();
        Self { prices }
    }
}

impl PriceBook {
    pub fn price(&self, token: &TokenId) -> Option<&Amount> {
        self.prices.get(token)
    }

    pub fn set_price(&mut self, token: TokenId, price: Amount) {
        self.prices.insert(token, price);
    }

    /// `amount * price / PRICE_SCALE`
    pub fn value_of(&self, token: &TokenId, amount: &Amount) -> Result<Amount, SimulationError> {
        let price = self
            .price(token)
            .ok_or(SimulationError::UnknownToken(*token))?;
        Ok(amount.mul_div(price, &Amount::from_u64(PRICE_SCALE))?)
    }

    /// ETH halves, BTC drops to 60%, the ETH LP follows ETH down, and the
    /// protocol token falls to $1.
    pub fn apply_crash(&mut self) {
        let scale = |usd: u64| Amount::from_u64(usd * PRICE_SCALE);
        self.set_price(WETH.address, scale(WETH.initial_usd / 2));
        self.set_price(WBTC.address, scale(WBTC.initial_usd * 60 / 100));
        self.set_price(USDC_ETH_LP.address, scale(WETH.initial_usd / 4));
        self.set_price(PROTOCOL_TOKEN.address, scale(1));
    }

    /// ETH and BTC at `floor((1 + 0.1 * sin(step)) * 100)`% of their start
    /// price; USDC pinned to $1.
    pub fn apply_volatility(&mut self, step: u32) {
        let pct = volatility_pct(step);
        for token in [WETH, WBTC] {
            let price = token.initial_usd * PRICE_SCALE * pct / 100;
            self.set_price(token.address, Amount::from_u64(price));
        }
        self.set_price(USDC.address, USDC.initial_price());
    }

    /// Move every non-stable price by a uniform factor in
    /// `[-max_move_bps, +max_move_bps]`.
    pub fn apply_random_move(&mut self, rng: &mut ChaCha8Rng, max_move_bps: u64) {
        let max_move = max_move_bps.min(9_999) as i64;
        for token in ALL_TOKENS.iter().filter(|t| !t.stable) {
            let delta: i64 = rng.gen_range(-max_move..=max_move);
            let factor = Amount::from_u64((10_000 + delta) as u64);
            if let Some(price) = self.prices.get_mut(&token.address) {
                if let Ok(moved) = price.mul_div(&factor, &Amount::from_u64(10_000)) {
                    *price = moved;
                }
            }
        }
    }
}

pub fn volatility_pct(step: u32) -> u64 {
    let swing = (step as f64).sin() * 0.1;
    ((1.0 + swing) * 100.0).floor() as u64
}

// =============================================================================
// PORTFOLIO
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct Portfolio {
    positions: Vec<(TokenId, Amount)>,
}

impl Portfolio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, token: &SimToken, whole_units: u64) -> Self {
        self.positions.push((token.address, token.units(whole_units)));
        self
    }

    pub fn positions(&self) -> &[(TokenId, Amount)] {
        &self.positions
    }

    /// Every position scaled by `numerator / denominator`.
    pub fn scaled(&self, numerator: u64, denominator: u64) -> Result<Self, SimulationError> {
        let (num, den) = (Amount::from_u64(numerator), Amount::from_u64(denominator));
        let positions = self
            .positions
            .iter()
            .map(|(token, amount)| Ok((*token, amount.mul_div(&num, &den)?)))
            .collect::<Result<Vec<_>, AmountError>>()?;
        Ok(Self { positions })
    }

    pub fn valuation(&self, prices: &PriceBook) -> Result<SnapshotSubmission, SimulationError> {
        let entries = self
            .positions
            .iter()
            .map(|(token, amount)| {
                let value = prices.value_of(token, amount)?;
                Ok(SnapshotEntry::new(*token, amount.clone(), value))
            })
            .collect::<Result<Vec<_>, SimulationError>>()?;
        Ok(SnapshotSubmission::from_entries(entries))
    }
}

// =============================================================================
// HARNESS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Crash,
    Volatility,
    RandomWalk,
}

impl Scenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Crash => "crash",
            Scenario::Volatility => "volatility",
            Scenario::RandomWalk => "random_walk",
        }
    }
}

impl std::str::FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "crash" => Ok(Scenario::Crash),
            "volatility" => Ok(Scenario::Volatility),
            "random_walk" => Ok(Scenario::RandomWalk),
            other => Err(format!(
                "unknown scenario '{}' (expected crash, volatility or random_walk)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub seed: u64,
    pub start: Timestamp,
    pub history: HistoryConfig,
    pub alerts: AlertThresholds,
    /// Random-walk length.
    pub steps: u32,
    /// Random-walk per-step bound in basis points.
    pub max_move_bps: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            start: DEFAULT_SIM_START,
            history: HistoryConfig::default(),
            alerts: AlertThresholds::default(),
            steps: 24,
            max_move_bps: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub updates: usize,
    pub alerts: Vec<RiskAlert>,
    pub final_metrics: SolvencyMetrics,
    pub history: Vec<HistoryEntry>,
}

pub struct SimulationHarness {
    ledger: Arc<SolvencyLedger>,
    clock: Arc<ManualClock>,
    prices: PriceBook,
    oracle: Principal,
    assets: Portfolio,
    liabilities: Portfolio,
    receipts: Vec<UpdateReceipt>,
    rng: ChaCha8Rng,
    config: HarnessConfig,
}

impl SimulationHarness {
    pub fn new(config: HarnessConfig) -> Result<Self, SetupError> {
        let owner = Address::from_low_u64(0x0A11CE);
        let oracle = Address::from_low_u64(0x0AC1E);
        let clock = Arc::new(ManualClock::new(config.start));
        let ledger = SolvencyLedger::new(
            LedgerConfig {
                owner,
                history: config.history,
                alerts: config.alerts,
            },
            clock.clone(),
        )?;
        // the owner can always grant
        let _ = ledger.set_oracle(&owner, oracle, true);

        Ok(Self {
            ledger: Arc::new(ledger),
            clock,
            prices: PriceBook::default(),
            oracle,
            assets: Portfolio::new(),
            liabilities: Portfolio::new(),
            receipts: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
        })
    }

    pub fn ledger(&self) -> &Arc<SolvencyLedger> {
        &self.ledger
    }

    pub fn prices(&self) -> &PriceBook {
        &self.prices
    }

    pub fn prices_mut(&mut self) -> &mut PriceBook {
        &mut self.prices
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn advance(&self, secs: u64) -> Timestamp {
        self.clock.advance(secs)
    }

    pub fn receipts(&self) -> &[UpdateReceipt] {
        &self.receipts
    }

    /// 1000 ETH, 100 BTC and 1M USDC of assets against liabilities of half
    /// of each position.
    pub fn setup_initial_state(&mut self) -> Result<(), SimulationError> {
        self.assets = Portfolio::new()
            .with(&WETH, 1_000)
            .with(&WBTC, 100)
            .with(&USDC, 1_000_000);
        self.liabilities = self.assets.scaled(1, 2)?;
        self.push_assets()?;
        self.push_liabilities()?;
        Ok(())
    }

    /// Revalue and submit the asset portfolio.
    pub fn push_assets(&mut self) -> Result<&UpdateReceipt, SimulationError> {
        let submission = self.assets.valuation(&self.prices)?;
        let receipt = self.ledger.update_assets(&self.oracle, submission)?;
        Ok(self.keep(receipt))
    }

    /// Revalue and submit the liability portfolio.
    pub fn push_liabilities(&mut self) -> Result<&UpdateReceipt, SimulationError> {
        let submission = self.liabilities.valuation(&self.prices)?;
        let receipt = self.ledger.update_liabilities(&self.oracle, submission)?;
        Ok(self.keep(receipt))
    }

    /// Replace the asset side with a single reserve position.
    pub fn report_reserve(
        &mut self,
        token: &SimToken,
        whole_units: u64,
    ) -> Result<&UpdateReceipt, SimulationError> {
        self.assets = Portfolio::new().with(token, whole_units);
        self.push_assets()
    }

    pub fn set_liabilities(&mut self, liabilities: Portfolio) -> Result<&UpdateReceipt, SimulationError> {
        self.liabilities = liabilities;
        self.push_liabilities()
    }

    fn keep(&mut self, receipt: UpdateReceipt) -> &UpdateReceipt {
        debug!(
            side = receipt.side.as_str(),
            ratio = %receipt.ratio,
            band = %receipt.band,
            captured_at = receipt.captured_at,
            "Simulated update"
        );
        self.receipts.push(receipt);
        &self.receipts[self.receipts.len() - 1]
    }

    pub fn run(&mut self, scenario: Scenario) -> Result<ScenarioReport, SimulationError> {
        info!(scenario = scenario.as_str(), seed = self.config.seed, "Running scenario");
        let start = self.now();
        match scenario {
            Scenario::Crash => self.run_crash()?,
            Scenario::Volatility => self.run_volatility()?,
            Scenario::RandomWalk => self.run_random_walk()?,
        }
        Ok(self.report(scenario, start))
    }

    fn run_crash(&mut self) -> Result<(), SimulationError> {
        self.setup_initial_state()?;
        self.advance(HOUR);
        self.prices.apply_crash();
        self.report_reserve(&WETH, 1)?;
        Ok(())
    }

    fn run_volatility(&mut self) -> Result<(), SimulationError> {
        self.setup_initial_state()?;
        self.set_liabilities(Portfolio {
            positions: vec![(WETH.address, Amount::from_u128(500_000_000_000_000_000))],
        })?;
        self.advance(HOUR + 1);
        for step in 0..5 {
            self.prices.apply_volatility(step);
            self.report_reserve(&WETH, 1)?;
            if step < 4 {
                self.advance(HOUR);
            }
        }
        Ok(())
    }

    fn run_random_walk(&mut self) -> Result<(), SimulationError> {
        self.setup_initial_state()?;
        for _ in 0..self.config.steps {
            self.advance(self.config.history.min_interval_secs.max(1));
            self.prices
                .apply_random_move(&mut self.rng, self.config.max_move_bps);
            self.push_assets()?;
        }
        Ok(())
    }

    fn report(&self, scenario: Scenario, start: Timestamp) -> ScenarioReport {
        let end = self.now();
        ScenarioReport {
            scenario,
            updates: self.receipts.len(),
            alerts: self
                .receipts
                .iter()
                .filter_map(|r| r.alert.clone())
                .collect(),
            final_metrics: self.ledger.metrics(),
            history: self.ledger.history(start, end),
        }
    }
}
