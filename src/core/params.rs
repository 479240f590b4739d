use crate::core::asset_type::{AssetClass, AssetType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Tolerance for every floating-point comparison in the engine.
pub const EPS: f64 = 8e-9;

/// Absolute equality within `EPS`.
pub fn is_equal_float(a: f64, b: f64) -> bool {
    (a - b).abs() < EPS
}

/// Errors arising from loading or validating simulation parameters.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read parameter file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid parameter JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{name}: expected {lower} <= {upper}, got {lower_value} > {upper_value}")]
    Ordering {
        name: &'static str,
        lower: &'static str,
        upper: &'static str,
        lower_value: f64,
        upper_value: f64,
    },
    #[error("{name} must lie in [0, 1], got {value}")]
    OutOfUnitRange { name: String, value: f64 },
    #[error("{0}")]
    Invalid(String),
}

/// Shape of the price response to a fire sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceImpactFn {
    /// `p' = max(0, p - fraction_sold * coefficient)`
    Linear,
    /// `p' = p * exp(-fraction_sold * coefficient)`
    Exponential,
}

/// Price-impact configuration: a function plus per-asset-type coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceImpact {
    pub function: PriceImpactFn,
    pub default_coefficient: f64,
    pub coefficients: BTreeMap<AssetType, f64>,
}

impl PriceImpact {
    pub fn coefficient(&self, asset_type: AssetType) -> f64 {
        self.coefficients
            .get(&asset_type)
            .copied()
            .unwrap_or(self.default_coefficient)
    }
}

impl Default for PriceImpact {
    fn default() -> Self {
        Self {
            function: PriceImpactFn::Linear,
            default_coefficient: 0.05,
            coefficients: BTreeMap::new(),
        }
    }
}

/// Whether the LCR denominator is fixed at initialisation or recomputed
/// from the current balance sheet every time it is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LcrDenominatorMode {
    #[default]
    Cached,
    Recompute,
}

/// Run-off weights used for LCR inflows and outflows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LcrWeights {
    pub external: f64,
    pub repo: f64,
    pub interbank: f64,
    pub deposits: f64,
    pub other: f64,
    pub long_term: f64,
}

impl Default for LcrWeights {
    fn default() -> Self {
        Self {
            external: 0.50,
            repo: 1.00,
            interbank: 1.00,
            deposits: 0.05,
            other: 0.50,
            long_term: 0.0,
        }
    }
}

/// Risk weights of each asset class in the RWA sum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RwaWeights {
    pub corporate_bonds: f64,
    pub gov_bonds: f64,
    pub equities: f64,
    pub other_tradables: f64,
    pub loan: f64,
    pub repo: f64,
    pub external: f64,
    pub other: f64,
}

impl RwaWeights {
    /// Weight of a tradable class.
    pub fn for_class(&self, class: AssetClass) -> f64 {
        match class {
            AssetClass::GovBonds => self.gov_bonds,
            AssetClass::CorporateBonds => self.corporate_bonds,
            AssetClass::Equities => self.equities,
            AssetClass::OtherTradable => self.other_tradables,
            AssetClass::External => self.external,
        }
    }
}

impl Default for RwaWeights {
    fn default() -> Self {
        Self {
            corporate_bonds: 1.00,
            gov_bonds: 0.00,
            equities: 0.75,
            other_tradables: 1.00,
            loan: 0.4,
            repo: 0.1,
            external: 0.35,
            other: 0.0,
        }
    }
}

/// Every knob the engine reads. Consumed read-only during a run.
///
/// Loadable from JSON; missing fields take their default values.
///
/// # Examples
///
/// ```
/// use contagion_engine::core::params::Parameters;
///
/// let params = Parameters::from_json_str(r#"{ "bank_leverage_on": true }"#).unwrap();
/// assert!(params.bank_leverage_on);
/// assert_eq!(params.timesteps_to_pay, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    // Contagion channels
    pub funding_contagion_interbank: bool,
    pub predefault_firesale_contagion: bool,
    pub predefault_pullfunding_contagion: bool,
    pub postdefault_firesale_contagion: bool,
    pub postdefault_pullfunding_contagion: bool,
    pub haircut_contagion: bool,
    pub margin_call_on: bool,
    pub endogenous_lgd_on: bool,
    pub liquidation_contagion: bool,

    pub interbank_loss_given_default: f64,
    pub haircut_slope: f64,
    pub initial_haircuts: BTreeMap<AssetType, f64>,
    pub price_impact: PriceImpact,

    // Delays, in timesteps
    pub timesteps_to_pay: u32,
    pub timesteps_to_redeem_shares: u32,

    pub lcr_weights: LcrWeights,

    // Regulatory constraints
    pub bank_leverage_on: bool,
    pub bank_rwa_on: bool,
    pub bank_lcr_on: bool,
    pub bank_leverage_min: f64,
    pub bank_leverage_buffer: f64,
    pub bank_leverage_target: f64,
    pub rwa_ratio_min: f64,
    pub rwa_ratio_buffer: f64,
    pub rwa_excess_target: f64,
    pub bank_lcr_min: f64,
    pub bank_lcr_buffer: f64,
    pub bank_lcr_target: f64,
    pub lcr_denominator: LcrDenominatorMode,

    // Hedge funds
    pub hf_cash_buffer_fraction: f64,
    pub hf_cash_target_fraction: f64,

    // Asset managers
    pub am_redemption_multiplier: f64,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            funding_contagion_interbank: true,
            predefault_firesale_contagion: false,
            predefault_pullfunding_contagion: false,
            postdefault_firesale_contagion: true,
            postdefault_pullfunding_contagion: false,
            haircut_contagion: false,
            margin_call_on: false,
            endogenous_lgd_on: false,
            liquidation_contagion: true,

            interbank_loss_given_default: 1.0,
            haircut_slope: 100.0,
            initial_haircuts: BTreeMap::new(),
            price_impact: PriceImpact::default(),

            timesteps_to_pay: 2,
            timesteps_to_redeem_shares: 2,

            lcr_weights: LcrWeights::default(),

            bank_leverage_on: false,
            bank_rwa_on: true,
            bank_lcr_on: false,
            bank_leverage_min: 0.03,
            bank_leverage_buffer: 0.05,
            bank_leverage_target: 0.06,
            rwa_ratio_min: 0.045,
            rwa_ratio_buffer: 0.045 + 0.5 * 0.039375,
            rwa_excess_target: 0.01,
            bank_lcr_min: 0.0,
            bank_lcr_buffer: 0.5,
            bank_lcr_target: 0.55,
            lcr_denominator: LcrDenominatorMode::Cached,

            hf_cash_buffer_fraction: 0.04,
            hf_cash_target_fraction: 0.08,

            am_redemption_multiplier: 2.5,
        }
    }
}

impl Parameters {
    /// The 48-bank demonstration setup: every contagion channel on,
    /// leverage thresholds 3% / 4% / 5%, 5% linear price impact and
    /// haircuts of 4% on corporate bonds and 2% on government bonds.
    pub fn cont_schaanning_2017() -> Self {
        let mut initial_haircuts = BTreeMap::new();
        initial_haircuts.insert(AssetType::corporate_bonds(1), 0.04);
        initial_haircuts.insert(AssetType::gov_bonds(1), 0.02);
        Self {
            funding_contagion_interbank: true,
            predefault_firesale_contagion: true,
            predefault_pullfunding_contagion: true,
            postdefault_firesale_contagion: true,
            postdefault_pullfunding_contagion: true,
            bank_leverage_min: 0.03,
            bank_leverage_buffer: 0.04,
            bank_leverage_target: 0.05,
            rwa_excess_target: 0.01,
            initial_haircuts,
            price_impact: PriceImpact {
                function: PriceImpactFn::Linear,
                default_coefficient: 0.05,
                coefficients: BTreeMap::new(),
            },
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Length of the cash ladders, in timesteps.
    pub fn ladder_len(&self) -> usize {
        3 * self.timesteps_to_pay as usize
    }

    /// Initial haircut of an asset type, if it takes part in haircut feedback.
    pub fn initial_haircut(&self, asset_type: AssetType) -> Option<f64> {
        self.initial_haircuts.get(&asset_type).copied()
    }

    /// Check threshold orderings and fractions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ordered(
            "bank leverage",
            ("min", self.bank_leverage_min),
            ("buffer", self.bank_leverage_buffer),
        )?;
        ordered(
            "bank leverage",
            ("buffer", self.bank_leverage_buffer),
            ("target", self.bank_leverage_target),
        )?;
        ordered(
            "RWA ratio",
            ("min", self.rwa_ratio_min),
            ("buffer", self.rwa_ratio_buffer),
        )?;
        ordered(
            "LCR",
            ("min", self.bank_lcr_min),
            ("buffer", self.bank_lcr_buffer),
        )?;
        ordered(
            "LCR",
            ("buffer", self.bank_lcr_buffer),
            ("target", self.bank_lcr_target),
        )?;
        ordered(
            "hedge fund cash",
            ("buffer", self.hf_cash_buffer_fraction),
            ("target", self.hf_cash_target_fraction),
        )?;

        unit("interbank_loss_given_default", self.interbank_loss_given_default)?;
        unit("hf_cash_target_fraction", self.hf_cash_target_fraction)?;
        for (asset_type, haircut) in &self.initial_haircuts {
            unit(&format!("initial haircut of {}", asset_type), *haircut)?;
        }

        if self.timesteps_to_pay == 0 {
            return Err(ConfigError::Invalid(
                "timesteps_to_pay must be at least 1".to_string(),
            ));
        }
        if self.timesteps_to_redeem_shares == 0
            || self.timesteps_to_redeem_shares as usize >= self.ladder_len()
        {
            return Err(ConfigError::Invalid(format!(
                "timesteps_to_redeem_shares must lie in 1..{}, got {}",
                self.ladder_len(),
                self.timesteps_to_redeem_shares
            )));
        }
        if self.price_impact.default_coefficient < 0.0
            || self.price_impact.coefficients.values().any(|c| *c < 0.0)
        {
            return Err(ConfigError::Invalid(
                "price impact coefficients must be non-negative".to_string(),
            ));
        }
        if self.haircut_slope < 0.0 {
            return Err(ConfigError::Invalid(
                "haircut_slope must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

fn ordered(
    name: &'static str,
    lower: (&'static str, f64),
    upper: (&'static str, f64),
) -> Result<(), ConfigError> {
    if lower.1 > upper.1 {
        return Err(ConfigError::Ordering {
            name,
            lower: lower.0,
            upper: upper.0,
            lower_value: lower.1,
            upper_value: upper.1,
        });
    }
    Ok(())
}

fn unit(name: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::OutOfUnitRange {
            name: name.to_string(),
            value,
        });
    }
    Ok(())
}
