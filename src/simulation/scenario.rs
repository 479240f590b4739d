//! Building a banking system from balance-sheet records.

use crate::agents::BankProfile;
use crate::core::default::EngineError;
use crate::core::params::{ConfigError, Parameters, RwaWeights};
use crate::engine::{InitialAssets, InitialLiabilities, Model};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Minimum risk-weighted capital ratio of the demonstration system.
const RHO_M: f64 = 0.045;
/// Average countercyclical buffer of the demonstration system.
const RHO_CB: f64 = 0.039375;
/// Share of total assets held as cash.
const CASH_FRACTION: f64 = 0.05;

/// Errors arising from loading or building a system.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("cannot read system file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid system JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("bank '{name}': {reason}")]
    InvalidRecord { name: String, reason: String },
    #[error("duplicate bank name '{0}'")]
    DuplicateName(String),
    #[error("exposure refers to unknown bank '{0}'")]
    UnknownBank(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// One bank as reported in a stress-test data set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSheetRecord {
    pub name: String,
    /// Common equity tier 1 capital.
    pub cet1e: f64,
    /// Leverage ratio in percent, CET1E over total assets.
    pub leverage_percent: f64,
    pub debt_securities: f64,
    /// Government bonds, part of `debt_securities`.
    pub gov_bonds: f64,
}

impl BalanceSheetRecord {
    pub fn total_assets(&self) -> f64 {
        self.cet1e / (self.leverage_percent / 100.0)
    }

    pub fn cash(&self) -> f64 {
        CASH_FRACTION * self.total_assets()
    }

    pub fn corporate_bonds(&self) -> f64 {
        self.debt_securities - self.gov_bonds
    }

    pub fn other_asset(&self) -> f64 {
        self.total_assets() - self.debt_securities - self.cash()
    }

    pub fn liabilities(&self) -> f64 {
        self.total_assets() - self.cet1e
    }

    fn validate(&self) -> Result<(), ScenarioError> {
        let invalid = |reason: String| ScenarioError::InvalidRecord {
            name: self.name.clone(),
            reason,
        };
        for (field, value) in [
            ("cet1e", self.cet1e),
            ("leverage_percent", self.leverage_percent),
            ("debt_securities", self.debt_securities),
            ("gov_bonds", self.gov_bonds),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!("{} must be finite and non-negative, got {}", field, value)));
            }
        }
        if self.cet1e <= 0.0 || self.leverage_percent <= 0.0 {
            return Err(invalid("cet1e and leverage_percent must be positive".to_string()));
        }
        if self.gov_bonds > self.debt_securities {
            return Err(invalid(format!(
                "government bonds {} exceed debt securities {}",
                self.gov_bonds, self.debt_securities
            )));
        }
        if self.other_asset() < 0.0 {
            return Err(invalid(format!(
                "debt securities {} and cash {:.2} exceed total assets {:.2}",
                self.debt_securities,
                self.cash(),
                self.total_assets()
            )));
        }
        Ok(())
    }
}

/// An interbank loan between two banks, by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureSpec {
    pub lender: String,
    pub borrower: String,
    pub principal: f64,
}

/// A whole system: the banks and the loans between them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemSpec {
    pub banks: Vec<BalanceSheetRecord>,
    pub exposures: Vec<ExposureSpec>,
}

impl SystemSpec {
    pub fn from_json_str(json: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Outstanding quantity of government and corporate bonds together.
    pub fn total_debt_securities(&self) -> f64 {
        self.banks.iter().map(|b| b.debt_securities).sum()
    }
}

/// The regulatory calibration every bank of the demonstration system gets.
pub fn demonstration_profile(params: &Parameters) -> BankProfile {
    let buffer = RHO_M + 0.5 * RHO_CB;
    BankProfile {
        rwa_weights: RwaWeights {
            other: 0.01,
            ..RwaWeights::default()
        },
        rwcr_buffer: Some(buffer),
        rwcr_target: Some(buffer + params.rwa_excess_target),
        ..BankProfile::default()
    }
}

/// Build a model from `spec`.
///
/// Each bank holds 5% of its assets in cash, its government and corporate
/// bonds as series 1 of each, and the rest as an `Other` asset. Its
/// liabilities are split evenly between an `Other` liability and a
/// deposit. Interbank exposures are then carved out of the `Other`
/// positions, and the initial values every behaviour measures against are
/// recorded.
pub fn build_system(spec: &SystemSpec, params: Parameters) -> Result<Model, ScenarioError> {
    params.validate()?;
    let profile = demonstration_profile(&params);
    let mut model = Model::new(params);

    let mut names = HashSet::new();
    for record in &spec.banks {
        record.validate()?;
        if !names.insert(record.name.as_str()) {
            return Err(ScenarioError::DuplicateName(record.name.clone()));
        }
        let bank = model.add_bank(record.name.clone(), profile.clone());
        model.init_institution(
            bank,
            &InitialAssets {
                cash: record.cash(),
                corporate_bonds: vec![record.corporate_bonds()],
                gov_bonds: vec![record.gov_bonds],
                other: record.other_asset(),
                ..InitialAssets::default()
            },
            &InitialLiabilities::default(),
        )?;
        let half = record.liabilities() / 2.0;
        model.add_other_liability(bank, half)?;
        model.add_deposit(bank, half)?;
    }

    for exposure in &spec.exposures {
        let lender = model
            .find(&exposure.lender)
            .ok_or_else(|| ScenarioError::UnknownBank(exposure.lender.clone()))?;
        let borrower = model
            .find(&exposure.borrower)
            .ok_or_else(|| ScenarioError::UnknownBank(exposure.borrower.clone()))?;
        model.add_interbank_loan(lender, borrower, exposure.principal)?;
    }

    model.set_initial_values();
    Ok(model)
}
