use crate::core::ids::{ContractId, InstitutionId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why an institution defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DefaultReason {
    /// A matured obligation could not be paid from unencumbered cash.
    Liquidity,
    /// A regulatory or book-equity threshold was breached.
    Solvency,
    FailedMarginCall,
}

impl fmt::Display for DefaultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DefaultReason::Liquidity => "liquidity",
            DefaultReason::Solvency => "solvency",
            DefaultReason::FailedMarginCall => "failed margin call",
        };
        write!(f, "{}", s)
    }
}

/// The only recoverable failure in the engine: an economic default.
///
/// Raised by an institution's step or act logic and turned into a state
/// transition at the end of the phase.
#[derive(Debug, Clone, Copy, PartialEq, Error, Serialize, Deserialize)]
#[error("{institution} defaulted at t={time} ({reason})")]
pub struct DefaultEvent {
    pub institution: InstitutionId,
    pub reason: DefaultReason,
    pub time: u64,
}

impl DefaultEvent {
    pub fn new(institution: InstitutionId, reason: DefaultReason, time: u64) -> Self {
        Self {
            institution,
            reason,
            time,
        }
    }
}

/// A repo borrower could not post the collateral a margin call required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("margin call on repo {repo} could not be met")]
pub struct FailedMarginCall {
    pub repo: ContractId,
}

impl FailedMarginCall {
    pub fn into_default(self, institution: InstitutionId, time: u64) -> DefaultEvent {
        DefaultEvent::new(institution, DefaultReason::FailedMarginCall, time)
    }
}

/// Liveness of an institution. Defaults are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Alive,
    Defaulted { reason: DefaultReason, time: u64 },
}

impl Status {
    pub fn is_alive(&self) -> bool {
        matches!(self, Status::Alive)
    }
}

/// Errors arising from building or mutating a model outside of a run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("unknown institution {0}")]
    UnknownInstitution(InstitutionId),
    #[error("{field} of {institution} must be finite and non-negative, got {value}")]
    InvalidBalanceSheet {
        institution: InstitutionId,
        field: &'static str,
        value: f64,
    },
    #[error("{institution} has only {available} of {side} exposure to reclassify, {requested} requested")]
    InsufficientExposure {
        institution: InstitutionId,
        side: &'static str,
        available: f64,
        requested: f64,
    },
    #[error("shock fraction must lie in [0, 1], got {0}")]
    InvalidFraction(f64),
    #[error("{0} is not an asset manager")]
    NotAnAssetManager(InstitutionId),
    #[error("{0} is not a hedge fund")]
    NotAHedgefund(InstitutionId),
    #[error(transparent)]
    MarginCall(#[from] FailedMarginCall),
}
