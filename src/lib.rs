//! # contagion-engine
//!
//! Deterministic simulation of financial contagion between banks, hedge
//! funds and asset managers.
//!
//! Institutions hold loans, repos, deposits, tradable collateral and fund
//! shares against each other. A shock travels through funding withdrawal,
//! fire sales, margin calls and fund redemptions, and may end in cascading
//! defaults. Every tick is split into a step phase (pay what has matured),
//! a batch market clearing and an act phase (manage liquidity against
//! leverage, risk-weighted capital and liquidity coverage constraints), so
//! the outcome does not depend on the order institutions are processed in.
//!
//! ## Architecture
//!
//! - **core**: Identifiers, asset types, parameters, contracts, ledger, obligations, defaults
//! - **actions**: Action kinds and the proportional-allocation primitive
//! - **constraints**: Leverage, risk-weighted capital and liquidity coverage
//! - **market**: Prices, haircuts, price impact and the order book
//! - **agents**: Institutions and their per-kind profiles
//! - **engine**: The [`Model`](engine::Model) arena and every cross-institution operation
//! - **graph**: Interbank exposure network
//! - **simulation**: Driver, scenario builder, synthetic systems and run reports

pub mod actions;
pub mod agents;
pub mod constraints;
pub mod core;
pub mod engine;
pub mod graph;
pub mod market;
pub mod simulation;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::actions::{Action, ActionKind};
    pub use crate::agents::{BankProfile, Institution, InstitutionKind};
    pub use crate::core::asset_type::{AssetClass, AssetType};
    pub use crate::core::default::{DefaultEvent, DefaultReason, EngineError};
    pub use crate::core::ids::{ContractId, InstitutionId};
    pub use crate::core::params::Parameters;
    pub use crate::engine::{InitialAssets, InitialLiabilities, Model, TickOutcome};
    pub use crate::graph::ExposureGraph;
    pub use crate::simulation::{RunReport, Simulation};
}
