//! Regulatory and book ratios an institution manages against.
//!
//! Every constraint answers the same three questions about a balance sheet:
//! is the hard minimum breached, is the soft buffer breached, and how much
//! has to be raised (or delevered) to get back to target. Constraints hold
//! no state; they read the institution through a [`SheetView`].

pub mod lcr;
pub mod leverage;
pub mod rwa;

pub use lcr::LiquidityCoverage;
pub use leverage::{BankLeverage, HedgefundLeverage};
pub use rwa::RiskWeightedCapital;

use crate::agents::Institution;
use crate::core::asset_type::AssetClass;
use crate::core::contract::{ContractBook, ContractType, TradableAsset};
use crate::core::ledger::Ledger;
use crate::core::params::Parameters;
use crate::market::AssetMarket;

/// A ratio with a hard minimum, a soft buffer and a target.
pub trait Constraint {
    /// The ratio, evaluated with the given book equity.
    fn ratio_at(&self, view: &SheetView<'_>, equity: f64) -> f64;

    fn ratio(&self, view: &SheetView<'_>) -> f64 {
        self.ratio_at(view, view.equity())
    }

    fn is_insolvent(&self, view: &SheetView<'_>, equity: f64) -> bool;

    fn is_below_buffer(&self, view: &SheetView<'_>) -> bool;

    /// Amount to raise or delever to bring the ratio back to target; zero
    /// while the ratio is above its buffer.
    fn amount_to_raise_or_delever(&self, view: &SheetView<'_>) -> f64;
}

/// Read-only view of one institution's balance sheet in the model.
#[derive(Clone, Copy)]
pub struct SheetView<'a> {
    pub inst: &'a Institution,
    pub book: &'a ContractBook,
    pub market: &'a AssetMarket,
    pub params: &'a Parameters,
}

impl<'a> SheetView<'a> {
    pub fn new(
        inst: &'a Institution,
        book: &'a ContractBook,
        market: &'a AssetMarket,
        params: &'a Parameters,
    ) -> Self {
        Self {
            inst,
            book,
            market,
            params,
        }
    }

    pub fn ledger(&self) -> &'a Ledger {
        &self.inst.ledger
    }

    pub fn cash(&self) -> f64 {
        self.ledger().cash()
    }

    pub fn ue_cash(&self) -> f64 {
        self.ledger().ue_cash()
    }

    pub fn asset_valuation(&self) -> f64 {
        self.ledger().asset_valuation(self.book)
    }

    pub fn liability_valuation(&self) -> f64 {
        self.ledger().liability_valuation(self.book)
    }

    pub fn equity(&self) -> f64 {
        self.ledger().equity_valuation(self.book)
    }

    pub fn asset_valuation_of(&self, kind: ContractType) -> f64 {
        self.ledger().asset_valuation_of(self.book, kind)
    }

    pub fn liability_valuation_of(&self, kind: ContractType) -> f64 {
        self.ledger().liability_valuation_of(self.book, kind)
    }

    /// Every tradable holding on the asset side.
    pub fn tradables(&self) -> impl Iterator<Item = &'a TradableAsset> + 'a {
        let book = self.book;
        self.ledger()
            .assets()
            .iter()
            .filter_map(move |id| book.get(*id).tradable())
    }

    pub fn tradables_of_class(
        &self,
        class: AssetClass,
    ) -> impl Iterator<Item = &'a TradableAsset> + 'a {
        self.tradables()
            .filter(move |t| t.asset_type().class() == class)
    }

    /// Marked value of all holdings of one class.
    pub fn tradable_value_of_class(&self, class: AssetClass) -> f64 {
        self.tradables_of_class(class).map(|t| t.valuation()).sum()
    }

    /// Common equity tier 1 given book equity. For non-banks this is the
    /// book equity itself.
    pub fn cet1e(&self, equity: f64) -> f64 {
        match self.inst.bank_profile() {
            Some(p) => equity - (p.at1e + p.t2c) - p.delta_e,
            None => equity,
        }
    }
}
