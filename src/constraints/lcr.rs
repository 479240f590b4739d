use super::{Constraint, SheetView};
use crate::core::asset_type::AssetClass;
use crate::core::contract::{Contract, ContractTerms, Side};
use crate::core::params::{LcrDenominatorMode, EPS};

/// Share of outflows that inflows may offset.
pub const INFLOW_CAP: f64 = 0.75;

/// Liquidity coverage ratio: HQLA over net cash outflows.
///
/// HQLA is unencumbered cash plus government bonds. Net outflows are
/// `outflows - min(inflows - correction, 0.75 * outflows)`, where the
/// correction removes inflows already triggered by pending sales and
/// pulled funding.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiquidityCoverage;

impl LiquidityCoverage {
    /// Run-off weight of `contract` seen from `side`.
    pub fn weight(&self, view: &SheetView<'_>, contract: &Contract, side: Side) -> f64 {
        let w = &view.params.lcr_weights;
        match &contract.terms {
            ContractTerms::Loan(_) => w.interbank,
            ContractTerms::Deposit(_) => w.deposits,
            ContractTerms::Repo(_) => w.repo,
            ContractTerms::Other(_) => match side {
                Side::Liability => view
                    .inst
                    .bank_profile()
                    .and_then(|p| p.lcr_weight_other)
                    .unwrap_or(w.other),
                Side::Asset => w.other,
            },
            ContractTerms::LongTermUnsecured { .. } => w.long_term,
            ContractTerms::Tradable(t) if t.asset_type().is_external() => w.external,
            ContractTerms::Tradable(_) | ContractTerms::Shares(_) => 0.0,
        }
    }

    pub fn inflows(&self, view: &SheetView<'_>) -> f64 {
        view.ledger()
            .assets()
            .iter()
            .map(|id| view.book.get(*id))
            .map(|c| c.valuation() * self.weight(view, c, Side::Asset))
            .sum()
    }

    pub fn outflows(&self, view: &SheetView<'_>) -> f64 {
        view.ledger()
            .liabilities()
            .iter()
            .map(|id| view.book.get(*id))
            .map(|c| c.valuation() * self.weight(view, c, Side::Liability))
            .sum()
    }

    pub fn correction(&self, view: &SheetView<'_>) -> f64 {
        view.ledger()
            .assets()
            .iter()
            .map(|id| view.book.get(*id))
            .map(|c| {
                let weight = self.weight(view, c, Side::Asset);
                if let Some(t) = c.tradable() {
                    t.put_for_sale() * t.price() * weight
                } else if let Some(loan) = c.loan() {
                    loan.funding_pulled() * weight
                } else {
                    0.0
                }
            })
            .sum()
    }

    /// Net outflows from the current balance sheet.
    pub fn computed_denominator(&self, view: &SheetView<'_>) -> f64 {
        let outflows = self.outflows(view);
        let inflows = self.inflows(view) - self.correction(view);
        outflows - inflows.min(INFLOW_CAP * outflows)
    }

    pub fn denominator(&self, view: &SheetView<'_>) -> f64 {
        match view.params.lcr_denominator {
            LcrDenominatorMode::Cached => view
                .inst
                .bank_profile()
                .map_or(0.0, |p| p.lcr_den_initial),
            LcrDenominatorMode::Recompute => self.computed_denominator(view),
        }
    }

    pub fn gov_bonds(&self, view: &SheetView<'_>) -> f64 {
        view.tradable_value_of_class(AssetClass::GovBonds)
    }

    pub fn hqla(&self, view: &SheetView<'_>, cash_raised: f64) -> f64 {
        view.ue_cash() + self.gov_bonds(view) + cash_raised
    }

    pub fn lcr(&self, view: &SheetView<'_>, cash_raised: f64) -> f64 {
        let den = self.denominator(view);
        if den <= 0.0 {
            return f64::INFINITY;
        }
        self.hqla(view, cash_raised) / den
    }

    pub fn hqla_target(&self, view: &SheetView<'_>, den: f64) -> f64 {
        (view.params.bank_lcr_target * den).max(0.0)
    }

    /// Cash kept aside from deleveraging; zero unless the LCR is enforced.
    pub fn cash_buffer(&self, view: &SheetView<'_>) -> f64 {
        if !view.params.bank_lcr_on {
            return 0.0;
        }
        (view.params.bank_lcr_buffer * self.denominator(view) - self.gov_bonds(view)).max(0.0)
    }
}

impl Constraint for LiquidityCoverage {
    fn ratio_at(&self, view: &SheetView<'_>, _equity: f64) -> f64 {
        self.lcr(view, 0.0)
    }

    fn is_insolvent(&self, view: &SheetView<'_>, equity: f64) -> bool {
        self.ratio_at(view, equity) < view.params.bank_lcr_min - EPS
    }

    fn is_below_buffer(&self, view: &SheetView<'_>) -> bool {
        self.ratio(view) < view.params.bank_lcr_buffer
    }

    fn amount_to_raise_or_delever(&self, view: &SheetView<'_>) -> f64 {
        let den = self.denominator(view);
        if den <= 0.0 {
            return 0.0;
        }
        (self.hqla_target(view, den) - self.hqla(view, 0.0)).max(0.0)
    }
}
