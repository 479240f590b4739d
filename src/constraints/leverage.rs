use super::{Constraint, SheetView};
use crate::core::asset_type::AssetClass;
use crate::core::contract::ContractType;
use crate::core::params::EPS;

/// Regulatory leverage of a bank: tier 1 capital over leverage exposure.
///
/// `ratio = (CET1E + AT1E) / (A - ΔA)`
#[derive(Debug, Clone, Copy, Default)]
pub struct BankLeverage;

impl BankLeverage {
    pub fn buffer(&self, view: &SheetView<'_>) -> f64 {
        view.inst
            .bank_profile()
            .and_then(|p| p.leverage_buffer)
            .unwrap_or(view.params.bank_leverage_buffer)
    }

    pub fn target(&self, view: &SheetView<'_>) -> f64 {
        view.inst
            .bank_profile()
            .and_then(|p| p.leverage_target)
            .unwrap_or(view.params.bank_leverage_target)
    }

    pub fn exposure(&self, view: &SheetView<'_>) -> f64 {
        let delta_a = view.inst.bank_profile().map_or(0.0, |p| p.delta_a);
        view.asset_valuation() - delta_a
    }
}

impl Constraint for BankLeverage {
    fn ratio_at(&self, view: &SheetView<'_>, equity: f64) -> f64 {
        let exposure = self.exposure(view);
        if exposure <= 0.0 {
            return 0.0;
        }
        let at1e = view.inst.bank_profile().map_or(0.0, |p| p.at1e);
        (view.cet1e(equity) + at1e) / exposure
    }

    fn is_insolvent(&self, view: &SheetView<'_>, equity: f64) -> bool {
        self.ratio_at(view, equity) < view.params.bank_leverage_min - EPS
    }

    fn is_below_buffer(&self, view: &SheetView<'_>) -> bool {
        self.ratio(view) < self.buffer(view) - EPS
    }

    /// Liabilities to pay off so that, at unchanged capital, the ratio lands
    /// exactly on target: `CET1E / ratio - CET1E / target`.
    fn amount_to_raise_or_delever(&self, view: &SheetView<'_>) -> f64 {
        if !self.is_below_buffer(view) {
            return 0.0;
        }
        let lev = self.ratio(view);
        if lev <= 0.0 {
            return 0.0;
        }
        let cet1e = view.cet1e(view.equity());
        (cet1e / lev - cet1e / self.target(view)).max(0.0)
    }
}

/// Book leverage of a hedge fund, `(A - L) / A`, managed against a floor
/// that moves with repo haircuts.
#[derive(Debug, Clone, Copy, Default)]
pub struct HedgefundLeverage;

impl HedgefundLeverage {
    /// Leverage the fund would have if it held only what its repos force it
    /// to keep, given current haircuts.
    pub fn effective_min_leverage(&self, view: &SheetView<'_>) -> f64 {
        let cash = view.cash();
        let haircutted: f64 = view
            .tradables()
            .filter(|t| !t.asset_type().is_external())
            .map(|t| (1.0 - view.market.haircut(t.asset_type())) * t.valuation())
            .sum();
        let tradable_value: f64 = view
            .tradables()
            .filter(|t| !t.asset_type().is_external())
            .map(|t| t.valuation())
            .sum();
        let collateral = cash + tradable_value;
        assert!(collateral >= -EPS, "negative collateral value {}", collateral);
        if collateral <= 0.0 {
            return 0.0;
        }

        let repo = view.liability_valuation_of(ContractType::Repo);
        let denominator = cash / collateral + haircutted / collateral;
        let eligible_minimum = if denominator > 0.0 {
            repo / denominator
        } else {
            0.0
        };
        let a_min = eligible_minimum
            + view.asset_valuation_of(ContractType::Other)
            + view.tradable_value_of_class(AssetClass::External);
        if a_min > 0.0 {
            (a_min - repo) / a_min
        } else {
            0.0
        }
    }

    fn initial(&self, view: &SheetView<'_>) -> f64 {
        view.inst
            .hedgefund_profile()
            .map_or(0.0, |p| p.leverage_initial)
    }

    /// One third of the way from the effective minimum to initial leverage.
    pub fn buffer_at(&self, view: &SheetView<'_>, eml: f64) -> f64 {
        (self.initial(view) - eml) / 3.0 + eml
    }

    /// Two thirds of the way from the effective minimum to initial leverage.
    pub fn target_at(&self, view: &SheetView<'_>, eml: f64) -> f64 {
        (self.initial(view) - eml) * 2.0 / 3.0 + eml
    }
}

impl Constraint for HedgefundLeverage {
    fn ratio_at(&self, view: &SheetView<'_>, equity: f64) -> f64 {
        let assets = view.asset_valuation();
        if assets == 0.0 {
            return 0.0;
        }
        equity / assets
    }

    fn is_insolvent(&self, _view: &SheetView<'_>, equity: f64) -> bool {
        equity < 0.0
    }

    fn is_below_buffer(&self, view: &SheetView<'_>) -> bool {
        let eml = self.effective_min_leverage(view);
        self.ratio(view) < self.buffer_at(view, eml)
    }

    fn amount_to_raise_or_delever(&self, view: &SheetView<'_>) -> f64 {
        let eml = self.effective_min_leverage(view);
        let lev = self.ratio(view);
        if lev >= self.buffer_at(view, eml) || lev <= 0.0 {
            return 0.0;
        }
        let target = self.target_at(view, eml);
        if target <= 0.0 {
            return 0.0;
        }
        let equity = view.equity();
        (equity / lev - equity / target).max(0.0)
    }
}
