use super::{Constraint, SheetView};
use crate::core::contract::ContractType;
use crate::core::params::{RwaWeights, EPS};

/// Risk-weighted capital ratio: `CET1E / RWA`.
///
/// Quantities already put for sale and funding already pulled are left
/// out of RWA, so the same reduction is never counted twice.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskWeightedCapital;

impl RiskWeightedCapital {
    pub fn weights(&self, view: &SheetView<'_>) -> RwaWeights {
        view.inst
            .bank_profile()
            .map(|p| p.rwa_weights.clone())
            .unwrap_or_default()
    }

    pub fn rwa(&self, view: &SheetView<'_>) -> f64 {
        let w = &self.weights(view);
        let tradables: f64 = view
            .tradables()
            .map(|t| {
                w.for_class(t.asset_type().class())
                    * (t.quantity() - t.put_for_sale())
                    * t.price()
            })
            .sum();
        let ledger = view.ledger();
        let unpulled = |kind: ContractType| -> f64 {
            ledger
                .assets_of_type(view.book, kind)
                .into_iter()
                .filter_map(|id| view.book.get(id).loan())
                .map(|l| l.principal() - l.funding_pulled())
                .sum()
        };
        tradables
            + w.other * view.asset_valuation_of(ContractType::Other)
            + w.loan * unpulled(ContractType::Loan)
            + w.repo * unpulled(ContractType::Repo)
    }

    pub fn min(&self, view: &SheetView<'_>) -> f64 {
        view.inst
            .bank_profile()
            .and_then(|p| p.rwcr_min)
            .unwrap_or(view.params.rwa_ratio_min)
    }

    pub fn target(&self, view: &SheetView<'_>) -> f64 {
        let profile = view.inst.bank_profile();
        if let Some(target) = profile.and_then(|p| p.rwcr_target) {
            return target;
        }
        let buffer = profile
            .and_then(|p| p.rwcr_buffer)
            .unwrap_or(view.params.rwa_ratio_buffer);
        buffer + view.params.rwa_excess_target
    }
}

impl Constraint for RiskWeightedCapital {
    /// # Panics
    ///
    /// Panics if RWA is not positive.
    fn ratio_at(&self, view: &SheetView<'_>, equity: f64) -> f64 {
        let rwa = self.rwa(view);
        assert!(rwa > 0.0, "RWA must be positive, got {}", rwa);
        view.cet1e(equity) / rwa
    }

    fn is_insolvent(&self, view: &SheetView<'_>, equity: f64) -> bool {
        self.ratio_at(view, equity) < self.min(view) - EPS
    }

    fn is_below_buffer(&self, view: &SheetView<'_>) -> bool {
        let ratio = self.ratio(view);
        match view.inst.bank_profile().and_then(|p| p.rwcr_buffer) {
            Some(buffer) => ratio < buffer,
            None => ratio < view.params.rwa_ratio_buffer - EPS,
        }
    }

    /// RWA to shed, `RWA - CET1E / target`. Expressed in risk-weighted
    /// units; the cash to raise depends on which weights are sold.
    fn amount_to_raise_or_delever(&self, view: &SheetView<'_>) -> f64 {
        if !self.is_below_buffer(view) {
            return 0.0;
        }
        let cet1e = view.cet1e(view.equity());
        (self.rwa(view) - cet1e / self.target(view)).max(0.0)
    }
}
