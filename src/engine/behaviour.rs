//! What each kind of institution does in the act phase.

use super::Model;
use crate::actions::{Action, ActionKind};
use crate::agents::InstitutionKind;
use crate::constraints::{BankLeverage, Constraint, LiquidityCoverage, RiskWeightedCapital};
use crate::core::default::{DefaultEvent, DefaultReason};
use crate::core::ids::InstitutionId;
use log::debug;

impl Model {
    /// Refresh the available actions of `id` and run its behaviour. Dead
    /// institutions do nothing.
    pub(crate) fn act(&mut self, id: InstitutionId) -> Result<(), DefaultEvent> {
        if !self.is_alive(id) {
            debug!("{} is dead and cannot act", id);
            return Ok(());
        }
        self.refresh_available_actions(id);
        match self.institutions[id.index()].kind {
            InstitutionKind::Bank(_) => self.act_bank(id),
            InstitutionKind::Hedgefund(_) => self.act_hedgefund(id),
            InstitutionKind::AssetManager(_) => self.act_asset_manager(id),
        }
    }

    fn default_event(&self, id: InstitutionId, reason: DefaultReason) -> DefaultEvent {
        DefaultEvent::new(id, reason, self.time)
    }

    fn bank_is_insolvent(&self, id: InstitutionId) -> bool {
        let view = self.view(id);
        let equity = view.equity();
        let rwa = self.params.bank_rwa_on && RiskWeightedCapital.is_insolvent(&view, equity);
        let leverage = self.params.bank_leverage_on && BankLeverage.is_insolvent(&view, equity);
        let lcr = self.params.bank_lcr_on && LiquidityCoverage.is_insolvent(&view, equity);
        rwa || leverage || lcr
    }

    fn predefault_contagion(&self) -> bool {
        self.params.predefault_firesale_contagion || self.params.predefault_pullfunding_contagion
    }

    fn act_bank(&mut self, id: InstitutionId) -> Result<(), DefaultEvent> {
        if self.params.liquidation_contagion && self.bank_is_insolvent(id) {
            debug!("{} is insolvent", id);
            return Err(self.default_event(id, DefaultReason::Solvency));
        }
        if !self.predefault_contagion() {
            return Ok(());
        }
        let Some(cet1e) = self.perform_liquidity_management(id) else {
            return Ok(());
        };

        let mut cash_raised_rwa = 0.0;
        if self.params.bank_rwa_on && RiskWeightedCapital.is_below_buffer(&self.view(id)) {
            cash_raised_rwa = self.raise_liquidity_on_rwa(id, cet1e);
        }

        if self.params.bank_lcr_on {
            let (den, hqla, target) = {
                let view = self.view(id);
                let lcr = LiquidityCoverage;
                let den = lcr.denominator(&view);
                (den, lcr.hqla(&view, cash_raised_rwa), lcr.hqla_target(&view, den))
            };
            if den > 0.0 && hqla / den < self.params.bank_lcr_buffer && target > hqla {
                self.raise_liquidity_with_pecking_order(id, target - hqla);
            }
        }
        Ok(())
    }

    fn act_hedgefund(&mut self, id: InstitutionId) -> Result<(), DefaultEvent> {
        self.fulfil_margin_calls(id)
            .map_err(|failed| failed.into_default(id, self.time))?;
        if self.params.liquidation_contagion && self.equity(id) < 0.0 {
            return Err(self.default_event(id, DefaultReason::Solvency));
        }
        if !self.predefault_contagion() {
            return Ok(());
        }
        self.perform_liquidity_management(id);

        let initial = self.institutions[id.index()]
            .hedgefund_profile()
            .map_or(0.0, |p| p.uec_fraction_initial);
        let assets = self.asset_valuation(id);
        if assets <= 0.0 {
            return Ok(());
        }
        let ue_cash = self.ledger(id).ue_cash();
        if ue_cash / assets < 0.9 * initial {
            self.sell_assets_proportionally(id, Some(initial * assets - ue_cash));
        }
        Ok(())
    }

    /// Pay last tick's extra redemptions, then sell to fund the redemptions
    /// the NAV loss since the start will trigger, then top up cash.
    fn act_asset_manager(&mut self, id: InstitutionId) -> Result<(), DefaultEvent> {
        let nav = self.nav(id);
        debug!("{} NAV is {}", id, nav);
        if nav < 0.0 {
            return Err(self.default_event(id, DefaultReason::Solvency));
        }
        let Some(profile) = self.institutions[id.index()].fund_profile().cloned() else {
            return Ok(());
        };

        self.redeem_extra_shares(id, profile.n_shares_extra_previous, profile.nav_previous)?;
        self.refresh_share_valuations(id);

        let nav_lr = if profile.nav_initial > 0.0 {
            (profile.nav_initial - nav) / profile.nav_initial
        } else {
            0.0
        };
        let extra = if nav_lr > profile.nav_lr_previous {
            let outstanding = self.shares_outstanding(id);
            let extra = (self.params.am_redemption_multiplier
                * profile.n_shares_initial
                * (nav_lr - profile.nav_lr_previous))
                .clamp(0.0, outstanding);
            self.sell_assets_proportionally(id, Some(extra * nav));
            extra
        } else {
            0.0
        };
        if let Some(p) = self.institutions[id.index()].fund_profile_mut() {
            p.n_shares_extra_previous = extra;
            p.nav_lr_previous = nav_lr;
            p.nav_previous = nav;
        }

        let assets = self.asset_valuation(id);
        let cash = self.ledger(id).cash();
        if assets > 0.0 && cash / assets < 0.9 * profile.cash_fraction_initial {
            self.sell_assets_proportionally(id, Some(assets * profile.cash_fraction_initial - cash));
        }
        Ok(())
    }

    /// Redeem `n_shares` across the fund's share contracts pro rata.
    /// Outside investors are paid at `nav` immediately; institutional
    /// holders get a redemption obligation.
    fn redeem_extra_shares(&mut self, fund: InstitutionId, n_shares: f64, nav: f64) -> Result<(), DefaultEvent> {
        if n_shares <= 0.0 {
            return Ok(());
        }
        let issued = self.institutions[fund.index()]
            .fund_profile()
            .map(|p| p.issued_shares.clone())
            .unwrap_or_default();
        let redeemable: Vec<f64> = issued
            .iter()
            .map(|id| self.contracts.get(*id).shares().map_or(0.0, |s| s.redeemable()))
            .collect();
        let total: f64 = redeemable.iter().sum();
        if total <= 0.0 {
            return Ok(());
        }

        let external_cash: f64 = issued
            .iter()
            .zip(&redeemable)
            .filter(|(id, _)| self.contracts.get(**id).asset_party().is_none())
            .map(|(_, r)| n_shares * r / total * nav)
            .sum();
        if self.ledger(fund).ue_cash() < external_cash {
            return Err(self.default_event(fund, DefaultReason::Liquidity));
        }

        for (contract, r) in issued.into_iter().zip(redeemable) {
            let k = (n_shares * r / total).min(r);
            if k <= 0.0 {
                continue;
            }
            match self.contracts.get(contract).asset_party() {
                None => {
                    self.pay_external(fund, k * nav);
                    if let Some(s) = self.contracts.get_mut(contract).shares_mut() {
                        s.n_shares = (s.n_shares - k).max(0.0);
                    }
                }
                Some(holder) => {
                    let action = Action::new(ActionKind::RedeemShares, contract, holder);
                    self.perform(&action, k);
                }
            }
        }
        Ok(())
    }
}
