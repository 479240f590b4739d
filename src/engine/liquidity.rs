//! Liquidity management: cash ladders, paying matured obligations, the
//! pecking order and the St. Patrick's Day algorithm.

use super::Model;
use crate::actions::{Action, ActionKind};
use crate::agents::InstitutionKind;
use crate::constraints::{BankLeverage, Constraint, HedgefundLeverage, LiquidityCoverage, RiskWeightedCapital};
use crate::core::asset_type::AssetClass;
use crate::core::contract::ContractType;
use crate::core::default::{DefaultEvent, DefaultReason};
use crate::core::ids::{InstitutionId, ObligationId};
use crate::core::obligation::ObligationKind;
use crate::core::params::{is_equal_float, EPS};
use log::debug;

impl Model {
    /// Cash owed by `id`, indexed by ticks until due.
    pub fn cash_commitments(&self, id: InstitutionId) -> Vec<f64> {
        let mut ladder = vec![0.0; self.params.ladder_len()];
        for &ob in self.institutions[id.index()].mailbox.inbox() {
            let o = self.obligations.get(ob);
            if !o.is_pending() {
                continue;
            }
            let idx = o.time_to_pay() as i64 - self.time as i64 - 1;
            if let Some(slot) = usize::try_from(idx).ok().and_then(|i| ladder.get_mut(i)) {
                *slot += self.obligation_amount(o);
            }
        }
        ladder
    }

    /// Cash owed to `id`, indexed by ticks until received. Obligations of
    /// payers that already missed the date are skipped.
    pub fn cash_inflows(&self, id: InstitutionId) -> Vec<f64> {
        let mut ladder = vec![0.0; self.params.ladder_len()];
        for &ob in self.institutions[id.index()].mailbox.outbox() {
            let o = self.obligations.get(ob);
            if !o.is_pending() {
                continue;
            }
            let idx = o.time_to_receive() as i64 - self.time as i64 - 1;
            if let Some(slot) = usize::try_from(idx).ok().and_then(|i| ladder.get_mut(i)) {
                *slot += self.obligation_amount(o);
            }
        }
        ladder
    }

    /// Settle every matured obligation, or default for lack of liquidity
    /// when unencumbered cash cannot cover them all.
    pub(crate) fn pay_matured_or_default(&mut self, id: InstitutionId) -> Result<(), DefaultEvent> {
        let matured = self.institutions[id.index()]
            .mailbox
            .matured(&self.obligations, self.time);
        if matured.is_empty() {
            return Ok(());
        }
        let total: f64 = matured
            .iter()
            .map(|ob| self.obligation_amount(self.obligations.get(*ob)))
            .sum();
        debug!("{} has matured obligations of {:.2}", id, total);
        if self.ledger(id).ue_cash() < total - EPS {
            debug!("{} cannot pay {:.2}; liquidity default", id, total);
            return Err(DefaultEvent::new(id, DefaultReason::Liquidity, self.time));
        }
        for ob in matured {
            self.fulfil_obligation(ob);
        }
        Ok(())
    }

    fn fulfil_obligation(&mut self, ob: ObligationId) {
        let o = self.obligations.get(ob);
        let (kind, payer, payee, amount) = (o.kind(), o.payer(), o.payee(), o.amount());
        match kind {
            ObligationKind::PullFunding { loan } => {
                self.pay_loan(loan, amount);
                if let Some(l) = self.contracts.get_mut(loan).loan_mut() {
                    l.reduce_funding_pulled(amount);
                }
            }
            ObligationKind::RedeemShares { shares, n_shares } => {
                let cash = n_shares * self.nav(payer);
                let paid = self.pay_liability(payer, cash);
                self.send_cash(payee, paid);
                if let Some(s) = self.contracts.get_mut(shares).shares_mut() {
                    s.n_shares = (s.n_shares - n_shares).max(0.0);
                    s.pending_redemption = (s.pending_redemption - n_shares).max(0.0);
                }
                self.refresh_share_valuations(payer);
            }
        }
        self.obligations.get_mut(ob).set_fulfilled();
        self.discard_obligation(ob);
        debug!("{} fulfilled {} towards {}", payer, ob, payee);
    }

    /// Pull funding from interbank loans first, then from reverse repos.
    /// Returns the amount pulled and whether it covers `amount`.
    pub(crate) fn pull_funding_proportionally(&mut self, id: InstitutionId, amount: f64) -> (f64, bool) {
        if amount <= 0.0 {
            return (0.0, true);
        }
        let (repos, interbank) = self.split_pull_funding(id);
        let pulled = self.perform_proportionally(&interbank, Some(amount));
        if is_equal_float(pulled, amount) {
            return (amount, true);
        }
        let rest = amount - pulled;
        let pulled_repo = self.perform_proportionally(&repos, Some(rest));
        (pulled + pulled_repo, is_equal_float(pulled_repo, rest))
    }

    fn split_pull_funding(&self, id: InstitutionId) -> (Vec<Action>, Vec<Action>) {
        self.actions_of(id, ActionKind::PullFunding)
            .into_iter()
            .partition(|a| self.contracts.get(a.contract).contract_type() == ContractType::Repo)
    }

    /// Raise `amount` of cash: pull funding first when that channel is on,
    /// then sell assets for the rest.
    pub(crate) fn raise_liquidity_with_pecking_order(&mut self, id: InstitutionId, amount: f64) -> f64 {
        assert!(amount > 0.0, "liquidity to raise must be positive, got {}", amount);
        let mut pulled = 0.0;
        if self.params.predefault_pullfunding_contagion {
            let (p, is_enough) = self.pull_funding_proportionally(id, amount);
            if is_enough {
                return p;
            }
            pulled = p;
        }
        let sold = self.sell_assets_proportionally(id, Some(amount - pulled));
        if amount > pulled + sold + EPS {
            debug!("{} could not raise {:.4}, only {:.4}", id, amount, pulled + sold);
        }
        pulled + sold
    }

    /// Raise cash towards the RWA target, shedding risk-weighted assets in
    /// the fixed order interbank, reverse repo, corporate bonds, other
    /// tradables, equities. Returns the cash raised.
    pub(crate) fn raise_liquidity_on_rwa(&mut self, id: InstitutionId, cet1e: f64) -> f64 {
        let (weights, target, mut rwa) = {
            let view = self.view(id);
            let rwc = RiskWeightedCapital;
            (rwc.weights(&view), rwc.target(&view), rwc.rwa(&view))
        };
        assert!(cet1e >= 0.0, "CET1E must be non-negative, got {}", cet1e);
        assert!(rwa >= 0.0, "RWA must be non-negative, got {}", rwa);

        let mut tiers: Vec<(f64, Vec<Action>)> = Vec::new();
        if self.params.predefault_pullfunding_contagion {
            let (repos, interbank) = self.split_pull_funding(id);
            tiers.push((weights.loan, interbank));
            tiers.push((weights.repo, repos));
        }
        let sells = self.actions_of(id, ActionKind::SellAsset);
        for class in [
            AssetClass::CorporateBonds,
            AssetClass::OtherTradable,
            AssetClass::Equities,
        ] {
            let of_class = sells
                .iter()
                .copied()
                .filter(|a| {
                    self.contracts
                        .get(a.contract)
                        .tradable()
                        .is_some_and(|t| t.asset_type().class() == class)
                })
                .collect();
            tiers.push((weights.for_class(class), of_class));
        }

        let mut raised = 0.0;
        for (weight, actions) in tiers {
            if weight == 0.0 {
                continue;
            }
            let x = (rwa - cet1e / target) / weight;
            if x <= 0.0 {
                return raised;
            }
            let amount = self.perform_proportionally(&actions, Some(x));
            rwa -= amount * weight;
            raised += amount;
            if is_equal_float(amount, x) {
                return raised;
            }
        }
        debug!("{} could not reach its RWA target", id);
        raised
    }

    /// Cash kept aside from deleveraging.
    pub(crate) fn cash_buffer(&self, id: InstitutionId) -> f64 {
        let view = self.view(id);
        match view.inst.kind {
            InstitutionKind::Bank(_) => LiquidityCoverage.cash_buffer(&view),
            _ => view.asset_valuation() * self.params.hf_cash_buffer_fraction,
        }
    }

    fn amount_to_delever(&self, id: InstitutionId) -> f64 {
        let view = self.view(id);
        match view.inst.kind {
            InstitutionKind::Bank(_) => BankLeverage.amount_to_raise_or_delever(&view),
            _ => HedgefundLeverage.amount_to_raise_or_delever(&view),
        }
    }

    /// The St. Patrick's Day algorithm for leveraged institutions.
    ///
    /// Walks the cash ladders: shortfalls within the payment delay are met
    /// by selling assets, later ones through the pecking order. With the
    /// leverage constraint on, spare cash then pays off liabilities.
    ///
    /// Returns the bank's CET1E, or `None` when it turned negative and
    /// nothing more should be done. Hedge funds always get `Some`.
    pub(crate) fn perform_liquidity_management(&mut self, id: InstitutionId) -> Option<f64> {
        let ttp = self.params.timesteps_to_pay as usize;
        let inflows = self.cash_inflows(id);
        let commitments = self.cash_commitments(id);
        let mut balance = self.ledger(id).ue_cash();
        let mut min_spare = balance;

        for t in 0..ttp.min(commitments.len()) {
            balance += inflows[t] - commitments[t];
            if balance < 0.0 {
                balance += self.sell_assets_proportionally(id, Some(-balance));
            }
            min_spare = min_spare.min(balance);
        }
        if balance >= 0.0 {
            debug!(
                "{} meets its commitments for the next {} ticks, spare {:.4}, minimum {:.4}",
                id, ttp, balance, min_spare
            );
        }

        let is_bank = self.institutions[id.index()].is_bank();
        if !is_bank {
            self.prepare_future_margin_calls(id);
        }
        let cet1e = {
            let view = self.view(id);
            view.cet1e(view.equity())
        };
        if is_bank && cet1e < 0.0 {
            return None;
        }

        for t in ttp..commitments.len() {
            balance += inflows[t] - commitments[t];
            if balance < 0.0 {
                balance += self.raise_liquidity_with_pecking_order(id, -balance);
            }
            min_spare = min_spare.min(balance);
        }

        if self.params.bank_leverage_on {
            let mut to_delever = self.amount_to_delever(id);
            let spare = self.ledger(id).ue_cash() - self.cash_buffer(id);
            let mut delever = min_spare.min(spare).min(to_delever).max(0.0);
            if delever > 0.0 {
                delever = self.pay_off_liabilities(id, delever);
                to_delever -= delever;
            }
            balance -= delever;
            if balance < to_delever {
                balance += self.raise_liquidity_with_pecking_order(id, to_delever - balance);
            }
            debug!("{} delevered {:.4}, balance {:.4}", id, delever, balance);
        }
        Some(cet1e)
    }
}

#[cfg(test)]
mod tests {
    use crate::actions::ActionKind;
    use crate::core::default::DefaultReason;
    use crate::core::params::Parameters;
    use crate::engine::tests::{two_banks_with_loan, two_banks_with_loan_and};
    use approx::assert_relative_eq;

    #[test]
    fn test_ladders_see_pulled_funding() {
        let (mut model, lender, borrower, _) = two_banks_with_loan(3.0);
        model.refresh_available_actions(lender);
        let actions = model.actions_of(lender, ActionKind::PullFunding);
        model.perform_proportionally(&actions, Some(2.0));
        model.time += 1;
        for id in [lender, borrower] {
            let inst = &mut model.institutions[id.index()];
            inst.mailbox.open(&model.obligations);
        }
        // due at t=2, paid from t=1 perspective in one tick
        let commitments = model.cash_commitments(borrower);
        assert_eq!(commitments.len(), 6);
        assert_relative_eq!(commitments[0], 2.0);
        let inflows = model.cash_inflows(lender);
        assert_relative_eq!(inflows[1], 2.0);
        assert_eq!(inflows.iter().sum::<f64>(), 2.0);
    }

    #[test]
    fn test_matured_obligation_is_paid() {
        let (mut model, lender, borrower, loan) = two_banks_with_loan(3.0);
        model.refresh_available_actions(lender);
        let actions = model.actions_of(lender, ActionKind::PullFunding);
        model.perform_proportionally(&actions, Some(2.0));
        model.time = 2;
        model.institutions[borrower.index()].mailbox.open(&model.obligations);
        let cash = model.ledger(borrower).cash();
        model.pay_matured_or_default(borrower).unwrap();
        assert_relative_eq!(model.ledger(borrower).cash(), cash - 2.0);
        let l = model.contract(loan).loan().unwrap();
        assert_relative_eq!(l.principal(), 1.0);
        assert_eq!(l.funding_pulled(), 0.0);
        assert_relative_eq!(model.cash_in_transit(), 2.0);
        assert!(model.institution(borrower).unwrap().mailbox().inbox().is_empty());
        assert!(model.institution(lender).unwrap().mailbox().outbox().is_empty());
        assert!(model.cash_inflows(lender).iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_unpayable_obligation_defaults() {
        let (mut model, lender, borrower, _) = two_banks_with_loan(3.0);
        model.refresh_available_actions(lender);
        let actions = model.actions_of(lender, ActionKind::PullFunding);
        model.perform_proportionally(&actions, None);
        model.time = 2;
        model.institutions[borrower.index()].mailbox.open(&model.obligations);
        let cash = model.ledger(borrower).cash();
        model.subtract_cash(borrower, cash - 1.0);
        let err = model.pay_matured_or_default(borrower).unwrap_err();
        assert_eq!(err.reason, DefaultReason::Liquidity);
        assert_eq!(err.institution, borrower);
    }

    #[test]
    fn test_pecking_order_pulls_before_selling() {
        let params = Parameters {
            predefault_pullfunding_contagion: true,
            ..Parameters::default()
        };
        let (mut model, lender, _, _) = two_banks_with_loan_and(params, 3.0);
        model.refresh_available_actions(lender);
        let raised = model.raise_liquidity_with_pecking_order(lender, 2.0);
        assert_relative_eq!(raised, 2.0);
        assert!(model.market().pending_orders().is_empty());

        model.refresh_available_actions(lender);
        let raised = model.raise_liquidity_with_pecking_order(lender, 2.0);
        assert_relative_eq!(raised, 2.0);
        // one unit pulled, the rest sold
        assert!(!model.market().pending_orders().is_empty());
    }

    #[test]
    fn test_pecking_order_sells_without_pull_funding_channel() {
        let (mut model, lender, _, _) = two_banks_with_loan(3.0);
        model.refresh_available_actions(lender);
        model.raise_liquidity_with_pecking_order(lender, 1.0);
        assert!(model.obligations().is_empty());
        assert!(!model.market().pending_orders().is_empty());
    }
}
