//! Executing actions, one at a time or split proportionally.

use super::Model;
use crate::actions::proportional::allocate_proportionally;
use crate::actions::{Action, ActionKind};
use crate::core::contract::{Contract, ContractTerms, Loan, Repo};
use crate::core::ids::{ContractId, InstitutionId};
use crate::core::obligation::{Obligation, ObligationKind};
use crate::core::params::EPS;
use crate::market::Order;
use log::debug;

impl Model {
    /// Execute `amount` of a single action.
    pub(crate) fn perform(&mut self, action: &Action, amount: f64) {
        match action.kind {
            ActionKind::PullFunding => self.perform_pull_funding(action.contract, amount),
            ActionKind::PayLoan => self.perform_pay_loan(action.contract, amount),
            ActionKind::SellAsset => self.perform_sell_asset(action.contract, amount),
            ActionKind::RedeemShares => self.perform_redeem_shares(action.contract, amount),
        }
    }

    /// Split `amount` (or everything available) across `actions` in
    /// proportion to their current maxima. Returns the total performed.
    pub(crate) fn perform_proportionally(&mut self, actions: &[Action], amount: Option<f64>) -> f64 {
        let maxima: Vec<f64> = actions.iter().map(|a| self.action_max(a)).collect();
        let allocation = allocate_proportionally(&maxima, amount);
        for (action, &share) in actions.iter().zip(&allocation.shares) {
            if share > 0.0 {
                self.perform(action, share);
            }
        }
        allocation.total
    }

    pub(crate) fn sell_assets_proportionally(&mut self, id: InstitutionId, amount: Option<f64>) -> f64 {
        let actions = self.actions_of(id, ActionKind::SellAsset);
        self.perform_proportionally(&actions, amount)
    }

    pub(crate) fn pay_off_liabilities(&mut self, id: InstitutionId, amount: f64) -> f64 {
        debug!("{} pays off liabilities proportionally: {}", id, amount);
        let actions = self.actions_of(id, ActionKind::PayLoan);
        self.perform_proportionally(&actions, Some(amount))
    }

    /// Record the obligation in both mailboxes. The payer sees it from the
    /// next tick on.
    pub(crate) fn send_obligation(&mut self, obligation: Obligation) {
        let (payer, payee) = (obligation.payer(), obligation.payee());
        let id = self.obligations.add(obligation);
        self.institutions[payee.index()].mailbox.record_sent(id);
        self.institutions[payer.index()].mailbox.receive(id);
    }

    fn perform_pull_funding(&mut self, contract: ContractId, amount: f64) {
        let c = self.contracts.get(contract);
        let (lender, borrower) = (c.asset_party(), c.liability_party());
        let Some(borrower) = borrower else {
            self.pay_loan(contract, amount);
            return;
        };

        if !self.params.funding_contagion_interbank {
            if let Some(l) = lender {
                self.receive_external_cash(l, amount);
            }
            // the borrower refinances the pulled amount from outside
            let terms = match &self.contracts.get(contract).terms {
                ContractTerms::Repo(_) => ContractTerms::Repo(Repo::new(amount)),
                ContractTerms::Deposit(_) => ContractTerms::Deposit(Loan::new(amount)),
                _ => ContractTerms::Loan(Loan::new(amount)),
            };
            let refinanced = self.contracts.add(Contract::new(None, Some(borrower), terms));
            self.ledger_mut(borrower).add_liability(refinanced);
            self.contracts.get_mut(contract).reduce_principal(amount);
            return;
        }

        let Some(lender) = lender else {
            return;
        };
        if let Some(loan) = self.contracts.get_mut(contract).loan_mut() {
            loan.increase_funding_pulled(amount);
        }
        let obligation = Obligation::new(
            ObligationKind::PullFunding { loan: contract },
            borrower,
            lender,
            amount,
            self.time,
            self.params.timesteps_to_pay,
        );
        self.send_obligation(obligation);
    }

    fn perform_pay_loan(&mut self, contract: ContractId, amount: f64) {
        if self.params.funding_contagion_interbank {
            self.pay_loan(contract, amount);
            return;
        }
        let c = self.contracts.get(contract);
        let (lender, borrower) = (c.asset_party(), c.liability_party());
        match (lender, borrower) {
            (Some(l), Some(b)) => {
                self.subtract_cash(b, amount);
                self.add_cash(l, amount);
            }
            (Some(l), None) => self.receive_external_cash(l, amount),
            (None, Some(b)) => {
                self.subtract_cash(b, amount);
                self.record_external_outflow(amount);
            }
            (None, None) => {}
        }
        self.contracts.get_mut(contract).reduce_principal(amount);
    }

    fn perform_sell_asset(&mut self, contract: ContractId, amount: f64) {
        let c = self.contracts.get(contract);
        let Some(seller) = c.asset_party() else {
            return;
        };
        let Some(t) = c.tradable() else {
            return;
        };
        let (asset_type, price, available) = (t.asset_type(), t.price(), t.available_quantity());
        if price <= EPS {
            return;
        }
        let mut quantity = amount / price;
        if quantity.abs() <= EPS {
            return;
        }
        if (quantity - available).abs() < 2.0 * EPS {
            quantity = available;
        }
        assert!(
            quantity <= available + EPS,
            "cannot sell {} of {} with only {} available",
            quantity,
            contract,
            available
        );
        assert!(quantity > 0.0, "sale quantity must be positive, got {}", quantity);
        if let Some(t) = self.contracts.get_mut(contract).tradable_mut() {
            t.queue_for_sale(quantity);
        }
        self.market.put_for_sale(Order {
            holding: contract,
            seller,
            asset_type,
            quantity,
        });
    }

    fn perform_redeem_shares(&mut self, contract: ContractId, n_shares: f64) {
        let c = self.contracts.get(contract);
        let (Some(holder), Some(fund)) = (c.asset_party(), c.liability_party()) else {
            return;
        };
        let nav = self.nav(fund);
        if nav <= 0.0 {
            return;
        }
        if let Some(s) = self.contracts.get_mut(contract).shares_mut() {
            s.pending_redemption += n_shares;
        }
        let obligation = Obligation::new(
            ObligationKind::RedeemShares {
                shares: contract,
                n_shares,
            },
            fund,
            holder,
            n_shares * nav,
            self.time,
            self.params.timesteps_to_redeem_shares,
        );
        self.send_obligation(obligation);
    }
}
