//! Cash movement between institutions and mark-to-market refreshes.

use super::Model;
use crate::core::ids::{ContractId, InstitutionId, ObligationId};
use crate::core::obligation::{Obligation, ObligationKind};
use crate::core::params::EPS;
use log::debug;

impl Model {
    pub(crate) fn add_cash(&mut self, id: InstitutionId, amount: f64) {
        self.ledger_mut(id).add_cash(amount);
    }

    pub(crate) fn subtract_cash(&mut self, id: InstitutionId, amount: f64) {
        self.ledger_mut(id).subtract_cash(amount);
    }

    /// Cash coming in from outside the system.
    pub(crate) fn receive_external_cash(&mut self, id: InstitutionId, amount: f64) {
        self.add_cash(id, amount);
        self.external_inflows += amount;
    }

    /// Pay a party outside the system. Returns what was paid.
    pub(crate) fn pay_external(&mut self, payer: InstitutionId, amount: f64) -> f64 {
        let paid = self.pay_liability(payer, amount);
        self.external_outflows += paid;
        paid
    }

    pub(crate) fn record_external_outflow(&mut self, amount: f64) {
        self.external_outflows += amount;
    }

    /// Cash that reaches `to` at the start of the next tick. The receiver
    /// books it as an asset right away.
    pub(crate) fn send_cash(&mut self, to: InstitutionId, amount: f64) {
        self.ledger_mut(to).receive_in_transit(amount);
    }

    pub(crate) fn process_postbox(&mut self) {
        for inst in &mut self.institutions {
            inst.ledger.deliver_in_transit();
        }
    }

    /// Pay `amount` out of unencumbered cash. Amounts within rounding of
    /// the whole balance are snapped to it. Returns what was paid.
    ///
    /// # Panics
    ///
    /// Panics if the payer is short by more than rounding error.
    pub(crate) fn pay_liability(&mut self, payer: InstitutionId, amount: f64) -> f64 {
        let ue_cash = self.ledger(payer).ue_cash();
        let amount = if (ue_cash - amount).abs() < 2.0 * EPS {
            ue_cash
        } else {
            amount
        };
        assert!(
            ue_cash - amount >= -2.0 * EPS,
            "{} cannot pay {} out of {} unencumbered cash",
            payer,
            amount,
            ue_cash
        );
        let amount = amount.max(0.0);
        self.subtract_cash(payer, amount);
        amount
    }

    /// Repay up to `amount` of a loan, deposit or other liability. The
    /// lender is credited through the postbox; its claim turns into cash in
    /// transit, so its equity does not move.
    pub(crate) fn pay_loan(&mut self, contract: ContractId, amount: f64) {
        let c = self.contracts.get(contract);
        let amount = amount.min(c.valuation());
        let (lender, borrower) = (c.asset_party(), c.liability_party());
        if amount <= 0.0 {
            return;
        }
        let paid = match (borrower, lender) {
            (Some(b), Some(l)) => {
                let paid = self.pay_liability(b, amount);
                self.send_cash(l, paid);
                paid
            }
            (Some(b), None) => self.pay_external(b, amount),
            (None, Some(l)) => {
                self.receive_external_cash(l, amount);
                amount
            }
            (None, None) => amount,
        };
        if self.contracts.get_mut(contract).reduce_principal(paid) {
            debug!("{} fully repaid", contract);
        }
    }

    /// What settling an obligation costs today. Redemptions are repriced
    /// at the issuer's current NAV.
    pub(crate) fn obligation_amount(&self, obligation: &Obligation) -> f64 {
        match obligation.kind() {
            ObligationKind::PullFunding { .. } => obligation.amount(),
            ObligationKind::RedeemShares { n_shares, .. } => n_shares * self.nav(obligation.payer()),
        }
    }

    /// Drop a settled obligation from both parties' mailboxes.
    pub(crate) fn discard_obligation(&mut self, ob: ObligationId) {
        let o = self.obligations.get(ob);
        let (payer, payee) = (o.payer(), o.payee());
        self.institutions[payer.index()].mailbox.discard(ob);
        self.institutions[payee.index()].mailbox.discard(ob);
    }

    /// Cancel the pending obligations on a liquidated contract.
    pub(crate) fn cancel_obligations(&mut self, contract: ContractId) {
        for ob in self.obligations.cancel_for_contract(contract) {
            self.discard_obligation(ob);
        }
    }

    /// Revalue every share contract issued by `fund` at the current NAV.
    pub(crate) fn refresh_share_valuations(&mut self, fund: InstitutionId) {
        let nav = self.nav(fund);
        let issued = match self.institutions[fund.index()].fund_profile() {
            Some(p) => p.issued_shares.clone(),
            None => return,
        };
        for id in issued {
            if let Some(s) = self.contracts.get_mut(id).shares_mut() {
                s.previous_value = s.n_shares * nav;
            }
        }
    }

    /// Mark the institution's holdings down to any lower market price.
    pub(crate) fn update_asset_prices(&mut self, id: InstitutionId) {
        let holdings = self.ledger(id).assets().to_vec();
        for holding in holdings {
            let market_price = match self.contracts.get(holding).tradable() {
                Some(t) => self.market.price(t.asset_type()),
                None => continue,
            };
            if let Some(t) = self.contracts.get_mut(holding).tradable_mut() {
                if market_price < t.price() {
                    t.set_price(market_price);
                }
            }
        }
    }
}
