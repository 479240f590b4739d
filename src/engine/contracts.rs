//! Which actions each contract offers its holders.

use super::Model;
use crate::actions::{Action, ActionKind, AvailableActions};
use crate::core::contract::{ContractTerms, Side};
use crate::core::ids::{ContractId, InstitutionId};

impl Model {
    fn counterparty_alive(&self, contract: ContractId, me: InstitutionId) -> bool {
        self.contracts
            .get(contract)
            .counterparty(me)
            .map_or(true, |other| self.is_alive(other))
    }

    /// The action `contract` offers `me`, if it is eligible.
    pub(crate) fn eligible_action(&self, me: InstitutionId, contract: ContractId) -> Option<ActionKind> {
        let c = self.contracts.get(contract);
        let side = c.side_of(me)?;
        if !self.counterparty_alive(contract, me) {
            return None;
        }
        match (&c.terms, side) {
            (ContractTerms::Loan(l) | ContractTerms::Deposit(l), Side::Asset) if l.is_outstanding() => {
                Some(ActionKind::PullFunding)
            }
            (ContractTerms::Loan(l) | ContractTerms::Deposit(l), Side::Liability) if l.is_outstanding() => {
                Some(ActionKind::PayLoan)
            }
            (ContractTerms::Repo(r), Side::Asset) if r.loan.is_outstanding() => Some(ActionKind::PullFunding),
            (ContractTerms::Repo(r), Side::Liability) if r.loan.is_outstanding() => Some(ActionKind::PayLoan),
            (ContractTerms::Other(o), Side::Liability) if c.asset_party().is_none() && o.principal > 0.0 => {
                Some(ActionKind::PayLoan)
            }
            (ContractTerms::Tradable(t), Side::Asset)
                if !t.asset_type().is_external() && t.unencumbered_quantity() > t.put_for_sale() =>
            {
                Some(ActionKind::SellAsset)
            }
            (ContractTerms::Shares(s), Side::Asset) if s.n_shares > 0.0 => Some(ActionKind::RedeemShares),
            _ => None,
        }
    }

    /// Most an action can do right now, in cash (or shares for redemptions).
    pub(crate) fn action_max(&self, action: &Action) -> f64 {
        let c = self.contracts.get(action.contract);
        match action.kind {
            ActionKind::PullFunding => c.loan().map_or(0.0, |l| l.available()),
            ActionKind::PayLoan => match &c.terms {
                ContractTerms::Other(o) => o.principal,
                _ => c.loan().map_or(0.0, |l| l.available()),
            },
            ActionKind::SellAsset => c
                .tradable()
                .map_or(0.0, |t| t.sellable_value()),
            ActionKind::RedeemShares => c.shares().map_or(0.0, |s| s.redeemable()),
        }
    }

    /// Rebuild the available-actions map of `id`: assets first, then
    /// liabilities, each in ledger order.
    pub(crate) fn refresh_available_actions(&mut self, id: InstitutionId) {
        let ledger = self.ledger(id);
        let mut actions = AvailableActions::new();
        for &contract in ledger.assets().iter().chain(ledger.liabilities()) {
            if let Some(kind) = self.eligible_action(id, contract) {
                actions.push(Action::new(kind, contract, id));
            }
        }
        self.institutions[id.index()].available_actions = actions;
    }

    pub(crate) fn actions_of(&self, id: InstitutionId, kind: ActionKind) -> Vec<Action> {
        self.institutions[id.index()]
            .available_actions
            .of_kind(kind)
            .to_vec()
    }
}
