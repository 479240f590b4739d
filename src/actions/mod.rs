//! Executable operations that contracts expose to their holders.
//!
//! Each eligible contract offers exactly one [`Action`] to each holder per
//! act phase. The actions are collected into [`AvailableActions`] once per
//! phase and executed through the proportional-allocation primitive in
//! [`proportional`].

pub mod proportional;

use crate::core::ids::{ContractId, InstitutionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionKind {
    /// Lender asks a loan or repo back.
    PullFunding,
    /// Borrower repays a loan, deposit or other liability.
    PayLoan,
    /// Holder queues part of a tradable holding for sale.
    SellAsset,
    /// Investor submits fund shares for redemption.
    RedeemShares,
}

/// A single executable operation on one contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    pub contract: ContractId,
    pub actor: InstitutionId,
}

impl Action {
    pub fn new(kind: ActionKind, contract: ContractId, actor: InstitutionId) -> Self {
        Self {
            kind,
            contract,
            actor,
        }
    }
}

/// The actions an institution may take this phase, grouped by kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AvailableActions {
    by_kind: BTreeMap<ActionKind, Vec<Action>>,
}

impl AvailableActions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Action) {
        self.by_kind.entry(action.kind).or_default().push(action);
    }

    pub fn of_kind(&self, kind: ActionKind) -> &[Action] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.by_kind.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_actions_grouping() {
        let me = InstitutionId::new(0);
        let mut actions = AvailableActions::new();
        actions.push(Action::new(ActionKind::SellAsset, ContractId::new(1), me));
        actions.push(Action::new(ActionKind::SellAsset, ContractId::new(2), me));
        actions.push(Action::new(ActionKind::PayLoan, ContractId::new(3), me));
        assert_eq!(actions.of_kind(ActionKind::SellAsset).len(), 2);
        assert_eq!(actions.of_kind(ActionKind::PayLoan).len(), 1);
        assert!(actions.of_kind(ActionKind::PullFunding).is_empty());
        assert_eq!(actions.len(), 3);
        actions.clear();
        assert!(actions.is_empty());
    }
}
