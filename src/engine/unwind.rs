//! Post-default unwind: defaulters sell out, pull what they can and their
//! creditors take the loss.

use super::Model;
use crate::actions::ActionKind;
use crate::agents::InstitutionKind;
use crate::core::contract::{ContractTerms, ContractType};
use crate::core::ids::{ContractId, InstitutionId};
use log::{debug, info};

impl Model {
    /// Unwind an institution that defaulted in the previous tick.
    pub(crate) fn trigger_default(&mut self, id: InstitutionId) {
        self.refresh_available_actions(id);
        match self.institutions[id.index()].kind {
            InstitutionKind::Bank(_) => self.unwind_bank(id),
            InstitutionKind::Hedgefund(_) => {
                self.sell_assets_proportionally(id, None);
                for repo in self.ledger(id).liabilities_of_type(&self.contracts, ContractType::Repo) {
                    self.liquidate_repo(repo);
                }
            }
            InstitutionKind::AssetManager(_) => {
                self.sell_assets_proportionally(id, None);
            }
        }
        self.institutions[id.index()].pending_unwind = false;
        info!("{} unwound", id);
    }

    fn unwind_bank(&mut self, id: InstitutionId) {
        let mut cash_raised = self.ledger(id).cash();
        if self.params.postdefault_firesale_contagion {
            cash_raised += self.sell_assets_proportionally(id, None);
        }
        if self.params.postdefault_pullfunding_contagion {
            let actions = self.actions_of(id, ActionKind::PullFunding);
            cash_raised += self.perform_proportionally(&actions, None);
        }
        if self.params.endogenous_lgd_on {
            let liabilities = self.liability_valuation(id);
            let lgd = if liabilities > 0.0 {
                (1.0 - cash_raised / liabilities).max(0.0)
            } else {
                0.0
            };
            debug!("{} endogenous loss given default {:.4}", id, lgd);
            self.institutions[id.index()].endogenous_lgd = Some(lgd);
        }

        let liabilities: Vec<ContractId> = self
            .ledger(id)
            .liabilities()
            .iter()
            .copied()
            .filter(|c| {
                matches!(
                    self.contracts.get(*c).contract_type(),
                    ContractType::Loan | ContractType::Repo | ContractType::Other
                )
            })
            .collect();
        for c in liabilities {
            match self.contracts.get(c).contract_type() {
                ContractType::Repo => self.liquidate_repo(c),
                _ => self.liquidate_loan(c),
            }
        }
    }

    /// Close a loan or other liability of a defaulted borrower. A lender
    /// recovers the principal net of loss given default.
    pub(crate) fn liquidate_loan(&mut self, contract: ContractId) {
        let c = self.contracts.get(contract);
        let (lender, borrower, notional) = (c.asset_party(), c.liability_party(), c.valuation());
        if let ContractTerms::Other(o) = &mut self.contracts.get_mut(contract).terms {
            o.principal = 0.0;
        }
        let Some(lender) = lender else {
            return;
        };
        let lgd = match borrower {
            Some(b) if self.params.endogenous_lgd_on => self.institutions[b.index()]
                .endogenous_lgd
                .unwrap_or(self.params.interbank_loss_given_default),
            _ => self.params.interbank_loss_given_default,
        };
        self.receive_external_cash(lender, notional * (1.0 - lgd));
        if let Some(l) = self.contracts.get_mut(contract).loan_mut() {
            l.clear();
        }
        self.cancel_obligations(contract);
    }
}

#[cfg(test)]
mod tests {
    use crate::actions::ActionKind;
    use crate::core::default::DefaultReason;
    use crate::core::params::Parameters;
    use crate::engine::tests::two_banks_with_loan_and;
    use approx::assert_relative_eq;

    #[test]
    fn test_lender_recovers_net_of_lgd() {
        let params = Parameters {
            interbank_loss_given_default: 0.4,
            ..Parameters::default()
        };
        let (mut model, lender, borrower, loan) = two_banks_with_loan_and(params, 3.0);
        let cash = model.ledger(lender).cash();
        model.institutions[borrower.index()].mark_defaulted(DefaultReason::Solvency, 1, 0.0);
        model.trigger_default(borrower);
        assert_relative_eq!(model.ledger(lender).cash(), cash + 1.8, epsilon = 1e-12);
        assert_eq!(model.contract(loan).valuation(), 0.0);
        assert!(!model.institution(borrower).unwrap().pending_unwind);
    }

    #[test]
    fn test_liquidation_cancels_pulled_funding() {
        let (mut model, lender, borrower, _) = two_banks_with_loan_and(Parameters::default(), 3.0);
        model.refresh_available_actions(lender);
        let actions = model.actions_of(lender, ActionKind::PullFunding);
        model.perform_proportionally(&actions, Some(1.0));
        assert_eq!(model.institution(lender).unwrap().mailbox().outbox().len(), 1);

        model.institutions[borrower.index()].mark_defaulted(DefaultReason::Solvency, 1, 0.0);
        model.trigger_default(borrower);
        assert_eq!(model.obligations().pending_total(), 0.0);
        assert!(model.institution(lender).unwrap().mailbox().outbox().is_empty());
        assert!(model.institution(borrower).unwrap().mailbox().unopened().is_empty());
    }

    #[test]
    fn test_defaulter_sells_everything() {
        let (mut model, _, borrower, _) = two_banks_with_loan_and(Parameters::default(), 3.0);
        model.institutions[borrower.index()].mark_defaulted(DefaultReason::Solvency, 1, 0.0);
        model.trigger_default(borrower);
        let sold: f64 = model
            .market()
            .pending_orders()
            .iter()
            .filter(|o| o.seller == borrower)
            .map(|o| o.quantity)
            .sum();
        assert!(sold > 0.0);
    }

    #[test]
    fn test_endogenous_lgd() {
        let params = Parameters {
            endogenous_lgd_on: true,
            postdefault_firesale_contagion: false,
            ..Parameters::default()
        };
        let (mut model, lender, borrower, _) = two_banks_with_loan_and(params, 3.0);
        let cash_raised = model.ledger(borrower).cash();
        let liabilities = model.liability_valuation(borrower);
        let lender_cash = model.ledger(lender).cash();
        model.institutions[borrower.index()].mark_defaulted(DefaultReason::Liquidity, 1, 0.0);
        model.trigger_default(borrower);
        let lgd = (1.0 - cash_raised / liabilities).max(0.0);
        assert_relative_eq!(
            model.institution(borrower).unwrap().endogenous_lgd().unwrap(),
            lgd,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            model.ledger(lender).cash(),
            lender_cash + 3.0 * (1.0 - lgd),
            epsilon = 1e-12
        );
    }
}
