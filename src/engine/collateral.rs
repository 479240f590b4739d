//! Repo collateral: pledging, margin calls, repo creation and liquidation.

use super::Model;
use crate::agents::InstitutionKind;
use crate::core::asset_type::AssetClass;
use crate::core::contract::{Contract, ContractTerms, ContractType, Repo, TradableAsset};
use crate::core::default::{EngineError, FailedMarginCall};
use crate::core::ids::{ContractId, InstitutionId};
use crate::core::params::EPS;
use crate::market::Order;
use log::debug;

/// Order in which asset classes back new repos.
const PLEDGE_ORDER: [AssetClass; 4] = [
    AssetClass::CorporateBonds,
    AssetClass::Equities,
    AssetClass::OtherTradable,
    AssetClass::GovBonds,
];

impl Model {
    fn repo(&self, repo: ContractId) -> &Repo {
        match self.contracts.get(repo).repo() {
            Some(r) => r,
            None => panic!("{} is not a repo", repo),
        }
    }

    fn repo_mut(&mut self, repo: ContractId) -> &mut Repo {
        match self.contracts.get_mut(repo).repo_mut() {
            Some(r) => r,
            None => panic!("{} is not a repo", repo),
        }
    }

    /// Holding value after haircut, per unit.
    fn haircutted_price(&self, holding: ContractId) -> f64 {
        self.contracts.get(holding).tradable().map_or(0.0, |t| {
            t.price() * (1.0 - self.market.haircut(t.asset_type()))
        })
    }

    /// Pledged collateral after haircuts, plus pledged cash.
    pub fn haircutted_collateral_value(&self, repo: ContractId) -> f64 {
        let r = self.repo(repo);
        r.collateral()
            .iter()
            .map(|&(h, q)| q * self.haircutted_price(h))
            .sum::<f64>()
            + r.cash_collateral
    }

    /// Haircutted value of everything that could still be pledged.
    pub fn max_ue_haircutted_collateral(&self, repo: ContractId) -> f64 {
        self.repo(repo)
            .collateral()
            .iter()
            .map(|&(h, _)| self.pledgeable_quantity(h) * self.haircutted_price(h))
            .sum()
    }

    fn pledgeable_quantity(&self, holding: ContractId) -> f64 {
        self.contracts
            .get(holding)
            .tradable()
            .map_or(0.0, TradableAsset::available_quantity)
    }

    /// Positive when the borrower owes more collateral.
    pub fn margin_call_size(&self, repo: ContractId) -> f64 {
        self.repo(repo).loan.principal() - self.haircutted_collateral_value(repo)
    }

    fn repo_borrower(&self, repo: ContractId) -> InstitutionId {
        match self.contracts.get(repo).liability_party() {
            Some(b) => b,
            None => panic!("{} has no borrower", repo),
        }
    }

    fn pledge_collateral(&mut self, repo: ContractId, holding: ContractId, quantity: f64) {
        if let Some(t) = self.contracts.get_mut(holding).tradable_mut() {
            t.encumber(quantity);
        }
        self.repo_mut(repo).add_pledge(holding, quantity);
    }

    fn unpledge_collateral(&mut self, repo: ContractId, holding: ContractId, quantity: f64) {
        let released = self.repo_mut(repo).remove_pledge(holding, quantity);
        if let Some(t) = self.contracts.get_mut(holding).tradable_mut() {
            t.unencumber(released);
        }
    }

    pub(crate) fn pledge_cash(&mut self, repo: ContractId, amount: f64) -> f64 {
        let borrower = self.repo_borrower(repo);
        let pledged = self.ledger_mut(borrower).encumber_cash(amount);
        self.repo_mut(repo).cash_collateral += pledged;
        pledged
    }

    pub(crate) fn unpledge_cash(&mut self, repo: ContractId, amount: f64) -> f64 {
        let borrower = self.repo_borrower(repo);
        let r = self.repo_mut(repo);
        let released = amount.min(r.cash_collateral).max(0.0);
        r.cash_collateral -= released;
        self.ledger_mut(borrower).unencumber_cash(released);
        released
    }

    /// Pledge `total` of haircutted value: tradable collateral first, in
    /// proportion to what each holding can still pledge, then cash.
    pub(crate) fn pledge_proportionally(&mut self, repo: ContractId, total: f64) {
        let max_value = self.max_ue_haircutted_collateral(repo);
        assert!(max_value >= -EPS, "negative collateral headroom {}", max_value);
        let mut pledged = 0.0;
        if max_value > 0.0 {
            let factor = total.min(max_value) / max_value;
            let holdings: Vec<ContractId> = self.repo(repo).collateral().iter().map(|&(h, _)| h).collect();
            for holding in holdings {
                let quantity = self.pledgeable_quantity(holding) * factor;
                if quantity > 0.0 {
                    self.pledge_collateral(repo, holding, quantity);
                    pledged += quantity * self.haircutted_price(holding);
                }
            }
        }
        let remainder = total - pledged;
        if remainder > EPS {
            self.pledge_cash(repo, remainder);
        }
    }

    /// Return `excess` of haircutted value: cash first, then collateral in
    /// proportion to what is pledged.
    pub(crate) fn unpledge_proportionally(&mut self, repo: ContractId, excess: f64) {
        let cash_released = self.unpledge_cash(repo, excess);
        let remainder = excess - cash_released;
        if remainder <= EPS {
            return;
        }
        let value = self.haircutted_collateral_value(repo);
        if value <= 0.0 {
            return;
        }
        let factor = (remainder / value).min(1.0);
        let pledges = self.repo(repo).collateral().to_vec();
        for (holding, quantity) in pledges {
            if quantity > 0.0 {
                self.unpledge_collateral(repo, holding, quantity * factor);
            }
        }
    }

    /// Post last tick's margin call and hand back any excess collateral.
    /// Banks as borrowers are exempt.
    pub(crate) fn fulfil_margin_call(&mut self, repo: ContractId) -> Result<(), FailedMarginCall> {
        if !self.params.margin_call_on {
            return Ok(());
        }
        let Some(borrower) = self.contracts.get(repo).liability_party() else {
            return Ok(());
        };
        if self.institutions[borrower.index()].is_bank() {
            return Ok(());
        }

        let max_collateral = self.max_ue_haircutted_collateral(repo) + self.ledger(borrower).ue_cash();
        let prev = self.repo(repo).prev_margin_call;
        if prev > 0.0 {
            if prev > max_collateral {
                self.repo_mut(repo).prev_margin_call = max_collateral;
                self.pledge_proportionally(repo, max_collateral);
                debug!("margin call of {} on {} failed", prev, repo);
                return Err(FailedMarginCall { repo });
            }
            self.pledge_proportionally(repo, prev);
        }

        let call = self.margin_call_size(repo);
        if call < 0.0 {
            self.unpledge_proportionally(repo, -call);
        }

        let call = self.margin_call_size(repo);
        let headroom = self.max_ue_haircutted_collateral(repo) + self.ledger(borrower).ue_cash();
        let r = self.repo_mut(repo);
        r.future_margin_call = call;
        r.future_max_collateral = headroom;
        r.prev_margin_call = call;
        Ok(())
    }

    pub(crate) fn fulfil_margin_calls(&mut self, id: InstitutionId) -> Result<(), FailedMarginCall> {
        for repo in self.ledger(id).liabilities_of_type(&self.contracts, ContractType::Repo) {
            self.fulfil_margin_call(repo)?;
        }
        Ok(())
    }

    /// Sell ahead of a margin call the collateral headroom cannot cover.
    pub(crate) fn prepare_future_margin_calls(&mut self, id: InstitutionId) {
        for repo in self.ledger(id).liabilities_of_type(&self.contracts, ContractType::Repo) {
            let r = self.repo(repo);
            let (call, headroom) = (r.future_margin_call, r.future_max_collateral);
            if call > 0.0 && call > headroom {
                self.sell_assets_proportionally(id, Some(call - headroom));
            }
        }
    }

    /// Borrow `principal` from `lender` through repos collateralised with
    /// the hedge fund's own holdings, one repo per asset class in the order
    /// corporate bonds, equities, other tradables, government bonds. Any
    /// shortfall is covered with cash on the other-tradables repo.
    ///
    /// Only contracts are booked; no cash changes hands.
    pub fn create_repos(
        &mut self,
        hedgefund: InstitutionId,
        lender: Option<InstitutionId>,
        principal: f64,
    ) -> Result<(), EngineError> {
        self.check(hedgefund)?;
        if let Some(l) = lender {
            self.check(l)?;
        }
        if !matches!(self.institutions[hedgefund.index()].kind, InstitutionKind::Hedgefund(_)) {
            return Err(EngineError::NotAHedgefund(hedgefund));
        }

        let mut remainder = principal;
        let mut cash_repo = None;
        for class in PLEDGE_ORDER {
            let repo = self.contracts.add(Contract::new(
                lender,
                Some(hedgefund),
                ContractTerms::Repo(Repo::new(remainder)),
            ));
            self.ledger_mut(hedgefund).add_liability(repo);
            if let Some(l) = lender {
                self.ledger_mut(l).add_asset(repo);
            }
            let holdings: Vec<ContractId> = self
                .ledger(hedgefund)
                .assets()
                .iter()
                .copied()
                .filter(|h| {
                    self.contracts
                        .get(*h)
                        .tradable()
                        .is_some_and(|t| t.asset_type().class() == class)
                })
                .collect();
            for h in holdings {
                self.repo_mut(repo).accept_collateral(h);
            }

            let pledge = self.max_ue_haircutted_collateral(repo).min(remainder);
            self.pledge_proportionally(repo, pledge);
            if pledge >= remainder {
                return Ok(());
            }
            self.contracts.get_mut(repo).set_principal(pledge);
            remainder -= pledge;
            if class == AssetClass::OtherTradable {
                cash_repo = Some(repo);
            }
        }

        let Some(repo) = cash_repo else {
            return Ok(());
        };
        let pledged = self.pledge_cash(repo, remainder);
        let r = self.repo_mut(repo);
        let grown = r.loan.principal() + pledged;
        r.loan.set_principal(grown);
        if pledged < remainder {
            return Err(FailedMarginCall { repo }.into());
        }
        Ok(())
    }

    /// Hand the pledged collateral and cash to the lender and close the
    /// repo. Without a lender the collateral leaves the system.
    pub(crate) fn liquidate_repo(&mut self, repo: ContractId) {
        let lender = self.contracts.get(repo).asset_party();
        let borrower = self.contracts.get(repo).liability_party();
        let pledges = self.repo_mut(repo).take_collateral();
        for (holding, quantity) in pledges {
            if quantity <= 0.0 {
                continue;
            }
            let asset_type = match self.contracts.get_mut(holding).tradable_mut() {
                Some(t) => {
                    t.release_pledged(quantity);
                    t.asset_type()
                }
                None => continue,
            };
            let Some(lender) = lender else {
                continue;
            };
            let price = self.market.price(asset_type);
            let seized = self.contracts.add(Contract::new(
                Some(lender),
                None,
                ContractTerms::Tradable(TradableAsset::new(asset_type, quantity, price)),
            ));
            self.ledger_mut(lender).add_asset(seized);
            if self.params.postdefault_firesale_contagion {
                if let Some(t) = self.contracts.get_mut(seized).tradable_mut() {
                    t.queue_for_sale(quantity);
                }
                self.market.put_for_sale(Order {
                    holding: seized,
                    seller: lender,
                    asset_type,
                    quantity,
                });
            }
        }

        let cash = std::mem::take(&mut self.repo_mut(repo).cash_collateral);
        if cash > 0.0 {
            if let Some(b) = borrower {
                let ledger = self.ledger_mut(b);
                ledger.unencumber_cash(cash);
                ledger.subtract_cash(cash);
            }
            match (lender, borrower) {
                (Some(l), Some(_)) => self.add_cash(l, cash),
                (Some(l), None) => self.receive_external_cash(l, cash),
                (None, Some(_)) => self.record_external_outflow(cash),
                (None, None) => {}
            }
        }

        self.repo_mut(repo).loan.clear();
        self.cancel_obligations(repo);
        debug!("{} liquidated", repo);
    }
}
