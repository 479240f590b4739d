//! The simulation model: one arena holding every institution, contract and
//! obligation of a run, plus the asset market.
//!
//! Institutions refer to contracts by [`ContractId`] and contracts refer to
//! institutions by [`InstitutionId`], so every cross-institution operation
//! (paying a loan, transferring collateral, settling a sale) is a method on
//! [`Model`] that mutates both sides explicitly.

mod accounting;
mod behaviour;
mod collateral;
mod contracts;
mod liquidity;
mod perform;
mod phases;
mod unwind;

pub use phases::{DefaultCounts, TickOutcome};

use crate::agents::{BankProfile, FundProfile, HedgefundProfile, Institution, InstitutionKind};
use crate::constraints::{
    BankLeverage, Constraint, HedgefundLeverage, LiquidityCoverage, RiskWeightedCapital, SheetView,
};
use crate::core::asset_type::{AssetClass, AssetType};
use crate::core::contract::{
    Contract, ContractBook, ContractTerms, ContractType, Loan, OtherClaim, Shares, TradableAsset,
};
use crate::core::default::EngineError;
use crate::core::ids::{ContractId, InstitutionId};
use crate::core::ledger::Ledger;
use crate::core::obligation::ObligationBook;
use crate::core::params::Parameters;
use crate::market::AssetMarket;
use serde::{Deserialize, Serialize};

/// Opening asset side of an institution. Each series vector holds one
/// quantity per asset series, starting at series 1; zero entries are skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialAssets {
    pub cash: f64,
    pub equities: Vec<f64>,
    pub corporate_bonds: Vec<f64>,
    pub gov_bonds: Vec<f64>,
    pub other_tradables: Vec<f64>,
    pub other: f64,
}

/// Opening liability side of an institution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialLiabilities {
    pub deposits: f64,
    pub long_term: f64,
}

/// Everything a single run mutates.
#[derive(Debug, Clone)]
pub struct Model {
    params: Parameters,
    time: u64,
    institutions: Vec<Institution>,
    contracts: ContractBook,
    obligations: ObligationBook,
    market: AssetMarket,
    /// Cumulative cash received from and paid to parties outside the model.
    external_inflows: f64,
    external_outflows: f64,
}

impl Model {
    pub fn new(params: Parameters) -> Self {
        let market = AssetMarket::new(&params);
        Self {
            params,
            time: 0,
            institutions: Vec::new(),
            contracts: ContractBook::new(),
            obligations: ObligationBook::new(),
            market,
            external_inflows: 0.0,
            external_outflows: 0.0,
        }
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn time(&self) -> u64 {
        self.time
    }

    pub fn market(&self) -> &AssetMarket {
        &self.market
    }

    pub fn contracts(&self) -> &ContractBook {
        &self.contracts
    }

    pub fn contract(&self, id: ContractId) -> &Contract {
        self.contracts.get(id)
    }

    pub fn obligations(&self) -> &ObligationBook {
        &self.obligations
    }

    pub fn institutions(&self) -> &[Institution] {
        &self.institutions
    }

    pub fn institution(&self, id: InstitutionId) -> Option<&Institution> {
        self.institutions.get(id.index())
    }

    pub fn population(&self) -> usize {
        self.institutions.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = InstitutionId> {
        (0..self.institutions.len()).map(InstitutionId::new)
    }

    pub fn find(&self, name: &str) -> Option<InstitutionId> {
        self.institutions
            .iter()
            .find(|i| i.name() == name)
            .map(Institution::id)
    }

    /// Cash sent but not yet delivered, summed over every ledger.
    pub fn cash_in_transit(&self) -> f64 {
        self.institutions.iter().map(|i| i.ledger().in_transit()).sum()
    }

    /// Cumulative cash that entered and left the modelled system, as
    /// `(inflows, outflows)`. Every other movement is a transfer between
    /// institutions.
    pub fn external_cash_flows(&self) -> (f64, f64) {
        (self.external_inflows, self.external_outflows)
    }

    /// Cash and cash in transit summed over every institution.
    pub fn total_cash(&self) -> f64 {
        self.institutions
            .iter()
            .map(|i| i.ledger().cash() + i.ledger().in_transit())
            .sum()
    }

    pub fn defaulted_count(&self) -> usize {
        self.institutions.iter().filter(|i| !i.is_alive()).count()
    }

    // --- Building the system ---

    pub fn add_institution(&mut self, name: impl Into<String>, kind: InstitutionKind) -> InstitutionId {
        let id = InstitutionId::new(self.institutions.len());
        self.institutions.push(Institution::new(id, name, kind));
        id
    }

    pub fn add_bank(&mut self, name: impl Into<String>, profile: BankProfile) -> InstitutionId {
        self.add_institution(name, InstitutionKind::Bank(profile))
    }

    pub fn add_hedgefund(&mut self, name: impl Into<String>) -> InstitutionId {
        self.add_institution(name, InstitutionKind::Hedgefund(HedgefundProfile::default()))
    }

    pub fn add_asset_manager(&mut self, name: impl Into<String>) -> InstitutionId {
        self.add_institution(name, InstitutionKind::AssetManager(FundProfile::default()))
    }

    /// Book the opening balance sheet of `id`.
    pub fn init_institution(
        &mut self,
        id: InstitutionId,
        assets: &InitialAssets,
        liabilities: &InitialLiabilities,
    ) -> Result<(), EngineError> {
        self.check(id)?;
        non_negative(id, "cash", assets.cash)?;
        non_negative(id, "other", assets.other)?;
        non_negative(id, "deposits", liabilities.deposits)?;
        non_negative(id, "long_term", liabilities.long_term)?;

        self.ledger_mut(id).add_cash(assets.cash);
        let series = [
            (AssetClass::Equities, &assets.equities),
            (AssetClass::CorporateBonds, &assets.corporate_bonds),
            (AssetClass::GovBonds, &assets.gov_bonds),
            (AssetClass::OtherTradable, &assets.other_tradables),
        ];
        for (class, quantities) in series {
            for (i, &quantity) in quantities.iter().enumerate() {
                non_negative(id, "tradable quantity", quantity)?;
                if quantity > 0.0 {
                    self.add_tradable(id, AssetType::new(class, i as u16 + 1), quantity)?;
                }
            }
        }
        if assets.other > 0.0 {
            self.add_other_asset(id, assets.other)?;
        }
        if liabilities.deposits > 0.0 {
            self.add_deposit(id, liabilities.deposits)?;
        }
        if liabilities.long_term > 0.0 {
            self.add_long_term(id, liabilities.long_term)?;
        }
        Ok(())
    }

    /// A new holding at the current market price. Registers the quantity as
    /// outstanding with the market.
    pub fn add_tradable(
        &mut self,
        holder: InstitutionId,
        asset_type: AssetType,
        quantity: f64,
    ) -> Result<ContractId, EngineError> {
        self.check(holder)?;
        non_negative(holder, "tradable quantity", quantity)?;
        let price = self.market.price(asset_type);
        let id = self.book_asset(
            holder,
            None,
            ContractTerms::Tradable(TradableAsset::new(asset_type, quantity, price)),
        );
        self.market.register_quantity(asset_type, quantity);
        Ok(id)
    }

    pub fn add_other_asset(&mut self, holder: InstitutionId, amount: f64) -> Result<ContractId, EngineError> {
        self.check(holder)?;
        non_negative(holder, "other asset", amount)?;
        Ok(self.book_asset(holder, None, ContractTerms::Other(OtherClaim { principal: amount })))
    }

    pub fn add_other_liability(&mut self, debtor: InstitutionId, amount: f64) -> Result<ContractId, EngineError> {
        self.check(debtor)?;
        non_negative(debtor, "other liability", amount)?;
        Ok(self.book_liability(None, debtor, ContractTerms::Other(OtherClaim { principal: amount })))
    }

    pub fn add_deposit(&mut self, bank: InstitutionId, amount: f64) -> Result<ContractId, EngineError> {
        self.check(bank)?;
        non_negative(bank, "deposits", amount)?;
        Ok(self.book_liability(None, bank, ContractTerms::Deposit(Loan::new(amount))))
    }

    pub fn add_long_term(&mut self, debtor: InstitutionId, amount: f64) -> Result<ContractId, EngineError> {
        self.check(debtor)?;
        non_negative(debtor, "long_term", amount)?;
        Ok(self.book_liability(None, debtor, ContractTerms::LongTermUnsecured { amount }))
    }

    /// Turn part of the lender's `Other` asset and the borrower's `Other`
    /// liability into a bilateral interbank loan. Both equities are unchanged.
    pub fn add_interbank_loan(
        &mut self,
        lender: InstitutionId,
        borrower: InstitutionId,
        principal: f64,
    ) -> Result<ContractId, EngineError> {
        self.check(lender)?;
        self.check(borrower)?;
        non_negative(lender, "interbank principal", principal)?;

        let lender_ids = self.ledger(lender).assets_of_type(&self.contracts, ContractType::Other);
        let borrower_ids = self
            .ledger(borrower)
            .liabilities_of_type(&self.contracts, ContractType::Other);
        for (who, side, ids) in [(lender, "asset", &lender_ids), (borrower, "liability", &borrower_ids)] {
            let available: f64 = ids.iter().map(|id| self.contracts.get(*id).valuation()).sum();
            if available < principal {
                return Err(EngineError::InsufficientExposure {
                    institution: who,
                    side,
                    available,
                    requested: principal,
                });
            }
        }
        self.draw_down(&lender_ids, principal);
        self.draw_down(&borrower_ids, principal);

        let id = self.contracts.add(Contract::new(
            Some(lender),
            Some(borrower),
            ContractTerms::Loan(Loan::new(principal)),
        ));
        self.ledger_mut(lender).add_asset(id);
        self.ledger_mut(borrower).add_liability(id);
        Ok(id)
    }

    fn draw_down(&mut self, ids: &[ContractId], mut amount: f64) {
        for id in ids {
            if amount <= 0.0 {
                break;
            }
            let contract = self.contracts.get_mut(*id);
            let take = contract.valuation().min(amount);
            contract.devalue(take);
            amount -= take;
        }
    }

    /// Issue `n_shares` of `fund` to `holder`, or to outside investors when
    /// `holder` is `None`. Shares sit only on the holder's ledger.
    pub fn issue_shares(
        &mut self,
        fund: InstitutionId,
        holder: Option<InstitutionId>,
        n_shares: f64,
    ) -> Result<ContractId, EngineError> {
        self.check(fund)?;
        if let Some(h) = holder {
            self.check(h)?;
        }
        if self.institutions[fund.index()].fund_profile().is_none() {
            return Err(EngineError::NotAnAssetManager(fund));
        }
        if !(n_shares.is_finite() && n_shares > 0.0) {
            return Err(EngineError::InvalidBalanceSheet {
                institution: fund,
                field: "n_shares",
                value: n_shares,
            });
        }

        let outstanding = self.shares_outstanding(fund) + n_shares;
        let nav = self.equity(fund) / outstanding;
        let id = self.contracts.add(Contract::new(
            holder,
            Some(fund),
            ContractTerms::Shares(Shares::new(n_shares, nav)),
        ));
        if let Some(h) = holder {
            self.ledger_mut(h).add_asset(id);
        }
        if let Some(profile) = self.institutions[fund.index()].fund_profile_mut() {
            profile.issued_shares.push(id);
        }
        self.refresh_share_valuations(fund);
        Ok(id)
    }

    /// Snapshot the reference values every behaviour measures against:
    /// initial equity, LCR denominators, hedge fund leverage and cash
    /// fractions, fund NAV and share counts.
    pub fn set_initial_values(&mut self) {
        for idx in 0..self.institutions.len() {
            let id = InstitutionId::new(idx);
            let view = self.view(id);
            let assets = view.asset_valuation();
            let fraction = |x: f64| if assets > 0.0 { x / assets } else { 0.0 };
            let kind = match &self.institutions[idx].kind {
                InstitutionKind::Bank(p) => InstitutionKind::Bank(BankProfile {
                    lcr_den_initial: LiquidityCoverage.computed_denominator(&view),
                    ..p.clone()
                }),
                InstitutionKind::Hedgefund(_) => InstitutionKind::Hedgefund(HedgefundProfile {
                    leverage_initial: HedgefundLeverage.ratio(&view),
                    uec_fraction_initial: fraction(view.ue_cash()),
                }),
                InstitutionKind::AssetManager(p) => {
                    let nav = self.nav(id);
                    InstitutionKind::AssetManager(FundProfile {
                        nav_initial: nav,
                        nav_previous: nav,
                        nav_lr_previous: 0.0,
                        n_shares_initial: self.shares_outstanding(id),
                        n_shares_extra_previous: 0.0,
                        cash_fraction_initial: fraction(view.cash()),
                        ..p.clone()
                    })
                }
            };
            let inst = &mut self.institutions[idx];
            inst.kind = kind;
            inst.ledger.set_initial_values(&self.contracts);
        }
    }

    // --- Shocks ---

    /// Cut the market price of `asset_type` by `fraction` and mark every
    /// holding of it to the new price.
    pub fn apply_shock(&mut self, asset_type: AssetType, fraction: f64) -> Result<(), EngineError> {
        unit_fraction(fraction)?;
        let price = self.market.price(asset_type) * (1.0 - fraction);
        self.market.set_price(asset_type, price);
        self.mark_all_to_market(asset_type);
        Ok(())
    }

    /// Cut the marks of one institution's holdings of `asset_type` by
    /// `fraction`. The market price is untouched.
    pub fn receive_shock_to_asset(
        &mut self,
        id: InstitutionId,
        asset_type: AssetType,
        fraction: f64,
    ) -> Result<(), EngineError> {
        self.check(id)?;
        unit_fraction(fraction)?;
        for holding in self.holdings_of(id, asset_type) {
            if let Some(t) = self.contracts.get_mut(holding).tradable_mut() {
                let price = t.price() * (1.0 - fraction);
                t.set_price(price);
            }
        }
        Ok(())
    }

    /// Devalue an `Other` asset held by `id`; an idiosyncratic loss.
    pub fn shock_other_asset(&mut self, id: InstitutionId, fraction: f64) -> Result<(), EngineError> {
        self.check(id)?;
        unit_fraction(fraction)?;
        let ledger = &self.institutions[id.index()].ledger;
        for other in ledger.assets_of_type(&self.contracts, ContractType::Other) {
            let loss = self.contracts.get(other).valuation() * fraction;
            ledger.devalue_asset(&mut self.contracts, other, loss);
        }
        Ok(())
    }

    /// Set the principal of a liability directly, e.g. to model a deposit
    /// run-up in a what-if scenario.
    pub fn set_principal(&mut self, contract: ContractId, principal: f64) {
        self.contracts.get_mut(contract).set_principal(principal);
    }

    // --- Queries ---

    pub fn view(&self, id: InstitutionId) -> SheetView<'_> {
        SheetView::new(
            &self.institutions[id.index()],
            &self.contracts,
            &self.market,
            &self.params,
        )
    }

    pub fn equity(&self, id: InstitutionId) -> f64 {
        self.ledger(id).equity_valuation(&self.contracts)
    }

    pub fn asset_valuation(&self, id: InstitutionId) -> f64 {
        self.ledger(id).asset_valuation(&self.contracts)
    }

    pub fn liability_valuation(&self, id: InstitutionId) -> f64 {
        self.ledger(id).liability_valuation(&self.contracts)
    }

    /// Regulatory leverage for banks, book leverage for everyone else.
    pub fn leverage(&self, id: InstitutionId) -> f64 {
        let view = self.view(id);
        match view.inst.kind {
            InstitutionKind::Bank(_) => BankLeverage.ratio(&view),
            _ => HedgefundLeverage.ratio(&view),
        }
    }

    pub fn rwa_ratio(&self, id: InstitutionId) -> f64 {
        RiskWeightedCapital.ratio(&self.view(id))
    }

    pub fn lcr(&self, id: InstitutionId) -> f64 {
        LiquidityCoverage.ratio(&self.view(id))
    }

    /// Net asset value per share of an asset manager; 0 without shares.
    pub fn nav(&self, fund: InstitutionId) -> f64 {
        let outstanding = self.shares_outstanding(fund);
        if outstanding > 0.0 {
            self.equity(fund) / outstanding
        } else {
            0.0
        }
    }

    pub fn shares_outstanding(&self, fund: InstitutionId) -> f64 {
        self.institutions[fund.index()]
            .fund_profile()
            .map_or(0.0, |p| {
                p.issued_shares
                    .iter()
                    .filter_map(|id| self.contracts.get(*id).shares())
                    .map(|s| s.n_shares)
                    .sum()
            })
    }

    pub fn holdings_of(&self, id: InstitutionId, asset_type: AssetType) -> Vec<ContractId> {
        self.ledger(id)
            .assets()
            .iter()
            .copied()
            .filter(|c| {
                self.contracts
                    .get(*c)
                    .tradable()
                    .is_some_and(|t| t.asset_type() == asset_type)
            })
            .collect()
    }

    // --- Internal helpers ---

    fn check(&self, id: InstitutionId) -> Result<(), EngineError> {
        if id.index() < self.institutions.len() {
            Ok(())
        } else {
            Err(EngineError::UnknownInstitution(id))
        }
    }

    pub(crate) fn ledger(&self, id: InstitutionId) -> &Ledger {
        &self.institutions[id.index()].ledger
    }

    pub(crate) fn ledger_mut(&mut self, id: InstitutionId) -> &mut Ledger {
        &mut self.institutions[id.index()].ledger
    }

    pub(crate) fn is_alive(&self, id: InstitutionId) -> bool {
        self.institutions[id.index()].is_alive()
    }

    fn book_asset(
        &mut self,
        holder: InstitutionId,
        debtor: Option<InstitutionId>,
        terms: ContractTerms,
    ) -> ContractId {
        let id = self.contracts.add(Contract::new(Some(holder), debtor, terms));
        self.ledger_mut(holder).add_asset(id);
        if let Some(d) = debtor {
            self.ledger_mut(d).add_liability(id);
        }
        id
    }

    fn book_liability(
        &mut self,
        creditor: Option<InstitutionId>,
        debtor: InstitutionId,
        terms: ContractTerms,
    ) -> ContractId {
        let id = self.contracts.add(Contract::new(creditor, Some(debtor), terms));
        self.ledger_mut(debtor).add_liability(id);
        if let Some(c) = creditor {
            self.ledger_mut(c).add_asset(id);
        }
        id
    }

    /// Move every holder's mark of `asset_type` to the market price.
    fn mark_all_to_market(&mut self, asset_type: AssetType) {
        let price = self.market.price(asset_type);
        for idx in 0..self.contracts.len() {
            if let Some(t) = self.contracts.get_mut(ContractId::new(idx)).tradable_mut() {
                if t.asset_type() == asset_type {
                    t.set_price(price);
                }
            }
        }
    }
}

fn non_negative(institution: InstitutionId, field: &'static str, value: f64) -> Result<(), EngineError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidBalanceSheet {
            institution,
            field,
            value,
        })
    }
}

fn unit_fraction(fraction: f64) -> Result<(), EngineError> {
    if (0.0..=1.0).contains(&fraction) {
        Ok(())
    } else {
        Err(EngineError::InvalidFraction(fraction))
    }
}

#[cfg(test)]
mod tests;
