use crate::core::contract::{ContractBook, ContractType};
use crate::core::ids::ContractId;
use crate::core::params::EPS;
use serde::{Deserialize, Serialize};

/// Per-institution bookkeeping: cash, and the contracts held on each side.
///
/// Contracts live in the model's [`ContractBook`]; the ledger only records
/// which ones belong to its owner, so every valuation query takes the book.
/// Equity is always `assets - liabilities`, with cash counted as an asset.
///
/// Every cash movement is journaled, so that for any window
/// `cash_after = cash_before + inflows - outflows` holds exactly.
///
/// Interbank repayments arrive a tick late. Until then they sit in
/// transit: an asset of the receiver, but not spendable cash.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledger {
    cash: f64,
    encumbered_cash: f64,
    #[serde(default)]
    in_transit: f64,
    assets: Vec<ContractId>,
    liabilities: Vec<ContractId>,
    initial_equity: f64,
    total_inflows: f64,
    total_outflows: f64,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Cash ---

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn encumbered_cash(&self) -> f64 {
        self.encumbered_cash
    }

    /// Cash not pledged as repo collateral.
    pub fn ue_cash(&self) -> f64 {
        self.cash - self.encumbered_cash
    }

    /// # Panics
    ///
    /// Panics if `amount` is negative.
    pub fn add_cash(&mut self, amount: f64) {
        assert!(amount >= 0.0, "Cash amount must be non-negative, got {}", amount);
        self.cash += amount;
        self.total_inflows += amount;
    }

    /// # Panics
    ///
    /// Panics if `amount` is negative.
    pub fn subtract_cash(&mut self, amount: f64) {
        assert!(amount >= 0.0, "Cash amount must be non-negative, got {}", amount);
        self.cash -= amount;
        self.total_outflows += amount;
    }

    /// Pledge up to `amount` of unencumbered cash; returns what was pledged.
    pub fn encumber_cash(&mut self, amount: f64) -> f64 {
        let amount = amount.min(self.ue_cash()).max(0.0);
        self.encumbered_cash += amount;
        amount
    }

    pub fn unencumber_cash(&mut self, amount: f64) {
        assert!(
            self.encumbered_cash - amount >= -EPS,
            "cannot release {} of {} encumbered cash",
            amount,
            self.encumbered_cash
        );
        self.encumbered_cash = (self.encumbered_cash - amount).max(0.0);
    }

    /// Cash sent to this institution that it cannot spend yet.
    pub fn in_transit(&self) -> f64 {
        self.in_transit
    }

    /// # Panics
    ///
    /// Panics if `amount` is negative.
    pub fn receive_in_transit(&mut self, amount: f64) {
        assert!(amount >= 0.0, "Cash amount must be non-negative, got {}", amount);
        self.in_transit += amount;
    }

    /// Turn everything in transit into cash; returns the amount delivered.
    pub fn deliver_in_transit(&mut self) -> f64 {
        let amount = std::mem::take(&mut self.in_transit);
        if amount > 0.0 {
            self.add_cash(amount);
        }
        amount
    }

    /// Cumulative cash received since creation.
    pub fn total_inflows(&self) -> f64 {
        self.total_inflows
    }

    /// Cumulative cash paid out since creation.
    pub fn total_outflows(&self) -> f64 {
        self.total_outflows
    }

    // --- Contracts ---

    pub fn add_asset(&mut self, id: ContractId) {
        self.assets.push(id);
    }

    pub fn add_liability(&mut self, id: ContractId) {
        self.liabilities.push(id);
    }

    pub fn assets(&self) -> &[ContractId] {
        &self.assets
    }

    pub fn liabilities(&self) -> &[ContractId] {
        &self.liabilities
    }

    pub fn assets_of_type(&self, book: &ContractBook, kind: ContractType) -> Vec<ContractId> {
        of_type(&self.assets, book, kind)
    }

    pub fn liabilities_of_type(&self, book: &ContractBook, kind: ContractType) -> Vec<ContractId> {
        of_type(&self.liabilities, book, kind)
    }

    // --- Valuations ---

    /// Cash, cash in transit and the value of every asset contract.
    pub fn asset_valuation(&self, book: &ContractBook) -> f64 {
        self.cash + self.in_transit + self.assets.iter().map(|id| book.get(*id).valuation()).sum::<f64>()
    }

    pub fn liability_valuation(&self, book: &ContractBook) -> f64 {
        self.liabilities
            .iter()
            .map(|id| book.get(*id).valuation())
            .sum()
    }

    pub fn asset_valuation_of(&self, book: &ContractBook, kind: ContractType) -> f64 {
        valuation_of(&self.assets, book, kind)
    }

    pub fn liability_valuation_of(&self, book: &ContractBook, kind: ContractType) -> f64 {
        valuation_of(&self.liabilities, book, kind)
    }

    pub fn equity_valuation(&self, book: &ContractBook) -> f64 {
        self.asset_valuation(book) - self.liability_valuation(book)
    }

    /// Devalue an asset held in this ledger. Fails fast below zero.
    pub fn devalue_asset(&self, book: &mut ContractBook, id: ContractId, amount: f64) {
        debug_assert!(self.assets.contains(&id), "{} is not an asset here", id);
        book.get_mut(id).devalue(amount);
    }

    pub fn devalue_liability(&self, book: &mut ContractBook, id: ContractId, amount: f64) {
        debug_assert!(self.liabilities.contains(&id), "{} is not a liability here", id);
        book.get_mut(id).devalue(amount);
    }

    pub fn appreciate_asset(&self, book: &mut ContractBook, id: ContractId, amount: f64) {
        debug_assert!(self.assets.contains(&id), "{} is not an asset here", id);
        book.get_mut(id).appreciate(amount);
    }

    pub fn set_initial_values(&mut self, book: &ContractBook) {
        self.initial_equity = self.equity_valuation(book);
    }

    pub fn initial_equity(&self) -> f64 {
        self.initial_equity
    }
}

fn of_type(ids: &[ContractId], book: &ContractBook, kind: ContractType) -> Vec<ContractId> {
    ids.iter()
        .copied()
        .filter(|id| book.get(*id).contract_type() == kind)
        .collect()
}

fn valuation_of(ids: &[ContractId], book: &ContractBook, kind: ContractType) -> f64 {
    ids.iter()
        .map(|id| book.get(*id))
        .filter(|c| c.contract_type() == kind)
        .map(|c| c.valuation())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::asset_type::AssetType;
    use crate::core::contract::{Contract, ContractTerms, Loan, OtherClaim, TradableAsset};
    use crate::core::ids::InstitutionId;

    fn sample() -> (Ledger, ContractBook) {
        let me = Some(InstitutionId::new(0));
        let mut book = ContractBook::new();
        let mut ledger = Ledger::new();
        ledger.add_cash(1.0);
        let bonds = book.add(Contract::new(
            me,
            None,
            ContractTerms::Tradable(TradableAsset::new(AssetType::gov_bonds(1), 2.0, 1.0)),
        ));
        let other = book.add(Contract::new(
            me,
            None,
            ContractTerms::Other(OtherClaim { principal: 2.0 }),
        ));
        let deposit = book.add(Contract::new(
            None,
            me,
            ContractTerms::Deposit(Loan::new(4.0)),
        ));
        ledger.add_asset(bonds);
        ledger.add_asset(other);
        ledger.add_liability(deposit);
        (ledger, book)
    }

    #[test]
    fn test_ledger_valuations() {
        let (ledger, book) = sample();
        assert_eq!(ledger.asset_valuation(&book), 5.0);
        assert_eq!(ledger.liability_valuation(&book), 4.0);
        assert_eq!(ledger.equity_valuation(&book), 1.0);
        assert_eq!(ledger.asset_valuation_of(&book, ContractType::Tradable), 2.0);
        assert_eq!(ledger.liabilities_of_type(&book, ContractType::Deposit).len(), 1);
        assert!(ledger.liabilities_of_type(&book, ContractType::Loan).is_empty());
    }

    #[test]
    fn test_devalue_flows_into_equity() {
        let (ledger, mut book) = sample();
        let bonds = ledger.assets()[0];
        ledger.devalue_asset(&mut book, bonds, 0.5);
        assert_eq!(ledger.equity_valuation(&book), 0.5);
    }

    #[test]
    fn test_cash_journal_conserves() {
        let mut ledger = Ledger::new();
        ledger.add_cash(10.0);
        ledger.subtract_cash(3.0);
        ledger.add_cash(0.5);
        assert_eq!(
            ledger.cash(),
            ledger.total_inflows() - ledger.total_outflows()
        );
    }

    #[test]
    fn test_cash_in_transit_counts_towards_equity_only() {
        let (mut ledger, book) = sample();
        ledger.receive_in_transit(0.5);
        assert_eq!(ledger.cash(), 1.0);
        assert_eq!(ledger.ue_cash(), 1.0);
        assert_eq!(ledger.equity_valuation(&book), 1.5);

        assert_eq!(ledger.deliver_in_transit(), 0.5);
        assert_eq!(ledger.in_transit(), 0.0);
        assert_eq!(ledger.cash(), 1.5);
        assert_eq!(ledger.equity_valuation(&book), 1.5);
        assert_eq!(ledger.cash(), ledger.total_inflows() - ledger.total_outflows());
    }

    #[test]
    fn test_encumber_truncates_to_unencumbered() {
        let mut ledger = Ledger::new();
        ledger.add_cash(2.0);
        assert_eq!(ledger.encumber_cash(5.0), 2.0);
        assert_eq!(ledger.ue_cash(), 0.0);
        ledger.unencumber_cash(1.5);
        assert_eq!(ledger.ue_cash(), 1.5);
    }

    #[test]
    #[should_panic(expected = "cannot release")]
    fn test_over_release_panics() {
        let mut ledger = Ledger::new();
        ledger.add_cash(1.0);
        ledger.encumber_cash(0.5);
        ledger.unencumber_cash(1.0);
    }
}
