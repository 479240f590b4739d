use crate::core::asset_type::AssetType;
use crate::core::ids::{ContractId, InstitutionId};
use crate::core::params::EPS;
use serde::{Deserialize, Serialize};

/// Below this principal a loan is considered fully repaid and inert.
pub const NEGLIGIBLE_PRINCIPAL: f64 = 0.01;

/// Which side of a balance sheet a contract sits on for a given holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Asset,
    Liability,
}

/// Discriminant of [`ContractTerms`], used to query ledgers by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContractType {
    Loan,
    Deposit,
    Repo,
    Other,
    LongTermUnsecured,
    Tradable,
    Shares,
}

/// Unsecured lending. Also the payload of deposits and repos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    principal: f64,
    funding_pulled: f64,
}

impl Loan {
    /// # Panics
    ///
    /// Panics if `principal` is negative.
    pub fn new(principal: f64) -> Self {
        assert!(
            principal >= 0.0,
            "Loan principal must be non-negative, got {}",
            principal
        );
        Self {
            principal,
            funding_pulled: 0.0,
        }
    }

    pub fn principal(&self) -> f64 {
        self.principal
    }

    /// Amount the lender has already asked back but not yet received.
    pub fn funding_pulled(&self) -> f64 {
        self.funding_pulled
    }

    /// Principal that can still be pulled or repaid.
    pub fn available(&self) -> f64 {
        (self.principal - self.funding_pulled).max(0.0)
    }

    pub fn is_outstanding(&self) -> bool {
        self.principal > 0.0 && self.principal > self.funding_pulled
    }

    pub fn set_principal(&mut self, principal: f64) {
        assert!(
            principal >= 0.0,
            "Loan principal must be non-negative, got {}",
            principal
        );
        self.principal = principal;
    }

    /// Returns true once the loan has become negligible.
    pub fn reduce_principal(&mut self, amount: f64) -> bool {
        assert!(
            self.principal - amount >= -EPS,
            "cannot repay {} of a principal of {}",
            amount,
            self.principal
        );
        self.principal = (self.principal - amount).abs();
        self.principal < NEGLIGIBLE_PRINCIPAL
    }

    pub fn increase_funding_pulled(&mut self, amount: f64) {
        self.funding_pulled += amount;
    }

    pub fn reduce_funding_pulled(&mut self, amount: f64) {
        self.funding_pulled = (self.funding_pulled - amount).max(0.0);
    }

    pub(crate) fn clear(&mut self) {
        self.principal = 0.0;
        self.funding_pulled = 0.0;
    }
}

/// Secured loan: a [`Loan`] backed by pledged tradables and cash.
///
/// Collateral stays on the borrower's balance sheet (encumbered) until a
/// liquidation transfers it to the lender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repo {
    pub loan: Loan,
    /// Pledged holdings of the borrower and the quantity pledged from each.
    collateral: Vec<(ContractId, f64)>,
    pub cash_collateral: f64,
    pub prev_margin_call: f64,
    pub future_margin_call: f64,
    pub future_max_collateral: f64,
}

impl Repo {
    pub fn new(principal: f64) -> Self {
        Self {
            loan: Loan::new(principal),
            collateral: Vec::new(),
            cash_collateral: 0.0,
            prev_margin_call: 0.0,
            future_margin_call: 0.0,
            future_max_collateral: 0.0,
        }
    }

    pub fn collateral(&self) -> &[(ContractId, f64)] {
        &self.collateral
    }

    /// Register a holding as eligible collateral without pledging anything.
    pub fn accept_collateral(&mut self, holding: ContractId) {
        if !self.collateral.iter().any(|(h, _)| *h == holding) {
            self.collateral.push((holding, 0.0));
        }
    }

    pub fn pledged(&self, holding: ContractId) -> f64 {
        self.collateral
            .iter()
            .find(|(h, _)| *h == holding)
            .map(|(_, q)| *q)
            .unwrap_or(0.0)
    }

    pub(crate) fn add_pledge(&mut self, holding: ContractId, quantity: f64) {
        match self.collateral.iter_mut().find(|(h, _)| *h == holding) {
            Some((_, q)) => *q += quantity,
            None => self.collateral.push((holding, quantity)),
        }
    }

    /// Returns the quantity actually released.
    pub(crate) fn remove_pledge(&mut self, holding: ContractId, quantity: f64) -> f64 {
        match self.collateral.iter_mut().find(|(h, _)| *h == holding) {
            Some((_, q)) => {
                let released = quantity.min(*q);
                *q -= released;
                released
            }
            None => 0.0,
        }
    }

    pub(crate) fn take_collateral(&mut self) -> Vec<(ContractId, f64)> {
        std::mem::take(&mut self.collateral)
    }
}

/// Single-sided claim against the rest of the world (or an unmodelled
/// counterparty): the catch-all "other" asset or liability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtherClaim {
    pub principal: f64,
}

/// A holding of a tradable asset series.
///
/// `price` is the holder's mark. It follows the market price down at
/// phase boundaries and is what every valuation uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradableAsset {
    asset_type: AssetType,
    quantity: f64,
    price: f64,
    put_for_sale: f64,
    encumbered: f64,
}

impl TradableAsset {
    /// # Panics
    ///
    /// Panics if `quantity` or `price` is negative.
    pub fn new(asset_type: AssetType, quantity: f64, price: f64) -> Self {
        assert!(
            quantity >= 0.0,
            "Tradable quantity must be non-negative, got {}",
            quantity
        );
        assert!(price >= 0.0, "Price must be non-negative, got {}", price);
        Self {
            asset_type,
            quantity,
            price,
            put_for_sale: 0.0,
            encumbered: 0.0,
        }
    }

    pub fn asset_type(&self) -> AssetType {
        self.asset_type
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn put_for_sale(&self) -> f64 {
        self.put_for_sale
    }

    pub fn encumbered(&self) -> f64 {
        self.encumbered
    }

    pub fn valuation(&self) -> f64 {
        self.quantity * self.price
    }

    pub fn unencumbered_quantity(&self) -> f64 {
        self.quantity - self.encumbered
    }

    /// Quantity neither pledged nor already queued for sale.
    pub fn available_quantity(&self) -> f64 {
        (self.quantity - self.encumbered - self.put_for_sale).max(0.0)
    }

    /// Cash value that can still be sold at the current mark.
    pub fn sellable_value(&self) -> f64 {
        self.available_quantity() * self.price
    }

    pub fn encumber(&mut self, quantity: f64) {
        assert!(
            self.encumbered + quantity <= self.quantity + EPS,
            "cannot encumber {} of {} (already encumbered {})",
            quantity,
            self.quantity,
            self.encumbered
        );
        self.encumbered += quantity;
    }

    pub fn unencumber(&mut self, quantity: f64) {
        assert!(
            self.encumbered - quantity >= -EPS,
            "cannot release {} of {} encumbered",
            quantity,
            self.encumbered
        );
        self.encumbered = (self.encumbered - quantity).max(0.0);
    }

    /// Move the mark to a new price.
    pub(crate) fn set_price(&mut self, price: f64) {
        assert!(price >= 0.0, "Price must be non-negative, got {}", price);
        self.price = price;
    }

    pub(crate) fn devalue(&mut self, amount: f64) {
        if self.quantity <= EPS {
            return;
        }
        let new_price = self.price - amount / self.quantity;
        assert!(
            new_price >= -EPS,
            "cannot devalue holding of value {} by {}",
            self.valuation(),
            amount
        );
        self.price = new_price.max(0.0);
    }

    pub(crate) fn appreciate(&mut self, amount: f64) {
        if self.quantity > EPS {
            self.price += amount / self.quantity;
        }
    }

    pub(crate) fn queue_for_sale(&mut self, quantity: f64) {
        self.put_for_sale += quantity;
    }

    /// Remove a sold quantity from the holding.
    pub(crate) fn settle_sale(&mut self, quantity: f64) {
        self.quantity -= quantity;
        self.put_for_sale = (self.put_for_sale - quantity).max(0.0);
    }

    /// Remove a pledged quantity that changes owner.
    pub(crate) fn release_pledged(&mut self, quantity: f64) {
        assert!(
            self.quantity >= quantity - EPS,
            "cannot transfer {} out of a holding of {}",
            quantity,
            self.quantity
        );
        self.quantity = (self.quantity - quantity).max(0.0);
        self.encumbered = (self.encumbered - quantity).max(0.0);
        self.put_for_sale = self.put_for_sale.min(self.quantity - self.encumbered);
    }
}

/// Fund shares held by an investor and issued by an asset manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shares {
    pub n_shares: f64,
    pub original_n_shares: f64,
    pub pending_redemption: f64,
    /// Value at the last refresh; what the holder's ledger sees.
    pub previous_value: f64,
    pub original_nav: f64,
}

impl Shares {
    pub fn new(n_shares: f64, nav: f64) -> Self {
        assert!(
            n_shares > 0.0,
            "Number of shares must be positive, got {}",
            n_shares
        );
        Self {
            n_shares,
            original_n_shares: n_shares,
            pending_redemption: 0.0,
            previous_value: n_shares * nav,
            original_nav: nav,
        }
    }

    /// Shares that can still be submitted for redemption.
    pub fn redeemable(&self) -> f64 {
        (self.n_shares - self.pending_redemption).max(0.0)
    }
}

/// The closed set of contract kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContractTerms {
    Loan(Loan),
    Deposit(Loan),
    Repo(Repo),
    Other(OtherClaim),
    LongTermUnsecured { amount: f64 },
    Tradable(TradableAsset),
    Shares(Shares),
}

/// A claim between an asset holder and a liability holder.
///
/// At most one of the two parties may be absent; an absent party stands
/// for the external node (depositors, the rest of the world, a market).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    asset_party: Option<InstitutionId>,
    liability_party: Option<InstitutionId>,
    pub terms: ContractTerms,
}

impl Contract {
    /// # Panics
    ///
    /// Panics if both parties are absent.
    pub fn new(
        asset_party: Option<InstitutionId>,
        liability_party: Option<InstitutionId>,
        terms: ContractTerms,
    ) -> Self {
        assert!(
            asset_party.is_some() || liability_party.is_some(),
            "A contract needs at least one party"
        );
        Self {
            asset_party,
            liability_party,
            terms,
        }
    }

    pub fn asset_party(&self) -> Option<InstitutionId> {
        self.asset_party
    }

    pub fn liability_party(&self) -> Option<InstitutionId> {
        self.liability_party
    }

    pub(crate) fn set_asset_party(&mut self, party: Option<InstitutionId>) {
        self.asset_party = party;
    }

    pub fn contract_type(&self) -> ContractType {
        match &self.terms {
            ContractTerms::Loan(_) => ContractType::Loan,
            ContractTerms::Deposit(_) => ContractType::Deposit,
            ContractTerms::Repo(_) => ContractType::Repo,
            ContractTerms::Other(_) => ContractType::Other,
            ContractTerms::LongTermUnsecured { .. } => ContractType::LongTermUnsecured,
            ContractTerms::Tradable(_) => ContractType::Tradable,
            ContractTerms::Shares(_) => ContractType::Shares,
        }
    }

    /// Side on which `me` holds this contract, if any.
    pub fn side_of(&self, me: InstitutionId) -> Option<Side> {
        if self.asset_party == Some(me) {
            Some(Side::Asset)
        } else if self.liability_party == Some(me) {
            Some(Side::Liability)
        } else {
            None
        }
    }

    /// The party across the contract from `me`.
    pub fn counterparty(&self, me: InstitutionId) -> Option<InstitutionId> {
        match self.side_of(me) {
            Some(Side::Asset) => self.liability_party,
            Some(Side::Liability) => self.asset_party,
            None => None,
        }
    }

    /// Valuation, identical from both sides.
    pub fn valuation(&self) -> f64 {
        match &self.terms {
            ContractTerms::Loan(l) | ContractTerms::Deposit(l) => l.principal(),
            ContractTerms::Repo(r) => r.loan.principal(),
            ContractTerms::Other(o) => o.principal,
            ContractTerms::LongTermUnsecured { amount } => *amount,
            ContractTerms::Tradable(t) => t.valuation(),
            ContractTerms::Shares(s) => s.previous_value,
        }
    }

    /// Loan payload of loans, deposits and repos.
    pub fn loan(&self) -> Option<&Loan> {
        match &self.terms {
            ContractTerms::Loan(l) | ContractTerms::Deposit(l) => Some(l),
            ContractTerms::Repo(r) => Some(&r.loan),
            _ => None,
        }
    }

    pub fn loan_mut(&mut self) -> Option<&mut Loan> {
        match &mut self.terms {
            ContractTerms::Loan(l) | ContractTerms::Deposit(l) => Some(l),
            ContractTerms::Repo(r) => Some(&mut r.loan),
            _ => None,
        }
    }

    pub fn repo(&self) -> Option<&Repo> {
        match &self.terms {
            ContractTerms::Repo(r) => Some(r),
            _ => None,
        }
    }

    pub fn repo_mut(&mut self) -> Option<&mut Repo> {
        match &mut self.terms {
            ContractTerms::Repo(r) => Some(r),
            _ => None,
        }
    }

    pub fn tradable(&self) -> Option<&TradableAsset> {
        match &self.terms {
            ContractTerms::Tradable(t) => Some(t),
            _ => None,
        }
    }

    pub fn tradable_mut(&mut self) -> Option<&mut TradableAsset> {
        match &mut self.terms {
            ContractTerms::Tradable(t) => Some(t),
            _ => None,
        }
    }

    pub fn shares(&self) -> Option<&Shares> {
        match &self.terms {
            ContractTerms::Shares(s) => Some(s),
            _ => None,
        }
    }

    pub fn shares_mut(&mut self) -> Option<&mut Shares> {
        match &mut self.terms {
            ContractTerms::Shares(s) => Some(s),
            _ => None,
        }
    }

    /// Principal of principal-bearing contracts.
    pub fn principal(&self) -> Option<f64> {
        match &self.terms {
            ContractTerms::Other(o) => Some(o.principal),
            _ => self.loan().map(Loan::principal),
        }
    }

    /// Overwrite the principal of a loan-like or `Other` contract.
    ///
    /// # Panics
    ///
    /// Panics on contracts without a principal, or on a negative value.
    pub fn set_principal(&mut self, principal: f64) {
        if let ContractTerms::Other(o) = &mut self.terms {
            assert!(principal >= 0.0, "principal must be non-negative");
            o.principal = principal;
            return;
        }
        match self.loan_mut() {
            Some(loan) => loan.set_principal(principal),
            None => panic!("contract has no principal"),
        }
    }

    /// Repay `amount` of principal. Returns true once the contract has
    /// become negligible.
    ///
    /// # Panics
    ///
    /// Panics on contracts without a principal, or when repaying more than
    /// is outstanding.
    pub fn reduce_principal(&mut self, amount: f64) -> bool {
        if let ContractTerms::Other(o) = &mut self.terms {
            assert!(
                o.principal - amount >= -EPS,
                "cannot repay {} of a principal of {}",
                amount,
                o.principal
            );
            o.principal = (o.principal - amount).abs();
            return o.principal < NEGLIGIBLE_PRINCIPAL;
        }
        match self.loan_mut() {
            Some(loan) => loan.reduce_principal(amount),
            None => panic!("contract has no principal"),
        }
    }

    /// Reduce the recorded value by `amount`. Fails fast below zero.
    pub(crate) fn devalue(&mut self, amount: f64) {
        let value = self.valuation();
        assert!(
            value - amount >= -EPS,
            "cannot devalue a contract worth {} by {}",
            value,
            amount
        );
        match &mut self.terms {
            ContractTerms::Loan(l) | ContractTerms::Deposit(l) => {
                l.principal = (l.principal - amount).max(0.0)
            }
            ContractTerms::Repo(r) => r.loan.principal = (r.loan.principal - amount).max(0.0),
            ContractTerms::Other(o) => o.principal = (o.principal - amount).max(0.0),
            ContractTerms::LongTermUnsecured { amount: a } => *a = (*a - amount).max(0.0),
            ContractTerms::Tradable(t) => t.devalue(amount),
            ContractTerms::Shares(s) => s.previous_value = (s.previous_value - amount).max(0.0),
        }
    }

    pub(crate) fn appreciate(&mut self, amount: f64) {
        match &mut self.terms {
            ContractTerms::Loan(l) | ContractTerms::Deposit(l) => l.principal += amount,
            ContractTerms::Repo(r) => r.loan.principal += amount,
            ContractTerms::Other(o) => o.principal += amount,
            ContractTerms::LongTermUnsecured { amount: a } => *a += amount,
            ContractTerms::Tradable(t) => t.appreciate(amount),
            ContractTerms::Shares(s) => s.previous_value += amount,
        }
    }
}

/// Arena holding every contract of a model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractBook {
    contracts: Vec<Contract>,
}

impl ContractBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, contract: Contract) -> ContractId {
        self.contracts.push(contract);
        ContractId::new(self.contracts.len() - 1)
    }

    pub fn get(&self, id: ContractId) -> &Contract {
        &self.contracts[id.index()]
    }

    pub fn get_mut(&mut self, id: ContractId) -> &mut Contract {
        &mut self.contracts[id.index()]
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ContractId, &Contract)> {
        self.contracts
            .iter()
            .enumerate()
            .map(|(i, c)| (ContractId::new(i), c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank(i: usize) -> InstitutionId {
        InstitutionId::new(i)
    }

    #[test]
    fn test_loan_reduce_principal() {
        let mut loan = Loan::new(10.0);
        assert!(!loan.reduce_principal(4.0));
        assert_eq!(loan.principal(), 6.0);
        assert!(loan.reduce_principal(6.0 - 0.001));
    }

    #[test]
    #[should_panic(expected = "cannot repay")]
    fn test_loan_overpayment_panics() {
        let mut loan = Loan::new(1.0);
        loan.reduce_principal(2.0);
    }

    #[test]
    fn test_funding_pulled_bounds_availability() {
        let mut loan = Loan::new(5.0);
        loan.increase_funding_pulled(3.0);
        assert_eq!(loan.available(), 2.0);
        assert!(loan.is_outstanding());
        loan.increase_funding_pulled(2.0);
        assert!(!loan.is_outstanding());
        loan.reduce_funding_pulled(10.0);
        assert_eq!(loan.funding_pulled(), 0.0);
    }

    #[test]
    fn test_tradable_quantities() {
        let mut t = TradableAsset::new(AssetType::gov_bonds(1), 10.0, 0.5);
        t.encumber(4.0);
        t.queue_for_sale(2.0);
        assert_eq!(t.unencumbered_quantity(), 6.0);
        assert_eq!(t.available_quantity(), 4.0);
        assert_eq!(t.sellable_value(), 2.0);
        assert_eq!(t.valuation(), 5.0);
    }

    #[test]
    #[should_panic(expected = "cannot encumber")]
    fn test_over_encumbrance_panics() {
        let mut t = TradableAsset::new(AssetType::equities(1), 1.0, 1.0);
        t.encumber(1.5);
    }

    #[test]
    fn test_tradable_devalue_moves_mark() {
        let mut t = TradableAsset::new(AssetType::equities(1), 4.0, 1.0);
        t.devalue(1.0);
        assert!((t.price() - 0.75).abs() < 1e-12);
    }

    #[test]
    #[should_panic(expected = "cannot devalue")]
    fn test_devalue_below_zero_panics() {
        let mut c = Contract::new(
            Some(bank(0)),
            None,
            ContractTerms::Other(OtherClaim { principal: 1.0 }),
        );
        c.devalue(2.0);
    }

    #[test]
    fn test_contract_sides() {
        let c = Contract::new(
            Some(bank(0)),
            Some(bank(1)),
            ContractTerms::Loan(Loan::new(3.0)),
        );
        assert_eq!(c.side_of(bank(0)), Some(Side::Asset));
        assert_eq!(c.side_of(bank(1)), Some(Side::Liability));
        assert_eq!(c.side_of(bank(2)), None);
        assert_eq!(c.counterparty(bank(1)), Some(bank(0)));
        assert_eq!(c.contract_type(), ContractType::Loan);
        assert_eq!(c.valuation(), 3.0);
    }

    #[test]
    fn test_repo_pledges() {
        let mut repo = Repo::new(5.0);
        let h = ContractId::new(3);
        repo.accept_collateral(h);
        repo.add_pledge(h, 2.0);
        assert_eq!(repo.pledged(h), 2.0);
        assert_eq!(repo.remove_pledge(h, 5.0), 2.0);
        assert_eq!(repo.pledged(h), 0.0);
        assert_eq!(repo.collateral().len(), 1);
    }

    #[test]
    #[should_panic(expected = "at least one party")]
    fn test_partyless_contract_panics() {
        Contract::new(None, None, ContractTerms::Loan(Loan::new(1.0)));
    }

    #[test]
    fn test_book_assigns_sequential_ids() {
        let mut book = ContractBook::new();
        let a = book.add(Contract::new(
            Some(bank(0)),
            None,
            ContractTerms::Other(OtherClaim { principal: 1.0 }),
        ));
        let b = book.add(Contract::new(
            None,
            Some(bank(0)),
            ContractTerms::Deposit(Loan::new(2.0)),
        ));
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(book.get(b).contract_type(), ContractType::Deposit);
        assert_eq!(book.len(), 2);
    }
}
