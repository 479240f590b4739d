//! Shared fixtures for the engine's unit tests, plus tests of building and
//! shocking a model.

use super::{InitialAssets, InitialLiabilities, Model};
use crate::agents::BankProfile;
use crate::core::asset_type::AssetType;
use crate::core::contract::ContractType;
use crate::core::default::EngineError;
use crate::core::ids::{ContractId, InstitutionId};
use crate::core::params::Parameters;
use approx::assert_relative_eq;

fn interbank_bank(model: &mut Model, name: &str) -> InstitutionId {
    let bank = model.add_bank(name, BankProfile::default());
    model
        .init_institution(
            bank,
            &InitialAssets {
                cash: 4.0,
                equities: vec![2.0],
                corporate_bonds: vec![2.0],
                gov_bonds: vec![2.0],
                other: 6.0,
                ..InitialAssets::default()
            },
            &InitialLiabilities {
                deposits: 10.0,
                long_term: 0.0,
            },
        )
        .unwrap();
    model.add_other_liability(bank, 5.0).unwrap();
    bank
}

/// Two banks, the first lending `principal` to the second.
pub(crate) fn two_banks_with_loan(principal: f64) -> (Model, InstitutionId, InstitutionId, ContractId) {
    two_banks_with_loan_and(Parameters::default(), principal)
}

pub(crate) fn two_banks_with_loan_and(
    params: Parameters,
    principal: f64,
) -> (Model, InstitutionId, InstitutionId, ContractId) {
    let mut model = Model::new(params);
    let lender = interbank_bank(&mut model, "Lender");
    let borrower = interbank_bank(&mut model, "Borrower");
    let loan = model.add_interbank_loan(lender, borrower, principal).unwrap();
    model.set_initial_values();
    (model, lender, borrower, loan)
}

/// Cash 1, two units of each tradable class at par, other assets of 2
/// and a deposit.
pub(crate) fn worked_example_bank(deposit: f64) -> (Model, InstitutionId, ContractId) {
    worked_example_bank_with(Parameters::default(), deposit)
}

pub(crate) fn worked_example_bank_with(params: Parameters, deposit: f64) -> (Model, InstitutionId, ContractId) {
    let mut model = Model::new(params);
    let bank = model.add_bank("Bank", BankProfile::default());
    model
        .init_institution(
            bank,
            &InitialAssets {
                cash: 1.0,
                equities: vec![2.0],
                corporate_bonds: vec![2.0],
                gov_bonds: vec![2.0],
                other_tradables: vec![2.0],
                other: 2.0,
            },
            &InitialLiabilities {
                deposits: deposit,
                long_term: 0.0,
            },
        )
        .unwrap();
    model.set_initial_values();
    let deposit = model.ledger(bank).liabilities_of_type(model.contracts(), ContractType::Deposit)[0];
    (model, bank, deposit)
}

/// A hedge fund holding cash 3, corporate bonds 4 and equities 2, in that
/// order, and a bank to borrow from.
pub(crate) fn hedgefund_with_lender(params: Parameters) -> (Model, InstitutionId, InstitutionId) {
    let mut model = Model::new(params);
    let hf = model.add_hedgefund("HF");
    let bank = model.add_bank("Bank", BankProfile::default());
    model
        .init_institution(
            hf,
            &InitialAssets {
                cash: 3.0,
                ..InitialAssets::default()
            },
            &InitialLiabilities::default(),
        )
        .unwrap();
    model.add_tradable(hf, AssetType::corporate_bonds(1), 4.0).unwrap();
    model.add_tradable(hf, AssetType::equities(1), 2.0).unwrap();
    model
        .init_institution(
            bank,
            &InitialAssets {
                cash: 10.0,
                other: 10.0,
                ..InitialAssets::default()
            },
            &InitialLiabilities {
                deposits: 15.0,
                long_term: 0.0,
            },
        )
        .unwrap();
    model.set_initial_values();
    (model, hf, bank)
}

/// An asset manager with cash 1 and 9 units of equities, owned through 10
/// shares by outside investors.
pub(crate) fn asset_manager() -> (Model, InstitutionId) {
    let mut model = Model::new(Parameters::default());
    let fund = model.add_asset_manager("AM");
    model
        .init_institution(
            fund,
            &InitialAssets {
                cash: 1.0,
                equities: vec![9.0],
                ..InitialAssets::default()
            },
            &InitialLiabilities::default(),
        )
        .unwrap();
    model.issue_shares(fund, None, 10.0).unwrap();
    model.set_initial_values();
    (model, fund)
}

#[test]
fn test_init_books_balance_sheet() {
    let (model, bank, _) = worked_example_bank(10.2);
    assert_relative_eq!(model.asset_valuation(bank), 11.0);
    assert_relative_eq!(model.liability_valuation(bank), 10.2);
    assert_eq!(model.ledger(bank).assets().len(), 5);
    assert_relative_eq!(model.market().total_quantity(AssetType::gov_bonds(1)), 2.0);
    assert_eq!(model.find("Bank"), Some(bank));
    assert_eq!(model.find("Nobody"), None);
}

#[test]
fn test_init_rejects_negative_cash() {
    let mut model = Model::new(Parameters::default());
    let bank = model.add_bank("B", BankProfile::default());
    let err = model
        .init_institution(
            bank,
            &InitialAssets {
                cash: -1.0,
                ..InitialAssets::default()
            },
            &InitialLiabilities::default(),
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidBalanceSheet { field: "cash", .. }));
}

#[test]
fn test_unknown_institution() {
    let mut model = Model::new(Parameters::default());
    let ghost = InstitutionId::new(7);
    assert_eq!(
        model.add_deposit(ghost, 1.0),
        Err(EngineError::UnknownInstitution(ghost))
    );
}

#[test]
fn test_interbank_loan_keeps_equity() {
    let mut model = Model::new(Parameters::default());
    let lender = interbank_bank(&mut model, "L");
    let borrower = interbank_bank(&mut model, "B");
    let (e_lender, e_borrower) = (model.equity(lender), model.equity(borrower));
    model.add_interbank_loan(lender, borrower, 2.5).unwrap();
    assert_relative_eq!(model.equity(lender), e_lender);
    assert_relative_eq!(model.equity(borrower), e_borrower);
    let other = model.ledger(lender).asset_valuation_of(model.contracts(), ContractType::Other);
    assert_relative_eq!(other, 3.5);
}

#[test]
fn test_interbank_loan_needs_exposure() {
    let mut model = Model::new(Parameters::default());
    let lender = interbank_bank(&mut model, "L");
    let borrower = interbank_bank(&mut model, "B");
    let err = model.add_interbank_loan(lender, borrower, 5.5).unwrap_err();
    // the lender holds 6 of other assets, the borrower owes only 5
    assert!(matches!(
        err,
        EngineError::InsufficientExposure { side: "liability", .. }
    ));
}

#[test]
fn test_market_shock_moves_every_holder() {
    let (mut model, lender, borrower, _) = two_banks_with_loan(1.0);
    let (a, b) = (model.equity(lender), model.equity(borrower));
    model.apply_shock(AssetType::equities(1), 0.25).unwrap();
    assert_relative_eq!(model.market().price(AssetType::equities(1)), 0.75);
    assert_relative_eq!(model.equity(lender), a - 0.5);
    assert_relative_eq!(model.equity(borrower), b - 0.5);
}

#[test]
fn test_institution_shock_moves_only_marks() {
    let (mut model, lender, borrower, _) = two_banks_with_loan(1.0);
    let b = model.equity(borrower);
    model
        .receive_shock_to_asset(lender, AssetType::gov_bonds(1), 0.5)
        .unwrap();
    assert_eq!(model.market().price(AssetType::gov_bonds(1)), 1.0);
    assert_relative_eq!(model.equity(borrower), b);
    let holding = model.holdings_of(lender, AssetType::gov_bonds(1))[0];
    assert_relative_eq!(model.contract(holding).valuation(), 1.0);
}

#[test]
fn test_shock_fraction_is_checked() {
    let (mut model, bank, _) = worked_example_bank(10.2);
    assert_eq!(
        model.apply_shock(AssetType::equities(1), 1.5),
        Err(EngineError::InvalidFraction(1.5))
    );
    assert_eq!(
        model.shock_other_asset(bank, -0.1),
        Err(EngineError::InvalidFraction(-0.1))
    );
}

#[test]
fn test_other_asset_shock() {
    let (mut model, lender, _, _) = two_banks_with_loan(1.0);
    let equity = model.equity(lender);
    model.shock_other_asset(lender, 0.2).unwrap();
    // 5 of other assets left after the loan
    assert_relative_eq!(model.equity(lender), equity - 1.0);
}

#[test]
fn test_shares_only_from_asset_managers() {
    let (mut model, bank, _) = worked_example_bank(10.2);
    assert_eq!(
        model.issue_shares(bank, None, 1.0),
        Err(EngineError::NotAnAssetManager(bank))
    );
}

#[test]
fn test_fund_nav() {
    let (model, fund) = asset_manager();
    assert_relative_eq!(model.nav(fund), 1.0);
    assert_relative_eq!(model.shares_outstanding(fund), 10.0);
    let profile = model.institution(fund).unwrap().fund_profile().unwrap();
    assert_relative_eq!(profile.nav_initial, 1.0);
    assert_relative_eq!(profile.cash_fraction_initial, 0.1);
}
