pub mod institution;

pub use institution::{BankProfile, FundProfile, HedgefundProfile, Institution, InstitutionKind};
