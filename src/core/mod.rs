pub mod asset_type;
pub mod contract;
pub mod default;
pub mod ids;
pub mod ledger;
pub mod obligation;
pub mod params;
