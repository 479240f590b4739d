pub mod asset_market;
pub mod price_impact;

pub use asset_market::{AssetMarket, Clearing, Order, PAR_PRICE};
