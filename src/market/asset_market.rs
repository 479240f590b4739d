use crate::core::asset_type::AssetType;
use crate::core::ids::{ContractId, InstitutionId};
use crate::core::params::Parameters;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Price of an asset type nobody has traded or shocked yet.
pub const PAR_PRICE: f64 = 1.0;

/// A queued sale of part of one holding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub holding: ContractId,
    pub seller: InstitutionId,
    pub asset_type: AssetType,
    pub quantity: f64,
}

/// What a clearing pass decided, for the model to apply to holders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Clearing {
    /// Asset types whose price fell; every holder's mark must follow.
    pub devalued: Vec<AssetType>,
    /// Quantities sold this pass, per asset type.
    pub sold: BTreeMap<AssetType, f64>,
    /// Orders to settle at the midpoint of the old and new price.
    pub orders: Vec<Order>,
}

/// Process-wide prices, haircuts and order book.
///
/// Prices move only in [`AssetMarket::clear`] and through explicit shocks.
/// Orders submitted during a phase are all seen by the same clearing pass,
/// so the price impact of a tick does not depend on the order in which
/// institutions sold.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetMarket {
    prices: BTreeMap<AssetType, f64>,
    old_prices: BTreeMap<AssetType, f64>,
    haircuts: BTreeMap<AssetType, f64>,
    quantities_sold: BTreeMap<AssetType, f64>,
    cumulative_quantities_sold: BTreeMap<AssetType, f64>,
    total_quantities: BTreeMap<AssetType, f64>,
    order_book: Vec<Order>,
}

impl AssetMarket {
    pub fn new(params: &Parameters) -> Self {
        Self {
            haircuts: params.initial_haircuts.clone(),
            ..Self::default()
        }
    }

    pub fn price(&self, asset_type: AssetType) -> f64 {
        self.prices.get(&asset_type).copied().unwrap_or(PAR_PRICE)
    }

    /// Price before the most recent clearing pass.
    pub fn old_price(&self, asset_type: AssetType) -> f64 {
        self.old_prices
            .get(&asset_type)
            .copied()
            .unwrap_or_else(|| self.price(asset_type))
    }

    pub(crate) fn set_price(&mut self, asset_type: AssetType, price: f64) {
        assert!(price >= 0.0, "Price must be non-negative, got {}", price);
        self.prices.insert(asset_type, price);
    }

    pub fn haircut(&self, asset_type: AssetType) -> f64 {
        self.haircuts.get(&asset_type).copied().unwrap_or(0.0)
    }

    pub fn haircuts(&self) -> &BTreeMap<AssetType, f64> {
        &self.haircuts
    }

    /// Asset types with a known price.
    pub fn asset_types(&self) -> impl Iterator<Item = AssetType> + '_ {
        self.prices.keys().copied()
    }

    /// Record newly issued quantity; the denominator of price impact.
    pub fn register_quantity(&mut self, asset_type: AssetType, quantity: f64) {
        *self.total_quantities.entry(asset_type).or_insert(0.0) += quantity;
    }

    pub fn total_quantity(&self, asset_type: AssetType) -> f64 {
        self.total_quantities.get(&asset_type).copied().unwrap_or(0.0)
    }

    pub fn total_quantities(&self) -> &BTreeMap<AssetType, f64> {
        &self.total_quantities
    }

    /// # Panics
    ///
    /// Panics if the order quantity is not positive.
    pub fn put_for_sale(&mut self, order: Order) {
        assert!(
            order.quantity > 0.0,
            "Order quantity must be positive, got {}",
            order.quantity
        );
        debug!(
            "{} puts {} of {} for sale",
            order.seller, order.quantity, order.asset_type
        );
        *self.quantities_sold.entry(order.asset_type).or_insert(0.0) += order.quantity;
        self.order_book.push(order);
    }

    pub fn pending_orders(&self) -> &[Order] {
        &self.order_book
    }

    /// Quantity queued since the last clearing.
    pub fn quantity_sold(&self, asset_type: AssetType) -> f64 {
        self.quantities_sold.get(&asset_type).copied().unwrap_or(0.0)
    }

    pub fn cumulative_quantity_sold(&self, asset_type: AssetType) -> f64 {
        self.cumulative_quantities_sold
            .get(&asset_type)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn cumulative_quantities_sold(&self) -> &BTreeMap<AssetType, f64> {
        &self.cumulative_quantities_sold
    }

    /// Move prices and haircuts for everything sold since the last pass and
    /// hand back the orders to settle.
    ///
    /// With an empty order book this changes nothing but the old-price
    /// snapshot, which then equals the current prices.
    pub fn clear(&mut self, params: &Parameters) -> Clearing {
        self.old_prices = self.prices.clone();
        let sold = std::mem::take(&mut self.quantities_sold);
        // types never repriced before still trade at par until this pass
        for &asset_type in sold.keys() {
            let before = self.price(asset_type);
            self.old_prices.insert(asset_type, before);
        }
        let mut devalued = Vec::new();

        for (&asset_type, &quantity) in &sold {
            if params.predefault_firesale_contagion || params.postdefault_firesale_contagion {
                let before = self.price(asset_type);
                self.compute_price_impact(asset_type, quantity, params);
                if self.price(asset_type) < before {
                    devalued.push(asset_type);
                }
            }
            if params.haircut_contagion {
                self.compute_haircut(asset_type, params);
            }
            *self
                .cumulative_quantities_sold
                .entry(asset_type)
                .or_insert(0.0) += quantity;
        }

        Clearing {
            devalued,
            sold,
            orders: std::mem::take(&mut self.order_book),
        }
    }

    fn compute_price_impact(&mut self, asset_type: AssetType, sold: f64, params: &Parameters) {
        let total = self.total_quantity(asset_type);
        if total <= 0.0 {
            return;
        }
        let coefficient = params.price_impact.coefficient(asset_type);
        let price = params
            .price_impact
            .function
            .apply(self.price(asset_type), sold / total, coefficient);
        debug!("{} reprices to {} after selling {}", asset_type, price, sold);
        self.set_price(asset_type, price);
    }

    fn compute_haircut(&mut self, asset_type: AssetType, params: &Parameters) {
        if let Some(initial) = params.initial_haircut(asset_type) {
            let h = super::price_impact::haircut(
                initial,
                params.haircut_slope,
                self.price(asset_type),
            );
            self.haircuts.insert(asset_type, h);
        }
    }
}
