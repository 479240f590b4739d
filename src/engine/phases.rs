//! One tick of the simulation: step, clear, act.

use super::Model;
use crate::core::asset_type::AssetType;
use crate::core::default::{DefaultEvent, DefaultReason};
use crate::core::ids::{ContractId, InstitutionId};
use crate::core::params::EPS;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Defaults of one tick broken down by cause.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultCounts {
    pub total: usize,
    pub banks: usize,
    pub liquidity: usize,
    pub solvency: usize,
    pub failed_margin_call: usize,
}

impl DefaultCounts {
    fn record(&mut self, event: &DefaultEvent, is_bank: bool) {
        self.total += 1;
        if is_bank {
            self.banks += 1;
        }
        match event.reason {
            DefaultReason::Liquidity => self.liquidity += 1,
            DefaultReason::Solvency => self.solvency += 1,
            DefaultReason::FailedMarginCall => self.failed_margin_call += 1,
        }
    }

    pub fn add(&mut self, other: &DefaultCounts) {
        self.total += other.total;
        self.banks += other.banks;
        self.liquidity += other.liquidity;
        self.solvency += other.solvency;
        self.failed_margin_call += other.failed_margin_call;
    }
}

/// What happened during one call to [`Model::advance_timestep`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickOutcome {
    pub time: u64,
    /// New defaults, in the order they were applied.
    pub defaults: Vec<DefaultEvent>,
    pub counts: DefaultCounts,
    /// Quantities that changed hands when the market cleared.
    pub quantities_sold: BTreeMap<AssetType, f64>,
    /// Cash that entered the system this tick: sale proceeds, repayments
    /// by outside borrowers and recoveries on defaulted loans.
    #[serde(default)]
    pub external_inflows: f64,
    /// Cash paid this tick to creditors and investors outside the system.
    #[serde(default)]
    pub external_outflows: f64,
}

impl Model {
    /// Advance the model by one tick.
    ///
    /// 1. Deliver cash in transit, open mailboxes and unwind last tick's
    ///    defaulters.
    /// 2. Step: every live institution marks its holdings down to the
    ///    market and pays its matured obligations.
    /// 3. Clear the market: reprice what was sold and pay sellers at the
    ///    midpoint of the old and new price.
    /// 4. Act: every live institution runs its behaviour.
    ///
    /// Institutions step and act in `order`. Defaults raised in a phase
    /// take effect once the phase is over, so an institution defaulting in
    /// the step phase still clears and is unwound at the next tick.
    pub fn advance_timestep(&mut self, order: &[InstitutionId]) -> TickOutcome {
        self.time += 1;
        let mut outcome = TickOutcome {
            time: self.time,
            ..TickOutcome::default()
        };
        debug!("tick {} starts", self.time);
        let (inflows, outflows) = self.external_cash_flows();

        self.process_postbox();
        for inst in &mut self.institutions {
            inst.mailbox.open(&self.obligations);
        }
        let pending: Vec<InstitutionId> = self
            .institutions
            .iter()
            .filter(|i| i.pending_unwind)
            .map(|i| i.id())
            .collect();
        for id in pending {
            self.trigger_default(id);
        }

        let mut step_defaults = Vec::new();
        for &id in order {
            if !self.is_alive(id) {
                continue;
            }
            self.update_asset_prices(id);
            if self.institutions[id.index()].fund_profile().is_some() {
                self.refresh_share_valuations(id);
            }
            if let Err(event) = self.pay_matured_or_default(id) {
                step_defaults.push(event);
            }
        }
        self.apply_defaults(step_defaults, &mut outcome);

        outcome.quantities_sold = self.clear_market();

        let mut act_defaults = Vec::new();
        for &id in order {
            if let Err(event) = self.act(id) {
                act_defaults.push(event);
            }
        }
        self.apply_defaults(act_defaults, &mut outcome);
        outcome.external_inflows = self.external_inflows - inflows;
        outcome.external_outflows = self.external_outflows - outflows;

        if outcome.counts.total > 0 {
            info!(
                "tick {}: {} new defaults, {} in total",
                self.time,
                outcome.counts.total,
                self.defaulted_count()
            );
        }
        outcome
    }

    fn apply_defaults(&mut self, events: Vec<DefaultEvent>, outcome: &mut TickOutcome) {
        for event in events {
            let id = event.institution;
            if !self.is_alive(id) {
                continue;
            }
            let equity = self.equity(id);
            let inst = &mut self.institutions[id.index()];
            inst.mark_defaulted(event.reason, event.time, equity);
            info!("{} ({}), equity {:.4}", event, inst.name(), equity);
            outcome.counts.record(&event, inst.is_bank());
            outcome.defaults.push(event);
        }
    }

    /// Run the market's clearing pass and apply it to every holder.
    fn clear_market(&mut self) -> BTreeMap<AssetType, f64> {
        let clearing = self.market.clear(&self.params);

        for &asset_type in &clearing.devalued {
            let price = self.market.price(asset_type);
            for idx in 0..self.contracts.len() {
                let contract = self.contracts.get_mut(ContractId::new(idx));
                if let Some(t) = contract.tradable_mut() {
                    if t.asset_type() == asset_type && t.price() > price {
                        t.set_price(price);
                    }
                }
            }
        }

        for order in &clearing.orders {
            let quantity = match self.contracts.get(order.holding).tradable() {
                Some(t) => t.quantity().min(order.quantity),
                None => 0.0,
            };
            if quantity <= EPS {
                warn!(
                    "{} no longer holds {} to settle its sale of {}",
                    order.seller, order.asset_type, order.holding
                );
                continue;
            }
            if let Some(t) = self.contracts.get_mut(order.holding).tradable_mut() {
                t.settle_sale(quantity);
            }
            let price = 0.5 * (self.market.old_price(order.asset_type) + self.market.price(order.asset_type));
            let proceeds = quantity * price;
            if proceeds >= EPS {
                self.receive_external_cash(order.seller, proceeds);
            }
        }
        clearing.sold
    }
}
