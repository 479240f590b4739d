use contagion_engine::actions::proportional::allocate_proportionally;
use contagion_engine::core::ids::{ContractId, InstitutionId};
use contagion_engine::core::params::Parameters;
use contagion_engine::market::asset_market::{AssetMarket, Order};
use contagion_engine::prelude::*;
use contagion_engine::simulation::scenario::build_system;
use contagion_engine::simulation::stress_test::{generate_system, SystemConfig};
use proptest::prelude::*;

/// Capacities between 0 and 100, some of them zero.
fn arb_maxima() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(prop_oneof![Just(0.0), 0.01f64..100.0], 1..20)
}

/// A small synthetic system, shocked and run for a few ticks.
fn arb_run() -> impl Strategy<Value = (usize, u64, f64)> {
    (2usize..16, 0u64..1_000, 0.0f64..0.8)
}

fn shocked_system(banks: usize, seed: u64, shock: f64) -> Simulation {
    shocked_system_with(Parameters::cont_schaanning_2017(), banks, seed, shock)
}

fn shocked_system_with(params: Parameters, banks: usize, seed: u64, shock: f64) -> Simulation {
    let spec = generate_system(&SystemConfig {
        bank_count: banks,
        seed,
        ..Default::default()
    });
    let model = build_system(&spec, params).unwrap();
    let mut sim = Simulation::new(model, seed);
    sim.apply_shock(AssetType::gov_bonds(1), shock).unwrap();
    sim
}

/// Risk-weighted capital regulation, or leverage regulation that pays
/// down liabilities including interbank loans.
fn arb_regulation() -> impl Strategy<Value = Parameters> {
    prop_oneof![
        Just(Parameters::cont_schaanning_2017()),
        Just(Parameters {
            bank_leverage_on: true,
            bank_rwa_on: false,
            ..Parameters::cont_schaanning_2017()
        }),
    ]
}

fn defaulted(outcome: &TickOutcome) -> Vec<InstitutionId> {
    let mut ids: Vec<InstitutionId> = outcome.defaults.iter().map(|d| d.institution).collect();
    ids.sort();
    ids
}

proptest! {
    // ===================================================================
    // Proportional allocation never exceeds a capacity and hands out
    // exactly min(sum of capacities, requested).
    // ===================================================================
    #[test]
    fn allocation_respects_capacities(maxima in arb_maxima(), amount in 0.0f64..2_000.0) {
        let allocation = allocate_proportionally(&maxima, Some(amount));
        let capacity: f64 = maxima.iter().sum();
        let expected = capacity.min(amount);

        prop_assert!((allocation.total - expected).abs() < 1e-9);
        prop_assert_eq!(allocation.shares.len(), maxima.len());
        for (share, max) in allocation.shares.iter().zip(&maxima) {
            prop_assert!(*share >= 0.0);
            prop_assert!(*share <= *max + 1e-12, "share {} over capacity {}", share, max);
        }
        let handed_out: f64 = allocation.shares.iter().sum();
        prop_assert!((handed_out - expected).abs() < 1e-6 * (1.0 + expected));
    }

    // ===================================================================
    // Allocation does not depend on the order of its inputs.
    // ===================================================================
    #[test]
    fn allocation_is_order_independent(maxima in arb_maxima(), amount in 0.0f64..2_000.0) {
        let forward = allocate_proportionally(&maxima, Some(amount));
        let reversed: Vec<f64> = maxima.iter().rev().copied().collect();
        let backward = allocate_proportionally(&reversed, Some(amount));
        for (a, b) in forward.shares.iter().zip(backward.shares.iter().rev()) {
            prop_assert!((a - b).abs() < 1e-9);
        }
    }

    // ===================================================================
    // Over a tick the system's cash, counting cash in transit, changes
    // only by what crossed its boundary: sale proceeds, outside creditors
    // and recoveries. Obligation settlements and interbank repayments
    // move cash between institutions and leave the total alone.
    // ===================================================================
    #[test]
    fn tick_cash_is_conserved(params in arb_regulation(), (banks, seed, shock) in arb_run()) {
        let mut sim = shocked_system_with(params, banks, seed, shock);
        for _ in 0..5 {
            let before = sim.model().total_cash();
            let outcome = sim.step();
            let after = sim.model().total_cash();
            prop_assert!(outcome.external_inflows >= 0.0);
            prop_assert!(outcome.external_outflows >= 0.0);
            let expected = before + outcome.external_inflows - outcome.external_outflows;
            prop_assert!(
                (after - expected).abs() < 1e-6 * (1.0 + before.abs()),
                "tick {}: cash {} but expected {}", outcome.time, after, expected
            );
        }
        let (inflows, outflows) = sim.model().external_cash_flows();
        prop_assert!(inflows >= 0.0 && outflows >= 0.0);
    }

    // ===================================================================
    // The same model advanced with institutions in forward and in reverse
    // order ends the tick with the same equities, defaults and sales.
    // ===================================================================
    #[test]
    fn tick_is_order_independent(
        params in arb_regulation(),
        (banks, seed, shock) in arb_run(),
        warmup in 0usize..3,
    ) {
        let mut sim = shocked_system_with(params, banks, seed, shock);
        for _ in 0..warmup {
            sim.step();
        }
        let mut forward = sim.model().clone();
        let mut backward = sim.model().clone();
        let order: Vec<InstitutionId> = forward.ids().collect();
        let reversed: Vec<InstitutionId> = order.iter().rev().copied().collect();

        let a = forward.advance_timestep(&order);
        let b = backward.advance_timestep(&reversed);

        prop_assert_eq!(defaulted(&a), defaulted(&b));
        prop_assert_eq!(a.counts, b.counts);
        prop_assert_eq!(a.quantities_sold.len(), b.quantities_sold.len());
        for (asset, quantity) in &a.quantities_sold {
            let other = b.quantities_sold.get(asset).copied().unwrap_or(f64::NAN);
            prop_assert!((quantity - other).abs() < 1e-9 * (1.0 + quantity.abs()));
        }
        for id in order {
            let (x, y) = (forward.equity(id), backward.equity(id));
            prop_assert!((x - y).abs() < 1e-9 * (1.0 + x.abs()), "{}: {} vs {}", id, x, y);
        }
        let (x, y) = (forward.total_cash(), backward.total_cash());
        prop_assert!((x - y).abs() < 1e-9 * (1.0 + x.abs()));
    }

    // ===================================================================
    // Clearing an empty order book moves no price.
    // ===================================================================
    #[test]
    fn empty_clearing_is_a_no_op(quantity in 1.0f64..1_000.0, sold in 0.01f64..1.0, passes in 1usize..5) {
        let params = Parameters::cont_schaanning_2017();
        let asset = AssetType::gov_bonds(1);
        let mut market = AssetMarket::new(&params);
        market.register_quantity(asset, quantity);
        market.put_for_sale(Order {
            holding: ContractId::new(0),
            seller: InstitutionId::new(0),
            asset_type: asset,
            quantity: quantity * sold,
        });
        market.clear(&params);
        let price = market.price(asset);
        let haircut = market.haircut(asset);
        prop_assert!(price < 1.0);

        for _ in 0..passes {
            let clearing = market.clear(&params);
            prop_assert!(clearing.orders.is_empty());
            prop_assert!(clearing.devalued.is_empty());
            prop_assert_eq!(market.price(asset), price);
            prop_assert_eq!(market.haircut(asset), haircut);
            prop_assert_eq!(market.old_price(asset), price);
        }
    }

    // ===================================================================
    // Defaults are irreversible and bounded by the population.
    // ===================================================================
    #[test]
    fn defaults_are_irreversible((banks, seed, shock) in arb_run()) {
        let mut sim = shocked_system(banks, seed, shock);
        let mut dead: Vec<InstitutionId> = Vec::new();
        let mut total = 0;
        for _ in 0..4 {
            let outcome = sim.step();
            total += outcome.counts.total;
            let model = sim.model();
            for id in &dead {
                prop_assert!(!model.institution(*id).unwrap().is_alive());
            }
            dead = model.ids().filter(|id| !model.institution(*id).unwrap().is_alive()).collect();
            prop_assert_eq!(dead.len(), total);
            prop_assert!(total <= banks);
        }
    }

    // ===================================================================
    // A run is a function of its seed.
    // ===================================================================
    #[test]
    fn runs_are_reproducible((banks, seed, shock) in arb_run()) {
        let a = shocked_system(banks, seed, shock).run(3);
        let b = shocked_system(banks, seed, shock).run(3);
        prop_assert_eq!(a, b);
    }
}
