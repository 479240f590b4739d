use approx::assert_relative_eq;
use contagion_engine::core::contract::ContractType;
use contagion_engine::core::params::Parameters;
use contagion_engine::graph::ExposureGraph;
use contagion_engine::prelude::*;
use contagion_engine::simulation::report::SYSTEMIC_EVENT_THRESHOLD;
use contagion_engine::simulation::scenario::{build_system, SystemSpec};
use contagion_engine::simulation::stress_test::{generate_system, SystemConfig};

/// Leverage-only bank regulation with a 5% buffer and target.
fn leverage_only() -> Parameters {
    Parameters {
        predefault_firesale_contagion: true,
        bank_leverage_on: true,
        bank_rwa_on: false,
        bank_lcr_on: false,
        bank_leverage_min: 0.03,
        bank_leverage_buffer: 0.05,
        bank_leverage_target: 0.05,
        ..Parameters::default()
    }
}

/// A bank with cash 1, two units of each tradable class, other assets of 2
/// and deposits of 10.2. Returns the model, the bank and its deposit.
fn worked_example(params: Parameters, profile: BankProfile) -> (Model, InstitutionId, ContractId) {
    let mut model = Model::new(params);
    let bank = model.add_bank("Bank", profile);
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
                deposits: 10.2,
                long_term: 0.0,
            },
        )
        .unwrap();
    model.set_initial_values();
    let deposit = model
        .institution(bank)
        .unwrap()
        .ledger()
        .liabilities_of_type(model.contracts(), ContractType::Deposit)[0];
    (model, bank, deposit)
}

fn shocked_run(banks: usize, shock: f64, steps: u32) -> (RunReport, Model) {
    let spec = generate_system(&SystemConfig {
        bank_count: banks,
        ..Default::default()
    });
    let model = build_system(&spec, Parameters::cont_schaanning_2017()).unwrap();
    let mut sim = Simulation::new(model, 11);
    sim.apply_shock(AssetType::gov_bonds(1), shock).unwrap();
    let report = sim.run(steps);
    (report, sim.into_model())
}

// ---------------------------------------------------------------------------
// Worked example
// ---------------------------------------------------------------------------

#[test]
fn worked_example_initial_ratios() {
    let (model, bank, _) = worked_example(Parameters::default(), BankProfile::default());
    assert_relative_eq!(model.asset_valuation(bank), 11.0, epsilon = 1e-12);
    assert_relative_eq!(model.equity(bank), 0.8, epsilon = 1e-12);
    assert_relative_eq!(model.leverage(bank), 0.0727, epsilon = 1e-4);
    assert_relative_eq!(model.rwa_ratio(bank), 0.1455, epsilon = 1e-4);
}

/// A deposit run-up pushes leverage below the buffer; one tick of
/// deleveraging restores the 5% target by paying down the deposit.
#[test]
fn worked_example_delevers_within_one_tick() {
    let (mut model, bank, deposit) = worked_example(leverage_only(), BankProfile::default());
    model.set_principal(deposit, 10.5);
    assert!(model.leverage(bank) < 0.05);

    let outcome = model.advance_timestep(&[bank]);
    assert!(outcome.defaults.is_empty());
    assert_relative_eq!(model.leverage(bank), 0.05, epsilon = 1e-9);
    assert_relative_eq!(model.contract(deposit).valuation(), 9.5, epsilon = 1e-9);
    assert!(model.institution(bank).unwrap().ledger().cash().abs() < 1e-9);
}

/// Below its risk-weighted buffer the bank queues sales of risky assets
/// until the capital ratio on what it keeps reaches its target.
#[test]
fn worked_example_meets_rwa_target() {
    let params = Parameters {
        predefault_firesale_contagion: true,
        bank_leverage_on: false,
        bank_rwa_on: true,
        rwa_ratio_min: 0.045,
        rwa_ratio_buffer: 0.1,
        ..Parameters::default()
    };
    let profile = BankProfile {
        rwcr_target: Some(0.145),
        ..BankProfile::default()
    };
    let (mut model, bank, deposit) = worked_example(params, profile);
    model.set_principal(deposit, 10.5);

    model.advance_timestep(&[bank]);
    assert_relative_eq!(model.rwa_ratio(bank), 0.145, epsilon = 1e-9);
    assert!(!model.market().pending_orders().is_empty());

    // the queued sales settle at the next clearing
    model.advance_timestep(&[bank]);
    assert!(model.market().cumulative_quantities_sold().values().sum::<f64>() > 0.0);
}

#[test]
fn worked_example_insolvency_is_a_default() {
    let (mut model, bank, deposit) = worked_example(leverage_only(), BankProfile::default());
    model.set_principal(deposit, 10.9);

    let outcome = model.advance_timestep(&[bank]);
    assert_eq!(outcome.counts.total, 1);
    assert_eq!(outcome.counts.solvency, 1);
    assert_eq!(outcome.defaults[0].reason, DefaultReason::Solvency);
    assert!(!model.institution(bank).unwrap().is_alive());
    assert_eq!(model.defaulted_count(), 1);
}

// ---------------------------------------------------------------------------
// Shocks and clearing
// ---------------------------------------------------------------------------

#[test]
fn market_shock_marks_every_holder() {
    let (mut model, bank, _) = worked_example(Parameters::default(), BankProfile::default());
    model.apply_shock(AssetType::gov_bonds(1), 0.1).unwrap();
    assert_relative_eq!(model.market().price(AssetType::gov_bonds(1)), 0.9, epsilon = 1e-12);
    assert_relative_eq!(model.equity(bank), 0.6, epsilon = 1e-12);
}

#[test]
fn shock_fraction_outside_unit_interval_is_rejected() {
    let (mut model, _, _) = worked_example(Parameters::default(), BankProfile::default());
    assert!(model.apply_shock(AssetType::gov_bonds(1), 1.5).is_err());
    assert!(model.apply_shock(AssetType::gov_bonds(1), -0.1).is_err());
}

/// After every tick no holding is marked above its market price.
#[test]
fn holdings_never_marked_above_market() {
    let spec = generate_system(&SystemConfig {
        bank_count: 20,
        ..Default::default()
    });
    let model = build_system(&spec, Parameters::cont_schaanning_2017()).unwrap();
    let mut sim = Simulation::new(model, 3);
    sim.apply_shock(AssetType::gov_bonds(1), 0.3).unwrap();

    for _ in 0..5 {
        sim.step();
        let model = sim.model();
        for idx in 0..model.contracts().len() {
            let contract = model.contract(ContractId::new(idx));
            if let Some(t) = contract.tradable() {
                let price = model.market().price(t.asset_type());
                assert!(t.price() <= price + 1e-12, "{} marked at {} over {}", idx, t.price(), price);
            }
        }
        assert!(model.market().pending_orders().iter().all(|o| o.quantity > 0.0));
    }
}

// ---------------------------------------------------------------------------
// End to end
// ---------------------------------------------------------------------------

/// The 48-bank demonstration: a 40% government bond shock run for six ticks.
#[test]
fn forty_eight_bank_cascade() {
    let (report, model) = shocked_run(48, 0.4, 6);

    assert_eq!(report.population, 48);
    assert_eq!(report.ticks.len(), 6);
    let cumulative: Vec<usize> = report.ticks.iter().map(|t| t.cumulative_defaults).collect();
    assert!(cumulative.windows(2).all(|w| w[0] <= w[1]));
    assert!(report.total_defaults() <= 48);
    assert_eq!(report.total_defaults(), model.defaulted_count());
    assert_eq!(report.defaulted.len(), report.total_defaults());
    assert_eq!(report.counts().banks, report.total_defaults());

    let fraction = report.total_defaults() as f64 / 48.0;
    if fraction < SYSTEMIC_EVENT_THRESHOLD {
        assert_eq!(report.extent_of_systemic_event(), 0.0);
    } else {
        assert_relative_eq!(report.extent_of_systemic_event(), fraction);
    }

    for t in report.total_sold() {
        assert!((0.0..=1.0 + 1e-9).contains(&t));
    }
    for d in &report.defaulted {
        assert!(!model.institution(d.institution).unwrap().is_alive());
    }
}

#[test]
fn scenario_file_builds_the_same_system() {
    let spec = generate_system(&SystemConfig {
        bank_count: 8,
        ..Default::default()
    });
    let json = serde_json::to_string(&spec).unwrap();
    let back = SystemSpec::from_json_str(&json).unwrap();
    assert_eq!(back, spec);

    let a = build_system(&spec, Parameters::default()).unwrap();
    let b = build_system(&back, Parameters::default()).unwrap();
    assert_eq!(a.population(), b.population());
    for id in a.ids() {
        assert_relative_eq!(a.equity(id), b.equity(id));
    }
}

#[test]
fn exposure_graph_matches_scenario() {
    let spec = generate_system(&SystemConfig::default());
    let model = build_system(&spec, Parameters::default()).unwrap();
    let graph = ExposureGraph::from_model(&model);

    let total: f64 = spec.exposures.iter().map(|e| e.principal).sum();
    assert_eq!(graph.institution_count(), 48);
    assert_relative_eq!(graph.total_exposure(), total, epsilon = 1e-6);
    for component in graph.contagion_components() {
        assert!(component.len() > 1);
    }
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

#[test]
fn parameters_json_roundtrip() {
    let params = Parameters::cont_schaanning_2017();
    let json = serde_json::to_string_pretty(&params).unwrap();
    assert!(json.contains("GOV_BONDS1"));
    let back = Parameters::from_json_str(&json).unwrap();
    assert_eq!(back, params);
}

#[test]
fn partial_parameter_file_keeps_defaults() {
    let params = Parameters::from_json_str(r#"{ "margin_call_on": true, "timesteps_to_pay": 3 }"#).unwrap();
    assert!(params.margin_call_on);
    assert_eq!(params.timesteps_to_pay, 3);
    assert_eq!(params.bank_leverage_min, Parameters::default().bank_leverage_min);
}

#[test]
fn run_report_json_roundtrip() {
    let (report, _) = shocked_run(12, 0.4, 3);
    let json = serde_json::to_string(&report).unwrap();
    let back: RunReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back, report);
}
