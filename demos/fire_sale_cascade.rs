//! A fire-sale cascade in a four-institution system.
//!
//! Three banks lend to each other in a ring and hold the same government
//! bond as an asset manager. A shock to the bond pushes the weakest bank
//! under its leverage buffer; its sales depress the price for everyone.

use contagion_engine::core::params::Parameters;
use contagion_engine::prelude::*;

fn bank(model: &mut Model, name: &str, cash: f64, gov_bonds: f64, deposits: f64) -> InstitutionId {
    let id = model.add_bank(name, BankProfile::default());
    model
        .init_institution(
            id,
            &InitialAssets {
                cash,
                gov_bonds: vec![gov_bonds],
                corporate_bonds: vec![10.0],
                other: 20.0,
                ..InitialAssets::default()
            },
            &InitialLiabilities {
                deposits,
                long_term: 0.0,
            },
        )
        .unwrap();
    model.add_other_liability(id, 20.0).unwrap();
    id
}

fn main() {
    env_logger::init();

    println!("╔══════════════════════════════════════════════╗");
    println!("║  contagion-engine: Fire-Sale Cascade Example  ║");
    println!("╚══════════════════════════════════════════════╝\n");

    let params = Parameters {
        bank_leverage_on: true,
        bank_rwa_on: false,
        ..Parameters::cont_schaanning_2017()
    };
    let mut model = Model::new(params);

    let alpha = bank(&mut model, "ALPHA", 5.0, 30.0, 40.0);
    let beta = bank(&mut model, "BETA", 5.0, 40.0, 51.0);
    let gamma = bank(&mut model, "GAMMA", 5.0, 50.0, 61.0);
    model.add_interbank_loan(alpha, beta, 8.0).unwrap();
    model.add_interbank_loan(beta, gamma, 6.0).unwrap();
    model.add_interbank_loan(gamma, alpha, 4.0).unwrap();

    let fund = model.add_asset_manager("FUND");
    model
        .init_institution(
            fund,
            &InitialAssets {
                cash: 2.0,
                gov_bonds: vec![40.0],
                ..InitialAssets::default()
            },
            &InitialLiabilities::default(),
        )
        .unwrap();
    model.issue_shares(fund, None, 100.0).unwrap();
    model.set_initial_values();

    // --- The network ---
    println!("━━━ Interbank Network ━━━\n");
    let graph = ExposureGraph::from_model(&model);
    let name = |i: InstitutionId| model.institution(i).map_or("?", |inst| inst.name());
    for id in model.ids() {
        for (borrower, principal) in graph.borrowers_of(id) {
            println!("  {} → {}: {:.1}", name(id), name(borrower), principal);
        }
    }
    println!("  Contagion components: {}\n", graph.contagion_components().len());

    // --- Shock and run ---
    let shock = 0.025;
    println!("━━━ Shock: GOV_BONDS1 down {:.1}% ━━━\n", shock * 100.0);
    let mut sim = Simulation::new(model, 7);
    sim.apply_shock(AssetType::gov_bonds(1), shock).unwrap();

    for _ in 0..6 {
        let outcome = sim.step();
        let model = sim.model();
        println!(
            "  t={}  price {:.4}  sold {:.2}  new defaults {}",
            outcome.time,
            model.market().price(AssetType::gov_bonds(1)),
            outcome.quantities_sold.values().sum::<f64>(),
            outcome.counts.total
        );
        for inst in model.institutions() {
            let status = if inst.is_alive() { "alive" } else { "defaulted" };
            println!(
                "      {:<6} {:<14} equity {:>8.3}  leverage {:.4}  {}",
                inst.name(),
                inst.kind_name(),
                model.equity(inst.id()),
                model.leverage(inst.id()),
                status
            );
        }
    }

    println!("\n━━━ Interpretation ━━━\n");
    println!("  Every sale lowers the bond price for all holders, so one bank's");
    println!("  deleveraging erodes the equity of the others and of the fund,");
    println!("  whose investors then redeem and force further sales.");
}
