//! contagion-engine CLI
//!
//! Run contagion simulations from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Shock government bonds by 40% and run 6 ticks
//! contagion-engine run --system banks.json
//!
//! # Custom parameters, shock and output
//! contagion-engine run --system banks.json --params params.json --shock CORPORATE_BONDS1=0.2 --format json
//!
//! # Generate a synthetic system
//! contagion-engine generate --banks 48 --seed 7 --output banks.json
//!
//! # Show funding-contagion components
//! contagion-engine network --system banks.json
//! ```

use contagion_engine::core::asset_type::AssetType;
use contagion_engine::core::params::Parameters;
use contagion_engine::graph::ExposureGraph;
use contagion_engine::simulation::scenario::{build_system, SystemSpec};
use contagion_engine::simulation::stress_test::{generate_system, SystemConfig};
use contagion_engine::simulation::Simulation;
use std::fs;
use std::process;

fn print_usage() {
    eprintln!(
        r#"contagion-engine: financial contagion simulation

USAGE:
    contagion-engine <COMMAND> [OPTIONS]

COMMANDS:
    run         Shock a system and simulate the cascade
    generate    Generate a synthetic banking system (for testing)
    network     Show the interbank exposure graph's contagion components
    help        Show this message

OPTIONS (run):
    --system <FILE>           Path to system JSON
    --params <FILE>           Path to parameter JSON (default: cont_schaanning_2017 preset)
    --shock <ASSET=FRACTION>  Initial price shock (default: GOV_BONDS1=0.4)
    --steps <N>               Number of timesteps (default: 6)
    --seed <N>                Seed of the per-tick shuffle (default: 0)
    --format <FORMAT>         Output format: text (default) or json

OPTIONS (generate):
    --banks <N>         Number of banks (default: 48)
    --seed <N>          Generator seed (default: 2017)
    --output <FILE>     Write to file instead of stdout

OPTIONS (network):
    --system <FILE>     Path to system JSON
    --format <FORMAT>   Output format: text (default) or json

EXAMPLES:
    contagion-engine run --system banks.json
    contagion-engine run --system banks.json --shock CORPORATE_BONDS1=0.2 --steps 10
    contagion-engine generate --banks 200 --output banks.json
    RUST_LOG=info contagion-engine run --system banks.json"#
    );
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", message);
    process::exit(1);
}

fn value<'a>(args: &'a [String], i: usize, what: &str) -> &'a str {
    args.get(i)
        .map(String::as_str)
        .unwrap_or_else(|| fail(format!("{} requires {}", args[i - 1], what)))
}

fn number<T: std::str::FromStr>(args: &[String], i: usize) -> T {
    value(args, i, "a number")
        .parse()
        .unwrap_or_else(|_| fail(format!("{} requires a number", args[i - 1])))
}

fn parse_shock(s: &str) -> (AssetType, f64) {
    let (asset, fraction) = s
        .split_once('=')
        .unwrap_or_else(|| fail(format!("shock '{}' must look like GOV_BONDS1=0.4", s)));
    let asset_type: AssetType = asset.trim().parse().unwrap_or_else(|e| fail(e));
    let fraction: f64 = fraction
        .trim()
        .parse()
        .unwrap_or_else(|_| fail(format!("invalid shock fraction '{}'", fraction)));
    (asset_type, fraction)
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| fail(e))
}

fn cmd_run(args: &[String]) {
    let mut system_path = None;
    let mut params_path = None;
    let mut shock = (AssetType::gov_bonds(1), 0.4);
    let mut steps = 6u32;
    let mut seed = 0u64;
    let mut format = "text".to_string();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--system" => {
                i += 1;
                system_path = Some(value(args, i, "a file path").to_string());
            }
            "--params" => {
                i += 1;
                params_path = Some(value(args, i, "a file path").to_string());
            }
            "--shock" => {
                i += 1;
                shock = parse_shock(value(args, i, "ASSET=FRACTION"));
            }
            "--steps" => {
                i += 1;
                steps = number(args, i);
            }
            "--seed" => {
                i += 1;
                seed = number(args, i);
            }
            "--format" => {
                i += 1;
                format = value(args, i, "'text' or 'json'").to_string();
            }
            _ => fail(format!("Unknown option: {}", args[i])),
        }
        i += 1;
    }

    let path = system_path.unwrap_or_else(|| fail("--system <FILE> is required"));
    let spec = SystemSpec::from_json_file(&path).unwrap_or_else(|e| fail(e));
    let params = match params_path {
        Some(p) => Parameters::from_json_file(&p).unwrap_or_else(|e| fail(e)),
        None => Parameters::cont_schaanning_2017(),
    };
    let model = build_system(&spec, params).unwrap_or_else(|e| fail(e));

    let mut sim = Simulation::new(model, seed);
    sim.apply_shock(shock.0, shock.1).unwrap_or_else(|e| fail(e));
    let report = sim.run(steps);

    if format == "json" {
        println!("{}", to_json(&report));
    } else {
        println!("Shock: {} by {:.1}%\n", shock.0, shock.1 * 100.0);
        print!("{}", report);
    }
}

fn cmd_generate(args: &[String]) {
    let mut config = SystemConfig::default();
    let mut output_path: Option<String> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--banks" => {
                i += 1;
                config.bank_count = number(args, i);
            }
            "--seed" => {
                i += 1;
                config.seed = number(args, i);
            }
            "--output" => {
                i += 1;
                output_path = Some(value(args, i, "a file path").to_string());
            }
            _ => fail(format!("Unknown option: {}", args[i])),
        }
        i += 1;
    }

    let spec = generate_system(&config);
    let json = to_json(&spec);

    if let Some(path) = output_path {
        fs::write(&path, &json).unwrap_or_else(|e| fail(format!("cannot write '{}': {}", path, e)));
        eprintln!(
            "Generated {} banks with {} interbank exposures → {}",
            spec.banks.len(),
            spec.exposures.len(),
            path
        );
    } else {
        println!("{}", json);
    }
}

fn cmd_network(args: &[String]) {
    let mut system_path = None;
    let mut format = "text".to_string();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--system" => {
                i += 1;
                system_path = Some(value(args, i, "a file path").to_string());
            }
            "--format" => {
                i += 1;
                format = value(args, i, "'text' or 'json'").to_string();
            }
            _ => fail(format!("Unknown option: {}", args[i])),
        }
        i += 1;
    }

    let path = system_path.unwrap_or_else(|| fail("--system <FILE> is required"));
    let spec = SystemSpec::from_json_file(&path).unwrap_or_else(|e| fail(e));
    let model = build_system(&spec, Parameters::default()).unwrap_or_else(|e| fail(e));
    let graph = ExposureGraph::from_model(&model);

    let components: Vec<Vec<String>> = graph
        .contagion_components()
        .iter()
        .map(|c| {
            c.iter()
                .filter_map(|id| model.institution(*id))
                .map(|inst| inst.name().to_string())
                .collect()
        })
        .collect();

    if format == "json" {
        #[derive(serde::Serialize)]
        struct NetworkOutput {
            institutions: usize,
            exposures: usize,
            total_exposure: f64,
            components: Vec<Vec<String>>,
        }
        println!(
            "{}",
            to_json(&NetworkOutput {
                institutions: graph.institution_count(),
                exposures: graph.exposure_count(),
                total_exposure: graph.total_exposure(),
                components,
            })
        );
    } else {
        println!("=== Exposure Network ===");
        println!("Institutions:   {}", graph.institution_count());
        println!("Exposures:      {}", graph.exposure_count());
        println!("Total exposure: {:.2}", graph.total_exposure());
        if components.is_empty() {
            println!("\nNo contagion components detected.");
        } else {
            for (i, names) in components.iter().enumerate() {
                println!("\nComponent {} ({} banks):", i, names.len());
                println!("  {}", names.join(", "));
            }
        }
    }
}

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let command = args[1].as_str();
    let rest = &args[2..];

    match command {
        "run" => cmd_run(rest),
        "generate" => cmd_generate(rest),
        "network" => cmd_network(rest),
        "help" | "--help" | "-h" => print_usage(),
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            process::exit(1);
        }
    }
}
