use crate::core::asset_type::AssetType;
use crate::core::default::EngineError;
use crate::core::ids::InstitutionId;
use crate::engine::{Model, TickOutcome};
use crate::simulation::report::RunReport;
use log::info;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Runs a model tick by tick, shuffling the order institutions step and
/// act in at every tick. A run is reproducible from its seed.
///
/// # Examples
///
/// ```
/// use contagion_engine::prelude::*;
/// use contagion_engine::simulation::scenario::build_system;
/// use contagion_engine::simulation::stress_test::{generate_system, SystemConfig};
///
/// let spec = generate_system(&SystemConfig { bank_count: 5, ..Default::default() });
/// let model = build_system(&spec, Parameters::cont_schaanning_2017()).unwrap();
///
/// let mut sim = Simulation::new(model, 42);
/// sim.apply_shock(AssetType::gov_bonds(1), 0.4).unwrap();
/// let report = sim.run(6);
/// assert_eq!(report.ticks.len(), 6);
/// assert!(report.total_defaults() <= 5);
/// ```
#[derive(Debug, Clone)]
pub struct Simulation {
    model: Model,
    rng: StdRng,
    seed: u64,
}

impl Simulation {
    pub fn new(model: Model, seed: u64) -> Self {
        Self {
            model,
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    pub fn into_model(self) -> Model {
        self.model
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Shock the market price of `asset_type` before the run.
    pub fn apply_shock(&mut self, asset_type: AssetType, fraction: f64) -> Result<(), EngineError> {
        info!("shocking {} by {:.1}%", asset_type, fraction * 100.0);
        self.model.apply_shock(asset_type, fraction)
    }

    /// Advance one tick in a freshly shuffled order.
    pub fn step(&mut self) -> TickOutcome {
        let mut order: Vec<InstitutionId> = self.model.ids().collect();
        order.shuffle(&mut self.rng);
        self.model.advance_timestep(&order)
    }

    /// Advance `timesteps` ticks and report on them.
    pub fn run(&mut self, timesteps: u32) -> RunReport {
        let mut report = RunReport::new(self.seed, self.model.population());
        for _ in 0..timesteps {
            let outcome = self.step();
            report.record(&outcome, &self.model);
        }
        info!(
            "run finished after {} ticks: {} of {} defaulted",
            timesteps,
            report.total_defaults(),
            report.population
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::params::Parameters;
    use crate::simulation::scenario::build_system;
    use crate::simulation::stress_test::{generate_system, SystemConfig};

    fn system(banks: usize) -> Model {
        let spec = generate_system(&SystemConfig {
            bank_count: banks,
            ..Default::default()
        });
        build_system(&spec, Parameters::cont_schaanning_2017()).unwrap()
    }

    #[test]
    fn test_same_seed_same_run() {
        let run = |seed| {
            let mut sim = Simulation::new(system(12), seed);
            sim.apply_shock(AssetType::gov_bonds(1), 0.3).unwrap();
            sim.run(5)
        };
        assert_eq!(run(3), run(3));
    }

    #[test]
    fn test_time_advances() {
        let mut sim = Simulation::new(system(4), 0);
        sim.step();
        sim.step();
        assert_eq!(sim.model().time(), 2);
    }

    #[test]
    fn test_unshocked_system_is_quiet() {
        let mut sim = Simulation::new(system(10), 5);
        let report = sim.run(3);
        assert_eq!(report.total_defaults(), 0);
        assert_eq!(report.extent_of_systemic_event(), 0.0);
    }
}
