use crate::core::asset_type::AssetType;
use crate::core::default::DefaultReason;
use crate::core::ids::InstitutionId;
use crate::engine::{DefaultCounts, Model, TickOutcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Default fraction below which a cascade does not count as systemic.
pub const SYSTEMIC_EVENT_THRESHOLD: f64 = 0.05;

/// Extent of a systemic event: the fraction of the population that
/// defaulted, or 0 when that fraction is below
/// [`SYSTEMIC_EVENT_THRESHOLD`].
///
/// ```
/// use contagion_engine::simulation::report::extent_of_systemic_event;
///
/// assert_eq!(extent_of_systemic_event(2, 48), 0.0);
/// assert_eq!(extent_of_systemic_event(12, 48), 0.25);
/// ```
pub fn extent_of_systemic_event(defaults: usize, population: usize) -> f64 {
    if population == 0 {
        return 0.0;
    }
    let fraction = defaults as f64 / population as f64;
    if fraction < SYSTEMIC_EVENT_THRESHOLD {
        0.0
    } else {
        fraction
    }
}

/// One tick as seen by the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    pub time: u64,
    pub defaults: DefaultCounts,
    pub cumulative_defaults: usize,
    pub quantities_sold: BTreeMap<AssetType, f64>,
    /// Everything sold so far over everything outstanding.
    pub total_sold_fraction: f64,
}

/// A defaulted institution at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultRecord {
    pub institution: InstitutionId,
    pub name: String,
    pub reason: DefaultReason,
    pub time: u64,
    pub equity_at_default: f64,
}

/// Aggregate outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub seed: u64,
    pub population: usize,
    pub ticks: Vec<TickRecord>,
    pub cumulative_quantities_sold: BTreeMap<AssetType, f64>,
    pub defaulted: Vec<DefaultRecord>,
}

impl RunReport {
    pub fn new(seed: u64, population: usize) -> Self {
        Self {
            seed,
            population,
            ..Self::default()
        }
    }

    /// Record a tick. `model` is the state right after it.
    pub fn record(&mut self, outcome: &TickOutcome, model: &Model) {
        let market = model.market();
        let outstanding: f64 = market.total_quantities().values().sum();
        let sold: f64 = market.cumulative_quantities_sold().values().sum();
        self.ticks.push(TickRecord {
            time: outcome.time,
            defaults: outcome.counts,
            cumulative_defaults: self.total_defaults() + outcome.counts.total,
            quantities_sold: outcome.quantities_sold.clone(),
            total_sold_fraction: if outstanding > 0.0 { sold / outstanding } else { 0.0 },
        });
        self.cumulative_quantities_sold = market.cumulative_quantities_sold().clone();

        for event in &outcome.defaults {
            if let Some(inst) = model.institution(event.institution) {
                self.defaulted.push(DefaultRecord {
                    institution: event.institution,
                    name: inst.name().to_string(),
                    reason: event.reason,
                    time: event.time,
                    equity_at_default: inst.equity_at_default(),
                });
            }
        }
    }

    pub fn total_defaults(&self) -> usize {
        self.ticks.last().map_or(0, |t| t.cumulative_defaults)
    }

    /// New defaults per tick.
    pub fn defaults_per_tick(&self) -> Vec<usize> {
        self.ticks.iter().map(|t| t.defaults.total).collect()
    }

    /// Total-sold fraction after each tick.
    pub fn total_sold(&self) -> Vec<f64> {
        self.ticks.iter().map(|t| t.total_sold_fraction).collect()
    }

    /// Defaults over the whole run, by cause.
    pub fn counts(&self) -> DefaultCounts {
        let mut counts = DefaultCounts::default();
        for t in &self.ticks {
            counts.add(&t.defaults);
        }
        counts
    }

    pub fn extent_of_systemic_event(&self) -> f64 {
        extent_of_systemic_event(self.total_defaults(), self.population)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts = self.counts();
        writeln!(f, "=== Contagion Run ===")?;
        writeln!(f, "Seed:            {}", self.seed)?;
        writeln!(f, "Institutions:    {}", self.population)?;
        writeln!(f, "Timesteps:       {}", self.ticks.len())?;
        writeln!(f, "Defaults:        {}", counts.total)?;
        writeln!(f, "  liquidity:     {}", counts.liquidity)?;
        writeln!(f, "  solvency:      {}", counts.solvency)?;
        writeln!(f, "  margin call:   {}", counts.failed_margin_call)?;
        writeln!(f, "Systemic event:  {:.4}", self.extent_of_systemic_event())?;

        writeln!(f, "\n--- Per Tick ---")?;
        for t in &self.ticks {
            writeln!(
                f,
                "  t={:<3} defaults {:<3} cumulative {:<3} sold {:.4}",
                t.time, t.defaults.total, t.cumulative_defaults, t.total_sold_fraction
            )?;
        }

        if !self.cumulative_quantities_sold.is_empty() {
            writeln!(f, "\n--- Quantities Sold ---")?;
            for (asset_type, quantity) in &self.cumulative_quantities_sold {
                writeln!(f, "  {}: {:.2}", asset_type, quantity)?;
            }
        }

        if !self.defaulted.is_empty() {
            writeln!(f, "\n--- Defaulted ---")?;
            for d in &self.defaulted {
                writeln!(
                    f,
                    "  {} at t={} ({}), equity {:.2}",
                    d.name, d.time, d.reason, d.equity_at_default
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(time: u64, defaults: usize) -> TickOutcome {
        TickOutcome {
            time,
            counts: DefaultCounts {
                total: defaults,
                banks: defaults,
                solvency: defaults,
                ..DefaultCounts::default()
            },
            ..TickOutcome::default()
        }
    }

    #[test]
    fn test_systemic_event_threshold() {
        assert_eq!(extent_of_systemic_event(0, 0), 0.0);
        assert_eq!(extent_of_systemic_event(1, 48), 0.0);
        assert_eq!(extent_of_systemic_event(3, 48), 0.0625);
        assert_eq!(extent_of_systemic_event(1, 20), 0.05);
    }

    #[test]
    fn test_cumulative_defaults() {
        let model = Model::new(Default::default());
        let mut report = RunReport::new(1, 40);
        for (t, d) in [(1, 0), (2, 1), (3, 2)] {
            report.record(&tick(t, d), &model);
        }
        assert_eq!(report.defaults_per_tick(), vec![0, 1, 2]);
        assert_eq!(report.total_defaults(), 3);
        assert_eq!(report.counts().solvency, 3);
        assert_eq!(report.extent_of_systemic_event(), 0.075);
        assert_eq!(report.total_sold(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_display() {
        let model = Model::new(Default::default());
        let mut report = RunReport::new(9, 3);
        report.record(&tick(1, 0), &model);
        let text = report.to_string();
        assert!(text.starts_with("=== Contagion Run ==="));
        assert!(text.contains("Seed:            9"));
        assert!(text.contains("t=1"));
    }
}
