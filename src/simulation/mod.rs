//! Running a model: the multi-step driver, building systems from
//! balance-sheet records, synthetic systems and the run report.

pub mod driver;
pub mod report;
pub mod scenario;

pub use driver::Simulation;
pub use report::RunReport;
