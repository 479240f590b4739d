//! Network views of a model.

pub mod exposure;

pub use exposure::ExposureGraph;
