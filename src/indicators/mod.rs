// Technical indicators module
// Trailing momentum feeding the technical score

pub mod momentum;

pub use momentum::compute_momentum;
