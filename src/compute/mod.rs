//! Numerical evaluation of discretised expression trees.
//!
//! Used to check that a model behaves the same after a save/load cycle.
pub mod engine;
pub mod kernel;
pub mod value;

pub use engine::Evaluator;
pub use value::{EvaluationError, Value};
