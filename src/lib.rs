//! Persistence for discretised models built from symbolic expression trees.
//!
//! A model is saved as a nested JSON document in which every expression node is a
//! self-describing record, and loaded back through a static registry of type tags.

pub mod analysis;
pub mod codec;
pub mod compute;
pub mod display;
pub mod persist;
pub mod store;

#[cfg(feature = "python")]
pub mod bindings;

pub use codec::SerialiseError;
pub use persist::{load, load_from_file, save, save_to_file, ModelSnapshot, SaveOptions};
pub use store::{Event, Mesh, Model, ModelKind, Symbol};

// --- Module Definition ---
/// Defines the `_core` Python module. The leading underscore marks it as the
/// compiled half of a mixed Python package.
#[cfg(feature = "python")]
#[pyo3::pymodule]
fn _core(m: &pyo3::Bound<'_, pyo3::types::PyModule>) -> pyo3::PyResult<()> {
    use crate::bindings::python::*;
    use pyo3::prelude::*;

    m.add_class::<PyModel>()?;
    m.add_function(wrap_pyfunction!(rust_core_version, m)?)?;
    m.add_function(wrap_pyfunction!(reencode_model_json, m)?)?;
    m.add_function(wrap_pyfunction!(describe_model_json, m)?)?;
    m.add_function(wrap_pyfunction!(evaluate_model_rhs, m)?)?;
    Ok(())
}
