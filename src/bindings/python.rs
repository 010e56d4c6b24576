use crate::codec::SerialiseError;
use crate::compute::{EvaluationError, Evaluator};
use crate::display::outline;
use crate::persist::{self, SaveOptions};
use crate::store::{Model, ModelKind, TypeRegistry};
use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use std::collections::HashMap;

fn to_py_err(err: SerialiseError) -> PyErr {
    match err {
        SerialiseError::Io(e) => PyIOError::new_err(e.to_string()),
        other => PyValueError::new_err(other.to_string()),
    }
}

fn eval_err(err: EvaluationError) -> PyErr {
    PyRuntimeError::new_err(err.to_string())
}

fn resolve_target(target: Option<&str>) -> PyResult<Option<ModelKind>> {
    target.map(|tag| TypeRegistry::global().resolve_model(tag).map_err(to_py_err)).transpose()
}

fn parse(json: &str, target: Option<&str>) -> PyResult<Model> {
    let snapshot = persist::read_snapshot(json.as_bytes()).map_err(to_py_err)?;
    persist::load(&snapshot, resolve_target(target)?).map_err(to_py_err)
}

#[pyclass(name = "_Model")]
#[derive(Debug, Clone)]
pub struct PyModel {
    pub inner: Model,
}

#[pymethods]
impl PyModel {
    #[staticmethod]
    #[pyo3(signature = (json, target=None))]
    pub fn from_json(json: &str, target: Option<&str>) -> PyResult<Self> {
        Ok(Self { inner: parse(json, target)? })
    }

    #[staticmethod]
    #[pyo3(signature = (path, target=None))]
    pub fn from_file(path: &str, target: Option<&str>) -> PyResult<Self> {
        let inner = persist::load_from_file(path, resolve_target(target)?).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    #[getter]
    pub fn name(&self) -> String {
        self.inner.name.clone()
    }

    #[getter]
    pub fn kind(&self) -> &'static str {
        self.inner.kind.tag()
    }

    pub fn event_names(&self) -> Vec<String> {
        self.inner.events.iter().map(|e| e.name().to_string()).collect()
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.inner.variables.iter().flat_map(|v| v.keys().cloned()).collect()
    }

    #[pyo3(signature = (pretty=false))]
    pub fn to_json(&self, pretty: bool) -> PyResult<String> {
        let snapshot =
            persist::save(&self.inner, self.inner.mesh.as_ref(), self.inner.variables.as_ref()).map_err(to_py_err)?;
        let mut text = Vec::new();
        persist::write_snapshot(&mut text, &snapshot, pretty).map_err(to_py_err)?;
        String::from_utf8(text).map_err(|e| PyValueError::new_err(e.to_string()))
    }

    /// Writes the model to disk and returns the path used.
    #[pyo3(signature = (directory=None, filename=None, pretty=false))]
    pub fn save(&self, directory: Option<String>, filename: Option<String>, pretty: bool) -> PyResult<String> {
        let mut options = SaveOptions::new().pretty(pretty);
        if let Some(d) = directory {
            options = options.directory(d);
        }
        if let Some(f) = filename {
            options = options.filename(f);
        }
        let path = persist::save_to_file(&self.inner, self.inner.mesh.as_ref(), self.inner.variables.as_ref(), &options)
            .map_err(to_py_err)?;
        Ok(path.display().to_string())
    }

    pub fn describe(&self) -> String {
        outline::format_model(&self.inner)
    }

    #[pyo3(signature = (t, y, inputs=None))]
    pub fn evaluate_rhs(&self, t: f64, y: Vec<f64>, inputs: Option<HashMap<String, Vec<f64>>>) -> PyResult<Vec<f64>> {
        let inputs = inputs.unwrap_or_default();
        let value = Evaluator::new(t, &y, &inputs).evaluate(&self.inner.concatenated_rhs).map_err(eval_err)?;
        Ok(value.to_vec())
    }
}

#[pyfunction]
pub fn rust_core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Loads a snapshot and saves it again, normalising field names and identity markers.
#[pyfunction]
#[pyo3(signature = (json, target=None))]
pub fn reencode_model_json(json: &str, target: Option<&str>) -> PyResult<String> {
    PyModel::from_json(json, target)?.to_json(false)
}

#[pyfunction]
pub fn describe_model_json(json: &str) -> PyResult<String> {
    Ok(PyModel::from_json(json, None)?.describe())
}

#[pyfunction]
#[pyo3(signature = (json, t, y, inputs=None))]
pub fn evaluate_model_rhs(
    json: &str,
    t: f64,
    y: Vec<f64>,
    inputs: Option<HashMap<String, Vec<f64>>>,
) -> PyResult<Vec<f64>> {
    PyModel::from_json(json, None)?.evaluate_rhs(t, y, inputs)
}
