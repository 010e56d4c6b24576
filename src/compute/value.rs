use crate::store::DenseMatrix;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("'{name}' ({variant}) cannot be evaluated on a discretised state")]
    NotEvaluable { name: String, variant: &'static str },
    #[error("Shape mismatch in '{op}': {left} vs {right}")]
    ShapeMismatch { op: String, left: String, right: String },
    #[error("State slice [{start}:{stop}] is out of bounds for a state of length {len}")]
    StateOutOfBounds { start: usize, stop: usize, len: usize },
    #[error("Index [{start}:{stop}] is out of bounds for a value of length {len}")]
    IndexOutOfBounds { start: usize, stop: usize, len: usize },
    #[error("Input parameter '{name}' was not supplied")]
    MissingInput { name: String },
    #[error("Input parameter '{name}' expects {expected} values, got {actual}")]
    InputSize { name: String, expected: usize, actual: usize },
}

/// The result of evaluating a symbol.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Vector(Vec<f64>),
    Matrix(DenseMatrix),
}

impl Value {
    pub fn len(&self) -> usize {
        match self {
            Value::Scalar(_) => 1,
            Value::Vector(v) => v.len(),
            Value::Matrix(m) => m.entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shape(&self) -> String {
        match self {
            Value::Scalar(_) => "scalar".to_string(),
            Value::Vector(v) => format!("vector({})", v.len()),
            Value::Matrix(m) => format!("matrix({}x{})", m.rows, m.cols),
        }
    }

    /// Flattened entries, row-major for matrices.
    pub fn to_vec(&self) -> Vec<f64> {
        match self {
            Value::Scalar(s) => vec![*s],
            Value::Vector(v) => v.clone(),
            Value::Matrix(m) => m.entries.clone(),
        }
    }

    /// Same shape and every entry within `tol` (NaNs compare equal to each other).
    pub fn approx_eq(&self, other: &Value, tol: f64) -> bool {
        let same_shape = match (self, other) {
            (Value::Scalar(_), Value::Scalar(_)) => true,
            (Value::Vector(a), Value::Vector(b)) => a.len() == b.len(),
            (Value::Matrix(a), Value::Matrix(b)) => a.rows == b.rows && a.cols == b.cols,
            _ => false,
        };
        same_shape
            && self.to_vec().iter().zip(other.to_vec()).all(|(a, b)| {
                (a.is_nan() && b.is_nan()) || a == &b || (a - b).abs() <= tol * (1.0 + a.abs().max(b.abs()))
            })
    }

    pub(crate) fn map(self, f: impl Fn(f64) -> f64) -> Value {
        match self {
            Value::Scalar(s) => Value::Scalar(f(s)),
            Value::Vector(v) => Value::Vector(v.into_iter().map(f).collect()),
            Value::Matrix(mut m) => {
                m.entries.iter_mut().for_each(|x| *x = f(*x));
                Value::Matrix(m)
            }
        }
    }
}
