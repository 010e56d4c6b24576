use super::value::{EvaluationError, Value};
use crate::store::{BinaryOp, DenseMatrix};

#[inline(always)]
fn apply(op: BinaryOp, l: f64, r: f64) -> f64 {
    match op {
        BinaryOp::Add => l + r,
        BinaryOp::Subtract => l - r,
        BinaryOp::Multiply => l * r,
        BinaryOp::Divide => l / r,
        BinaryOp::Power => l.powf(r),
        BinaryOp::Minimum => l.min(r),
        BinaryOp::Maximum => l.max(r),
        BinaryOp::MatrixMultiply => unreachable!("handled by matmul"),
    }
}

fn mismatch(op: BinaryOp, lhs: &Value, rhs: &Value) -> EvaluationError {
    EvaluationError::ShapeMismatch { op: op.symbol().to_string(), left: lhs.shape(), right: rhs.shape() }
}

/// Executes one binary operator, broadcasting scalars over vectors and matrices.
pub fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, EvaluationError> {
    if op == BinaryOp::MatrixMultiply {
        return matmul(lhs, rhs);
    }
    let out = match (lhs, rhs) {
        (Value::Scalar(l), Value::Scalar(r)) => Value::Scalar(apply(op, l, r)),
        (Value::Scalar(l), other) => other.map(|r| apply(op, l, r)),
        (other, Value::Scalar(r)) => other.map(|l| apply(op, l, r)),
        (Value::Vector(l), Value::Vector(r)) if l.len() == r.len() => {
            Value::Vector(l.iter().zip(&r).map(|(a, b)| apply(op, *a, *b)).collect())
        }
        (Value::Matrix(mut l), Value::Matrix(r)) if l.rows == r.rows && l.cols == r.cols => {
            for (a, b) in l.entries.iter_mut().zip(&r.entries) {
                *a = apply(op, *a, *b);
            }
            Value::Matrix(l)
        }
        (l, r) => return Err(mismatch(op, &l, &r)),
    };
    Ok(out)
}

fn matmul(lhs: Value, rhs: Value) -> Result<Value, EvaluationError> {
    match (&lhs, &rhs) {
        (Value::Matrix(a), Value::Vector(x)) if a.cols == x.len() => {
            let y = (0..a.rows).map(|i| (0..a.cols).map(|j| a.get(i, j) * x[j]).sum()).collect();
            Ok(Value::Vector(y))
        }
        // A single-entry state is still a column vector.
        (Value::Matrix(a), Value::Scalar(x)) if a.cols == 1 => {
            Ok(Value::Vector((0..a.rows).map(|i| a.get(i, 0) * x).collect()))
        }
        (Value::Matrix(a), Value::Matrix(b)) if a.cols == b.rows => {
            let mut entries = vec![0.0; a.rows * b.cols];
            for i in 0..a.rows {
                for k in 0..a.cols {
                    let aik = a.get(i, k);
                    for j in 0..b.cols {
                        entries[i * b.cols + j] += aik * b.get(k, j);
                    }
                }
            }
            Ok(Value::Matrix(DenseMatrix { rows: a.rows, cols: b.cols, entries }))
        }
        _ => Err(mismatch(BinaryOp::MatrixMultiply, &lhs, &rhs)),
    }
}
