use crate::compute::kernel;
use crate::compute::value::{EvaluationError, Value};
use crate::store::{Symbol, SymbolKind};
use std::collections::HashMap;

/// Evaluates a discretised expression tree at one `(t, y, inputs)` point.
pub struct Evaluator<'a> {
    t: f64,
    y: &'a [f64],
    inputs: &'a HashMap<String, Vec<f64>>,
}

impl<'a> Evaluator<'a> {
    pub fn new(t: f64, y: &'a [f64], inputs: &'a HashMap<String, Vec<f64>>) -> Self {
        Self { t, y, inputs }
    }

    /// Post-order walk with an explicit stack, so tree depth is bounded by memory only.
    /// Shared sub-expressions are evaluated once per occurrence.
    pub fn evaluate(&self, root: &Symbol) -> Result<Value, EvaluationError> {
        let mut stack: Vec<(&Symbol, bool)> = vec![(root, false)];
        let mut values: Vec<Value> = Vec::new();

        while let Some((node, expanded)) = stack.pop() {
            if !expanded && !node.children.is_empty() {
                stack.push((node, true));
                stack.extend(node.children.iter().rev().map(|c| (c.as_ref(), false)));
                continue;
            }
            let args = values.split_off(values.len() - node.children.len());
            values.push(self.apply(node, args)?);
        }

        // The walk pushes exactly one value for the root.
        Ok(values.pop().unwrap_or(Value::Vector(Vec::new())))
    }

    fn apply(&self, node: &Symbol, mut args: Vec<Value>) -> Result<Value, EvaluationError> {
        let not_evaluable = |variant: &'static str| EvaluationError::NotEvaluable { name: node.name.clone(), variant };

        match &node.kind {
            SymbolKind::Scalar { value } => Ok(Value::Scalar(*value)),
            SymbolKind::Vector { entries } => Ok(Value::Vector(entries.clone())),
            SymbolKind::Matrix(m) => Ok(Value::Matrix(m.clone())),
            SymbolKind::Time => Ok(Value::Scalar(self.t)),
            SymbolKind::StateVector { y_slices } => {
                let mut out = Vec::with_capacity(y_slices.iter().map(|s| s.len()).sum());
                for s in y_slices {
                    let slice = self.y.get(s.0..s.1).ok_or(EvaluationError::StateOutOfBounds {
                        start: s.0,
                        stop: s.1,
                        len: self.y.len(),
                    })?;
                    out.extend_from_slice(slice);
                }
                Ok(Value::Vector(out))
            }
            SymbolKind::InputParameter { expected_size } => {
                let given = self
                    .inputs
                    .get(&node.name)
                    .ok_or_else(|| EvaluationError::MissingInput { name: node.name.clone() })?;
                if given.len() != *expected_size {
                    return Err(EvaluationError::InputSize {
                        name: node.name.clone(),
                        expected: *expected_size,
                        actual: given.len(),
                    });
                }
                if *expected_size == 1 {
                    Ok(Value::Scalar(given[0]))
                } else {
                    Ok(Value::Vector(given.clone()))
                }
            }
            SymbolKind::Variable => Err(not_evaluable("Variable")),
            SymbolKind::Integral { .. } => Err(not_evaluable("Integral")),
            SymbolKind::ExplicitTimeIntegral { .. } => Err(not_evaluable("ExplicitTimeIntegral")),
            SymbolKind::Spatial(op) => Err(not_evaluable(op.name())),
            SymbolKind::Negate => Ok(pop_single(&mut args).map(|x| -x)),
            SymbolKind::AbsoluteValue => Ok(pop_single(&mut args).map(f64::abs)),
            SymbolKind::Function(f) => {
                let f = *f;
                Ok(pop_single(&mut args).map(move |x| f.apply(x)))
            }
            SymbolKind::Index { start, stop } => {
                let entries = pop_single(&mut args).to_vec();
                let picked = entries.get(*start..*stop).ok_or(EvaluationError::IndexOutOfBounds {
                    start: *start,
                    stop: *stop,
                    len: entries.len(),
                })?;
                if picked.len() == 1 {
                    Ok(Value::Scalar(picked[0]))
                } else {
                    Ok(Value::Vector(picked.to_vec()))
                }
            }
            SymbolKind::Binary(op) => {
                let rhs = args.pop().unwrap_or(Value::Scalar(f64::NAN));
                let lhs = args.pop().unwrap_or(Value::Scalar(f64::NAN));
                kernel::binary(*op, lhs, rhs)
            }
            SymbolKind::Concatenation => Ok(Value::Vector(args.iter().flat_map(Value::to_vec).collect())),
        }
    }
}

// Arity is fixed by construction and checked on decode.
fn pop_single(args: &mut Vec<Value>) -> Value {
    args.pop().unwrap_or(Value::Vector(Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DenseMatrix, Domains, MathFunction, SpatialOp, YSlice};
    use rstest::rstest;
    use std::sync::Arc;

    fn eval(root: &Arc<Symbol>, y: &[f64]) -> Result<Value, EvaluationError> {
        let inputs = HashMap::new();
        Evaluator::new(0.5, y, &inputs).evaluate(root)
    }

    #[test]
    fn test_linear_decay() {
        // dy/dt = -0.1 * y
        let y = Symbol::state_vector(vec![YSlice(0, 3)]);
        let rhs = Symbol::multiply(Symbol::scalar(-0.1), y);
        let out = eval(&rhs, &[1.0, 2.0, 3.0]).unwrap();
        assert!(out.approx_eq(&Value::Vector(vec![-0.1, -0.2, -0.3]), 1e-15));
    }

    #[test]
    fn test_matrix_operator_on_state() {
        let a = DenseMatrix::new(2, 2, vec![0.0, 1.0, -1.0, 0.0]).unwrap();
        let rhs = Symbol::matmul(Symbol::matrix(a), Symbol::state_vector(vec![YSlice(0, 2)]));
        assert_eq!(eval(&rhs, &[3.0, 4.0]).unwrap(), Value::Vector(vec![4.0, -3.0]));
    }

    #[test]
    fn test_time_index_and_functions() {
        let y = Symbol::state_vector(vec![YSlice(0, 1), YSlice(2, 4)]);
        let picked = Symbol::index(y, 1, 2);
        let expr = Symbol::add(Symbol::function(MathFunction::Exp, Symbol::scalar(0.0)), Symbol::multiply(Symbol::time(), picked));
        assert_eq!(eval(&expr, &[9.0, 8.0, 7.0, 6.0]).unwrap(), Value::Scalar(1.0 + 0.5 * 7.0));
    }

    #[test]
    fn test_concatenation_flattens_in_order() {
        let cat = Symbol::concatenation([Symbol::scalar(1.0), Symbol::vector(vec![2.0, 3.0]), Symbol::abs(Symbol::scalar(-4.0))]);
        assert_eq!(eval(&cat, &[]).unwrap(), Value::Vector(vec![1.0, 2.0, 3.0, 4.0]));
    }

    #[test]
    fn test_input_parameters() {
        let p = Symbol::input_parameter("Current function [A]", 1);
        let mut inputs = HashMap::new();
        let err = Evaluator::new(0.0, &[], &inputs).evaluate(&p).unwrap_err();
        assert_eq!(err, EvaluationError::MissingInput { name: "Current function [A]".into() });

        inputs.insert("Current function [A]".to_string(), vec![0.68]);
        assert_eq!(Evaluator::new(0.0, &[], &inputs).evaluate(&p).unwrap(), Value::Scalar(0.68));
    }

    #[rstest]
    #[case(Symbol::variable("c", Domains::default()))]
    #[case(Symbol::spatial(SpatialOp::Gradient, Symbol::time()))]
    #[case(Symbol::integral(Symbol::time(), "x"))]
    #[case(Symbol::explicit_time_integral(Symbol::time(), Symbol::scalar(0.0)))]
    fn test_continuous_nodes_are_not_evaluable(#[case] root: Arc<Symbol>) {
        match eval(&root, &[]) {
            Err(EvaluationError::NotEvaluable { .. }) => {}
            other => panic!("Wrong error type: {:?}", other),
        }
    }

    #[test]
    fn test_state_slice_out_of_bounds() {
        let y = Symbol::state_vector(vec![YSlice(0, 5)]);
        match eval(&y, &[1.0, 2.0]) {
            Err(EvaluationError::StateOutOfBounds { len: 2, .. }) => {}
            other => panic!("Wrong error type: {:?}", other),
        }
    }

    #[test]
    fn test_deep_tree_evaluates_iteratively() {
        let mut node = Symbol::scalar(1.0);
        for _ in 0..100_000 {
            node = Symbol::negate(node);
        }
        assert_eq!(eval(&node, &[]).unwrap(), Value::Scalar(1.0));
    }
}
