//! The expression-node data model.
//!
//! A `Symbol` is one node of a symbolic computation DAG. Nodes are immutable once
//! built and are shared through `Arc`, so the same sub-expression may appear at
//! several positions of one tree.

use crate::codec::float;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::sync::Arc;

/// Ordered child list. Most operators are unary or binary, so two slots stay inline.
pub type Children = SmallVec<[Arc<Symbol>; 2]>;

/// The domains a symbol lives on, from the innermost (`primary`) outwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Domains {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondary: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tertiary: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quaternary: Vec<String>,
}

impl Domains {
    pub fn primary<S: Into<String>>(domains: impl IntoIterator<Item = S>) -> Self {
        Self { primary: domains.into_iter().map(Into::into).collect(), ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
            && self.secondary.is_empty()
            && self.tertiary.is_empty()
            && self.quaternary.is_empty()
    }
}

/// A dense, row-major matrix. Discretised models carry their mass matrix and
/// finite-volume operators in this form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseMatrix {
    pub rows: usize,
    pub cols: usize,
    #[serde(with = "float::reals")]
    pub entries: Vec<f64>,
}

impl DenseMatrix {
    pub fn new(rows: usize, cols: usize, entries: Vec<f64>) -> Result<Self, String> {
        if entries.len() != rows * cols {
            return Err(format!(
                "Matrix of shape {}x{} needs {} entries, got {}",
                rows,
                cols,
                rows * cols,
                entries.len()
            ));
        }
        Ok(Self { rows, cols, entries })
    }

    pub fn identity(n: usize) -> Self {
        let mut entries = vec![0.0; n * n];
        for i in 0..n {
            entries[i * n + i] = 1.0;
        }
        Self { rows: n, cols: n, entries }
    }

    #[inline(always)]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.entries[row * self.cols + col]
    }
}

/// Binary operators. Order of the two children is significant for every
/// operator except addition, multiplication, minimum and maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    MatrixMultiply,
    Minimum,
    Maximum,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Power => "**",
            BinaryOp::MatrixMultiply => "@",
            BinaryOp::Minimum => "minimum",
            BinaryOp::Maximum => "maximum",
        }
    }
}

/// Elementwise scalar functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathFunction {
    Exp,
    Log,
    Sin,
    Cos,
    Tanh,
    Sqrt,
    Sinh,
    Cosh,
}

impl MathFunction {
    pub fn name(self) -> &'static str {
        match self {
            MathFunction::Exp => "exp",
            MathFunction::Log => "log",
            MathFunction::Sin => "sin",
            MathFunction::Cos => "cos",
            MathFunction::Tanh => "tanh",
            MathFunction::Sqrt => "sqrt",
            MathFunction::Sinh => "sinh",
            MathFunction::Cosh => "cosh",
        }
    }

    #[inline(always)]
    pub fn apply(self, x: f64) -> f64 {
        match self {
            MathFunction::Exp => x.exp(),
            MathFunction::Log => x.ln(),
            MathFunction::Sin => x.sin(),
            MathFunction::Cos => x.cos(),
            MathFunction::Tanh => x.tanh(),
            MathFunction::Sqrt => x.sqrt(),
            MathFunction::Sinh => x.sinh(),
            MathFunction::Cosh => x.cosh(),
        }
    }
}

/// Continuous spatial operators. Discretisation replaces every one of these with
/// matrix operations, so a tree that still contains one cannot be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpatialOp {
    Gradient,
    Divergence,
    Laplacian,
}

impl SpatialOp {
    pub fn name(self) -> &'static str {
        match self {
            SpatialOp::Gradient => "grad",
            SpatialOp::Divergence => "div",
            SpatialOp::Laplacian => "laplacian",
        }
    }
}

/// Half-open `[start, stop)` slice into the state vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct YSlice(pub usize, pub usize);

impl YSlice {
    pub fn len(&self) -> usize {
        self.1.saturating_sub(self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The variant-specific part of a symbol.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolKind {
    Scalar { value: f64 },
    Vector { entries: Vec<f64> },
    Matrix(DenseMatrix),
    Time,
    StateVector { y_slices: Vec<YSlice> },
    InputParameter { expected_size: usize },
    Variable,
    Negate,
    AbsoluteValue,
    Index { start: usize, stop: usize },
    Function(MathFunction),
    Integral { integration_variable: String },
    /// Owns an auxiliary tree outside the ordered child list.
    ExplicitTimeIntegral { initial_condition: Option<Arc<Symbol>> },
    Binary(BinaryOp),
    Concatenation,
    Spatial(SpatialOp),
}

/// One node of an expression tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub domains: Domains,
    pub kind: SymbolKind,
    pub children: Children,
}

impl Symbol {
    pub fn new(name: impl Into<String>, domains: Domains, kind: SymbolKind, children: Children) -> Self {
        Self { name: name.into(), domains, kind, children }
    }

    fn leaf(name: impl Into<String>, kind: SymbolKind) -> Arc<Self> {
        Arc::new(Self::new(name, Domains::default(), kind, Children::new()))
    }

    fn unary(name: impl Into<String>, kind: SymbolKind, child: Arc<Symbol>) -> Arc<Self> {
        let domains = child.domains.clone();
        let mut children = Children::new();
        children.push(child);
        Arc::new(Self::new(name, domains, kind, children))
    }

    // --- Leaves ---

    pub fn scalar(value: f64) -> Arc<Self> {
        Self::leaf(format!("{}", value), SymbolKind::Scalar { value })
    }

    pub fn vector(entries: Vec<f64>) -> Arc<Self> {
        let name = format!("Column vector of length {}", entries.len());
        Self::leaf(name, SymbolKind::Vector { entries })
    }

    pub fn matrix(matrix: DenseMatrix) -> Arc<Self> {
        let name = format!("Matrix of shape ({}, {})", matrix.rows, matrix.cols);
        Self::leaf(name, SymbolKind::Matrix(matrix))
    }

    pub fn time() -> Arc<Self> {
        Self::leaf("time", SymbolKind::Time)
    }

    pub fn state_vector(y_slices: Vec<YSlice>) -> Arc<Self> {
        let name = y_slices
            .iter()
            .map(|s| format!("y[{}:{}]", s.0, s.1))
            .collect::<Vec<_>>()
            .join(",");
        Self::leaf(name, SymbolKind::StateVector { y_slices })
    }

    pub fn input_parameter(name: impl Into<String>, expected_size: usize) -> Arc<Self> {
        Self::leaf(name, SymbolKind::InputParameter { expected_size })
    }

    pub fn variable(name: impl Into<String>, domains: Domains) -> Arc<Self> {
        Arc::new(Self::new(name, domains, SymbolKind::Variable, Children::new()))
    }

    // --- Operators ---

    pub fn binary(op: BinaryOp, left: Arc<Symbol>, right: Arc<Symbol>) -> Arc<Self> {
        let domains = if left.domains.is_empty() { right.domains.clone() } else { left.domains.clone() };
        let mut children = Children::new();
        children.push(left);
        children.push(right);
        Arc::new(Self::new(op.symbol(), domains, SymbolKind::Binary(op), children))
    }

    pub fn add(left: Arc<Symbol>, right: Arc<Symbol>) -> Arc<Self> {
        Self::binary(BinaryOp::Add, left, right)
    }

    pub fn subtract(left: Arc<Symbol>, right: Arc<Symbol>) -> Arc<Self> {
        Self::binary(BinaryOp::Subtract, left, right)
    }

    pub fn multiply(left: Arc<Symbol>, right: Arc<Symbol>) -> Arc<Self> {
        Self::binary(BinaryOp::Multiply, left, right)
    }

    pub fn matmul(left: Arc<Symbol>, right: Arc<Symbol>) -> Arc<Self> {
        Self::binary(BinaryOp::MatrixMultiply, left, right)
    }

    pub fn negate(child: Arc<Symbol>) -> Arc<Self> {
        Self::unary("-", SymbolKind::Negate, child)
    }

    pub fn abs(child: Arc<Symbol>) -> Arc<Self> {
        Self::unary("abs", SymbolKind::AbsoluteValue, child)
    }

    pub fn index(child: Arc<Symbol>, start: usize, stop: usize) -> Arc<Self> {
        let name = format!("Index[{}:{}]", start, stop);
        Self::unary(name, SymbolKind::Index { start, stop }, child)
    }

    pub fn function(func: MathFunction, child: Arc<Symbol>) -> Arc<Self> {
        Self::unary(func.name(), SymbolKind::Function(func), child)
    }

    pub fn integral(child: Arc<Symbol>, integration_variable: impl Into<String>) -> Arc<Self> {
        let integration_variable = integration_variable.into();
        let name = format!("integral d{}", integration_variable);
        Self::unary(name, SymbolKind::Integral { integration_variable }, child)
    }

    pub fn explicit_time_integral(integrand: Arc<Symbol>, initial_condition: Arc<Symbol>) -> Arc<Self> {
        let kind = SymbolKind::ExplicitTimeIntegral { initial_condition: Some(initial_condition) };
        Self::unary("explicit time integral", kind, integrand)
    }

    pub fn concatenation(parts: impl IntoIterator<Item = Arc<Symbol>>) -> Arc<Self> {
        let children: Children = parts.into_iter().collect();
        let mut domains = Domains::default();
        for child in &children {
            for d in &child.domains.primary {
                if !domains.primary.contains(d) {
                    domains.primary.push(d.clone());
                }
            }
        }
        Arc::new(Self::new("numpy_concatenation", domains, SymbolKind::Concatenation, children))
    }

    pub fn spatial(op: SpatialOp, child: Arc<Symbol>) -> Arc<Self> {
        Self::unary(op.name(), SymbolKind::Spatial(op), child)
    }

    // --- Queries ---

    pub fn initial_condition(&self) -> Option<&Arc<Symbol>> {
        match &self.kind {
            SymbolKind::ExplicitTimeIntegral { initial_condition } => initial_condition.as_ref(),
            _ => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// True if no continuous spatial operator remains anywhere in the tree.
    pub fn is_discretised(&self) -> bool {
        let mut stack: Vec<&Symbol> = vec![self];
        while let Some(node) = stack.pop() {
            if matches!(node.kind, SymbolKind::Spatial(_)) {
                return false;
            }
            stack.extend(node.children.iter().map(|c| c.as_ref()));
            if let Some(ic) = node.initial_condition() {
                stack.push(ic);
            }
        }
        true
    }
}

// Deep chains would otherwise be torn down recursively, one stack frame per level.
impl Drop for Symbol {
    fn drop(&mut self) {
        let mut pending: Vec<Arc<Symbol>> = self.children.drain(..).collect();
        pending.extend(self.take_initial_condition());
        while let Some(node) = pending.pop() {
            if let Ok(mut owned) = Arc::try_unwrap(node) {
                pending.extend(owned.children.drain(..));
                pending.extend(owned.take_initial_condition());
            }
        }
    }
}

impl Symbol {
    fn take_initial_condition(&mut self) -> Option<Arc<Symbol>> {
        match &mut self.kind {
            SymbolKind::ExplicitTimeIntegral { initial_condition } => initial_condition.take(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_preserves_child_order() {
        let a = Symbol::scalar(3.0);
        let b = Symbol::scalar(1.0);
        let diff = Symbol::subtract(a.clone(), b.clone());
        assert!(Arc::ptr_eq(&diff.children[0], &a));
        assert!(Arc::ptr_eq(&diff.children[1], &b));
        assert_eq!(diff.name, "-");
    }

    #[test]
    fn test_spatial_operator_marks_tree_undiscretised() {
        let c = Symbol::variable("c", Domains::primary(["negative particle"]));
        let flux = Symbol::spatial(SpatialOp::Gradient, c);
        let rhs = Symbol::negate(Symbol::spatial(SpatialOp::Divergence, flux));
        assert!(!rhs.is_discretised());
        assert_eq!(rhs.domains.primary, vec!["negative particle".to_string()]);

        let discrete = Symbol::matmul(
            Symbol::matrix(DenseMatrix::identity(2)),
            Symbol::state_vector(vec![YSlice(0, 2)]),
        );
        assert!(discrete.is_discretised());
    }

    #[test]
    fn test_initial_condition_is_not_a_child() {
        let eti = Symbol::explicit_time_integral(Symbol::time(), Symbol::scalar(2.0));
        assert_eq!(eti.children.len(), 1);
        assert_eq!(eti.initial_condition().map(|ic| ic.name.as_str()), Some("2"));
    }

    #[test]
    fn test_deep_chain_drops_without_overflow() {
        let mut node = Symbol::time();
        for _ in 0..200_000 {
            node = Symbol::negate(node);
        }
        drop(node);
    }

    #[test]
    fn test_deep_initial_condition_chain_drops_without_overflow() {
        let mut node = Symbol::time();
        for _ in 0..200_000 {
            node = Symbol::explicit_time_integral(Symbol::time(), node);
        }
        drop(node);
    }

    #[test]
    fn test_matrix_shape_is_checked() {
        assert!(DenseMatrix::new(2, 2, vec![1.0, 2.0, 3.0]).is_err());
        let m = DenseMatrix::new(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(m.get(1, 0), 3.0);
    }
}
