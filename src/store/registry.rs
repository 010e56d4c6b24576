//! The type registry: the single place where persisted type tags map to the
//! concrete variant that rebuilds them.
//!
//! A resolved tag yields a `Shell`, an empty placeholder naming the variant to
//! instantiate. The registry is built once per process and only read afterwards,
//! so concurrent decoders may share it freely.

use super::mesh::Spacing;
use super::model::ModelKind;
use super::types::{BinaryOp, MathFunction, SymbolKind};
use crate::codec::protocol::Arity;
use crate::codec::SerialiseError;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Every serialisable expression-node variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolShell {
    Scalar,
    Vector,
    Matrix,
    Time,
    StateVector,
    InputParameter,
    Variable,
    Negate,
    AbsoluteValue,
    Index,
    Function(MathFunction),
    Integral,
    ExplicitTimeIntegral,
    Binary(BinaryOp),
    NumpyConcatenation,
}

impl SymbolShell {
    pub const ALL: [SymbolShell; 29] = [
        SymbolShell::Scalar,
        SymbolShell::Vector,
        SymbolShell::Matrix,
        SymbolShell::Time,
        SymbolShell::StateVector,
        SymbolShell::InputParameter,
        SymbolShell::Variable,
        SymbolShell::Negate,
        SymbolShell::AbsoluteValue,
        SymbolShell::Index,
        SymbolShell::Function(MathFunction::Exp),
        SymbolShell::Function(MathFunction::Log),
        SymbolShell::Function(MathFunction::Sin),
        SymbolShell::Function(MathFunction::Cos),
        SymbolShell::Function(MathFunction::Tanh),
        SymbolShell::Function(MathFunction::Sqrt),
        SymbolShell::Function(MathFunction::Sinh),
        SymbolShell::Function(MathFunction::Cosh),
        SymbolShell::Integral,
        SymbolShell::ExplicitTimeIntegral,
        SymbolShell::Binary(BinaryOp::Add),
        SymbolShell::Binary(BinaryOp::Subtract),
        SymbolShell::Binary(BinaryOp::Multiply),
        SymbolShell::Binary(BinaryOp::Divide),
        SymbolShell::Binary(BinaryOp::Power),
        SymbolShell::Binary(BinaryOp::MatrixMultiply),
        SymbolShell::Binary(BinaryOp::Minimum),
        SymbolShell::Binary(BinaryOp::Maximum),
        SymbolShell::NumpyConcatenation,
    ];

    /// The shell for a live variant, or `None` for variants that are never persisted.
    pub fn of(kind: &SymbolKind) -> Option<SymbolShell> {
        let shell = match kind {
            SymbolKind::Scalar { .. } => SymbolShell::Scalar,
            SymbolKind::Vector { .. } => SymbolShell::Vector,
            SymbolKind::Matrix(_) => SymbolShell::Matrix,
            SymbolKind::Time => SymbolShell::Time,
            SymbolKind::StateVector { .. } => SymbolShell::StateVector,
            SymbolKind::InputParameter { .. } => SymbolShell::InputParameter,
            SymbolKind::Variable => SymbolShell::Variable,
            SymbolKind::Negate => SymbolShell::Negate,
            SymbolKind::AbsoluteValue => SymbolShell::AbsoluteValue,
            SymbolKind::Index { .. } => SymbolShell::Index,
            SymbolKind::Function(f) => SymbolShell::Function(*f),
            SymbolKind::Integral { .. } => SymbolShell::Integral,
            SymbolKind::ExplicitTimeIntegral { .. } => SymbolShell::ExplicitTimeIntegral,
            SymbolKind::Binary(op) => SymbolShell::Binary(*op),
            SymbolKind::Concatenation => SymbolShell::NumpyConcatenation,
            SymbolKind::Spatial(_) => return None,
        };
        Some(shell)
    }

    pub fn tag(self) -> &'static str {
        match self {
            SymbolShell::Scalar => "expression_tree.scalar.Scalar",
            SymbolShell::Vector => "expression_tree.vector.Vector",
            SymbolShell::Matrix => "expression_tree.matrix.Matrix",
            SymbolShell::Time => "expression_tree.independent_variable.Time",
            SymbolShell::StateVector => "expression_tree.state_vector.StateVector",
            SymbolShell::InputParameter => "expression_tree.input_parameter.InputParameter",
            SymbolShell::Variable => "expression_tree.variable.Variable",
            SymbolShell::Negate => "expression_tree.unary_operators.Negate",
            SymbolShell::AbsoluteValue => "expression_tree.unary_operators.AbsoluteValue",
            SymbolShell::Index => "expression_tree.unary_operators.Index",
            SymbolShell::Function(f) => match f {
                MathFunction::Exp => "expression_tree.functions.Exp",
                MathFunction::Log => "expression_tree.functions.Log",
                MathFunction::Sin => "expression_tree.functions.Sin",
                MathFunction::Cos => "expression_tree.functions.Cos",
                MathFunction::Tanh => "expression_tree.functions.Tanh",
                MathFunction::Sqrt => "expression_tree.functions.Sqrt",
                MathFunction::Sinh => "expression_tree.functions.Sinh",
                MathFunction::Cosh => "expression_tree.functions.Cosh",
            },
            SymbolShell::Integral => "expression_tree.unary_operators.Integral",
            SymbolShell::ExplicitTimeIntegral => "expression_tree.unary_operators.ExplicitTimeIntegral",
            SymbolShell::Binary(op) => match op {
                BinaryOp::Add => "expression_tree.binary_operators.Addition",
                BinaryOp::Subtract => "expression_tree.binary_operators.Subtraction",
                BinaryOp::Multiply => "expression_tree.binary_operators.Multiplication",
                BinaryOp::Divide => "expression_tree.binary_operators.Division",
                BinaryOp::Power => "expression_tree.binary_operators.Power",
                BinaryOp::MatrixMultiply => "expression_tree.binary_operators.MatrixMultiplication",
                BinaryOp::Minimum => "expression_tree.binary_operators.Minimum",
                BinaryOp::Maximum => "expression_tree.binary_operators.Maximum",
            },
            SymbolShell::NumpyConcatenation => "expression_tree.concatenations.NumpyConcatenation",
        }
    }

    pub fn class_name(self) -> &'static str {
        class_name(self.tag())
    }

    pub fn arity(self) -> Arity {
        match self {
            SymbolShell::Scalar
            | SymbolShell::Vector
            | SymbolShell::Matrix
            | SymbolShell::Time
            | SymbolShell::StateVector
            | SymbolShell::InputParameter
            | SymbolShell::Variable => Arity::Exact(0),
            SymbolShell::Negate
            | SymbolShell::AbsoluteValue
            | SymbolShell::Index
            | SymbolShell::Function(_)
            | SymbolShell::Integral
            | SymbolShell::ExplicitTimeIntegral => Arity::Exact(1),
            SymbolShell::Binary(_) => Arity::Exact(2),
            SymbolShell::NumpyConcatenation => Arity::Any,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubMeshShell {
    Point,
    Line(Spacing),
}

impl SubMeshShell {
    pub const ALL: [SubMeshShell; 6] = [
        SubMeshShell::Point,
        SubMeshShell::Line(Spacing::Uniform),
        SubMeshShell::Line(Spacing::Exponential),
        SubMeshShell::Line(Spacing::Chebyshev),
        SubMeshShell::Line(Spacing::UserSupplied),
        SubMeshShell::Line(Spacing::Generic),
    ];

    pub fn tag(self) -> &'static str {
        match self {
            SubMeshShell::Point => "meshes.zero_dimensional_submesh.SubMesh0D",
            SubMeshShell::Line(spacing) => match spacing {
                Spacing::Uniform => "meshes.one_dimensional_submeshes.Uniform1DSubMesh",
                Spacing::Exponential => "meshes.one_dimensional_submeshes.Exponential1DSubMesh",
                Spacing::Chebyshev => "meshes.one_dimensional_submeshes.Chebyshev1DSubMesh",
                Spacing::UserSupplied => "meshes.one_dimensional_submeshes.UserSupplied1DSubMesh",
                Spacing::Generic => "meshes.one_dimensional_submeshes.SubMesh1D",
            },
        }
    }
}

pub const EVENT_TAG: &str = "expression_tree.events.Event";
pub const MESH_TAG: &str = "meshes.meshes.Mesh";

/// What a type tag resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shell {
    Symbol(SymbolShell),
    Event,
    Mesh,
    SubMesh(SubMeshShell),
    Model(ModelKind),
}

impl Shell {
    pub fn tag(self) -> &'static str {
        match self {
            Shell::Symbol(s) => s.tag(),
            Shell::Event => EVENT_TAG,
            Shell::Mesh => MESH_TAG,
            Shell::SubMesh(s) => s.tag(),
            Shell::Model(m) => m.tag(),
        }
    }

    fn family(self) -> &'static str {
        match self {
            Shell::Symbol(_) => "an expression node",
            Shell::Event => "an event",
            Shell::Mesh => "a mesh",
            Shell::SubMesh(_) => "a sub-mesh",
            Shell::Model(_) => "a model",
        }
    }
}

/// The last path segment of a tag, e.g. `Subtraction`.
pub fn class_name(tag: &str) -> &str {
    tag.rsplit('.').next().unwrap_or(tag)
}

static GLOBAL: Lazy<TypeRegistry> = Lazy::new(TypeRegistry::build);

#[derive(Debug, Clone)]
pub struct TypeRegistry {
    by_tag: HashMap<&'static str, Shell>,
}

impl TypeRegistry {
    /// The process-wide registry. Populated on first use, immutable afterwards.
    pub fn global() -> &'static TypeRegistry {
        &GLOBAL
    }

    fn build() -> Self {
        let shells = SymbolShell::ALL
            .iter()
            .map(|s| Shell::Symbol(*s))
            .chain([Shell::Event, Shell::Mesh])
            .chain(SubMeshShell::ALL.iter().map(|s| Shell::SubMesh(*s)))
            .chain(ModelKind::ALL.iter().map(|m| Shell::Model(*m)));

        let by_tag: HashMap<_, _> = shells.map(|s| (s.tag(), s)).collect();
        tracing::debug!(variants = by_tag.len(), "type registry populated");
        Self { by_tag }
    }

    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }

    pub fn tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.by_tag.keys().copied()
    }

    /// Resolves a tag. Unknown tags are an error, never a fallback variant.
    pub fn resolve(&self, tag: &str) -> Result<Shell, SerialiseError> {
        self.by_tag
            .get(tag)
            .copied()
            .ok_or_else(|| SerialiseError::UnresolvableType { tag: tag.to_string() })
    }

    pub fn resolve_symbol(&self, tag: &str) -> Result<SymbolShell, SerialiseError> {
        match self.resolve(tag)? {
            Shell::Symbol(s) => Ok(s),
            other => Err(wrong_family(tag, other, "an expression node")),
        }
    }

    pub fn resolve_sub_mesh(&self, tag: &str) -> Result<SubMeshShell, SerialiseError> {
        match self.resolve(tag)? {
            Shell::SubMesh(s) => Ok(s),
            other => Err(wrong_family(tag, other, "a sub-mesh")),
        }
    }

    pub fn resolve_model(&self, tag: &str) -> Result<ModelKind, SerialiseError> {
        match self.resolve(tag)? {
            Shell::Model(m) => Ok(m),
            other => Err(wrong_family(tag, other, "a model")),
        }
    }

    pub fn expect(&self, tag: &str, expected: Shell) -> Result<(), SerialiseError> {
        let found = self.resolve(tag)?;
        if found == expected {
            Ok(())
        } else {
            Err(wrong_family(tag, found, expected.family()))
        }
    }
}

fn wrong_family(tag: &str, found: Shell, expected: &str) -> SerialiseError {
    SerialiseError::malformed(Some(tag), format!("tag names {} where {} was expected", found.family(), expected))
}
