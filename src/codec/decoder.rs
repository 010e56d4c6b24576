//! The graph decoder.
//!
//! Rebuilds live objects from records in post-order: every child exists before
//! the parent that owns it is rebuilt. Identity markers are ignored, so each
//! decoded tree is a fresh graph with no shared nodes.

use super::error::SerialiseError;
use super::protocol::{AttributeRecord, Snapshot};
use super::{CHILDREN_KEY, EXPRESSION_KEY, ID_KEY, INITIAL_CONDITION_KEY, SUB_MESHES_KEY, TYPE_KEY};
use crate::store::mesh::{Mesh, SubMesh};
use crate::store::registry::{Shell, SymbolShell, TypeRegistry};
use crate::store::{Event, Symbol};
use serde_json::{Map, Value};
use std::sync::Arc;

/// The structural shape of a record, inferred from which composite field it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordShape {
    /// An expression node: `children`.
    Children,
    /// An event: `expression`.
    Expression,
    /// A mesh: `sub_meshes`.
    SubMeshes,
    /// No nested records, e.g. a sub-mesh.
    Flat,
}

impl RecordShape {
    pub fn infer(tag: &str, record: &Map<String, Value>) -> Result<Self, SerialiseError> {
        let present: Vec<RecordShape> = [
            (CHILDREN_KEY, RecordShape::Children),
            (EXPRESSION_KEY, RecordShape::Expression),
            (SUB_MESHES_KEY, RecordShape::SubMeshes),
        ]
        .into_iter()
        .filter(|(key, _)| record.contains_key(*key))
        .map(|(_, shape)| shape)
        .collect();

        match present.as_slice() {
            [] => Ok(RecordShape::Flat),
            [one] => Ok(*one),
            _ => Err(SerialiseError::malformed(
                Some(tag),
                "'children', 'expression' and 'sub_meshes' are mutually exclusive",
            )),
        }
    }

    fn key(self) -> Option<&'static str> {
        match self {
            RecordShape::Children => Some(CHILDREN_KEY),
            RecordShape::Expression => Some(EXPRESSION_KEY),
            RecordShape::SubMeshes => Some(SUB_MESHES_KEY),
            RecordShape::Flat => None,
        }
    }
}

const STRUCTURAL_KEYS: [&str; 6] = [TYPE_KEY, ID_KEY, CHILDREN_KEY, EXPRESSION_KEY, SUB_MESHES_KEY, INITIAL_CONDITION_KEY];

/// The record with its structural fields stripped.
fn attributes(record: &Map<String, Value>) -> AttributeRecord {
    record
        .iter()
        .filter(|(k, _)| !STRUCTURAL_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn header(value: &Value) -> Result<(&Map<String, Value>, &str), SerialiseError> {
    let record = value
        .as_object()
        .ok_or_else(|| SerialiseError::malformed(None, format!("expected a record, found {}", kind_of(value))))?;
    let tag = record
        .get(TYPE_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| SerialiseError::malformed(None, format!("record has no '{}' tag", TYPE_KEY)))?;
    Ok((record, tag))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a record",
    }
}

fn require_shape(tag: &str, record: &Map<String, Value>, expected: RecordShape) -> Result<(), SerialiseError> {
    let found = RecordShape::infer(tag, record)?;
    if found == expected {
        return Ok(());
    }
    let reason = match (expected.key(), found.key()) {
        (Some(want), _) => format!("missing required '{}' field", want),
        (None, Some(extra)) => format!("unexpected '{}' field", extra),
        (None, None) => unreachable!("Flat == Flat"),
    };
    Err(SerialiseError::malformed(Some(tag), reason))
}

enum Step<'v> {
    Visit(&'v Value),
    Build { shell: SymbolShell, record: &'v Map<String, Value>, arity: usize, has_ic: bool },
}

/// Rebuilds live objects through a type registry.
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'r> {
    registry: &'r TypeRegistry,
}

impl Default for Decoder<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder<'static> {
    pub fn new() -> Self {
        Self { registry: TypeRegistry::global() }
    }
}

impl<'r> Decoder<'r> {
    pub fn with_registry(registry: &'r TypeRegistry) -> Self {
        Self { registry }
    }

    pub fn decode_symbol(&self, root: &Value) -> Result<Arc<Symbol>, SerialiseError> {
        let mut stack = vec![Step::Visit(root)];
        let mut built: Vec<Arc<Symbol>> = Vec::new();

        while let Some(step) = stack.pop() {
            match step {
                Step::Visit(value) => {
                    let (record, tag) = header(value)?;
                    let shell = self.registry.resolve_symbol(tag)?;
                    require_shape(tag, record, RecordShape::Children)?;
                    let children = record
                        .get(CHILDREN_KEY)
                        .and_then(Value::as_array)
                        .ok_or_else(|| SerialiseError::malformed(Some(tag), "'children' is not a list"))?;
                    let initial_condition = record.get(INITIAL_CONDITION_KEY);
                    if matches!(shell, SymbolShell::ExplicitTimeIntegral) && initial_condition.is_none() {
                        return Err(SerialiseError::malformed(
                            Some(tag),
                            format!("missing required '{}' field", INITIAL_CONDITION_KEY),
                        ));
                    }

                    stack.push(Step::Build { shell, record, arity: children.len(), has_ic: initial_condition.is_some() });
                    // Popped after the children, so it lands on top of them.
                    if let Some(ic) = initial_condition {
                        stack.push(Step::Visit(ic));
                    }
                    // Reversed so the leftmost child is rebuilt first.
                    for child in children.iter().rev() {
                        stack.push(Step::Visit(child));
                    }
                }
                Step::Build { shell, record, arity, has_ic } => {
                    let initial_condition = if has_ic { built.pop() } else { None };
                    let start = built
                        .len()
                        .checked_sub(arity)
                        .ok_or_else(|| SerialiseError::malformed(Some(shell.tag()), "children went missing during rebuild"))?;
                    let children = built.split_off(start);
                    let mut symbol = Symbol::rebuild(shell, &attributes(record), children)?;
                    if let Some(ic) = initial_condition {
                        symbol.attach_initial_condition(ic)?;
                    }
                    built.push(Arc::new(symbol));
                }
            }
        }

        built.pop().ok_or_else(|| SerialiseError::malformed(None, "decoder produced no symbol"))
    }

    pub fn decode_event(&self, value: &Value) -> Result<Event, SerialiseError> {
        let (record, tag) = header(value)?;
        self.registry.expect(tag, Shell::Event)?;
        require_shape(tag, record, RecordShape::Expression)?;
        let expression = record
            .get(EXPRESSION_KEY)
            .ok_or_else(|| SerialiseError::malformed(Some(tag), "missing required 'expression' field"))?;
        let expression = self.decode_symbol(expression)?;
        Event::rebuild((), &attributes(record), vec![expression])
    }

    pub fn decode_sub_mesh(&self, value: &Value) -> Result<SubMesh, SerialiseError> {
        let (record, tag) = header(value)?;
        let shell = self.registry.resolve_sub_mesh(tag)?;
        require_shape(tag, record, RecordShape::Flat)?;
        SubMesh::rebuild(shell, &attributes(record), Vec::new())
    }

    /// Sub-meshes are independent of one another and keyed by domain, so their
    /// order in the record is irrelevant.
    pub fn decode_mesh(&self, value: &Value) -> Result<Mesh, SerialiseError> {
        let (record, tag) = header(value)?;
        self.registry.expect(tag, Shell::Mesh)?;
        require_shape(tag, record, RecordShape::SubMeshes)?;
        let entries = record
            .get(SUB_MESHES_KEY)
            .and_then(Value::as_object)
            .ok_or_else(|| SerialiseError::malformed(Some(tag), "'sub_meshes' is not a mapping"))?;

        let mut sub_meshes = Vec::with_capacity(entries.len());
        for (domain, entry) in entries {
            if crate::store::mesh::is_derived_key(&vec![domain.clone()]) {
                tracing::warn!(domain = %domain, "ignoring persisted ghost cell; ghost cells are regenerated");
                continue;
            }
            sub_meshes.push((domain.clone(), self.decode_sub_mesh(entry)?));
        }
        Mesh::rebuild((), &attributes(record), sub_meshes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Encoder;
    use crate::store::mesh::SubMesh1D;
    use crate::store::{BinaryOp, DenseMatrix, Domains, EventType, MathFunction, SymbolKind, YSlice};
    use serde_json::json;

    fn round_trip(symbol: &Symbol) -> Arc<Symbol> {
        let record = Encoder::new().encode_symbol(symbol).unwrap();
        Decoder::new().decode_symbol(&record).unwrap()
    }

    #[test]
    fn test_every_variant_round_trips() {
        let y = Symbol::state_vector(vec![YSlice(0, 2), YSlice(4, 5)]);
        let m = Symbol::matrix(DenseMatrix::new(3, 3, vec![1.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, f64::INFINITY]).unwrap());
        let mut parts = vec![
            Symbol::matmul(m, y.clone()),
            Symbol::vector(vec![1.0, f64::NEG_INFINITY, 3.0]),
            Symbol::index(Symbol::abs(Symbol::negate(y.clone())), 1, 3),
            Symbol::input_parameter("Current function [A]", 1),
            Symbol::integral(Symbol::variable("c", Domains::primary(["negative particle"])), "r"),
            Symbol::explicit_time_integral(Symbol::time(), Symbol::scalar(0.5)),
        ];
        let funcs = [
            MathFunction::Exp,
            MathFunction::Log,
            MathFunction::Sin,
            MathFunction::Cos,
            MathFunction::Tanh,
            MathFunction::Sqrt,
            MathFunction::Sinh,
            MathFunction::Cosh,
        ];
        for f in funcs {
            parts.push(Symbol::function(f, Symbol::time()));
        }
        let ops = [
            BinaryOp::Add,
            BinaryOp::Subtract,
            BinaryOp::Multiply,
            BinaryOp::Divide,
            BinaryOp::Power,
            BinaryOp::Minimum,
            BinaryOp::Maximum,
        ];
        for op in ops {
            parts.push(Symbol::binary(op, Symbol::time(), Symbol::scalar(2.0)));
        }
        let tree = Symbol::concatenation(parts);

        let back = round_trip(&tree);
        assert_eq!(*back, *tree);
    }

    #[test]
    fn test_child_order_is_preserved() {
        let a = Symbol::state_vector(vec![YSlice(0, 1)]);
        let b = Symbol::scalar(7.0);
        let back = round_trip(&Symbol::subtract(a, b));
        assert_eq!(back.kind, SymbolKind::Binary(BinaryOp::Subtract));
        assert!(matches!(back.children[0].kind, SymbolKind::StateVector { .. }));
        assert_eq!(back.children[1].kind, SymbolKind::Scalar { value: 7.0 });
    }

    #[test]
    fn test_shared_nodes_decode_as_independent_copies() {
        let y = Symbol::state_vector(vec![YSlice(0, 3)]);
        let back = round_trip(&Symbol::multiply(y.clone(), y));
        assert_eq!(back.children[0], back.children[1]);
        assert!(!Arc::ptr_eq(&back.children[0], &back.children[1]));
    }

    #[test]
    fn test_initial_condition_does_not_shift_children() {
        let integrand = Symbol::subtract(Symbol::time(), Symbol::scalar(1.0));
        let ic = Symbol::add(Symbol::scalar(2.0), Symbol::scalar(3.0));
        let back = round_trip(&Symbol::explicit_time_integral(integrand, ic));
        assert_eq!(back.children.len(), 1);
        assert_eq!(back.children[0].kind, SymbolKind::Binary(BinaryOp::Subtract));
        let ic = back.initial_condition().unwrap();
        assert_eq!(ic.kind, SymbolKind::Binary(BinaryOp::Add));
        assert_eq!(ic.children[1].kind, SymbolKind::Scalar { value: 3.0 });
    }

    #[test]
    fn test_time_integral_without_initial_condition_is_malformed() {
        let record = json!({
            "type": "expression_tree.unary_operators.ExplicitTimeIntegral",
            "name": "explicit time integral",
            "children": [{ "type": "expression_tree.independent_variable.Time", "name": "time", "children": [] }]
        });
        match Decoder::new().decode_symbol(&record) {
            Err(SerialiseError::MalformedRecord { .. }) => {}
            other => panic!("Wrong error type: {:?}", other),
        }
        let err = Decoder::new().decode_symbol(&record).unwrap_err();
        assert!(err.to_string().contains("missing required 'initial_condition' field"), "Msg: {}", err);
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let tree = Symbol::subtract(Symbol::time(), Symbol::scalar(1.0));
        let mut record = Encoder::new().encode_symbol(&tree).unwrap();
        record["children"][1]["type"] = json!("expression_tree.scalar.Scalarr");
        let err = Decoder::new().decode_symbol(&record).unwrap_err();
        match err {
            SerialiseError::UnresolvableType { tag } => assert_eq!(tag, "expression_tree.scalar.Scalarr"),
            other => panic!("Wrong error type: {:?}", other),
        }
    }

    #[test]
    fn test_arity_mismatch_is_fatal() {
        let record = json!({
            "type": "expression_tree.binary_operators.Subtraction",
            "name": "-",
            "children": [{ "type": "expression_tree.independent_variable.Time", "name": "time", "children": [] }]
        });
        let err = Decoder::new().decode_symbol(&record).unwrap_err();
        assert_eq!(err.to_string(), "Variant 'Subtraction' expects exactly 2 children, got 1");
    }

    #[test]
    fn test_missing_children_is_malformed() {
        let record = json!({ "type": "expression_tree.unary_operators.Negate", "name": "-" });
        let err = Decoder::new().decode_symbol(&record).unwrap_err();
        assert!(err.to_string().contains("missing required 'children' field"), "Msg: {}", err);
    }

    #[test]
    fn test_composite_fields_are_mutually_exclusive() {
        let record = json!({
            "type": "expression_tree.unary_operators.Negate",
            "name": "-",
            "children": [],
            "expression": {}
        });
        let err = Decoder::new().decode_symbol(&record).unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn test_records_must_be_tagged_objects() {
        assert!(Decoder::new().decode_symbol(&json!([1, 2])).is_err());
        let err = Decoder::new().decode_symbol(&json!({ "name": "x", "children": [] })).unwrap_err();
        assert!(err.to_string().contains("no 'type' tag"));
    }

    #[test]
    fn test_event_round_trip() {
        let event = Event::new("Zero crossing", Symbol::negate(Symbol::time()), EventType::Discontinuity);
        let record = Encoder::new().encode_event(&event).unwrap();
        let back = Decoder::new().decode_event(&record).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_event_without_expression_is_malformed() {
        let record = json!({ "type": "expression_tree.events.Event", "name": "e", "event_type": "SWITCH" });
        let err = Decoder::new().decode_event(&record).unwrap_err();
        assert!(err.to_string().contains("missing required 'expression' field"));
    }

    #[test]
    fn test_mesh_round_trip_regenerates_ghost_cells() {
        let mesh = crate::store::mesh::tests::cell_mesh();
        let record = Encoder::new().encode_mesh(&mesh).unwrap();
        let back = Decoder::new().decode_mesh(&record).unwrap();
        assert_eq!(back, mesh);
        assert!(back.get(&["separator_right ghost cell"]).is_some());
    }

    #[test]
    fn test_sub_mesh_with_children_is_malformed() {
        let record = json!({
            "type": "meshes.one_dimensional_submeshes.Uniform1DSubMesh",
            "edges": [0.0, 1.0],
            "coord_sys": "cartesian",
            "children": []
        });
        let err = Decoder::new().decode_sub_mesh(&record).unwrap_err();
        assert!(err.to_string().contains("unexpected 'children' field"));

        let ok = json!({
            "type": "meshes.one_dimensional_submeshes.Exponential1DSubMesh",
            "edges": [0.0, 0.1, 1.0],
            "coord_sys": "spherical_polar"
        });
        let SubMesh::Line(line) = Decoder::new().decode_sub_mesh(&ok).unwrap() else {
            panic!("expected a 1D sub-mesh");
        };
        assert_eq!(line, SubMesh1D::new(crate::store::Spacing::Exponential, vec![0.0, 0.1, 1.0], crate::store::mesh::CoordSys::SphericalPolar).unwrap());
    }

    #[test]
    fn test_deep_trees_do_not_exhaust_the_stack() {
        let depth = 100_000;
        let mut tree = Symbol::time();
        for i in 0..depth {
            tree = if i % 2 == 0 { Symbol::negate(tree) } else { Symbol::add(tree, Symbol::scalar(1.0)) };
        }
        let record = Encoder::new().encode_symbol(&tree).unwrap();
        let back = Decoder::new().decode_symbol(&record).unwrap();

        let mut node = &back;
        let mut levels = 0;
        while let Some(first) = node.children.first() {
            node = first;
            levels += 1;
        }
        assert_eq!(levels, depth);
        assert_eq!(node.kind, SymbolKind::Time);
        crate::codec::release(record);
    }
}
