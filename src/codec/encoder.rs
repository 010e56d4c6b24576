//! The graph encoder.
//!
//! Unfolds a live DAG into a tree of self-describing JSON records. Every node is
//! written in full at every position it occupies; shared sub-expressions are
//! duplicated, never referenced. Traversal uses an explicit stack, so the depth of
//! an expression is bounded by memory rather than by the thread's call stack.

use super::error::SerialiseError;
use super::protocol::{AttributeRecord, Snapshot};
use super::record::release;
use super::{CHILDREN_KEY, EXPRESSION_KEY, ID_KEY, INITIAL_CONDITION_KEY, SUB_MESHES_KEY, TYPE_KEY};
use crate::store::mesh::{Mesh, SubMesh};
use crate::store::registry::{EVENT_TAG, MESH_TAG};
use crate::store::{Event, Symbol};
use serde_json::{Map, Value};

/// Encodes nodes into records. Identity markers come from a counter scoped to
/// this encoder, so one encoder should be used per save.
#[derive(Debug, Default)]
pub struct Encoder {
    next_id: u64,
}

enum Step<'a> {
    Enter(&'a Symbol),
    Exit(&'a Symbol, u64),
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records stamped so far.
    pub fn records_written(&self) -> u64 {
        self.next_id
    }

    /// Hands out the next identity marker, for a container record stamped by the caller.
    pub fn take_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn stamp(tag: &str, id: u64, attributes: AttributeRecord) -> Map<String, Value> {
        let mut record = Map::new();
        record.insert(TYPE_KEY.into(), Value::from(tag));
        record.insert(ID_KEY.into(), Value::from(id));
        record.extend(attributes);
        record
    }

    pub fn encode_symbol(&mut self, root: &Symbol) -> Result<Value, SerialiseError> {
        let mut done: Vec<Value> = Vec::new();
        if let Err(err) = self.unfold(root, &mut done) {
            done.into_iter().for_each(release);
            return Err(err);
        }
        tracing::trace!(records = self.next_id, "encoded expression tree");
        done.pop().ok_or_else(|| SerialiseError::malformed(None, "encoder produced no record"))
    }

    fn unfold(&mut self, root: &Symbol, done: &mut Vec<Value>) -> Result<(), SerialiseError> {
        let mut stack = vec![Step::Enter(root)];
        while let Some(step) = stack.pop() {
            match step {
                Step::Enter(node) => {
                    // Fail before descending into an undiscretised subtree.
                    node.shell()?;
                    let id = self.take_id();
                    stack.push(Step::Exit(node, id));
                    if let Some(ic) = node.initial_condition() {
                        stack.push(Step::Enter(ic));
                    }
                    for child in node.children.iter().rev() {
                        stack.push(Step::Enter(child));
                    }
                }
                Step::Exit(node, id) => {
                    let tag = node.shell()?.tag();
                    let mut record = Self::stamp(tag, id, node.snapshot()?);
                    let initial_condition = match node.initial_condition() {
                        Some(_) => done.pop(),
                        None => None,
                    };
                    let children = done.split_off(done.len() - node.children.len());
                    record.insert(CHILDREN_KEY.into(), Value::Array(children));
                    if let Some(ic) = initial_condition {
                        record.insert(INITIAL_CONDITION_KEY.into(), ic);
                    }
                    done.push(Value::Object(record));
                }
            }
        }
        Ok(())
    }

    pub fn encode_event(&mut self, event: &Event) -> Result<Value, SerialiseError> {
        let id = self.take_id();
        let mut record = Self::stamp(EVENT_TAG, id, event.snapshot()?);
        let expression = self.encode_symbol(event.expression())?;
        record.insert(EXPRESSION_KEY.into(), expression);
        Ok(Value::Object(record))
    }

    pub fn encode_sub_mesh(&mut self, sub_mesh: &SubMesh) -> Result<Value, SerialiseError> {
        let id = self.take_id();
        let tag = sub_mesh.shell()?.tag();
        Ok(Value::Object(Self::stamp(tag, id, sub_mesh.snapshot()?)))
    }

    /// Writes the primary sub-meshes only. Ghost cells and composite keys are
    /// regenerated on load.
    pub fn encode_mesh(&mut self, mesh: &Mesh) -> Result<Value, SerialiseError> {
        let id = self.take_id();
        let mut record = Self::stamp(MESH_TAG, id, mesh.snapshot()?);
        let mut sub_meshes = Map::new();
        for (domain, sub_mesh) in mesh.primary_entries() {
            sub_meshes.insert(domain.clone(), self.encode_sub_mesh(sub_mesh)?);
        }
        tracing::trace!(
            written = sub_meshes.len(),
            skipped = mesh.len() - sub_meshes.len(),
            "encoded mesh"
        );
        record.insert(SUB_MESHES_KEY.into(), Value::Object(sub_meshes));
        Ok(Value::Object(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mesh::{domain_key, CoordSys, SubMesh1D};
    use crate::store::{EventType, SpatialOp};
    use serde_json::json;

    #[test]
    fn test_record_layout() {
        let tree = Symbol::subtract(Symbol::scalar(2.0), Symbol::time());
        let record = Encoder::new().encode_symbol(&tree).unwrap();
        assert_eq!(
            record,
            json!({
                "type": "expression_tree.binary_operators.Subtraction",
                "id": 0,
                "name": "-",
                "children": [
                    { "type": "expression_tree.scalar.Scalar", "id": 1, "name": "2", "value": 2.0, "children": [] },
                    { "type": "expression_tree.independent_variable.Time", "id": 2, "name": "time", "children": [] }
                ]
            })
        );
    }

    #[test]
    fn test_shared_nodes_are_unfolded() {
        let y = Symbol::state_vector(vec![crate::store::YSlice(0, 3)]);
        let square = Symbol::multiply(y.clone(), y);
        let record = Encoder::new().encode_symbol(&square).unwrap();
        let children = record["children"].as_array().unwrap();
        assert_eq!(children[0]["y_slices"], json!([[0, 3]]));
        assert_eq!(children[0]["y_slices"], children[1]["y_slices"]);
        // Same node, distinct identity markers.
        assert_ne!(children[0]["id"], children[1]["id"]);
    }

    #[test]
    fn test_initial_condition_is_a_sibling_field() {
        let integrand = Symbol::multiply(Symbol::scalar(2.0), Symbol::time());
        let eti = Symbol::explicit_time_integral(integrand, Symbol::scalar(5.0));
        let record = Encoder::new().encode_symbol(&eti).unwrap();
        assert_eq!(record["children"].as_array().unwrap().len(), 1);
        assert_eq!(record["initial_condition"]["value"], json!(5.0));
        assert_eq!(record["initial_condition"]["children"], json!([]));
    }

    #[test]
    fn test_undiscretised_subtree_fails() {
        let tree = Symbol::add(Symbol::scalar(1.0), Symbol::spatial(SpatialOp::Laplacian, Symbol::time()));
        let err = Encoder::new().encode_symbol(&tree).unwrap_err();
        assert!(matches!(err, SerialiseError::UndiscretisedNode { .. }));
    }

    #[test]
    fn test_failure_after_deep_sibling_does_not_exhaust_the_stack() {
        let mut deep = Symbol::time();
        for _ in 0..100_000 {
            deep = Symbol::negate(deep);
        }
        let tree = Symbol::add(deep, Symbol::spatial(SpatialOp::Gradient, Symbol::time()));
        let err = Encoder::new().encode_symbol(&tree).unwrap_err();
        assert!(matches!(err, SerialiseError::UndiscretisedNode { .. }));
    }

    #[test]
    fn test_event_wraps_expression() {
        let event = Event::new("Maximum time", Symbol::subtract(Symbol::time(), Symbol::scalar(3600.0)), EventType::Termination);
        let record = Encoder::new().encode_event(&event).unwrap();
        assert_eq!(record["type"], json!(EVENT_TAG));
        assert_eq!(record["event_type"], json!("TERMINATION"));
        assert_eq!(record["expression"]["name"], json!("-"));
        assert!(record.get("children").is_none());
    }

    #[test]
    fn test_mesh_skips_ghost_cells_and_composite_keys() {
        let mut mesh = crate::store::mesh::tests::cell_mesh();
        mesh.combine(&["negative electrode", "separator"]).unwrap();
        mesh.insert(
            domain_key(["extra_left ghost cell"]),
            SubMesh::Line(SubMesh1D::uniform(-1.0, 0.0, 1, CoordSys::Cartesian).unwrap()),
        );
        let record = Encoder::new().encode_mesh(&mesh).unwrap();
        let sub_meshes = record["sub_meshes"].as_object().unwrap();
        let mut keys: Vec<&str> = sub_meshes.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["current collector", "negative electrode", "positive electrode", "separator"]);
        assert_eq!(sub_meshes["separator"]["npts"], json!(2));
        assert_eq!(sub_meshes["current collector"]["type"], json!("meshes.zero_dimensional_submesh.SubMesh0D"));
    }
}
