//! The node snapshot protocol.
//!
//! Every persisted variant can flatten itself into an `AttributeRecord` that
//! excludes its children, and can be rebuilt from such a record plus the list of
//! children the decoder has already materialised.

use super::error::SerialiseError;
use super::float;
use crate::store::mesh::{CoordSys, Mesh, SubMesh, SubMesh0D, SubMesh1D};
use crate::store::registry::{SubMeshShell, SymbolShell};
use crate::store::{Domains, Event, EventType, DenseMatrix, Symbol, SymbolKind, YSlice};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

/// The flat, child-free attributes of one node.
pub type AttributeRecord = Map<String, Value>;

/// How many children a variant is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Any,
}

impl Arity {
    pub fn check(self, variant: &'static str, actual: usize) -> Result<(), SerialiseError> {
        match self {
            Arity::Exact(n) if n != actual => Err(SerialiseError::ArityMismatch { variant, expected: self, actual }),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {}", n),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// The capability every serialisable node type implements.
pub trait Snapshot: Sized {
    /// The empty placeholder the registry resolves a tag to.
    type Shell: Copy;
    /// What the decoder hands to `rebuild`, in order.
    type Child;

    fn shell(&self) -> Result<Self::Shell, SerialiseError>;

    /// This node's own attributes, excluding children. Pure.
    fn snapshot(&self) -> Result<AttributeRecord, SerialiseError>;

    /// Builds a live node from a record and its already-rebuilt children.
    fn rebuild(shell: Self::Shell, record: &AttributeRecord, children: Vec<Self::Child>) -> Result<Self, SerialiseError>;
}

// --- Record helpers ---

fn to_record<T: Serialize>(tag: &str, value: &T) -> Result<AttributeRecord, SerialiseError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(SerialiseError::malformed(Some(tag), format!("attributes serialised to {}", other))),
        Err(source) => Err(SerialiseError::InvalidAttribute { tag: tag.to_string(), source }),
    }
}

fn from_record<T: DeserializeOwned>(tag: &str, record: &AttributeRecord) -> Result<T, SerialiseError> {
    serde_json::from_value(Value::Object(record.clone()))
        .map_err(|source| SerialiseError::InvalidAttribute { tag: tag.to_string(), source })
}

#[derive(Serialize)]
struct CommonOut<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "no_domains")]
    domains: &'a Domains,
}

fn no_domains(domains: &&Domains) -> bool {
    domains.is_empty()
}

#[derive(Deserialize)]
struct CommonIn {
    name: String,
    #[serde(default)]
    domains: Domains,
}

#[derive(Deserialize)]
struct ScalarAttrs {
    #[serde(with = "float::real")]
    value: f64,
}

#[derive(Deserialize)]
struct VectorAttrs {
    #[serde(with = "float::reals")]
    entries: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct StateVectorAttrs {
    y_slices: Vec<YSlice>,
}

#[derive(Deserialize)]
struct InputParameterAttrs {
    expected_size: usize,
}

#[derive(Deserialize)]
struct IndexAttrs {
    start: usize,
    stop: usize,
}

#[derive(Deserialize)]
struct IntegralAttrs {
    integration_variable: String,
}

// --- Expression nodes ---

impl Snapshot for Symbol {
    type Shell = SymbolShell;
    type Child = Arc<Symbol>;

    fn shell(&self) -> Result<SymbolShell, SerialiseError> {
        match &self.kind {
            SymbolKind::Spatial(op) => {
                Err(SerialiseError::UndiscretisedNode { name: self.name.clone(), operator: op.name() })
            }
            kind => SymbolShell::of(kind)
                .ok_or_else(|| SerialiseError::malformed(None, format!("'{}' has no type tag", self.name))),
        }
    }

    fn snapshot(&self) -> Result<AttributeRecord, SerialiseError> {
        let tag = self.shell()?.tag();
        let mut record = to_record(tag, &CommonOut { name: &self.name, domains: &self.domains })?;
        match &self.kind {
            SymbolKind::Scalar { value } => {
                record.insert("value".into(), float::to_json(*value));
            }
            SymbolKind::Vector { entries } => {
                record.insert("entries".into(), Value::Array(entries.iter().map(|x| float::to_json(*x)).collect()));
            }
            SymbolKind::Matrix(matrix) => record.extend(to_record(tag, matrix)?),
            SymbolKind::StateVector { y_slices } => {
                record.extend(to_record(tag, &StateVectorAttrs { y_slices: y_slices.clone() })?)
            }
            SymbolKind::InputParameter { expected_size } => {
                record.insert("expected_size".into(), Value::from(*expected_size));
            }
            SymbolKind::Index { start, stop } => {
                record.insert("start".into(), Value::from(*start));
                record.insert("stop".into(), Value::from(*stop));
            }
            SymbolKind::Integral { integration_variable } => {
                record.insert("integration_variable".into(), Value::from(integration_variable.as_str()));
            }
            // The initial condition is a sibling tree written by the encoder.
            SymbolKind::ExplicitTimeIntegral { .. } => {}
            SymbolKind::Time
            | SymbolKind::Variable
            | SymbolKind::Negate
            | SymbolKind::AbsoluteValue
            | SymbolKind::Function(_)
            | SymbolKind::Binary(_)
            | SymbolKind::Concatenation => {}
            SymbolKind::Spatial(_) => unreachable!("rejected by shell()"),
        }
        Ok(record)
    }

    fn rebuild(shell: SymbolShell, record: &AttributeRecord, children: Vec<Arc<Symbol>>) -> Result<Self, SerialiseError> {
        shell.arity().check(shell.class_name(), children.len())?;
        let tag = shell.tag();
        let common: CommonIn = from_record(tag, record)?;

        let kind = match shell {
            SymbolShell::Scalar => SymbolKind::Scalar { value: from_record::<ScalarAttrs>(tag, record)?.value },
            SymbolShell::Vector => SymbolKind::Vector { entries: from_record::<VectorAttrs>(tag, record)?.entries },
            SymbolShell::Matrix => {
                let raw: DenseMatrix = from_record(tag, record)?;
                let matrix = DenseMatrix::new(raw.rows, raw.cols, raw.entries)
                    .map_err(|reason| SerialiseError::malformed(Some(tag), reason))?;
                SymbolKind::Matrix(matrix)
            }
            SymbolShell::Time => SymbolKind::Time,
            SymbolShell::StateVector => {
                let attrs: StateVectorAttrs = from_record(tag, record)?;
                if let Some(bad) = attrs.y_slices.iter().find(|s| s.1 < s.0) {
                    return Err(SerialiseError::malformed(Some(tag), format!("slice [{}:{}] runs backwards", bad.0, bad.1)));
                }
                SymbolKind::StateVector { y_slices: attrs.y_slices }
            }
            SymbolShell::InputParameter => SymbolKind::InputParameter {
                expected_size: from_record::<InputParameterAttrs>(tag, record)?.expected_size,
            },
            SymbolShell::Variable => SymbolKind::Variable,
            SymbolShell::Negate => SymbolKind::Negate,
            SymbolShell::AbsoluteValue => SymbolKind::AbsoluteValue,
            SymbolShell::Index => {
                let IndexAttrs { start, stop } = from_record(tag, record)?;
                if stop < start {
                    return Err(SerialiseError::malformed(Some(tag), format!("index [{}:{}] runs backwards", start, stop)));
                }
                SymbolKind::Index { start, stop }
            }
            SymbolShell::Function(f) => SymbolKind::Function(f),
            SymbolShell::Integral => SymbolKind::Integral {
                integration_variable: from_record::<IntegralAttrs>(tag, record)?.integration_variable,
            },
            SymbolShell::ExplicitTimeIntegral => SymbolKind::ExplicitTimeIntegral { initial_condition: None },
            SymbolShell::Binary(op) => SymbolKind::Binary(op),
            SymbolShell::NumpyConcatenation => SymbolKind::Concatenation,
        };

        Ok(Symbol::new(common.name, common.domains, kind, children.into_iter().collect()))
    }
}

impl Symbol {
    /// Attaches a separately rebuilt initial condition. Only explicit time
    /// integrals carry one.
    pub(crate) fn attach_initial_condition(&mut self, ic: Arc<Symbol>) -> Result<(), SerialiseError> {
        match &mut self.kind {
            SymbolKind::ExplicitTimeIntegral { initial_condition } => {
                *initial_condition = Some(ic);
                Ok(())
            }
            _ => Err(SerialiseError::malformed(
                self.shell().ok().map(|s| s.tag()),
                "'initial_condition' on a variant that does not carry one",
            )),
        }
    }
}

// --- Events ---

#[derive(Serialize)]
struct EventOut<'a> {
    name: &'a str,
    event_type: EventType,
}

#[derive(Deserialize)]
struct EventIn {
    name: String,
    event_type: EventType,
}

impl Snapshot for Event {
    type Shell = ();
    type Child = Arc<Symbol>;

    fn shell(&self) -> Result<(), SerialiseError> {
        Ok(())
    }

    fn snapshot(&self) -> Result<AttributeRecord, SerialiseError> {
        to_record(crate::store::registry::EVENT_TAG, &EventOut { name: self.name(), event_type: self.event_type() })
    }

    fn rebuild(_: (), record: &AttributeRecord, children: Vec<Arc<Symbol>>) -> Result<Self, SerialiseError> {
        Arity::Exact(1).check("Event", children.len())?;
        let attrs: EventIn = from_record(crate::store::registry::EVENT_TAG, record)?;
        let mut children = children;
        let expression = children.pop().ok_or_else(|| SerialiseError::malformed(Some("Event"), "missing expression"))?;
        Ok(Event::new(attrs.name, expression, attrs.event_type))
    }
}

// --- Meshes ---

#[derive(Serialize, Deserialize)]
struct LineAttrs {
    #[serde(with = "float::reals")]
    edges: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    npts: Option<usize>,
    coord_sys: CoordSys,
}

impl Snapshot for SubMesh {
    type Shell = SubMeshShell;
    type Child = Infallible;

    fn shell(&self) -> Result<SubMeshShell, SerialiseError> {
        Ok(match self {
            SubMesh::Point(_) => SubMeshShell::Point,
            SubMesh::Line(line) => SubMeshShell::Line(line.spacing),
        })
    }

    fn snapshot(&self) -> Result<AttributeRecord, SerialiseError> {
        let tag = self.shell()?.tag();
        match self {
            SubMesh::Point(point) => to_record(tag, point),
            SubMesh::Line(line) => to_record(
                tag,
                &LineAttrs { edges: line.edges.clone(), npts: Some(line.npts()), coord_sys: line.coord_sys },
            ),
        }
    }

    fn rebuild(shell: SubMeshShell, record: &AttributeRecord, _: Vec<Infallible>) -> Result<Self, SerialiseError> {
        let tag = shell.tag();
        match shell {
            SubMeshShell::Point => Ok(SubMesh::Point(from_record::<SubMesh0D>(tag, record)?)),
            SubMeshShell::Line(spacing) => {
                let attrs: LineAttrs = from_record(tag, record)?;
                let line = SubMesh1D::new(spacing, attrs.edges, attrs.coord_sys)
                    .map_err(|reason| SerialiseError::malformed(Some(tag), reason))?;
                if let Some(npts) = attrs.npts {
                    if npts != line.npts() {
                        return Err(SerialiseError::malformed(
                            Some(tag),
                            format!("npts is {} but the edges describe {} points", npts, line.npts()),
                        ));
                    }
                }
                Ok(SubMesh::Line(line))
            }
        }
    }
}

#[derive(Serialize, Deserialize)]
struct MeshAttrs {
    #[serde(default)]
    base_domains: Vec<String>,
}

impl Snapshot for Mesh {
    type Shell = ();
    /// A primary domain name and its rebuilt sub-mesh.
    type Child = (String, SubMesh);

    fn shell(&self) -> Result<(), SerialiseError> {
        Ok(())
    }

    fn snapshot(&self) -> Result<AttributeRecord, SerialiseError> {
        to_record(crate::store::registry::MESH_TAG, &MeshAttrs { base_domains: self.base_domains().to_vec() })
    }

    fn rebuild(_: (), record: &AttributeRecord, children: Vec<(String, SubMesh)>) -> Result<Self, SerialiseError> {
        let attrs: MeshAttrs = from_record(crate::store::registry::MESH_TAG, record)?;
        let sub_meshes: BTreeMap<String, SubMesh> = children.into_iter().collect();
        let base_domains = if attrs.base_domains.is_empty() {
            sub_meshes.keys().cloned().collect()
        } else {
            attrs.base_domains
        };
        Ok(Mesh::from_parts(base_domains, sub_meshes))
    }
}
