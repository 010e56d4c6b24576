//! The model-level snapshot: one persisted document per discretised model.

use crate::analysis::sharing::SharingReport;
use crate::codec::{float, release, Decoder, Encoder, SerialiseError};
use crate::store::{Mesh, Model, ModelKind, ModelParts, Symbol, TypeRegistry};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Lower and upper state bounds, persisted as a two-element array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bounds(#[serde(with = "float::reals")] pub Vec<f64>, #[serde(with = "float::reals")] pub Vec<f64>);

/// The persisted form of a model. Expression fields hold encoded node records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub name: String,
    #[serde(default)]
    pub options: Value,
    pub bounds: Bounds,
    #[serde(alias = "concatenated_rhs")]
    pub rhs: Value,
    #[serde(alias = "concatenated_algebraic")]
    pub algebraic: Value,
    #[serde(alias = "concatenated_initial_conditions")]
    pub initial_conditions: Value,
    pub events: Vec<Value>,
    pub mass_matrix: Value,
    pub mass_matrix_inv: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<BTreeMap<String, Value>>,
}

// Record trees nest as deeply as the expressions they encode.
impl Drop for ModelSnapshot {
    fn drop(&mut self) {
        let trees = [
            std::mem::take(&mut self.rhs),
            std::mem::take(&mut self.algebraic),
            std::mem::take(&mut self.initial_conditions),
            std::mem::take(&mut self.mass_matrix),
            std::mem::take(&mut self.mass_matrix_inv),
        ];
        trees.into_iter().for_each(release);
        self.events.drain(..).for_each(release);
        self.mesh.take().into_iter().for_each(release);
        if let Some(vars) = self.variables.take() {
            vars.into_values().for_each(release);
        }
    }
}

/// Takes a snapshot of a discretised model.
///
/// The mesh and variables are only needed for plotting and diagnostics, so both
/// are optional. Geometry travels with the variables, and an empty variables
/// mapping is treated as no mapping at all.
#[instrument(skip_all, fields(model = %model.name))]
pub fn save(
    model: &Model,
    mesh: Option<&Mesh>,
    variables: Option<&BTreeMap<String, Arc<Symbol>>>,
) -> Result<ModelSnapshot, SerialiseError> {
    if !model.is_discretised {
        return Err(SerialiseError::NotDiscretised { model: model.name.clone() });
    }

    // An empty mapping counts as absent.
    let variables = variables.filter(|vars| !vars.is_empty());
    let mut encoder = Encoder::new();
    // Filled in field by field so that a failure part-way releases what was
    // already encoded through the snapshot's own teardown.
    let mut snapshot = ModelSnapshot {
        type_tag: Some(model.kind.tag().to_string()),
        id: Some(encoder.take_id()),
        name: model.name.clone(),
        options: model.options.clone(),
        bounds: Bounds(model.bounds.0.clone(), model.bounds.1.clone()),
        rhs: Value::Null,
        algebraic: Value::Null,
        initial_conditions: Value::Null,
        events: Vec::with_capacity(model.events.len()),
        mass_matrix: Value::Null,
        mass_matrix_inv: Value::Null,
        mesh: None,
        geometry: None,
        variables: None,
    };
    snapshot.rhs = encoder.encode_symbol(&model.concatenated_rhs)?;
    snapshot.algebraic = encoder.encode_symbol(&model.concatenated_algebraic)?;
    snapshot.initial_conditions = encoder.encode_symbol(&model.concatenated_initial_conditions)?;
    for event in &model.events {
        snapshot.events.push(encoder.encode_event(event)?);
    }
    snapshot.mass_matrix = encoder.encode_symbol(&model.mass_matrix)?;
    snapshot.mass_matrix_inv = encoder.encode_symbol(&model.mass_matrix_inv)?;
    if let Some(mesh) = mesh {
        snapshot.mesh = Some(encoder.encode_mesh(mesh)?);
    }
    if let Some(vars) = variables {
        let encoded = snapshot.variables.insert(BTreeMap::new());
        for (name, tree) in vars {
            encoded.insert(name.clone(), encoder.encode_symbol(tree)?);
        }
        snapshot.geometry = model.geometry.clone();
    }

    if tracing::enabled!(tracing::Level::DEBUG) {
        let trees = model
            .required_trees()
            .into_iter()
            .map(|(_, tree)| tree.as_ref())
            .chain(model.events.iter().map(|e| e.expression().as_ref()))
            .chain(variables.into_iter().flat_map(|vars| vars.values().map(|tree| tree.as_ref())));
        let report = SharingReport::of(trees);
        debug!(
            unique = report.unique_nodes,
            unfolded = report.unfolded_nodes,
            factor = report.duplication_factor(),
            "shared sub-expressions unfolded"
        );
    }
    debug!(records = encoder.records_written(), events = snapshot.events.len(), "model encoded");
    Ok(snapshot)
}

/// Rebuilds a live model from a snapshot.
///
/// An explicit `target` wins over the type tag stored in the snapshot. With
/// neither, loading fails with `MissingTarget`.
#[instrument(skip_all, fields(model = %snapshot.name))]
pub fn load(snapshot: &ModelSnapshot, target: Option<ModelKind>) -> Result<Model, SerialiseError> {
    let registry = TypeRegistry::global();
    let kind = match (target, snapshot.type_tag.as_deref()) {
        (Some(kind), _) => kind,
        (None, Some(tag)) => registry.resolve_model(tag)?,
        (None, None) => return Err(SerialiseError::MissingTarget),
    };

    let decoder = Decoder::with_registry(registry);
    let events = snapshot.events.iter().map(|e| decoder.decode_event(e)).collect::<Result<Vec<_>, _>>()?;
    let mesh = snapshot.mesh.as_ref().map(|m| decoder.decode_mesh(m)).transpose()?;
    // Variables are independent trees; the registry is only read.
    let variables = snapshot
        .variables
        .as_ref()
        .map(|vars| {
            vars.par_iter()
                .map(|(name, tree)| Ok((name.clone(), decoder.decode_symbol(tree)?)))
                .collect::<Result<BTreeMap<_, _>, SerialiseError>>()
        })
        .transpose()?;

    let parts = ModelParts {
        name: snapshot.name.clone(),
        options: snapshot.options.clone(),
        bounds: (snapshot.bounds.0.clone(), snapshot.bounds.1.clone()),
        concatenated_rhs: decoder.decode_symbol(&snapshot.rhs)?,
        concatenated_algebraic: decoder.decode_symbol(&snapshot.algebraic)?,
        concatenated_initial_conditions: decoder.decode_symbol(&snapshot.initial_conditions)?,
        events,
        mass_matrix: decoder.decode_symbol(&snapshot.mass_matrix)?,
        mass_matrix_inv: decoder.decode_symbol(&snapshot.mass_matrix_inv)?,
        geometry: snapshot.geometry.clone(),
        mesh,
        variables,
    };
    debug!(kind = kind.tag(), events = parts.events.len(), "model decoded");
    kind.deserialise(parts)
}
