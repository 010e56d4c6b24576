//! The model collaborator: the discretised equations a snapshot is taken of.
use super::event::Event;
use super::mesh::Mesh;
use super::types::Symbol;
use crate::codec::SerialiseError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The concrete model shapes a snapshot can be loaded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    BaseModel,
    /// Single particle model.
    Spm,
    /// Single particle model with electrolyte.
    Spme,
    /// Doyle-Fuller-Newman model.
    Dfn,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [ModelKind::BaseModel, ModelKind::Spm, ModelKind::Spme, ModelKind::Dfn];

    pub fn tag(self) -> &'static str {
        match self {
            ModelKind::BaseModel => "models.base_model.BaseModel",
            ModelKind::Spm => "models.full_battery_models.lithium_ion.spm.SPM",
            ModelKind::Spme => "models.full_battery_models.lithium_ion.spme.SPMe",
            ModelKind::Dfn => "models.full_battery_models.lithium_ion.dfn.DFN",
        }
    }

    fn is_battery_model(self) -> bool {
        !matches!(self, ModelKind::BaseModel)
    }

    /// Builds a live, discretised model of this kind from reconstructed parts.
    pub fn deserialise(self, mut parts: ModelParts) -> Result<Model, SerialiseError> {
        if parts.bounds.0.len() != parts.bounds.1.len() {
            return Err(SerialiseError::malformed(
                Some(self.tag()),
                format!(
                    "lower and upper bounds differ in length ({} vs {})",
                    parts.bounds.0.len(),
                    parts.bounds.1.len()
                ),
            ));
        }
        match &parts.options {
            Value::Object(_) => {}
            Value::Null => parts.options = Value::Object(Default::default()),
            other if self.is_battery_model() => {
                return Err(SerialiseError::malformed(
                    Some(self.tag()),
                    format!("battery model options must be a mapping, got {}", other),
                ));
            }
            _ => {}
        }
        Ok(Model::from_parts(self, parts, true))
    }
}

/// The field set a model is assembled from.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParts {
    pub name: String,
    /// Opaque configuration, persisted verbatim.
    pub options: Value,
    pub bounds: (Vec<f64>, Vec<f64>),
    pub concatenated_rhs: Arc<Symbol>,
    pub concatenated_algebraic: Arc<Symbol>,
    pub concatenated_initial_conditions: Arc<Symbol>,
    pub events: Vec<Event>,
    pub mass_matrix: Arc<Symbol>,
    pub mass_matrix_inv: Arc<Symbol>,
    pub geometry: Option<Value>,
    pub mesh: Option<Mesh>,
    pub variables: Option<BTreeMap<String, Arc<Symbol>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub kind: ModelKind,
    pub is_discretised: bool,
    pub name: String,
    pub options: Value,
    pub bounds: (Vec<f64>, Vec<f64>),
    pub concatenated_rhs: Arc<Symbol>,
    pub concatenated_algebraic: Arc<Symbol>,
    pub concatenated_initial_conditions: Arc<Symbol>,
    pub events: Vec<Event>,
    pub mass_matrix: Arc<Symbol>,
    pub mass_matrix_inv: Arc<Symbol>,
    pub geometry: Option<Value>,
    pub mesh: Option<Mesh>,
    pub variables: Option<BTreeMap<String, Arc<Symbol>>>,
}

impl Model {
    /// A model whose equations have been through discretisation.
    pub fn discretised(kind: ModelKind, parts: ModelParts) -> Self {
        Self::from_parts(kind, parts, true)
    }

    /// A model that still holds continuous operators.
    pub fn undiscretised(kind: ModelKind, parts: ModelParts) -> Self {
        Self::from_parts(kind, parts, false)
    }

    fn from_parts(kind: ModelKind, parts: ModelParts, is_discretised: bool) -> Self {
        Self {
            kind,
            is_discretised,
            name: parts.name,
            options: parts.options,
            bounds: parts.bounds,
            concatenated_rhs: parts.concatenated_rhs,
            concatenated_algebraic: parts.concatenated_algebraic,
            concatenated_initial_conditions: parts.concatenated_initial_conditions,
            events: parts.events,
            mass_matrix: parts.mass_matrix,
            mass_matrix_inv: parts.mass_matrix_inv,
            geometry: parts.geometry,
            mesh: parts.mesh,
            variables: parts.variables,
        }
    }

    /// The three required trees plus both mass matrices, labelled by field name.
    pub fn required_trees(&self) -> [(&'static str, &Arc<Symbol>); 5] {
        [
            ("rhs", &self.concatenated_rhs),
            ("algebraic", &self.concatenated_algebraic),
            ("initial_conditions", &self.concatenated_initial_conditions),
            ("mass_matrix", &self.mass_matrix),
            ("mass_matrix_inv", &self.mass_matrix_inv),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(options: Value) -> ModelParts {
        ModelParts {
            name: "toy".into(),
            options,
            bounds: (vec![f64::NEG_INFINITY], vec![f64::INFINITY]),
            concatenated_rhs: Symbol::scalar(0.0),
            concatenated_algebraic: Symbol::vector(vec![]),
            concatenated_initial_conditions: Symbol::scalar(1.0),
            events: vec![],
            mass_matrix: Symbol::scalar(1.0),
            mass_matrix_inv: Symbol::scalar(1.0),
            geometry: None,
            mesh: None,
            variables: None,
        }
    }

    #[test]
    fn test_deserialise_marks_model_discretised() {
        let model = ModelKind::Spm.deserialise(parts(Value::Null)).unwrap();
        assert!(model.is_discretised);
        assert_eq!(model.kind, ModelKind::Spm);
        assert_eq!(model.options, Value::Object(Default::default()));
    }

    #[test]
    fn test_battery_models_need_mapping_options() {
        let err = ModelKind::Dfn.deserialise(parts(Value::from("fast"))).unwrap_err();
        assert!(matches!(err, SerialiseError::MalformedRecord { .. }));
        assert!(ModelKind::BaseModel.deserialise(parts(Value::from("fast"))).is_ok());
    }

    #[test]
    fn test_bounds_lengths_must_agree() {
        let mut p = parts(Value::Null);
        p.bounds.1.push(0.0);
        assert!(ModelKind::BaseModel.deserialise(p).is_err());
    }
}
