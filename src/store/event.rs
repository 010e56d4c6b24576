//! Discrete events attached to a model.
use super::types::Symbol;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What happens when an event's expression crosses zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Stops the integration.
    Termination,
    /// Restarts the integrator at a known discontinuity.
    Discontinuity,
    /// Guards an interpolant against extrapolation.
    InterpolantExtrapolation,
    Switch,
}

/// A named trigger condition. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    name: String,
    expression: Arc<Symbol>,
    event_type: EventType,
}

impl Event {
    pub fn new(name: impl Into<String>, expression: Arc<Symbol>, event_type: EventType) -> Self {
        Self { name: name.into(), expression, event_type }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expression(&self) -> &Arc<Symbol> {
        &self.expression
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }
}
