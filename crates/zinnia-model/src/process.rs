use std::collections::HashMap;

use zinnia_config::ProcessDef;

use crate::build;
use crate::element::{Element, ElementKind, SequenceFlow};
use crate::error::ModelError;
use crate::graph::Graph;

/// A validated process ready for execution.
#[derive(Debug, Clone)]
pub struct ExecutableProcess {
  pub process_id: String,
  pub name: String,
  pub version: u32,
  pub(crate) elements: HashMap<String, Element>,
  pub(crate) flows: HashMap<String, SequenceFlow>,
  pub(crate) graph: Graph,
}

impl ExecutableProcess {
  /// Validate and flatten a process definition.
  pub fn from_def(def: ProcessDef) -> Result<Self, ModelError> {
    build::build(def)
  }

  /// The process element itself. Its id is the process id.
  pub fn root(&self) -> Result<&Element, ModelError> {
    self.element(&self.process_id)
  }

  /// Get an element by ID.
  pub fn element(&self, element_id: &str) -> Result<&Element, ModelError> {
    self
      .elements
      .get(element_id)
      .ok_or_else(|| ModelError::ElementNotFound(element_id.to_string()))
  }

  pub fn flow(&self, flow_id: &str) -> Option<&SequenceFlow> {
    self.flows.get(flow_id)
  }

  pub fn graph(&self) -> &Graph {
    &self.graph
  }

  pub fn element_count(&self) -> usize {
    self.elements.len()
  }

  /// The start event a scope begins with when activated normally.
  pub fn none_start_event(&self, scope_id: &str) -> Option<&Element> {
    self
      .graph
      .start_events(scope_id)
      .iter()
      .filter_map(|id| self.elements.get(id))
      .find(|e| matches!(e.kind, ElementKind::StartEvent { event: None, .. }))
  }

  /// The event start of an event subprocess.
  pub fn event_start(&self, event_sub_process_id: &str) -> Option<&Element> {
    self
      .graph
      .start_events(event_sub_process_id)
      .iter()
      .filter_map(|id| self.elements.get(id))
      .find(|e| e.event().is_some())
  }

  /// Event subprocess start events watched while `scope_id` is active.
  pub fn event_sub_process_starts(&self, scope_id: &str) -> Vec<&Element> {
    self
      .graph
      .event_sub_processes(scope_id)
      .iter()
      .filter_map(|id| self.event_start(id))
      .collect()
  }

  pub fn boundary_events(&self, activity_id: &str) -> Vec<&Element> {
    self
      .graph
      .boundary_events(activity_id)
      .iter()
      .filter_map(|id| self.elements.get(id))
      .collect()
  }
}
