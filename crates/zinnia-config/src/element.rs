use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::event::EventDef;
use crate::flow::FlowDef;
use crate::input::InputValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDef {
  pub element_id: String,
  #[serde(flatten)]
  pub kind: ElementKind,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub inputs: BTreeMap<String, InputValue>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub outputs: BTreeMap<String, InputValue>,
}

impl ElementDef {
  pub fn new(element_id: impl Into<String>, kind: ElementKind) -> Self {
    Self {
      element_id: element_id.into(),
      kind,
      inputs: BTreeMap::new(),
      outputs: BTreeMap::new(),
    }
  }

  /// Add an input mapping, evaluated when the element activates.
  pub fn with_input(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
    self.inputs.insert(name.into(), expression.into());
    self
  }

  /// Add an output mapping, evaluated when the element completes.
  pub fn with_output(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
    self.outputs.insert(name.into(), expression.into());
    self
  }
}

fn default_true() -> bool {
  true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementKind {
  /// Without an event this is the none-start of its scope. With an event it
  /// may only appear inside an event subprocess.
  StartEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    event: Option<EventDef>,
    #[serde(default = "default_true")]
    interrupting: bool,
  },
  EndEvent,
  /// An activity with no external work; completes as soon as it is activated.
  Task,
  ServiceTask {
    job_type: String,
  },
  IntermediateCatchEvent {
    event: EventDef,
  },
  BoundaryEvent {
    attached_to: String,
    event: EventDef,
    #[serde(default = "default_true")]
    cancel_activity: bool,
  },
  ParallelGateway,
  ExclusiveGateway {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_flow: Option<String>,
  },
  SubProcess {
    elements: Vec<ElementDef>,
    #[serde(default)]
    flows: Vec<FlowDef>,
  },
  EventSubProcess {
    elements: Vec<ElementDef>,
    #[serde(default)]
    flows: Vec<FlowDef>,
  },
}
