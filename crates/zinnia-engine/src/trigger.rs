//! Triggers consumed from collaborators.

use serde::{Deserialize, Serialize};

use crate::key::Key;
use crate::variables::Variables;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum Trigger {
  StartInstance {
    definition: DefinitionRef,
    #[serde(default)]
    variables: Variables,
  },
  SequenceFlowTaken {
    flow_id: String,
    scope_key: Key,
  },
  ElementTransitionRequested {
    instance_key: Key,
    target: TransitionTarget,
  },
  ExternalEventOccurred {
    subscription_match: EventMatch,
    #[serde(default)]
    payload: Variables,
  },
  VariableUpdateRequested {
    scope_key: Key,
    semantics: VariableSemantics,
    document: Variables,
  },
  CancelInstance {
    instance_key: Key,
  },
  /// A job worker finished the work of a service task.
  JobCompleted {
    job_key: Key,
    #[serde(default)]
    variables: Variables,
  },
}

impl Trigger {
  pub fn name(&self) -> &'static str {
    match self {
      Trigger::StartInstance { .. } => "start_instance",
      Trigger::SequenceFlowTaken { .. } => "sequence_flow_taken",
      Trigger::ElementTransitionRequested { .. } => "element_transition_requested",
      Trigger::ExternalEventOccurred { .. } => "external_event_occurred",
      Trigger::VariableUpdateRequested { .. } => "variable_update_requested",
      Trigger::CancelInstance { .. } => "cancel_instance",
      Trigger::JobCompleted { .. } => "job_completed",
    }
  }

  /// The key this trigger addresses, when it addresses an existing entity.
  pub fn routing_key(&self) -> Option<Key> {
    match self {
      Trigger::SequenceFlowTaken { scope_key, .. } => Some(*scope_key),
      Trigger::ElementTransitionRequested { instance_key, .. } => Some(*instance_key),
      Trigger::VariableUpdateRequested { scope_key, .. } => Some(*scope_key),
      Trigger::CancelInstance { instance_key } => Some(*instance_key),
      Trigger::JobCompleted { job_key, .. } => Some(*job_key),
      Trigger::StartInstance { .. } | Trigger::ExternalEventOccurred { .. } => None,
    }
  }
}

/// Reference to a deployed process. Without a version the latest one is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionRef {
  pub process_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<u32>,
}

impl DefinitionRef {
  pub fn latest(process_id: impl Into<String>) -> Self {
    Self {
      process_id: process_id.into(),
      version: None,
    }
  }

  pub fn version(process_id: impl Into<String>, version: u32) -> Self {
    Self {
      process_id: process_id.into(),
      version: Some(version),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionTarget {
  Complete,
  Terminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariableSemantics {
  Local,
  Propagate,
}

/// What happened in the outside world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventMatch {
  Message {
    name: String,
    correlation_key: String,
  },
  Signal {
    name: String,
  },
  /// Time has reached `now` (milliseconds on the lane clock).
  Timer {
    now: u64,
  },
}

impl EventMatch {
  pub fn message(name: impl Into<String>, correlation_key: impl Into<String>) -> Self {
    EventMatch::Message {
      name: name.into(),
      correlation_key: correlation_key.into(),
    }
  }

  pub fn signal(name: impl Into<String>) -> Self {
    EventMatch::Signal { name: name.into() }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_deserialize_trigger_list() {
    let triggers: Vec<Trigger> = serde_json::from_value(json!([
      { "trigger": "start_instance", "definition": { "process_id": "order" }, "variables": { "x": 1 } },
      {
        "trigger": "external_event_occurred",
        "subscription_match": { "kind": "message", "name": "cancel", "correlation_key": "42" }
      },
      { "trigger": "variable_update_requested", "scope_key": 7, "semantics": "LOCAL", "document": { "y": 2 } },
      { "trigger": "element_transition_requested", "instance_key": 9, "target": "terminate" }
    ]))
    .unwrap();

    assert_eq!(triggers.len(), 4);
    assert_eq!(
      triggers[0],
      Trigger::StartInstance {
        definition: DefinitionRef::latest("order"),
        variables: json!({ "x": 1 }).as_object().cloned().unwrap(),
      }
    );
    assert_eq!(
      triggers[1],
      Trigger::ExternalEventOccurred {
        subscription_match: EventMatch::message("cancel", "42"),
        payload: Variables::new(),
      }
    );
    assert_eq!(triggers[2].routing_key(), Some(Key::from_raw(7)));
    assert_eq!(triggers[3].name(), "element_transition_requested");
  }
}
