use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use zinnia_config::EventDef;

/// Closed set of element types the engine knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElementType {
  Process,
  SubProcess,
  EventSubProcess,
  StartEvent,
  EndEvent,
  Task,
  ServiceTask,
  IntermediateCatchEvent,
  BoundaryEvent,
  ParallelGateway,
  ExclusiveGateway,
  SequenceFlow,
}

impl ElementType {
  /// Scopes own child element instances.
  pub fn is_scope(self) -> bool {
    matches!(
      self,
      ElementType::Process | ElementType::SubProcess | ElementType::EventSubProcess
    )
  }

  /// Activities can carry boundary events.
  pub fn is_activity(self) -> bool {
    matches!(
      self,
      ElementType::Task | ElementType::ServiceTask | ElementType::SubProcess
    )
  }

  pub fn as_str(self) -> &'static str {
    match self {
      ElementType::Process => "PROCESS",
      ElementType::SubProcess => "SUB_PROCESS",
      ElementType::EventSubProcess => "EVENT_SUB_PROCESS",
      ElementType::StartEvent => "START_EVENT",
      ElementType::EndEvent => "END_EVENT",
      ElementType::Task => "TASK",
      ElementType::ServiceTask => "SERVICE_TASK",
      ElementType::IntermediateCatchEvent => "INTERMEDIATE_CATCH_EVENT",
      ElementType::BoundaryEvent => "BOUNDARY_EVENT",
      ElementType::ParallelGateway => "PARALLEL_GATEWAY",
      ElementType::ExclusiveGateway => "EXCLUSIVE_GATEWAY",
      ElementType::SequenceFlow => "SEQUENCE_FLOW",
    }
  }
}

impl fmt::Display for ElementType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Type-specific data of an executable element.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
  Process,
  SubProcess,
  EventSubProcess,
  StartEvent {
    event: Option<EventDef>,
    interrupting: bool,
  },
  EndEvent,
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
    cancel_activity: bool,
  },
  ParallelGateway,
  ExclusiveGateway {
    default_flow: Option<String>,
  },
}

/// An element of the flattened process graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
  pub element_id: String,
  pub kind: ElementKind,
  /// Id of the enclosing scope element. `None` only for the process itself.
  pub flow_scope: Option<String>,
  pub inputs: BTreeMap<String, String>,
  pub outputs: BTreeMap<String, String>,
}

impl Element {
  pub fn element_type(&self) -> ElementType {
    match self.kind {
      ElementKind::Process => ElementType::Process,
      ElementKind::SubProcess => ElementType::SubProcess,
      ElementKind::EventSubProcess => ElementType::EventSubProcess,
      ElementKind::StartEvent { .. } => ElementType::StartEvent,
      ElementKind::EndEvent => ElementType::EndEvent,
      ElementKind::Task => ElementType::Task,
      ElementKind::ServiceTask { .. } => ElementType::ServiceTask,
      ElementKind::IntermediateCatchEvent { .. } => ElementType::IntermediateCatchEvent,
      ElementKind::BoundaryEvent { .. } => ElementType::BoundaryEvent,
      ElementKind::ParallelGateway => ElementType::ParallelGateway,
      ElementKind::ExclusiveGateway { .. } => ElementType::ExclusiveGateway,
    }
  }

  /// The event this element waits for, if any.
  pub fn event(&self) -> Option<&EventDef> {
    match &self.kind {
      ElementKind::StartEvent { event, .. } => event.as_ref(),
      ElementKind::IntermediateCatchEvent { event } => Some(event),
      ElementKind::BoundaryEvent { event, .. } => Some(event),
      _ => None,
    }
  }

  /// Whether triggering this element's event interrupts the owning scope.
  pub fn is_interrupting(&self) -> bool {
    match &self.kind {
      ElementKind::StartEvent { interrupting, .. } => *interrupting,
      ElementKind::BoundaryEvent {
        cancel_activity, ..
      } => *cancel_activity,
      _ => false,
    }
  }
}

/// A validated sequence flow.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceFlow {
  pub flow_id: String,
  pub source: String,
  pub target: String,
  pub condition: Option<String>,
  pub flow_scope: String,
}
