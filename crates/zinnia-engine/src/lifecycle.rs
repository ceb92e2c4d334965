//! Element instance lifecycle.
//!
//! ```text
//! ACTIVATING ──► ACTIVATED ──► COMPLETING ──► COMPLETED
//!      │             │              │
//!      └─────────────┴──────────────┴──► TERMINATING ──► TERMINATED
//! ```
//!
//! The transition table and the "does this record end a key's life" predicate
//! live here, next to each other, as pure functions.

use std::fmt;

use serde::{Deserialize, Serialize};
use zinnia_model::ElementType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
  Activating,
  Activated,
  Completing,
  Completed,
  Terminating,
  Terminated,
}

impl LifecycleState {
  pub fn can_transition_to(self, next: LifecycleState) -> bool {
    use LifecycleState::*;
    matches!(
      (self, next),
      (Activating, Activated)
        | (Activated, Completing)
        | (Completing, Completed)
        | (Activating | Activated | Completing, Terminating)
        | (Terminating, Terminated)
    )
  }

  /// Final states remove the instance from the live tree.
  pub fn is_final(self) -> bool {
    matches!(self, LifecycleState::Completed | LifecycleState::Terminated)
  }

  /// Transient states run side effects and advance within the same command.
  pub fn is_transient(self) -> bool {
    matches!(self, LifecycleState::Activating | LifecycleState::Terminating)
  }

  pub fn intent(self) -> Intent {
    match self {
      LifecycleState::Activating => Intent::ElementActivating,
      LifecycleState::Activated => Intent::ElementActivated,
      LifecycleState::Completing => Intent::ElementCompleting,
      LifecycleState::Completed => Intent::ElementCompleted,
      LifecycleState::Terminating => Intent::ElementTerminating,
      LifecycleState::Terminated => Intent::ElementTerminated,
    }
  }
}

impl fmt::Display for LifecycleState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(&self.intent(), f)
  }
}

/// What a process-instance record says happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
  ElementActivating,
  ElementActivated,
  ElementCompleting,
  ElementCompleted,
  ElementTerminating,
  ElementTerminated,
  SequenceFlowTaken,
  EventOccurred,
}

impl Intent {
  /// The lifecycle state this intent records, if it is an element transition.
  pub fn state(self) -> Option<LifecycleState> {
    match self {
      Intent::ElementActivating => Some(LifecycleState::Activating),
      Intent::ElementActivated => Some(LifecycleState::Activated),
      Intent::ElementCompleting => Some(LifecycleState::Completing),
      Intent::ElementCompleted => Some(LifecycleState::Completed),
      Intent::ElementTerminating => Some(LifecycleState::Terminating),
      Intent::ElementTerminated => Some(LifecycleState::Terminated),
      Intent::SequenceFlowTaken | Intent::EventOccurred => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Intent::ElementActivating => "ELEMENT_ACTIVATING",
      Intent::ElementActivated => "ELEMENT_ACTIVATED",
      Intent::ElementCompleting => "ELEMENT_COMPLETING",
      Intent::ElementCompleted => "ELEMENT_COMPLETED",
      Intent::ElementTerminating => "ELEMENT_TERMINATING",
      Intent::ElementTerminated => "ELEMENT_TERMINATED",
      Intent::SequenceFlowTaken => "SEQUENCE_FLOW_TAKEN",
      Intent::EventOccurred => "EVENT_OCCURRED",
    }
  }
}

impl fmt::Display for Intent {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Whether a record with this type and intent ends the life of its key.
pub fn is_terminal_record(element_type: ElementType, intent: Intent) -> bool {
  match element_type {
    ElementType::SequenceFlow => intent == Intent::SequenceFlowTaken,
    _ => intent.state().is_some_and(LifecycleState::is_final),
  }
}
