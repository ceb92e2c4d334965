//! Engine error types.

use zinnia_model::ModelError;

use crate::key::Key;
use crate::lifecycle::LifecycleState;

/// Errors that can occur while processing a trigger.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  /// The operation references a scope that does not exist or is not live.
  #[error("invalid scope: {key} is not a live scope")]
  InvalidScope { key: Key },

  /// The requested transition is not allowed from the current state.
  #[error("invalid state: cannot {action} element instance {key} in state {state}")]
  InvalidState {
    key: Key,
    state: LifecycleState,
    action: &'static str,
  },

  /// A subscription for the same (scope, handler) pair is already open.
  #[error("duplicate subscription for '{handler_element_id}' in scope {scope_key}")]
  DuplicateSubscription {
    scope_key: Key,
    handler_element_id: String,
  },

  /// Another interrupt of the same scope is already in flight.
  #[error("interrupt of scope {scope_key} rejected: another interrupt is in flight")]
  ConcurrentInterruptRejected { scope_key: Key },

  #[error("process definition not found: {process_id} (version {version:?})")]
  DefinitionNotFound {
    process_id: String,
    version: Option<u32>,
  },

  #[error("job not found: {0}")]
  JobNotFound(Key),

  #[error("flow '{flow_id}' cannot be taken in scope {scope_key}")]
  UnknownFlow { flow_id: String, scope_key: Key },

  /// A mapping, condition or correlation key failed to evaluate.
  #[error("expression failed for element '{element_id}': {message}")]
  Expression { element_id: String, message: String },

  /// No outgoing flow of an exclusive gateway could be taken.
  #[error("no outgoing flow of '{element_id}' can be taken")]
  NoFlowSelected { element_id: String },

  /// The instance was flagged after an invariant violation and rejects further work.
  #[error("process instance {0} is banned")]
  InstanceBanned(Key),

  /// The scope tree is inconsistent. Processing of the instance stops.
  #[error("invariant violated: {message}")]
  InvariantViolation { message: String },

  /// The partition id does not fit into the bits keys reserve for it.
  #[error("partition id {partition_id} is out of range (1..={max})")]
  PartitionOutOfRange { partition_id: u16, max: u16 },

  #[error("trigger channel closed")]
  ChannelClosed,

  #[error(transparent)]
  Model(#[from] ModelError),
}

impl EngineError {
  pub fn invariant(message: impl Into<String>) -> Self {
    EngineError::InvariantViolation {
      message: message.into(),
    }
  }

  pub fn expression(element_id: &str, message: impl Into<String>) -> Self {
    EngineError::Expression {
      element_id: element_id.to_string(),
      message: message.into(),
    }
  }

  /// Failures caused by model or data rather than by the engine. They become
  /// incidents on the element instead of failing the trigger.
  pub fn is_incident(&self) -> bool {
    matches!(
      self,
      EngineError::Expression { .. } | EngineError::NoFlowSelected { .. }
    )
  }

  /// Errors that flag the instance for operator inspection.
  pub fn is_invariant_violation(&self) -> bool {
    matches!(
      self,
      EngineError::InvariantViolation { .. } | EngineError::Model(_)
    )
  }
}
