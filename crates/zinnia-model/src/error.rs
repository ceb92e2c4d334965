use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
  #[error("element not found: {0}")]
  ElementNotFound(String),

  #[error("duplicate element id: {0}")]
  DuplicateElement(String),

  #[error("duplicate flow id: {0}")]
  DuplicateFlow(String),

  #[error("flow '{flow_id}' references unknown element: from={from}, to={to}")]
  InvalidFlow {
    flow_id: String,
    from: String,
    to: String,
  },

  #[error("flow '{flow_id}' crosses scope boundaries")]
  FlowCrossesScope { flow_id: String },

  #[error("scope '{scope_id}' must have exactly one none start event, found {found}")]
  StartEventCount { scope_id: String, found: usize },

  #[error("invalid start event '{element_id}': {message}")]
  InvalidStartEvent { element_id: String, message: String },

  #[error("invalid event subprocess '{element_id}': {message}")]
  InvalidEventSubProcess { element_id: String, message: String },

  #[error("invalid boundary event '{element_id}': {message}")]
  InvalidBoundaryEvent { element_id: String, message: String },

  #[error("exclusive gateway '{element_id}' has default flow '{flow_id}' that is not outgoing")]
  InvalidDefaultFlow { element_id: String, flow_id: String },
}
