use serde::{Deserialize, Serialize};

/// A sequence flow between two elements of the same scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDef {
  pub flow_id: String,
  pub from: String,
  pub to: String,
  /// Condition expression, only evaluated on flows leaving an exclusive gateway.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub condition: Option<String>,
}

impl FlowDef {
  pub fn new(flow_id: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
    Self {
      flow_id: flow_id.into(),
      from: from.into(),
      to: to.into(),
      condition: None,
    }
  }

  /// Attach a condition expression to this flow.
  pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
    self.condition = Some(condition.into());
    self
  }
}
