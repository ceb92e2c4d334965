//! Expression evaluation using minijinja.
//!
//! Mappings and flow conditions are minijinja expressions evaluated against the
//! variables visible from a scope:
//! ```json
//! { "total": "price * quantity", "approved": "score > 700" }
//! ```
//!
//! Correlation keys are templates rendered to a string:
//! ```json
//! { "correlation_key": "{{ order_id }}" }
//! ```

use std::collections::BTreeMap;

use minijinja::{Environment, Value};

use crate::error::EngineError;
use crate::variables::Variables;

/// Evaluate a single expression to a JSON value.
pub fn evaluate(
  env: &Environment<'_>,
  element_id: &str,
  expression: &str,
  context: &Variables,
) -> Result<serde_json::Value, EngineError> {
  let compiled = env
    .compile_expression(expression)
    .map_err(|e| EngineError::expression(element_id, format!("invalid expression '{}': {}", expression, e)))?;

  let value = compiled
    .eval(Value::from_serialize(context))
    .map_err(|e| EngineError::expression(element_id, format!("failed to evaluate '{}': {}", expression, e)))?;

  serde_json::to_value(&value)
    .map_err(|e| EngineError::expression(element_id, format!("'{}' is not representable as JSON: {}", expression, e)))
}

/// Evaluate a flow condition. Undefined names are falsy.
pub fn evaluate_condition(
  env: &Environment<'_>,
  element_id: &str,
  condition: &str,
  context: &Variables,
) -> Result<bool, EngineError> {
  let compiled = env
    .compile_expression(condition)
    .map_err(|e| EngineError::expression(element_id, format!("invalid condition '{}': {}", condition, e)))?;

  compiled
    .eval(Value::from_serialize(context))
    .map(|value| value.is_true())
    .map_err(|e| EngineError::expression(element_id, format!("failed to evaluate '{}': {}", condition, e)))
}

/// Evaluate every mapping of an element, in name order.
pub fn evaluate_mappings(
  env: &Environment<'_>,
  element_id: &str,
  mappings: &BTreeMap<String, String>,
  context: &Variables,
) -> Result<Vec<(String, serde_json::Value)>, EngineError> {
  mappings
    .iter()
    .map(|(name, expression)| {
      evaluate(env, element_id, expression, context).map(|value| (name.clone(), value))
    })
    .collect()
}

/// Render a template (e.g. a correlation key) to a string.
pub fn render(
  env: &Environment<'_>,
  element_id: &str,
  template: &str,
  context: &Variables,
) -> Result<String, EngineError> {
  env
    .render_str(template, Value::from_serialize(context))
    .map_err(|e| EngineError::expression(element_id, format!("failed to render '{}': {}", template, e)))
}
