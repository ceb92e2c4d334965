use serde::{Deserialize, Serialize};

use crate::input::InputValue;

/// The event an element waits for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventDef {
  /// A named message, matched by name and correlation key.
  Message {
    name: String,
    /// Template rendered against the scope variables when the subscription opens.
    correlation_key: InputValue,
  },
  /// Fires once the lane clock reaches `opened_at + duration_ms`.
  Timer { duration_ms: u64 },
  /// A broadcast signal, matched by name only.
  Signal { name: String },
}

impl EventDef {
  pub fn message(name: impl Into<String>, correlation_key: impl Into<String>) -> Self {
    EventDef::Message {
      name: name.into(),
      correlation_key: correlation_key.into(),
    }
  }

  pub fn signal(name: impl Into<String>) -> Self {
    EventDef::Signal { name: name.into() }
  }

  pub fn timer(duration_ms: u64) -> Self {
    EventDef::Timer { duration_ms }
  }
}
