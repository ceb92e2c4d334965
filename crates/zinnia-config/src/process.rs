use serde::{Deserialize, Serialize};

use crate::element::ElementDef;
use crate::flow::FlowDef;

/// A process definition as authored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDef {
  pub process_id: String,
  pub name: String,
  #[serde(default = "default_version")]
  pub version: u32,
  pub elements: Vec<ElementDef>,
  #[serde(default)]
  pub flows: Vec<FlowDef>,
}

fn default_version() -> u32 {
  1
}

impl ProcessDef {
  /// Find a top-level element by id.
  pub fn element(&self, element_id: &str) -> Option<&ElementDef> {
    self.elements.iter().find(|e| e.element_id == element_id)
  }
}
