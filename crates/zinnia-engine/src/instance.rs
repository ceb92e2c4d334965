//! Arena of live element instances.
//!
//! Instances are stored by key; the parent/child relation is kept as key
//! references in both directions. An instance is inserted under a parent that
//! is ACTIVATED and removed only after all of its children are gone, so a child
//! never outlives its flow scope.

use std::collections::{BTreeSet, HashMap};

use zinnia_model::{Element, ElementType};

use crate::error::EngineError;
use crate::key::Key;
use crate::lifecycle::LifecycleState;
use crate::variables::Variables;

/// Progress of an interrupting event subprocess within its owning scope.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum InterruptPhase {
  #[default]
  Armed,
  /// Siblings are being terminated; the handler activates once they are gone.
  Triggered {
    handler_id: String,
    payload: Variables,
  },
  ActivatingHandler {
    handler_id: String,
  },
  HandlerActive {
    handler_key: Key,
  },
  ScopeCompleting,
}

impl InterruptPhase {
  /// Whether an interrupt is underway and has not reached its handler yet.
  pub fn in_flight(&self) -> bool {
    matches!(
      self,
      InterruptPhase::Triggered { .. } | InterruptPhase::ActivatingHandler { .. }
    )
  }

  /// Whether a new child `element_id` may be activated in the scope.
  pub fn admits(&self, element_id: &str) -> bool {
    match self {
      InterruptPhase::Armed => true,
      InterruptPhase::ActivatingHandler { handler_id } => handler_id == element_id,
      _ => false,
    }
  }
}

/// Boundary event waiting for its activity to finish terminating.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingBoundary {
  pub boundary_id: String,
  pub payload: Variables,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementInstance {
  pub key: Key,
  pub element_id: String,
  pub element_type: ElementType,
  pub state: LifecycleState,
  pub flow_scope_key: Option<Key>,
  pub process_instance_key: Key,
  pub(crate) children: BTreeSet<Key>,
  /// Activations queued in this scope that have not been processed yet.
  pub(crate) pending_activations: u32,
  pub(crate) interrupt: InterruptPhase,
  pub(crate) boundary_interrupt: Option<PendingBoundary>,
  pub(crate) job_key: Option<Key>,
  /// Outgoing flow chosen by an exclusive gateway.
  pub(crate) selected_flow: Option<String>,
  /// Variables delivered by the event that activated or completed this instance.
  pub(crate) payload: Variables,
}

impl ElementInstance {
  pub fn new(
    key: Key,
    element: &Element,
    flow_scope_key: Option<Key>,
    process_instance_key: Key,
  ) -> Self {
    Self {
      key,
      element_id: element.element_id.clone(),
      element_type: element.element_type(),
      state: LifecycleState::Activating,
      flow_scope_key,
      process_instance_key,
      children: BTreeSet::new(),
      pending_activations: 0,
      interrupt: InterruptPhase::Armed,
      boundary_interrupt: None,
      job_key: None,
      selected_flow: None,
      payload: Variables::new(),
    }
  }

  pub fn children(&self) -> impl Iterator<Item = Key> + '_ {
    self.children.iter().copied()
  }

  pub fn interrupt(&self) -> &InterruptPhase {
    &self.interrupt
  }

  pub fn job_key(&self) -> Option<Key> {
    self.job_key
  }
}

#[derive(Debug, Clone, Default)]
pub struct InstanceTree {
  instances: HashMap<Key, ElementInstance>,
}

impl InstanceTree {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, key: Key) -> Option<&ElementInstance> {
    self.instances.get(&key)
  }

  pub(crate) fn get_mut(&mut self, key: Key) -> Option<&mut ElementInstance> {
    self.instances.get_mut(&key)
  }

  pub fn contains(&self, key: Key) -> bool {
    self.instances.contains_key(&key)
  }

  pub fn len(&self) -> usize {
    self.instances.len()
  }

  pub fn is_empty(&self) -> bool {
    self.instances.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &ElementInstance> {
    self.instances.values()
  }

  /// Direct children of `key`, oldest first.
  pub fn children(&self, key: Key) -> Vec<Key> {
    self
      .instances
      .get(&key)
      .map(|i| i.children.iter().copied().collect())
      .unwrap_or_default()
  }

  /// Live instances of `element_id`, oldest first.
  pub fn by_element(&self, element_id: &str) -> Vec<&ElementInstance> {
    let mut found: Vec<&ElementInstance> = self
      .instances
      .values()
      .filter(|i| i.element_id == element_id)
      .collect();
    found.sort_by_key(|i| i.key);
    found
  }

  pub(crate) fn insert(&mut self, instance: ElementInstance) -> Result<(), EngineError> {
    if self.instances.contains_key(&instance.key) {
      return Err(EngineError::invariant(format!(
        "element instance {} already exists",
        instance.key
      )));
    }

    if let Some(parent_key) = instance.flow_scope_key {
      let parent = self.instances.get_mut(&parent_key).ok_or_else(|| {
        EngineError::invariant(format!(
          "flow scope {} of '{}' does not exist",
          parent_key, instance.element_id
        ))
      })?;
      if parent.state != LifecycleState::Activated {
        return Err(EngineError::invariant(format!(
          "flow scope {} of '{}' is {}",
          parent_key, instance.element_id, parent.state
        )));
      }
      parent.children.insert(instance.key);
    }

    self.instances.insert(instance.key, instance);
    Ok(())
  }

  /// Move `key` to `next`, enforcing the lifecycle table.
  pub(crate) fn transition(
    &mut self,
    key: Key,
    next: LifecycleState,
  ) -> Result<&ElementInstance, EngineError> {
    let instance = self
      .instances
      .get_mut(&key)
      .ok_or_else(|| EngineError::invariant(format!("element instance {} does not exist", key)))?;

    if !instance.state.can_transition_to(next) {
      return Err(EngineError::invariant(format!(
        "illegal transition of {} ('{}') from {} to {}",
        key, instance.element_id, instance.state, next
      )));
    }
    instance.state = next;
    Ok(instance)
  }

  /// Remove a finished instance and unlink it from its parent.
  pub(crate) fn remove(&mut self, key: Key) -> Result<ElementInstance, EngineError> {
    let instance = self
      .instances
      .get(&key)
      .ok_or_else(|| EngineError::invariant(format!("element instance {} does not exist", key)))?;

    if !instance.children.is_empty() {
      return Err(EngineError::invariant(format!(
        "element instance {} ('{}') finished while children {:?} are live",
        key, instance.element_id, instance.children
      )));
    }
    if !instance.state.is_final() {
      return Err(EngineError::invariant(format!(
        "element instance {} removed in state {}",
        key, instance.state
      )));
    }

    let instance = self
      .instances
      .remove(&key)
      .ok_or_else(|| EngineError::invariant(format!("element instance {} vanished", key)))?;
    if let Some(parent) = instance.flow_scope_key.and_then(|p| self.instances.get_mut(&p)) {
      parent.children.remove(&key);
    }
    Ok(instance)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeMap;
  use zinnia_model::ElementKind;

  fn element(id: &str, kind: ElementKind) -> Element {
    Element {
      element_id: id.to_string(),
      kind,
      flow_scope: None,
      inputs: BTreeMap::new(),
      outputs: BTreeMap::new(),
    }
  }

  fn key(raw: u64) -> Key {
    Key::from_raw(raw)
  }

  fn create_tree() -> InstanceTree {
    let mut tree = InstanceTree::new();
    let root = ElementInstance::new(key(1), &element("p", ElementKind::Process), None, key(1));
    tree.insert(root).unwrap();
    tree.transition(key(1), LifecycleState::Activated).unwrap();
    tree
  }

  #[test]
  fn test_insert_links_parent() {
    let mut tree = create_tree();
    let task = ElementInstance::new(key(2), &element("t", ElementKind::Task), Some(key(1)), key(1));

    tree.insert(task).unwrap();

    assert_eq!(tree.children(key(1)), vec![key(2)]);
    assert_eq!(tree.by_element("t")[0].key, key(2));
  }

  #[test]
  fn test_insert_under_inactive_parent_is_invariant_violation() {
    let mut tree = create_tree();
    tree.transition(key(1), LifecycleState::Terminating).unwrap();
    let task = ElementInstance::new(key(2), &element("t", ElementKind::Task), Some(key(1)), key(1));

    let result = tree.insert(task);

    assert!(matches!(result, Err(e) if e.is_invariant_violation()));
  }

  #[test]
  fn test_illegal_transition_is_rejected() {
    let mut tree = create_tree();

    let result = tree.transition(key(1), LifecycleState::Completed);

    assert!(result.is_err());
    assert_eq!(tree.get(key(1)).unwrap().state, LifecycleState::Activated);
  }

  #[test]
  fn test_parent_cannot_be_removed_before_children() {
    let mut tree = create_tree();
    let task = ElementInstance::new(key(2), &element("t", ElementKind::Task), Some(key(1)), key(1));
    tree.insert(task).unwrap();
    tree.transition(key(1), LifecycleState::Terminating).unwrap();
    tree.transition(key(1), LifecycleState::Terminated).unwrap();

    assert!(tree.remove(key(1)).is_err());

    tree.transition(key(2), LifecycleState::Terminating).unwrap();
    tree.transition(key(2), LifecycleState::Terminated).unwrap();
    tree.remove(key(2)).unwrap();
    tree.remove(key(1)).unwrap();

    assert!(tree.is_empty());
  }

  #[test]
  fn test_interrupt_phase_admission() {
    assert!(InterruptPhase::Armed.admits("anything"));
    let activating = InterruptPhase::ActivatingHandler {
      handler_id: "esp".to_string(),
    };
    assert!(activating.admits("esp"));
    assert!(!activating.admits("task"));
    assert!(activating.in_flight());
    assert!(!InterruptPhase::HandlerActive { handler_key: key(9) }.admits("esp"));
  }
}
