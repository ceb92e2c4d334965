//! Hierarchical variable store.
//!
//! Every element instance owns a variable scope whose parent is the scope of
//! its flow scope. Reads walk from a scope towards the root and return the
//! nearest value. Writes are local unless propagating semantics are requested,
//! in which case they land on the nearest scope that declared the name (through
//! an input mapping) or already holds it, falling back to the scope itself.
//!
//! The store is a plain data structure: it reports what changed and leaves
//! record emission to the caller.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::Value;

use crate::error::EngineError;
use crate::key::Key;
use crate::record::VariableIntent;

/// A variable document: name -> JSON value.
pub type Variables = serde_json::Map<String, Value>;

/// A single write that changed the store.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableChange {
  pub scope_key: Key,
  pub name: String,
  pub value: Value,
  pub intent: VariableIntent,
}

#[derive(Debug, Clone, Default)]
struct Scope {
  parent: Option<Key>,
  values: BTreeMap<String, Value>,
  declared: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct VariableStore {
  scopes: HashMap<Key, Scope>,
}

impl VariableStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn create_scope(&mut self, scope_key: Key, parent: Option<Key>) {
    self.scopes.entry(scope_key).or_insert_with(|| Scope {
      parent,
      ..Scope::default()
    });
  }

  pub fn contains_scope(&self, scope_key: Key) -> bool {
    self.scopes.contains_key(&scope_key)
  }

  /// Write `name` into `scope_key` itself.
  pub fn set_local(
    &mut self,
    scope_key: Key,
    name: &str,
    value: Value,
  ) -> Result<Option<VariableChange>, EngineError> {
    let scope = self
      .scopes
      .get_mut(&scope_key)
      .ok_or(EngineError::InvalidScope { key: scope_key })?;

    let intent = match scope.values.get(name) {
      Some(existing) if *existing == value => return Ok(None),
      Some(_) => VariableIntent::Updated,
      None => VariableIntent::Created,
    };
    scope.values.insert(name.to_string(), value.clone());

    Ok(Some(VariableChange {
      scope_key,
      name: name.to_string(),
      value,
      intent,
    }))
  }

  /// Write a local variable that came from an input mapping. Propagating writes
  /// from descendants stop at this scope for `name`.
  pub fn declare(
    &mut self,
    scope_key: Key,
    name: &str,
    value: Value,
  ) -> Result<Option<VariableChange>, EngineError> {
    let change = self.set_local(scope_key, name, value)?;
    if let Some(scope) = self.scopes.get_mut(&scope_key) {
      scope.declared.insert(name.to_string());
    }
    Ok(change)
  }

  /// Write `name` into the nearest scope (starting at `scope_key`) that
  /// declared or holds it, or into `scope_key` if none does.
  pub fn set_propagating(
    &mut self,
    scope_key: Key,
    name: &str,
    value: Value,
  ) -> Result<Option<VariableChange>, EngineError> {
    if !self.contains_scope(scope_key) {
      return Err(EngineError::InvalidScope { key: scope_key });
    }

    let target = self
      .ancestors(scope_key)
      .find(|key| {
        self
          .scopes
          .get(key)
          .is_some_and(|s| s.declared.contains(name) || s.values.contains_key(name))
      })
      .unwrap_or(scope_key);

    self.set_local(target, name, value)
  }

  /// Nearest visible value of `name`, walking from `scope_key` to the root.
  pub fn get(&self, scope_key: Key, name: &str) -> Option<&Value> {
    self
      .ancestors(scope_key)
      .find_map(|key| self.scopes.get(&key).and_then(|s| s.values.get(name)))
  }

  pub fn get_local(&self, scope_key: Key, name: &str) -> Option<&Value> {
    self.scopes.get(&scope_key).and_then(|s| s.values.get(name))
  }

  /// Variables owned by `scope_key` only.
  pub fn local_variables(&self, scope_key: Key) -> Variables {
    self
      .scopes
      .get(&scope_key)
      .map(|s| s.values.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
      .unwrap_or_default()
  }

  /// Everything visible from `scope_key`, nearest scope winning.
  pub fn visible(&self, scope_key: Key) -> Variables {
    let chain: Vec<Key> = self.ancestors(scope_key).collect();
    let mut variables = Variables::new();
    for key in chain.into_iter().rev() {
      if let Some(scope) = self.scopes.get(&key) {
        for (name, value) in &scope.values {
          variables.insert(name.clone(), value.clone());
        }
      }
    }
    variables
  }

  /// Drop the local variables of one scope. Descendants must already be gone.
  pub fn destroy_scope(&mut self, scope_key: Key) -> bool {
    self.scopes.remove(&scope_key).is_some()
  }

  pub fn scope_count(&self) -> usize {
    self.scopes.len()
  }

  fn ancestors(&self, scope_key: Key) -> impl Iterator<Item = Key> + '_ {
    std::iter::successors(
      self.scopes.contains_key(&scope_key).then_some(scope_key),
      |key| self.scopes.get(key).and_then(|s| s.parent),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn key(raw: u64) -> Key {
    Key::from_raw(raw)
  }

  /// root(1) -> sub(2) -> task(3)
  fn create_store() -> VariableStore {
    let mut store = VariableStore::new();
    store.create_scope(key(1), None);
    store.create_scope(key(2), Some(key(1)));
    store.create_scope(key(3), Some(key(2)));
    store
  }

  #[test]
  fn test_get_walks_ancestors() {
    let mut store = create_store();
    store.set_local(key(1), "x", json!(1)).unwrap();

    assert_eq!(store.get(key(3), "x"), Some(&json!(1)));
    assert_eq!(store.get_local(key(3), "x"), None);
  }

  #[test]
  fn test_local_write_is_not_visible_in_parent() {
    let mut store = create_store();
    store.set_local(key(2), "y", json!(2)).unwrap();

    assert_eq!(store.get(key(1), "y"), None);
    assert_eq!(store.get(key(2), "y"), Some(&json!(2)));
    assert!(store.local_variables(key(1)).is_empty());
    assert_eq!(store.local_variables(key(2)).len(), 1);
  }

  #[test]
  fn test_nearest_scope_shadows() {
    let mut store = create_store();
    store.set_local(key(1), "x", json!("root")).unwrap();
    store.set_local(key(2), "x", json!("sub")).unwrap();

    assert_eq!(store.get(key(3), "x"), Some(&json!("sub")));
    assert_eq!(store.visible(key(3))["x"], json!("sub"));
    assert_eq!(store.visible(key(1))["x"], json!("root"));
  }

  #[test]
  fn test_set_local_reports_intent() {
    let mut store = create_store();

    let created = store.set_local(key(1), "x", json!(1)).unwrap().unwrap();
    let updated = store.set_local(key(1), "x", json!(2)).unwrap().unwrap();
    let unchanged = store.set_local(key(1), "x", json!(2)).unwrap();

    assert_eq!(created.intent, VariableIntent::Created);
    assert_eq!(updated.intent, VariableIntent::Updated);
    assert!(unchanged.is_none());
  }

  #[test]
  fn test_propagating_write_defaults_to_local() {
    let mut store = create_store();

    let change = store.set_propagating(key(3), "z", json!(true)).unwrap().unwrap();

    assert_eq!(change.scope_key, key(3));
    assert_eq!(store.get(key(2), "z"), None);
  }

  #[test]
  fn test_propagating_write_lands_on_declaring_scope() {
    let mut store = create_store();
    store.declare(key(2), "total", json!(0)).unwrap();

    let change = store.set_propagating(key(3), "total", json!(10)).unwrap().unwrap();

    assert_eq!(change.scope_key, key(2));
    assert_eq!(change.intent, VariableIntent::Updated);
    assert_eq!(store.get(key(1), "total"), None);
  }

  #[test]
  fn test_propagating_write_updates_existing_holder() {
    let mut store = create_store();
    store.set_local(key(1), "status", json!("new")).unwrap();

    let change = store.set_propagating(key(3), "status", json!("done")).unwrap().unwrap();

    assert_eq!(change.scope_key, key(1));
    assert_eq!(store.get_local(key(1), "status"), Some(&json!("done")));
  }

  #[test]
  fn test_destroy_scope_keeps_ancestors() {
    let mut store = create_store();
    store.set_local(key(1), "x", json!(1)).unwrap();
    store.set_local(key(3), "x", json!(3)).unwrap();

    assert!(store.destroy_scope(key(3)));

    assert_eq!(store.get(key(1), "x"), Some(&json!(1)));
    assert_eq!(store.get(key(3), "x"), None);
    assert!(!store.destroy_scope(key(3)));
  }

  #[test]
  fn test_unknown_scope_is_rejected() {
    let mut store = create_store();

    let result = store.set_local(key(99), "x", json!(1));

    assert!(matches!(result, Err(EngineError::InvalidScope { key: k }) if k == key(99)));
  }
}
