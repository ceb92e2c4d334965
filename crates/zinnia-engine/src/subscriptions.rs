//! Event subscriptions owned by waiting element instances.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::key::Key;
use crate::trigger::EventMatch;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubscriptionKind {
  Message { name: String, correlation_key: String },
  Timer { due_at: u64 },
  Signal { name: String },
}

/// Which construct a subscription serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionOrigin {
  /// Start event of an event subprocess, owned by the enclosing scope.
  EventSubProcess,
  /// Boundary event, owned by the activity it is attached to.
  BoundaryEvent,
  /// Intermediate catch event, owned by the catch event itself.
  CatchEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
  pub key: Key,
  /// Element instance that owns the subscription.
  pub scope_key: Key,
  pub process_instance_key: Key,
  pub handler_element_id: String,
  pub kind: SubscriptionKind,
  pub origin: SubscriptionOrigin,
  pub interrupting: bool,
}

impl Subscription {
  /// Repeating subscriptions stay open after triggering.
  pub fn is_repeating(&self) -> bool {
    !self.interrupting
      && self.origin != SubscriptionOrigin::CatchEvent
      && !matches!(self.kind, SubscriptionKind::Timer { .. })
  }

  pub fn matches(&self, event: &EventMatch) -> bool {
    match (&self.kind, event) {
      (
        SubscriptionKind::Message {
          name,
          correlation_key,
        },
        EventMatch::Message {
          name: event_name,
          correlation_key: event_key,
        },
      ) => name == event_name && correlation_key == event_key,
      (SubscriptionKind::Signal { name }, EventMatch::Signal { name: event_name }) => {
        name == event_name
      }
      (SubscriptionKind::Timer { due_at }, EventMatch::Timer { now }) => due_at <= now,
      _ => false,
    }
  }
}

/// Open subscriptions of one process instance, ordered by key (creation time).
#[derive(Debug, Clone, Default)]
pub struct SubscriptionManager {
  open: BTreeMap<Key, Subscription>,
}

impl SubscriptionManager {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn open(&mut self, subscription: Subscription) -> Result<(), EngineError> {
    let duplicate = self.open.values().any(|s| {
      s.scope_key == subscription.scope_key && s.handler_element_id == subscription.handler_element_id
    });
    if duplicate {
      return Err(EngineError::DuplicateSubscription {
        scope_key: subscription.scope_key,
        handler_element_id: subscription.handler_element_id,
      });
    }
    self.open.insert(subscription.key, subscription);
    Ok(())
  }

  /// Remove every subscription owned by `scope_key`.
  pub fn close(&mut self, scope_key: Key) -> Vec<Subscription> {
    self.close_where(scope_key, |_| true)
  }

  /// Remove the subscriptions of `scope_key` that satisfy `predicate`.
  pub fn close_where(
    &mut self,
    scope_key: Key,
    predicate: impl Fn(&Subscription) -> bool,
  ) -> Vec<Subscription> {
    let keys: Vec<Key> = self
      .open
      .values()
      .filter(|s| s.scope_key == scope_key && predicate(s))
      .map(|s| s.key)
      .collect();
    keys.iter().filter_map(|key| self.open.remove(key)).collect()
  }

  pub fn remove(&mut self, key: Key) -> Option<Subscription> {
    self.open.remove(&key)
  }

  pub fn get(&self, key: Key) -> Option<&Subscription> {
    self.open.get(&key)
  }

  /// Open subscriptions matching `event`, oldest first.
  pub fn correlate(&self, event: &EventMatch) -> Vec<Subscription> {
    self
      .open
      .values()
      .filter(|s| s.matches(event))
      .cloned()
      .collect()
  }

  pub fn owned_by(&self, scope_key: Key) -> impl Iterator<Item = &Subscription> {
    self.open.values().filter(move |s| s.scope_key == scope_key)
  }

  pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
    self.open.values()
  }

  pub fn len(&self) -> usize {
    self.open.len()
  }

  pub fn is_empty(&self) -> bool {
    self.open.is_empty()
  }
}
