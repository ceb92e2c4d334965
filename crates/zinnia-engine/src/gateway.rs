//! Parallel gateway fork/join accounting.
//!
//! A join gateway collects one token per incoming flow for each scope
//! instantiation. Tokens are keyed by flow id, so a repeated arrival on the same
//! flow replaces the parked token instead of counting twice. When every incoming
//! flow has a token the whole set is consumed and the join fires once.

use std::collections::BTreeMap;

use crate::key::Key;

/// "Flow F was taken towards element G inside scope S."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceFlowToken {
  pub key: Key,
  pub flow_id: String,
  pub target_id: String,
  pub scope_key: Key,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
  /// Still waiting for other incoming flows.
  Waiting { arrived: usize, required: usize },
  /// All incoming flows are present; these tokens were consumed.
  Fired { tokens: Vec<SequenceFlowToken> },
}

#[derive(Debug, Clone, Default)]
pub struct GatewaySynchronizer {
  /// (scope key, gateway id) -> flow id -> parked token.
  pending: BTreeMap<(Key, String), BTreeMap<String, SequenceFlowToken>>,
}

impl GatewaySynchronizer {
  pub fn new() -> Self {
    Self::default()
  }

  /// One token per `(flow id, target id)` pair, in the given order.
  pub fn fork(
    &self,
    scope_key: Key,
    outgoing: &[(String, String)],
    mut next_key: impl FnMut() -> Key,
  ) -> Vec<SequenceFlowToken> {
    outgoing
      .iter()
      .map(|(flow_id, target_id)| SequenceFlowToken {
        key: next_key(),
        flow_id: flow_id.clone(),
        target_id: target_id.clone(),
        scope_key,
      })
      .collect()
  }

  /// Park `token` at its target join, firing when all `incoming` flows are present.
  pub fn arrive(&mut self, token: SequenceFlowToken, incoming: &[String]) -> JoinOutcome {
    let slot = (token.scope_key, token.target_id.clone());
    let parked = self.pending.entry(slot.clone()).or_default();
    parked.insert(token.flow_id.clone(), token);

    let required = incoming.len();
    if !incoming.iter().all(|flow| parked.contains_key(flow)) {
      return JoinOutcome::Waiting {
        arrived: parked.len(),
        required,
      };
    }

    let mut parked = self.pending.remove(&slot).unwrap_or_default();
    let tokens = incoming
      .iter()
      .filter_map(|flow| parked.remove(flow))
      .collect();
    JoinOutcome::Fired { tokens }
  }

  /// Drop every partial token set of `scope_key`.
  pub fn discard_scope(&mut self, scope_key: Key) -> Vec<SequenceFlowToken> {
    let slots: Vec<(Key, String)> = self
      .pending
      .keys()
      .filter(|(scope, _)| *scope == scope_key)
      .cloned()
      .collect();

    slots
      .iter()
      .filter_map(|slot| self.pending.remove(slot))
      .flat_map(|parked| parked.into_values())
      .collect()
  }

  pub fn has_pending(&self, scope_key: Key) -> bool {
    self.pending.keys().any(|(scope, _)| *scope == scope_key)
  }

  /// Flow ids currently parked at `gateway_id` in `scope_key`.
  pub fn parked_flows(&self, scope_key: Key, gateway_id: &str) -> Vec<String> {
    self
      .pending
      .get(&(scope_key, gateway_id.to_string()))
      .map(|parked| parked.keys().cloned().collect())
      .unwrap_or_default()
  }
}
