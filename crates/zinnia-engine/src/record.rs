//! Records produced for collaborators.
//!
//! Every processing step appends records in the order things happened. The
//! `ProcessInstance` records carry the lifecycle vocabulary
//! (`ELEMENT_ACTIVATING` .. `ELEMENT_TERMINATED`, `SEQUENCE_FLOW_TAKEN`,
//! `EVENT_OCCURRED`); the rest describe side effects the surrounding system acts
//! on (open a subscription, create a job, ...).

use serde::{Deserialize, Serialize};
use zinnia_model::ElementType;

use crate::key::Key;
use crate::lifecycle::Intent;
use crate::subscriptions::Subscription;
use crate::variables::Variables;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum Record {
  ProcessInstance(LifecycleRecord),
  Variable(VariableRecord),
  SubscriptionOpened(Subscription),
  SubscriptionClosed(Subscription),
  JobCreateRequested(JobRecord),
  JobCancelRequested(JobRecord),
  Incident(IncidentRecord),
  Rejection(RejectionRecord),
}

impl Record {
  pub fn as_lifecycle(&self) -> Option<&LifecycleRecord> {
    match self {
      Record::ProcessInstance(record) => Some(record),
      _ => None,
    }
  }

  pub fn as_variable(&self) -> Option<&VariableRecord> {
    match self {
      Record::Variable(record) => Some(record),
      _ => None,
    }
  }

  pub fn process_instance_key(&self) -> Option<Key> {
    match self {
      Record::ProcessInstance(r) => Some(r.process_instance_key),
      Record::Variable(r) => Some(r.process_instance_key),
      Record::SubscriptionOpened(s) | Record::SubscriptionClosed(s) => Some(s.process_instance_key),
      Record::JobCreateRequested(r) | Record::JobCancelRequested(r) => Some(r.process_instance_key),
      Record::Incident(r) => Some(r.process_instance_key),
      Record::Rejection(r) => r.process_instance_key,
    }
  }
}

/// One lifecycle transition, flow taken, or event occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleRecord {
  pub key: Key,
  pub intent: Intent,
  pub element_id: String,
  pub element_type: ElementType,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub flow_scope_key: Option<Key>,
  pub process_instance_key: Key,
  pub process_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariableIntent {
  Created,
  Updated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableRecord {
  pub intent: VariableIntent,
  pub scope_key: Key,
  pub name: String,
  pub value: serde_json::Value,
  pub process_instance_key: Key,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
  pub job_key: Key,
  pub job_type: String,
  pub element_instance_key: Key,
  pub element_id: String,
  pub process_instance_key: Key,
  #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
  pub variables: Variables,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
  pub element_instance_key: Key,
  pub element_id: String,
  pub process_instance_key: Key,
  pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
  InvalidState,
  DuplicateSubscription,
}

/// Diagnostic record for a request that was discarded without effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionRecord {
  pub reason: RejectionReason,
  pub key: Key,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub process_instance_key: Option<Key>,
  pub message: String,
}
