//! The partition engine.
//!
//! An `Engine` owns every process instance of one partition and processes
//! triggers one at a time. Each trigger runs as a single step against the
//! instance it addresses; a step either commits as a whole or leaves the
//! instance exactly as it was.
//!
//! Keyed triggers find their instance through an index of every live element
//! instance key and open job key, kept current from the records each committed
//! step produces.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use minijinja::Environment;
use tracing::{debug, error, info, warn};
use zinnia_model::ExecutableProcess;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::key::{Key, KeyGenerator};
use crate::lifecycle::{Intent, is_terminal_record};
use crate::processor::Step;
use crate::record::{Record, RejectionReason, RejectionRecord};
use crate::state::InstanceState;
use crate::subscriptions::Subscription;
use crate::trigger::{DefinitionRef, EventMatch, TransitionTarget, Trigger};
use crate::variables::Variables;

/// One processing lane: deployed definitions plus the instances they run.
pub struct Engine {
  config: EngineConfig,
  keys: KeyGenerator,
  /// Latest timer instant observed, in milliseconds.
  clock: u64,
  expressions: Environment<'static>,
  deployments: HashMap<String, BTreeMap<u32, Arc<ExecutableProcess>>>,
  instances: BTreeMap<Key, InstanceState>,
  /// element instance key or job key -> process instance key
  owners: HashMap<Key, Key>,
  banned: BTreeSet<Key>,
}

impl Engine {
  /// Create a new engine with nothing deployed.
  ///
  /// # Arguments
  ///
  /// * `config` - Lane settings; the partition id must fit the key encoding
  ///
  /// # Errors
  ///
  /// Returns `EngineError::PartitionOutOfRange` for a partition id that keys
  /// cannot carry.
  pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
    config.validate()?;
    let keys = KeyGenerator::new(config.partition_id);
    Ok(Self {
      config,
      keys,
      clock: 0,
      expressions: Environment::new(),
      deployments: HashMap::new(),
      instances: BTreeMap::new(),
      owners: HashMap::new(),
      banned: BTreeSet::new(),
    })
  }

  /// Get the configuration this engine was created with.
  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Get the partition id encoded into every key this engine mints.
  pub fn partition_id(&self) -> u16 {
    self.config.partition_id
  }

  /// Get the lane clock: the latest timer instant observed, in milliseconds.
  pub fn clock(&self) -> u64 {
    self.clock
  }

  /// Register a process definition. Re-deploying a version replaces it.
  pub fn deploy(&mut self, process: ExecutableProcess) -> DefinitionRef {
    let definition = DefinitionRef::version(&process.process_id, process.version);
    info!(
      partition_id = self.config.partition_id,
      process_id = %process.process_id,
      version = process.version,
      elements = process.element_count(),
      "process deployed"
    );
    self
      .deployments
      .entry(process.process_id.clone())
      .or_default()
      .insert(process.version, Arc::new(process));
    definition
  }

  /// Resolve a definition reference; no version means the latest one.
  pub fn definition(&self, definition: &DefinitionRef) -> Result<Arc<ExecutableProcess>, EngineError> {
    let not_found = || EngineError::DefinitionNotFound {
      process_id: definition.process_id.clone(),
      version: definition.version,
    };
    let versions = self.deployments.get(&definition.process_id).ok_or_else(not_found)?;
    let process = match definition.version {
      Some(version) => versions.get(&version),
      None => versions.values().next_back(),
    };
    process.cloned().ok_or_else(not_found)
  }

  /// Get a live process instance by its key.
  pub fn instance(&self, process_instance_key: Key) -> Option<&InstanceState> {
    self.instances.get(&process_instance_key)
  }

  /// Iterate over the live process instances, oldest first.
  pub fn instances(&self) -> impl Iterator<Item = &InstanceState> {
    self.instances.values()
  }

  /// Number of live process instances, banned ones included.
  pub fn instance_count(&self) -> usize {
    self.instances.len()
  }

  /// Whether the instance was banned after an invariant violation.
  pub fn is_banned(&self, process_instance_key: Key) -> bool {
    self.banned.contains(&process_instance_key)
  }

  /// Process one trigger and return the records it produced, in order.
  ///
  /// # Errors
  ///
  /// Caller-facing failures (unknown scope, unknown job, banned instance,
  /// invariant violation) leave every instance as it was before the trigger.
  pub fn process(&mut self, trigger: Trigger) -> Result<Vec<Record>, EngineError> {
    debug!(
      partition_id = self.config.partition_id,
      trigger = trigger.name(),
      "processing trigger"
    );

    match trigger {
      Trigger::StartInstance {
        definition,
        variables,
      } => self.start_instance(&definition, variables),

      Trigger::SequenceFlowTaken { flow_id, scope_key } => {
        let owner = self.owner_of(scope_key)?;
        self.run_step(owner, |step| step.request_flow(&flow_id, scope_key))
      }

      Trigger::ElementTransitionRequested {
        instance_key,
        target,
      } => {
        let Ok(owner) = self.owner_of(instance_key) else {
          return Ok(match target {
            TransitionTarget::Terminate => Vec::new(),
            TransitionTarget::Complete => vec![Record::Rejection(RejectionRecord {
              reason: RejectionReason::InvalidState,
              key: instance_key,
              process_instance_key: None,
              message: format!("element instance {} is not active", instance_key),
            })],
          });
        };
        self.run_step(owner, |step| match target {
          TransitionTarget::Complete => step.request_completion(instance_key),
          TransitionTarget::Terminate => {
            step.request_termination(instance_key);
            Ok(())
          }
        })
      }

      Trigger::ExternalEventOccurred {
        subscription_match,
        payload,
      } => Ok(self.correlate(&subscription_match, payload)),

      Trigger::VariableUpdateRequested {
        scope_key,
        semantics,
        document,
      } => {
        let owner = self.owner_of(scope_key)?;
        self.run_step(owner, |step| step.update_variables(scope_key, semantics, document))
      }

      Trigger::CancelInstance { instance_key } => {
        if !self.instances.contains_key(&instance_key) {
          return Err(EngineError::InvalidScope { key: instance_key });
        }
        info!(process_instance_key = %instance_key, "cancelling process instance");
        self.run_step(instance_key, |step| {
          step.request_termination(instance_key);
          Ok(())
        })
      }

      Trigger::JobCompleted { job_key, variables } => {
        let owner = *self.owners.get(&job_key).ok_or(EngineError::JobNotFound(job_key))?;
        let result = self.run_step(owner, |step| step.complete_job(job_key, variables));
        let job_open = self
          .instances
          .get(&owner)
          .is_some_and(|state| state.jobs.contains_key(&job_key));
        if !job_open {
          self.owners.remove(&job_key);
        }
        result
      }
    }
  }

  fn start_instance(&mut self, definition: &DefinitionRef, variables: Variables) -> Result<Vec<Record>, EngineError> {
    let process = self.definition(definition)?;
    let process_instance_key = self.keys.next_key();
    self.instances.insert(
      process_instance_key,
      InstanceState::new(Arc::clone(&process), process_instance_key),
    );

    let result = self.run_step(process_instance_key, |step| step.start(variables).map(|_| ()));
    match &result {
      Ok(_) => info!(
        process_instance_key = %process_instance_key,
        process_id = %process.process_id,
        version = process.version,
        "process instance started"
      ),
      Err(_) => {
        self.instances.remove(&process_instance_key);
        self.banned.remove(&process_instance_key);
      }
    }
    result
  }

  /// The process instance that holds element instance `key`.
  fn owner_of(&self, key: Key) -> Result<Key, EngineError> {
    self
      .owners
      .get(&key)
      .copied()
      .ok_or(EngineError::InvalidScope { key })
  }

  /// Keep the owner index in line with what a committed step did.
  fn index_records(&mut self, process_instance_key: Key, records: &[Record]) {
    for record in records {
      match record {
        Record::ProcessInstance(r) if r.intent == Intent::ElementActivating => {
          self.owners.insert(r.key, process_instance_key);
        }
        Record::ProcessInstance(r) if is_terminal_record(r.element_type, r.intent) => {
          self.owners.remove(&r.key);
        }
        Record::JobCreateRequested(job) => {
          self.owners.insert(job.job_key, process_instance_key);
        }
        Record::JobCancelRequested(job) => {
          self.owners.remove(&job.job_key);
        }
        _ => {}
      }
    }
  }

  /// Deliver an external event to every open subscription it matches, oldest
  /// subscription first. Each affected instance runs its own step.
  fn correlate(&mut self, event: &EventMatch, payload: Variables) -> Vec<Record> {
    if let EventMatch::Timer { now } = event {
      self.clock = self.clock.max(*now);
    }

    let mut matched: Vec<Subscription> = self
      .instances
      .iter()
      .filter(|(key, _)| !self.banned.contains(*key))
      .flat_map(|(_, state)| state.subscriptions.correlate(event))
      .collect();
    matched.sort_by_key(|s| s.key);
    if matched.is_empty() {
      debug!(?event, "event matched no subscription");
    }

    let mut affected: Vec<Key> = Vec::new();
    for subscription in &matched {
      if !affected.contains(&subscription.process_instance_key) {
        affected.push(subscription.process_instance_key);
      }
    }

    let mut records = Vec::new();
    for owner in affected {
      let subscriptions: Vec<Subscription> = matched
        .iter()
        .filter(|s| s.process_instance_key == owner)
        .cloned()
        .collect();
      let result = self.run_step(owner, |step| {
        for subscription in subscriptions {
          step.enqueue_trigger(subscription, payload.clone());
        }
        Ok(())
      });
      match result {
        Ok(mut produced) => records.append(&mut produced),
        Err(e) => warn!(process_instance_key = %owner, error = %e, "event delivery failed"),
      }
    }
    records
  }

  /// Run one step against a process instance, restoring it on failure.
  fn run_step<F>(&mut self, process_instance_key: Key, seed: F) -> Result<Vec<Record>, EngineError>
  where
    F: FnOnce(&mut Step<'_>) -> Result<(), EngineError>,
  {
    if self.banned.contains(&process_instance_key) {
      return Err(EngineError::InstanceBanned(process_instance_key));
    }
    let state = self
      .instances
      .get_mut(&process_instance_key)
      .ok_or(EngineError::InvalidScope {
        key: process_instance_key,
      })?;
    let snapshot = state.clone();

    let result = {
      let mut step = Step::new(
        &mut *state,
        &mut self.keys,
        &self.expressions,
        self.clock,
        self.config.max_commands_per_step,
      );
      seed(&mut step).and_then(|()| step.run())
    };

    match result {
      Ok(records) => {
        let finished = state.is_finished();
        self.index_records(process_instance_key, &records);
        if finished {
          self.instances.remove(&process_instance_key);
          self.owners.retain(|_, owner| *owner != process_instance_key);
          info!(process_instance_key = %process_instance_key, "process instance finished");
        }
        Ok(records)
      }
      Err(e) => {
        *state = snapshot;
        if e.is_invariant_violation() {
          error!(
            process_instance_key = %process_instance_key,
            error = %e,
            "invariant violated, banning process instance"
          );
          self.banned.insert(process_instance_key);
        } else {
          warn!(process_instance_key = %process_instance_key, error = %e, "trigger rejected");
        }
        Err(e)
      }
    }
  }
}
