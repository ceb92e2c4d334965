//! Processing of one trigger.
//!
//! A `Step` owns a FIFO queue of commands. The trigger seeds it; every command
//! may emit records and enqueue follow-ups, and the step ends once the queue is
//! empty. Nothing suspends mid-step.
//!
//! Termination initiates top-down (a scope goes TERMINATING, then queues the
//! termination of each child) and finishes bottom-up (the scope goes TERMINATED
//! when its last child has).

use std::collections::VecDeque;
use std::sync::Arc;

use minijinja::Environment;
use serde_json::Value;
use tracing::{debug, warn};
use zinnia_model::{Element, ElementType, ExecutableProcess};

use crate::behavior;
use crate::error::EngineError;
use crate::gateway::{JoinOutcome, SequenceFlowToken};
use crate::instance::{ElementInstance, InterruptPhase};
use crate::key::{Key, KeyGenerator};
use crate::lifecycle::{Intent, LifecycleState};
use crate::record::{
  IncidentRecord, LifecycleRecord, Record, RejectionReason, RejectionRecord, VariableRecord,
};
use crate::state::InstanceState;
use crate::subscriptions::Subscription;
use crate::trigger::VariableSemantics;
use crate::variables::{VariableChange, Variables};

/// Follow-up work produced while processing.
#[derive(Debug, Clone)]
pub(crate) enum Command {
  Activate {
    element_id: String,
    flow_scope_key: Key,
    variables: Variables,
  },
  Complete {
    key: Key,
  },
  Terminate {
    key: Key,
  },
  Trigger {
    subscription: Subscription,
    payload: Variables,
  },
}

pub(crate) struct Step<'a> {
  pub(crate) state: &'a mut InstanceState,
  process: Arc<ExecutableProcess>,
  keys: &'a mut KeyGenerator,
  env: &'a Environment<'static>,
  clock: u64,
  max_commands: usize,
  queue: VecDeque<Command>,
  records: Vec<Record>,
}

impl<'a> Step<'a> {
  pub(crate) fn new(
    state: &'a mut InstanceState,
    keys: &'a mut KeyGenerator,
    env: &'a Environment<'static>,
    clock: u64,
    max_commands: usize,
  ) -> Self {
    let process = Arc::clone(&state.process);
    Self {
      state,
      process,
      keys,
      env,
      clock,
      max_commands,
      queue: VecDeque::new(),
      records: Vec::new(),
    }
  }

  /// Drain the queue to a fixed point.
  pub(crate) fn run(mut self) -> Result<Vec<Record>, EngineError> {
    let mut processed = 0usize;
    while let Some(command) = self.queue.pop_front() {
      processed += 1;
      if processed > self.max_commands {
        return Err(EngineError::invariant(format!(
          "step did not reach a fixed point within {} commands",
          self.max_commands
        )));
      }

      match command {
        Command::Activate {
          element_id,
          flow_scope_key,
          variables,
        } => self.activate(&element_id, flow_scope_key, variables)?,
        Command::Complete { key } => self.complete(key)?,
        Command::Terminate { key } => self.terminate(key)?,
        Command::Trigger {
          subscription,
          payload,
        } => self.trigger(subscription, payload)?,
      }
    }
    Ok(self.records)
  }

  pub(crate) fn process(&self) -> Arc<ExecutableProcess> {
    Arc::clone(&self.process)
  }

  pub(crate) fn env(&self) -> &'a Environment<'static> {
    self.env
  }

  pub(crate) fn clock(&self) -> u64 {
    self.clock
  }

  pub(crate) fn next_key(&mut self) -> Key {
    self.keys.next_key()
  }

  pub(crate) fn enqueue(&mut self, command: Command) {
    self.queue.push_back(command);
  }

  pub(crate) fn emit(&mut self, record: Record) {
    self.records.push(record);
  }

  /// Queue activation of `element_id` in `flow_scope_key`. The scope counts it
  /// as pending until the command is processed, which keeps it from completing.
  pub(crate) fn enqueue_activation(
    &mut self,
    element_id: &str,
    flow_scope_key: Key,
    variables: Variables,
  ) -> Result<(), EngineError> {
    let scope = self
      .state
      .tree
      .get_mut(flow_scope_key)
      .ok_or(EngineError::InvalidScope {
        key: flow_scope_key,
      })?;
    scope.pending_activations += 1;
    self.enqueue(Command::Activate {
      element_id: element_id.to_string(),
      flow_scope_key,
      variables,
    });
    Ok(())
  }

  pub(crate) fn enqueue_trigger(&mut self, subscription: Subscription, payload: Variables) {
    self.enqueue(Command::Trigger {
      subscription,
      payload,
    });
  }

  // -- records ---------------------------------------------------------------

  fn record_lifecycle(&mut self, key: Key, intent: Intent) -> Result<(), EngineError> {
    let instance = self
      .state
      .tree
      .get(key)
      .ok_or_else(|| EngineError::invariant(format!("element instance {} does not exist", key)))?;
    let record = LifecycleRecord {
      key,
      intent,
      element_id: instance.element_id.clone(),
      element_type: instance.element_type,
      flow_scope_key: instance.flow_scope_key,
      process_instance_key: instance.process_instance_key,
      process_id: self.process.process_id.clone(),
    };
    self.emit(Record::ProcessInstance(record));
    Ok(())
  }

  pub(crate) fn transition(&mut self, key: Key, next: LifecycleState) -> Result<(), EngineError> {
    self.state.tree.transition(key, next)?;
    self.record_lifecycle(key, next.intent())
  }

  pub(crate) fn event_occurred(&mut self, key: Key) -> Result<(), EngineError> {
    self.record_lifecycle(key, Intent::EventOccurred)
  }

  pub(crate) fn reject(&mut self, key: Key, reason: RejectionReason, message: String) {
    debug!(key = %key, ?reason, %message, "request rejected");
    self.emit(Record::Rejection(RejectionRecord {
      reason,
      key,
      process_instance_key: Some(self.state.process_instance_key),
      message,
    }));
  }

  fn raise_incident(&mut self, key: Key, element: &Element, error: &EngineError) {
    warn!(
      process_instance_key = %self.state.process_instance_key,
      element_id = %element.element_id,
      error = %error,
      "incident raised"
    );
    self.emit(Record::Incident(IncidentRecord {
      element_instance_key: key,
      element_id: element.element_id.clone(),
      process_instance_key: self.state.process_instance_key,
      message: error.to_string(),
    }));
  }

  /// Turn model/data failures into an incident. Returns whether to proceed.
  fn settle(
    &mut self,
    key: Key,
    element: &Element,
    result: Result<(), EngineError>,
  ) -> Result<bool, EngineError> {
    match result {
      Ok(()) => Ok(true),
      Err(err) if err.is_incident() => {
        self.raise_incident(key, element, &err);
        Ok(false)
      }
      Err(err) => Err(err),
    }
  }

  // -- variables -------------------------------------------------------------

  pub(crate) fn set_variable(
    &mut self,
    scope_key: Key,
    name: &str,
    value: Value,
    semantics: VariableSemantics,
  ) -> Result<(), EngineError> {
    let change = match semantics {
      VariableSemantics::Local => self.state.variables.set_local(scope_key, name, value)?,
      VariableSemantics::Propagate => self.state.variables.set_propagating(scope_key, name, value)?,
    };
    self.record_variable(change);
    Ok(())
  }

  pub(crate) fn declare_variable(
    &mut self,
    scope_key: Key,
    name: &str,
    value: Value,
  ) -> Result<(), EngineError> {
    let change = self.state.variables.declare(scope_key, name, value)?;
    self.record_variable(change);
    Ok(())
  }

  fn record_variable(&mut self, change: Option<VariableChange>) {
    if let Some(change) = change {
      let process_instance_key = self.state.process_instance_key;
      self.emit(Record::Variable(VariableRecord {
        intent: change.intent,
        scope_key: change.scope_key,
        name: change.name,
        value: change.value,
        process_instance_key,
      }));
    }
  }

  pub(crate) fn flow_scope_of(&self, key: Key) -> Result<Key, EngineError> {
    self
      .state
      .tree
      .get(key)
      .and_then(|i| i.flow_scope_key)
      .ok_or_else(|| EngineError::invariant(format!("element instance {} has no flow scope", key)))
  }

  // -- activation ------------------------------------------------------------

  /// Create and activate the root element instance of the process.
  pub(crate) fn start(&mut self, variables: Variables) -> Result<Key, EngineError> {
    let process = self.process();
    let root = process.root()?;
    let key = self.state.process_instance_key;
    self
      .state
      .tree
      .insert(ElementInstance::new(key, root, None, key))?;
    self.enter(key, root, variables)?;
    Ok(key)
  }

  fn activate(
    &mut self,
    element_id: &str,
    flow_scope_key: Key,
    variables: Variables,
  ) -> Result<(), EngineError> {
    let process = self.process();
    let element = process.element(element_id)?;

    let Some(scope) = self.state.tree.get_mut(flow_scope_key) else {
      debug!(element_id, flow_scope_key = %flow_scope_key, "flow scope is gone, discarding activation");
      return Ok(());
    };
    scope.pending_activations = scope.pending_activations.checked_sub(1).ok_or_else(|| {
      EngineError::invariant(format!(
        "activation of '{}' was not accounted in scope {}",
        element_id, flow_scope_key
      ))
    })?;

    if scope.state != LifecycleState::Activated || !scope.interrupt.admits(element_id) {
      debug!(
        element_id,
        flow_scope_key = %flow_scope_key,
        scope_state = %scope.state,
        "flow scope does not admit activation, discarding"
      );
      return self.on_scope_drained(flow_scope_key);
    }

    let key = self.next_key();
    let process_instance_key = self.state.process_instance_key;
    self.state.tree.insert(ElementInstance::new(
      key,
      element,
      Some(flow_scope_key),
      process_instance_key,
    ))?;
    self.enter(key, element, variables)
  }

  /// ACTIVATING, side effects, ACTIVATED.
  fn enter(&mut self, key: Key, element: &Element, variables: Variables) -> Result<(), EngineError> {
    self.record_lifecycle(key, Intent::ElementActivating)?;

    let parent = self.state.tree.get(key).and_then(|i| i.flow_scope_key);
    self.state.variables.create_scope(key, parent);
    for (name, value) in &variables {
      self.set_variable(key, name, value.clone(), VariableSemantics::Local)?;
    }
    if let Some(instance) = self.state.tree.get_mut(key) {
      instance.payload = variables;
    }

    let behavior = behavior::lookup(element.element_type());
    let activated = (behavior.on_activate)(self, key, element);
    if !self.settle(key, element, activated)? {
      return Ok(());
    }

    self.transition(key, LifecycleState::Activated)?;
    (behavior.on_activated)(self, key, element)
  }

  // -- completion ------------------------------------------------------------

  /// A scope is drained when nothing in it is live, queued, or parked at a join.
  pub(crate) fn is_drained(&self, key: Key) -> bool {
    self
      .state
      .tree
      .get(key)
      .is_some_and(|i| i.children.is_empty() && i.pending_activations == 0)
      && !self.state.gateways.has_pending(key)
  }

  fn complete(&mut self, key: Key) -> Result<(), EngineError> {
    let Some(instance) = self.state.tree.get(key) else {
      debug!(key = %key, "element instance is gone, discarding completion");
      return Ok(());
    };
    if instance.state != LifecycleState::Activated
      || (instance.element_type.is_scope() && !self.is_drained(key))
    {
      debug!(key = %key, state = %instance.state, "element instance cannot complete now, discarding completion");
      return Ok(());
    }

    let process = self.process();
    let element = process.element(&instance.element_id)?;

    self.transition(key, LifecycleState::Completing)?;
    let behavior = behavior::lookup(element.element_type());
    let completed = (behavior.on_complete)(self, key, element);
    if !self.settle(key, element, completed)? {
      return Ok(());
    }
    self.transition(key, LifecycleState::Completed)?;

    let instance = self.finalize(key)?;
    let Some(flow_scope_key) = instance.flow_scope_key else {
      return Ok(());
    };

    let flows = match instance.selected_flow {
      Some(flow_id) => vec![flow_id],
      None => process.graph().outgoing(&element.element_id).to_vec(),
    };
    if flows.is_empty() {
      return self.on_scope_drained(flow_scope_key);
    }
    self.take_flows(&flows, flow_scope_key)
  }

  /// React to a scope losing a child or a queued activation.
  pub(crate) fn on_scope_drained(&mut self, scope_key: Key) -> Result<(), EngineError> {
    let Some(scope) = self.state.tree.get(scope_key) else {
      return Ok(());
    };
    if !scope.children.is_empty() {
      return Ok(());
    }

    let state = scope.state;
    let is_scope = scope.element_type.is_scope();
    let triggered = matches!(scope.interrupt, InterruptPhase::Triggered { .. });
    let activating_handler = matches!(scope.interrupt, InterruptPhase::ActivatingHandler { .. });

    match state {
      LifecycleState::Terminating => self.finish_termination(scope_key),
      LifecycleState::Activated if triggered => self.activate_interrupt_handler(scope_key),
      LifecycleState::Activated if !activating_handler && is_scope && self.is_drained(scope_key) => {
        if let Some(scope) = self.state.tree.get_mut(scope_key) {
          if matches!(scope.interrupt, InterruptPhase::HandlerActive { .. }) {
            scope.interrupt = InterruptPhase::ScopeCompleting;
          }
        }
        self.enqueue(Command::Complete { key: scope_key });
        Ok(())
      }
      _ => Ok(()),
    }
  }

  // -- sequence flows --------------------------------------------------------

  pub(crate) fn take_flows(&mut self, flow_ids: &[String], scope_key: Key) -> Result<(), EngineError> {
    let process = self.process();
    let mut outgoing = Vec::with_capacity(flow_ids.len());
    for flow_id in flow_ids {
      let flow = process.flow(flow_id).ok_or_else(|| EngineError::UnknownFlow {
        flow_id: flow_id.clone(),
        scope_key,
      })?;
      outgoing.push((flow.flow_id.clone(), flow.target.clone()));
    }

    let keys = &mut *self.keys;
    let tokens = self
      .state
      .gateways
      .fork(scope_key, &outgoing, || keys.next_key());

    for token in tokens {
      self.take_token(token)?;
    }
    Ok(())
  }

  fn take_token(&mut self, token: SequenceFlowToken) -> Result<(), EngineError> {
    let process = self.process();
    self.emit(Record::ProcessInstance(LifecycleRecord {
      key: token.key,
      intent: Intent::SequenceFlowTaken,
      element_id: token.flow_id.clone(),
      element_type: ElementType::SequenceFlow,
      flow_scope_key: Some(token.scope_key),
      process_instance_key: self.state.process_instance_key,
      process_id: process.process_id.clone(),
    }));

    let target = process.element(&token.target_id)?;
    let is_join = target.element_type() == ElementType::ParallelGateway
      && process.graph().is_join_point(&target.element_id);
    if !is_join {
      return self.enqueue_activation(&token.target_id, token.scope_key, Variables::new());
    }

    let scope_key = token.scope_key;
    let incoming = process.graph().incoming(&target.element_id);
    match self.state.gateways.arrive(token, incoming) {
      JoinOutcome::Waiting { arrived, required } => {
        debug!(gateway_id = %target.element_id, scope_key = %scope_key, arrived, required, "join waiting");
        Ok(())
      }
      JoinOutcome::Fired { tokens } => {
        debug!(gateway_id = %target.element_id, scope_key = %scope_key, consumed = tokens.len(), "join fired");
        self.enqueue_activation(&target.element_id, scope_key, Variables::new())
      }
    }
  }

  // -- termination -----------------------------------------------------------

  pub(crate) fn terminate(&mut self, key: Key) -> Result<(), EngineError> {
    let Some(instance) = self.state.tree.get(key) else {
      return Ok(());
    };
    if !instance.state.can_transition_to(LifecycleState::Terminating) {
      return Ok(());
    }

    let process = self.process();
    let element = process.element(&instance.element_id)?;

    self.transition(key, LifecycleState::Terminating)?;
    (behavior::lookup(element.element_type()).on_terminate)(self, key, element)?;
    self.close_subscriptions(key);
    self.discard_tokens(key);
    if let Some(instance) = self.state.tree.get_mut(key) {
      instance.interrupt = InterruptPhase::Armed;
    }

    let children = self.state.tree.children(key);
    if children.is_empty() {
      return self.finish_termination(key);
    }
    for child in children {
      self.enqueue(Command::Terminate { key: child });
    }
    Ok(())
  }

  fn finish_termination(&mut self, key: Key) -> Result<(), EngineError> {
    self.transition(key, LifecycleState::Terminated)?;
    let instance = self.finalize(key)?;

    let Some(flow_scope_key) = instance.flow_scope_key else {
      return Ok(());
    };
    if let Some(boundary) = instance.boundary_interrupt {
      self.activate_boundary(flow_scope_key, boundary)?;
    }
    self.on_scope_drained(flow_scope_key)
  }

  /// Release everything a finished instance owns and drop it from the tree.
  fn finalize(&mut self, key: Key) -> Result<ElementInstance, EngineError> {
    self.close_subscriptions(key);
    self.discard_tokens(key);
    self.state.variables.destroy_scope(key);
    let instance = self.state.tree.remove(key)?;
    if let Some(job_key) = instance.job_key {
      self.state.jobs.remove(&job_key);
    }
    Ok(instance)
  }

  pub(crate) fn close_subscriptions(&mut self, key: Key) {
    for subscription in self.state.subscriptions.close(key) {
      self.emit(Record::SubscriptionClosed(subscription));
    }
  }

  pub(crate) fn discard_tokens(&mut self, scope_key: Key) {
    let discarded = self.state.gateways.discard_scope(scope_key);
    if !discarded.is_empty() {
      debug!(scope_key = %scope_key, tokens = discarded.len(), "discarded pending join tokens");
    }
  }

  // -- requests from collaborators -------------------------------------------

  pub(crate) fn request_completion(&mut self, key: Key) -> Result<(), EngineError> {
    let instance = self
      .state
      .tree
      .get(key)
      .ok_or(EngineError::InvalidScope { key })?;
    let state = instance.state;

    if state != LifecycleState::Activated {
      let error = EngineError::InvalidState {
        key,
        state,
        action: "complete",
      };
      self.reject(key, RejectionReason::InvalidState, error.to_string());
      return Ok(());
    }
    if instance.element_type.is_scope() && !self.is_drained(key) {
      self.reject(
        key,
        RejectionReason::InvalidState,
        format!("cannot complete scope {} while it has active children", key),
      );
      return Ok(());
    }

    self.enqueue(Command::Complete { key });
    Ok(())
  }

  pub(crate) fn request_termination(&mut self, key: Key) {
    self.enqueue(Command::Terminate { key });
  }

  pub(crate) fn request_flow(&mut self, flow_id: &str, scope_key: Key) -> Result<(), EngineError> {
    let scope = self
      .state
      .tree
      .get(scope_key)
      .filter(|s| s.state == LifecycleState::Activated)
      .ok_or(EngineError::InvalidScope { key: scope_key })?;

    let belongs = self
      .process
      .flow(flow_id)
      .is_some_and(|f| f.flow_scope == scope.element_id);
    if !belongs {
      return Err(EngineError::UnknownFlow {
        flow_id: flow_id.to_string(),
        scope_key,
      });
    }

    self.take_flows(&[flow_id.to_string()], scope_key)
  }

  pub(crate) fn update_variables(
    &mut self,
    scope_key: Key,
    semantics: VariableSemantics,
    document: Variables,
  ) -> Result<(), EngineError> {
    for (name, value) in document {
      self.set_variable(scope_key, &name, value, semantics)?;
    }
    Ok(())
  }

  /// Apply a job worker's result and complete its service task.
  pub(crate) fn complete_job(&mut self, job_key: Key, variables: Variables) -> Result<(), EngineError> {
    let task_key = *self
      .state
      .jobs
      .get(&job_key)
      .ok_or(EngineError::JobNotFound(job_key))?;
    let instance = self
      .state
      .tree
      .get(task_key)
      .ok_or_else(|| EngineError::invariant(format!("job {} points at missing task {}", job_key, task_key)))?;

    if instance.state != LifecycleState::Activated {
      let error = EngineError::InvalidState {
        key: task_key,
        state: instance.state,
        action: "complete",
      };
      self.reject(task_key, RejectionReason::InvalidState, error.to_string());
      return Ok(());
    }

    let process = self.process();
    let element = process.element(&instance.element_id)?;
    let flow_scope_key = self.flow_scope_of(task_key)?;

    // With output mappings the result stays on the task and the mappings decide
    // what reaches the flow scope.
    for (name, value) in variables {
      if element.outputs.is_empty() {
        self.set_variable(flow_scope_key, &name, value, VariableSemantics::Propagate)?;
      } else {
        self.set_variable(task_key, &name, value, VariableSemantics::Local)?;
      }
    }

    self.enqueue(Command::Complete { key: task_key });
    Ok(())
  }
}
