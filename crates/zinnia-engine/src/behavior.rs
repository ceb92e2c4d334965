//! Per-element-type behavior.
//!
//! The lifecycle is generic; what differs between element types is confined to
//! four hooks, looked up once per transition:
//!
//! ```text
//!   ACTIVATING --on_activate--> ACTIVATED --on_activated--> (waits)
//!   COMPLETING --on_complete--> COMPLETED
//!   TERMINATING --on_terminate--> (children) --> TERMINATED
//! ```
//!
//! Failures of `on_activate` and `on_complete` that stem from the model or the
//! data (bad expressions, no outgoing flow) become incidents and leave the
//! element where it is.

use tracing::{debug, warn};
use zinnia_model::{Element, ElementKind, ElementType, EventDef};

use crate::error::EngineError;
use crate::expression;
use crate::key::Key;
use crate::processor::{Command, Step};
use crate::record::{JobRecord, Record, RejectionReason};
use crate::subscriptions::{Subscription, SubscriptionKind, SubscriptionOrigin};
use crate::trigger::VariableSemantics;
use crate::variables::Variables;

pub(crate) type Hook = fn(&mut Step<'_>, Key, &Element) -> Result<(), EngineError>;

pub(crate) struct ElementBehavior {
  pub on_activate: Hook,
  pub on_activated: Hook,
  pub on_complete: Hook,
  pub on_terminate: Hook,
}

static PROCESS: ElementBehavior = ElementBehavior {
  on_activate: enter_scope,
  on_activated: start_scope,
  on_complete: noop,
  on_terminate: noop,
};

static SUB_PROCESS: ElementBehavior = ElementBehavior {
  on_activate: enter_scope,
  on_activated: start_scope,
  on_complete: apply_outputs,
  on_terminate: noop,
};

static EVENT_SUB_PROCESS: ElementBehavior = ElementBehavior {
  on_activate: apply_inputs,
  on_activated: start_event_sub_process,
  on_complete: apply_outputs,
  on_terminate: noop,
};

static PASS_THROUGH: ElementBehavior = ElementBehavior {
  on_activate: apply_inputs,
  on_activated: complete_immediately,
  on_complete: apply_outputs,
  on_terminate: noop,
};

static BOUNDARY_EVENT: ElementBehavior = ElementBehavior {
  on_activate: apply_inputs,
  on_activated: complete_immediately,
  on_complete: hand_off_payload,
  on_terminate: noop,
};

static TASK: ElementBehavior = ElementBehavior {
  on_activate: enter_activity,
  on_activated: complete_immediately,
  on_complete: apply_outputs,
  on_terminate: noop,
};

static SERVICE_TASK: ElementBehavior = ElementBehavior {
  on_activate: enter_service_task,
  on_activated: noop,
  on_complete: apply_outputs,
  on_terminate: cancel_job,
};

static CATCH_EVENT: ElementBehavior = ElementBehavior {
  on_activate: enter_catch_event,
  on_activated: noop,
  on_complete: hand_off_payload,
  on_terminate: noop,
};

static EXCLUSIVE_GATEWAY: ElementBehavior = ElementBehavior {
  on_activate: select_flow,
  on_activated: complete_immediately,
  on_complete: noop,
  on_terminate: noop,
};

static INERT: ElementBehavior = ElementBehavior {
  on_activate: noop,
  on_activated: noop,
  on_complete: noop,
  on_terminate: noop,
};

pub(crate) fn lookup(element_type: ElementType) -> &'static ElementBehavior {
  match element_type {
    ElementType::Process => &PROCESS,
    ElementType::SubProcess => &SUB_PROCESS,
    ElementType::EventSubProcess => &EVENT_SUB_PROCESS,
    ElementType::StartEvent | ElementType::EndEvent | ElementType::ParallelGateway => &PASS_THROUGH,
    ElementType::BoundaryEvent => &BOUNDARY_EVENT,
    ElementType::Task => &TASK,
    ElementType::ServiceTask => &SERVICE_TASK,
    ElementType::IntermediateCatchEvent => &CATCH_EVENT,
    ElementType::ExclusiveGateway => &EXCLUSIVE_GATEWAY,
    ElementType::SequenceFlow => &INERT,
  }
}

fn noop(_step: &mut Step<'_>, _key: Key, _element: &Element) -> Result<(), EngineError> {
  Ok(())
}

fn complete_immediately(step: &mut Step<'_>, key: Key, _element: &Element) -> Result<(), EngineError> {
  step.enqueue(Command::Complete { key });
  Ok(())
}

/// Input mappings are evaluated against what the element sees and declared
/// locally, so propagating writes from inside stop here.
fn apply_inputs(step: &mut Step<'_>, key: Key, element: &Element) -> Result<(), EngineError> {
  if element.inputs.is_empty() {
    return Ok(());
  }
  let context = step.state.variables.visible(key);
  let values = expression::evaluate_mappings(step.env(), &element.element_id, &element.inputs, &context)?;
  for (name, value) in values {
    step.declare_variable(key, &name, value)?;
  }
  Ok(())
}

fn apply_outputs(step: &mut Step<'_>, key: Key, element: &Element) -> Result<(), EngineError> {
  if element.outputs.is_empty() {
    return Ok(());
  }
  let flow_scope_key = step.flow_scope_of(key)?;
  let context = step.state.variables.visible(key);
  let values = expression::evaluate_mappings(step.env(), &element.element_id, &element.outputs, &context)?;
  for (name, value) in values {
    step.set_variable(flow_scope_key, &name, value, VariableSemantics::Propagate)?;
  }
  Ok(())
}

fn open_boundary_subscriptions(step: &mut Step<'_>, key: Key, element: &Element) -> Result<(), EngineError> {
  let process = step.process();
  for boundary in process.boundary_events(&element.element_id) {
    step.open_subscription(key, boundary, SubscriptionOrigin::BoundaryEvent)?;
  }
  Ok(())
}

fn enter_activity(step: &mut Step<'_>, key: Key, element: &Element) -> Result<(), EngineError> {
  apply_inputs(step, key, element)?;
  open_boundary_subscriptions(step, key, element)
}

fn enter_scope(step: &mut Step<'_>, key: Key, element: &Element) -> Result<(), EngineError> {
  enter_activity(step, key, element)?;
  let process = step.process();
  for start in process.event_sub_process_starts(&element.element_id) {
    step.open_subscription(key, start, SubscriptionOrigin::EventSubProcess)?;
  }
  Ok(())
}

fn start_scope(step: &mut Step<'_>, key: Key, element: &Element) -> Result<(), EngineError> {
  let process = step.process();
  let start = process.none_start_event(&element.element_id).ok_or_else(|| {
    EngineError::invariant(format!("scope '{}' has no none start event", element.element_id))
  })?;
  step.enqueue_activation(&start.element_id, key, Variables::new())
}

fn start_event_sub_process(step: &mut Step<'_>, key: Key, element: &Element) -> Result<(), EngineError> {
  step.mark_handler_active(key, element);
  let process = step.process();
  let start = process.event_start(&element.element_id).ok_or_else(|| {
    EngineError::invariant(format!(
      "event subprocess '{}' has no event start",
      element.element_id
    ))
  })?;
  step.enqueue_activation(&start.element_id, key, Variables::new())
}

fn enter_service_task(step: &mut Step<'_>, key: Key, element: &Element) -> Result<(), EngineError> {
  enter_activity(step, key, element)?;
  let ElementKind::ServiceTask { job_type } = &element.kind else {
    return Ok(());
  };

  let job_key = step.next_key();
  step.state.jobs.insert(job_key, key);
  if let Some(instance) = step.state.tree.get_mut(key) {
    instance.job_key = Some(job_key);
  }

  let variables = step.state.variables.visible(key);
  let process_instance_key = step.state.process_instance_key;
  debug!(job_key = %job_key, job_type = %job_type, element_id = %element.element_id, "job created");
  step.emit(Record::JobCreateRequested(JobRecord {
    job_key,
    job_type: job_type.clone(),
    element_instance_key: key,
    element_id: element.element_id.clone(),
    process_instance_key,
    variables,
  }));
  Ok(())
}

fn cancel_job(step: &mut Step<'_>, key: Key, element: &Element) -> Result<(), EngineError> {
  let ElementKind::ServiceTask { job_type } = &element.kind else {
    return Ok(());
  };
  let Some(job_key) = step.state.tree.get(key).and_then(|i| i.job_key) else {
    return Ok(());
  };
  step.state.jobs.remove(&job_key);

  let process_instance_key = step.state.process_instance_key;
  step.emit(Record::JobCancelRequested(JobRecord {
    job_key,
    job_type: job_type.clone(),
    element_instance_key: key,
    element_id: element.element_id.clone(),
    process_instance_key,
    variables: Variables::new(),
  }));
  Ok(())
}

fn enter_catch_event(step: &mut Step<'_>, key: Key, element: &Element) -> Result<(), EngineError> {
  apply_inputs(step, key, element)?;
  step.open_subscription(key, element, SubscriptionOrigin::CatchEvent)
}

/// Without output mappings a catch or boundary event hands the payload it was
/// correlated with to its flow scope. Locals declared by input mappings stay.
fn hand_off_payload(step: &mut Step<'_>, key: Key, element: &Element) -> Result<(), EngineError> {
  if !element.outputs.is_empty() {
    return apply_outputs(step, key, element);
  }
  let flow_scope_key = step.flow_scope_of(key)?;
  let payload = step
    .state
    .tree
    .get(key)
    .map(|i| i.payload.clone())
    .unwrap_or_default();
  for (name, value) in payload {
    step.set_variable(flow_scope_key, &name, value, VariableSemantics::Propagate)?;
  }
  Ok(())
}

/// Pick the first outgoing flow whose condition holds, else the default flow.
fn select_flow(step: &mut Step<'_>, key: Key, element: &Element) -> Result<(), EngineError> {
  let ElementKind::ExclusiveGateway { default_flow } = &element.kind else {
    return Ok(());
  };
  let process = step.process();
  let outgoing = process.graph().outgoing(&element.element_id);
  if outgoing.is_empty() {
    return Ok(());
  }

  let context = step.state.variables.visible(key);
  let mut selected = None;
  for flow_id in outgoing {
    if default_flow.as_ref() == Some(flow_id) {
      continue;
    }
    let Some(flow) = process.flow(flow_id) else {
      continue;
    };
    let taken = match &flow.condition {
      Some(condition) => {
        expression::evaluate_condition(step.env(), &element.element_id, condition, &context)?
      }
      None => true,
    };
    if taken {
      selected = Some(flow_id.clone());
      break;
    }
  }

  let selected = selected
    .or_else(|| default_flow.clone())
    .ok_or_else(|| EngineError::NoFlowSelected {
      element_id: element.element_id.clone(),
    })?;
  if let Some(instance) = step.state.tree.get_mut(key) {
    instance.selected_flow = Some(selected);
  }
  Ok(())
}

impl Step<'_> {
  /// Open the subscription `handler` waits on, owned by `owner_key`.
  ///
  /// A second subscription for the same handler in the same scope is refused
  /// with a rejection record; the scope carries on without it.
  pub(crate) fn open_subscription(
    &mut self,
    owner_key: Key,
    handler: &Element,
    origin: SubscriptionOrigin,
  ) -> Result<(), EngineError> {
    let Some(event) = handler.event() else {
      return Ok(());
    };

    let kind = match event {
      EventDef::Message {
        name,
        correlation_key,
      } => {
        let context = self.state.variables.visible(owner_key);
        SubscriptionKind::Message {
          name: name.clone(),
          correlation_key: expression::render(self.env(), &handler.element_id, correlation_key, &context)?,
        }
      }
      EventDef::Timer { duration_ms } => SubscriptionKind::Timer {
        due_at: self.clock().saturating_add(*duration_ms),
      },
      EventDef::Signal { name } => SubscriptionKind::Signal { name: name.clone() },
    };

    let subscription = Subscription {
      key: self.next_key(),
      scope_key: owner_key,
      process_instance_key: self.state.process_instance_key,
      handler_element_id: handler.element_id.clone(),
      kind,
      origin,
      interrupting: origin != SubscriptionOrigin::CatchEvent && handler.is_interrupting(),
    };

    match self.state.subscriptions.open(subscription.clone()) {
      Ok(()) => {
        debug!(
          subscription_key = %subscription.key,
          scope_key = %owner_key,
          handler = %subscription.handler_element_id,
          "subscription opened"
        );
        self.emit(Record::SubscriptionOpened(subscription));
        Ok(())
      }
      Err(err @ EngineError::DuplicateSubscription { .. }) => {
        warn!(error = %err, "subscription refused");
        self.reject(owner_key, RejectionReason::DuplicateSubscription, err.to_string());
        Ok(())
      }
      Err(err) => Err(err),
    }
  }
}
