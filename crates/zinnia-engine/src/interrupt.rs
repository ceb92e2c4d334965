//! Event triggering and interruption.
//!
//! An interrupting event subprocess moves its owning scope through
//!
//! ```text
//!   Armed -> Triggered -> ActivatingHandler -> HandlerActive -> ScopeCompleting
//! ```
//!
//! While the phase is `Triggered` the scope's other children are terminating and
//! nothing new may start in it. The handler is activated by whichever event
//! removes the last child, so its ACTIVATED record always follows the last
//! sibling's TERMINATED record. A second interrupting trigger for a scope whose
//! interrupt is in flight is refused.
//!
//! Interrupting boundary events reuse regular termination: the activity is
//! terminated, and when it reaches TERMINATED the boundary event is activated in
//! the activity's flow scope.

use tracing::{debug, info};
use zinnia_model::Element;

use crate::error::EngineError;
use crate::instance::{InterruptPhase, PendingBoundary};
use crate::key::Key;
use crate::lifecycle::LifecycleState;
use crate::processor::{Command, Step};
use crate::record::Record;
use crate::subscriptions::{Subscription, SubscriptionOrigin};
use crate::trigger::VariableSemantics;
use crate::variables::Variables;

impl Step<'_> {
  pub(crate) fn trigger(&mut self, subscription: Subscription, payload: Variables) -> Result<(), EngineError> {
    match self.try_trigger(&subscription, payload) {
      Err(EngineError::ConcurrentInterruptRejected { scope_key }) => {
        debug!(
          scope_key = %scope_key,
          handler = %subscription.handler_element_id,
          "interrupt already in flight, discarding event"
        );
        Ok(())
      }
      other => other,
    }
  }

  fn try_trigger(&mut self, subscription: &Subscription, payload: Variables) -> Result<(), EngineError> {
    let owner_key = subscription.scope_key;
    let Some(owner) = self.state.tree.get(owner_key) else {
      debug!(subscription_key = %subscription.key, "subscription owner is gone, discarding event");
      return Ok(());
    };

    if subscription.interrupting && (owner.interrupt.in_flight() || owner.boundary_interrupt.is_some()) {
      return Err(EngineError::ConcurrentInterruptRejected { scope_key: owner_key });
    }
    if owner.state != LifecycleState::Activated || self.state.subscriptions.get(subscription.key).is_none() {
      debug!(subscription_key = %subscription.key, "subscription is no longer open, discarding event");
      return Ok(());
    }

    match subscription.origin {
      SubscriptionOrigin::EventSubProcess => self.trigger_event_sub_process(subscription, payload),
      SubscriptionOrigin::BoundaryEvent => self.trigger_boundary_event(subscription, payload),
      SubscriptionOrigin::CatchEvent => self.trigger_catch_event(subscription, payload),
    }
  }

  fn trigger_event_sub_process(&mut self, subscription: &Subscription, payload: Variables) -> Result<(), EngineError> {
    let scope_key = subscription.scope_key;
    let process = self.process();
    let handler_id = process
      .element(&subscription.handler_element_id)?
      .flow_scope
      .clone()
      .ok_or_else(|| {
        EngineError::invariant(format!(
          "start event '{}' is not inside an event subprocess",
          subscription.handler_element_id
        ))
      })?;

    self.event_occurred(scope_key)?;

    if !subscription.interrupting {
      if !subscription.is_repeating() {
        self.consume(subscription.key);
      }
      return self.enqueue_activation(&handler_id, scope_key, payload);
    }

    info!(
      process_instance_key = %self.state.process_instance_key,
      scope_key = %scope_key,
      handler_id = %handler_id,
      "interrupting scope"
    );
    if let Some(scope) = self.state.tree.get_mut(scope_key) {
      scope.interrupt = InterruptPhase::Triggered { handler_id, payload };
    }

    // Boundary subscriptions of the scope stay open; only its own event
    // subprocesses are disarmed.
    let closed = self
      .state
      .subscriptions
      .close_where(scope_key, |s| s.origin == SubscriptionOrigin::EventSubProcess);
    for subscription in closed {
      self.emit(Record::SubscriptionClosed(subscription));
    }
    self.discard_tokens(scope_key);

    let children = self.state.tree.children(scope_key);
    if children.is_empty() {
      return self.activate_interrupt_handler(scope_key);
    }
    for child in children {
      self.enqueue(Command::Terminate { key: child });
    }
    Ok(())
  }

  /// Hand a triggered scope over to its event subprocess once its children are gone.
  pub(crate) fn activate_interrupt_handler(&mut self, scope_key: Key) -> Result<(), EngineError> {
    let scope = self
      .state
      .tree
      .get_mut(scope_key)
      .ok_or_else(|| EngineError::invariant(format!("interrupted scope {} does not exist", scope_key)))?;
    let InterruptPhase::Triggered { handler_id, payload } = std::mem::take(&mut scope.interrupt) else {
      return Err(EngineError::invariant(format!(
        "scope {} has no interrupt to hand over",
        scope_key
      )));
    };
    scope.interrupt = InterruptPhase::ActivatingHandler {
      handler_id: handler_id.clone(),
    };
    self.enqueue_activation(&handler_id, scope_key, payload)
  }

  pub(crate) fn mark_handler_active(&mut self, key: Key, handler: &Element) {
    let Some(scope_key) = self.state.tree.get(key).and_then(|i| i.flow_scope_key) else {
      return;
    };
    if let Some(scope) = self.state.tree.get_mut(scope_key) {
      let activating = matches!(
        &scope.interrupt,
        InterruptPhase::ActivatingHandler { handler_id } if *handler_id == handler.element_id
      );
      if activating {
        scope.interrupt = InterruptPhase::HandlerActive { handler_key: key };
      }
    }
  }

  fn trigger_boundary_event(&mut self, subscription: &Subscription, payload: Variables) -> Result<(), EngineError> {
    let activity_key = subscription.scope_key;
    let flow_scope_key = self.flow_scope_of(activity_key)?;

    self.event_occurred(activity_key)?;

    if !subscription.interrupting {
      if !subscription.is_repeating() {
        self.consume(subscription.key);
      }
      return self.enqueue_activation(&subscription.handler_element_id, flow_scope_key, payload);
    }

    info!(
      process_instance_key = %self.state.process_instance_key,
      activity_key = %activity_key,
      boundary_id = %subscription.handler_element_id,
      "interrupting activity"
    );
    if let Some(activity) = self.state.tree.get_mut(activity_key) {
      activity.boundary_interrupt = Some(PendingBoundary {
        boundary_id: subscription.handler_element_id.clone(),
        payload,
      });
    }
    self.terminate(activity_key)
  }

  /// Activate the boundary event of an activity that has finished terminating.
  pub(crate) fn activate_boundary(&mut self, flow_scope_key: Key, boundary: PendingBoundary) -> Result<(), EngineError> {
    let admits = self
      .state
      .tree
      .get(flow_scope_key)
      .is_some_and(|s| s.state == LifecycleState::Activated);
    if !admits {
      return Ok(());
    }
    self.enqueue_activation(&boundary.boundary_id, flow_scope_key, boundary.payload)
  }

  fn trigger_catch_event(&mut self, subscription: &Subscription, payload: Variables) -> Result<(), EngineError> {
    let key = subscription.scope_key;
    self.consume(subscription.key);
    self.event_occurred(key)?;
    for (name, value) in &payload {
      self.set_variable(key, name, value.clone(), VariableSemantics::Local)?;
    }
    if let Some(instance) = self.state.tree.get_mut(key) {
      instance.payload = payload;
    }
    self.enqueue(Command::Complete { key });
    Ok(())
  }

  fn consume(&mut self, subscription_key: Key) {
    if let Some(subscription) = self.state.subscriptions.remove(subscription_key) {
      self.emit(Record::SubscriptionClosed(subscription));
    }
  }
}
