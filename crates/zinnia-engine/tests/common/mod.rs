#![allow(dead_code)]

use serde_json::Value;
use zinnia_config::{ElementDef, ElementKind, EventDef, FlowDef, ProcessDef};
use zinnia_engine::{
  DefinitionRef, ElementType, Engine, EngineConfig, EngineError, EventMatch, ExecutableProcess,
  Intent, JobRecord, Key, LifecycleRecord, Record, TransitionTarget, Trigger, Variables,
};

pub fn vars(value: Value) -> Variables {
  value.as_object().cloned().expect("variables must be a JSON object")
}

pub fn process(process_id: &str, elements: Vec<ElementDef>, flows: Vec<FlowDef>) -> ProcessDef {
  ProcessDef {
    process_id: process_id.to_string(),
    name: process_id.to_string(),
    version: 1,
    elements,
    flows,
  }
}

pub fn start(id: &str) -> ElementDef {
  ElementDef::new(id, ElementKind::StartEvent {
    event: None,
    interrupting: true,
  })
}

pub fn event_start(id: &str, event: EventDef, interrupting: bool) -> ElementDef {
  ElementDef::new(id, ElementKind::StartEvent {
    event: Some(event),
    interrupting,
  })
}

pub fn end(id: &str) -> ElementDef {
  ElementDef::new(id, ElementKind::EndEvent)
}

pub fn task(id: &str) -> ElementDef {
  ElementDef::new(id, ElementKind::Task)
}

pub fn service_task(id: &str) -> ElementDef {
  ElementDef::new(id, ElementKind::ServiceTask {
    job_type: id.to_string(),
  })
}

pub fn catch_event(id: &str, event: EventDef) -> ElementDef {
  ElementDef::new(id, ElementKind::IntermediateCatchEvent { event })
}

pub fn boundary(id: &str, attached_to: &str, event: EventDef, cancel_activity: bool) -> ElementDef {
  ElementDef::new(id, ElementKind::BoundaryEvent {
    attached_to: attached_to.to_string(),
    event,
    cancel_activity,
  })
}

pub fn parallel(id: &str) -> ElementDef {
  ElementDef::new(id, ElementKind::ParallelGateway)
}

pub fn exclusive(id: &str, default_flow: Option<&str>) -> ElementDef {
  ElementDef::new(id, ElementKind::ExclusiveGateway {
    default_flow: default_flow.map(str::to_string),
  })
}

pub fn sub_process(id: &str, elements: Vec<ElementDef>, flows: Vec<FlowDef>) -> ElementDef {
  ElementDef::new(id, ElementKind::SubProcess { elements, flows })
}

pub fn event_sub_process(id: &str, elements: Vec<ElementDef>, flows: Vec<FlowDef>) -> ElementDef {
  ElementDef::new(id, ElementKind::EventSubProcess { elements, flows })
}

pub fn flow(id: &str, from: &str, to: &str) -> FlowDef {
  FlowDef::new(id, from, to)
}

/// Drives one engine and keeps every record it produced.
pub struct Harness {
  pub engine: Engine,
  pub records: Vec<Record>,
}

impl Harness {
  pub fn new(def: ProcessDef) -> Self {
    let mut engine = Engine::new(EngineConfig::default()).expect("valid config");
    engine.deploy(ExecutableProcess::from_def(def).expect("valid process"));
    Self {
      engine,
      records: Vec::new(),
    }
  }

  pub fn try_process(&mut self, trigger: Trigger) -> Result<Vec<Record>, EngineError> {
    let records = self.engine.process(trigger)?;
    self.records.extend(records.iter().cloned());
    Ok(records)
  }

  pub fn process(&mut self, trigger: Trigger) -> Vec<Record> {
    self.try_process(trigger).expect("trigger processed")
  }

  /// Start an instance of the only deployed process.
  pub fn start(&mut self, process_id: &str, variables: Value) -> Key {
    let records = self.process(Trigger::StartInstance {
      definition: DefinitionRef::latest(process_id),
      variables: vars(variables),
    });
    records
      .iter()
      .find_map(Record::process_instance_key)
      .expect("instance started")
  }

  pub fn publish(&mut self, name: &str, correlation_key: &str, payload: Value) -> Vec<Record> {
    self.process(Trigger::ExternalEventOccurred {
      subscription_match: EventMatch::message(name, correlation_key),
      payload: vars(payload),
    })
  }

  pub fn signal(&mut self, name: &str) -> Vec<Record> {
    self.process(Trigger::ExternalEventOccurred {
      subscription_match: EventMatch::signal(name),
      payload: Variables::new(),
    })
  }

  pub fn advance_time(&mut self, now: u64) -> Vec<Record> {
    self.process(Trigger::ExternalEventOccurred {
      subscription_match: EventMatch::Timer { now },
      payload: Variables::new(),
    })
  }

  pub fn complete_job(&mut self, element_id: &str, variables: Value) -> Vec<Record> {
    let job_key = self.job(element_id).job_key;
    self.process(Trigger::JobCompleted {
      job_key,
      variables: vars(variables),
    })
  }

  pub fn request(&mut self, instance_key: Key, target: TransitionTarget) -> Vec<Record> {
    self.process(Trigger::ElementTransitionRequested {
      instance_key,
      target,
    })
  }

  pub fn lifecycle(&self) -> Vec<&LifecycleRecord> {
    self.records.iter().filter_map(Record::as_lifecycle).collect()
  }

  /// `(element id, intent)` of every lifecycle record, in order.
  pub fn trace(&self) -> Vec<(String, Intent)> {
    self
      .lifecycle()
      .into_iter()
      .map(|r| (r.element_id.clone(), r.intent))
      .collect()
  }

  pub fn intents_of(&self, element_id: &str) -> Vec<Intent> {
    self
      .lifecycle()
      .into_iter()
      .filter(|r| r.element_id == element_id)
      .map(|r| r.intent)
      .collect()
  }

  pub fn intents_by_key(&self, key: Key) -> Vec<Intent> {
    self
      .lifecycle()
      .into_iter()
      .filter(|r| r.key == key)
      .map(|r| r.intent)
      .collect()
  }

  pub fn count(&self, element_id: &str, intent: Intent) -> usize {
    self
      .lifecycle()
      .into_iter()
      .filter(|r| r.element_id == element_id && r.intent == intent)
      .count()
  }

  /// Index of the first lifecycle record for `element_id` with `intent`.
  pub fn position(&self, element_id: &str, intent: Intent) -> usize {
    self
      .lifecycle()
      .iter()
      .position(|r| r.element_id == element_id && r.intent == intent)
      .unwrap_or_else(|| panic!("no {} record for '{}'", intent, element_id))
  }

  /// Key of the latest activation of `element_id`.
  pub fn key_of(&self, element_id: &str) -> Key {
    self
      .lifecycle()
      .into_iter()
      .rev()
      .find(|r| r.element_id == element_id && r.intent == Intent::ElementActivating)
      .map(|r| r.key)
      .unwrap_or_else(|| panic!("'{}' was never activated", element_id))
  }

  pub fn keys_of(&self, element_id: &str, element_type: ElementType) -> Vec<Key> {
    self
      .lifecycle()
      .into_iter()
      .filter(|r| {
        r.element_id == element_id
          && r.element_type == element_type
          && r.intent == Intent::ElementActivating
      })
      .map(|r| r.key)
      .collect()
  }

  /// Latest job created for `element_id`.
  pub fn job(&self, element_id: &str) -> &JobRecord {
    self
      .records
      .iter()
      .rev()
      .find_map(|r| match r {
        Record::JobCreateRequested(job) if job.element_id == element_id => Some(job),
        _ => None,
      })
      .unwrap_or_else(|| panic!("no job for '{}'", element_id))
  }

  pub fn variable(&self, scope_key: Key, name: &str) -> Option<Value> {
    let instance = self.engine.instances().find(|i| i.tree().contains(scope_key))?;
    instance.variables().get_local(scope_key, name).cloned()
  }

  pub fn is_completed(&self, process_instance_key: Key) -> bool {
    self
      .lifecycle()
      .iter()
      .any(|r| r.key == process_instance_key && r.intent == Intent::ElementCompleted)
  }
}
