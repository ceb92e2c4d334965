//! Flattening and validation of a `ProcessDef`.

use std::collections::{BTreeMap, HashMap};

use zinnia_config::{ElementDef, ElementKind as DefKind, FlowDef, ProcessDef};

use crate::element::{Element, ElementKind, ElementType, SequenceFlow};
use crate::error::ModelError;
use crate::graph::Graph;
use crate::process::ExecutableProcess;

pub(crate) fn build(def: ProcessDef) -> Result<ExecutableProcess, ModelError> {
  let ProcessDef {
    process_id,
    name,
    version,
    elements,
    flows,
  } = def;

  let mut builder = Builder::default();
  builder.insert(Element {
    element_id: process_id.clone(),
    kind: ElementKind::Process,
    flow_scope: None,
    inputs: BTreeMap::new(),
    outputs: BTreeMap::new(),
  })?;
  builder.add_scope(&process_id, elements, flows)?;

  let ordered: Vec<&Element> = builder
    .order
    .iter()
    .filter_map(|id| builder.elements.get(id))
    .collect();
  let graph = Graph::new(&ordered, &builder.flows);

  let process = ExecutableProcess {
    process_id,
    name,
    version,
    elements: builder.elements,
    flows: builder
      .flows
      .into_iter()
      .map(|f| (f.flow_id.clone(), f))
      .collect(),
    graph,
  };

  validate(&process)?;
  Ok(process)
}

#[derive(Default)]
struct Builder {
  elements: HashMap<String, Element>,
  order: Vec<String>,
  flows: Vec<SequenceFlow>,
}

impl Builder {
  fn insert(&mut self, element: Element) -> Result<(), ModelError> {
    if self.elements.contains_key(&element.element_id) {
      return Err(ModelError::DuplicateElement(element.element_id));
    }
    self.order.push(element.element_id.clone());
    self.elements.insert(element.element_id.clone(), element);
    Ok(())
  }

  fn add_scope(
    &mut self,
    scope_id: &str,
    elements: Vec<ElementDef>,
    flows: Vec<FlowDef>,
  ) -> Result<(), ModelError> {
    for def in elements {
      let ElementDef {
        element_id,
        kind,
        inputs,
        outputs,
      } = def;

      let (kind, nested) = match kind {
        DefKind::SubProcess { elements, flows } => (ElementKind::SubProcess, Some((elements, flows))),
        DefKind::EventSubProcess { elements, flows } => {
          (ElementKind::EventSubProcess, Some((elements, flows)))
        }
        DefKind::StartEvent {
          event,
          interrupting,
        } => (
          ElementKind::StartEvent {
            event,
            interrupting,
          },
          None,
        ),
        DefKind::EndEvent => (ElementKind::EndEvent, None),
        DefKind::Task => (ElementKind::Task, None),
        DefKind::ServiceTask { job_type } => (ElementKind::ServiceTask { job_type }, None),
        DefKind::IntermediateCatchEvent { event } => {
          (ElementKind::IntermediateCatchEvent { event }, None)
        }
        DefKind::BoundaryEvent {
          attached_to,
          event,
          cancel_activity,
        } => (
          ElementKind::BoundaryEvent {
            attached_to,
            event,
            cancel_activity,
          },
          None,
        ),
        DefKind::ParallelGateway => (ElementKind::ParallelGateway, None),
        DefKind::ExclusiveGateway { default_flow } => {
          (ElementKind::ExclusiveGateway { default_flow }, None)
        }
      };

      self.insert(Element {
        element_id: element_id.clone(),
        kind,
        flow_scope: Some(scope_id.to_string()),
        inputs,
        outputs,
      })?;

      if let Some((elements, flows)) = nested {
        self.add_scope(&element_id, elements, flows)?;
      }
    }

    for flow in flows {
      if self.flows.iter().any(|f| f.flow_id == flow.flow_id) {
        return Err(ModelError::DuplicateFlow(flow.flow_id));
      }
      self.flows.push(SequenceFlow {
        flow_id: flow.flow_id,
        source: flow.from,
        target: flow.to,
        condition: flow.condition,
        flow_scope: scope_id.to_string(),
      });
    }

    Ok(())
  }
}

fn validate(process: &ExecutableProcess) -> Result<(), ModelError> {
  for flow in process.flows.values() {
    let (Some(source), Some(target)) = (
      process.elements.get(&flow.source),
      process.elements.get(&flow.target),
    ) else {
      return Err(ModelError::InvalidFlow {
        flow_id: flow.flow_id.clone(),
        from: flow.source.clone(),
        to: flow.target.clone(),
      });
    };
    let in_scope = |e: &Element| e.flow_scope.as_deref() == Some(flow.flow_scope.as_str());
    if !in_scope(source) || !in_scope(target) {
      return Err(ModelError::FlowCrossesScope {
        flow_id: flow.flow_id.clone(),
      });
    }
  }

  let graph = &process.graph;
  for element in process.elements.values() {
    let id = &element.element_id;
    match &element.kind {
      ElementKind::Process | ElementKind::SubProcess => {
        let found = graph
          .start_events(id)
          .iter()
          .filter(|s| process.elements.get(*s).is_some_and(|e| e.event().is_none()))
          .count();
        if found != 1 {
          return Err(ModelError::StartEventCount {
            scope_id: id.clone(),
            found,
          });
        }
      }
      ElementKind::EventSubProcess => validate_event_sub_process(process, element)?,
      ElementKind::StartEvent { event, .. } => {
        if !graph.incoming(id).is_empty() {
          return Err(ModelError::InvalidStartEvent {
            element_id: id.clone(),
            message: "start events cannot have incoming flows".to_string(),
          });
        }
        let in_event_sub_process = element
          .flow_scope
          .as_deref()
          .and_then(|scope| process.elements.get(scope))
          .is_some_and(|scope| scope.element_type() == ElementType::EventSubProcess);
        if event.is_some() != in_event_sub_process {
          return Err(ModelError::InvalidStartEvent {
            element_id: id.clone(),
            message: "event start events are only allowed in event subprocesses".to_string(),
          });
        }
      }
      ElementKind::BoundaryEvent { attached_to, .. } => {
        let attached = process.elements.get(attached_to).ok_or_else(|| {
          ModelError::InvalidBoundaryEvent {
            element_id: id.clone(),
            message: format!("attached activity '{}' not found", attached_to),
          }
        })?;
        if !attached.element_type().is_activity() || attached.flow_scope != element.flow_scope {
          return Err(ModelError::InvalidBoundaryEvent {
            element_id: id.clone(),
            message: format!("'{}' is not an activity in the same scope", attached_to),
          });
        }
        if !graph.incoming(id).is_empty() {
          return Err(ModelError::InvalidBoundaryEvent {
            element_id: id.clone(),
            message: "boundary events cannot have incoming flows".to_string(),
          });
        }
      }
      ElementKind::ExclusiveGateway {
        default_flow: Some(flow_id),
      } => {
        if !graph.outgoing(id).contains(flow_id) {
          return Err(ModelError::InvalidDefaultFlow {
            element_id: id.clone(),
            flow_id: flow_id.clone(),
          });
        }
      }
      _ => {}
    }
  }

  Ok(())
}

fn validate_event_sub_process(
  process: &ExecutableProcess,
  element: &Element,
) -> Result<(), ModelError> {
  let id = &element.element_id;
  let graph = &process.graph;

  if !graph.incoming(id).is_empty() || !graph.outgoing(id).is_empty() {
    return Err(ModelError::InvalidEventSubProcess {
      element_id: id.clone(),
      message: "event subprocesses cannot have sequence flows".to_string(),
    });
  }

  let starts = graph.start_events(id);
  let event_starts = starts
    .iter()
    .filter(|s| process.elements.get(*s).is_some_and(|e| e.event().is_some()))
    .count();
  if starts.len() != 1 || event_starts != 1 {
    return Err(ModelError::InvalidEventSubProcess {
      element_id: id.clone(),
      message: "exactly one start event with an event definition is required".to_string(),
    });
  }

  Ok(())
}
