use std::collections::{HashMap, HashSet};

use crate::element::{Element, ElementKind, SequenceFlow};

/// Index over the flattened process for traversal.
#[derive(Debug, Clone, Default)]
pub struct Graph {
  /// element_id -> outgoing flow ids, in definition order.
  outgoing: HashMap<String, Vec<String>>,
  /// element_id -> incoming flow ids, in definition order.
  incoming: HashMap<String, Vec<String>>,
  /// scope element_id -> direct child element ids.
  children: HashMap<String, Vec<String>>,
  /// scope element_id -> start events declared directly in it.
  start_events: HashMap<String, Vec<String>>,
  /// scope element_id -> event subprocesses declared directly in it.
  event_sub_processes: HashMap<String, Vec<String>>,
  /// activity element_id -> boundary events attached to it.
  boundary_events: HashMap<String, Vec<String>>,
  /// Elements with multiple incoming flows.
  join_points: HashSet<String>,
}

impl Graph {
  /// Build the index from elements (in definition order) and flows.
  pub fn new(elements: &[&Element], flows: &[SequenceFlow]) -> Self {
    let mut graph = Graph::default();

    for element in elements {
      let id = element.element_id.clone();
      graph.outgoing.entry(id.clone()).or_default();
      graph.incoming.entry(id.clone()).or_default();

      let Some(scope) = &element.flow_scope else {
        continue;
      };
      graph.children.entry(scope.clone()).or_default().push(id.clone());

      match &element.kind {
        ElementKind::StartEvent { .. } => {
          graph.start_events.entry(scope.clone()).or_default().push(id);
        }
        ElementKind::EventSubProcess => {
          graph
            .event_sub_processes
            .entry(scope.clone())
            .or_default()
            .push(id);
        }
        ElementKind::BoundaryEvent { attached_to, .. } => {
          graph
            .boundary_events
            .entry(attached_to.clone())
            .or_default()
            .push(id);
        }
        _ => {}
      }
    }

    for flow in flows {
      graph
        .outgoing
        .entry(flow.source.clone())
        .or_default()
        .push(flow.flow_id.clone());
      graph
        .incoming
        .entry(flow.target.clone())
        .or_default()
        .push(flow.flow_id.clone());
    }

    graph.join_points = graph
      .incoming
      .iter()
      .filter(|(_, incoming)| incoming.len() > 1)
      .map(|(id, _)| id.clone())
      .collect();

    graph
  }

  pub fn outgoing(&self, element_id: &str) -> &[String] {
    slice(&self.outgoing, element_id)
  }

  pub fn incoming(&self, element_id: &str) -> &[String] {
    slice(&self.incoming, element_id)
  }

  pub fn children(&self, scope_id: &str) -> &[String] {
    slice(&self.children, scope_id)
  }

  pub fn start_events(&self, scope_id: &str) -> &[String] {
    slice(&self.start_events, scope_id)
  }

  pub fn event_sub_processes(&self, scope_id: &str) -> &[String] {
    slice(&self.event_sub_processes, scope_id)
  }

  pub fn boundary_events(&self, activity_id: &str) -> &[String] {
    slice(&self.boundary_events, activity_id)
  }

  /// Check if an element is a join point (has multiple incoming flows).
  pub fn is_join_point(&self, element_id: &str) -> bool {
    self.join_points.contains(element_id)
  }

  pub fn join_points(&self) -> &HashSet<String> {
    &self.join_points
  }
}

fn slice<'a>(index: &'a HashMap<String, Vec<String>>, key: &str) -> &'a [String] {
  index.get(key).map(|v| v.as_slice()).unwrap_or(&[])
}
