//! Boundary events and intermediate catch events.

mod common;

use common::*;
use serde_json::json;
use zinnia_config::EventDef;
use zinnia_engine::{Intent, Record, SubscriptionKind, VariableIntent};

use Intent::*;

fn guarded_task() -> Harness {
  Harness::new(process(
    "guarded",
    vec![
      start("start"),
      service_task("work"),
      end("end"),
      boundary("escalate", "work", EventDef::message("escalate", "{{ order_id }}"), true),
      task("escalation"),
      end("escalated"),
      boundary("remind", "work", EventDef::timer(60_000), false),
      end("reminded"),
    ],
    vec![
      flow("f1", "start", "work"),
      flow("f2", "work", "end"),
      flow("e1", "escalate", "escalation"),
      flow("e2", "escalation", "escalated"),
      flow("r1", "remind", "reminded"),
    ],
  ))
}

#[test]
fn test_boundary_subscriptions_open_with_activity() {
  let mut harness = guarded_task();
  harness.start("guarded", json!({ "order_id": "o-7" }));
  let work = harness.key_of("work");

  let opened: Vec<_> = harness
    .records
    .iter()
    .filter_map(|r| match r {
      Record::SubscriptionOpened(s) => Some(s),
      _ => None,
    })
    .collect();
  assert_eq!(opened.len(), 2);
  assert!(opened.iter().all(|s| s.scope_key == work));
  assert!(opened.iter().any(|s| s.kind
    == SubscriptionKind::Message {
      name: "escalate".to_string(),
      correlation_key: "o-7".to_string(),
    }));
  assert!(opened.iter().any(|s| s.kind == SubscriptionKind::Timer { due_at: 60_000 }));
}

#[test]
fn test_interrupting_boundary_replaces_activity() {
  let mut harness = guarded_task();
  let key = harness.start("guarded", json!({ "order_id": "o-7" }));
  let work = harness.key_of("work");

  harness.publish("escalate", "o-7", json!({ "level": 2 }));

  assert_eq!(harness.intents_by_key(work), vec![
    ElementActivating,
    ElementActivated,
    EventOccurred,
    ElementTerminating,
    ElementTerminated,
  ]);
  assert!(harness.position("work", ElementTerminated) < harness.position("escalate", ElementActivating));
  assert!(harness.records.iter().any(|r| matches!(r, Record::JobCancelRequested(job) if job.element_id == "work")));
  assert_eq!(harness.count("escalation", ElementCompleted), 1);
  assert_eq!(harness.count("end", ElementActivating), 0);
  assert!(harness.is_completed(key));
  assert!(harness.records.iter().any(|r| matches!(
    r,
    Record::Variable(v) if v.name == "level" && v.scope_key == key && v.intent == VariableIntent::Created
  )));
}

#[test]
fn test_boundary_payload_reaches_flow_scope() {
  let mut harness = Harness::new(process(
    "updates",
    vec![
      start("start"),
      sub_process(
        "sub",
        vec![start("sub_start"), service_task("work")],
        vec![flow("s1", "sub_start", "work")],
      ),
      boundary("update", "sub", EventDef::message("update", "{{ order_id }}"), false),
      end("updated"),
    ],
    vec![flow("f1", "start", "sub"), flow("u1", "update", "updated")],
  ));
  let key = harness.start("updates", json!({ "order_id": "o-1" }));

  harness.publish("update", "o-1", json!({ "x": 1 }));

  assert_eq!(harness.count("update", ElementCompleted), 1);
  assert_eq!(harness.variable(key, "x"), Some(json!(1)));
  assert_eq!(harness.variable(harness.key_of("sub"), "x"), None);
  assert!(!harness.is_completed(key));
}

#[test]
fn test_non_interrupting_boundary_runs_beside_activity() {
  let mut harness = guarded_task();
  let key = harness.start("guarded", json!({ "order_id": "o-7" }));

  harness.advance_time(60_000);

  assert_eq!(harness.count("remind", ElementCompleted), 1);
  assert_eq!(harness.count("reminded", ElementCompleted), 1);
  assert_eq!(harness.intents_of("work"), vec![ElementActivating, ElementActivated, EventOccurred]);
  assert!(!harness.is_completed(key));

  harness.complete_job("work", json!({}));
  assert!(harness.is_completed(key));
}

#[test]
fn test_completed_activity_closes_boundary_subscriptions() {
  let mut harness = guarded_task();
  harness.start("guarded", json!({ "order_id": "o-7" }));

  let records = harness.complete_job("work", json!({}));

  let closed = records
    .iter()
    .filter(|r| matches!(r, Record::SubscriptionClosed(_)))
    .count();
  assert_eq!(closed, 2);
  assert!(harness.publish("escalate", "o-7", json!({})).is_empty());
  assert!(harness.advance_time(120_000).is_empty());
}

#[test]
fn test_interrupting_boundary_on_sub_process_terminates_children_first() {
  let mut harness = Harness::new(process(
    "guarded_sub",
    vec![
      start("start"),
      sub_process(
        "sub",
        vec![start("sub_start"), service_task("work")],
        vec![flow("s1", "sub_start", "work")],
      ),
      boundary("abort", "sub", EventDef::signal("abort"), true),
      end("aborted"),
    ],
    vec![flow("f1", "start", "sub"), flow("a1", "abort", "aborted")],
  ));
  let key = harness.start("guarded_sub", json!({}));

  harness.signal("abort");

  assert!(harness.position("work", ElementTerminated) < harness.position("sub", ElementTerminated));
  assert!(harness.position("sub", ElementTerminated) < harness.position("abort", ElementActivating));
  assert!(harness.is_completed(key));
}

#[test]
fn test_catch_event_hands_payload_to_flow_scope() {
  let mut harness = Harness::new(process(
    "payment",
    vec![
      start("start"),
      catch_event("paid", EventDef::message("paid", "{{ order_id }}")).with_input("fee", "2"),
      service_task("ship"),
      end("end"),
    ],
    vec![
      flow("f1", "start", "paid"),
      flow("f2", "paid", "ship"),
      flow("f3", "ship", "end"),
    ],
  ));
  let key = harness.start("payment", json!({ "order_id": "o-1" }));

  assert!(harness.publish("paid", "o-2", json!({ "amount": 30 })).is_empty());
  harness.publish("paid", "o-1", json!({ "amount": 30 }));

  assert_eq!(harness.intents_of("paid"), vec![
    ElementActivating,
    ElementActivated,
    EventOccurred,
    ElementCompleting,
    ElementCompleted,
  ]);
  assert_eq!(harness.variable(key, "amount"), Some(json!(30)));
  assert_eq!(harness.job("ship").variables.get("amount"), Some(&json!(30)));
  // Input mapping locals of the catch event are not handed off.
  assert_eq!(harness.variable(key, "fee"), None);
  assert!(!harness.job("ship").variables.contains_key("fee"));
}

#[test]
fn test_timer_catch_event_waits_for_clock() {
  let mut harness = Harness::new(process(
    "delay",
    vec![start("start"), catch_event("wait", EventDef::timer(1_000)), end("end")],
    vec![flow("f1", "start", "wait"), flow("f2", "wait", "end")],
  ));
  let key = harness.start("delay", json!({}));

  assert!(harness.advance_time(999).is_empty());
  harness.advance_time(1_000);

  assert!(harness.is_completed(key));
}
