//! Scoped variables: local and propagating writes, mappings, job results.

mod common;

use common::*;
use serde_json::json;
use zinnia_engine::{EngineError, Key, Record, Trigger, VariableIntent, VariableRecord, VariableSemantics};

fn waiting_in_sub_process() -> Harness {
  Harness::new(process(
    "scoped",
    vec![
      start("start"),
      sub_process(
        "sub",
        vec![start("sub_start"), service_task("work"), end("sub_end")],
        vec![flow("s1", "sub_start", "work"), flow("s2", "work", "sub_end")],
      ),
      end("end"),
    ],
    vec![flow("f1", "start", "sub"), flow("f2", "sub", "end")],
  ))
}

fn variable_records(records: &[Record]) -> Vec<&VariableRecord> {
  records.iter().filter_map(Record::as_variable).collect()
}

fn update(scope_key: Key, semantics: VariableSemantics, document: serde_json::Value) -> Trigger {
  Trigger::VariableUpdateRequested {
    scope_key,
    semantics,
    document: vars(document),
  }
}

#[test]
fn test_local_write_is_not_visible_in_parent() {
  let mut harness = waiting_in_sub_process();
  let key = harness.start("scoped", json!({}));
  let sub = harness.key_of("sub");
  let work = harness.key_of("work");

  harness.process(update(sub, VariableSemantics::Local, json!({ "y": 2 })));

  let variables = harness.engine.instance(key).unwrap().variables();
  assert_eq!(variables.get(sub, "y"), Some(&json!(2)));
  assert_eq!(variables.get(work, "y"), Some(&json!(2)));
  assert_eq!(variables.get(key, "y"), None);
}

#[test]
fn test_propagating_write_updates_nearest_holder() {
  let mut harness = waiting_in_sub_process();
  let key = harness.start("scoped", json!({ "x": 1 }));
  let work = harness.key_of("work");

  let records = harness.process(update(work, VariableSemantics::Propagate, json!({ "x": 5 })));

  let written = variable_records(&records);
  assert_eq!(written.len(), 1);
  assert_eq!(written[0].scope_key, key);
  assert_eq!(written[0].intent, VariableIntent::Updated);
  assert_eq!(harness.variable(work, "x"), None);
}

#[test]
fn test_propagating_write_without_holder_stays_in_scope() {
  let mut harness = waiting_in_sub_process();
  let key = harness.start("scoped", json!({}));
  let sub = harness.key_of("sub");

  harness.process(update(sub, VariableSemantics::Propagate, json!({ "z": true })));

  assert_eq!(harness.variable(sub, "z"), Some(json!(true)));
  assert_eq!(harness.variable(key, "z"), None);
}

#[test]
fn test_unchanged_write_emits_nothing() {
  let mut harness = waiting_in_sub_process();
  let key = harness.start("scoped", json!({ "x": 1 }));

  let records = harness.process(update(key, VariableSemantics::Local, json!({ "x": 1 })));

  assert!(records.is_empty());
}

#[test]
fn test_update_of_unknown_scope_is_rejected() {
  let mut harness = waiting_in_sub_process();
  harness.start("scoped", json!({}));

  let result = harness.try_process(update(Key::new(1, 4_242), VariableSemantics::Local, json!({ "x": 1 })));

  assert!(matches!(result, Err(EngineError::InvalidScope { .. })));
}

#[test]
fn test_start_variables_are_created_on_the_process() {
  let mut harness = waiting_in_sub_process();

  let key = harness.start("scoped", json!({ "a": 1, "b": "two" }));

  let created = variable_records(&harness.records);
  let names: Vec<&str> = created.iter().map(|v| v.name.as_str()).collect();
  assert_eq!(names, vec!["a", "b"]);
  assert!(created.iter().all(|v| v.scope_key == key && v.intent == VariableIntent::Created));
}

#[test]
fn test_job_result_lands_in_flow_scope() {
  let mut harness = waiting_in_sub_process();
  let key = harness.start("scoped", json!({ "status": "new" }));
  let sub = harness.key_of("sub");

  let records = harness.complete_job("work", json!({ "status": "done", "attempts": 1 }));

  let written = variable_records(&records);
  let status = written.iter().find(|v| v.name == "status").unwrap();
  assert_eq!(status.scope_key, key);
  assert_eq!(status.intent, VariableIntent::Updated);
  let attempts = written.iter().find(|v| v.name == "attempts").unwrap();
  assert_eq!(attempts.scope_key, sub);
}

#[test]
fn test_input_mapping_shields_parent() {
  let mut harness = Harness::new(process(
    "shielded",
    vec![
      start("start"),
      sub_process(
        "sub",
        vec![start("sub_start"), service_task("work"), end("sub_end")],
        vec![flow("s1", "sub_start", "work"), flow("s2", "work", "sub_end")],
      )
      .with_input("counter", "counter + 1"),
      end("end"),
    ],
    vec![flow("f1", "start", "sub"), flow("f2", "sub", "end")],
  ));
  let key = harness.start("shielded", json!({ "counter": 10 }));
  let sub = harness.key_of("sub");
  assert_eq!(harness.variable(sub, "counter"), Some(json!(11)));

  harness.complete_job("work", json!({ "counter": 3 }));

  let writes: Vec<Key> = variable_records(&harness.records)
    .into_iter()
    .filter(|v| v.name == "counter" && v.value == json!(3))
    .map(|v| v.scope_key)
    .collect();
  assert_eq!(writes, vec![sub]);
  assert!(!variable_records(&harness.records)
    .iter()
    .any(|v| v.scope_key == key && v.intent == VariableIntent::Updated));
  assert!(harness.is_completed(key));
}

#[test]
fn test_output_mapping_decides_what_reaches_flow_scope() {
  let mut harness = Harness::new(process(
    "priced",
    vec![
      start("start"),
      service_task("quote").with_output("total", "price * quantity"),
      service_task("confirm"),
      end("end"),
    ],
    vec![
      flow("f1", "start", "quote"),
      flow("f2", "quote", "confirm"),
      flow("f3", "confirm", "end"),
    ],
  ));
  let key = harness.start("priced", json!({}));
  let quote = harness.key_of("quote");

  harness.complete_job("quote", json!({ "price": 4, "quantity": 2 }));

  assert_eq!(harness.variable(key, "total"), Some(json!(8)));
  assert_eq!(harness.variable(key, "price"), None);
  let price = variable_records(&harness.records)
    .into_iter()
    .find(|v| v.name == "price")
    .unwrap();
  assert_eq!(price.scope_key, quote);
  assert_eq!(harness.job("confirm").variables.get("total"), Some(&json!(8)));
}
