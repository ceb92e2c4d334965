//! Zinnia Model
//!
//! This crate provides the executable representation of a process model.
//! An `ExecutableProcess` is a validated, flattened form of a `ProcessDef`
//! that the engine walks while running instances.
//!
//! Key differences from `zinnia-config`:
//! - Nested scopes are flattened; every element knows its flow scope
//! - Flows are validated (known endpoints, no scope crossing)
//! - Scope entry points, event subprocesses and boundary attachments are indexed
//! - The process itself is an element of type `PROCESS`

mod build;
mod element;
mod error;
mod graph;
mod process;

pub use element::{Element, ElementKind, ElementType, SequenceFlow};
pub use error::ModelError;
pub use graph::Graph;
pub use process::ExecutableProcess;
pub use zinnia_config::EventDef;
