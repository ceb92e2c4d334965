//! Zinnia Config
//!
//! This crate contains the serializable process definition types for Zinnia.
//! These types describe a process model before it is validated and flattened
//! into an executable graph by `zinnia-model`.
//!
//! Definitions can be loaded from:
//! - JSON files (via CLI with `zinnia run definition.json`)
//! - Any store that keeps them as JSON blobs
//!
//! Scopes nest: a `sub_process` or `event_sub_process` element carries its own
//! `elements` and `flows`, mirroring how the process model is drawn.

mod element;
mod event;
mod flow;
mod input;
mod process;

pub use element::{ElementDef, ElementKind};
pub use event::EventDef;
pub use flow::FlowDef;
pub use input::InputValue;
pub use process::ProcessDef;
