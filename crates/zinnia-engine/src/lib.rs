//! Zinnia Engine
//!
//! This crate provides the execution core of the zinnia process engine: the
//! element instance lifecycle, scoped variables, parallel joins, event
//! subprocess interruption and event subscriptions.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Cluster                             │
//! │  - one PartitionRunner per partition                        │
//! │  - routes keyed triggers by the key's partition id          │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PartitionRunner                         │
//! │  - owns mpsc channel of triggers                            │
//! │  - start(cancel) runs the processing loop                   │
//! │  - hands records to a RecordNotifier                        │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                             │
//! │  - deployments, process instances, key generator            │
//! │  - process(trigger) → records, one atomic step per trigger  │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                           Step                              │
//! │  - FIFO command queue drained to a fixed point              │
//! │  - lifecycle, per-type behavior, interruption               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use zinnia_engine::{DefinitionRef, Engine, EngineConfig, Trigger};
//!
//! let mut engine = Engine::new(EngineConfig::default())?;
//! engine.deploy(ExecutableProcess::from_def(def)?);
//!
//! let records = engine.process(Trigger::StartInstance {
//!     definition: DefinitionRef::latest("order"),
//!     variables: Default::default(),
//! })?;
//! ```

mod behavior;
mod cluster;
mod config;
mod engine;
mod error;
mod events;
mod expression;
mod gateway;
mod instance;
mod interrupt;
mod key;
mod lifecycle;
mod processor;
mod record;
mod runner;
mod state;
mod subscriptions;
mod trigger;
mod variables;

pub use cluster::Cluster;
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::EngineError;
pub use events::{ChannelNotifier, NoopNotifier, RecordNotifier};
pub use gateway::{GatewaySynchronizer, JoinOutcome, SequenceFlowToken};
pub use instance::{ElementInstance, InstanceTree, InterruptPhase, PendingBoundary};
pub use key::{Key, KeyGenerator, MAX_PARTITION_ID};
pub use lifecycle::{Intent, LifecycleState, is_terminal_record};
pub use record::{
  IncidentRecord, JobRecord, LifecycleRecord, Record, RejectionReason, RejectionRecord,
  VariableIntent, VariableRecord,
};
pub use runner::PartitionRunner;
pub use state::InstanceState;
pub use subscriptions::{Subscription, SubscriptionKind, SubscriptionManager, SubscriptionOrigin};
pub use trigger::{DefinitionRef, EventMatch, TransitionTarget, Trigger, VariableSemantics};
pub use variables::{VariableChange, VariableStore, Variables};

// Re-export the model so callers need only this crate.
pub use zinnia_config::ProcessDef;
pub use zinnia_model::{ElementType, ExecutableProcess, ModelError};
