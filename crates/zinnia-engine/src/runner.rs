//! Partition runner with channel-based triggering.
//!
//! The `PartitionRunner` owns an mpsc channel of triggers and feeds them to its
//! `Engine` one at a time. Records produced by each trigger go to the runner's
//! notifier.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::events::{NoopNotifier, RecordNotifier};
use crate::record::Record;
use crate::trigger::Trigger;

/// A processing lane: one engine, one trigger queue.
///
/// # Usage
///
/// ```ignore
/// let runner = PartitionRunner::with_notifier(engine, notifier);
///
/// // Get a sender for collaborators (job workers, message gateways, timers)
/// let sender = runner.sender();
///
/// // Start the processing loop
/// let cancel = CancellationToken::new();
/// let engine = runner.start(cancel).await;
/// ```
pub struct PartitionRunner<N = NoopNotifier> {
  sender: mpsc::Sender<Trigger>,
  receiver: mpsc::Receiver<Trigger>,
  engine: Engine,
  notifier: N,
}

impl PartitionRunner<NoopNotifier> {
  /// Create a new runner that discards the records it produces.
  ///
  /// # Arguments
  ///
  /// * `engine` - The engine to feed, with its processes already deployed
  pub fn new(engine: Engine) -> Self {
    Self::with_notifier(engine, NoopNotifier)
  }
}

impl<N: RecordNotifier> PartitionRunner<N> {
  /// Create a new runner whose channel capacity comes from the engine config.
  ///
  /// # Arguments
  ///
  /// * `engine` - The engine to feed, with its processes already deployed
  /// * `notifier` - Receiver of every record the engine produces
  pub fn with_notifier(engine: Engine, notifier: N) -> Self {
    let buffer_size = engine.config().channel_buffer;
    Self::with_buffer_size(engine, notifier, buffer_size)
  }

  /// Create a new runner with an explicit channel capacity.
  ///
  /// # Arguments
  ///
  /// * `engine` - The engine to feed, with its processes already deployed
  /// * `notifier` - Receiver of every record the engine produces
  /// * `buffer_size` - Capacity of the trigger channel (at least 1)
  pub fn with_buffer_size(engine: Engine, notifier: N, buffer_size: usize) -> Self {
    let (sender, receiver) = mpsc::channel(buffer_size.max(1));
    Self {
      sender,
      receiver,
      engine,
      notifier,
    }
  }

  /// Get a sender handle for submitting triggers to this lane.
  pub fn sender(&self) -> mpsc::Sender<Trigger> {
    self.sender.clone()
  }

  /// Queue a trigger through the channel.
  pub async fn submit(&self, trigger: Trigger) -> Result<(), EngineError> {
    self
      .sender
      .send(trigger)
      .await
      .map_err(|_| EngineError::ChannelClosed)
  }

  /// Process a single trigger directly, bypassing the channel.
  ///
  /// This is useful for testing or one-shot processing.
  pub fn process_once(&mut self, trigger: Trigger) -> Result<Vec<Record>, EngineError> {
    let records = self.engine.process(trigger)?;
    for record in &records {
      self.notifier.notify(record.clone());
    }
    Ok(records)
  }

  /// Get a reference to the engine.
  pub fn engine(&self) -> &Engine {
    &self.engine
  }

  /// Get a mutable reference to the engine, e.g. to deploy before starting.
  pub fn engine_mut(&mut self) -> &mut Engine {
    &mut self.engine
  }

  /// Start the processing loop.
  ///
  /// Runs until the cancellation token fires or every external sender has been
  /// dropped, then hands the engine back.
  pub async fn start(self, cancel: CancellationToken) -> Engine {
    let Self {
      sender,
      mut receiver,
      mut engine,
      notifier,
    } = self;
    // Only senders handed out through `sender()` keep the channel open.
    drop(sender);

    let partition_id = engine.partition_id();
    info!(partition_id, "starting partition runner");

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!(partition_id, "partition runner cancelled");
          break;
        }
        trigger = receiver.recv() => {
          match trigger {
            Some(trigger) => {
              let name = trigger.name();
              match engine.process(trigger) {
                Ok(records) => {
                  debug!(partition_id, trigger = name, records = records.len(), "trigger processed");
                  for record in records {
                    notifier.notify(record);
                  }
                }
                Err(e) => {
                  warn!(partition_id, trigger = name, error = %e, "trigger failed");
                }
              }
            }
            None => {
              info!(partition_id, "partition runner channel closed");
              break;
            }
          }
        }
      }
    }

    engine
  }
}
