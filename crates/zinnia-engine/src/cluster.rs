//! Several partitions running side by side.
//!
//! Each partition is a `PartitionRunner` on its own task. Keys carry the id of
//! the partition that minted them, so a trigger addressing a key goes to that
//! partition. New instances are spread round-robin and external events are
//! broadcast, since any partition may hold a matching subscription.

use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use zinnia_model::ExecutableProcess;

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::events::RecordNotifier;
use crate::runner::PartitionRunner;
use crate::trigger::Trigger;

/// A set of partition runners with trigger routing between them.
pub struct Cluster {
  senders: Vec<mpsc::Sender<Trigger>>,
  handles: Vec<JoinHandle<Engine>>,
  next_start: AtomicUsize,
  cancel: CancellationToken,
}

impl Cluster {
  /// Spawn `partitions` lanes (ids `1..=partitions`), each with every process deployed.
  ///
  /// # Errors
  ///
  /// Returns `EngineError::PartitionOutOfRange` when `partitions` is zero or
  /// exceeds what keys can encode. Nothing is spawned in that case.
  pub fn start<N>(
    partitions: u16,
    config: &EngineConfig,
    processes: &[ExecutableProcess],
    notifier: N,
  ) -> Result<Self, EngineError>
  where
    N: RecordNotifier + Clone + 'static,
  {
    EngineConfig {
      partition_id: partitions,
      ..config.clone()
    }
    .validate()?;

    let mut engines = Vec::with_capacity(usize::from(partitions));
    for partition_id in 1..=partitions {
      let mut engine = Engine::new(EngineConfig {
        partition_id,
        ..config.clone()
      })?;
      for process in processes {
        engine.deploy(process.clone());
      }
      engines.push(engine);
    }

    let cancel = CancellationToken::new();
    let mut senders = Vec::with_capacity(engines.len());
    let mut handles = Vec::with_capacity(engines.len());
    for engine in engines {
      let runner = PartitionRunner::with_notifier(engine, notifier.clone());
      senders.push(runner.sender());
      handles.push(tokio::spawn(runner.start(cancel.child_token())));
    }

    info!(partitions, "cluster started");
    Ok(Self {
      senders,
      handles,
      next_start: AtomicUsize::new(0),
      cancel,
    })
  }

  /// Number of lanes in the cluster.
  pub fn partitions(&self) -> usize {
    self.senders.len()
  }

  /// Route a trigger to the partition(s) responsible for it.
  pub async fn submit(&self, trigger: Trigger) -> Result<(), EngineError> {
    if let Some(key) = trigger.routing_key() {
      let sender = usize::from(key.partition_id())
        .checked_sub(1)
        .and_then(|index| self.senders.get(index))
        .ok_or(EngineError::InvalidScope { key })?;
      return sender.send(trigger).await.map_err(|_| EngineError::ChannelClosed);
    }

    if let Trigger::ExternalEventOccurred { .. } = trigger {
      for sender in &self.senders {
        sender
          .send(trigger.clone())
          .await
          .map_err(|_| EngineError::ChannelClosed)?;
      }
      return Ok(());
    }

    let index = self.next_start.fetch_add(1, Ordering::Relaxed) % self.senders.len().max(1);
    let sender = self.senders.get(index).ok_or(EngineError::ChannelClosed)?;
    sender.send(trigger).await.map_err(|_| EngineError::ChannelClosed)
  }

  /// Stop every lane immediately, dropping queued triggers.
  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  /// Close the channels, let every lane drain its queue, and collect the engines.
  pub async fn shutdown(self) -> Vec<Engine> {
    drop(self.senders);
    join_all(self.handles)
      .await
      .into_iter()
      .filter_map(|joined| match joined {
        Ok(engine) => Some(engine),
        Err(e) => {
          error!(error = %e, "partition task failed");
          None
        }
      })
      .collect()
  }
}
