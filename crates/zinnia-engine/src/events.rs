//! Record notifiers.
//!
//! Every record a lane produces is handed to a notifier, which decides what to
//! do with it (export, stream, print, ignore).

use tokio::sync::mpsc;

use crate::record::Record;

/// Receiver of the records produced by a lane.
pub trait RecordNotifier: Send + Sync {
  fn notify(&self, record: Record);
}

/// Discards every record.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl RecordNotifier for NoopNotifier {
  fn notify(&self, _record: Record) {}
}

/// Forwards records to an unbounded channel.
///
/// Unbounded so a slow consumer never stalls a lane mid-trigger.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<Record>,
}

impl ChannelNotifier {
  /// Create a new notifier that forwards to `sender`.
  pub fn new(sender: mpsc::UnboundedSender<Record>) -> Self {
    Self { sender }
  }
}

impl RecordNotifier for ChannelNotifier {
  fn notify(&self, record: Record) {
    // The receiver may be gone; records are then dropped.
    let _ = self.sender.send(record);
  }
}
