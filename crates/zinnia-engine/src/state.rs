use std::collections::BTreeMap;
use std::sync::Arc;

use zinnia_model::ExecutableProcess;

use crate::gateway::GatewaySynchronizer;
use crate::instance::InstanceTree;
use crate::key::Key;
use crate::subscriptions::SubscriptionManager;
use crate::variables::VariableStore;

/// Everything one process instance owns. Steps mutate it; a failed step is
/// rolled back by restoring a clone taken before it started.
#[derive(Debug, Clone)]
pub struct InstanceState {
  pub(crate) process: Arc<ExecutableProcess>,
  pub(crate) process_instance_key: Key,
  pub(crate) tree: InstanceTree,
  pub(crate) variables: VariableStore,
  pub(crate) subscriptions: SubscriptionManager,
  pub(crate) gateways: GatewaySynchronizer,
  /// job key -> service task instance key
  pub(crate) jobs: BTreeMap<Key, Key>,
}

impl InstanceState {
  pub(crate) fn new(process: Arc<ExecutableProcess>, process_instance_key: Key) -> Self {
    Self {
      process,
      process_instance_key,
      tree: InstanceTree::new(),
      variables: VariableStore::new(),
      subscriptions: SubscriptionManager::new(),
      gateways: GatewaySynchronizer::new(),
      jobs: BTreeMap::new(),
    }
  }

  pub fn process(&self) -> &ExecutableProcess {
    &self.process
  }

  pub fn process_instance_key(&self) -> Key {
    self.process_instance_key
  }

  pub fn tree(&self) -> &InstanceTree {
    &self.tree
  }

  pub fn variables(&self) -> &VariableStore {
    &self.variables
  }

  pub fn subscriptions(&self) -> &SubscriptionManager {
    &self.subscriptions
  }

  pub fn gateways(&self) -> &GatewaySynchronizer {
    &self.gateways
  }

  pub fn jobs(&self) -> impl Iterator<Item = (Key, Key)> + '_ {
    self.jobs.iter().map(|(job, task)| (*job, *task))
  }

  /// The root element instance has reached a final state and left the tree.
  pub fn is_finished(&self) -> bool {
    !self.tree.contains(self.process_instance_key)
  }
}
