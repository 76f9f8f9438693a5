//! [`NodeMainExecutor`] – connects nodes and runs [`NodeMain`]s on them.
//!
//! `execute` returns immediately.  The node is connected and its
//! [`NodeMain::on_start`] is run on a Tokio task; the outcome comes back
//! through the returned [`NodeHandle`].  Node names are unique among the
//! executor's running nodes.
//!
//! A node stays connected after its node main returns, so calls it issued
//! can still complete and its subscriptions keep delivering.  It is
//! disconnected only by [`NodeMainExecutor::shutdown_node_main`] or
//! [`NodeMainExecutor::shutdown`]; executing a new node main under the name
//! of a finished one leaves the finished node connected.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use remocon_types::RemoconError;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info};

use crate::graph_name::GraphName;
use crate::node::{ConnectedNode, NodeConfiguration, NodeFactory, NodeMain};

/// Handle to one node main started by a [`NodeMainExecutor`].
pub struct NodeHandle<T, E> {
    name: GraphName,
    task: JoinHandle<Result<T, E>>,
}

impl<T, E: From<RemoconError>> NodeHandle<T, E> {
    pub fn node_name(&self) -> &GraphName {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for `on_start` to return and hand back its result.
    ///
    /// A node shut down before it finished yields [`RemoconError::Aborted`].
    pub async fn join(self) -> Result<T, E> {
        let name = self.name;
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => Err(RemoconError::Aborted(name.to_string()).into()),
            Err(e) => Err(RemoconError::Channel(format!("node {name} panicked: {e}")).into()),
        }
    }
}

/// One node owned by the executor.
struct ExecutedNode {
    task: AbortHandle,
    node: Arc<OnceLock<Arc<dyn ConnectedNode>>>,
}

impl ExecutedNode {
    fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    fn shut_down(self) {
        self.task.abort();
        // Dropping the last reference disconnects the node.
        drop(self.node);
    }
}

/// Runs node mains on nodes produced by a [`NodeFactory`].
///
/// Dropping the executor shuts every node down.
pub struct NodeMainExecutor {
    factory: Arc<dyn NodeFactory>,
    nodes: Mutex<HashMap<GraphName, Vec<ExecutedNode>>>,
}

impl NodeMainExecutor {
    pub fn new(factory: Arc<dyn NodeFactory>) -> Self {
        Self {
            factory,
            nodes: Mutex::new(HashMap::new()),
        }
    }

    /// Connect a node named `config.node_name` and run `node_main` on it.
    ///
    /// Must be called from within a Tokio runtime.  Finished nodes with the
    /// same name stay connected next to the new one.
    ///
    /// # Errors
    ///
    /// Returns [`RemoconError::DuplicateNode`] when a node main with the same
    /// name is still running on this executor.
    pub fn execute<N>(
        &self,
        node_main: Arc<N>,
        config: NodeConfiguration,
    ) -> Result<NodeHandle<N::Output, N::Error>, RemoconError>
    where
        N: NodeMain + 'static,
    {
        let name = config.node_name.clone();
        let mut nodes = self.nodes.lock().unwrap_or_else(PoisonError::into_inner);
        if nodes
            .get(&name)
            .is_some_and(|executed| executed.iter().any(ExecutedNode::is_running))
        {
            return Err(RemoconError::DuplicateNode(name.to_string()));
        }

        let slot = Arc::new(OnceLock::new());
        let factory = Arc::clone(&self.factory);
        let task_slot = Arc::clone(&slot);
        let task = tokio::spawn(async move {
            let node = factory.connect(&config).await.map_err(N::Error::from)?;
            info!(node = %config.node_name, master = %config.master_uri, "node connected");
            let _ = task_slot.set(Arc::clone(&node));
            node_main.on_start(node).await
        });
        let executed = ExecutedNode {
            task: task.abort_handle(),
            node: slot,
        };
        nodes.entry(name.clone()).or_default().push(executed);
        debug!(node = %name, "node main scheduled");

        Ok(NodeHandle { name, task })
    }

    /// Stop the node main running under `name` and disconnect every node
    /// executed under that name.  Returns `false` when the executor has no
    /// such node.
    pub fn shutdown_node_main(&self, name: &GraphName) -> bool {
        let executed = self
            .nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        match executed {
            Some(executed) => {
                executed.into_iter().for_each(ExecutedNode::shut_down);
                info!(node = %name, "node shut down");
                true
            }
            None => false,
        }
    }

    /// Names of the node mains that have not finished yet.
    pub fn running_nodes(&self) -> Vec<GraphName> {
        self.nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, executed)| executed.iter().any(ExecutedNode::is_running))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Stop every node main and disconnect every node.
    pub fn shutdown(&self) {
        let mut nodes = self.nodes.lock().unwrap_or_else(PoisonError::into_inner);
        for (name, executed) in nodes.drain() {
            executed.into_iter().for_each(ExecutedNode::shut_down);
            debug!(node = %name, "node shut down");
        }
    }
}

impl Drop for NodeMainExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
