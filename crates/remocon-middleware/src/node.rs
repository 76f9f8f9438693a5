//! The middleware boundary.
//!
//! Remocon never speaks directly to a transport.  Everything it needs from
//! the messaging layer is expressed by the traits in this module, and each
//! middleware (the in-process [`LocalGraph`][crate::local::LocalGraph], the
//! WebSocket [`RosbridgeNode`][crate::rosbridge::RosbridgeNode]) implements
//! them.
//!
//! # Overview
//!
//! - [`ConnectedNode`] – a live connection to the graph that can create
//!   service clients and subscribers.
//! - [`RawServiceClient`] – a JSON-level service client bound to one service.
//! - [`NodeFactory`] – connects a new node from a [`NodeConfiguration`].
//! - [`NodeMain`] – the single entry point a node executor runs once the node
//!   is connected.

use std::sync::Arc;

use async_trait::async_trait;
use remocon_types::RemoconError;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::graph_name::GraphName;

/// A node that is connected to the graph.
///
/// # Contract
///
/// * `new_service_client` – fails with [`RemoconError::ServiceNotFound`] when
///   no server currently advertises `service`, and with
///   [`RemoconError::TypeMismatch`] when the advertised type differs from
///   `service_type`.
///
/// * `new_subscriber` – returns a receiver that yields every message
///   published on `topic` from now on, in publish order.
#[async_trait]
pub trait ConnectedNode: Send + Sync {
    fn node_name(&self) -> &GraphName;

    async fn new_service_client(
        &self,
        service: &GraphName,
        service_type: &str,
    ) -> Result<Arc<dyn RawServiceClient>, RemoconError>;

    async fn new_subscriber(
        &self,
        topic: &GraphName,
        message_type: &str,
    ) -> Result<broadcast::Receiver<Value>, RemoconError>;
}

/// A service client bound to a single resolved service.
#[async_trait]
pub trait RawServiceClient: Send + Sync {
    fn service_name(&self) -> &GraphName;

    /// Issue one call and wait for its single response.
    async fn call(&self, request: Value) -> Result<Value, RemoconError>;
}

/// Settings used to connect a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfiguration {
    pub node_name: GraphName,
    /// Where the graph lives, e.g. `ws://localhost:9090` for rosbridge.
    pub master_uri: String,
}

impl NodeConfiguration {
    pub fn new(node_name: GraphName, master_uri: impl Into<String>) -> Self {
        Self {
            node_name,
            master_uri: master_uri.into(),
        }
    }

    /// Same configuration under another node name (builder-style).
    pub fn with_node_name(mut self, node_name: GraphName) -> Self {
        self.node_name = node_name;
        self
    }
}

/// Connects nodes for a [`NodeMainExecutor`][crate::executor::NodeMainExecutor].
#[async_trait]
pub trait NodeFactory: Send + Sync {
    async fn connect(
        &self,
        config: &NodeConfiguration,
    ) -> Result<Arc<dyn ConnectedNode>, RemoconError>;
}

/// Program logic run on a freshly connected node.
///
/// The executor calls [`NodeMain::on_start`] exactly once per execution and
/// hands its result back through a [`NodeHandle`][crate::executor::NodeHandle].
#[async_trait]
pub trait NodeMain: Send + Sync {
    type Output: Send + 'static;
    type Error: std::error::Error + From<RemoconError> + Send + 'static;

    /// Name used when the caller has no better one.
    fn default_node_name(&self) -> GraphName;

    async fn on_start(&self, node: Arc<dyn ConnectedNode>) -> Result<Self::Output, Self::Error>;
}
