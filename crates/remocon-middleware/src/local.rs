//! In-process middleware.
//!
//! [`LocalGraph`] is a headless service registry plus a set of topic
//! channels built on [`tokio::sync::broadcast`], so every subscriber receives
//! every message in publish order without any single subscriber blocking the
//! others.  It implements the full [`ConnectedNode`] boundary and is what the
//! workspace's tests and embedded setups run against.
//!
//! | Concern | Behaviour |
//! |---|---|
//! | Service lookup | `ServiceNotFound` when nothing is advertised, `TypeMismatch` on a type clash |
//! | Service call | the advertised handler runs once per call |
//! | Topic types | fixed by whoever touches the topic first |
//! | Publish without subscribers | `Ok(0)` – a normal condition |

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use remocon_types::{RemoconError, RosMessage, RosService};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::graph_name::GraphName;
use crate::node::{ConnectedNode, NodeConfiguration, NodeFactory, RawServiceClient};

/// Default topic channel capacity (messages buffered before slow
/// subscribers start lagging).
const DEFAULT_CAPACITY: usize = 256;

type ServiceHandler = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

struct LocalService {
    service_type: String,
    handler: ServiceHandler,
}

struct TopicChannel {
    message_type: String,
    sender: broadcast::Sender<Value>,
}

struct GraphInner {
    capacity: usize,
    services: RwLock<HashMap<GraphName, LocalService>>,
    topics: Mutex<HashMap<GraphName, TopicChannel>>,
}

/// Shared in-process graph.  Clone it cheaply – all clones see the same
/// services and topics.
#[derive(Clone)]
pub struct LocalGraph {
    inner: Arc<GraphInner>,
}

impl LocalGraph {
    /// Create a graph whose topic channels buffer `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(GraphInner {
                capacity,
                services: RwLock::new(HashMap::new()),
                topics: Mutex::new(HashMap::new()),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Services
    // -----------------------------------------------------------------------

    /// Advertise a JSON-level service.  Any previous server under the same
    /// name is replaced.
    ///
    /// The handler's `Err` string is surfaced to callers as
    /// [`RemoconError::ServiceCall`].
    pub fn advertise_service<F>(&self, name: GraphName, service_type: &str, handler: F)
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        debug!(service = %name, service_type, "service advertised");
        self.inner
            .services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                name,
                LocalService {
                    service_type: service_type.to_string(),
                    handler: Arc::new(handler),
                },
            );
    }

    /// Advertise a typed service `S`.
    pub fn advertise<S, F>(&self, name: GraphName, handler: F)
    where
        S: RosService,
        F: Fn(S::Request) -> S::Response + Send + Sync + 'static,
    {
        self.advertise_service(name, S::TYPE_NAME, move |value| {
            let request = serde_json::from_value::<S::Request>(value).map_err(|e| e.to_string())?;
            serde_json::to_value(handler(request)).map_err(|e| e.to_string())
        });
    }

    /// Withdraw a service.  Returns `true` when something was advertised.
    pub fn unadvertise_service(&self, name: &GraphName) -> bool {
        self.inner
            .services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    // -----------------------------------------------------------------------
    // Topics
    // -----------------------------------------------------------------------

    /// Publish `message` on `topic`.
    ///
    /// Returns the number of subscribers that were handed the message;
    /// `Ok(0)` when nobody is listening.
    pub fn publish<M: RosMessage>(&self, topic: &GraphName, message: &M) -> Result<usize, RemoconError> {
        let value = serde_json::to_value(message)?;
        self.publish_raw(topic, M::TYPE_NAME, value)
    }

    /// Publish an already-encoded message.
    pub fn publish_raw(
        &self,
        topic: &GraphName,
        message_type: &str,
        message: Value,
    ) -> Result<usize, RemoconError> {
        let sender = self.topic_sender(topic, message_type)?;
        match sender.send(message) {
            Ok(n) => Ok(n),
            Err(broadcast::error::SendError(_)) => Ok(0),
        }
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: &GraphName) -> usize {
        self.inner
            .topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map_or(0, |channel| channel.sender.receiver_count())
    }

    /// A node handle on this graph.
    pub fn node(&self, name: GraphName) -> LocalNode {
        LocalNode {
            name,
            graph: self.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn topic_sender(
        &self,
        topic: &GraphName,
        message_type: &str,
    ) -> Result<broadcast::Sender<Value>, RemoconError> {
        let mut topics = self
            .inner
            .topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let channel = topics.entry(topic.clone()).or_insert_with(|| TopicChannel {
            message_type: message_type.to_string(),
            sender: broadcast::channel(self.inner.capacity).0,
        });
        if channel.message_type != message_type {
            return Err(RemoconError::TypeMismatch {
                name: topic.to_string(),
                expected: channel.message_type.clone(),
                actual: message_type.to_string(),
            });
        }
        Ok(channel.sender.clone())
    }
}

impl Default for LocalGraph {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl NodeFactory for LocalGraph {
    async fn connect(
        &self,
        config: &NodeConfiguration,
    ) -> Result<Arc<dyn ConnectedNode>, RemoconError> {
        Ok(Arc::new(self.node(config.node_name.clone())))
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A node connected to a [`LocalGraph`].
#[derive(Clone)]
pub struct LocalNode {
    name: GraphName,
    graph: LocalGraph,
}

#[async_trait]
impl ConnectedNode for LocalNode {
    fn node_name(&self) -> &GraphName {
        &self.name
    }

    async fn new_service_client(
        &self,
        service: &GraphName,
        service_type: &str,
    ) -> Result<Arc<dyn RawServiceClient>, RemoconError> {
        let services = self
            .graph
            .inner
            .services
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = services.get(service) else {
            return Err(RemoconError::ServiceNotFound {
                service: service.to_string(),
            });
        };
        if entry.service_type != service_type {
            return Err(RemoconError::TypeMismatch {
                name: service.to_string(),
                expected: service_type.to_string(),
                actual: entry.service_type.clone(),
            });
        }
        Ok(Arc::new(LocalServiceClient {
            service: service.clone(),
            graph: self.graph.clone(),
        }))
    }

    async fn new_subscriber(
        &self,
        topic: &GraphName,
        message_type: &str,
    ) -> Result<broadcast::Receiver<Value>, RemoconError> {
        Ok(self.graph.topic_sender(topic, message_type)?.subscribe())
    }
}

/// Looks its service up on every call so that a withdrawn server is noticed.
struct LocalServiceClient {
    service: GraphName,
    graph: LocalGraph,
}

#[async_trait]
impl RawServiceClient for LocalServiceClient {
    fn service_name(&self) -> &GraphName {
        &self.service
    }

    async fn call(&self, request: Value) -> Result<Value, RemoconError> {
        let handler = self
            .graph
            .inner
            .services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&self.service)
            .map(|entry| Arc::clone(&entry.handler));
        let Some(handler) = handler else {
            return Err(RemoconError::ServiceCall {
                service: self.service.to_string(),
                reason: "service is no longer advertised".to_string(),
            });
        };
        handler(request).map_err(|reason| RemoconError::ServiceCall {
            service: self.service.to_string(),
            reason,
        })
    }
}
