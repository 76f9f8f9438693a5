//! Typed service clients and subscribers on top of a [`ConnectedNode`].
//!
//! * [`ServiceClient`] issues calls without waiting for them: every call
//!   returns a [`PendingResponse`] that resolves once, when the middleware
//!   delivers the reply.
//! * [`Subscriber`] decodes a topic's JSON feed into typed messages.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use remocon_types::{RemoconError, RosMessage, RosService};
use serde_json::Value;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, warn};

use crate::graph_name::GraphName;
use crate::node::{ConnectedNode, RawServiceClient};

// ---------------------------------------------------------------------------
// Service client
// ---------------------------------------------------------------------------

/// Typed client for service `S`.
pub struct ServiceClient<S> {
    raw: Arc<dyn RawServiceClient>,
    _service: PhantomData<fn() -> S>,
}

impl<S: RosService> ServiceClient<S> {
    /// Look up `service` on `node` and bind a client to it.
    ///
    /// # Errors
    ///
    /// Propagates [`RemoconError::ServiceNotFound`] and
    /// [`RemoconError::TypeMismatch`] from the middleware.
    pub async fn connect(node: &dyn ConnectedNode, service: &GraphName) -> Result<Self, RemoconError> {
        let raw = node.new_service_client(service, S::TYPE_NAME).await?;
        debug!(service = %service, service_type = S::TYPE_NAME, "service client created");
        Ok(Self {
            raw,
            _service: PhantomData,
        })
    }

    pub fn service_name(&self) -> &GraphName {
        self.raw.service_name()
    }

    /// Issue a call and return immediately.
    ///
    /// The call runs on the Tokio runtime; its outcome is delivered to the
    /// returned [`PendingResponse`].  Dropping the handle does not cancel the
    /// call.
    pub fn call(&self, request: &S::Request) -> Result<PendingResponse<S::Response>, RemoconError> {
        let payload = serde_json::to_value(request)?;
        let raw = Arc::clone(&self.raw);
        let service = raw.service_name().clone();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let outcome = match raw.call(payload).await {
                Ok(value) => serde_json::from_value::<S::Response>(value).map_err(RemoconError::from),
                Err(e) => Err(e),
            };
            // The caller may have dropped the handle; that is not an error.
            let _ = tx.send(outcome);
        });

        Ok(PendingResponse {
            service,
            receiver: rx,
        })
    }
}

/// The not-yet-arrived response of a single service call.
pub struct PendingResponse<T> {
    service: GraphName,
    receiver: oneshot::Receiver<Result<T, RemoconError>>,
}

impl<T> PendingResponse<T> {
    pub fn service_name(&self) -> &GraphName {
        &self.service
    }

    /// Wait for the response.
    ///
    /// Resolves at most once.  Returns [`RemoconError::Channel`] when the
    /// call was dropped by the middleware without a reply.
    pub async fn response(self) -> Result<T, RemoconError> {
        let service = self.service;
        match self.receiver.await {
            Ok(outcome) => outcome,
            Err(_) => Err(RemoconError::Channel(format!(
                "call to {service} ended without a response"
            ))),
        }
    }
}

impl<T> fmt::Debug for PendingResponse<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingResponse")
            .field("service", &self.service)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Subscriber
// ---------------------------------------------------------------------------

/// Typed subscription to a topic carrying `M`.
pub struct Subscriber<M> {
    topic: GraphName,
    receiver: broadcast::Receiver<Value>,
    _message: PhantomData<fn() -> M>,
}

impl<M: RosMessage> Subscriber<M> {
    /// Subscribe to `topic` on `node`.
    pub async fn subscribe(node: &dyn ConnectedNode, topic: &GraphName) -> Result<Self, RemoconError> {
        let receiver = node.new_subscriber(topic, M::TYPE_NAME).await?;
        debug!(topic = %topic, message_type = M::TYPE_NAME, "subscriber created");
        Ok(Self {
            topic: topic.clone(),
            receiver,
            _message: PhantomData,
        })
    }

    pub fn topic(&self) -> &GraphName {
        &self.topic
    }

    /// Wait for the next message on this topic.
    ///
    /// Messages that fail to decode, and gaps caused by falling behind the
    /// publisher, are logged and skipped.  Returns `None` once the
    /// subscription has been torn down.
    pub async fn recv(&mut self) -> Option<M> {
        loop {
            match self.receiver.recv().await {
                Ok(value) => match serde_json::from_value::<M>(value) {
                    Ok(message) => return Some(message),
                    Err(e) => {
                        warn!(topic = %self.topic, error = %e, "dropping undecodable message");
                        continue;
                    }
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = %self.topic, lagged_by = n, "subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl<M> fmt::Debug for Subscriber<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("topic", &self.topic)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalGraph;
    use remocon_types::{
        GetRappList, GetRappListResponse, Rapp, RappList, StartRapp, StartRappResponse,
    };

    fn name(s: &str) -> GraphName {
        GraphName::new(s).unwrap()
    }

    #[tokio::test]
    async fn call_resolves_with_typed_response() -> Result<(), Box<dyn std::error::Error>> {
        let graph = LocalGraph::default();
        graph.advertise::<StartRapp, _>(name("/concert/start_app"), |req| StartRappResponse {
            started: true,
            message: format!("started {}", req.name),
            ..Default::default()
        });
        let node = graph.node(name("/test_node"));

        let client = ServiceClient::<StartRapp>::connect(&node, &name("/concert/start_app")).await?;
        let pending = client.call(&remocon_types::StartRappRequest {
            name: "turtlebot_teleop".to_string(),
            ..Default::default()
        })?;
        assert_eq!(pending.service_name().as_str(), "/concert/start_app");

        let resp = pending.response().await?;
        assert!(resp.started);
        assert_eq!(resp.message, "started turtlebot_teleop");
        Ok(())
    }

    #[tokio::test]
    async fn connect_to_missing_service_fails() {
        let graph = LocalGraph::default();
        let node = graph.node(name("/test_node"));
        let result = ServiceClient::<GetRappList>::connect(&node, &name("/concert/list_apps")).await;
        assert!(matches!(result, Err(RemoconError::ServiceNotFound { .. })));
    }

    #[tokio::test]
    async fn undecodable_response_is_a_serialization_error() -> Result<(), Box<dyn std::error::Error>> {
        let graph = LocalGraph::default();
        graph.advertise_service(
            name("/concert/list_apps"),
            GetRappList::TYPE_NAME,
            |_| Ok(serde_json::json!({"available_rapps": "not a list"})),
        );
        let node = graph.node(name("/test_node"));
        let client = ServiceClient::<GetRappList>::connect(&node, &name("/concert/list_apps")).await?;
        let outcome: Result<GetRappListResponse, _> =
            client.call(&Default::default())?.response().await;
        assert!(matches!(outcome, Err(RemoconError::Serialization(_))));
        Ok(())
    }

    #[tokio::test]
    async fn subscriber_skips_undecodable_messages() -> Result<(), Box<dyn std::error::Error>> {
        let graph = LocalGraph::default();
        let node = graph.node(name("/test_node"));
        let topic = name("/concert/app_list");
        let mut sub = Subscriber::<RappList>::subscribe(&node, &topic).await?;

        graph.publish_raw(&topic, RappList::TYPE_NAME, serde_json::json!({"running_rapps": 7}))?;
        let good = RappList {
            available_rapps: vec![Rapp {
                name: "turtlebot_rapps/teleop".to_string(),
                ..Default::default()
            }],
            running_rapps: Vec::new(),
        };
        graph.publish(&topic, &good)?;

        assert_eq!(sub.recv().await, Some(good));
        Ok(())
    }

    #[tokio::test]
    async fn subscriber_ends_when_graph_is_dropped() -> Result<(), Box<dyn std::error::Error>> {
        let graph = LocalGraph::default();
        let topic = name("/concert/app_list");
        let mut sub = {
            let node = graph.node(name("/test_node"));
            Subscriber::<RappList>::subscribe(&node, &topic).await?
        };
        drop(graph);
        assert_eq!(sub.recv().await, None);
        Ok(())
    }
}
