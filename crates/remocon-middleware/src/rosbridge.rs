//! rosbridge v2 middleware.
//!
//! [`RosbridgeNode`] speaks the rosbridge JSON protocol over a single
//! WebSocket and implements [`ConnectedNode`] on top of it:
//!
//! | Remocon operation | rosbridge traffic |
//! |---|---|
//! | service lookup | `call_service` on `/rosapi/service_type`; an empty type means not found |
//! | service call | `call_service` → `service_response`, correlated by `id` |
//! | subscription | one upstream `subscribe` per topic, `publish` frames fanned out locally |
//!
//! Two Tokio tasks own the socket: a writer draining an outbound queue and a
//! reader routing inbound frames.  Dropping the node aborts both, which ends
//! every subscription and fails every outstanding call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use remocon_types::RemoconError;
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::AbortHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::graph_name::GraphName;
use crate::node::{ConnectedNode, NodeConfiguration, NodeFactory, RawServiceClient};

/// rosapi service answering "what type is this service?".
pub const ROSAPI_SERVICE_TYPE: &str = "/rosapi/service_type";

/// Messages buffered per topic before slow subscribers start lagging.
const DEFAULT_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Shared routing state
// ---------------------------------------------------------------------------

/// One upstream subscription; its type is fixed by the first subscriber.
struct TopicRoute {
    message_type: String,
    sender: broadcast::Sender<Value>,
}

#[derive(Default)]
struct Routes {
    pending: Mutex<HashMap<String, oneshot::Sender<Result<Value, String>>>>,
    topics: Mutex<HashMap<String, TopicRoute>>,
}

impl Routes {
    /// Route one inbound rosbridge frame.
    ///
    /// Recognised operations:
    ///
    /// * `service_response` – completes the pending call with the same `id`.
    ///   `"result": false` turns `values` into the failure reason.
    /// * `publish` – forwarded to every local subscriber of `topic`.
    /// * `status` – logged.
    ///
    /// Anything else is ignored.
    fn route_incoming(&self, text: &str) {
        let Ok(frame) = serde_json::from_str::<Value>(text) else {
            warn!("ignoring non-JSON rosbridge frame");
            return;
        };

        match frame.get("op").and_then(Value::as_str) {
            Some("service_response") => {
                let Some(id) = frame.get("id").and_then(Value::as_str) else {
                    return;
                };
                let waiter = self
                    .pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(id);
                let Some(waiter) = waiter else {
                    debug!(id, "service_response for an unknown call");
                    return;
                };
                let values = frame.get("values").cloned().unwrap_or(Value::Null);
                let succeeded = frame.get("result").and_then(Value::as_bool).unwrap_or(true);
                let outcome = if succeeded {
                    Ok(values)
                } else {
                    Err(match values {
                        Value::String(reason) => reason,
                        other => other.to_string(),
                    })
                };
                let _ = waiter.send(outcome);
            }
            Some("publish") => {
                let Some(topic) = frame.get("topic").and_then(Value::as_str) else {
                    return;
                };
                let msg = frame.get("msg").cloned().unwrap_or(Value::Null);
                if let Some(route) = self
                    .topics
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(topic)
                {
                    let _ = route.sender.send(msg);
                }
            }
            Some("status") => {
                let level = frame.get("level").and_then(Value::as_str).unwrap_or("info");
                let msg = frame.get("msg").and_then(Value::as_str).unwrap_or("");
                info!(level, msg, "rosbridge status");
            }
            _ => {}
        }
    }

    /// Fail every outstanding call and end every subscription.
    fn close(&self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Outbound half of the connection plus the routing tables.
#[derive(Clone)]
struct Link {
    outbound: mpsc::UnboundedSender<Message>,
    routes: Arc<Routes>,
}

impl Link {
    fn send(&self, frame: &Value) -> Result<(), RemoconError> {
        self.outbound
            .send(Message::Text(frame.to_string().into()))
            .map_err(|_| RemoconError::Connection("rosbridge connection closed".to_string()))
    }

    async fn call_service(&self, service: &str, args: Value) -> Result<Value, RemoconError> {
        let id = format!("call_service:{service}:{}", Uuid::new_v4());
        let (tx, rx) = oneshot::channel();
        self.routes
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), tx);

        let frame = json!({
            "op": "call_service",
            "id": id,
            "service": service,
            "args": args,
        });
        if let Err(e) = self.send(&frame) {
            self.routes
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            return Err(e);
        }

        match rx.await {
            Ok(Ok(values)) => Ok(values),
            Ok(Err(reason)) => Err(RemoconError::ServiceCall {
                service: service.to_string(),
                reason,
            }),
            Err(_) => Err(RemoconError::Connection(format!(
                "rosbridge connection closed while calling {service}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A node that reaches the ROS graph through a rosbridge server.
pub struct RosbridgeNode {
    name: GraphName,
    link: Link,
    capacity: usize,
    tasks: Vec<AbortHandle>,
}

impl RosbridgeNode {
    /// Open a WebSocket to the rosbridge server at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoconError::Connection`] when the WebSocket handshake
    /// fails.
    pub async fn connect(url: &str, name: GraphName) -> Result<Self, RemoconError> {
        let (ws_stream, _) = connect_async(url).await.map_err(|e| {
            RemoconError::Connection(format!("rosbridge connect to {url}: {e}"))
        })?;
        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let routes = Arc::new(Routes::default());

        let writer = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                if let Err(e) = ws_tx.send(msg).await {
                    warn!(error = %e, "rosbridge send failed");
                    break;
                }
            }
        });

        let reader_routes = Arc::clone(&routes);
        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_rx.next().await {
                match msg {
                    Ok(Message::Text(text)) => reader_routes.route_incoming(text.as_str()),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "rosbridge receive failed");
                        break;
                    }
                }
            }
            reader_routes.close();
        });

        info!(url, node = %name, "rosbridge node connected");
        Ok(Self {
            name,
            link: Link { outbound, routes },
            capacity: DEFAULT_CAPACITY,
            tasks: vec![writer.abort_handle(), reader.abort_handle()],
        })
    }
}

impl Drop for RosbridgeNode {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        self.link.routes.close();
    }
}

#[async_trait]
impl ConnectedNode for RosbridgeNode {
    fn node_name(&self) -> &GraphName {
        &self.name
    }

    async fn new_service_client(
        &self,
        service: &GraphName,
        service_type: &str,
    ) -> Result<Arc<dyn RawServiceClient>, RemoconError> {
        let values = self
            .link
            .call_service(ROSAPI_SERVICE_TYPE, json!({ "service": service.as_str() }))
            .await?;
        let advertised = values.get("type").and_then(Value::as_str).unwrap_or("");
        if advertised.is_empty() {
            return Err(RemoconError::ServiceNotFound {
                service: service.to_string(),
            });
        }
        if advertised != service_type {
            return Err(RemoconError::TypeMismatch {
                name: service.to_string(),
                expected: service_type.to_string(),
                actual: advertised.to_string(),
            });
        }
        Ok(Arc::new(RosbridgeServiceClient {
            service: service.clone(),
            link: self.link.clone(),
        }))
    }

    async fn new_subscriber(
        &self,
        topic: &GraphName,
        message_type: &str,
    ) -> Result<broadcast::Receiver<Value>, RemoconError> {
        let receiver = {
            let mut topics = self
                .link
                .routes
                .topics
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(route) = topics.get(topic.as_str()) {
                if route.message_type != message_type {
                    return Err(RemoconError::TypeMismatch {
                        name: topic.to_string(),
                        expected: route.message_type.clone(),
                        actual: message_type.to_string(),
                    });
                }
                return Ok(route.sender.subscribe());
            }
            let (sender, receiver) = broadcast::channel(self.capacity);
            topics.insert(
                topic.to_string(),
                TopicRoute {
                    message_type: message_type.to_string(),
                    sender,
                },
            );
            receiver
        };

        self.link.send(&json!({
            "op": "subscribe",
            "id": format!("subscribe:{topic}:{}", Uuid::new_v4()),
            "topic": topic.as_str(),
            "type": message_type,
        }))?;
        Ok(receiver)
    }
}

struct RosbridgeServiceClient {
    service: GraphName,
    link: Link,
}

#[async_trait]
impl RawServiceClient for RosbridgeServiceClient {
    fn service_name(&self) -> &GraphName {
        &self.service
    }

    async fn call(&self, request: Value) -> Result<Value, RemoconError> {
        self.link.call_service(self.service.as_str(), request).await
    }
}

/// [`NodeFactory`] that opens one rosbridge connection per node, using
/// [`NodeConfiguration::master_uri`] as the WebSocket URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct RosbridgeConnector;

#[async_trait]
impl NodeFactory for RosbridgeConnector {
    async fn connect(
        &self,
        config: &NodeConfiguration,
    ) -> Result<Arc<dyn ConnectedNode>, RemoconError> {
        let node = RosbridgeNode::connect(&config.master_uri, config.node_name.clone()).await?;
        Ok(Arc::new(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn name(s: &str) -> GraphName {
        GraphName::new(s).unwrap()
    }

    // -----------------------------------------------------------------------
    // Routing
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn service_response_completes_matching_call() {
        let routes = Routes::default();
        let (tx, rx) = oneshot::channel();
        routes.pending.lock().unwrap().insert("call-1".to_string(), tx);

        routes.route_incoming(
            r#"{"op":"service_response","id":"call-1","service":"/concert/list_apps","values":{"available_rapps":[]},"result":true}"#,
        );

        let outcome = rx.await.unwrap();
        assert_eq!(outcome, Ok(json!({"available_rapps": []})));
        assert!(routes.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_service_response_carries_reason() {
        let routes = Routes::default();
        let (tx, rx) = oneshot::channel();
        routes.pending.lock().unwrap().insert("call-2".to_string(), tx);

        routes.route_incoming(
            r#"{"op":"service_response","id":"call-2","values":"app manager crashed","result":false}"#,
        );

        assert_eq!(rx.await.unwrap(), Err("app manager crashed".to_string()));
    }

    #[tokio::test]
    async fn publish_reaches_topic_subscribers_only() {
        let routes = Routes::default();
        let (tx, mut rx) = broadcast::channel(8);
        routes.topics.lock().unwrap().insert(
            "/concert/app_list".to_string(),
            TopicRoute {
                message_type: "rocon_app_manager_msgs/RappList".to_string(),
                sender: tx,
            },
        );

        routes.route_incoming(r#"{"op":"publish","topic":"/other","msg":{"data":1}}"#);
        routes.route_incoming(
            r#"{"op":"publish","topic":"/concert/app_list","msg":{"running_rapps":[]}}"#,
        );

        assert_eq!(rx.recv().await.unwrap(), json!({"running_rapps": []}));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn malformed_and_unknown_frames_are_ignored() {
        let routes = Routes::default();
        routes.route_incoming("not json");
        routes.route_incoming(r#"{"op":"advertise","topic":"/x"}"#);
        routes.route_incoming(r#"{"op":"service_response","id":"nobody"}"#);
    }

    #[tokio::test]
    async fn close_fails_pending_calls() {
        let routes = Routes::default();
        let (tx, rx) = oneshot::channel::<Result<Value, String>>();
        routes.pending.lock().unwrap().insert("call-3".to_string(), tx);
        routes.close();
        assert!(rx.await.is_err());
    }

    // -----------------------------------------------------------------------
    // End to end against a scripted rosbridge server
    // -----------------------------------------------------------------------

    /// Minimal rosbridge: knows one service (`/concert/start_app`) and answers
    /// every `subscribe` with two `publish` frames.
    async fn spawn_fake_rosbridge() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                let Message::Text(text) = msg else { continue };
                let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                let replies = match frame["op"].as_str() {
                    Some("call_service") if frame["service"] == ROSAPI_SERVICE_TYPE => {
                        let known = frame["args"]["service"] == "/concert/start_app";
                        let service_type = if known { "rocon_app_manager_msgs/StartRapp" } else { "" };
                        vec![json!({
                            "op": "service_response",
                            "id": frame["id"],
                            "values": { "type": service_type },
                            "result": true,
                        })]
                    }
                    Some("call_service") => vec![json!({
                        "op": "service_response",
                        "id": frame["id"],
                        "values": { "started": true, "message": frame["args"]["name"] },
                        "result": true,
                    })],
                    Some("subscribe") => (0..2)
                        .map(|seq| json!({
                            "op": "publish",
                            "topic": frame["topic"],
                            "msg": { "seq": seq },
                        }))
                        .collect(),
                    _ => Vec::new(),
                };
                for reply in replies {
                    ws.send(Message::Text(reply.to_string().into())).await.unwrap();
                }
            }
        });

        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn end_to_end_lookup_call_and_subscribe() -> Result<(), Box<dyn std::error::Error>> {
        let url = spawn_fake_rosbridge().await;
        let node = RosbridgeNode::connect(&url, name("/remocon")).await?;

        let missing = node
            .new_service_client(&name("/concert/stop_app"), "rocon_app_manager_msgs/StopRapp")
            .await;
        assert!(matches!(missing, Err(RemoconError::ServiceNotFound { .. })));

        let mismatched = node
            .new_service_client(&name("/concert/start_app"), "rocon_app_manager_msgs/StopRapp")
            .await;
        assert!(matches!(mismatched, Err(RemoconError::TypeMismatch { .. })));

        let client = node
            .new_service_client(&name("/concert/start_app"), "rocon_app_manager_msgs/StartRapp")
            .await?;
        let values = client.call(json!({"name": "turtlebot_teleop"})).await?;
        assert_eq!(values["started"], true);
        assert_eq!(values["message"], "turtlebot_teleop");

        let mut rx = node
            .new_subscriber(&name("/concert/app_list"), "rocon_app_manager_msgs/RappList")
            .await?;
        assert_eq!(rx.recv().await?["seq"], 0);
        assert_eq!(rx.recv().await?["seq"], 1);
        Ok(())
    }

    #[tokio::test]
    async fn second_subscriber_shares_the_topic_only_with_the_same_type(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let url = spawn_fake_rosbridge().await;
        let node = RosbridgeNode::connect(&url, name("/remocon")).await?;
        let topic = name("/concert/app_list");

        let mut first = node
            .new_subscriber(&topic, "rocon_app_manager_msgs/RappList")
            .await?;
        let mut second = node
            .new_subscriber(&topic, "rocon_app_manager_msgs/RappList")
            .await?;

        let clash = node.new_subscriber(&topic, "std_msgs/String").await;
        match clash {
            Err(RemoconError::TypeMismatch { name, expected, actual }) => {
                assert_eq!(name, "/concert/app_list");
                assert_eq!(expected, "rocon_app_manager_msgs/RappList");
                assert_eq!(actual, "std_msgs/String");
            }
            other => panic!("expected a type mismatch, got {other:?}"),
        }

        assert_eq!(first.recv().await?["seq"], 0);
        assert_eq!(second.recv().await?["seq"], 0);
        Ok(())
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let result = RosbridgeNode::connect(&format!("ws://{addr}"), name("/remocon")).await;
        assert!(matches!(result, Err(RemoconError::Connection(_))));
    }
}
