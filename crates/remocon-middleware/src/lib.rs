//! `remocon-middleware` – the messaging boundary
//!
//! Everything remocon needs from a ROS-style graph: names, name resolution,
//! service clients, subscribers and a node executor, plus two middlewares
//! that implement the boundary.
//!
//! # Modules
//!
//! - [`graph_name`] – [`GraphName`], a validated ROS graph name.
//! - [`resolver`] – [`NameResolver`], maps logical names into a namespace.
//! - [`node`] – the [`ConnectedNode`] / [`RawServiceClient`] /
//!   [`NodeFactory`] / [`NodeMain`] traits every middleware and program
//!   implements.
//! - [`client`] – typed [`ServiceClient`], [`PendingResponse`] and
//!   [`Subscriber`] over any [`ConnectedNode`].
//! - [`executor`] – [`NodeMainExecutor`], connects nodes and runs node mains
//!   on Tokio tasks.
//! - [`local`] – [`LocalGraph`], an in-process service registry and topic
//!   bus built on Tokio broadcast channels.
//! - [`rosbridge`] – [`RosbridgeNode`], reaches a live ROS graph through a
//!   rosbridge v2 WebSocket server.

pub mod client;
pub mod executor;
pub mod graph_name;
pub mod local;
pub mod node;
pub mod resolver;
pub mod rosbridge;

pub use client::{PendingResponse, ServiceClient, Subscriber};
pub use executor::{NodeHandle, NodeMainExecutor};
pub use graph_name::GraphName;
pub use local::{LocalGraph, LocalNode};
pub use node::{ConnectedNode, NodeConfiguration, NodeFactory, NodeMain, RawServiceClient};
pub use resolver::NameResolver;
pub use rosbridge::{RosbridgeConnector, RosbridgeNode};
