//! `remocon-types` – shared vocabulary of the remocon workspace.
//!
//! Holds the app manager message and service types (the
//! `rocon_app_manager_msgs` package as seen on the wire), the traits that tie
//! a Rust type to its ROS type name, and the workspace-wide [`RemoconError`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Type traits
// ---------------------------------------------------------------------------

/// A message that can travel over a topic or inside a service call.
///
/// Messages are carried as JSON on the wire, so any serde-capable type can be
/// a message once it names its ROS type.
pub trait RosMessage: Serialize + DeserializeOwned + Send + 'static {
    /// Full ROS type name, e.g. `"rocon_app_manager_msgs/RappList"`.
    const TYPE_NAME: &'static str;
}

/// A request/response service definition.
pub trait RosService: Send + Sync + 'static {
    type Request: Serialize + DeserializeOwned + Send + 'static;
    type Response: Serialize + DeserializeOwned + Send + 'static;

    /// Full ROS service type name, e.g. `"rocon_app_manager_msgs/StartRapp"`.
    const TYPE_NAME: &'static str;
}

// ---------------------------------------------------------------------------
// rocon_app_manager_msgs
// ---------------------------------------------------------------------------

/// A robot app as advertised by an app manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rapp {
    /// Unique resource name, e.g. `"turtlebot_rapps/teleop"`.
    pub name: String,
    pub display_name: String,
    pub description: String,
    /// Rocon URI describing which platforms can run the app.
    pub compatibility: String,
    pub status: String,
}

/// Snapshot of the apps an app manager can run and is running.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RappList {
    pub available_rapps: Vec<Rapp>,
    pub running_rapps: Vec<Rapp>,
}

impl RosMessage for RappList {
    const TYPE_NAME: &'static str = "rocon_app_manager_msgs/RappList";
}

/// Generic string pair used for remappings and parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartRappRequest {
    pub name: String,
    pub remappings: Vec<KeyValue>,
    pub parameters: Vec<KeyValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartRappResponse {
    /// Older app managers report this field as `success`.
    #[serde(alias = "success")]
    pub started: bool,
    pub error_code: i32,
    pub message: String,
    /// Namespace the app's public interface was started under.
    pub application_namespace: String,
}

/// Marker for the `start_app` service.
pub struct StartRapp;

impl RosService for StartRapp {
    type Request = StartRappRequest;
    type Response = StartRappResponse;
    const TYPE_NAME: &'static str = "rocon_app_manager_msgs/StartRapp";
}

/// `stop_app` takes no arguments: an app manager runs at most one app.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopRappRequest {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopRappResponse {
    pub stopped: bool,
    pub error_code: i32,
    pub message: String,
}

/// Marker for the `stop_app` service.
pub struct StopRapp;

impl RosService for StopRapp {
    type Request = StopRappRequest;
    type Response = StopRappResponse;
    const TYPE_NAME: &'static str = "rocon_app_manager_msgs/StopRapp";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRappListRequest {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetRappListResponse {
    pub available_rapps: Vec<Rapp>,
    pub running_rapps: Vec<Rapp>,
}

/// Marker for the `list_apps` service.
pub struct GetRappList;

impl RosService for GetRappList {
    type Request = GetRappListRequest;
    type Response = GetRappListResponse;
    const TYPE_NAME: &'static str = "rocon_app_manager_msgs/GetRappList";
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Middleware-level failures shared by every remocon crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoconError {
    #[error("Service not found: {service}")]
    ServiceNotFound { service: String },

    #[error("Type mismatch on {name}: expected {expected}, found {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid graph name: {0}")]
    InvalidGraphName(String),

    #[error("Service call to {service} failed: {reason}")]
    ServiceCall { service: String, reason: String },

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Connection Error: {0}")]
    Connection(String),

    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("A node named {0} is already running")]
    DuplicateNode(String),

    #[error("Node {0} was shut down before it finished")]
    Aborted(String),
}

impl From<serde_json::Error> for RemoconError {
    fn from(e: serde_json::Error) -> Self {
        RemoconError::Serialization(e.to_string())
    }
}
