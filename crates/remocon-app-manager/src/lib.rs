//! `remocon-app-manager` – single-use client for a robot app manager
//!
//! An app manager is the remote process that starts, stops and lists the
//! apps ("rapps") a robot can run.  [`AppManager`] performs exactly one
//! interaction with it per instance:
//!
//! | [`AppManagerFunction`] | Remote interaction | Result |
//! |---|---|---|
//! | `Start` (`"start"`) | `start_app` service call | [`Dispatched::Start`] |
//! | `Stop` (`"stop"`) | `stop_app` service call | [`Dispatched::Stop`] or [`Dispatched::StopUnavailable`] |
//! | `List` (`"list"`) | `list_apps` service call | [`Dispatched::List`] |
//! | `ContinuousList` (`"list_apps"`) | `app_list` topic subscription | [`Dispatched::AppList`] |
//!
//! Configure the instance, then run it once: either directly through
//! [`AppManager::execute`] or by handing it to a
//! [`NodeMainExecutor`][remocon_middleware::NodeMainExecutor].

pub mod error;
pub mod function;
pub mod manager;

pub use error::AppManagerError;
pub use function::AppManagerFunction;
pub use manager::{AppManager, Dispatched};
