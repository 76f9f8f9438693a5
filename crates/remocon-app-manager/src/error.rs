use remocon_types::RemoconError;
use thiserror::Error;

/// Failures surfaced by [`AppManager::execute`][crate::AppManager::execute].
///
/// Configuration variants are reported before the instance is consumed, so a
/// misconfigured client can be fixed and executed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppManagerError {
    #[error("no app manager function was set before execution")]
    FunctionNotSet,

    #[error("unknown app manager function '{0}' (expected start, stop, list or list_apps)")]
    UnknownFunction(String),

    #[error("no name resolver was set before execution")]
    ResolverNotSet,

    #[error("starting an app requires an app name")]
    AppNameNotSet,

    #[error(transparent)]
    Middleware(#[from] RemoconError),
}
