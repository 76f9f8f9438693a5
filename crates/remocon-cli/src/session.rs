//! Concert session – the state a remocon holds while controlling a concert.
//!
//! A session works out which app it is acting for, builds the concert and
//! app manager resolvers, and runs [`AppManager`]s on its own
//! [`NodeMainExecutor`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use remocon_app_manager::{AppManager, AppManagerError, AppManagerFunction, Dispatched};
use remocon_middleware::{
    GraphName, NameResolver, NodeConfiguration, NodeFactory, NodeHandle, NodeMain,
    NodeMainExecutor,
};
use remocon_types::RemoconError;
use tracing::{debug, info};

use crate::config::Config;

/// Launcher value meaning "an app just closed and handed control back".
pub const APP_CHOOSER: &str = "AppChooser";

/// How the remocon was launched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchContext {
    /// App name handed over by whoever launched the remocon, if any.
    pub concert_app_name: Option<String>,
}

impl LaunchContext {
    pub fn new(concert_app_name: Option<String>) -> Self {
        Self { concert_app_name }
    }

    /// Whether the remocon is regaining control from a closing app.
    pub fn from_application(&self) -> bool {
        self.concert_app_name.as_deref() == Some(APP_CHOOSER)
    }
}

pub type AppManagerHandle = NodeHandle<Dispatched, AppManagerError>;

pub struct ConcertSession {
    app_name: String,
    from_application: bool,
    master_uri: String,
    concert_resolver: NameResolver,
    app_resolver: NameResolver,
    executor: NodeMainExecutor,
    executions: AtomicU64,
}

impl ConcertSession {
    /// Set a session up from the configuration and launch context.
    ///
    /// # Errors
    ///
    /// Returns [`RemoconError::InvalidGraphName`] when the configured concert
    /// name or app namespace is not a usable graph name.
    pub fn bootstrap(
        config: &Config,
        launch: LaunchContext,
        factory: Arc<dyn NodeFactory>,
    ) -> Result<Self, RemoconError> {
        let from_application = launch.from_application();
        let app_name = match launch.concert_app_name {
            Some(name) if !from_application && !name.is_empty() => name,
            _ => config.default_app_name.clone(),
        };

        let concert_resolver = NameResolver::new(GraphName::new(&config.concert_name)?)?;
        let app_resolver = if config.app_namespace.is_empty() {
            concert_resolver.clone()
        } else {
            concert_resolver.new_child(&config.app_namespace)?
        };

        info!(
            concert = %concert_resolver.namespace(),
            app_namespace = %app_resolver.namespace(),
            app = %app_name,
            from_application,
            "concert session bootstrapped"
        );

        Ok(Self {
            app_name,
            from_application,
            master_uri: config.rosbridge_url.clone(),
            concert_resolver,
            app_resolver,
            executor: NodeMainExecutor::new(factory),
            executions: AtomicU64::new(0),
        })
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn from_application(&self) -> bool {
        self.from_application
    }

    pub fn concert_namespace(&self) -> &GraphName {
        self.concert_resolver.namespace()
    }

    pub fn app_namespace(&self) -> &GraphName {
        self.app_resolver.namespace()
    }

    /// A fresh app manager for this session's app, set to `function`.
    pub fn app_manager(&self, function: AppManagerFunction) -> AppManager {
        let mut manager = AppManager::with_resolver(self.app_name.clone(), self.app_resolver.clone());
        manager.set_function(function);
        manager
    }

    /// Run a fresh app manager for `function` on the session's executor.
    pub fn execute_app_manager(
        &self,
        function: AppManagerFunction,
    ) -> Result<AppManagerHandle, RemoconError> {
        self.execute(self.app_manager(function))
    }

    /// Run `manager` on its own node inside the concert namespace, named
    /// `app_manager/<function>_<n>` where `n` counts this session's
    /// executions.  Overlapping executions of one function therefore run
    /// side by side.
    pub fn execute(&self, manager: AppManager) -> Result<AppManagerHandle, RemoconError> {
        let sequence = self.executions.fetch_add(1, Ordering::Relaxed) + 1;
        let node_name = self
            .concert_resolver
            .resolve(&format!("{}_{sequence}", manager.default_node_name()))?;
        debug!(node = %node_name, "executing app manager");
        let config = NodeConfiguration::new(node_name, self.master_uri.clone());
        self.executor.execute(Arc::new(manager), config)
    }

    /// Shut every app manager this session started down.
    pub fn release(&self) {
        self.executor.shutdown();
        debug!(concert = %self.concert_namespace(), "concert session released");
    }
}
