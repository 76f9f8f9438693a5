//! [`AppManager`] – one interaction with a robot app manager.
//!
//! INSTANCES MAY ONLY EVER BE EXECUTED ONCE.  The first execution claims the
//! connection slot; any later attempt is logged and skipped.
//!
//! Service absence is handled per function: `start` and `list` fail, because
//! the caller must know the app did not start or the list is unavailable,
//! while `stop` only warns, because a robot that has already stopped (or an
//! app manager that has gone away) must not block cleanup.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use remocon_middleware::{
    ConnectedNode, GraphName, NameResolver, NodeMain, PendingResponse, ServiceClient, Subscriber,
};
use remocon_types::{
    GetRappList, GetRappListRequest, GetRappListResponse, KeyValue, RappList, RemoconError,
    StartRapp, StartRappRequest, StartRappResponse, StopRapp, StopRappRequest, StopRappResponse,
};
use tracing::{debug, error, info, warn};

use crate::error::AppManagerError;
use crate::function::AppManagerFunction;

const START_SERVICE: &str = "start_app";
const STOP_SERVICE: &str = "stop_app";
const LIST_SERVICE: &str = "list_apps";
const APP_LIST_TOPIC: &str = "app_list";

/// What an execution set in motion.
#[derive(Debug)]
pub enum Dispatched {
    /// `start_app` was called; the response arrives here.
    Start(PendingResponse<StartRappResponse>),
    /// `stop_app` was called; the response arrives here.
    Stop(PendingResponse<StopRappResponse>),
    /// `list_apps` was called; the response arrives here.
    List(PendingResponse<GetRappListResponse>),
    /// Subscribed to `app_list`; every update is delivered in publish order.
    AppList(Subscriber<RappList>),
    /// `stop_app` is not advertised, so nothing was sent.
    StopUnavailable,
    /// The instance had already been executed; nothing was done.
    AlreadyExecuted,
}

/// Single-use app manager client.
///
/// # Example
///
/// ```rust,no_run
/// use remocon_app_manager::{AppManager, AppManagerFunction, Dispatched};
/// use remocon_middleware::{GraphName, LocalGraph, NameResolver};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let graph = LocalGraph::default();
/// let resolver = NameResolver::new(GraphName::new("/concert")?)?;
///
/// let mut manager = AppManager::with_resolver("turtlebot_teleop", resolver);
/// manager.set_function(AppManagerFunction::Start);
///
/// let node = std::sync::Arc::new(graph.node(GraphName::new("/remocon")?));
/// if let Dispatched::Start(pending) = manager.execute(node).await? {
///     println!("started: {}", pending.response().await?.started);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct AppManager {
    app_name: String,
    resolver: Option<NameResolver>,
    function: Option<AppManagerFunction>,
    remappings: Vec<KeyValue>,
    node: OnceLock<Arc<dyn ConnectedNode>>,
}

impl AppManager {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            ..Self::default()
        }
    }

    pub fn with_resolver(app_name: impl Into<String>, resolver: NameResolver) -> Self {
        Self {
            app_name: app_name.into(),
            resolver: Some(resolver),
            ..Self::default()
        }
    }

    pub fn set_app_name(&mut self, app_name: impl Into<String>) {
        self.app_name = app_name.into();
    }

    pub fn set_resolver(&mut self, resolver: NameResolver) {
        self.resolver = Some(resolver);
    }

    pub fn set_function(&mut self, function: AppManagerFunction) {
        self.function = Some(function);
    }

    /// Remap one of the started app's topics or services.  Only used by
    /// [`AppManagerFunction::Start`].
    pub fn add_remapping(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.remappings.push(KeyValue::new(from, to));
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn function(&self) -> Option<AppManagerFunction> {
        self.function
    }

    /// Whether this instance has been executed.
    pub fn has_executed(&self) -> bool {
        self.node.get().is_some()
    }

    /// Perform the configured interaction against `node`.
    ///
    /// Returns as soon as the call has been issued or the subscription is in
    /// place; results arrive through the returned [`Dispatched`] value.
    ///
    /// # Errors
    ///
    /// * [`AppManagerError::FunctionNotSet`], [`AppManagerError::ResolverNotSet`]
    ///   and [`AppManagerError::AppNameNotSet`] – the instance is misconfigured.
    ///   It is not consumed.
    /// * [`AppManagerError::Middleware`] – `start_app` or `list_apps` is not
    ///   advertised ([`RemoconError::ServiceNotFound`]), or the middleware
    ///   failed.
    pub async fn execute(&self, node: Arc<dyn ConnectedNode>) -> Result<Dispatched, AppManagerError> {
        let (function, resolver) = self.validate()?;

        if self.node.set(Arc::clone(&node)).is_err() {
            error!(
                function = %function,
                "app manager instances may only ever be executed once"
            );
            return Ok(Dispatched::AlreadyExecuted);
        }
        debug!(function = %function, node = %node.node_name(), "app manager executing");

        match function {
            AppManagerFunction::Start => self.start_app(node.as_ref(), resolver).await,
            AppManagerFunction::Stop => self.stop_app(node.as_ref(), resolver).await,
            AppManagerFunction::List => self.list_apps(node.as_ref(), resolver).await,
            AppManagerFunction::ContinuousList => {
                self.continuously_list_apps(node.as_ref(), resolver).await
            }
        }
    }

    fn validate(&self) -> Result<(AppManagerFunction, &NameResolver), AppManagerError> {
        let function = self.function.ok_or(AppManagerError::FunctionNotSet)?;
        let resolver = self.resolver.as_ref().ok_or(AppManagerError::ResolverNotSet)?;
        if function == AppManagerFunction::Start && self.app_name.is_empty() {
            return Err(AppManagerError::AppNameNotSet);
        }
        Ok((function, resolver))
    }

    async fn start_app(
        &self,
        node: &dyn ConnectedNode,
        resolver: &NameResolver,
    ) -> Result<Dispatched, AppManagerError> {
        let service = resolver.resolve(START_SERVICE)?;
        let client = ServiceClient::<StartRapp>::connect(node, &service)
            .await
            .inspect_err(|e| warn!(service = %service, error = %e, "start app service unavailable"))?;
        debug!(service = %service, "start app service client created");

        let request = StartRappRequest {
            name: self.app_name.clone(),
            remappings: self.remappings.clone(),
            parameters: Vec::new(),
        };
        let pending = client.call(&request)?;
        info!(service = %service, app = %self.app_name, "start app service call done");
        Ok(Dispatched::Start(pending))
    }

    async fn stop_app(
        &self,
        node: &dyn ConnectedNode,
        resolver: &NameResolver,
    ) -> Result<Dispatched, AppManagerError> {
        let service = resolver.resolve(STOP_SERVICE)?;
        let client = match ServiceClient::<StopRapp>::connect(node, &service).await {
            Ok(client) => client,
            Err(RemoconError::ServiceNotFound { .. }) => {
                warn!(service = %service, "stop app service not found");
                return Ok(Dispatched::StopUnavailable);
            }
            Err(e) => return Err(e.into()),
        };
        debug!(service = %service, "stop app service client created");

        // The app manager runs at most one app, so the name is not sent.
        let pending = client.call(&StopRappRequest {})?;
        info!(service = %service, "stop app service call done");
        Ok(Dispatched::Stop(pending))
    }

    async fn list_apps(
        &self,
        node: &dyn ConnectedNode,
        resolver: &NameResolver,
    ) -> Result<Dispatched, AppManagerError> {
        let service = resolver.resolve(LIST_SERVICE)?;
        let client = ServiceClient::<GetRappList>::connect(node, &service)
            .await
            .inspect_err(|e| warn!(service = %service, error = %e, "list apps service unavailable"))?;
        debug!(service = %service, "list apps service client created");

        let pending = client.call(&GetRappListRequest {})?;
        info!(service = %service, "list apps service call done");
        Ok(Dispatched::List(pending))
    }

    async fn continuously_list_apps(
        &self,
        node: &dyn ConnectedNode,
        resolver: &NameResolver,
    ) -> Result<Dispatched, AppManagerError> {
        let topic = resolver.resolve(APP_LIST_TOPIC)?;
        let subscriber = Subscriber::<RappList>::subscribe(node, &topic).await?;
        info!(topic = %topic, "subscribed to app list");
        Ok(Dispatched::AppList(subscriber))
    }
}

#[async_trait]
impl NodeMain for AppManager {
    type Output = Dispatched;
    type Error = AppManagerError;

    /// `app_manager/<function>`, so that each single-use client runs on its
    /// own node.
    fn default_node_name(&self) -> GraphName {
        let function = self.function.map_or("unconfigured", AppManagerFunction::as_str);
        GraphName::new(format!("app_manager/{function}")).unwrap_or_else(|_| GraphName::root())
    }

    async fn on_start(&self, node: Arc<dyn ConnectedNode>) -> Result<Dispatched, AppManagerError> {
        self.execute(node).await
    }
}
