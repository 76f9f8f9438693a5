//! [`NameResolver`] – maps short logical names into a namespace.
//!
//! Resolution rules:
//!
//! | Input | Result |
//! |---|---|
//! | relative (`start_app`) | joined onto the resolver's namespace |
//! | global (`/rosapi/services`) | unchanged |
//! | private (`~foo`) | rejected – there is no node to anchor it |
//!
//! Remappings are applied to the resolved global name, so a remapping from
//! `start_app` registered on `/concert` matches the lookup of `start_app` as
//! well as `/concert/start_app`.

use std::collections::HashMap;

use remocon_types::RemoconError;

use crate::graph_name::GraphName;

/// Resolves logical names against a global namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameResolver {
    namespace: GraphName,
    remappings: HashMap<GraphName, GraphName>,
}

impl NameResolver {
    /// Create a resolver for `namespace`.  Relative namespaces are made
    /// global.
    ///
    /// # Errors
    ///
    /// Returns [`RemoconError::InvalidGraphName`] for private namespaces.
    pub fn new(namespace: GraphName) -> Result<Self, RemoconError> {
        Ok(Self {
            namespace: namespace.to_global()?,
            remappings: HashMap::new(),
        })
    }

    /// Resolver for the root namespace `/`.
    pub fn root() -> Self {
        Self {
            namespace: GraphName::root(),
            remappings: HashMap::new(),
        }
    }

    pub fn namespace(&self) -> &GraphName {
        &self.namespace
    }

    /// Add a remapping (builder-style).  Both sides are resolved against this
    /// resolver's namespace before being stored.
    pub fn with_remapping(mut self, from: &str, to: &str) -> Result<Self, RemoconError> {
        let from = self.resolve_unmapped(from)?;
        let to = self.resolve_unmapped(to)?;
        self.remappings.insert(from, to);
        Ok(self)
    }

    /// Resolve `name` to a fully qualified graph name.
    pub fn resolve(&self, name: &str) -> Result<GraphName, RemoconError> {
        let resolved = self.resolve_unmapped(name)?;
        Ok(self.remappings.get(&resolved).cloned().unwrap_or(resolved))
    }

    /// Build a resolver for a child namespace.  `namespace` is resolved
    /// through this resolver; remappings are inherited.
    pub fn new_child(&self, namespace: &str) -> Result<Self, RemoconError> {
        Ok(Self {
            namespace: self.resolve(namespace)?,
            remappings: self.remappings.clone(),
        })
    }

    fn resolve_unmapped(&self, name: &str) -> Result<GraphName, RemoconError> {
        let name = GraphName::new(name)?;
        if name.is_private() {
            return Err(RemoconError::InvalidGraphName(format!(
                "cannot resolve private name {name} without a node"
            )));
        }
        Ok(self.namespace.join(&name))
    }
}

impl Default for NameResolver {
    fn default() -> Self {
        Self::root()
    }
}
