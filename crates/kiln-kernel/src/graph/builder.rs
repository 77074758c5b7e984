//! Graph Builder
//!
//! The construction-phase interface: collect service nodes, reject structural
//! errors as early as possible, and produce an immutable [`ServiceGraph`].

use super::{ServiceGraph, ServiceNode};
use crate::error::GraphError;
use indexmap::IndexMap;
use kiln_contract::AppManifest;

/// Builder for service graphs
///
/// Usage:
/// ```rust,ignore
/// let mut builder = GraphBuilder::new();
/// builder.add_node(ServiceNode::real("user", "user.contract.yaml"))?;
/// builder.add_node(ServiceNode::real("todo", "todo.contract.yaml").depends_on("user"))?;
/// let graph = builder.build()?;
/// ```
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    nodes: IndexMap<String, ServiceNode>,
    aggregator: bool,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    /// Create an empty builder with the aggregator enabled
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: IndexMap::new(),
            aggregator: true,
        }
    }

    /// Enable or disable the synthetic gateway
    #[must_use]
    pub fn with_aggregator(mut self, enabled: bool) -> Self {
        self.aggregator = enabled;
        self
    }

    /// Seed a builder with every service of a manifest, in declaration order
    ///
    /// # Errors
    /// Returns `GraphError` on an empty or duplicate service name
    pub fn from_manifest(manifest: &AppManifest) -> Result<Self, GraphError> {
        let mut builder = Self::new();
        for decl in &manifest.services {
            let mut node = ServiceNode::real(&decl.name, &decl.contract)
                .with_dependencies(decl.dependencies.iter().cloned());
            node.port = decl.port();
            builder.add_node(node)?;
        }
        Ok(builder)
    }

    /// Number of nodes added so far
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Add a node
    ///
    /// # Errors
    /// - `GraphError::EmptyName` if the name is blank
    /// - `GraphError::DuplicateNode` if the name was already added
    /// - `GraphError::SelfDependency` if the node depends on itself
    pub fn add_node(&mut self, node: ServiceNode) -> Result<&mut Self, GraphError> {
        if node.name.trim().is_empty() {
            return Err(GraphError::EmptyName);
        }
        if self.nodes.contains_key(&node.name) {
            return Err(GraphError::DuplicateNode(node.name));
        }
        if node.dependencies.iter().any(|dep| *dep == node.name) {
            return Err(GraphError::SelfDependency(node.name));
        }
        self.nodes.insert(node.name.clone(), node);
        Ok(self)
    }

    /// Finish construction
    ///
    /// Appends the gateway when the aggregator is enabled and more than one
    /// real service exists.
    ///
    /// # Errors
    /// Returns `GraphError::DuplicateNode` if a declared service already uses
    /// the gateway name
    pub fn build(mut self) -> Result<ServiceGraph, GraphError> {
        let real: Vec<String> = self
            .nodes
            .values()
            .filter(|n| !n.is_synthetic())
            .map(|n| n.name.clone())
            .collect();

        if self.aggregator && real.len() > 1 {
            self.add_node(ServiceNode::gateway(real))?;
        }

        tracing::debug!(nodes = self.nodes.len(), "service graph built");
        Ok(ServiceGraph::from_nodes(self.nodes))
    }
}
