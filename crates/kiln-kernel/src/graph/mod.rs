//! Service dependency graph
//!
//! A [`ServiceGraph`] is the immutable output of the construction phase. It
//! holds every [`ServiceNode`] in declaration order and a directed graph of
//! the edges whose both endpoints are inside the node set. Dependencies that
//! name a service outside the set are kept on the node but treated as already
//! satisfied.
//!
//! Edges point from a dependency to its dependent, so walking outgoing edges
//! of `user` yields every service that calls `user`.

mod builder;

pub use builder::GraphBuilder;

use indexmap::IndexMap;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

/// Name of the synthetic aggregator node
pub const GATEWAY_NODE: &str = "gateway-service";

/// Port declared by the synthetic aggregator node
pub const GATEWAY_PORT: u16 = 8080;

/// Name of the synthetic infrastructure node used by migrations
pub const INFRASTRUCTURE_NODE: &str = "infrastructure";

/// What a node stands for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A service declared in the manifest
    Real {
        /// Contract reference of the service
        contract: String,
    },
    /// A node added by the planner itself
    Synthetic(SyntheticKind),
}

/// Synthetic node roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyntheticKind {
    /// Aggregating gateway in front of every real service
    Gateway,
    /// Shared deployment infrastructure
    Infrastructure,
}

/// One schedulable unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceNode {
    /// Unique, non-empty name
    pub name: String,
    /// Names of the services this node depends on, in declaration order
    pub dependencies: Vec<String>,
    /// Payload
    pub kind: NodeKind,
    /// Declared network port
    pub port: Option<u16>,
}

impl ServiceNode {
    /// Create a real service node without dependencies
    #[must_use]
    pub fn real(name: impl Into<String>, contract: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            kind: NodeKind::Real {
                contract: contract.into(),
            },
            port: None,
        }
    }

    /// Create the aggregating gateway over the given services
    #[must_use]
    pub fn gateway(dependencies: Vec<String>) -> Self {
        Self {
            name: GATEWAY_NODE.to_string(),
            dependencies,
            kind: NodeKind::Synthetic(SyntheticKind::Gateway),
            port: Some(GATEWAY_PORT),
        }
    }

    /// Create the infrastructure node
    #[must_use]
    pub fn infrastructure() -> Self {
        Self {
            name: INFRASTRUCTURE_NODE.to_string(),
            dependencies: Vec::new(),
            kind: NodeKind::Synthetic(SyntheticKind::Infrastructure),
            port: None,
        }
    }

    /// Add a dependency
    #[must_use]
    pub fn depends_on(mut self, service: impl Into<String>) -> Self {
        self.dependencies.push(service.into());
        self
    }

    /// Replace all dependencies
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Set the declared port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Whether the planner added this node
    #[inline]
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        matches!(self.kind, NodeKind::Synthetic(_))
    }

    /// Synthetic role, if any
    #[inline]
    #[must_use]
    pub fn synthetic_kind(&self) -> Option<SyntheticKind> {
        match self.kind {
            NodeKind::Synthetic(kind) => Some(kind),
            NodeKind::Real { .. } => None,
        }
    }

    /// Contract reference of a real service
    #[inline]
    #[must_use]
    pub fn contract(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Real { contract } => Some(contract),
            NodeKind::Synthetic(_) => None,
        }
    }
}

/// Validated service graph
#[derive(Debug, Clone)]
pub struct ServiceGraph {
    nodes: IndexMap<String, ServiceNode>,
    edges: DiGraphMap<usize, ()>,
}

impl ServiceGraph {
    fn from_nodes(nodes: IndexMap<String, ServiceNode>) -> Self {
        let mut edges = DiGraphMap::new();
        for idx in 0..nodes.len() {
            edges.add_node(idx);
        }
        for (idx, node) in nodes.values().enumerate() {
            for dep in &node.dependencies {
                if let Some(dep_idx) = nodes.get_index_of(dep) {
                    edges.add_edge(dep_idx, idx, ());
                }
            }
        }
        Self { nodes, edges }
    }

    /// Number of nodes, synthetic ones included
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of in-set edges
    #[inline]
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.edge_count()
    }

    /// Look up a node by name
    #[inline]
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&ServiceNode> {
        self.nodes.get(name)
    }

    /// Whether a node with this name is in the set
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// All nodes in declaration order
    pub fn nodes(&self) -> impl Iterator<Item = &ServiceNode> {
        self.nodes.values()
    }

    /// Declared services only
    pub fn real_nodes(&self) -> impl Iterator<Item = &ServiceNode> {
        self.nodes.values().filter(|n| !n.is_synthetic())
    }

    /// Dependencies of `name` that are inside the set
    pub fn dependencies_of<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a ServiceNode> + 'a {
        self.neighbors(name, Direction::Incoming)
    }

    /// Direct dependents of `name`
    pub fn dependents_of<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a ServiceNode> + 'a {
        self.neighbors(name, Direction::Outgoing)
    }

    fn neighbors<'a>(
        &'a self,
        name: &str,
        direction: Direction,
    ) -> impl Iterator<Item = &'a ServiceNode> + 'a {
        let mut indices: Vec<usize> = self
            .nodes
            .get_index_of(name)
            .map(|idx| self.edges.neighbors_directed(idx, direction).collect())
            .unwrap_or_default();
        indices.sort_unstable();
        indices
            .into_iter()
            .filter_map(move |idx| self.nodes.get_index(idx).map(|(_, node)| node))
    }

    /// Whether the in-set edges contain a cycle
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.edges)
    }

    /// The synthetic gateway, when one was added
    #[must_use]
    pub fn gateway(&self) -> Option<&ServiceNode> {
        self.nodes
            .values()
            .find(|n| n.synthetic_kind() == Some(SyntheticKind::Gateway))
    }
}
