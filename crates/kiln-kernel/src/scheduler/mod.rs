//! Wave scheduler
//!
//! Layers a [`ServiceGraph`] into ordered [`Wave`]s:
//!
//! - depth(n) is 0 when n has no in-set dependency, otherwise one more than
//!   the deepest in-set dependency
//! - dependencies outside the set count as satisfied and are not walked
//! - synthetic nodes always land one wave after the deepest real node
//! - waves are ordered by depth, members keep declaration order
//!
//! A wave holding more than one node is parallel: no member depends on
//! another, so the runner may execute them concurrently.

use crate::error::ScheduleError;
use crate::graph::{ServiceGraph, ServiceNode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// What the unit of work is asked to do with a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkAction {
    /// First implementation of a service
    Implement,
    /// Rework an existing service after its contract changed
    Reimplement {
        /// Whether the change breaks callers
        breaking: bool,
    },
    /// Tear a service down
    Remove,
    /// Regenerate shared infrastructure
    RefreshInfra,
}

impl fmt::Display for WorkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Implement => f.write_str("implement"),
            Self::Reimplement { breaking: true } => f.write_str("reimplement (breaking)"),
            Self::Reimplement { breaking: false } => f.write_str("reimplement"),
            Self::Remove => f.write_str("remove"),
            Self::RefreshInfra => f.write_str("refresh infrastructure"),
        }
    }
}

/// A group of nodes executed together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wave {
    /// Position in the schedule
    pub index: usize,
    /// True iff more than one node
    pub parallel: bool,
    /// Members, in declaration order
    pub nodes: Vec<ServiceNode>,
    /// Action applied to every member
    pub action: WorkAction,
}

impl Wave {
    /// Create a wave; parallelism follows from the member count
    #[must_use]
    pub fn new(index: usize, nodes: Vec<ServiceNode>, action: WorkAction) -> Self {
        Self {
            index,
            parallel: nodes.len() > 1,
            nodes,
            action,
        }
    }

    /// Member names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name.as_str())
    }

    /// Number of members
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the wave has no members
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// What to do when the dependency walk finds a cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePolicy {
    /// Return the cycle as an error
    Fail,
    /// Pin the cyclic node to depth 0, warn, and keep going
    #[default]
    Degrade,
}

/// Warning produced by a degraded cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleWarning {
    /// Node pinned to depth 0
    pub node: String,
    /// Node whose depth was being computed when the cycle was found
    pub while_resolving: String,
}

impl fmt::Display for CycleWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "circular dependency involving {} (while resolving {}); placed in wave 0",
            self.node, self.while_resolving
        )
    }
}

/// Waves plus any warnings raised while computing them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Ordered waves
    pub waves: Vec<Wave>,
    /// Degraded cycles
    pub warnings: Vec<CycleWarning>,
}

impl Schedule {
    /// Total nodes across waves
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.waves.iter().map(Wave::len).sum()
    }

    /// Wave index of a node
    #[must_use]
    pub fn wave_of(&self, name: &str) -> Option<usize> {
        self.waves
            .iter()
            .find(|w| w.names().any(|n| n == name))
            .map(|w| w.index)
    }
}

/// Layer a graph into waves, failing on the first cycle
///
/// # Errors
/// Returns `ScheduleError::CycleDetected` naming a node on the cycle
pub fn build_waves(graph: &ServiceGraph) -> Result<Vec<Wave>, ScheduleError> {
    schedule(graph, CyclePolicy::Fail).map(|s| s.waves)
}

/// Layer a graph into waves under the given cycle policy
///
/// # Errors
/// Returns `ScheduleError::CycleDetected` only under [`CyclePolicy::Fail`]
pub fn schedule(graph: &ServiceGraph, policy: CyclePolicy) -> Result<Schedule, ScheduleError> {
    let mut walk = DepthWalk::new(graph);
    let mut warnings = Vec::new();

    for node in graph.real_nodes() {
        loop {
            match walk.depth_of(&node.name) {
                Ok(_) => break,
                Err(err) => match policy {
                    CyclePolicy::Fail => return Err(err),
                    CyclePolicy::Degrade => {
                        let warning = CycleWarning {
                            node: err.node().to_string(),
                            while_resolving: node.name.clone(),
                        };
                        tracing::warn!(node = %warning.node, "{warning}");
                        walk.pin(err.node());
                        warnings.push(warning);
                    }
                },
            }
        }
    }

    let max_real = graph
        .real_nodes()
        .filter_map(|n| walk.depths.get(n.name.as_str()).copied())
        .max();
    let synthetic_depth = max_real.map_or(0, |d| d + 1);

    let mut by_depth: BTreeMap<usize, Vec<ServiceNode>> = BTreeMap::new();
    for node in graph.nodes() {
        let depth = if node.is_synthetic() {
            synthetic_depth
        } else {
            walk.depths.get(node.name.as_str()).copied().unwrap_or(0)
        };
        by_depth.entry(depth).or_default().push(node.clone());
    }

    let waves: Vec<Wave> = by_depth
        .into_values()
        .enumerate()
        .map(|(index, nodes)| Wave::new(index, nodes, WorkAction::Implement))
        .collect();

    tracing::debug!(
        waves = waves.len(),
        nodes = graph.len(),
        degraded = warnings.len(),
        "schedule computed"
    );
    Ok(Schedule { waves, warnings })
}

/// Memoized depth-first depth computation with an explicit visiting set
struct DepthWalk<'g> {
    graph: &'g ServiceGraph,
    depths: HashMap<&'g str, usize>,
    visiting: HashSet<&'g str>,
}

impl<'g> DepthWalk<'g> {
    fn new(graph: &'g ServiceGraph) -> Self {
        Self {
            graph,
            depths: HashMap::with_capacity(graph.len()),
            visiting: HashSet::new(),
        }
    }

    fn pin(&mut self, name: &str) {
        let graph = self.graph;
        if let Some(node) = graph.node(name) {
            self.depths.insert(node.name.as_str(), 0);
        }
    }

    fn depth_of(&mut self, name: &str) -> Result<usize, ScheduleError> {
        if let Some(&depth) = self.depths.get(name) {
            return Ok(depth);
        }
        let graph = self.graph;
        let Some(node) = graph.node(name) else {
            return Ok(0);
        };
        let key = node.name.as_str();

        if !self.visiting.insert(key) {
            return Err(ScheduleError::CycleDetected {
                node: key.to_string(),
            });
        }

        let mut depth = 0;
        for dep in &node.dependencies {
            if !graph.contains(dep) {
                continue;
            }
            match self.depth_of(dep) {
                Ok(d) => depth = depth.max(d + 1),
                Err(err) => {
                    self.visiting.remove(key);
                    return Err(err);
                }
            }
        }

        self.visiting.remove(key);
        self.depths.insert(key, depth);
        Ok(depth)
    }
}
