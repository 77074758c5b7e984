//! Execution Runner
//!
//! Drives a list of [`Wave`]s through an injected [`UnitOfWork`].
//!
//! # Ordering guarantees
//!
//! - waves run strictly one after another; no node of wave k+1 starts before
//!   every node of wave k has finished
//! - a parallel wave spawns one task per node, admitted through a semaphore
//!   when a concurrency limit is set
//! - a sequential wave runs its nodes in order and stops at the first failure
//! - a failing node never cancels its in-flight siblings; the run stops after
//!   the wave and reports every result gathered so far
//!
//! Panics raised by a unit of work are caught and reported as node failures.

mod summary;

pub use summary::RunSummary;

use crate::error::{RunError, RunFailure};
use crate::graph::ServiceNode;
use crate::scheduler::{Wave, WorkAction};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// The externally supplied per-node action
///
/// Implement this trait to define what "building" a node means.
#[async_trait::async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Perform the work for one node
    async fn perform(&self, request: WorkRequest) -> anyhow::Result<WorkOutput>;
}

/// Input handed to a unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkRequest {
    /// Target node
    pub node: ServiceNode,
    /// Index of the wave the node belongs to
    pub wave: usize,
    /// Requested action
    pub action: WorkAction,
}

impl WorkRequest {
    /// Create a request
    #[must_use]
    pub fn new(node: ServiceNode, wave: usize, action: WorkAction) -> Self {
        Self { node, wave, action }
    }
}

/// Opaque output of a successful unit of work
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOutput {
    /// One-line summary
    pub summary: String,
    /// Produced artifact paths or identifiers
    pub artifacts: Vec<String>,
}

impl WorkOutput {
    /// Create an output with a summary and no artifacts
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            artifacts: Vec::new(),
        }
    }

    /// Add an artifact
    #[must_use]
    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifacts.push(artifact.into());
        self
    }
}

/// Outcome of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Node name
    pub node: String,
    /// Wave index
    pub wave: usize,
    /// Whether the unit of work succeeded
    pub success: bool,
    /// Elapsed time
    pub duration: Duration,
    /// Output on success
    pub output: Option<WorkOutput>,
    /// Failure cause
    pub error: Option<String>,
}

impl ExecutionResult {
    /// Successful result
    #[must_use]
    pub fn succeeded(node: impl Into<String>, wave: usize, duration: Duration, output: WorkOutput) -> Self {
        Self {
            node: node.into(),
            wave,
            success: true,
            duration,
            output: Some(output),
            error: None,
        }
    }

    /// Failed result
    #[must_use]
    pub fn failed(
        node: impl Into<String>,
        wave: usize,
        duration: Duration,
        cause: impl Into<String>,
    ) -> Self {
        Self {
            node: node.into(),
            wave,
            success: false,
            duration,
            output: None,
            error: Some(cause.into()),
        }
    }
}

/// Result slots of the running wave plus the run-wide completion counter
struct Progress {
    slots: Vec<Option<ExecutionResult>>,
    completed: usize,
    total: usize,
}

impl Progress {
    fn new(total: usize) -> Self {
        Self {
            slots: Vec::new(),
            completed: 0,
            total,
        }
    }

    fn open_wave(&mut self, width: usize) {
        self.slots = (0..width).map(|_| None).collect();
    }

    fn record(&mut self, slot: usize, result: ExecutionResult) {
        self.completed += 1;
        if result.success {
            info!(
                node = %result.node,
                elapsed_ms = result.duration.as_millis(),
                "[{}/{}] ✓ {}",
                self.completed,
                self.total,
                result.node
            );
        } else {
            warn!(
                node = %result.node,
                cause = result.error.as_deref().unwrap_or_default(),
                "[{}/{}] ✗ {}",
                self.completed,
                self.total,
                result.node
            );
        }
        if let Some(entry) = self.slots.get_mut(slot) {
            *entry = Some(result);
        }
    }
}

/// Wave runner
pub struct Runner {
    waves: Vec<Wave>,
    work: Arc<dyn UnitOfWork>,
    concurrency: usize,
}

impl Runner {
    /// Create a runner with no concurrency limit
    pub fn new(waves: Vec<Wave>, work: Arc<dyn UnitOfWork>) -> Self {
        Self {
            waves,
            work,
            concurrency: 0,
        }
    }

    /// Limit how many nodes of a parallel wave run at once (0 = unbounded)
    #[must_use]
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit;
        self
    }

    /// Configured concurrency limit
    #[inline]
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Waves this runner executes
    #[inline]
    #[must_use]
    pub fn waves(&self) -> &[Wave] {
        &self.waves
    }

    /// Nodes across every wave
    #[must_use]
    pub fn total_nodes(&self) -> usize {
        self.waves.iter().map(Wave::len).sum()
    }

    /// Run every wave in order
    ///
    /// # Errors
    /// Returns `RunFailure` when any node fails; no later wave is started and
    /// the failure carries every result collected up to and including the
    /// failed wave
    pub async fn execute_all(&self) -> Result<Vec<ExecutionResult>, RunFailure> {
        let total = self.total_nodes();
        let progress = Arc::new(Mutex::new(Progress::new(total)));
        let mut results = Vec::with_capacity(total);

        info!(
            waves = self.waves.len(),
            nodes = total,
            concurrency = self.concurrency,
            "starting run"
        );

        for (position, wave) in self.waves.iter().enumerate() {
            let mode = if wave.parallel { "parallel" } else { "sequential" };
            info!(
                wave = wave.index,
                nodes = wave.len(),
                mode,
                action = %wave.action,
                "wave {}/{} starting",
                position + 1,
                self.waves.len()
            );

            let wave_results = if wave.parallel {
                self.execute_parallel(wave, &progress).await
            } else {
                self.execute_sequential(wave, &progress).await
            };

            let failure = wave_results.iter().find(|r| !r.success).map(|r| RunError::NodeFailed {
                wave: wave.index,
                node: r.node.clone(),
                cause: r.error.clone().unwrap_or_default(),
            });
            results.extend(wave_results);

            if let Some(err) = failure {
                warn!(wave = wave.index, error = %err, "run stopped");
                return Err(RunFailure::new(err, results));
            }
        }

        info!(nodes = results.len(), "run complete");
        Ok(results)
    }

    /// Run one named node outside full-plan execution
    ///
    /// A failing unit of work is reported as an unsuccessful result.
    ///
    /// # Errors
    /// Returns `RunError::NodeNotFound` if no wave contains the node
    pub async fn execute_single(&self, name: &str) -> Result<ExecutionResult, RunError> {
        let (wave, node) = self
            .waves
            .iter()
            .find_map(|w| w.nodes.iter().find(|n| n.name == name).map(|n| (w, n)))
            .ok_or_else(|| RunError::NodeNotFound(name.to_string()))?;

        info!(node = name, wave = wave.index, action = %wave.action, "running single node");
        let request = WorkRequest::new(node.clone(), wave.index, wave.action);
        let result = invoke(Arc::clone(&self.work), request).await;
        if !result.success {
            warn!(node = name, cause = result.error.as_deref().unwrap_or_default(), "single node failed");
        }
        Ok(result)
    }

    async fn execute_sequential(
        &self,
        wave: &Wave,
        progress: &Arc<Mutex<Progress>>,
    ) -> Vec<ExecutionResult> {
        progress.lock().open_wave(wave.len());
        let mut results = Vec::with_capacity(wave.len());

        for (slot, node) in wave.nodes.iter().enumerate() {
            let request = WorkRequest::new(node.clone(), wave.index, wave.action);
            let result = invoke(Arc::clone(&self.work), request).await;
            let success = result.success;
            progress.lock().record(slot, result.clone());
            results.push(result);
            if !success {
                break;
            }
        }

        results
    }

    async fn execute_parallel(
        &self,
        wave: &Wave,
        progress: &Arc<Mutex<Progress>>,
    ) -> Vec<ExecutionResult> {
        progress.lock().open_wave(wave.len());
        let gate = (self.concurrency > 0).then(|| Arc::new(Semaphore::new(self.concurrency)));
        let mut tasks = JoinSet::new();

        for (slot, node) in wave.nodes.iter().enumerate() {
            let request = WorkRequest::new(node.clone(), wave.index, wave.action);
            let work = Arc::clone(&self.work);
            let gate = gate.clone();
            let progress = Arc::clone(progress);

            tasks.spawn(async move {
                let _permit = match gate {
                    Some(gate) => gate.acquire_owned().await.ok(),
                    None => None,
                };
                let result = invoke(work, request).await;
                progress.lock().record(slot, result);
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                error!(wave = wave.index, error = %err, "node task aborted");
            }
        }

        let slots = std::mem::take(&mut progress.lock().slots);
        slots
            .into_iter()
            .zip(&wave.nodes)
            .map(|(slot, node)| {
                slot.unwrap_or_else(|| {
                    ExecutionResult::failed(
                        &node.name,
                        wave.index,
                        Duration::ZERO,
                        "node task ended without reporting a result",
                    )
                })
            })
            .collect()
    }
}

/// Call the unit of work once, timing it and turning errors and panics into
/// failed results
async fn invoke(work: Arc<dyn UnitOfWork>, request: WorkRequest) -> ExecutionResult {
    let node = request.node.name.clone();
    let wave = request.wave;
    let start = Instant::now();

    let outcome = AssertUnwindSafe(work.perform(request)).catch_unwind().await;
    let duration = start.elapsed();

    match outcome {
        Ok(Ok(output)) => ExecutionResult::succeeded(node, wave, duration, output),
        Ok(Err(err)) => ExecutionResult::failed(node, wave, duration, format!("{err:#}")),
        Err(panic) => ExecutionResult::failed(node, wave, duration, panic_message(panic.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("unit of work panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("unit of work panicked: {msg}")
    } else {
        "unit of work panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait::async_trait]
    impl UnitOfWork for Echo {
        async fn perform(&self, request: WorkRequest) -> anyhow::Result<WorkOutput> {
            match request.node.name.as_str() {
                "bad" => anyhow::bail!("compile error"),
                "boom" => panic!("exploded"),
                name => Ok(WorkOutput::new(format!("{} {name}", request.action))),
            }
        }
    }

    fn wave(index: usize, names: &[&str]) -> Wave {
        Wave::new(
            index,
            names.iter().map(|n| ServiceNode::real(*n, format!("{n}.yaml"))).collect(),
            WorkAction::Implement,
        )
    }

    #[tokio::test]
    async fn results_follow_wave_order() {
        let runner = Runner::new(vec![wave(0, &["a", "b"]), wave(1, &["c"])], Arc::new(Echo));
        let results = runner.execute_all().await.unwrap();

        let names: Vec<_> = results.iter().map(|r| r.node.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(results.iter().all(|r| r.success));
        assert_eq!(results[2].wave, 1);
        assert_eq!(results[0].output.as_ref().unwrap().summary, "implement a");
    }

    #[tokio::test]
    async fn panics_become_failures() {
        let runner = Runner::new(vec![wave(0, &["ok", "boom"])], Arc::new(Echo));
        let failure = runner.execute_all().await.unwrap_err();

        assert_eq!(failure.error.node(), "boom");
        assert_eq!(failure.results.len(), 2);
        assert_eq!(failure.succeeded().count(), 1);
        let cause = failure.failed().next().unwrap().error.clone().unwrap();
        assert!(cause.contains("exploded"));
    }

    #[tokio::test]
    async fn sequential_wave_stops_at_first_failure() {
        let waves = vec![Wave {
            index: 0,
            parallel: false,
            nodes: vec![
                ServiceNode::real("bad", "bad.yaml"),
                ServiceNode::real("after", "after.yaml"),
            ],
            action: WorkAction::Implement,
        }];
        let failure = Runner::new(waves, Arc::new(Echo)).execute_all().await.unwrap_err();

        assert_eq!(failure.results.len(), 1);
        assert!(matches!(
            failure.error,
            RunError::NodeFailed { wave: 0, ref node, ref cause } if node == "bad" && cause == "compile error"
        ));
    }

    #[tokio::test]
    async fn single_node_reports_failure_as_result() {
        let runner = Runner::new(vec![wave(0, &["a", "bad"])], Arc::new(Echo));

        let ok = runner.execute_single("a").await.unwrap();
        assert!(ok.success);

        let bad = runner.execute_single("bad").await.unwrap();
        assert!(!bad.success);
        assert_eq!(bad.error.as_deref(), Some("compile error"));

        assert_eq!(
            runner.execute_single("ghost").await.unwrap_err(),
            RunError::NodeNotFound("ghost".to_string())
        );
    }

    #[tokio::test]
    async fn empty_plan_succeeds() {
        let runner = Runner::new(Vec::new(), Arc::new(Echo)).with_concurrency(2);
        assert!(runner.execute_all().await.unwrap().is_empty());
        assert_eq!(runner.concurrency(), 2);
    }
}
