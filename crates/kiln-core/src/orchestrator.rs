//! Kiln Orchestrator
//!
//! The facade tying the pipeline together:
//! - reads contracts through a [`ContractSource`]
//! - builds the service graph and its wave schedule
//! - runs builds, saved schedules and single-service re-runs through a [`Runner`]
//! - initializes state on first use and plans migrations against it
//! - applies migrations behind the breaking-change confirmation gate
//! - records refactors and exposes migration history

use crate::config::KilnConfig;
use crate::error::OrchestratorError;
use crate::source::ContractSource;
use chrono::Utc;
use kiln_contract::AppManifest;
use kiln_kernel::{
    schedule, CycleWarning, ExecutionResult, GraphBuilder, RunError, RunFailure, Runner, Schedule,
    ServiceGraph, UnitOfWork, Wave, WorkAction,
};
use kiln_migrate::{
    detect_changes, plan_migration, CurrentService, MigrationPlan, MigrationRecord, PersistedState,
    StateStore,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Graph and wave schedule of a full build
#[derive(Debug, Clone)]
pub struct BuildPlan {
    /// Service graph, gateway included when enabled
    pub graph: ServiceGraph,
    /// Waves and cycle warnings
    pub schedule: Schedule,
}

impl BuildPlan {
    /// Waves in execution order
    #[inline]
    #[must_use]
    pub fn waves(&self) -> &[Wave] {
        &self.schedule.waves
    }

    /// Warnings raised by degraded cycles
    #[inline]
    #[must_use]
    pub fn warnings(&self) -> &[CycleWarning] {
        &self.schedule.warnings
    }
}

/// A migration plan plus how the state behind it was obtained
#[derive(Debug, Clone)]
pub struct MigrationPreview {
    /// Planned steps
    pub plan: MigrationPlan,
    /// True when state did not exist and was initialized by this call
    pub initialized: bool,
}

/// Whether the operator accepted breaking changes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Confirmation {
    /// Breaking steps may run
    Confirmed,
    /// Breaking plans are refused
    #[default]
    Unconfirmed,
}

/// Result of an applied migration
#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    /// The plan that ran
    pub plan: MigrationPlan,
    /// Per-step results
    pub results: Vec<ExecutionResult>,
    /// History entry written; `None` when there was nothing to apply
    pub record: Option<MigrationRecord>,
}

/// The orchestrator
pub struct Orchestrator {
    config: KilnConfig,
    contracts: Arc<dyn ContractSource>,
    work: Arc<dyn UnitOfWork>,
    store: Arc<dyn StateStore>,
}

impl Orchestrator {
    /// Create an orchestrator
    pub fn new(
        config: KilnConfig,
        contracts: Arc<dyn ContractSource>,
        work: Arc<dyn UnitOfWork>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            config,
            contracts,
            work,
            store,
        }
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &KilnConfig {
        &self.config
    }

    /// Read every declared contract
    ///
    /// # Errors
    /// - `OrchestratorError::Contract` if the manifest is invalid
    /// - `OrchestratorError::ContractUnavailable` if a contract cannot be read
    pub fn load_services(&self, manifest: &AppManifest) -> Result<Vec<CurrentService>, OrchestratorError> {
        manifest.validate()?;
        manifest
            .services
            .iter()
            .map(|decl| {
                let contract = self.contracts.read(&decl.contract).map_err(|source| {
                    OrchestratorError::ContractUnavailable {
                        service: decl.name.clone(),
                        contract_ref: decl.contract.clone(),
                        source,
                    }
                })?;
                Ok(CurrentService {
                    name: decl.name.clone(),
                    contract_ref: decl.contract.clone(),
                    contract,
                    dependencies: decl.dependencies.clone(),
                })
            })
            .collect()
    }

    /// Build the graph and schedule it
    ///
    /// # Errors
    /// - `OrchestratorError::Graph` on invalid service names
    /// - `OrchestratorError::Schedule` on a cycle under the `fail` policy
    pub fn plan_build(&self, manifest: &AppManifest) -> Result<BuildPlan, OrchestratorError> {
        let graph = self.graph(manifest)?;
        let schedule = schedule(&graph, self.config.cycle_policy)?;
        info!(
            app = %manifest.app.name,
            services = graph.len(),
            waves = schedule.waves.len(),
            degraded = schedule.warnings.len(),
            "build planned"
        );
        Ok(BuildPlan { graph, schedule })
    }

    /// Run every wave of the build
    ///
    /// # Errors
    /// Returns `OrchestratorError::RunFailed` with partial results when a
    /// node fails, or any planning error
    pub async fn build(&self, manifest: &AppManifest) -> Result<Vec<ExecutionResult>, OrchestratorError> {
        let plan = self.plan_build(manifest)?;
        let results = self.runner(plan.schedule.waves).execute_all().await?;
        info!(app = %manifest.app.name, nodes = results.len(), "build complete");
        Ok(results)
    }

    /// Run a previously saved schedule as-is
    ///
    /// Contracts are not re-read and the graph is not rebuilt.
    ///
    /// # Errors
    /// Returns `OrchestratorError::RunFailed` with partial results when a
    /// node fails
    pub async fn run_schedule(&self, schedule: &Schedule) -> Result<Vec<ExecutionResult>, OrchestratorError> {
        let results = self.runner(schedule.waves.clone()).execute_all().await?;
        info!(waves = schedule.waves.len(), nodes = results.len(), "saved plan complete");
        Ok(results)
    }

    /// Run one service of the build on its own
    ///
    /// # Errors
    /// Returns `OrchestratorError::Run` if the service is not in the build
    pub async fn rerun(&self, manifest: &AppManifest, service: &str) -> Result<ExecutionResult, OrchestratorError> {
        let plan = self.plan_build(manifest)?;
        Ok(self.runner(plan.schedule.waves).execute_single(service).await?)
    }

    /// Plan a migration against recorded state
    ///
    /// When no state exists it is initialized from the current contracts and
    /// saved, and the resulting plan is empty.
    ///
    /// # Errors
    /// Propagates contract, graph, diff and state errors
    pub fn plan_migration(&self, manifest: &AppManifest) -> Result<MigrationPreview, OrchestratorError> {
        let current = self.load_services(manifest)?;
        let (state, initialized) = match self.store.load()? {
            Some(state) => (state, false),
            None => {
                let state = PersistedState::initialize(&manifest.app.name, &current, Utc::now());
                self.store.save(&state)?;
                info!(app = %manifest.app.name, services = current.len(), "state initialized");
                (state, true)
            }
        };

        let changes = detect_changes(&state, &current)?;
        let plan = plan_migration(&changes, &self.graph(manifest)?);
        info!(
            changes = plan.changes.len(),
            steps = plan.steps.len(),
            breaking = plan.has_breaking(),
            "migration planned"
        );
        Ok(MigrationPreview { plan, initialized })
    }

    /// Apply pending contract changes
    ///
    /// State is folded and saved only after every step succeeded.
    ///
    /// # Errors
    /// - `OrchestratorError::StateNotInitialized` if no state was recorded
    /// - `OrchestratorError::BreakingChangeNotConfirmed` for an unconfirmed
    ///   breaking plan
    /// - `OrchestratorError::RunFailed` if a step fails; state is untouched
    pub async fn apply_migration(
        &self,
        manifest: &AppManifest,
        confirmation: Confirmation,
    ) -> Result<MigrationOutcome, OrchestratorError> {
        let current = self.load_services(manifest)?;
        let mut state = self.store.load()?.ok_or(OrchestratorError::StateNotInitialized)?;
        let changes = detect_changes(&state, &current)?;
        let plan = plan_migration(&changes, &self.graph(manifest)?);

        if plan.is_empty() {
            info!(app = %manifest.app.name, "nothing to migrate");
            return Ok(MigrationOutcome {
                plan,
                results: Vec::new(),
                record: None,
            });
        }

        if plan.has_breaking() && confirmation != Confirmation::Confirmed {
            let services = plan
                .breaking_steps()
                .filter_map(|s| s.service.clone())
                .collect();
            return Err(OrchestratorError::BreakingChangeNotConfirmed { services });
        }

        let results = match self.runner(plan.waves()).execute_all().await {
            Ok(results) => results,
            Err(failure) => {
                warn!(error = %failure, "migration failed; state left unchanged");
                return Err(failure.into());
            }
        };

        let description = format!("Applied {} contract change(s)", changes.len());
        let record = state
            .record_migration(&changes, &current, description, Utc::now())
            .clone();
        self.store.save(&state)?;
        info!(id = %record.id, changes = record.changes.len(), "migration recorded");

        Ok(MigrationOutcome {
            plan,
            results,
            record: Some(record),
        })
    }

    /// Regenerate services from their unchanged contracts
    ///
    /// An empty `services` list means every declared service. Each service
    /// runs on its own; the first failure stops the refactor and leaves
    /// state untouched.
    ///
    /// # Errors
    /// - `OrchestratorError::UnknownService` for a name not in the manifest
    /// - `OrchestratorError::StateNotInitialized` if no state was recorded
    /// - `OrchestratorError::RunFailed` when a service fails, carrying the
    ///   results of every target that ran
    pub async fn refactor(
        &self,
        manifest: &AppManifest,
        services: &[String],
    ) -> Result<MigrationRecord, OrchestratorError> {
        let targets: Vec<String> = if services.is_empty() {
            manifest.services.iter().map(|s| s.name.clone()).collect()
        } else {
            if let Some(unknown) = services.iter().find(|s| manifest.service(s).is_none()) {
                return Err(OrchestratorError::UnknownService(unknown.clone()));
            }
            services.to_vec()
        };

        let mut state = self.store.load()?.ok_or(OrchestratorError::StateNotInitialized)?;
        let mut waves = self.plan_build(manifest)?.schedule.waves;
        for wave in &mut waves {
            wave.action = WorkAction::Reimplement { breaking: false };
        }
        let runner = self.runner(waves);

        let mut results = Vec::with_capacity(targets.len());
        for target in &targets {
            let result = runner.execute_single(target).await?;
            if !result.success {
                let error = RunError::NodeFailed {
                    wave: result.wave,
                    node: result.node.clone(),
                    cause: result.error.clone().unwrap_or_default(),
                };
                results.push(result);
                warn!(error = %error, "refactor failed; state left unchanged");
                return Err(RunFailure::new(error, results).into());
            }
            results.push(result);
        }

        let record = state.record_refactor(&targets, Utc::now()).clone();
        self.store.save(&state)?;
        info!(id = %record.id, services = record.changes.len(), "refactor recorded");
        Ok(record)
    }

    /// Migration history, newest first; empty when no state exists
    ///
    /// # Errors
    /// Returns `OrchestratorError::State` if stored state cannot be read
    pub fn history(&self) -> Result<Vec<MigrationRecord>, OrchestratorError> {
        Ok(self
            .store
            .load()?
            .map(|state| state.migrations)
            .unwrap_or_default())
    }

    fn graph(&self, manifest: &AppManifest) -> Result<ServiceGraph, OrchestratorError> {
        Ok(GraphBuilder::from_manifest(manifest)?
            .with_aggregator(self.config.aggregator)
            .build()?)
    }

    fn runner(&self, waves: Vec<Wave>) -> Runner {
        Runner::new(waves, Arc::clone(&self.work)).with_concurrency(self.config.concurrency)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
