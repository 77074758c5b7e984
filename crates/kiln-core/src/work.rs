//! Built-in units of work

use kiln_kernel::{UnitOfWork, WorkOutput, WorkRequest};

/// Unit of work that performs nothing and reports what it would have done
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunWork;

#[async_trait::async_trait]
impl UnitOfWork for DryRunWork {
    async fn perform(&self, request: WorkRequest) -> anyhow::Result<WorkOutput> {
        tracing::info!(
            node = %request.node.name,
            wave = request.wave,
            action = %request.action,
            "dry run"
        );
        Ok(WorkOutput::new(format!(
            "would {} {}",
            request.action, request.node.name
        )))
    }
}
