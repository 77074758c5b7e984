//! Run summaries

use super::ExecutionResult;
use std::fmt;
use std::time::Duration;

/// Aggregate view over a run's results
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Number of results
    pub total: usize,
    /// Successful results
    pub succeeded: usize,
    /// Failed results
    pub failed: usize,
    /// Sum of per-node durations
    pub total_duration: Duration,
    /// Per-node lines: name, wave, success, duration, error
    pub entries: Vec<ExecutionResult>,
}

impl RunSummary {
    /// Aggregate a result list
    #[must_use]
    pub fn from_results(results: &[ExecutionResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            total_duration: results.iter().map(|r| r.duration).sum(),
            entries: results.to_vec(),
        }
    }

    /// Whether every node succeeded
    #[inline]
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Render the textual summary
    #[must_use]
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Execution summary")?;
        writeln!(
            f,
            "  total: {}  succeeded: {}  failed: {}  time: {:.2?}",
            self.total, self.succeeded, self.failed, self.total_duration
        )?;
        for entry in &self.entries {
            let mark = if entry.success { "✓" } else { "✗" };
            write!(
                f,
                "  {mark} [wave {}] {} ({:.2?})",
                entry.wave, entry.node, entry.duration
            )?;
            if let Some(err) = &entry.error {
                write!(f, ": {err}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::WorkOutput;

    #[test]
    fn counts_and_renders() {
        let results = vec![
            ExecutionResult::succeeded("user", 0, Duration::from_millis(20), WorkOutput::new("ok")),
            ExecutionResult::failed("todo", 1, Duration::from_millis(5), "tests failed"),
        ];
        let summary = RunSummary::from_results(&results);

        assert_eq!(summary.total, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total_duration, Duration::from_millis(25));
        assert!(!summary.all_succeeded());

        let text = summary.render();
        assert!(text.contains("succeeded: 1"));
        assert!(text.contains("✓ [wave 0] user"));
        assert!(text.contains("✗ [wave 1] todo"));
        assert!(text.contains("tests failed"));
    }

    #[test]
    fn empty_run_is_successful() {
        let summary = RunSummary::from_results(&[]);
        assert!(summary.all_succeeded());
        assert_eq!(summary.total, 0);
    }
}
