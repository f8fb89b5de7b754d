//! Executor contract — the per-trigger work body the dispatcher drives.
//!
//! An executor receives a snapshot of its running job and an
//! [`ExecutionContext`]. It may call `report_progress` any number of times with
//! strictly increasing percentages, should check the cancellation token at
//! safe checkpoints, and must finish with a [`JobResult`] or an
//! [`ExecutorError`]. The dispatcher never looks inside.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ExecutorError;
use crate::job::{JobRecord, JobResult};
use crate::trigger::TriggerSymbol;

/// Progress sink: `(percent, phase_label)`.
pub type ProgressFn = Arc<dyn Fn(u8, &str) + Send + Sync>;

/// Per-run handle given to an executor.
#[derive(Clone)]
pub struct ExecutionContext {
    job_id: String,
    cancellation: CancellationToken,
    progress: ProgressFn,
}

impl ExecutionContext {
    pub fn new(job_id: &str, cancellation: CancellationToken, progress: ProgressFn) -> Self {
        Self {
            job_id: job_id.to_string(),
            cancellation,
            progress,
        }
    }

    /// A context not wired to any dispatcher. Progress goes nowhere.
    pub fn detached(job_id: &str) -> Self {
        Self::new(job_id, CancellationToken::new(), Arc::new(|_: u8, _: &str| {}))
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn report_progress(&self, percent: u8, phase: &str) {
        (self.progress)(percent, phase);
    }

    /// True once the job was cancelled. Executors should stop soon after.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves when the job is cancelled.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }
}

/// Work body for one trigger.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        job: &JobRecord,
        ctx: &ExecutionContext,
    ) -> Result<JobResult, ExecutorError>;
}

/// Trigger → executor routing table.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<TriggerSymbol, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the simulated body behind every trigger.
    pub fn simulated(step_delay: Duration) -> Self {
        Self::new().with_all(Arc::new(SimulatedExecutor::new(step_delay)))
    }

    /// Route one trigger to `executor`, replacing any previous one.
    pub fn register(&mut self, trigger: TriggerSymbol, executor: Arc<dyn Executor>) {
        self.executors.insert(trigger, executor);
    }

    /// Route every trigger to `executor`.
    pub fn with_all(mut self, executor: Arc<dyn Executor>) -> Self {
        for trigger in TriggerSymbol::ALL {
            self.executors.insert(trigger, executor.clone());
        }
        self
    }

    pub fn with(mut self, trigger: TriggerSymbol, executor: Arc<dyn Executor>) -> Self {
        self.register(trigger, executor);
        self
    }

    pub fn get(&self, trigger: TriggerSymbol) -> Option<Arc<dyn Executor>> {
        self.executors.get(&trigger).cloned()
    }

    pub fn contains(&self, trigger: TriggerSymbol) -> bool {
        self.executors.contains_key(&trigger)
    }
}

/// Placeholder body: walks the trigger's phases with a fixed delay per phase
/// and returns a canned payload. Replace per trigger with real analysis.
pub struct SimulatedExecutor {
    step_delay: Duration,
}

impl SimulatedExecutor {
    pub fn new(step_delay: Duration) -> Self {
        Self { step_delay }
    }
}

#[async_trait]
impl Executor for SimulatedExecutor {
    async fn execute(
        &self,
        job: &JobRecord,
        ctx: &ExecutionContext,
    ) -> Result<JobResult, ExecutorError> {
        let phases = job.trigger.config().phases;
        let steps = phases.len().max(1);

        for (i, phase) in phases.iter().enumerate() {
            if ctx.is_cancelled() {
                return Err(ExecutorError::Cancelled);
            }
            // 5% .. 95%, strictly increasing
            let percent = 5 + (i * 90 / steps) as u8;
            ctx.report_progress(percent, phase);

            tokio::select! {
                _ = tokio::time::sleep(self.step_delay) => {}
                _ = ctx.cancelled() => return Err(ExecutorError::Cancelled),
            }
        }

        Ok(canned_result(job))
    }
}

fn canned_result(job: &JobRecord) -> JobResult {
    let target = if job.context.is_empty() {
        "workspace"
    } else {
        job.context.as_str()
    };
    match job.trigger {
        TriggerSymbol::Ultralearn => JobResult::success(format!("Learned 12 patterns from {target}"))
            .with_metric("patterns", 12.0),
        TriggerSymbol::Optimize => JobResult::success(format!("Found 3 optimization opportunities in {target}"))
            .with_data(serde_json::json!({ "hotspots": ["allocation", "lock contention", "n+1 query"] }))
            .with_metric("opportunities", 3.0),
        TriggerSymbol::Consolidate => JobResult::success("Consolidated 8 memory entries into 3")
            .with_metric("before", 8.0)
            .with_metric("after", 3.0),
        TriggerSymbol::Predict => JobResult::success(format!("Predicted next files to touch in {target}"))
            .with_metric("confidence", 0.72),
        TriggerSymbol::Audit => JobResult::success(format!("Security audit of {target}: 0 critical, 1 medium"))
            .with_data(serde_json::json!({ "critical": 0, "medium": 1, "low": 0 }))
            .with_artifact("audit-report.md"),
        TriggerSymbol::Map => JobResult::success(format!("Mapped 24 modules and 41 edges in {target}"))
            .with_metric("modules", 24.0)
            .with_metric("edges", 41.0)
            .with_artifact("dependency-graph.dot"),
        TriggerSymbol::Preload => JobResult::success("Warmed 5 cache entries").with_metric("entries", 5.0),
        TriggerSymbol::Deepdive => JobResult::success(format!("Traced control flow through {target}"))
            .with_artifact("deepdive.md"),
        TriggerSymbol::Document => JobResult::success(format!("Drafted documentation for {target}"))
            .with_artifact("DOCS.md"),
        TriggerSymbol::Refactor => JobResult::success(format!("Proposed 4 refactorings for {target}"))
            .with_metric("proposals", 4.0),
        TriggerSymbol::Benchmark => JobResult::success(format!("Benchmarked {target}: p50 12ms, p99 48ms"))
            .with_metric("p50_ms", 12.0)
            .with_metric("p99_ms", 48.0),
        TriggerSymbol::Testgaps => JobResult::success(format!("Found 6 untested functions in {target}"))
            .with_metric("untested", 6.0)
            .with_artifact("testgaps.json"),
    }
}
