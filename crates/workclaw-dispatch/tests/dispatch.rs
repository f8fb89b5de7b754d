//! End-to-end dispatcher behaviour with controllable executors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use workclaw_core::DispatchConfig;
use workclaw_dispatch::{
    DispatchOptions, Dispatcher, ExecutionContext, Executor, ExecutorError, ExecutorRegistry,
    JobEventKind, JobPriority, JobRecord, JobResult, JobStatus, TriggerSymbol,
};

const WAIT: Duration = Duration::from_secs(5);

/// Holds every job until the test releases a permit.
struct GatedExecutor {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl Executor for GatedExecutor {
    async fn execute(
        &self,
        job: &JobRecord,
        ctx: &ExecutionContext,
    ) -> Result<JobResult, ExecutorError> {
        ctx.report_progress(10, "waiting");
        tokio::select! {
            permit = self.gate.acquire() => {
                permit
                    .map_err(|e| ExecutorError::Failed(e.to_string()))?
                    .forget();
                Ok(JobResult::success(format!("done with {}", job.context)))
            }
            _ = ctx.cancelled() => Err(ExecutorError::Cancelled),
        }
    }
}

/// Ignores cancellation and succeeds after a delay.
struct StubbornExecutor {
    delay: Duration,
}

#[async_trait]
impl Executor for StubbornExecutor {
    async fn execute(
        &self,
        _job: &JobRecord,
        ctx: &ExecutionContext,
    ) -> Result<JobResult, ExecutorError> {
        ctx.report_progress(20, "working");
        tokio::time::sleep(self.delay).await;
        ctx.report_progress(90, "late");
        Ok(JobResult::success("finished anyway"))
    }
}

struct FailingExecutor;

#[async_trait]
impl Executor for FailingExecutor {
    async fn execute(
        &self,
        _job: &JobRecord,
        _ctx: &ExecutionContext,
    ) -> Result<JobResult, ExecutorError> {
        Err(ExecutorError::Failed("benchmark harness crashed".into()))
    }
}

struct PanickingExecutor;

#[async_trait]
impl Executor for PanickingExecutor {
    async fn execute(
        &self,
        _job: &JobRecord,
        _ctx: &ExecutionContext,
    ) -> Result<JobResult, ExecutorError> {
        panic!("executor bug");
    }
}

fn config(max_concurrent: usize) -> DispatchConfig {
    DispatchConfig {
        max_concurrent,
        simulated_step_ms: 1,
        ..DispatchConfig::default()
    }
}

fn gated(max_concurrent: usize) -> (Dispatcher, Arc<Semaphore>) {
    gated_with(config(max_concurrent))
}

fn gated_with(config: DispatchConfig) -> (Dispatcher, Arc<Semaphore>) {
    let gate = Arc::new(Semaphore::new(0));
    let registry = ExecutorRegistry::new().with_all(Arc::new(GatedExecutor { gate: gate.clone() }));
    (Dispatcher::new(config, registry).unwrap(), gate)
}

async fn dispatch(d: &Dispatcher, trigger: TriggerSymbol, session: &str) -> String {
    d.dispatch(trigger, "src/", session, DispatchOptions::default())
        .await
        .unwrap()
}

fn status(d: &Dispatcher, id: &str) -> JobStatus {
    d.get_job(id).unwrap().status()
}

async fn wait_for_status(d: &Dispatcher, id: &str, wanted: JobStatus) {
    tokio::time::timeout(WAIT, async {
        while status(d, id) != wanted {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{id} never reached {wanted}"));
}

async fn wait_terminal(d: &Dispatcher, id: &str) -> JobRecord {
    tokio::time::timeout(WAIT, d.wait_for_terminal(id))
        .await
        .expect("job did not finish in time")
        .expect("unknown job")
}

fn started_order(d: &Dispatcher) -> Vec<String> {
    d.recent_events()
        .into_iter()
        .filter(|e| e.kind == JobEventKind::Started)
        .map(|e| e.job_id)
        .collect()
}

#[tokio::test]
async fn test_single_slot_admits_next_job_after_terminal() {
    let (d, gate) = gated(1);
    let audit = dispatch(&d, TriggerSymbol::Audit, "s1").await;
    let optimize = dispatch(&d, TriggerSymbol::Optimize, "s1").await;

    assert_eq!(status(&d, &audit), JobStatus::Running);
    assert_eq!(status(&d, &optimize), JobStatus::Pending);

    gate.add_permits(1);
    let done = wait_terminal(&d, &audit).await;
    assert_eq!(done.status(), JobStatus::Completed);
    wait_for_status(&d, &optimize, JobStatus::Running).await;

    gate.add_permits(1);
    assert_eq!(wait_terminal(&d, &optimize).await.status(), JobStatus::Completed);
}

#[tokio::test]
async fn test_detect_optimize_and_audit() {
    let d = Dispatcher::simulated(config(1)).unwrap();
    let detection = d.detect_triggers("please optimize this and run a security audit");
    assert!(detection.detected);
    assert!(detection.triggers.contains(&TriggerSymbol::Optimize));
    assert!(detection.triggers.contains(&TriggerSymbol::Audit));
    assert!((0.0..=1.0).contains(&detection.confidence));
}

#[tokio::test]
async fn test_context_injection_after_map() {
    let d = Dispatcher::simulated(config(2)).unwrap();
    let id = dispatch(&d, TriggerSymbol::Map, "s2").await;
    let job = wait_terminal(&d, &id).await;
    assert_eq!(job.status(), JobStatus::Completed);

    let ctx = d.context_for_injection("s2");
    assert!(!ctx.is_empty());
    assert!(ctx.contains("[map]"));
    assert_eq!(d.context_for_injection("s1"), "");
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let (d, _gate) = gated(1);
    let _blocker = dispatch(&d, TriggerSymbol::Map, "s1").await;
    let queued = dispatch(&d, TriggerSymbol::Predict, "s1").await;

    assert!(d.cancel(&queued).await);
    assert_eq!(status(&d, &queued), JobStatus::Cancelled);
    let first = d.cancel(&queued).await;
    let second = d.cancel(&queued).await;
    assert_eq!(first, second);
    assert!(!first);
}

#[tokio::test]
async fn test_fifteen_jobs_never_exceed_cap() {
    let (d, gate) = gated(10);
    let mut ids = Vec::new();
    for _ in 0..15 {
        ids.push(dispatch(&d, TriggerSymbol::Refactor, "s5").await);
    }

    let stats = d.stats();
    assert_eq!(stats.running, 10);
    assert_eq!(stats.pending, 5);
    assert_eq!(stats.queued, 5);
    assert_eq!(stats.in_flight, 10);

    for released in 1..=15 {
        gate.add_permits(1);
        tokio::time::timeout(WAIT, async {
            while d.stats().completed < released {
                let s = d.stats();
                assert!(s.running <= 10);
                assert_eq!(s.pending, s.queued);
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();
        let s = d.stats();
        assert!(s.running <= 10);
        assert_eq!(s.pending, s.queued);
    }

    let finished = futures::future::join_all(ids.iter().map(|id| wait_terminal(&d, id))).await;
    assert!(finished.iter().all(|j| j.status() == JobStatus::Completed));
    assert_eq!(d.stats().completed, 15);
    assert_eq!(d.stats().running, 0);
}

#[tokio::test]
async fn test_higher_priority_admitted_first() {
    let (d, gate) = gated(1);
    let blocker = dispatch(&d, TriggerSymbol::Map, "s1").await;
    let low = dispatch(&d, TriggerSymbol::Preload, "s1").await;
    let normal_a = dispatch(&d, TriggerSymbol::Document, "s1").await;
    let critical = dispatch(&d, TriggerSymbol::Audit, "s1").await;
    let normal_b = dispatch(&d, TriggerSymbol::Deepdive, "s1").await;

    assert_eq!(
        d.queued_jobs(),
        vec![critical.clone(), normal_a.clone(), normal_b.clone(), low.clone()]
    );

    gate.add_permits(5);
    wait_terminal(&d, &low).await;
    assert_eq!(started_order(&d), vec![blocker, critical, normal_a, normal_b, low]);
}

#[tokio::test]
async fn test_fifo_when_priority_queue_disabled() {
    let (d, _gate) = gated_with(DispatchConfig {
        priority_queue: false,
        ..config(1)
    });
    let _blocker = dispatch(&d, TriggerSymbol::Map, "s1").await;
    let low = dispatch(&d, TriggerSymbol::Preload, "s1").await;
    let critical = dispatch(&d, TriggerSymbol::Audit, "s1").await;
    assert_eq!(d.queued_jobs(), vec![low, critical]);
}

#[tokio::test]
async fn test_explicit_priority_overrides_catalog() {
    let (d, _gate) = gated(1);
    let _blocker = dispatch(&d, TriggerSymbol::Map, "s1").await;
    let audit = dispatch(&d, TriggerSymbol::Audit, "s1").await;
    let urgent_preload = d
        .dispatch(
            TriggerSymbol::Preload,
            "",
            "s1",
            DispatchOptions::default().with_priority(JobPriority::Critical),
        )
        .await
        .unwrap();
    // Equal priority keeps dispatch order.
    assert_eq!(d.queued_jobs(), vec![audit, urgent_preload]);
}

#[tokio::test]
async fn test_cancelled_pending_job_is_never_admitted() {
    let (d, gate) = gated(1);
    let blocker = dispatch(&d, TriggerSymbol::Map, "s1").await;
    let doomed = dispatch(&d, TriggerSymbol::Audit, "s1").await;
    let after = dispatch(&d, TriggerSymbol::Optimize, "s1").await;

    assert!(d.cancel(&doomed).await);
    assert_eq!(d.queued_jobs(), vec![after.clone()]);

    gate.add_permits(2);
    wait_terminal(&d, &blocker).await;
    wait_terminal(&d, &after).await;

    assert_eq!(status(&d, &doomed), JobStatus::Cancelled);
    assert!(!started_order(&d).contains(&doomed));
    assert!(d.get_job(&doomed).unwrap().started_at.is_none());
}

#[tokio::test]
async fn test_cancel_running_frees_slot_and_signals_executor() {
    let (d, _gate) = gated(1);
    let running = dispatch(&d, TriggerSymbol::Map, "s1").await;
    let waiting = dispatch(&d, TriggerSymbol::Audit, "s1").await;

    assert!(d.cancel(&running).await);
    assert_eq!(status(&d, &running), JobStatus::Cancelled);
    // The freed slot is backfilled right away.
    assert_eq!(status(&d, &waiting), JobStatus::Running);

    // Executor saw the token and returned; the record does not move.
    let frozen = d.get_job(&running).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(d.get_job(&running).unwrap(), frozen);
    assert!(!d.cancel(&running).await);
}

#[tokio::test]
async fn test_late_result_after_cancel_is_ignored() {
    let registry = ExecutorRegistry::new().with_all(Arc::new(StubbornExecutor {
        delay: Duration::from_millis(40),
    }));
    let d = Dispatcher::new(config(1), registry).unwrap();
    let id = dispatch(&d, TriggerSymbol::Deepdive, "s1").await;
    wait_for_status(&d, &id, JobStatus::Running).await;

    assert!(d.cancel(&id).await);
    let frozen = d.get_job(&id).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let after = d.get_job(&id).unwrap();
    assert_eq!(after, frozen);
    assert_eq!(after.status(), JobStatus::Cancelled);
    assert!(after.result().is_none());
    assert_eq!(d.stats().in_flight, 0);
}

#[tokio::test]
async fn test_failure_is_isolated() {
    let registry = ExecutorRegistry::simulated(Duration::from_millis(1))
        .with(TriggerSymbol::Benchmark, Arc::new(FailingExecutor));
    let d = Dispatcher::new(config(1), registry).unwrap();
    let bench = dispatch(&d, TriggerSymbol::Benchmark, "s1").await;
    let map = dispatch(&d, TriggerSymbol::Map, "s1").await;

    let failed = wait_terminal(&d, &bench).await;
    assert_eq!(failed.status(), JobStatus::Failed);
    assert_eq!(failed.error(), Some("benchmark harness crashed"));
    assert!(failed.result().is_none());
    assert_eq!(failed.phase(), "failed");

    let ok = wait_terminal(&d, &map).await;
    assert_eq!(ok.status(), JobStatus::Completed);

    let ctx = d.context_for_injection("s1");
    assert!(ctx.contains("[map]"));
    assert!(!ctx.contains("[benchmark]"));
}

#[tokio::test]
async fn test_panicking_executor_fails_only_its_job() {
    let registry = ExecutorRegistry::simulated(Duration::from_millis(1))
        .with(TriggerSymbol::Predict, Arc::new(PanickingExecutor));
    let d = Dispatcher::new(config(1), registry).unwrap();
    let bad = dispatch(&d, TriggerSymbol::Predict, "s1").await;
    let good = dispatch(&d, TriggerSymbol::Preload, "s1").await;

    let failed = wait_terminal(&d, &bad).await;
    assert_eq!(failed.status(), JobStatus::Failed);
    assert!(failed.error().unwrap().contains("panicked"));
    assert_eq!(wait_terminal(&d, &good).await.status(), JobStatus::Completed);
}

#[tokio::test]
async fn test_timeout_fails_job() {
    let registry = ExecutorRegistry::new().with_all(Arc::new(StubbornExecutor {
        delay: Duration::from_secs(30),
    }));
    let d = Dispatcher::new(config(1), registry).unwrap();
    let id = d
        .dispatch(
            TriggerSymbol::Benchmark,
            "",
            "s1",
            DispatchOptions::default().with_timeout(Duration::from_millis(30)),
        )
        .await
        .unwrap();

    let job = wait_terminal(&d, &id).await;
    assert_eq!(job.status(), JobStatus::Failed);
    assert!(job.error().unwrap().contains("timed out"));
    assert_eq!(d.stats().in_flight, 0);
}

#[tokio::test]
async fn test_progress_events_increase() {
    let d = Dispatcher::simulated(config(1)).unwrap();
    let mut rx = d.subscribe();
    let id = dispatch(&d, TriggerSymbol::Ultralearn, "s1").await;
    wait_terminal(&d, &id).await;

    let mut progress = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let JobEventKind::Progress { progress: p, .. } = event.kind {
            progress.push(p);
        }
    }
    assert_eq!(progress.len(), TriggerSymbol::Ultralearn.config().phases.len());
    assert!(progress.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_ids_unique_and_sessions_grouped() {
    let d = Dispatcher::simulated(config(4)).unwrap();
    let mut ids = std::collections::HashSet::new();
    for i in 0..40 {
        let session = if i % 2 == 0 { "even" } else { "odd" };
        assert!(ids.insert(dispatch(&d, TriggerSymbol::ALL[i % 12], session).await));
    }

    let even = d.session_jobs("even");
    assert_eq!(even.len(), 20);
    assert!(even.iter().all(|j| j.session_id == "even"));
    assert!(d.session_jobs("nobody").is_empty());
    assert_eq!(d.stats().total, 40);
}
