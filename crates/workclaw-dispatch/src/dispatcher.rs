//! Dispatcher — admits jobs from the backlog under a fixed concurrency cap
//! and drives their executors.
//!
//! ## Flow
//! ```text
//! dispatch(trigger, context, session)
//!   → JobRecordStore: new Pending record
//!   → AdmissionQueue: insert by priority
//!   → admission pass: while in_flight < max_concurrent → Running, spawn executor
//! executor resolves
//!   → terminal state written (Completed / Failed / Cancelled)
//!   → admission pass again, backfilling the freed slot
//! ```
//!
//! Store, backlog, in-flight set and cancellation tokens share one mutex, so
//! an admission pass can never exceed the cap or admit a job twice.
//! Executor futures never run under that lock.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use workclaw_core::DispatchConfig;

use crate::classifier::{self, Detection};
use crate::error::{DispatchError, ExecutorError, Result};
use crate::events::{EventBus, JobEvent, JobEventKind};
use crate::executor::{ExecutionContext, ExecutorRegistry, ProgressFn};
use crate::job::{JobRecord, JobResult, JobStatus};
use crate::queue::AdmissionQueue;
use crate::stats::{self, JobStats};
use crate::store::JobRecordStore;
use crate::trigger::{self, JobPriority, TriggerConfig, TriggerSymbol};

/// Per-dispatch options.
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    /// Overrides the trigger's catalog priority.
    pub priority: Option<JobPriority>,
    /// Overrides `default_timeout_secs` for this job.
    pub timeout: Option<Duration>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl DispatchOptions {
    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Mutable dispatcher state, always touched under one lock.
struct DispatchState {
    store: JobRecordStore,
    queue: AdmissionQueue,
    in_flight: HashSet<String>,
    tokens: HashMap<String, CancellationToken>,
    /// Per-job timeout overrides, held until admission.
    timeouts: HashMap<String, Duration>,
}

impl DispatchState {
    fn new(priority_queue: bool) -> Self {
        Self {
            store: JobRecordStore::new(),
            queue: AdmissionQueue::new(priority_queue),
            in_flight: HashSet::new(),
            tokens: HashMap::new(),
            timeouts: HashMap::new(),
        }
    }
}

struct Inner {
    config: DispatchConfig,
    executors: ExecutorRegistry,
    state: Mutex<DispatchState>,
    events: EventBus,
}

/// A job handed from the admission pass to its executor task.
struct Launch {
    job: JobRecord,
    token: CancellationToken,
    timeout: Duration,
}

/// Background job dispatcher. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Create a dispatcher with the given executors.
    pub fn new(config: DispatchConfig, executors: ExecutorRegistry) -> Result<Self> {
        config.validate()?;
        let state = DispatchState::new(config.priority_queue);
        tracing::info!(
            "🧵 Dispatcher ready (max_concurrent={}, timeout={}s, priority_queue={})",
            config.max_concurrent,
            config.default_timeout_secs,
            config.priority_queue
        );
        Ok(Self {
            inner: Arc::new(Inner {
                events: EventBus::new(config.event_history),
                config,
                executors,
                state: Mutex::new(state),
            }),
        })
    }

    /// Create a dispatcher backed by the simulated executors.
    pub fn simulated(config: DispatchConfig) -> Result<Self> {
        let executors = ExecutorRegistry::simulated(Duration::from_millis(config.simulated_step_ms));
        Self::new(config, executors)
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    /// Queue a job and run one admission pass. Returns the job ID.
    ///
    /// Must be awaited inside a tokio runtime; admitted executors are spawned
    /// onto it.
    pub async fn dispatch(
        &self,
        trigger: TriggerSymbol,
        context: &str,
        session_id: &str,
        options: DispatchOptions,
    ) -> Result<String> {
        if options.timeout.is_some_and(|t| t.is_zero()) {
            return Err(DispatchError::InvalidOptions(
                "timeout must be greater than zero".into(),
            ));
        }
        if !self.inner.executors.contains(trigger) {
            return Err(DispatchError::NoExecutor(trigger));
        }

        let priority = options.priority.unwrap_or(trigger.config().priority);
        let record = JobRecord::new(trigger, context, session_id, priority, options.metadata);

        let id = {
            let mut guard = self.inner.lock();
            let state = &mut *guard;
            let id = state.store.insert(record);
            state.queue.push(&id, priority);
            if let Some(timeout) = options.timeout {
                state.timeouts.insert(id.clone(), timeout);
            }
            if let Some(record) = state.store.get(&id) {
                self.inner.publish(record, JobEventKind::Queued { priority });
            }
            tracing::info!(
                "📥 Job queued: {} ({}, priority {}, backlog {})",
                id,
                trigger,
                priority,
                state.queue.len()
            );
            id
        };

        Inner::admit(&self.inner);
        Ok(id)
    }

    /// Classify text and dispatch one job per detected trigger.
    /// Does nothing when `auto_dispatch` is off.
    pub async fn auto_dispatch(&self, text: &str, session_id: &str) -> Result<Vec<String>> {
        if !self.inner.config.auto_dispatch {
            tracing::debug!("Auto-dispatch disabled, ignoring input");
            return Ok(Vec::new());
        }
        let detection = self.detect_triggers(text);
        let mut ids = Vec::with_capacity(detection.triggers.len());
        for trigger in detection.triggers {
            ids.push(
                self.dispatch(trigger, text, session_id, DispatchOptions::default())
                    .await?,
            );
        }
        Ok(ids)
    }

    /// Classify free text into triggers.
    pub fn detect_triggers(&self, text: &str) -> Detection {
        classifier::detect(text)
    }

    /// Cancel a job.
    ///
    /// A queued job leaves the backlog and is never admitted. A running job
    /// is marked cancelled, gives up its slot, and its cancellation token is
    /// signalled; the executor is expected to stop at its next checkpoint.
    /// Returns false for unknown and already-terminal jobs.
    pub async fn cancel(&self, job_id: &str) -> bool {
        let freed_slot = {
            let mut guard = self.inner.lock();
            let state = &mut *guard;
            let Some(record) = state.store.get_mut(job_id) else {
                return false;
            };
            let was_running = record.status() == JobStatus::Running;
            if let Err(e) = record.cancel() {
                tracing::debug!("🚫 Cancel ignored for {}: {}", job_id, e);
                return false;
            }
            self.inner
                .publish(record, JobEventKind::Cancelled { was_running });

            if was_running {
                state.in_flight.remove(job_id);
                if let Some(token) = state.tokens.remove(job_id) {
                    token.cancel();
                }
            } else {
                state.queue.remove(job_id);
                state.timeouts.remove(job_id);
            }
            tracing::info!(
                "🚫 Job cancelled: {} ({})",
                job_id,
                if was_running { "was running" } else { "was queued" }
            );
            was_running
        };

        if freed_slot {
            Inner::admit(&self.inner);
        }
        true
    }

    pub fn get_job(&self, job_id: &str) -> Option<JobRecord> {
        self.inner.lock().store.get(job_id).cloned()
    }

    /// All jobs of a session, in dispatch order.
    pub fn session_jobs(&self, session_id: &str) -> Vec<JobRecord> {
        self.inner
            .lock()
            .store
            .by_session(session_id)
            .cloned()
            .collect()
    }

    /// Backlog job IDs, next to be admitted first.
    pub fn queued_jobs(&self) -> Vec<String> {
        self.inner.lock().queue.job_ids()
    }

    pub fn trigger_catalog(&self) -> BTreeMap<TriggerSymbol, TriggerConfig> {
        trigger::catalog()
    }

    pub fn stats(&self) -> JobStats {
        let state = self.inner.lock();
        JobStats::collect(
            &state.store,
            state.queue.len(),
            state.in_flight.len(),
            self.inner.config.max_concurrent,
        )
    }

    /// Summaries of the session's successful jobs, ready for a prompt.
    pub fn context_for_injection(&self, session_id: &str) -> String {
        stats::context_for_injection(&self.inner.lock().store, session_id)
    }

    /// Lifecycle events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// Recently published events, oldest first.
    pub fn recent_events(&self) -> Vec<JobEvent> {
        self.inner.events.history()
    }

    /// Wait until the job reaches a terminal state. `None` for unknown IDs.
    pub async fn wait_for_terminal(&self, job_id: &str) -> Option<JobRecord> {
        // Subscribe before the first check so no transition slips between.
        let mut rx = self.subscribe();
        loop {
            match self.get_job(job_id) {
                None => return None,
                Some(record) if record.is_terminal() => return Some(record),
                Some(_) => {}
            }
            loop {
                match rx.recv().await {
                    Ok(event) if event.job_id == job_id && event.kind.is_terminal() => break,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => break,
                    Err(broadcast::error::RecvError::Closed) => return self.get_job(job_id),
                }
            }
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, record: &JobRecord, kind: JobEventKind) {
        self.events.publish(JobEvent {
            job_id: record.id.clone(),
            trigger: record.trigger,
            session_id: record.session_id.clone(),
            kind,
            timestamp: Utc::now(),
        });
    }

    /// Admission pass: move backlog heads to Running while slots are free.
    fn admit(inner: &Arc<Inner>) {
        let launches = {
            let mut guard = inner.lock();
            let state = &mut *guard;
            let mut launches = Vec::new();

            while state.in_flight.len() < inner.config.max_concurrent {
                let Some(entry) = state.queue.pop() else {
                    break;
                };
                let timeout = state
                    .timeouts
                    .remove(&entry.job_id)
                    .unwrap_or_else(|| inner.config.default_timeout());
                let Some(record) = state.store.get_mut(&entry.job_id) else {
                    continue;
                };
                if let Err(e) = record.start() {
                    tracing::debug!("⏭️ Skipping backlog entry {}: {}", entry.job_id, e);
                    continue;
                }

                let token = CancellationToken::new();
                state.in_flight.insert(record.id.clone());
                state.tokens.insert(record.id.clone(), token.clone());
                inner.publish(record, JobEventKind::Started);
                tracing::info!(
                    "🚀 Job started: {} ({}, {}/{} slots)",
                    record.id,
                    record.trigger,
                    state.in_flight.len(),
                    inner.config.max_concurrent
                );
                launches.push(Launch {
                    job: record.clone(),
                    token,
                    timeout,
                });
            }
            launches
        };

        for launch in launches {
            tokio::spawn(Inner::run(inner.clone(), launch));
        }
    }

    /// Run one executor to completion and record the outcome.
    async fn run(inner: Arc<Inner>, launch: Launch) {
        let Launch { job, token, timeout } = launch;
        let job_id = job.id.clone();

        let outcome = match inner.executors.get(job.trigger) {
            Some(executor) => {
                let ctx = ExecutionContext::new(&job_id, token, Inner::progress_sink(&inner, &job_id));
                // Own task, so a panicking executor only fails its own job.
                let mut handle = tokio::spawn(async move { executor.execute(&job, &ctx).await });
                match tokio::time::timeout(timeout, &mut handle).await {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(join_err)) => Err(ExecutorError::Failed(format!(
                        "executor panicked: {join_err}"
                    ))),
                    Err(_) => {
                        handle.abort();
                        Err(ExecutorError::TimedOut(timeout))
                    }
                }
            }
            None => Err(ExecutorError::Failed(format!(
                "no executor registered for '{}'",
                job.trigger
            ))),
        };

        inner.finish(&job_id, outcome);
        Inner::admit(&inner);
    }

    fn progress_sink(inner: &Arc<Inner>, job_id: &str) -> ProgressFn {
        let weak = Arc::downgrade(inner);
        let job_id = job_id.to_string();
        Arc::new(move |percent: u8, phase: &str| {
            if let Some(inner) = weak.upgrade() {
                inner.record_progress(&job_id, percent, phase);
            }
        })
    }

    fn record_progress(&self, job_id: &str, percent: u8, phase: &str) {
        let mut state = self.lock();
        let Some(record) = state.store.get_mut(job_id) else {
            return;
        };
        if record.record_progress(percent, phase) {
            tracing::debug!("⏳ {} {}% ({})", job_id, record.progress(), phase);
            self.publish(
                record,
                JobEventKind::Progress {
                    progress: record.progress(),
                    phase: phase.to_string(),
                },
            );
        } else {
            tracing::debug!(
                "Dropped progress report for {} ({}%, status {})",
                job_id,
                percent,
                record.status()
            );
        }
    }

    /// Write the terminal state for a finished executor run.
    fn finish(&self, job_id: &str, outcome: std::result::Result<JobResult, ExecutorError>) {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.in_flight.remove(job_id);
        state.tokens.remove(job_id);

        let Some(record) = state.store.get_mut(job_id) else {
            return;
        };
        if record.is_terminal() {
            tracing::debug!(
                "Late executor result for {} ignored (already {})",
                job_id,
                record.status()
            );
            return;
        }

        let (transition, kind) = match outcome {
            Ok(result) => {
                let kind = JobEventKind::Completed {
                    success: result.success,
                    summary: result.summary.clone(),
                };
                (record.complete(result), kind)
            }
            Err(ExecutorError::Cancelled) => {
                (record.cancel(), JobEventKind::Cancelled { was_running: true })
            }
            Err(e) => {
                let error = e.to_string();
                (record.fail(error.clone()), JobEventKind::Failed { error })
            }
        };

        if let Err(e) = transition {
            tracing::warn!("⚠️ Could not finalize {}: {}", job_id, e);
            return;
        }
        match &kind {
            JobEventKind::Failed { error } => {
                tracing::warn!("❌ Job failed: {} ({}): {}", job_id, record.trigger, error)
            }
            JobEventKind::Cancelled { .. } => {
                tracing::info!("🚫 Job stopped on cancellation: {} ({})", job_id, record.trigger)
            }
            _ => tracing::info!("✅ Job completed: {} ({})", job_id, record.trigger),
        }
        self.publish(record, kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_concurrent: usize) -> DispatchConfig {
        DispatchConfig {
            max_concurrent,
            simulated_step_ms: 1,
            ..DispatchConfig::default()
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        assert!(Dispatcher::simulated(config(0)).is_err());
    }

    #[tokio::test]
    async fn test_dispatch_runs_to_completion() {
        let dispatcher = Dispatcher::simulated(config(2)).unwrap();
        let id = dispatcher
            .dispatch(TriggerSymbol::Map, "src/", "s1", DispatchOptions::default())
            .await
            .unwrap();
        assert!(id.starts_with("map_"));

        let job = dispatcher.wait_for_terminal(&id).await.unwrap();
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.progress(), 100);
        assert!(job.result().unwrap().success);
    }

    #[tokio::test]
    async fn test_zero_timeout_is_rejected() {
        let dispatcher = Dispatcher::simulated(config(1)).unwrap();
        let err = dispatcher
            .dispatch(
                TriggerSymbol::Map,
                "",
                "s1",
                DispatchOptions::default().with_timeout(Duration::ZERO),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidOptions(_)));
        assert_eq!(dispatcher.stats().total, 0);
    }

    #[tokio::test]
    async fn test_missing_executor_is_rejected() {
        let dispatcher = Dispatcher::new(config(1), ExecutorRegistry::new()).unwrap();
        let err = dispatcher
            .dispatch(TriggerSymbol::Audit, "", "s1", DispatchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NoExecutor(TriggerSymbol::Audit)));
    }

    #[tokio::test]
    async fn test_catalog_priority_and_override() {
        let dispatcher = Dispatcher::simulated(config(1)).unwrap();
        let audit = dispatcher
            .dispatch(TriggerSymbol::Audit, "", "s1", DispatchOptions::default())
            .await
            .unwrap();
        let preload = dispatcher
            .dispatch(
                TriggerSymbol::Preload,
                "",
                "s1",
                DispatchOptions::default()
                    .with_priority(JobPriority::High)
                    .with_metadata("origin", serde_json::json!("test")),
            )
            .await
            .unwrap();

        assert_eq!(dispatcher.get_job(&audit).unwrap().priority, JobPriority::Critical);
        let preload = dispatcher.get_job(&preload).unwrap();
        assert_eq!(preload.priority, JobPriority::High);
        assert_eq!(preload.metadata["origin"], "test");
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let dispatcher = Dispatcher::simulated(config(1)).unwrap();
        assert!(dispatcher.get_job("nope").is_none());
        assert!(!dispatcher.cancel("nope").await);
        assert!(dispatcher.wait_for_terminal("nope").await.is_none());
    }

    #[tokio::test]
    async fn test_auto_dispatch_respects_flag() {
        let dispatcher = Dispatcher::simulated(config(4)).unwrap();
        let ids = dispatcher
            .auto_dispatch("please optimize this and run a security audit", "s1")
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);

        let off = Dispatcher::simulated(DispatchConfig {
            auto_dispatch: false,
            ..config(4)
        })
        .unwrap();
        let ids = off.auto_dispatch("run a security audit", "s1").await.unwrap();
        assert!(ids.is_empty());
        assert_eq!(off.stats().total, 0);
    }

    #[tokio::test]
    async fn test_events_are_recorded() {
        let dispatcher = Dispatcher::simulated(config(1)).unwrap();
        let id = dispatcher
            .dispatch(TriggerSymbol::Preload, "", "s1", DispatchOptions::default())
            .await
            .unwrap();
        dispatcher.wait_for_terminal(&id).await.unwrap();

        let kinds: Vec<JobEventKind> = dispatcher
            .recent_events()
            .into_iter()
            .filter(|e| e.job_id == id)
            .map(|e| e.kind)
            .collect();
        assert!(matches!(kinds.first(), Some(JobEventKind::Queued { .. })));
        assert!(matches!(kinds.get(1), Some(JobEventKind::Started)));
        assert!(kinds.iter().any(|k| matches!(k, JobEventKind::Progress { .. })));
        assert!(matches!(kinds.last(), Some(JobEventKind::Completed { success: true, .. })));
    }
}
