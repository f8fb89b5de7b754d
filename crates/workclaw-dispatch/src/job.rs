//! Job records — the core data model for dispatched work.
//!
//! A record's lifecycle is `Pending → Running → {Completed, Failed, Cancelled}`
//! plus `Pending → Cancelled`. Terminal data (result, error, completion time)
//! lives inside the terminal variant of [`JobState`], so a running job can not
//! carry a result and a failed job can not carry one either.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TransitionError;
use crate::trigger::{JobPriority, TriggerSymbol};

/// Closed set of job statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Lifecycle state with the data that only exists in that state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Completed {
        result: JobResult,
        completed_at: DateTime<Utc>,
    },
    Failed {
        error: String,
        completed_at: DateTime<Utc>,
    },
    Cancelled {
        completed_at: DateTime<Utc>,
    },
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Pending => JobStatus::Pending,
            JobState::Running => JobStatus::Running,
            JobState::Completed { .. } => JobStatus::Completed,
            JobState::Failed { .. } => JobStatus::Failed,
            JobState::Cancelled { .. } => JobStatus::Cancelled,
        }
    }
}

/// Output of a successful executor run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub success: bool,
    /// One-line summary, used for context injection.
    pub summary: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

impl JobResult {
    pub fn success(summary: impl Into<String>) -> Self {
        Self {
            success: true,
            summary: summary.into(),
            data: serde_json::Value::Null,
            artifacts: Vec::new(),
            metrics: BTreeMap::new(),
        }
    }

    /// A finished run that found nothing usable. Never injected into context.
    pub fn unsuccessful(summary: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::success(summary)
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifacts.push(artifact.into());
        self
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }
}

/// One dispatched unit of background work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique job ID, never reused within the process.
    pub id: String,
    pub trigger: TriggerSymbol,
    /// What to operate on (topic, file path, ...). Opaque to the dispatcher.
    pub context: String,
    pub session_id: String,
    /// Priority the job was queued with.
    pub priority: JobPriority,
    #[serde(flatten)]
    state: JobState,
    progress: u8,
    phase: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    /// Caller-supplied key/values, never interpreted.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl JobRecord {
    /// Create a new pending job.
    pub fn new(
        trigger: TriggerSymbol,
        context: &str,
        session_id: &str,
        priority: JobPriority,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: next_job_id(trigger),
            trigger,
            context: context.to_string(),
            session_id: session_id.to_string(),
            priority,
            state: JobState::Pending,
            progress: 0,
            phase: "queued".to_string(),
            created_at: Utc::now(),
            started_at: None,
            metadata,
        }
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn phase(&self) -> &str {
        &self.phase
    }

    pub fn result(&self) -> Option<&JobResult> {
        match &self.state {
            JobState::Completed { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            JobState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            JobState::Completed { completed_at, .. }
            | JobState::Failed { completed_at, .. }
            | JobState::Cancelled { completed_at } => Some(*completed_at),
            JobState::Pending | JobState::Running => None,
        }
    }

    /// Pending → Running. Only the admission pass calls this.
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.expect(&[JobStatus::Pending], JobStatus::Running)?;
        self.state = JobState::Running;
        self.started_at = Some(Utc::now());
        self.phase = "starting".to_string();
        Ok(())
    }

    /// Record executor progress. Returns false when the report is dropped:
    /// the job is not running, or `percent` does not move forward.
    pub fn record_progress(&mut self, percent: u8, phase: &str) -> bool {
        let percent = percent.min(100);
        if self.status() != JobStatus::Running || percent <= self.progress {
            return false;
        }
        self.progress = percent;
        self.phase = phase.to_string();
        true
    }

    /// Running → Completed.
    pub fn complete(&mut self, result: JobResult) -> Result<(), TransitionError> {
        self.expect(&[JobStatus::Running], JobStatus::Completed)?;
        self.state = JobState::Completed {
            result,
            completed_at: Utc::now(),
        };
        self.progress = 100;
        self.phase = "completed".to_string();
        Ok(())
    }

    /// Running → Failed.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.expect(&[JobStatus::Running], JobStatus::Failed)?;
        self.state = JobState::Failed {
            error: error.into(),
            completed_at: Utc::now(),
        };
        self.phase = "failed".to_string();
        Ok(())
    }

    /// Pending or Running → Cancelled.
    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        self.expect(
            &[JobStatus::Pending, JobStatus::Running],
            JobStatus::Cancelled,
        )?;
        self.state = JobState::Cancelled {
            completed_at: Utc::now(),
        };
        self.phase = "cancelled".to_string();
        Ok(())
    }

    fn expect(&self, allowed: &[JobStatus], to: JobStatus) -> Result<(), TransitionError> {
        let from = self.status();
        if allowed.contains(&from) {
            Ok(())
        } else {
            Err(TransitionError { from, to })
        }
    }
}

static JOB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// `{trigger}_{counter}_{millis in base36}`.
fn next_job_id(trigger: TriggerSymbol) -> String {
    let n = JOB_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    format!("{trigger}_{n}_{}", to_base36(millis))
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8_lossy(&buf).into_owned()
}
