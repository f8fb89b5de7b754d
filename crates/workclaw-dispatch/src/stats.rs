//! Read-only projections over the job store: status counts and the
//! per-session context block handed to a downstream prompt.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::job::JobStatus;
use crate::store::JobRecordStore;
use crate::trigger::TriggerSymbol;

/// Heading of the context injection block.
pub const CONTEXT_HEADING: &str = "### Background Analysis Results";

/// Job counts across the whole store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Entries waiting in the admission backlog.
    pub queued: usize,
    /// Slots currently taken.
    pub in_flight: usize,
    pub max_concurrent: usize,
    pub by_trigger: BTreeMap<TriggerSymbol, usize>,
}

impl JobStats {
    pub fn collect(
        store: &JobRecordStore,
        queued: usize,
        in_flight: usize,
        max_concurrent: usize,
    ) -> Self {
        let mut stats = JobStats {
            queued,
            in_flight,
            max_concurrent,
            ..Default::default()
        };
        for record in store.iter() {
            stats.total += 1;
            match record.status() {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
            *stats.by_trigger.entry(record.trigger).or_default() += 1;
        }
        stats
    }

    pub fn count(&self, status: JobStatus) -> usize {
        match status {
            JobStatus::Pending => self.pending,
            JobStatus::Running => self.running,
            JobStatus::Completed => self.completed,
            JobStatus::Failed => self.failed,
            JobStatus::Cancelled => self.cancelled,
        }
    }
}

/// `"[trigger] summary"` per successful completed job of the session,
/// under [`CONTEXT_HEADING`]. Empty when nothing qualifies.
pub fn context_for_injection(store: &JobRecordStore, session_id: &str) -> String {
    let lines: Vec<String> = store
        .by_session(session_id)
        .filter_map(|record| {
            record
                .result()
                .filter(|r| r.success)
                .map(|r| format!("[{}] {}", record.trigger, r.summary))
        })
        .collect();

    if lines.is_empty() {
        return String::new();
    }
    format!("\n{CONTEXT_HEADING}\n{}", lines.join("\n"))
}
