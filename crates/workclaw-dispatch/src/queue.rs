//! Admission queue — priority-ordered backlog of pending jobs.
//!
//! Entries wait here until the dispatcher has a free execution slot.
//! With priority ordering on, a new entry goes behind every entry of equal or
//! higher priority, so equal priorities keep insertion (FIFO) order.
//! With it off, the backlog is plain FIFO.

use std::collections::VecDeque;

use crate::trigger::JobPriority;

/// A job waiting for admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub job_id: String,
    pub priority: JobPriority,
}

/// Backlog of pending job IDs.
#[derive(Debug)]
pub struct AdmissionQueue {
    entries: VecDeque<QueueEntry>,
    priority_ordering: bool,
}

impl AdmissionQueue {
    pub fn new(priority_ordering: bool) -> Self {
        Self {
            entries: VecDeque::new(),
            priority_ordering,
        }
    }

    /// Add a job to the backlog.
    pub fn push(&mut self, job_id: &str, priority: JobPriority) {
        let entry = QueueEntry {
            job_id: job_id.to_string(),
            priority,
        };
        if !self.priority_ordering {
            self.entries.push_back(entry);
            return;
        }
        let pos = self
            .entries
            .iter()
            .position(|e| e.priority < priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, entry);
    }

    /// Take the head of the backlog.
    pub fn pop(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    /// Remove a job before it is admitted. Returns true if it was queued.
    pub fn remove(&mut self, job_id: &str) -> bool {
        match self.entries.iter().position(|e| e.job_id == job_id) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.entries.iter().any(|e| e.job_id == job_id)
    }

    /// Queued job IDs, head first.
    pub fn job_ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.job_id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
