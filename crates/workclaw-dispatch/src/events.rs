//! Lifecycle notifications — published for external observers.
//! Observers subscribe to a broadcast channel; a bounded in-memory history
//! covers observers that attach late. Nothing in the dispatcher depends on
//! anyone listening.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::trigger::{JobPriority, TriggerSymbol};

const CHANNEL_CAPACITY: usize = 1024;

/// What happened to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum JobEventKind {
    Queued { priority: JobPriority },
    Started,
    Progress { progress: u8, phase: String },
    Completed { success: bool, summary: String },
    Failed { error: String },
    Cancelled { was_running: bool },
}

impl JobEventKind {
    /// True for completed, failed and cancelled.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobEventKind::Completed { .. } | JobEventKind::Failed { .. } | JobEventKind::Cancelled { .. }
        )
    }
}

/// A lifecycle notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: String,
    pub trigger: TriggerSymbol,
    pub session_id: String,
    #[serde(flatten)]
    pub kind: JobEventKind,
    pub timestamp: DateTime<Utc>,
}

/// Broadcast channel plus ring-buffer history.
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
    history: Mutex<VecDeque<JobEvent>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    /// Record and publish an event.
    pub fn publish(&self, event: JobEvent) {
        {
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            history.push_back(event.clone());
            // Ring buffer — keep the last `capacity`
            while history.len() > self.capacity {
                history.pop_front();
            }
        }
        // No receivers is fine.
        let _ = self.sender.send(event);
    }

    /// Recent events, oldest first.
    pub fn history(&self) -> Vec<JobEvent> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.iter().cloned().collect()
    }
}
