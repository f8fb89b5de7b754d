//! # WorkClaw Dispatch
//!
//! Background job dispatcher: classifies free text into work triggers,
//! queues jobs by priority, runs them under a fixed concurrency cap, and
//! tracks every job through an explicit lifecycle.
//!
//! ## Architecture
//! ```text
//! detect_triggers("run a security audit")  → [audit]
//!
//! Dispatcher::dispatch(audit, "src/", session)
//!   ├── JobRecordStore   Pending record
//!   ├── AdmissionQueue   critical > high > normal > low, FIFO within a priority
//!   └── admission pass   while in_flight < max_concurrent
//!         └── Executor (tokio task)
//!               ├── report_progress(%, phase)
//!               ├── CancellationToken (cooperative cancel)
//!               └── Ok(JobResult) | Err(ExecutorError) → terminal state
//!
//! Observers: subscribe() → JobEvent stream (queued, started, progress, ...)
//! Readers:   stats(), session_jobs(), context_for_injection()
//! ```

pub mod classifier;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod executor;
pub mod job;
pub mod queue;
pub mod stats;
pub mod store;
pub mod trigger;

pub use classifier::{Detection, detect};
pub use dispatcher::{DispatchOptions, Dispatcher};
pub use error::{DispatchError, ExecutorError, Result, TransitionError};
pub use events::{JobEvent, JobEventKind};
pub use executor::{ExecutionContext, Executor, ExecutorRegistry, SimulatedExecutor};
pub use job::{JobRecord, JobResult, JobState, JobStatus};
pub use queue::{AdmissionQueue, QueueEntry};
pub use stats::JobStats;
pub use store::JobRecordStore;
pub use trigger::{JobPriority, TriggerConfig, TriggerSymbol};
