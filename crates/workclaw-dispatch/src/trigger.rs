//! Trigger symbols, job priorities, and the static trigger catalog.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// Symbolic job kind. Each symbol routes to exactly one executor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSymbol {
    Ultralearn,
    Optimize,
    Consolidate,
    Predict,
    Audit,
    Map,
    Preload,
    Deepdive,
    Document,
    Refactor,
    Benchmark,
    Testgaps,
}

impl TriggerSymbol {
    /// Every trigger, in catalog order.
    pub const ALL: [TriggerSymbol; 12] = [
        TriggerSymbol::Ultralearn,
        TriggerSymbol::Optimize,
        TriggerSymbol::Consolidate,
        TriggerSymbol::Predict,
        TriggerSymbol::Audit,
        TriggerSymbol::Map,
        TriggerSymbol::Preload,
        TriggerSymbol::Deepdive,
        TriggerSymbol::Document,
        TriggerSymbol::Refactor,
        TriggerSymbol::Benchmark,
        TriggerSymbol::Testgaps,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSymbol::Ultralearn => "ultralearn",
            TriggerSymbol::Optimize => "optimize",
            TriggerSymbol::Consolidate => "consolidate",
            TriggerSymbol::Predict => "predict",
            TriggerSymbol::Audit => "audit",
            TriggerSymbol::Map => "map",
            TriggerSymbol::Preload => "preload",
            TriggerSymbol::Deepdive => "deepdive",
            TriggerSymbol::Document => "document",
            TriggerSymbol::Refactor => "refactor",
            TriggerSymbol::Benchmark => "benchmark",
            TriggerSymbol::Testgaps => "testgaps",
        }
    }

    /// Static configuration for this trigger.
    pub fn config(&self) -> &'static TriggerConfig {
        &CATALOG[*self as usize]
    }
}

impl std::fmt::Display for TriggerSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TriggerSymbol {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        TriggerSymbol::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| DispatchError::UnknownTrigger(s.to_string()))
    }
}

/// Admission priority. Higher priorities leave the backlog first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl JobPriority {
    /// Ordinal value: critical=4 > high=3 > normal=2 > low=1.
    pub fn rank(&self) -> u8 {
        match self {
            JobPriority::Low => 1,
            JobPriority::Normal => 2,
            JobPriority::High => 3,
            JobPriority::Critical => 4,
        }
    }
}

impl std::fmt::Display for JobPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobPriority::Low => write!(f, "low"),
            JobPriority::Normal => write!(f, "normal"),
            JobPriority::High => write!(f, "high"),
            JobPriority::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for JobPriority {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(JobPriority::Low),
            "normal" => Ok(JobPriority::Normal),
            "high" => Ok(JobPriority::High),
            "critical" => Ok(JobPriority::Critical),
            other => Err(DispatchError::InvalidOptions(format!(
                "unknown priority '{other}'"
            ))),
        }
    }
}

/// Static per-trigger configuration.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerConfig {
    pub description: &'static str,
    pub priority: JobPriority,
    /// Advisory only; nothing is scheduled off this value.
    pub expected_duration_secs: u64,
    pub capabilities: &'static [&'static str],
    /// Ordered sub-steps the executor walks through.
    pub phases: &'static [&'static str],
}

impl TriggerConfig {
    pub fn expected_duration(&self) -> Duration {
        Duration::from_secs(self.expected_duration_secs)
    }
}

/// Indexed by `TriggerSymbol as usize`.
static CATALOG: [TriggerConfig; 12] = [
    TriggerConfig {
        description: "Deep knowledge acquisition across the codebase",
        priority: JobPriority::Normal,
        expected_duration_secs: 60,
        capabilities: &["research", "learning", "pattern-extraction"],
        phases: &["collect", "extract", "index", "learn"],
    },
    TriggerConfig {
        description: "Performance optimization analysis",
        priority: JobPriority::High,
        expected_duration_secs: 30,
        capabilities: &["profiling", "analysis"],
        phases: &["profile", "analyze", "recommend"],
    },
    TriggerConfig {
        description: "Memory consolidation and cleanup",
        priority: JobPriority::Low,
        expected_duration_secs: 20,
        capabilities: &["memory", "deduplication"],
        phases: &["scan", "merge", "compact"],
    },
    TriggerConfig {
        description: "Predictive preloading of likely next work",
        priority: JobPriority::Normal,
        expected_duration_secs: 15,
        capabilities: &["prediction", "caching"],
        phases: &["history", "model", "forecast"],
    },
    TriggerConfig {
        description: "Security analysis and vulnerability scanning",
        priority: JobPriority::Critical,
        expected_duration_secs: 45,
        capabilities: &["security", "scanning"],
        phases: &["inventory", "scan", "classify", "report"],
    },
    TriggerConfig {
        description: "Codebase mapping and architecture analysis",
        priority: JobPriority::Normal,
        expected_duration_secs: 30,
        capabilities: &["analysis", "dependency-graph"],
        phases: &["discover", "link", "summarize"],
    },
    TriggerConfig {
        description: "Resource preloading and cache warming",
        priority: JobPriority::Low,
        expected_duration_secs: 10,
        capabilities: &["caching"],
        phases: &["select", "fetch", "warm"],
    },
    TriggerConfig {
        description: "Deep examination of a single area of code",
        priority: JobPriority::Normal,
        expected_duration_secs: 60,
        capabilities: &["analysis", "reasoning"],
        phases: &["trace", "inspect", "explain"],
    },
    TriggerConfig {
        description: "Documentation generation",
        priority: JobPriority::Normal,
        expected_duration_secs: 45,
        capabilities: &["generation", "docs"],
        phases: &["extract", "draft", "render"],
    },
    TriggerConfig {
        description: "Refactoring suggestions",
        priority: JobPriority::Normal,
        expected_duration_secs: 30,
        capabilities: &["analysis", "refactoring"],
        phases: &["detect", "plan", "propose"],
    },
    TriggerConfig {
        description: "Performance benchmarking",
        priority: JobPriority::Normal,
        expected_duration_secs: 60,
        capabilities: &["benchmarking", "metrics"],
        phases: &["prepare", "run", "compare"],
    },
    TriggerConfig {
        description: "Test coverage gap analysis",
        priority: JobPriority::Normal,
        expected_duration_secs: 30,
        capabilities: &["testing", "coverage"],
        phases: &["collect", "diff", "report"],
    },
];

/// The full catalog keyed by trigger.
pub fn catalog() -> BTreeMap<TriggerSymbol, TriggerConfig> {
    TriggerSymbol::ALL
        .into_iter()
        .map(|t| (t, t.config().clone()))
        .collect()
}
