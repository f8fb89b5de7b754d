//! Trigger classifier — maps free text to background job triggers.
//!
//! Best-effort keyword heuristic, not a safety gate. Every trigger owns a
//! short list of case-insensitive phrase patterns; a trigger matches when any
//! of its patterns match.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::trigger::TriggerSymbol;

/// Input prefix kept in [`Detection::snippet`] (characters).
pub const SNIPPET_CHARS: usize = 100;

/// Result of classifying a piece of text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub detected: bool,
    /// Matched triggers, in catalog order.
    pub triggers: Vec<TriggerSymbol>,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub snippet: String,
}

fn patterns_for(trigger: TriggerSymbol) -> &'static [&'static str] {
    match trigger {
        TriggerSymbol::Ultralearn => &[
            r"\blearn\s+(about|everything|all)\b",
            r"\bunderstand\s+(this|the)?\s*(codebase|project|repo)",
            r"\b(study|master)\s+(the\s+)?(codebase|project|patterns?)",
            r"\bultralearn\b",
        ],
        TriggerSymbol::Optimize => &[
            r"\boptimi[sz]",
            r"\bspeed\s+up\b",
            r"\bmake\s+(it\s+|this\s+)?faster\b",
            r"\bperformance\s+(issue|problem|tuning)",
        ],
        TriggerSymbol::Consolidate => &[
            r"\bconsolidat",
            r"\bmerge\s+(the\s+)?(memories|knowledge|notes)",
            r"\bclean\s*up\s+(the\s+)?memory\b",
            r"\bdedup(licate)?\b",
        ],
        TriggerSymbol::Predict => &[
            r"\bpredict",
            r"\bforecast",
            r"\banticipat",
            r"\bwhat\s+(will|might)\s+(happen|break)",
        ],
        TriggerSymbol::Audit => &[
            r"\baudit",
            r"\bsecurity\s+(check|scan|review|audit|analysis)",
            r"\bvulnerab",
            r"\bcve-\d",
        ],
        TriggerSymbol::Map => &[
            r"\bmap\s+(out\s+)?(the\s+)?(codebase|architecture|structure|dependencies|project)",
            r"\bdependency\s+graph\b",
            r"\barchitecture\s+(overview|diagram)",
        ],
        TriggerSymbol::Preload => &[
            r"\bpreload",
            r"\bwarm\s*up\s+(the\s+)?cache",
            r"\bprefetch",
        ],
        TriggerSymbol::Deepdive => &[
            r"\bdeep\s*dive\b",
            r"\banaly[sz]e\s+(in\s+)?(depth|detail)",
            r"\bthorough(ly)?\s+(analy|investigat|review)",
            r"\binvestigate\s+(how|why)\b",
        ],
        TriggerSymbol::Document => &[
            r"\bdocument\s+(this|the|these|all)\b",
            r"\bwrite\s+(the\s+)?(docs|documentation)",
            r"\bgenerate\s+(api\s+)?(docs|documentation)",
            r"\b(add|missing)\s+doc\s*comments\b",
        ],
        TriggerSymbol::Refactor => &[
            r"\brefactor",
            r"\brestructur",
            r"\bclean\s*up\s+(the\s+|this\s+)?code\b",
            r"\bcode\s+smells?\b",
        ],
        TriggerSymbol::Benchmark => &[
            r"\bbenchmark",
            r"\bmeasure\s+(the\s+)?(performance|latency|throughput)",
            r"\bperf(ormance)?\s+tests?\b",
            r"\bload\s+test",
        ],
        TriggerSymbol::Testgaps => &[
            r"\btest\s*gaps?\b",
            r"\bmissing\s+tests?\b",
            r"\btest\s+coverage\b",
            r"\buntested\b",
        ],
    }
}

struct CompiledTrigger {
    trigger: TriggerSymbol,
    patterns: Vec<Regex>,
}

static COMPILED: LazyLock<Vec<CompiledTrigger>> = LazyLock::new(|| {
    TriggerSymbol::ALL
        .into_iter()
        .map(|trigger| CompiledTrigger {
            trigger,
            patterns: patterns_for(trigger)
                .iter()
                .filter_map(|p| match RegexBuilder::new(p).case_insensitive(true).build() {
                    Ok(re) => Some(re),
                    Err(e) => {
                        tracing::warn!("⚠️ Skipping trigger pattern for {trigger}: {e}");
                        None
                    }
                })
                .collect(),
        })
        .collect()
});

/// Classify `text` into triggers.
///
/// `confidence = min(1, pattern_matches / (distinct_triggers * 2))`.
pub fn detect(text: &str) -> Detection {
    let mut triggers = Vec::new();
    let mut total_matches = 0usize;

    for compiled in COMPILED.iter() {
        let hits = compiled.patterns.iter().filter(|re| re.is_match(text)).count();
        if hits > 0 {
            triggers.push(compiled.trigger);
            total_matches += hits;
        }
    }

    let confidence = if triggers.is_empty() {
        0.0
    } else {
        (total_matches as f64 / (triggers.len() * 2) as f64).min(1.0)
    };

    Detection {
        detected: !triggers.is_empty(),
        triggers,
        confidence,
        snippet: snippet(text),
    }
}

fn snippet(text: &str) -> String {
    text.chars().take(SNIPPET_CHARS).collect()
}
