// ⏱️ Benchmarks - Rough wall-clock comparisons of the search and dedup strategies
// Not a statistical harness: each strategy runs once. Useful for spotting
// order-of-magnitude regressions from the CLI.

use crate::automaton::PatternAutomaton;
use crate::config::ParallelOptions;
use crate::deduplication::DuplicateDetector;
use crate::error::Result;
use crate::parallel::detect_duplicates_parallel;
use crate::transaction::Transaction;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct SearchBenchmark {
    pub automaton_matches: usize,
    pub naive_matches: usize,
    pub automaton_ms: f64,
    pub naive_ms: f64,

    /// naive time / automaton time
    pub speedup: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategyTiming {
    pub strategy: String,
    pub duplicates: usize,
    pub elapsed_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionBenchmark {
    pub records: usize,
    pub timings: Vec<StrategyTiming>,
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

fn speedup(baseline_ms: f64, candidate_ms: f64) -> f64 {
    if candidate_ms > 0.0 {
        baseline_ms / candidate_ms
    } else {
        0.0
    }
}

/// Count overlapping, case-insensitive occurrences of every pattern with a
/// plain `str::find` loop per pattern
fn naive_count(text: &str, patterns: &[String]) -> usize {
    let haystack = text.to_lowercase();
    let mut total = 0;

    for pattern in patterns {
        let mut from = 0;
        while let Some(pos) = haystack[from..].find(pattern.as_str()) {
            total += 1;
            let start = from + pos;
            // Advance one char so overlapping hits are counted too
            from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
        }
    }

    total
}

/// Time the automaton against the naive multi-pattern loop on one text
pub fn compare_search_performance<S: AsRef<str>>(text: &str, patterns: &[S]) -> SearchBenchmark {
    let started = Instant::now();
    let automaton = PatternAutomaton::from_patterns(patterns);
    let automaton_matches = automaton.count(text);
    let automaton_ms = millis(started.elapsed());

    // Same normalization the automaton applies on insert
    let normalized: Vec<String> = automaton.patterns().to_vec();
    let started = Instant::now();
    let naive_matches = naive_count(text, &normalized);
    let naive_ms = millis(started.elapsed());

    let result = SearchBenchmark {
        automaton_matches,
        naive_matches,
        automaton_ms,
        naive_ms,
        speedup: speedup(naive_ms, automaton_ms),
    };
    info!(
        patterns = normalized.len(),
        automaton_ms = result.automaton_ms,
        naive_ms = result.naive_ms,
        "search benchmark finished"
    );
    result
}

/// Time exhaustive, blocked and chunked-parallel detection on the same records
pub fn benchmark_duplicate_detection(
    detector: &DuplicateDetector,
    transactions: &[Transaction],
    options: &ParallelOptions,
) -> Result<DetectionBenchmark> {
    let mut timings = Vec::with_capacity(3);

    let started = Instant::now();
    let exhaustive = detector.detect_duplicates(transactions).len();
    timings.push(StrategyTiming {
        strategy: "exhaustive".to_string(),
        duplicates: exhaustive,
        elapsed_ms: millis(started.elapsed()),
    });

    let started = Instant::now();
    let blocked = detector.detect_duplicates_optimized(transactions).len();
    timings.push(StrategyTiming {
        strategy: "blocked".to_string(),
        duplicates: blocked,
        elapsed_ms: millis(started.elapsed()),
    });

    let started = Instant::now();
    let parallel = detect_duplicates_parallel(detector, transactions, options, None)?.len();
    timings.push(StrategyTiming {
        strategy: "parallel".to_string(),
        duplicates: parallel,
        elapsed_ms: millis(started.elapsed()),
    });

    for timing in &timings {
        info!(
            strategy = %timing.strategy,
            duplicates = timing.duplicates,
            elapsed_ms = timing.elapsed_ms,
            "detection strategy timed"
        );
    }

    Ok(DetectionBenchmark {
        records: transactions.len(),
        timings,
    })
}
