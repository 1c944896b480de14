// ⚡ Parallel Orchestrator - Chunking, bounded concurrency, chunk reconciliation
// Work runs on a dedicated rayon pool sized to the concurrency limit.
// Results are collected by original index, so completion order never shows
// in the output. Cancellation is checked between tasks, never mid-comparison.

use crate::automaton::{scan_records, PatternAutomaton, RecordMatches};
use crate::config::ParallelOptions;
use crate::deduplication::{dedup_matches, sort_matches, DuplicateDetector, DuplicateMatch};
use crate::error::{AnalysisError, Result};
use crate::transaction::Transaction;
use rayon::prelude::*;
use std::convert::Infallible;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Progress callback: `(completed, total)`
pub type ProgressFn<'a> = dyn Fn(usize, usize) + Send + Sync + 'a;

// ============================================================================
// CHUNKING
// ============================================================================

/// Contiguous, ordered partition of `items` into slices of at most `size`
pub fn chunk_slice<T>(items: &[T], size: usize) -> Result<Vec<&[T]>> {
    if size == 0 {
        return Err(AnalysisError::InvalidConfig("chunk size must be at least 1".to_string()));
    }
    Ok(items.chunks(size).collect())
}

// ============================================================================
// CANCELLATION
// ============================================================================

/// Shared flag checked between chunks
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(AnalysisError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// BOUNDED EXECUTOR
// ============================================================================

pub struct ParallelProcessor {
    pool: rayon::ThreadPool,
    max_concurrency: usize,
    cancel: Option<CancellationToken>,
}

impl ParallelProcessor {
    /// Executor that never runs more than `max_concurrency` tasks at once
    pub fn new(max_concurrency: usize) -> Result<Self> {
        if max_concurrency == 0 {
            return Err(AnalysisError::InvalidConfig(
                "max_concurrency must be at least 1".to_string(),
            ));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_concurrency)
            .thread_name(|i| format!("txn-analysis-{}", i))
            .build()
            .map_err(|e| AnalysisError::InvalidConfig(format!("failed to start worker pool: {}", e)))?;

        Ok(ParallelProcessor {
            pool,
            max_concurrency,
            cancel: None,
        })
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Run `process(item, index)` over every item.
    ///
    /// Output slot `i` holds the result for `items[i]`. The first failure (or a
    /// cancellation) aborts the run and every computed result is discarded.
    pub fn process<T, R, E, F>(
        &self,
        items: &[T],
        process: F,
        on_progress: Option<&ProgressFn<'_>>,
    ) -> Result<Vec<R>>
    where
        T: Sync,
        R: Send,
        E: Display,
        F: Fn(&T, usize) -> std::result::Result<R, E> + Sync,
    {
        let total = items.len();
        let completed = AtomicUsize::new(0);

        self.pool.install(|| {
            items
                .par_iter()
                .enumerate()
                .map(|(index, item)| {
                    if let Some(token) = &self.cancel {
                        token.check()?;
                    }

                    let result = process(item, index).map_err(|e| AnalysisError::TaskFailed {
                        index,
                        message: e.to_string(),
                    })?;

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(callback) = on_progress {
                        callback(done, total);
                    }
                    Ok(result)
                })
                .collect::<Result<Vec<R>>>()
        })
    }
}

// ============================================================================
// CHUNKED DUPLICATE DETECTION
// ============================================================================

/// Chunked duplicate detection with cross-chunk reconciliation.
///
/// Each chunk is scanned internally and then against every *earlier* chunk,
/// so every unordered pair is compared exactly once and the id-pair set equals
/// the exhaustive scan's.
pub fn detect_duplicates_parallel<'a>(
    detector: &DuplicateDetector,
    transactions: &'a [Transaction],
    options: &ParallelOptions,
    cancel: Option<&CancellationToken>,
) -> Result<Vec<DuplicateMatch<'a>>> {
    options.validate()?;
    let chunks = chunk_slice(transactions, options.chunk_size)?;
    let mut processor = ParallelProcessor::new(options.max_concurrency)?;
    if let Some(token) = cancel {
        processor = processor.with_cancellation(token.clone());
    }

    info!(
        records = transactions.len(),
        chunks = chunks.len(),
        max_concurrency = options.max_concurrency,
        "starting chunked duplicate detection"
    );

    let per_chunk = processor.process(
        &chunks,
        |chunk, index| {
            let chunk: &'a [Transaction] = *chunk;
            let mut found = detector.detect_duplicates(chunk);
            for earlier in chunks[..index].iter().copied() {
                for tx1 in earlier {
                    for tx2 in chunk.iter() {
                        if let Some(m) = detector.compare_transactions(tx1, tx2) {
                            found.push(m);
                        }
                    }
                }
            }
            debug!(chunk = index + 1, of = chunks.len(), found = found.len(), "chunk done");
            Ok::<_, Infallible>(found)
        },
        None,
    )?;

    let mut duplicates = dedup_matches(per_chunk.into_iter().flatten().collect());
    sort_matches(&mut duplicates);

    info!(duplicates = duplicates.len(), "chunked duplicate detection finished");
    Ok(duplicates)
}

// ============================================================================
// CHUNKED PATTERN SEARCH
// ============================================================================

/// Scan records in parallel chunks against one shared automaton.
/// Indices in the result refer to positions in `transactions`.
pub fn search_transactions_parallel<S: AsRef<str>>(
    transactions: &[Transaction],
    patterns: &[S],
    options: &ParallelOptions,
) -> Result<Vec<RecordMatches>> {
    options.validate()?;
    let automaton = PatternAutomaton::from_patterns(patterns);
    let chunks = chunk_slice(transactions, options.chunk_size)?;
    let processor = ParallelProcessor::new(options.max_concurrency)?;

    let per_chunk = processor.process(
        &chunks,
        |chunk, index| {
            Ok::<_, Infallible>(scan_records(&automaton, chunk, index * options.chunk_size))
        },
        None,
    )?;

    Ok(per_chunk.into_iter().flatten().collect())
}

// ============================================================================
// MAP-REDUCE AND BATCHES
// ============================================================================

/// Concurrent chunked map, then a sequential reduce in input order
pub fn map_reduce<T, M, R, MapFn, ReduceFn>(
    items: &[T],
    map: MapFn,
    reduce: ReduceFn,
    initial: R,
    chunk_size: usize,
) -> Result<R>
where
    T: Sync,
    M: Send,
    MapFn: Fn(&T) -> M + Sync,
    ReduceFn: FnMut(R, M) -> R,
{
    let chunks = chunk_slice(items, chunk_size)?;

    let mapped: Vec<Vec<M>> = chunks
        .par_iter()
        .map(|chunk| chunk.iter().map(&map).collect())
        .collect();

    Ok(mapped.into_iter().flatten().fold(initial, reduce))
}

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub batch_size: usize,

    /// Pause between batches to let other work through; none by default
    pub delay: Option<Duration>,

    pub cancel: Option<CancellationToken>,
}

impl BatchOptions {
    pub fn new(batch_size: usize) -> Self {
        BatchOptions {
            batch_size,
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Process batches one after another, reporting `(batches_done, total)` after each
pub fn process_batches<T, R, E, F, P>(
    items: &[T],
    options: &BatchOptions,
    mut process_batch: F,
    mut on_batch_complete: P,
) -> Result<Vec<R>>
where
    E: Display,
    F: FnMut(&[T], usize) -> std::result::Result<Vec<R>, E>,
    P: FnMut(usize, usize),
{
    let batches = chunk_slice(items, options.batch_size)?;
    let total = batches.len();
    let mut results = Vec::with_capacity(items.len());

    for (index, batch) in batches.into_iter().enumerate() {
        if let Some(token) = &options.cancel {
            token.check()?;
        }

        let batch_results = process_batch(batch, index).map_err(|e| AnalysisError::TaskFailed {
            index,
            message: e.to_string(),
        })?;
        results.extend(batch_results);
        on_batch_complete(index + 1, total);

        if let Some(delay) = options.delay {
            if index + 1 < total {
                thread::sleep(delay);
            }
        }
    }

    Ok(results)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionType;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    fn sample_transactions() -> Vec<Transaction> {
        let base = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
        let merchants = ["Uber viaje", "Netflix", "Soriana despensa", "Rappi pedido", "CFE luz"];
        let mut txs = Vec::new();

        for i in 0..30i64 {
            let merchant = merchants[(i % 5) as usize];
            let text = if i % 2 == 0 { merchant.to_string() } else { merchant.to_uppercase() };
            let amount = 100.0 + (i % 5) as f64 * 250.0 + (i / 5) as f64 * 40.0;
            let date = base + chrono::Duration::days(i % 4);
            let tx_type = if i % 7 == 0 { TransactionType::Income } else { TransactionType::Expense };
            txs.push(Transaction::new(i + 1, &text, amount, date, tx_type));
        }

        // Re-imported copies at the end, so most pairs straddle chunks
        for i in (0..30usize).step_by(3) {
            let original = &txs[i];
            let copy = Transaction::new(
                100 + original.id,
                &original.text().to_uppercase(),
                original.amount,
                original.date,
                original.transaction_type,
            );
            txs.push(copy);
        }

        txs
    }

    fn pair_set(matches: &[DuplicateMatch<'_>]) -> BTreeSet<(i64, i64)> {
        matches.iter().map(|m| m.key()).collect()
    }

    #[test]
    fn test_chunk_slice() {
        let items: Vec<i32> = (1..=7).collect();
        let chunks = chunk_slice(&items, 3).unwrap();
        assert_eq!(chunks, vec![&[1, 2, 3][..], &[4, 5, 6][..], &[7][..]]);

        assert!(chunk_slice(&items, 0).is_err());
        assert!(chunk_slice::<i32>(&[], 3).unwrap().is_empty());
    }

    #[test]
    fn test_processor_preserves_input_order() {
        let processor = ParallelProcessor::new(3).unwrap();
        let items: Vec<u64> = (0..50).collect();

        let results = processor
            .process(
                &items,
                |item, _| {
                    // Later items finish first
                    thread::sleep(Duration::from_micros(50 * (50 - item)));
                    Ok::<_, Infallible>(item * 2)
                },
                None,
            )
            .unwrap();

        assert_eq!(results, items.iter().map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_processor_bounds_concurrency() {
        let processor = ParallelProcessor::new(2).unwrap();
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let items: Vec<usize> = (0..20).collect();

        processor
            .process(
                &items,
                |_, _| {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(2));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, Infallible>(())
                },
                None,
            )
            .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_processor_reports_progress() {
        let processor = ParallelProcessor::new(4).unwrap();
        let seen = Mutex::new(Vec::new());
        let items: Vec<usize> = (0..10).collect();

        let progress = |done: usize, total: usize| seen.lock().unwrap().push((done, total));
        processor
            .process(&items, |i, _| Ok::<_, Infallible>(*i), Some(&progress))
            .unwrap();

        let mut seen = seen.into_inner().unwrap();
        seen.sort();
        assert_eq!(seen, (1..=10).map(|d| (d, 10)).collect::<Vec<_>>());
    }

    #[test]
    fn test_processor_fails_fast_without_partial_results() {
        let processor = ParallelProcessor::new(2).unwrap();
        let items: Vec<i32> = (0..10).collect();

        let result = processor.process(
            &items,
            |item, _| if *item == 5 { Err("boom") } else { Ok(*item) },
            None,
        );

        assert_eq!(
            result,
            Err(AnalysisError::TaskFailed { index: 5, message: "boom".to_string() })
        );
    }

    #[test]
    fn test_processor_rejects_zero_concurrency() {
        assert!(ParallelProcessor::new(0).is_err());
    }

    #[test]
    fn test_parallel_matches_exhaustive() {
        let detector = DuplicateDetector::default();
        let txs = sample_transactions();
        let baseline = detector.detect_duplicates(&txs);
        assert!(!baseline.is_empty());

        for chunk_size in [1, 3, 7, 16, 40, 100] {
            let options = ParallelOptions::new(chunk_size, 3);
            let parallel = detect_duplicates_parallel(&detector, &txs, &options, None).unwrap();
            assert_eq!(pair_set(&parallel), pair_set(&baseline), "chunk size {}", chunk_size);
            assert_eq!(parallel, baseline, "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn test_parallel_respects_type_filter() {
        let detector = DuplicateDetector::default();
        let txs = sample_transactions();
        let matches =
            detect_duplicates_parallel(&detector, &txs, &ParallelOptions::new(6, 2), None).unwrap();
        assert!(matches
            .iter()
            .all(|m| m.transaction1.transaction_type == m.transaction2.transaction_type));
    }

    #[test]
    fn test_cancelled_run_returns_no_results() {
        let detector = DuplicateDetector::default();
        let txs = sample_transactions();
        let token = CancellationToken::new();
        token.cancel();

        let result =
            detect_duplicates_parallel(&detector, &txs, &ParallelOptions::new(5, 2), Some(&token));
        assert_eq!(result, Err(AnalysisError::Cancelled));
    }

    #[test]
    fn test_search_transactions_parallel_keeps_global_indices() {
        let txs = sample_transactions();
        let patterns = ["uber", "netflix"];

        let sequential = crate::automaton::search_transactions(&txs, &patterns);
        let parallel =
            search_transactions_parallel(&txs, &patterns, &ParallelOptions::new(7, 3)).unwrap();

        assert_eq!(parallel, sequential);
        assert_eq!(parallel[0].index, 0);
        assert_eq!(parallel[1].index, 1);
    }

    #[test]
    fn test_map_reduce() {
        let items: Vec<u64> = (1..=100).collect();
        let sum = map_reduce(&items, |x| x * x, |acc, x| acc + x, 0u64, 9).unwrap();
        assert_eq!(sum, 338_350);

        let concatenated =
            map_reduce(&["a", "b", "c"], |s| s.to_uppercase(), |acc, s| acc + &s, String::new(), 2)
                .unwrap();
        assert_eq!(concatenated, "ABC");
    }

    #[test]
    fn test_process_batches() {
        let items: Vec<i32> = (0..10).collect();
        let mut progress = Vec::new();

        let results = process_batches(
            &items,
            &BatchOptions::new(4).with_delay(Duration::from_millis(1)),
            |batch, index| Ok::<_, Infallible>(batch.iter().map(|x| (index, *x)).collect()),
            |done, total| progress.push((done, total)),
        )
        .unwrap();

        assert_eq!(results.len(), 10);
        assert_eq!(results[4], (1, 4));
        assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[test]
    fn test_process_batches_stops_on_error() {
        let items: Vec<i32> = (0..10).collect();
        let mut calls = 0;

        let result: Result<Vec<i32>> = process_batches(
            &items,
            &BatchOptions::new(3),
            |batch, index| {
                calls += 1;
                if index == 1 {
                    Err(format!("bad batch {:?}", batch))
                } else {
                    Ok(batch.to_vec())
                }
            },
            |_, _| {},
        );

        assert!(matches!(result, Err(AnalysisError::TaskFailed { index: 1, .. })));
        assert_eq!(calls, 2);
    }
}
