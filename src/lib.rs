// Transaction Analysis Core - Library
// Pattern search, similarity scoring and duplicate detection over in-memory
// transaction records. Exposes all modules for the CLI and tests.

pub mod error;
pub mod transaction;
pub mod similarity;     // String, number and date similarity metrics
pub mod automaton;      // Aho–Corasick multi-pattern search
pub mod config;
pub mod deduplication;  // Pairwise duplicate detection
pub mod blocking;       // Bucketed duplicate detection
pub mod parallel;       // Chunked, bounded-concurrency orchestration
pub mod cache;
pub mod benchmark;

// Re-export commonly used types
pub use error::{AnalysisError, Result};
pub use transaction::{load_csv, read_csv, Transaction, TransactionType};
pub use similarity::{
    composite_similarity, cosine_similarity, date_similarity, dice_coefficient, jaro_winkler,
    levenshtein_similarity, normalize_for_comparison, number_similarity, CompositeWeights,
    TextAlgorithm,
};
pub use automaton::{
    search_transactions, transaction_pattern_matcher, AutomatonStats, PatternAutomaton,
    PatternMatch, RecordMatches,
};
pub use config::{DetectionConfig, FieldWeights, ParallelOptions};
pub use deduplication::{
    mark_as_duplicates, merge_duplicates, Confidence, DuplicateDetector, DuplicateMarks,
    DuplicateMatch, DuplicateStats, MergeStrategy,
};
pub use blocking::{create_blocks, BlockKey};
pub use parallel::{
    chunk_slice, detect_duplicates_parallel, map_reduce, process_batches,
    search_transactions_parallel, BatchOptions, CancellationToken, ParallelProcessor,
};
pub use cache::{Cached, Clock, ManualClock, QueryCache, SystemClock};
pub use benchmark::{benchmark_duplicate_detection, compare_search_performance};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
