// 🧱 Blocking - Restrict duplicate comparison to records sharing a coarse key
// Trades recall for throughput: only pairs that share a bucket are compared.
//
// Bucket key = (type, ISO week, amount rounded down to 100). Each record is
// also placed in the four edge neighbours (week ±1, amount ±100). Two records
// meet when their keys differ by at most one step on each axis, or by two
// steps on a single axis.
//
// Known limitation: pairs whose keys are further apart are never compared.
// With default tolerances this means a pair one week apart whose amounts fall
// two buckets apart (large amounts, where a gap over 100 still scores well),
// or any pair two weeks apart when the date tolerance exceeds 7 days.

use crate::deduplication::{sort_matches, DuplicateDetector, DuplicateMatch};
use crate::transaction::{pair_key, Transaction, TransactionType};
use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

const AMOUNT_BUCKET: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockKey {
    pub transaction_type: TransactionType,

    /// Continuous ISO week index, so the week after week 52/53 is a neighbour
    pub week: i64,

    /// Amount rounded down to a multiple of 100
    pub amount_bucket: i64,
}

impl BlockKey {
    pub fn for_transaction(tx: &Transaction) -> Self {
        BlockKey {
            transaction_type: tx.transaction_type,
            week: week_index(tx.date),
            amount_bucket: amount_bucket(tx.amount),
        }
    }

    /// The four edge neighbours (no diagonals)
    pub fn neighbors(&self) -> [BlockKey; 4] {
        [
            BlockKey { week: self.week.saturating_sub(1), ..*self },
            BlockKey { week: self.week.saturating_add(1), ..*self },
            BlockKey { amount_bucket: self.amount_bucket.saturating_sub(AMOUNT_BUCKET), ..*self },
            BlockKey { amount_bucket: self.amount_bucket.saturating_add(AMOUNT_BUCKET), ..*self },
        ]
    }
}

/// Index of the ISO week containing `date`, counted from the proleptic epoch.
/// Consecutive ISO weeks have consecutive indices, across year boundaries too.
pub fn week_index(date: NaiveDate) -> i64 {
    let monday = date - chrono::Duration::days(date.weekday().num_days_from_monday() as i64);
    // 0001-01-01 is a Monday, so Mondays sit on multiples of 7 from day 1
    (monday.num_days_from_ce() as i64 - 1).div_euclid(7)
}

/// Amount rounded down to a multiple of 100; saturates at the `i64` range
/// (NaN lands in bucket 0)
pub fn amount_bucket(amount: f64) -> i64 {
    ((amount / AMOUNT_BUCKET as f64).floor() as i64).saturating_mul(AMOUNT_BUCKET)
}

/// Bucket → positions of the records placed in it
pub fn create_blocks(transactions: &[Transaction]) -> BTreeMap<BlockKey, Vec<usize>> {
    let mut blocks: BTreeMap<BlockKey, Vec<usize>> = BTreeMap::new();

    for (index, tx) in transactions.iter().enumerate() {
        let key = BlockKey::for_transaction(tx);
        blocks.entry(key).or_default().push(index);
        // At the saturated edge a neighbour can coincide with the key itself
        for neighbor in key.neighbors().into_iter().filter(|n| *n != key) {
            blocks.entry(neighbor).or_default().push(index);
        }
    }

    blocks
}

impl DuplicateDetector {
    /// Blocked duplicate detection: compares only records sharing a bucket.
    ///
    /// The same pair can meet in several buckets; the canonical pair key makes
    /// sure it is scored once and reported once.
    pub fn detect_duplicates_optimized<'a>(
        &self,
        transactions: &'a [Transaction],
    ) -> Vec<DuplicateMatch<'a>> {
        let blocks = create_blocks(transactions);
        let mut duplicates = Vec::new();
        let mut compared = HashSet::new();

        for block in blocks.values().filter(|b| b.len() >= 2) {
            for (pos, &i) in block.iter().enumerate() {
                for &j in &block[pos + 1..] {
                    // Keep input order inside the pair, like the exhaustive scan
                    let (first, second) = if i < j { (i, j) } else { (j, i) };
                    let tx1 = &transactions[first];
                    let tx2 = &transactions[second];

                    if !compared.insert(pair_key(tx1, tx2)) {
                        continue;
                    }
                    if let Some(m) = self.compare_transactions(tx1, tx2) {
                        duplicates.push(m);
                    }
                }
            }
        }

        sort_matches(&mut duplicates);
        debug!(
            records = transactions.len(),
            blocks = blocks.len(),
            comparisons = compared.len(),
            duplicates = duplicates.len(),
            "blocked duplicate scan finished"
        );
        duplicates
    }
}

// ============================================================================
// TESTS
// ============================================================================
