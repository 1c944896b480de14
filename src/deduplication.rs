// 🔍 Deduplication Engine - Detect near-duplicate transactions
// Weighted multi-signal scoring: text + amount + date + category.
// The exhaustive pairwise scan is the baseline every faster strategy is checked against.

use crate::config::DetectionConfig;
use crate::error::{AnalysisError, Result};
use crate::similarity::{
    composite_similarity_with, date_similarity, normalize_for_comparison, number_similarity,
    TextAlgorithm,
};
use crate::transaction::{pair_key, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

pub const REASON_TEXT: &str = "very similar text";
pub const REASON_AMOUNT: &str = "near-identical amount";
pub const REASON_DATE: &str = "dates very close";
pub const REASON_CATEGORY: &str = "same category";
pub const REASON_TYPE: &str = "same type";

// ============================================================================
// CONFIDENCE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// > 0.95 high, > 0.90 medium, otherwise low
    pub fn from_score(score: f64) -> Self {
        if score > 0.95 {
            Confidence::High
        } else if score > 0.90 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

// ============================================================================
// DUPLICATE MATCH RESULT
// ============================================================================

/// Per-field similarities behind a match
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldScores {
    pub text: f64,
    pub amount: f64,
    pub date: f64,
    pub category: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateMatch<'a> {
    pub transaction1: &'a Transaction,
    pub transaction2: &'a Transaction,

    /// Weighted overall score (0.0 - 1.0)
    pub similarity: f64,

    pub scores: FieldScores,

    /// Human-readable reasons
    pub reasons: Vec<String>,

    pub confidence: Confidence,
}

impl DuplicateMatch<'_> {
    /// Canonical unordered id pair
    pub fn key(&self) -> (i64, i64) {
        pair_key(self.transaction1, self.transaction2)
    }
}

/// Sort descending by score; equal scores are ordered by id pair so the
/// output never depends on discovery order.
pub fn sort_matches(matches: &mut [DuplicateMatch<'_>]) {
    matches.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.key().cmp(&b.key()))
    });
}

/// Keep the first match seen for each canonical id pair
pub fn dedup_matches(matches: Vec<DuplicateMatch<'_>>) -> Vec<DuplicateMatch<'_>> {
    let mut seen = HashSet::new();
    matches.into_iter().filter(|m| seen.insert(m.key())).collect()
}

// ============================================================================
// DEDUPLICATION ENGINE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct DuplicateDetector {
    config: DetectionConfig,
}

impl DuplicateDetector {
    /// Create a detector; rejects configurations that fail validation
    pub fn new(config: DetectionConfig) -> Result<Self> {
        config.validate()?;
        if config.threshold == 0.0 {
            warn!("duplicate threshold is 0; every pair passing the filters will be reported");
        }
        Ok(DuplicateDetector { config })
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Score one pair; `None` when a hard filter rejects it or the score is below threshold
    pub fn compare_transactions<'a>(
        &self,
        tx1: &'a Transaction,
        tx2: &'a Transaction,
    ) -> Option<DuplicateMatch<'a>> {
        if self.config.require_same_type && tx1.transaction_type != tx2.transaction_type {
            return None;
        }
        if self.config.require_same_category && tx1.category() != tx2.category() {
            return None;
        }

        let scores = FieldScores {
            text: self.text_similarity(tx1, tx2),
            amount: number_similarity(tx1.amount, tx2.amount, self.config.amount_tolerance),
            date: date_similarity(tx1.date, tx2.date, self.config.date_tolerance_days),
            category: category_similarity(tx1, tx2),
        };

        let weights = &self.config.weights;
        let similarity = scores.text * weights.text
            + scores.amount * weights.amount
            + scores.date * weights.date
            + scores.category * weights.category;

        if similarity < self.config.threshold {
            return None;
        }

        let mut reasons = Vec::new();
        if scores.text > 0.9 {
            reasons.push(REASON_TEXT.to_string());
        }
        if scores.amount > 0.95 {
            reasons.push(REASON_AMOUNT.to_string());
        }
        if scores.date > 0.9 {
            reasons.push(REASON_DATE.to_string());
        }
        if scores.category == 1.0 {
            reasons.push(REASON_CATEGORY.to_string());
        }
        if tx1.transaction_type == tx2.transaction_type {
            reasons.push(REASON_TYPE.to_string());
        }

        Some(DuplicateMatch {
            transaction1: tx1,
            transaction2: tx2,
            similarity,
            scores,
            reasons,
            confidence: Confidence::from_score(similarity),
        })
    }

    fn text_similarity(&self, tx1: &Transaction, tx2: &Transaction) -> f64 {
        let text1 = normalize_for_comparison(tx1.text());
        let text2 = normalize_for_comparison(tx2.text());

        match (text1.is_empty(), text2.is_empty()) {
            (true, true) => 1.0,
            (true, false) | (false, true) => 0.0,
            _ => match self.config.text_algorithm {
                TextAlgorithm::Composite => {
                    composite_similarity_with(&text1, &text2, &self.config.composite_weights)
                }
                algorithm => algorithm.apply(&text1, &text2),
            },
        }
    }

    /// Exhaustive O(n²) comparison of every unordered pair
    pub fn detect_duplicates<'a>(&self, transactions: &'a [Transaction]) -> Vec<DuplicateMatch<'a>> {
        let mut duplicates = Vec::new();
        let mut processed = HashSet::new();

        for i in 0..transactions.len() {
            for j in (i + 1)..transactions.len() {
                let tx1 = &transactions[i];
                let tx2 = &transactions[j];

                if processed.contains(&pair_key(tx1, tx2)) {
                    continue;
                }

                if let Some(m) = self.compare_transactions(tx1, tx2) {
                    processed.insert(m.key());
                    duplicates.push(m);
                }
            }
        }

        sort_matches(&mut duplicates);
        debug!(
            records = transactions.len(),
            duplicates = duplicates.len(),
            "exhaustive duplicate scan finished"
        );
        duplicates
    }

    /// Compare one transaction against many; candidates with the same id are skipped
    pub fn find_duplicates_of<'a>(
        &self,
        transaction: &'a Transaction,
        candidates: &'a [Transaction],
    ) -> Vec<DuplicateMatch<'a>> {
        let mut matches: Vec<DuplicateMatch<'a>> = candidates
            .iter()
            .filter(|candidate| candidate.id != transaction.id)
            .filter_map(|candidate| self.compare_transactions(transaction, candidate))
            .collect();

        sort_matches(&mut matches);
        matches
    }

    /// Single-pass grouping in input order.
    ///
    /// Each unassigned record seeds a group and absorbs every later unassigned
    /// record that matches *it*. Not a transitive closure: A~B and B~C with
    /// A≁C yields {A, B} and {C}.
    pub fn group_duplicates<'a>(&self, transactions: &'a [Transaction]) -> Vec<Vec<&'a Transaction>> {
        let mut groups = Vec::new();
        let mut assigned = HashSet::new();

        for (i, tx) in transactions.iter().enumerate() {
            if !assigned.insert(tx.id) {
                continue;
            }

            let mut group = vec![tx];
            for dup in self.find_duplicates_of(tx, &transactions[i + 1..]) {
                if assigned.insert(dup.transaction2.id) {
                    group.push(dup.transaction2);
                }
            }

            groups.push(group);
        }

        groups
    }
}

fn category_similarity(tx1: &Transaction, tx2: &Transaction) -> f64 {
    match (tx1.category(), tx2.category()) {
        (None, None) => 1.0,
        (Some(a), Some(b)) if a == b => 1.0,
        _ => 0.0,
    }
}

// ============================================================================
// MERGING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Keep the first record in input order
    First,

    /// Keep the last record in input order
    #[default]
    Last,

    /// Keep the record with the largest amount
    Highest,

    /// Keep the record with the smallest amount
    Lowest,
}

/// Pick the record that survives a group of duplicates.
/// Amount ties keep the earliest record.
pub fn merge_duplicates<'a>(
    group: &[&'a Transaction],
    strategy: MergeStrategy,
) -> Result<&'a Transaction> {
    let (first, rest) = group.split_first().ok_or(AnalysisError::EmptyGroup)?;

    let keeper = match strategy {
        MergeStrategy::First => *first,
        MergeStrategy::Last => *rest.last().unwrap_or(first),
        MergeStrategy::Highest => rest
            .iter()
            .copied()
            .fold(*first, |max, tx| if tx.amount > max.amount { tx } else { max }),
        MergeStrategy::Lowest => rest
            .iter()
            .copied()
            .fold(*first, |min, tx| if tx.amount < min.amount { tx } else { min }),
    };

    Ok(keeper)
}

/// Ids to keep and ids to drop, derived from a sorted match list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DuplicateMarks {
    pub primary: Vec<i64>,
    pub duplicates: Vec<i64>,
}

/// The first record of each pair is primary, the second a duplicate,
/// unless the id was already classified by an earlier match.
pub fn mark_as_duplicates(matches: &[DuplicateMatch<'_>]) -> DuplicateMarks {
    let mut marks = DuplicateMarks::default();
    let mut processed = HashSet::new();

    for m in matches {
        if processed.insert(m.transaction1.id) {
            marks.primary.push(m.transaction1.id);
        }
        if processed.insert(m.transaction2.id) {
            marks.duplicates.push(m.transaction2.id);
        }
    }

    marks
}

// ============================================================================
// STATISTICS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateStats {
    pub total: usize,
    pub high_confidence: usize,
    pub medium_confidence: usize,
    pub low_confidence: usize,
    pub average_similarity: f64,
    pub by_reason: BTreeMap<String, usize>,
}

impl DuplicateStats {
    pub fn from_matches(matches: &[DuplicateMatch<'_>]) -> Self {
        let count = |tier: Confidence| matches.iter().filter(|m| m.confidence == tier).count();

        let average_similarity = if matches.is_empty() {
            0.0
        } else {
            matches.iter().map(|m| m.similarity).sum::<f64>() / matches.len() as f64
        };

        let mut by_reason = BTreeMap::new();
        for reason in matches.iter().flat_map(|m| &m.reasons) {
            *by_reason.entry(reason.clone()).or_insert(0) += 1;
        }

        DuplicateStats {
            total: matches.len(),
            high_confidence: count(Confidence::High),
            medium_confidence: count(Confidence::Medium),
            low_confidence: count(Confidence::Low),
            average_similarity,
            by_reason,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Duplicates: {} (high {}, medium {}, low {}), avg similarity {:.1}%",
            self.total,
            self.high_confidence,
            self.medium_confidence,
            self.low_confidence,
            self.average_similarity * 100.0
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
