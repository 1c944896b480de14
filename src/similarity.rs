// 📏 Similarity Engine - Normalized string/number/date comparisons
// Every function is pure and returns a value in [0, 1] (1 = identical).

use crate::error::{AnalysisError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Tolerance used when checking that weights sum to 1
pub const WEIGHT_EPSILON: f64 = 1e-6;

// ============================================================================
// TEXT ALGORITHM
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextAlgorithm {
    Levenshtein,
    Jaro,
    JaroWinkler,
    Dice,
    Cosine,
    #[default]
    Composite,
}

impl TextAlgorithm {
    /// Score two strings with this algorithm (default composite weights)
    pub fn apply(&self, a: &str, b: &str) -> f64 {
        match self {
            TextAlgorithm::Levenshtein => levenshtein_similarity(a, b),
            TextAlgorithm::Jaro => jaro(a, b),
            TextAlgorithm::JaroWinkler => jaro_winkler(a, b),
            TextAlgorithm::Dice => dice_coefficient(a, b),
            TextAlgorithm::Cosine => cosine_similarity(a, b),
            TextAlgorithm::Composite => composite_similarity(a, b),
        }
    }
}

// ============================================================================
// EDIT-DISTANCE FAMILY
// ============================================================================

/// `1 - distance / max(len1, len2)` over characters
pub fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }

    let distance = strsim::levenshtein(a, b);
    1.0 - distance as f64 / max_len as f64
}

/// Classic Jaro similarity (matching window + transpositions)
pub fn jaro(a: &str, b: &str) -> f64 {
    strsim::jaro(a, b)
}

/// Jaro plus a shared-prefix bonus (scale 0.1, at most 4 characters)
///
/// Unlike `strsim::jaro_winkler` the bonus is applied at every Jaro level,
/// not only above 0.7.
pub fn jaro_winkler(a: &str, b: &str) -> f64 {
    jaro_winkler_with_scale(a, b, 0.1)
}

pub fn jaro_winkler_with_scale(a: &str, b: &str, prefix_scale: f64) -> f64 {
    let sim = jaro(a, b);

    let prefix_len = a
        .chars()
        .zip(b.chars())
        .take(4)
        .take_while(|(x, y)| x == y)
        .count();

    sim + prefix_len as f64 * prefix_scale * (1.0 - sim)
}

// ============================================================================
// TOKEN / N-GRAM FAMILY
// ============================================================================

/// Dice coefficient over character bigram multisets
pub fn dice_coefficient(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }

    let bigrams_a = bigrams(a);
    let bigrams_b = bigrams(b);
    if bigrams_a.is_empty() || bigrams_b.is_empty() {
        return 0.0;
    }

    let intersection: usize = bigrams_a
        .iter()
        .map(|(bigram, count)| (*count).min(*bigrams_b.get(bigram).unwrap_or(&0)))
        .sum();
    let total: usize = bigrams_a.values().sum::<usize>() + bigrams_b.values().sum::<usize>();

    2.0 * intersection as f64 / total as f64
}

fn bigrams(s: &str) -> HashMap<(char, char), usize> {
    let chars: Vec<char> = s.chars().collect();
    let mut counts = HashMap::new();
    for pair in chars.windows(2) {
        *counts.entry((pair[0], pair[1])).or_insert(0) += 1;
    }
    counts
}

/// Cosine of term-frequency vectors over word tokens
pub fn cosine_similarity(a: &str, b: &str) -> f64 {
    let words_a = tokenize(a);
    let words_b = tokenize(b);

    if words_a.is_empty() && words_b.is_empty() {
        return 1.0;
    }
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let tf_a = term_frequencies(&words_a);
    let tf_b = term_frequencies(&words_b);

    let dot: f64 = tf_a
        .iter()
        .map(|(word, count)| count * tf_b.get(word).copied().unwrap_or(0.0))
        .sum();
    let magnitude_a: f64 = tf_a.values().map(|c| c * c).sum::<f64>().sqrt();
    let magnitude_b: f64 = tf_b.values().map(|c| c * c).sum::<f64>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    (dot / (magnitude_a * magnitude_b)).min(1.0)
}

fn tokenize(s: &str) -> Vec<String> {
    s.to_lowercase()
        .split(|c: char| !is_word_char(c))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn term_frequencies(words: &[String]) -> HashMap<&str, f64> {
    let mut tf = HashMap::new();
    for word in words {
        *tf.entry(word.as_str()).or_insert(0.0) += 1.0;
    }
    tf
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

// ============================================================================
// COMPOSITE
// ============================================================================

/// Weights for `composite_similarity_with`; must sum to 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeWeights {
    pub levenshtein: f64,
    pub jaro_winkler: f64,
    pub dice: f64,
    pub cosine: f64,
}

impl Default for CompositeWeights {
    fn default() -> Self {
        CompositeWeights {
            levenshtein: 0.3,
            jaro_winkler: 0.3,
            dice: 0.2,
            cosine: 0.2,
        }
    }
}

impl CompositeWeights {
    pub fn sum(&self) -> f64 {
        self.levenshtein + self.jaro_winkler + self.dice + self.cosine
    }

    pub fn validate(&self) -> Result<()> {
        let parts = [self.levenshtein, self.jaro_winkler, self.dice, self.cosine];
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(AnalysisError::InvalidConfig(
                "composite weights must be finite and non-negative".to_string(),
            ));
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_EPSILON {
            return Err(AnalysisError::InvalidWeights { sum });
        }
        Ok(())
    }
}

/// Weighted blend of Levenshtein, Jaro-Winkler, Dice and cosine (0.3/0.3/0.2/0.2)
pub fn composite_similarity(a: &str, b: &str) -> f64 {
    composite_similarity_with(a, b, &CompositeWeights::default())
}

pub fn composite_similarity_with(a: &str, b: &str, weights: &CompositeWeights) -> f64 {
    let score = levenshtein_similarity(a, b) * weights.levenshtein
        + jaro_winkler(a, b) * weights.jaro_winkler
        + dice_coefficient(a, b) * weights.dice
        + cosine_similarity(a, b) * weights.cosine;

    score.clamp(0.0, 1.0)
}

// ============================================================================
// NUMBERS AND DATES
// ============================================================================

/// `max(0, 1 - relative_diff / tolerance)`; two zeros are identical
///
/// A non-positive tolerance degrades to exact equality.
pub fn number_similarity(a: f64, b: f64, tolerance: f64) -> f64 {
    let max = a.abs().max(b.abs());
    if max == 0.0 {
        return 1.0;
    }

    let relative_diff = (a - b).abs() / max;
    if tolerance <= 0.0 {
        return if relative_diff == 0.0 { 1.0 } else { 0.0 };
    }

    (1.0 - relative_diff / tolerance).max(0.0)
}

/// `max(0, 1 - days_between / tolerance_days)`
pub fn date_similarity(d1: NaiveDate, d2: NaiveDate, tolerance_days: f64) -> f64 {
    let days = d1.signed_duration_since(d2).num_days().abs() as f64;
    if tolerance_days <= 0.0 {
        return if days == 0.0 { 1.0 } else { 0.0 };
    }

    (1.0 - days / tolerance_days).max(0.0)
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Lowercase, strip diacritics, turn non-word characters into spaces,
/// collapse whitespace and trim. Idempotent.
pub fn normalize_for_comparison(text: &str) -> String {
    let stripped: String = text
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| if is_word_char(c) { c } else { ' ' })
        .collect();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// SEARCH HELPERS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarCandidate {
    pub value: String,
    pub similarity: f64,
    pub index: usize,
}

/// Best-scoring candidate; ties keep the earliest. `None` only when empty.
pub fn find_most_similar(
    target: &str,
    candidates: &[&str],
    algorithm: TextAlgorithm,
) -> Option<SimilarCandidate> {
    let first = candidates.first()?;
    let mut best = SimilarCandidate {
        value: first.to_string(),
        similarity: 0.0,
        index: 0,
    };

    for (index, candidate) in candidates.iter().enumerate() {
        let similarity = algorithm.apply(target, candidate);
        if similarity > best.similarity {
            best = SimilarCandidate {
                value: candidate.to_string(),
                similarity,
                index,
            };
        }
    }

    Some(best)
}

/// Greedy single-pass clustering: each unassigned string seeds a cluster and
/// absorbs later unassigned strings scoring at least `threshold` against it.
pub fn cluster_similar_strings(
    strings: &[&str],
    threshold: f64,
    algorithm: TextAlgorithm,
) -> Vec<Vec<String>> {
    let mut clusters = Vec::new();
    let mut assigned = vec![false; strings.len()];

    for i in 0..strings.len() {
        if assigned[i] {
            continue;
        }
        assigned[i] = true;
        let mut cluster = vec![strings[i].to_string()];

        for j in (i + 1)..strings.len() {
            if assigned[j] {
                continue;
            }
            if algorithm.apply(strings[i], strings[j]) >= threshold {
                cluster.push(strings[j].to_string());
                assigned[j] = true;
            }
        }

        clusters.push(cluster);
    }

    clusters
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_levenshtein_similarity() {
        assert!(approx(levenshtein_similarity("", ""), 1.0));
        assert!(approx(levenshtein_similarity("abc", ""), 0.0));
        assert!(approx(levenshtein_similarity("kitten", "sitting"), 1.0 - 3.0 / 7.0));
        // Counts characters, not bytes
        assert!(approx(levenshtein_similarity("café", "cafe"), 0.75));
    }

    #[test]
    fn test_jaro_edge_cases() {
        assert!(approx(jaro("", ""), 1.0));
        assert!(approx(jaro("", "abc"), 0.0));
        assert!(approx(jaro("abc", "xyz"), 0.0));
        assert!(approx(jaro("martha", "marhta"), 0.944_444_444_444_444_4));
    }

    #[test]
    fn test_jaro_winkler_prefix_bonus() {
        let j = jaro("martha", "marhta");
        let jw = jaro_winkler("martha", "marhta");
        // Shared prefix "mar" = 3 characters
        assert!(approx(jw, j + 3.0 * 0.1 * (1.0 - j)));
        assert!(approx(jw, 0.961_111_111_111_111_1));
    }

    #[test]
    fn test_jaro_winkler_prefix_capped_at_four() {
        let j = jaro("abcdefgh", "abcdefxy");
        let jw = jaro_winkler("abcdefgh", "abcdefxy");
        assert!(approx(jw, j + 4.0 * 0.1 * (1.0 - j)));
    }

    #[test]
    fn test_dice_coefficient() {
        assert!(approx(dice_coefficient("night", "nacht"), 0.25));
        assert!(approx(dice_coefficient("a", "a"), 1.0));
        assert!(approx(dice_coefficient("a", "b"), 0.0));
        assert!(approx(dice_coefficient("", "ab"), 0.0));
        // Multiset semantics: "aaa" has bigrams {aa: 2}, "aa" has {aa: 1}
        assert!(approx(dice_coefficient("aaa", "aa"), 2.0 * 1.0 / 3.0));
    }

    #[test]
    fn test_cosine_similarity() {
        assert!(approx(cosine_similarity("pago netflix", "netflix pago"), 1.0));
        assert!(approx(cosine_similarity("a b", "a c"), 0.5));
        assert!(approx(cosine_similarity("", "abc"), 0.0));
        assert!(approx(cosine_similarity("!!!", "..."), 1.0));
    }

    #[test]
    fn test_composite_identity() {
        for s in ["a", "uber viaje", "Pago NETFLIX mensual", "!!!", "ñandú"] {
            assert!(approx(composite_similarity(s, s), 1.0), "identity failed for {:?}", s);
        }
    }

    #[test]
    fn test_composite_weights_validation() {
        assert!(CompositeWeights::default().validate().is_ok());

        let bad = CompositeWeights {
            levenshtein: 0.5,
            jaro_winkler: 0.5,
            dice: 0.5,
            cosine: 0.0,
        };
        assert!(matches!(bad.validate(), Err(AnalysisError::InvalidWeights { .. })));
    }

    #[test]
    fn test_number_similarity() {
        // 100 vs 101 → relative diff 0.0099..., tolerance 0.02
        let s = number_similarity(100.0, 101.0, 0.02);
        assert!((s - (1.0 - (1.0 / 101.0) / 0.02)).abs() < 1e-9);
        assert!((s - 0.5).abs() < 0.01);

        assert!(approx(number_similarity(0.0, 0.0, 0.02), 1.0));
        assert!(approx(number_similarity(100.0, 200.0, 0.02), 0.0));
        assert!(approx(number_similarity(100.0, 100.0, 0.0), 1.0));
        assert!(approx(number_similarity(100.0, 100.5, 0.0), 0.0));
    }

    #[test]
    fn test_date_similarity() {
        let d1 = NaiveDate::from_ymd_opt(2025, 10, 5).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2025, 10, 6).unwrap();
        let d3 = NaiveDate::from_ymd_opt(2025, 10, 20).unwrap();

        assert!(approx(date_similarity(d1, d1, 3.0), 1.0));
        assert!(approx(date_similarity(d1, d2, 3.0), 2.0 / 3.0));
        assert!(approx(date_similarity(d2, d1, 3.0), 2.0 / 3.0));
        assert!(approx(date_similarity(d1, d3, 3.0), 0.0));
    }

    #[test]
    fn test_normalize_for_comparison() {
        assert_eq!(normalize_for_comparison("  Café   Niño!! "), "cafe nino");
        assert_eq!(normalize_for_comparison("UBER*TRIP #123"), "uber trip 123");
        assert_eq!(normalize_for_comparison(""), "");
        assert_eq!(normalize_for_comparison("---"), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "Pago  de LUZ – CFE",
            "ÀÉÎÕÜ çñ",
            "ﬁ ligature ǅ title",
            "İstanbul ß straße",
            "tab\tand\nnewline",
            "snake_case_ok",
            "数字 123 ４５６",
        ];
        for input in inputs {
            let once = normalize_for_comparison(input);
            assert_eq!(normalize_for_comparison(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_find_most_similar() {
        let candidates = ["amazon", "netflix", "netflx"];
        let best = find_most_similar("netflix", &candidates, TextAlgorithm::Levenshtein).unwrap();
        assert_eq!(best.index, 1);
        assert!(approx(best.similarity, 1.0));

        assert!(find_most_similar("x", &[], TextAlgorithm::Composite).is_none());
    }

    #[test]
    fn test_cluster_similar_strings() {
        let strings = ["uber viaje", "uber viajes", "netflix", "netflix mx"];
        let clusters = cluster_similar_strings(&strings, 0.8, TextAlgorithm::JaroWinkler);

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0], vec!["uber viaje", "uber viajes"]);
        assert_eq!(clusters[1], vec!["netflix", "netflix mx"]);
    }

    #[test]
    fn test_default_algorithm_is_composite() {
        assert_eq!(TextAlgorithm::default(), TextAlgorithm::Composite);
        let parsed: TextAlgorithm = serde_json::from_str("\"jaro-winkler\"").unwrap();
        assert_eq!(parsed, TextAlgorithm::JaroWinkler);
    }
}
