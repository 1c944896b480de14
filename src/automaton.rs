// 🔎 Pattern Automaton - Aho-Corasick multi-pattern matcher
// Scans transaction text for known merchant/category keywords in one pass.
//
// The trie lives in a flat arena (node index 0 is the root). Failure links
// and output sets are derived data: they are computed by `build()` into a
// separate table and discarded whenever a new pattern is added.

use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::OnceLock;

const ROOT: usize = 0;

// ============================================================================
// TRIE
// ============================================================================

#[derive(Debug, Clone, Default)]
struct TrieNode {
    /// Outgoing edges: character → child node index
    children: HashMap<char, usize>,

    /// Pattern id if a registered pattern ends exactly here
    terminal: Option<usize>,

    /// Distance from the root in characters
    depth: usize,
}

/// Per-node data produced by `build()`
#[derive(Debug, Clone)]
struct NodeLinks {
    /// Longest proper suffix of this node's path that is also a trie path
    fail: usize,

    /// Pattern ids ending here, including those inherited through `fail`
    output: Vec<usize>,
}

// ============================================================================
// RESULTS
// ============================================================================

/// One pattern occurrence; positions are character offsets in the lowercased text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub pattern: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutomatonStats {
    pub pattern_count: usize,
    pub node_count: usize,
    pub max_depth: usize,
    pub avg_pattern_length: f64,
}

/// Patterns found in one record of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordMatches {
    /// Position of the record in the input slice
    pub index: usize,
    pub patterns: Vec<String>,
}

// ============================================================================
// AUTOMATON
// ============================================================================

#[derive(Debug)]
pub struct PatternAutomaton {
    nodes: Vec<TrieNode>,

    /// Normalized patterns, indexed by pattern id
    patterns: Vec<String>,

    /// Char length of each pattern
    pattern_lengths: Vec<usize>,

    /// Failure links and outputs; empty until built
    links: OnceLock<Vec<NodeLinks>>,
}

impl Default for PatternAutomaton {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for PatternAutomaton {
    fn clone(&self) -> Self {
        let links = OnceLock::new();
        if let Some(built) = self.links.get() {
            let _ = links.set(built.clone());
        }
        PatternAutomaton {
            nodes: self.nodes.clone(),
            patterns: self.patterns.clone(),
            pattern_lengths: self.pattern_lengths.clone(),
            links,
        }
    }
}

impl PatternAutomaton {
    pub fn new() -> Self {
        PatternAutomaton {
            nodes: vec![TrieNode::default()],
            patterns: Vec::new(),
            pattern_lengths: Vec::new(),
            links: OnceLock::new(),
        }
    }

    /// Build an automaton from a list of patterns, ready to scan
    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut automaton = PatternAutomaton::new();
        automaton.add_patterns(patterns);
        automaton.build();
        automaton
    }

    /// Register a pattern (lowercased and trimmed). Empty patterns are ignored.
    pub fn add_pattern(&mut self, raw: &str) {
        // Fold char by char, exactly as scanned text is folded
        let pattern: String = raw.trim().chars().flat_map(char::to_lowercase).collect();
        if pattern.is_empty() {
            return;
        }
        self.links = OnceLock::new();

        let mut current = ROOT;
        for c in pattern.chars() {
            current = match self.nodes[current].children.get(&c) {
                Some(&child) => child,
                None => {
                    let child = self.nodes.len();
                    let depth = self.nodes[current].depth + 1;
                    self.nodes.push(TrieNode {
                        depth,
                        ..TrieNode::default()
                    });
                    self.nodes[current].children.insert(c, child);
                    child
                }
            };
        }

        // Re-adding an existing pattern leaves the terminal mark as it was
        if self.nodes[current].terminal.is_none() {
            self.nodes[current].terminal = Some(self.patterns.len());
            self.pattern_lengths.push(self.nodes[current].depth);
            self.patterns.push(pattern);
        }
    }

    pub fn add_patterns<I, S>(&mut self, patterns: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pattern in patterns {
            self.add_pattern(pattern.as_ref());
        }
    }

    /// Compute failure links and output sets. No-op when already built.
    pub fn build(&self) {
        self.links();
    }

    pub fn is_built(&self) -> bool {
        self.links.get().is_some()
    }

    fn links(&self) -> &[NodeLinks] {
        self.links.get_or_init(|| self.compute_links())
    }

    fn compute_links(&self) -> Vec<NodeLinks> {
        let mut links: Vec<NodeLinks> = self
            .nodes
            .iter()
            .map(|node| NodeLinks {
                fail: ROOT,
                output: node.terminal.into_iter().collect(),
            })
            .collect();

        let mut queue: VecDeque<usize> = self.nodes[ROOT].children.values().copied().collect();

        // BFS guarantees a failure target (always shallower) is finished first
        while let Some(parent) = queue.pop_front() {
            for (&c, &child) in &self.nodes[parent].children {
                queue.push_back(child);

                let mut candidate = links[parent].fail;
                let fail = loop {
                    if let Some(&next) = self.nodes[candidate].children.get(&c) {
                        break next;
                    }
                    if candidate == ROOT {
                        break ROOT;
                    }
                    candidate = links[candidate].fail;
                };

                links[child].fail = fail;
                let inherited = links[fail].output.clone();
                links[child].output.extend(inherited);
            }
        }

        links
    }

    /// Follow the goto/failure transitions for one character
    fn step(&self, links: &[NodeLinks], mut state: usize, c: char) -> usize {
        loop {
            if let Some(&next) = self.nodes[state].children.get(&c) {
                return next;
            }
            if state == ROOT {
                return ROOT;
            }
            state = links[state].fail;
        }
    }

    /// Drive the automaton over `text`, calling `on_match(pattern_id, end_char_index)`
    /// for every occurrence. Stops early when the callback returns `false`.
    fn scan<F>(&self, text: &str, mut on_match: F)
    where
        F: FnMut(usize, usize) -> bool,
    {
        if self.patterns.is_empty() || text.is_empty() {
            return;
        }

        let links = self.links();
        let mut state = ROOT;

        for (i, c) in text.chars().flat_map(char::to_lowercase).enumerate() {
            state = self.step(links, state, c);
            for &pattern_id in &links[state].output {
                if !on_match(pattern_id, i) {
                    return;
                }
            }
        }
    }

    fn pattern_len(&self, pattern_id: usize) -> usize {
        self.pattern_lengths[pattern_id]
    }

    /// All occurrences of all patterns, in order of end position
    pub fn find_matches(&self, text: &str) -> Vec<PatternMatch> {
        let mut matches = Vec::new();
        self.scan(text, |pattern_id, i| {
            matches.push(PatternMatch {
                pattern: self.patterns[pattern_id].clone(),
                start: i + 1 - self.pattern_len(pattern_id),
                end: i + 1,
            });
            true
        });
        matches
    }

    /// True as soon as any pattern occurs in `text`
    pub fn contains(&self, text: &str) -> bool {
        let mut found = false;
        self.scan(text, |_, _| {
            found = true;
            false
        });
        found
    }

    pub fn count(&self, text: &str) -> usize {
        let mut count = 0;
        self.scan(text, |_, _| {
            count += 1;
            true
        });
        count
    }

    /// Distinct patterns occurring in `text`, in order of first occurrence
    pub fn matched_patterns(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        self.scan(text, |pattern_id, _| {
            if seen.insert(pattern_id) {
                unique.push(self.patterns[pattern_id].clone());
            }
            true
        });
        unique
    }

    /// Leftmost-longest, non-overlapping occurrences mapped onto the original
    /// text's character indices.
    fn non_overlapping_spans(&self, text: &str) -> Vec<(usize, usize, usize)> {
        // Lowercasing can expand a character; remember where each lowered char came from
        let origin: Vec<usize> = text
            .chars()
            .enumerate()
            .flat_map(|(i, c)| c.to_lowercase().map(move |_| i))
            .collect();

        let mut spans = Vec::new();
        self.scan(text, |pattern_id, i| {
            let start = i + 1 - self.pattern_len(pattern_id);
            spans.push((origin[start], origin[i] + 1, pattern_id));
            true
        });

        spans.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

        let mut selected: Vec<(usize, usize, usize)> = Vec::new();
        for span in spans {
            if selected.last().map_or(true, |last| span.0 >= last.1) {
                selected.push(span);
            }
        }
        selected
    }

    /// Rewrite `text`, replacing each selected occurrence with `replacement(pattern)`
    pub fn replace_with<F>(&self, text: &str, mut replacement: F) -> String
    where
        F: FnMut(&str) -> String,
    {
        self.rewrite(text, |_, pattern| replacement(pattern))
    }

    /// Rewrite `text`, replacing each selected occurrence with a fixed string
    pub fn replace(&self, text: &str, replacement: &str) -> String {
        self.rewrite(text, |_, _| replacement.to_string())
    }

    /// Wrap each selected occurrence using `highlight(matched_text, pattern)`
    pub fn highlight<F>(&self, text: &str, highlight: F) -> String
    where
        F: FnMut(&str, &str) -> String,
    {
        self.rewrite(text, highlight)
    }

    fn rewrite<F>(&self, text: &str, mut render: F) -> String
    where
        F: FnMut(&str, &str) -> String,
    {
        let spans = self.non_overlapping_spans(text);
        if spans.is_empty() {
            return text.to_string();
        }

        let chars: Vec<char> = text.chars().collect();
        let mut result = String::with_capacity(text.len());
        let mut cursor = 0;

        for (start, end, pattern_id) in spans {
            result.extend(&chars[cursor..start]);
            let original: String = chars[start..end].iter().collect();
            result.push_str(&render(&original, &self.patterns[pattern_id]));
            cursor = end;
        }
        result.extend(&chars[cursor..]);

        result
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn stats(&self) -> AutomatonStats {
        let max_depth = self.nodes.iter().map(|n| n.depth).max().unwrap_or(0);
        let avg_pattern_length = if self.patterns.is_empty() {
            0.0
        } else {
            self.pattern_lengths.iter().sum::<usize>() as f64
                / self.patterns.len() as f64
        };

        AutomatonStats {
            pattern_count: self.patterns.len(),
            node_count: self.nodes.len(),
            max_depth,
            avg_pattern_length,
        }
    }

    /// Remove every pattern
    pub fn clear(&mut self) {
        *self = PatternAutomaton::new();
    }
}

// ============================================================================
// TRANSACTION HELPERS
// ============================================================================

/// Common merchant, category and payment vocabulary
pub const COMMON_TRANSACTION_PATTERNS: &[&str] = &[
    // Merchants
    "netflix", "spotify", "uber", "rappi", "didi",
    "amazon", "mercadolibre", "walmart", "soriana",
    // Categories
    "supermercado", "restaurant", "gasolina", "transporte",
    "educacion", "salud", "entretenimiento", "renta",
    "luz", "agua", "gas", "internet", "telefono",
    // Payment methods
    "tarjeta", "efectivo", "transferencia", "cheque",
    // Operations
    "pago", "compra", "servicio", "suscripcion",
    "factura", "recibo", "cargo", "abono",
];

/// Prebuilt automaton over `COMMON_TRANSACTION_PATTERNS`
pub fn transaction_pattern_matcher() -> PatternAutomaton {
    PatternAutomaton::from_patterns(COMMON_TRANSACTION_PATTERNS)
}

/// Scan each record's text; only records with at least one match are returned
pub fn search_transactions<S: AsRef<str>>(
    transactions: &[Transaction],
    patterns: &[S],
) -> Vec<RecordMatches> {
    let automaton = PatternAutomaton::from_patterns(patterns);
    scan_records(&automaton, transactions, 0)
}

/// Scan a slice of records, reporting indices offset by `base_index`
pub(crate) fn scan_records(
    automaton: &PatternAutomaton,
    transactions: &[Transaction],
    base_index: usize,
) -> Vec<RecordMatches> {
    transactions
        .iter()
        .enumerate()
        .filter_map(|(local, tx)| {
            let patterns = automaton.matched_patterns(tx.text());
            if patterns.is_empty() {
                None
            } else {
                Some(RecordMatches {
                    index: base_index + local,
                    patterns,
                })
            }
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionType;
    use chrono::NaiveDate;

    fn naive_count(text: &str, patterns: &[&str]) -> usize {
        let lower: Vec<char> = text.to_lowercase().chars().collect();
        patterns
            .iter()
            .map(|p| {
                let p: Vec<char> = p.to_lowercase().chars().collect();
                if p.is_empty() || p.len() > lower.len() {
                    return 0;
                }
                lower.windows(p.len()).filter(|w| *w == p.as_slice()).count()
            })
            .sum()
    }

    #[test]
    fn test_nested_suffix_patterns() {
        let ac = PatternAutomaton::from_patterns(["netflix", "flix"]);
        let matches = ac.find_matches("mi pago netflix mensual");

        let netflix = matches.iter().find(|m| m.pattern == "netflix").unwrap();
        let flix = matches.iter().find(|m| m.pattern == "flix").unwrap();

        assert_eq!(netflix.start, 8);
        assert_eq!(netflix.end, 15);
        assert_eq!(flix.start, 11);
        assert_eq!(flix.end, netflix.end);
    }

    #[test]
    fn test_classic_he_she_his_hers() {
        let ac = PatternAutomaton::from_patterns(["he", "she", "his", "hers"]);
        let mut found: Vec<(String, usize, usize)> = ac
            .find_matches("ushers")
            .into_iter()
            .map(|m| (m.pattern, m.start, m.end))
            .collect();
        found.sort();

        assert_eq!(
            found,
            vec![
                ("he".to_string(), 2, 4),
                ("hers".to_string(), 2, 6),
                ("she".to_string(), 1, 4),
            ]
        );
    }

    #[test]
    fn test_case_insensitive_and_trimmed_patterns() {
        let ac = PatternAutomaton::from_patterns(["  UBER  ", "Spotify"]);
        assert_eq!(ac.patterns(), &["uber".to_string(), "spotify".to_string()]);
        assert_eq!(ac.matched_patterns("UBER *TRIP / spotify premium"), vec!["uber", "spotify"]);
    }

    #[test]
    fn test_empty_inputs() {
        let mut ac = PatternAutomaton::new();
        ac.add_pattern("");
        ac.add_pattern("   ");
        assert!(ac.find_matches("anything").is_empty());
        assert!(!ac.contains("anything"));

        let ac = PatternAutomaton::from_patterns(["pago"]);
        assert!(ac.find_matches("").is_empty());
        assert!(!ac.contains(""));
    }

    #[test]
    fn test_duplicate_pattern_is_noop() {
        let ac = PatternAutomaton::from_patterns(["pago", "PAGO", "pago "]);
        assert_eq!(ac.stats().pattern_count, 1);
        assert_eq!(ac.count("pago pago"), 2);
    }

    #[test]
    fn test_contains_agrees_with_find_matches() {
        let ac = PatternAutomaton::from_patterns(["gas", "gasolina", "luz", "agua"]);
        for text in ["", "gasolinera", "pago de luz", "nada", "aguacate", "g a s"] {
            assert_eq!(ac.contains(text), !ac.find_matches(text).is_empty(), "text {:?}", text);
        }
    }

    #[test]
    fn test_build_is_idempotent() {
        let ac = PatternAutomaton::from_patterns(["abc", "bc", "c", "abcd"]);
        let text = "xabcdabcx";
        let first = ac.find_matches(text);
        ac.build();
        ac.build();
        assert_eq!(ac.find_matches(text), first);
    }

    #[test]
    fn test_adding_pattern_after_build_rebuilds() {
        let mut ac = PatternAutomaton::from_patterns(["netflix"]);
        assert!(ac.is_built());

        ac.add_pattern("flix");
        assert!(!ac.is_built());
        assert_eq!(ac.count("netflix"), 2);
        assert!(ac.is_built());
    }

    #[test]
    fn test_counts_match_naive_search() {
        let patterns = ["a", "aa", "aba", "ba", "bab", "abab"];
        let ac = PatternAutomaton::from_patterns(patterns);
        for text in ["abababa", "aaaa", "babbab", "xyz", "AbAbAa"] {
            assert_eq!(ac.count(text), naive_count(text, &patterns), "text {:?}", text);
        }
    }

    #[test]
    fn test_unicode_positions_are_char_based() {
        let ac = PatternAutomaton::from_patterns(["educación"]);
        let matches = ac.find_matches("pago educación ñ");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].start, 5);
        assert_eq!(matches[0].end, 14);
    }

    #[test]
    fn test_replace_and_highlight() {
        let ac = PatternAutomaton::from_patterns(["netflix", "flix", "pago"]);

        assert_eq!(ac.replace("Mi PAGO Netflix", "***"), "Mi *** ***");
        assert_eq!(
            ac.replace_with("pago netflix", |p| p.to_uppercase()),
            "PAGO NETFLIX"
        );
        assert_eq!(
            ac.highlight("Pago Netflix", |text, _| format!("[{}]", text)),
            "[Pago] [Netflix]"
        );
        assert_eq!(ac.replace("sin coincidencias", "x"), "sin coincidencias");
    }

    #[test]
    fn test_stats_and_clear() {
        let mut ac = PatternAutomaton::from_patterns(["ab", "abc", "x"]);
        let stats = ac.stats();
        assert_eq!(stats.pattern_count, 3);
        assert_eq!(stats.node_count, 5);
        assert_eq!(stats.max_depth, 3);
        assert!((stats.avg_pattern_length - 2.0).abs() < 1e-9);

        ac.clear();
        assert_eq!(ac.stats().pattern_count, 0);
        assert_eq!(ac.stats().node_count, 1);
        assert!(!ac.contains("abc"));
    }

    #[test]
    fn test_pattern_folds_like_scanned_text() {
        // Word-final sigma must fold the same way on both sides
        let ac = PatternAutomaton::from_patterns(["ΟΔΟΣ"]);
        assert_eq!(ac.patterns(), &["οδοσ".to_string()]);
        assert!(ac.contains("ΟΔΟΣ"));
        assert!(ac.contains("calle οδοσ 12"));

        let matches = ac.find_matches("calle ΟΔΟΣ");
        assert_eq!(matches.len(), 1);
        assert_eq!((matches[0].start, matches[0].end), (6, 10));
        assert_eq!(ac.highlight("calle ΟΔΟΣ", |original, _| format!("[{}]", original)), "calle [ΟΔΟΣ]");
    }

    #[test]
    fn test_transaction_pattern_matcher() {
        let ac = transaction_pattern_matcher();
        let found = ac.matched_patterns("Pago con tarjeta - Suscripcion Spotify");
        assert!(found.contains(&"pago".to_string()));
        assert!(found.contains(&"tarjeta".to_string()));
        assert!(found.contains(&"suscripcion".to_string()));
        assert!(found.contains(&"spotify".to_string()));
    }

    #[test]
    fn test_search_transactions() {
        let date = NaiveDate::from_ymd_opt(2025, 10, 5).unwrap();
        let txs = vec![
            Transaction::new(1, "Uber viaje", 120.0, date, TransactionType::Expense),
            Transaction::new(2, "Sueldo", 9000.0, date, TransactionType::Income),
            Transaction::new(3, "Netflix mensual", 199.0, date, TransactionType::Expense),
        ];

        let results = search_transactions(&txs, &["uber", "netflix"]);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], RecordMatches { index: 0, patterns: vec!["uber".to_string()] });
        assert_eq!(results[1], RecordMatches { index: 2, patterns: vec!["netflix".to_string()] });
    }
}
