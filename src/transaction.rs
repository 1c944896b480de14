// 💳 Transaction Records - Input owned by the caller
// Records arrive from the persistence layer or a CSV export; the core never mutates them.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

// ============================================================================
// TRANSACTION TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money coming in
    #[serde(alias = "ingreso", alias = "INGRESO")]
    Income,

    /// Money going out
    #[serde(alias = "gasto", alias = "GASTO")]
    Expense,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Income => "income",
            TransactionType::Expense => "expense",
        }
    }
}

// ============================================================================
// TRANSACTION
// ============================================================================

/// A single transaction as supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique id assigned by the persistence layer
    pub id: i64,

    /// Free-text description (personal accounts)
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Free-text concept (company accounts), used when description is missing
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept: Option<String>,

    /// Signed amount
    pub amount: f64,

    /// Business date (YYYY-MM-DD)
    pub date: NaiveDate,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
}

impl Transaction {
    pub fn new(
        id: i64,
        description: &str,
        amount: f64,
        date: NaiveDate,
        transaction_type: TransactionType,
    ) -> Self {
        Transaction {
            id,
            description: Some(description.to_string()),
            concept: None,
            amount,
            date,
            category: None,
            transaction_type,
        }
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    /// Text used for matching: description, falling back to concept
    pub fn text(&self) -> &str {
        [self.description.as_deref(), self.concept.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .unwrap_or("")
    }

    /// Category with empty strings treated as absent
    pub fn category(&self) -> Option<&str> {
        self.category.as_deref().filter(|c| !c.is_empty())
    }
}

/// Canonical key for an unordered pair of transactions
pub fn pair_key(a: &Transaction, b: &Transaction) -> (i64, i64) {
    (a.id.min(b.id), a.id.max(b.id))
}

// ============================================================================
// CSV LOADING
// ============================================================================

/// Load transactions from a CSV file with columns
/// `id,description,concept,amount,date,category,type`
pub fn load_csv(csv_path: &Path) -> Result<Vec<Transaction>> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open CSV file: {:?}", csv_path))?;
    read_csv(file)
}

/// Read transactions from any CSV source
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<Transaction>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut transactions = Vec::new();

    for (line, result) in rdr.deserialize().enumerate() {
        let transaction: Transaction = result
            .with_context(|| format!("Failed to deserialize transaction at record {}", line + 1))?;
        transactions.push(transaction);
    }

    Ok(transactions)
}

// ============================================================================
// TESTS
// ============================================================================
