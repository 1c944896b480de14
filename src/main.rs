use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

use txn_analysis::{
    benchmark_duplicate_detection, compare_search_performance, detect_duplicates_parallel,
    load_csv, search_transactions, DetectionConfig, DuplicateDetector, DuplicateStats,
    ParallelOptions, Transaction,
};

const USAGE: &str = "\
Usage:
  txn-analysis scan <csv> <pattern>...
  txn-analysis dedup <csv> [--config <file>] [--mode exhaustive|blocked|parallel] [--chunk-size <n>] [--concurrency <n>]
  txn-analysis group <csv> [--config <file>]
  txn-analysis bench <csv> [--chunk-size <n>] [--concurrency <n>] [<pattern>...]";

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries JSON only
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("scan") => run_scan(&args[1..]),
        Some("dedup") => run_dedup(&args[1..]),
        Some("group") => run_group(&args[1..]),
        Some("bench") => run_bench(&args[1..]),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

/// Flags shared by the subcommands
#[derive(Debug, Default)]
struct Flags {
    positional: Vec<String>,
    config: Option<String>,
    mode: Option<String>,
    chunk_size: Option<usize>,
    concurrency: Option<usize>,
}

fn parse_flags(args: &[String]) -> Result<Flags> {
    let mut flags = Flags::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        let mut value = |name: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| anyhow!("{} requires a value", name))
        };

        match arg.as_str() {
            "--config" => flags.config = Some(value("--config")?),
            "--mode" => flags.mode = Some(value("--mode")?),
            "--chunk-size" => {
                flags.chunk_size = Some(parse_count("--chunk-size", &value("--chunk-size")?)?)
            }
            "--concurrency" => {
                flags.concurrency = Some(parse_count("--concurrency", &value("--concurrency")?)?)
            }
            other if other.starts_with("--") => bail!("Unknown flag: {}\n{}", other, USAGE),
            other => flags.positional.push(other.to_string()),
        }
    }

    Ok(flags)
}

fn parse_count(flag: &str, raw: &str) -> Result<usize> {
    raw.parse()
        .with_context(|| format!("Invalid {}: {}", flag, raw))
}

/// Parallel settings from the command line; `None` unless `parallel` is set
fn parallel_options(flags: &Flags, parallel: bool) -> Result<Option<ParallelOptions>> {
    if !parallel {
        if flags.chunk_size.is_some() || flags.concurrency.is_some() {
            bail!("--chunk-size and --concurrency only apply to --mode parallel");
        }
        return Ok(None);
    }

    let mut options = ParallelOptions::default();
    if let Some(size) = flags.chunk_size {
        options.chunk_size = size;
    }
    if let Some(concurrency) = flags.concurrency {
        options.max_concurrency = concurrency;
    }
    options.validate()?;
    Ok(Some(options))
}

fn load_records(flags: &Flags) -> Result<Vec<Transaction>> {
    let csv_path = flags
        .positional
        .first()
        .ok_or_else(|| anyhow!("Missing CSV path\n{}", USAGE))?;

    info!("📂 Loading {}", csv_path);
    let transactions = load_csv(Path::new(csv_path))?;
    info!("✓ Loaded {} transactions", transactions.len());
    Ok(transactions)
}

fn load_detector(flags: &Flags) -> Result<DuplicateDetector> {
    let config = match &flags.config {
        Some(path) => DetectionConfig::from_file(path)?,
        None => DetectionConfig::default(),
    };
    Ok(DuplicateDetector::new(config)?)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_scan(args: &[String]) -> Result<()> {
    let flags = parse_flags(args)?;
    let transactions = load_records(&flags)?;
    let patterns = &flags.positional[1..];
    if patterns.is_empty() {
        bail!("scan needs at least one pattern\n{}", USAGE);
    }

    info!("🔍 Scanning for {} patterns", patterns.len());
    let results = search_transactions(&transactions, patterns);
    info!("✓ {} transactions matched", results.len());

    print_json(&results)
}

fn run_dedup(args: &[String]) -> Result<()> {
    let flags = parse_flags(args)?;
    let transactions = load_records(&flags)?;
    let detector = load_detector(&flags)?;

    let mode = flags.mode.as_deref().unwrap_or("exhaustive");
    info!("🔁 Detecting duplicates ({} mode)", mode);

    let options = parallel_options(&flags, mode == "parallel")?;

    let duplicates = match (mode, options) {
        ("exhaustive", _) => detector.detect_duplicates(&transactions),
        ("blocked", _) => detector.detect_duplicates_optimized(&transactions),
        ("parallel", Some(options)) => {
            detect_duplicates_parallel(&detector, &transactions, &options, None)?
        }
        (other, _) => bail!("Unknown mode: {} (expected exhaustive, blocked or parallel)", other),
    };

    let stats = DuplicateStats::from_matches(&duplicates);
    info!("✓ {}", stats.summary());

    print_json(&serde_json::json!({
        "stats": stats,
        "duplicates": duplicates,
    }))
}

fn run_group(args: &[String]) -> Result<()> {
    let flags = parse_flags(args)?;
    let transactions = load_records(&flags)?;
    let detector = load_detector(&flags)?;

    info!("🧩 Grouping duplicates");
    let groups = detector.group_duplicates(&transactions);
    info!("✓ {} duplicate groups", groups.len());

    print_json(&groups)
}

fn run_bench(args: &[String]) -> Result<()> {
    let flags = parse_flags(args)?;
    let transactions = load_records(&flags)?;
    let detector = load_detector(&flags)?;

    let mut patterns: Vec<String> = flags.positional[1..].to_vec();
    if patterns.is_empty() {
        patterns = txn_analysis::automaton::COMMON_TRANSACTION_PATTERNS
            .iter()
            .map(|p| p.to_string())
            .collect();
    }

    let corpus = transactions
        .iter()
        .map(Transaction::text)
        .collect::<Vec<_>>()
        .join("\n");

    info!("⏱️  Benchmarking search and duplicate detection");
    let search = compare_search_performance(&corpus, &patterns);
    let options = parallel_options(&flags, true)?.unwrap_or_default();
    let detection = benchmark_duplicate_detection(&detector, &transactions, &options)?;

    print_json(&serde_json::json!({
        "search": search,
        "detection": detection,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_flags() {
        let flags = parse_flags(&args(&[
            "records.csv", "--mode", "parallel", "--chunk-size", "50", "--concurrency", "2",
        ]))
        .unwrap();

        assert_eq!(flags.positional, vec!["records.csv".to_string()]);
        assert_eq!(flags.mode.as_deref(), Some("parallel"));
        assert_eq!(flags.chunk_size, Some(50));
        assert_eq!(flags.concurrency, Some(2));

        assert!(parse_flags(&args(&["--chunk-size", "many"])).is_err());
        assert!(parse_flags(&args(&["--concurrency"])).is_err());
        assert!(parse_flags(&args(&["--verbose"])).is_err());
    }

    #[test]
    fn test_parallel_flags_only_apply_to_parallel_mode() {
        let flags = parse_flags(&args(&["records.csv", "--chunk-size", "50"])).unwrap();
        assert!(parallel_options(&flags, false).is_err());

        let flags = parse_flags(&args(&["records.csv", "--concurrency", "2"])).unwrap();
        assert!(parallel_options(&flags, false).is_err());

        let plain = parse_flags(&args(&["records.csv"])).unwrap();
        assert!(parallel_options(&plain, false).unwrap().is_none());
    }

    #[test]
    fn test_parallel_options_from_flags() {
        let flags = parse_flags(&args(&["records.csv", "--chunk-size", "50", "--concurrency", "2"])).unwrap();
        assert_eq!(parallel_options(&flags, true).unwrap(), Some(ParallelOptions::new(50, 2)));

        let defaults = parse_flags(&args(&["records.csv"])).unwrap();
        assert_eq!(parallel_options(&defaults, true).unwrap(), Some(ParallelOptions::default()));

        let zero = parse_flags(&args(&["records.csv", "--concurrency", "0"])).unwrap();
        assert!(parallel_options(&zero, true).is_err());
    }
}
