use anyhow::{anyhow, Context, Result};
use bulkimport::{
    config::Config,
    parse,
    rules::validate::validate_all,
};
use clap::Parser;
use std::{fs, path::PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Parse and validate a CSV file without submitting anything.
#[derive(Parser)]
#[command(author, version, about = "Dry-run validation of a bulk import file")]
struct Args {
    #[arg(short, long)]
    rules: String,
    #[arg(short, long)]
    input: PathBuf,
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env).init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let rules = config
        .rule_set(&args.rules)
        .ok_or_else(|| anyhow!("unknown rule set '{}'", args.rules))?;

    let raw = fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let parsed = parse(&raw, &rules.required_columns())
        .with_context(|| format!("parsing {}", args.input.display()))?;
    let rows = validate_all(&parsed, &rules);

    let mut valid = 0;
    for row in &rows {
        if row.verdict.is_valid() {
            valid += 1;
        } else {
            println!("line {}: {}", row.line, row.verdict.reasons().join("; "));
        }
    }
    info!(rows = rows.len(), valid, rejected = rows.len() - valid, "checked {}", args.input.display());
    println!("{valid} of {} rows would be submitted", rows.len());
    Ok(())
}
