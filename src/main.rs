use anyhow::{anyhow, Context, Result};
use bulkimport::{
    config::Config,
    submit::HttpSubmitter,
    ImportProgress, Importer,
};
use clap::Parser;
use std::{path::PathBuf, sync::Arc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

#[derive(Parser)]
#[command(author, version, about = "Bulk import rows from a CSV file into the evaluation API")]
struct Args {
    /// Rule set name, e.g. enrollment_import
    #[arg(short, long)]
    rules: String,
    /// CSV file with a header row
    #[arg(short, long)]
    input: PathBuf,
    /// YAML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Endpoint each row is POSTed to
    #[arg(long)]
    endpoint: Option<Url>,
    #[arg(long)]
    batch_size: Option<usize>,
    #[arg(long)]
    concurrency: Option<usize>,
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Print the final report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // ─── 2) settings: file, then flags ───────────────────────────────
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env(),
    };
    if let Some(endpoint) = args.endpoint.clone() {
        config.endpoint = Some(endpoint);
    }
    if let Some(n) = args.batch_size {
        config.batch_size = n;
    }
    if let Some(n) = args.concurrency {
        config.concurrency_per_batch = n;
    }
    if let Some(secs) = args.timeout_secs {
        config.submit_timeout_secs = secs;
    }

    let rules = config.rule_set(&args.rules).ok_or_else(|| {
        anyhow!(
            "unknown rule set '{}'; available: {}",
            args.rules,
            config.rule_set_names().join(", ")
        )
    })?;
    let endpoint = config
        .endpoint
        .clone()
        .context("no endpoint configured; pass --endpoint or set it in the config file")?;
    let settings = config.import_settings();

    let raw = tokio::fs::read_to_string(&args.input)
        .await
        .with_context(|| format!("reading {}", args.input.display()))?;

    // ─── 3) wire up submission, progress and Ctrl-C ──────────────────
    let submitter = HttpSubmitter::new(endpoint, config.auth_token.clone(), settings.submit_timeout)?;
    info!(endpoint = %submitter.endpoint(), rule_set = %rules.name, "importing {}", args.input.display());

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; finishing current batch");
                cancel.cancel();
            }
        }
    });

    let (tx, mut rx) = mpsc::channel::<ImportProgress>(16);
    let printer = tokio::spawn(async move {
        while let Some(p) = rx.recv().await {
            eprintln!(
                "batch {}/{}: {} succeeded, {} failed, {} rejected",
                p.batches_done(),
                p.batches_total,
                p.succeeded,
                p.failed,
                p.rejected
            );
        }
    });

    let importer = Importer::new(Arc::new(submitter), settings).with_progress(tx);
    let result = importer.run(&raw, &rules, &cancel).await;
    // drop the sender so the printer drains and exits
    drop(importer);
    let _ = printer.await;

    // ─── 4) report ───────────────────────────────────────────────────
    let report = result.with_context(|| format!("import of {} aborted", args.input.display()))?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}
