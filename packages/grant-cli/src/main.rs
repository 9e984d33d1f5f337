//! grant-seeker: find, extract and rank grant opportunities.

mod config;

use std::num::NonZeroU32;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use grant_extraction::extract::normalize::{normalize_demographic, normalize_funding_type};
use grant_extraction::{
    discover_variants, BatchReport, Cache, CandidateUrl, Credentials, DocumentFetcher,
    FileBackend, GrantRecord, OpenAiModel, Orchestrator, PageFetcher, ResultFilters,
    RetrievalChain, RetrieverExt, TavilyDiscovery, TavilyExtract,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, Overrides};

/// Hosted extraction is quota-bound; keep well under its request limit.
const HOSTED_REQUESTS_PER_SECOND: NonZeroU32 = match NonZeroU32::new(5) {
    Some(rate) => rate,
    None => panic!("rate must be non-zero"),
};

#[derive(Parser)]
#[command(name = "grant-seeker", version, about = "Find, extract and rank grant opportunities")]
struct Cli {
    #[command(flatten)]
    settings: Overrides,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search for grant pages, then extract and rank them
    Search {
        query: String,

        /// Additional phrasings searched after the main query
        #[arg(long = "variant")]
        variants: Vec<String>,

        /// Candidates requested per query
        #[arg(long, default_value_t = 10)]
        limit: usize,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Extract and rank grants from URLs, best candidate first
    Extract {
        #[arg(required = true)]
        urls: Vec<String>,

        /// Query used to score fit
        #[arg(long)]
        query: Option<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Remove expired cache entries
    PurgeCache,

    /// Remove every cache entry
    ClearCache,
}

#[derive(Debug, Args)]
struct OutputArgs {
    /// Keep grants focused on this demographic (repeatable)
    #[arg(long = "demographic")]
    demographics: Vec<String>,

    /// Keep grants of this funding type (repeatable)
    #[arg(long = "funding-type")]
    funding_types: Vec<String>,

    /// Keep grants whose geography mentions this region
    #[arg(long)]
    geography: Option<String>,

    /// Drop grants whose deadline has passed
    #[arg(long)]
    open_only: bool,

    /// Print the batch report as JSON
    #[arg(long)]
    json: bool,
}

impl OutputArgs {
    fn filters(&self, today: NaiveDate) -> Result<ResultFilters> {
        let demographics = self
            .demographics
            .iter()
            .map(|raw| normalize_demographic(raw).with_context(|| format!("Unknown demographic `{raw}`")))
            .collect::<Result<Vec<_>>>()?;

        let funding_types = self
            .funding_types
            .iter()
            .map(|raw| {
                normalize_funding_type(raw)
                    .value()
                    .cloned()
                    .with_context(|| format!("Unknown funding type `{raw}`"))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut filters = ResultFilters::new()
            .with_demographics(demographics)
            .with_funding_types(funding_types);
        if let Some(geography) = &self.geography {
            filters = filters.with_geography(geography.clone());
        }
        if self.open_only {
            filters = filters.excluding_expired(today);
        }
        Ok(filters)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so --json output stays parseable
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,grant_extraction=debug".into()),
        )
        .with(
            fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?.with_overrides(&cli.settings);
    config.validate()?;

    let backend = FileBackend::open(config.cache_dir.clone())
        .await
        .with_context(|| format!("Failed to open cache at {}", config.cache_dir.display()))?;
    let cache = Arc::new(Cache::new(backend));

    match cli.command {
        Command::PurgeCache => {
            let removed = cache.purge_expired().await.context("Failed to purge cache")?;
            println!("{} {} expired entries", "Purged".green(), removed);
        }
        Command::ClearCache => {
            let removed = cache.clear().await.context("Failed to clear cache")?;
            println!("{} {} entries", "Cleared".green(), removed);
        }
        Command::Search {
            query,
            variants,
            limit,
            output,
        } => {
            let credentials = Credentials::from_env().context("Search needs API credentials")?;
            let orchestrator = build_orchestrator(&config, &credentials, cache)?;

            let discovery = TavilyDiscovery::new(credentials.tavily_api_key.clone())?;
            let queries: Vec<&str> = std::iter::once(query.as_str())
                .chain(variants.iter().map(String::as_str))
                .collect();
            let candidates = discover_variants(&discovery, &queries, limit).await;
            info!(query = %query, candidates = candidates.len(), "discovery complete");

            if candidates.is_empty() {
                println!("{}", "No candidate pages found.".yellow());
                return Ok(());
            }
            run_batch(&orchestrator, candidates, Some(&query), &output).await?;
        }
        Command::Extract { urls, query, output } => {
            let credentials = Credentials::from_env().context("Extraction needs API credentials")?;
            let orchestrator = build_orchestrator(&config, &credentials, cache)?;
            run_batch(&orchestrator, CandidateUrl::ranked(urls), query.as_deref(), &output).await?;
        }
    }

    Ok(())
}

fn build_orchestrator(
    config: &Config,
    credentials: &Credentials,
    cache: Arc<Cache<FileBackend>>,
) -> Result<Orchestrator<OpenAiModel, FileBackend>> {
    let chain = RetrievalChain::new()
        .with_strategy(
            TavilyExtract::new(credentials.tavily_api_key.clone())?
                .rate_limited(HOSTED_REQUESTS_PER_SECOND),
        )
        .with_strategy(PageFetcher::new()?)
        .with_strategy(DocumentFetcher::new()?);

    let model = OpenAiModel::new(credentials.openai_api_key.clone(), config.model.clone())?;

    Orchestrator::new(config.pipeline.clone(), chain, model, cache)
        .context("Failed to build extraction pipeline")
}

async fn run_batch(
    orchestrator: &Orchestrator<OpenAiModel, FileBackend>,
    candidates: Vec<CandidateUrl>,
    query: Option<&str>,
    output: &OutputArgs,
) -> Result<()> {
    let filters = output.filters(Utc::now().date_naive())?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling batch");
            on_interrupt.cancel();
        }
    });

    let mut report = orchestrator
        .run_until_cancelled(candidates, query, cancel)
        .await
        .context("Batch did not complete")?;
    report.records = filters.apply(std::mem::take(&mut report.records));

    if output.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &BatchReport) {
    if report.records.is_empty() {
        println!("{}", "No viable grants found.".yellow());
    }

    for (index, record) in report.records.iter().enumerate() {
        print_record(index + 1, record);
    }

    println!();
    println!(
        "{} processed, {} from cache, {} rejected, {} failed",
        report.items.len(),
        report.cache_hits(),
        report.rejected(),
        report.failed().count()
    );
    for item in report.failed() {
        let reason = item
            .failure
            .as_ref()
            .map(|f| f.to_string())
            .unwrap_or_else(|| "unknown failure".to_string());
        println!("  {} {} {}", "✗".red(), item.url, reason.dimmed());
    }
    if !report.duplicates.is_empty() {
        println!("  {} duplicate URLs skipped", report.duplicates.len());
    }
    if !report.abandoned.is_empty() {
        println!(
            "  {} URLs over the batch limit were not processed",
            report.abandoned.len()
        );
    }
}

fn print_record(position: usize, record: &GrantRecord) {
    println!();
    println!(
        "{} {}",
        format!("{position:>2}.").bright_cyan(),
        record.title_text().unwrap_or("(untitled)").bold()
    );

    if let Some(score) = record.rank_score.value() {
        println!("    {} {:.2}", "score".dimmed(), score);
    }
    if let Some(funder) = record.funder.value() {
        println!("    {} {}", "funder".dimmed(), funder);
    }
    if let Some(amount) = record.amount.value() {
        println!("    {} {}", "amount".dimmed(), amount);
    }
    if let Some(deadline) = record.deadline.value() {
        println!("    {} {}", "deadline".dimmed(), deadline);
    }
    if let Some(funding_type) = record.funding_type.value() {
        println!("    {} {}", "type".dimmed(), funding_type);
    }
    if let Some(geography) = record.geography.value() {
        println!("    {} {}", "where".dimmed(), geography);
    }
    println!("    {}", record.source_url.bright_blue());
}
