//! # DSB Substitutions
//!
//! Scrapes the substitution plan a school publishes through DSBmobile,
//! extracts the rows of one class and publishes them as a single canonical
//! JSON document for downstream consumers.
//!
//! ## Features
//!
//! - Finds the day-index page through the DSBmobile listing service, or starts
//!   from a fixed `--index-url`
//! - Extracts the target class's block (including continuation rows) from every
//!   day page, fetching days concurrently
//! - Skips normalization and publication when the raw scrape is unchanged since
//!   the last run
//! - Validates the document against a JSON Schema before it replaces the
//!   published file
//!
//! ## Usage
//!
//! ```sh
//! DSB_USERNAME=123456 DSB_PASSWORD=secret dsb_substitutions -c MSS12 -o json/formatted.json
//! ```
//!
//! ## Architecture
//!
//! 1. **Listing**: authenticate and look up the day-index posting
//! 2. **Indexing**: resolve the day pages from the index
//! 3. **Extraction**: pull the class block from each day page
//! 4. **Change gate**: compare with the last raw snapshot
//! 5. **Output**: normalize, validate and publish `formatted.json`

use clap::Parser;
use std::error::Error;
use std::time::Instant;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};
use url::Url;

mod cli;
mod config;
mod dsb;
mod error;
mod fetch;
mod models;
mod normalize;
mod outputs;
mod pipeline;
mod schema;
mod scrapers;
mod utils;

use cli::Cli;
use config::{Credentials, FileConfig, Settings};
use dsb::{API_BASE, DsbClient};
use error::RunError;
use fetch::HttpFetcher;
use pipeline::{Pipeline, RunOutcome};
use schema::Schema;
use utils::ensure_writable_parent;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Credentials may live in .env; a missing file is fine.
    let _ = dotenvy::dotenv();
    let args = Cli::parse();

    // --- Tracing init ---
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_filter()));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = Instant::now();
    info!("dsb_substitutions starting up");

    match run(&args).await {
        Ok(outcome) => {
            let elapsed = start_time.elapsed();
            match &outcome {
                RunOutcome::Unchanged => {
                    info!(elapsed_secs = elapsed.as_secs_f64(), "Run finished; nothing to publish")
                }
                RunOutcome::Published(doc) => info!(
                    elapsed_secs = elapsed.as_secs_f64(),
                    days = doc.substitution.len(),
                    items = doc.item_count(),
                    "Run finished; document published"
                ),
            }
            Ok(())
        }
        Err(e) => {
            error!(category = e.category(), error = %e, "Run failed");
            Err(e.into())
        }
    }
}

/// Resolve settings, find the index page and run the pipeline once.
async fn run(args: &Cli) -> Result<RunOutcome, RunError> {
    let file_config = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = Settings::resolve(args, file_config)?;
    debug!(?settings, "Resolved settings");

    // Fail on missing credentials before touching the network.
    let credentials = match settings.index_url {
        Some(_) => None,
        None => Some(Credentials::from_parts(
            args.username.as_deref(),
            args.password.as_deref(),
        )?),
    };

    let schema = Schema::load(settings.schema_file.as_deref())?;
    ensure_writable_parent(&settings.raw_file).await?;
    ensure_writable_parent(&settings.output).await?;

    let fetcher = HttpFetcher::new(settings.timeout)?;
    let index_url = resolve_index_url(&settings, &fetcher, credentials.as_ref()).await?;
    info!(%index_url, course = %settings.course, "Using day index");

    let outcome = Pipeline::new(&settings, &fetcher, &schema)
        .run(&index_url)
        .await?;

    if settings.print_output {
        if let RunOutcome::Published(doc) = &outcome {
            println!("{}", outputs::json::render(doc)?);
        }
    }
    Ok(outcome)
}

async fn resolve_index_url(
    settings: &Settings,
    fetcher: &HttpFetcher,
    credentials: Option<&Credentials>,
) -> Result<Url, RunError> {
    if let Some(url) = &settings.index_url {
        return Ok(url.clone());
    }
    let credentials = credentials.ok_or(error::CredentialsError::Missing("DSB_USERNAME"))?;
    let client = DsbClient::authenticate(fetcher.client().clone(), API_BASE, credentials).await?;
    Ok(client.section_url(&settings.section).await?)
}
