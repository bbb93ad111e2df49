//! Command-line interface definitions.
//!
//! Every option is optional on the command line: unset values fall back to the
//! YAML config file (`--config`) and then to built-in defaults, see
//! [`crate::config::Settings`]. Credentials can also come from `DSB_USERNAME` /
//! `DSB_PASSWORD`, including a `.env` file in the working directory.

use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Scrape the DSBmobile substitution plan for one class and publish it as JSON.
///
/// # Examples
///
/// ```sh
/// # Scrape the default class, log at info
/// dsb_substitutions
///
/// # Another class, debug logging, always re-publish
/// dsb_substitutions -v -c MSS11 --development
///
/// # Skip the listing service and start from a known index page
/// dsb_substitutions --index-url https://light.dsbcontrol.de/DSBlightWebsite/Data/x/index.html
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Class/course id whose rows are extracted (default: MSS12)
    #[arg(short, long)]
    pub course: Option<String>,

    /// Path of the published JSON document (default: json/formatted.json)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Path of the raw scrape snapshot used for change detection (default: json/scraped.json)
    #[arg(long)]
    pub raw_file: Option<PathBuf>,

    /// JSON schema to validate against instead of the built-in one
    #[arg(long)]
    pub schema_file: Option<PathBuf>,

    /// Continue to normalization and publication even when nothing changed
    #[arg(short, long)]
    pub development: bool,

    /// Print the published document to stdout
    #[arg(short, long)]
    pub print_output: bool,

    /// Optional path to a YAML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Day-index page URL; skips the listing service when given
    #[arg(long, env = "DSB_INDEX_URL")]
    pub index_url: Option<String>,

    /// Title of the posting that links to the day index (default: DaVinci Touch)
    #[arg(long)]
    pub section: Option<String>,

    /// Listing service username
    #[arg(long, env = "DSB_USERNAME")]
    pub username: Option<String>,

    /// Listing service password
    #[arg(long, env = "DSB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Per-request timeout in seconds (default: 10)
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Maximum number of day pages fetched at once (default: 4)
    #[arg(long)]
    pub concurrency: Option<usize>,
}

impl Cli {
    /// Default `EnvFilter` directives for the requested verbosity.
    ///
    /// Dependencies stay at `warn` so HTTP internals do not drown the run log.
    pub fn log_filter(&self) -> String {
        if self.quiet {
            return "error".to_string();
        }
        let level = match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        format!("warn,{}={}", env!("CARGO_CRATE_NAME"), level)
    }
}
