//! Run configuration.
//!
//! [`Settings`] is resolved once at startup and passed explicitly into each
//! pipeline stage. Values are taken from, in order of precedence:
//!
//! 1. command-line flags ([`Cli`])
//! 2. the YAML file named by `--config` ([`FileConfig`])
//! 3. the defaults below
//!
//! ```yaml
//! course: MSS11
//! output: /srv/dsb/formatted.json
//! raw_file: /srv/dsb/scraped.json
//! section: DaVinci Touch
//! timeout_secs: 15
//! concurrency: 2
//! ```

use crate::cli::Cli;
use crate::error::{ConfigError, CredentialsError};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

pub const DEFAULT_COURSE: &str = "MSS12";
pub const DEFAULT_OUTPUT: &str = "json/formatted.json";
pub const DEFAULT_RAW_FILE: &str = "json/scraped.json";
pub const DEFAULT_SECTION: &str = "DaVinci Touch";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Optional settings read from a YAML file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub course: Option<String>,
    pub output: Option<PathBuf>,
    pub raw_file: Option<PathBuf>,
    pub schema_file: Option<PathBuf>,
    pub development: Option<bool>,
    pub print_output: Option<bool>,
    pub index_url: Option<String>,
    pub section: Option<String>,
    pub timeout_secs: Option<u64>,
    pub concurrency: Option<usize>,
}

impl FileConfig {
    /// Load a YAML config file.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&text).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(?config, "Loaded config file");
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Class id matched against the first cell of each table row.
    pub course: String,
    pub output: PathBuf,
    pub raw_file: PathBuf,
    /// `None` selects the built-in schema.
    pub schema_file: Option<PathBuf>,
    /// Proceed past the change gate even when nothing changed.
    pub development: bool,
    pub print_output: bool,
    /// Known day-index page; `None` asks the listing service.
    pub index_url: Option<Url>,
    pub section: String,
    pub timeout: Duration,
    pub concurrency: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            course: DEFAULT_COURSE.to_string(),
            output: PathBuf::from(DEFAULT_OUTPUT),
            raw_file: PathBuf::from(DEFAULT_RAW_FILE),
            schema_file: None,
            development: false,
            print_output: false,
            index_url: None,
            section: DEFAULT_SECTION.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl Settings {
    /// Merge command-line flags over the config file over defaults.
    pub fn resolve(cli: &Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let defaults = Settings::default();

        let index_url = match cli.index_url.clone().or(file.index_url) {
            Some(raw) => Some(
                Url::parse(&raw).map_err(|source| ConfigError::IndexUrl { url: raw, source })?,
            ),
            None => None,
        };

        let timeout_secs = cli
            .timeout_secs
            .or(file.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::Zero("timeout_secs"));
        }

        let concurrency = cli
            .concurrency
            .or(file.concurrency)
            .unwrap_or(defaults.concurrency);
        if concurrency == 0 {
            return Err(ConfigError::Zero("concurrency"));
        }

        Ok(Self {
            course: cli.course.clone().or(file.course).unwrap_or(defaults.course),
            output: cli.output.clone().or(file.output).unwrap_or(defaults.output),
            raw_file: cli
                .raw_file
                .clone()
                .or(file.raw_file)
                .unwrap_or(defaults.raw_file),
            schema_file: cli.schema_file.clone().or(file.schema_file),
            development: cli.development || file.development.unwrap_or(false),
            print_output: cli.print_output || file.print_output.unwrap_or(false),
            index_url,
            section: cli.section.clone().or(file.section).unwrap_or(defaults.section),
            timeout: Duration::from_secs(timeout_secs),
            concurrency,
        })
    }
}

/// Listing service login.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Require both values to be present and non-blank.
    pub fn from_parts(
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self, CredentialsError> {
        let username = non_blank(username).ok_or(CredentialsError::Missing("DSB_USERNAME"))?;
        let password = non_blank(password).ok_or(CredentialsError::Missing("DSB_PASSWORD"))?;
        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["dsb_substitutions"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn test_defaults_when_nothing_given() {
        let settings = Settings::resolve(&cli(&[]), FileConfig::default()).unwrap();
        assert_eq!(settings.course, "MSS12");
        assert_eq!(settings.output, PathBuf::from("json/formatted.json"));
        assert_eq!(settings.raw_file, PathBuf::from("json/scraped.json"));
        assert_eq!(settings.section, "DaVinci Touch");
        assert_eq!(settings.timeout, Duration::from_secs(10));
        assert_eq!(settings.concurrency, 4);
        assert!(!settings.development);
    }

    #[test]
    fn test_cli_overrides_file_overrides_default() {
        let file = FileConfig::parse(
            "course: MSS11\nsection: Vertretung\ntimeout_secs: 20\nconcurrency: 2\n",
        )
        .unwrap();
        let settings = Settings::resolve(&cli(&["-c", "MSS13"]), file).unwrap();
        assert_eq!(settings.course, "MSS13");
        assert_eq!(settings.section, "Vertretung");
        assert_eq!(settings.timeout, Duration::from_secs(20));
        assert_eq!(settings.concurrency, 2);
    }

    #[test]
    fn test_print_output_from_flag_or_file() {
        let settings = Settings::resolve(&cli(&["-p"]), FileConfig::default()).unwrap();
        assert!(settings.print_output);

        let file = FileConfig::parse("print_output: true\n").unwrap();
        let settings = Settings::resolve(&cli(&[]), file).unwrap();
        assert!(settings.print_output);

        let settings = Settings::resolve(&cli(&[]), FileConfig::default()).unwrap();
        assert!(!settings.print_output);
    }

    #[test]
    fn test_file_config_rejects_unknown_keys() {
        assert!(FileConfig::parse("cours: MSS11\n").is_err());
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let res = Settings::resolve(&cli(&["--concurrency", "0"]), FileConfig::default());
        assert!(matches!(res, Err(ConfigError::Zero("concurrency"))));
    }

    #[test]
    fn test_invalid_index_url_is_rejected() {
        let res = Settings::resolve(&cli(&["--index-url", "not a url"]), FileConfig::default());
        assert!(matches!(res, Err(ConfigError::IndexUrl { .. })));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let res = FileConfig::load(&dir.path().join("nope.yaml"));
        assert!(matches!(res, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_credentials_require_both_values() {
        assert!(matches!(
            Credentials::from_parts(None, Some("pw")),
            Err(CredentialsError::Missing("DSB_USERNAME"))
        ));
        assert!(matches!(
            Credentials::from_parts(Some("123456"), Some("   ")),
            Err(CredentialsError::Missing("DSB_PASSWORD"))
        ));
        let ok = Credentials::from_parts(Some(" 123456 "), Some("pw")).unwrap();
        assert_eq!(ok.username, "123456");
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::from_parts(Some("123456"), Some("hunter2")).unwrap();
        let text = format!("{creds:?}");
        assert!(text.contains("123456"));
        assert!(!text.contains("hunter2"));
    }
}
