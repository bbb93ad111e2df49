//! Error taxonomy for a scrape-and-publish run.
//!
//! Each stage returns its own error type so the caller can decide how far a
//! failure reaches:
//!
//! | Error | Scope |
//! |-------|-------|
//! | [`CredentialsError`] | fatal, raised before any network call |
//! | [`FetchError`], [`StructureError`] | one page; a failed day becomes an empty day |
//! | [`ListingError`] | fatal, the index page URL cannot be determined |
//! | [`NormalizeError`] | fatal, a row does not match the table column contract |
//! | [`ValidationError`] | blocks publication, previous document stays in place |
//! | [`PersistenceError`] | fatal, snapshot or document could not be written |
//!
//! [`RunError`] wraps all of them for the binary.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Authentication values are missing or were refused by the listing service.
#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("{0} is not set (pass it on the command line, in .env or in the environment)")]
    Missing(&'static str),
    #[error("the listing service rejected the supplied credentials")]
    Rejected,
}

/// A single page could not be retrieved.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("could not build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    /// Classify a reqwest error raised while talking to `url`.
    pub fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else if let Some(status) = source.status() {
            FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                source,
            }
        }
    }
}

/// The page was fetched but does not have the expected HTML layout.
#[derive(Debug, Error)]
#[error("expected `{selector}` on {url} but it is missing (site layout changed?)")]
pub struct StructureError {
    pub url: String,
    pub selector: &'static str,
}

/// Failure while scraping one page.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Structure(#[from] StructureError),
}

/// Failure while asking the listing service for the day-index page.
#[derive(Debug, Error)]
pub enum ListingError {
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("listing service returned malformed JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("no posting titled {0:?} in the listing")]
    SectionNotFound(String),
    #[error("posting {title:?} has an unusable url {url:?}: {source}")]
    BadUrl {
        title: String,
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// A raw row does not match the fixed column layout.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("row {row} of {day:?} has {found} cells, expected {expected}")]
    RowWidth {
        day: String,
        row: usize,
        expected: usize,
        found: usize,
    },
}

/// One failed schema constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// JSON pointer to the offending value, e.g. `/substitution/0/date`.
    pub path: String,
    /// Keyword that failed (`required`, `type`, ...).
    pub constraint: &'static str,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "{path}: {} ({})", self.message, self.constraint)
    }
}

/// The canonical document does not satisfy the schema.
#[derive(Debug, Error)]
#[error("document failed schema validation with {} violation(s); first: {}", .violations.len(), first_violation(.violations))]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

fn first_violation(violations: &[Violation]) -> String {
    violations
        .first()
        .map(ToString::to_string)
        .unwrap_or_else(|| "none".to_string())
}

/// The schema itself cannot be used.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("cannot read schema {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("schema is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("schema at {path} is invalid: {message}")]
    Invalid { path: String, message: String },
}

/// Snapshot or document file could not be written.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("cannot write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Configuration file or values are unusable.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config {} is not valid YAML: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid index url {url:?}: {source}")]
    IndexUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Everything that ends a run without a definitive changed/unchanged outcome.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    #[error(transparent)]
    Http(#[from] FetchError),
    #[error(transparent)]
    Listing(#[from] ListingError),
    #[error("day index unavailable: {0}")]
    DayIndex(#[from] ScrapeError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("publication blocked: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl RunError {
    /// Short category name used in logs.
    pub fn category(&self) -> &'static str {
        match self {
            RunError::Config(_) => "config",
            RunError::Credentials(_) => "credentials",
            RunError::Http(_) => "http",
            RunError::Listing(_) => "listing",
            RunError::DayIndex(_) => "day_index",
            RunError::Normalize(_) => "normalize",
            RunError::Schema(_) => "schema",
            RunError::Validation(_) => "validation",
            RunError::Persistence(_) => "persistence",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_mentions_first_violation() {
        let err = ValidationError {
            violations: vec![Violation {
                path: "/substitution/0/date".to_string(),
                constraint: "required",
                message: "missing required property \"date\"".to_string(),
            }],
        };
        let text = err.to_string();
        assert!(text.contains("1 violation"));
        assert!(text.contains("/substitution/0/date"));
    }

    #[test]
    fn test_root_violation_path_displays_slash() {
        let v = Violation {
            path: String::new(),
            constraint: "type",
            message: "expected object".to_string(),
        };
        assert_eq!(v.to_string(), "/: expected object (type)");
    }

    #[test]
    fn test_run_error_category() {
        let err: RunError = CredentialsError::Missing("DSB_USERNAME").into();
        assert_eq!(err.category(), "credentials");
        let err: RunError = ValidationError { violations: vec![] }.into();
        assert_eq!(err.category(), "validation");
    }
}
