//! DSBmobile posting-listing client.
//!
//! The listing service hands out an auth token for a username/password pair
//! and, with that token, lists the postings of the school account. One of
//! those postings (by default the one titled `DaVinci Touch`) links to the
//! day-index page the scrapers start from.
//!
//! The service answers bad credentials with HTTP 200 and the body `""`, so
//! rejection is detected from the body rather than the status code.

use crate::config::Credentials;
use crate::error::{CredentialsError, ListingError};
use crate::fetch::get_text;
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

/// Production endpoint of the listing API.
pub const API_BASE: &str = "https://mobileapi.dsbcontrol.de";

const PREVIEW_BASE: &str = "https://light.dsbcontrol.de/DSBlightWebsite/Data/";
const BUNDLE_ID: &str = "de.heinekingmedia.dsbmobile";
const APP_VERSION: &str = "35";
const OS_VERSION: &str = "22";

/// One posting of the school account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub id: String,
    pub uploaded_date: String,
    pub title: String,
    pub url: String,
    pub preview_url: String,
}

#[derive(Debug, Deserialize)]
struct RawGroup {
    #[serde(rename = "Childs", default)]
    childs: Vec<RawPosting>,
}

#[derive(Debug, Deserialize)]
struct RawPosting {
    #[serde(rename = "Id", default)]
    id: String,
    #[serde(rename = "Date", default)]
    date: String,
    #[serde(rename = "Title", default)]
    title: String,
    #[serde(rename = "Detail", default)]
    detail: String,
    #[serde(rename = "Preview", default)]
    preview: String,
}

/// Authenticated session against the listing API.
#[derive(Debug)]
pub struct DsbClient {
    client: reqwest::Client,
    base: String,
    token: String,
}

impl DsbClient {
    /// Exchange credentials for a token.
    #[instrument(level = "info", skip_all, fields(user = %credentials.username))]
    pub async fn authenticate(
        client: reqwest::Client,
        base: &str,
        credentials: &Credentials,
    ) -> Result<Self, ListingError> {
        let base = base.trim_end_matches('/').to_string();
        let body = get_text(
            &client,
            &format!("{base}/authid"),
            &[
                ("bundleid", BUNDLE_ID),
                ("appversion", APP_VERSION),
                ("osversion", OS_VERSION),
                ("pushid", ""),
                ("user", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ],
        )
        .await?;

        let token = parse_token(&body)?;
        info!("Authenticated against listing service");
        Ok(Self {
            client,
            base,
            token,
        })
    }

    /// All postings of the account, flattened across groups.
    #[instrument(level = "info", skip_all)]
    pub async fn postings(&self) -> Result<Vec<Posting>, ListingError> {
        let body = get_text(
            &self.client,
            &format!("{}/dsbdocuments", self.base),
            &[("authid", self.token.as_str())],
        )
        .await?;
        let postings = parse_postings(&body)?;
        info!(count = postings.len(), "Listed postings");
        Ok(postings)
    }

    /// URL of the posting titled `section`.
    pub async fn section_url(&self, section: &str) -> Result<Url, ListingError> {
        let postings = self.postings().await?;
        let posting = find_section(&postings, section)?;
        debug!(
            id = %posting.id,
            title = %posting.title,
            uploaded = %posting.uploaded_date,
            url = %posting.url,
            preview = %posting.preview_url,
            "Selected posting"
        );
        Url::parse(&posting.url).map_err(|source| ListingError::BadUrl {
            title: posting.title.clone(),
            url: posting.url.clone(),
            source,
        })
    }
}

/// Token from an `/authid` body; `""` means the credentials were refused.
pub fn parse_token(body: &str) -> Result<String, CredentialsError> {
    let token = body.trim().replace('"', "");
    if token.is_empty() {
        return Err(CredentialsError::Rejected);
    }
    Ok(token)
}

/// Flatten a `/dsbdocuments` body into postings.
pub fn parse_postings(body: &str) -> Result<Vec<Posting>, serde_json::Error> {
    let groups: Vec<RawGroup> = serde_json::from_str(body)?;
    Ok(groups
        .into_iter()
        .flat_map(|group| group.childs)
        .map(|raw| Posting {
            id: raw.id,
            uploaded_date: raw.date,
            title: raw.title,
            url: raw.detail,
            preview_url: format!("{PREVIEW_BASE}{}", raw.preview),
        })
        .collect())
}

/// First posting whose title equals `section`.
pub fn find_section<'a>(postings: &'a [Posting], section: &str) -> Result<&'a Posting, ListingError> {
    postings
        .iter()
        .find(|p| p.title == section)
        .ok_or_else(|| ListingError::SectionNotFound(section.to_string()))
}
