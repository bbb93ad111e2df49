//! Publication of the canonical document.
//!
//! The document is validated first and only then written, pretty-printed, by
//! atomic replace. A document that fails validation never reaches disk, so
//! the last successfully published file stays in place for readers.

use crate::error::{PersistenceError, RunError};
use crate::models::FormattedDocument;
use crate::schema::{self, Schema};
use crate::utils::write_atomic;
use std::path::Path;
use tracing::{info, instrument};

/// Serialize `document` the way it is published.
pub fn render(document: &FormattedDocument) -> Result<String, PersistenceError> {
    serde_json::to_string_pretty(document).map_err(|source| PersistenceError::Serialize {
        what: "document",
        source,
    })
}

/// Write `document` to `path` without validation.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_document(document: &FormattedDocument, path: &Path) -> Result<(), PersistenceError> {
    let json = render(document)?;
    write_atomic(path, json.as_bytes()).await?;
    info!(
        days = document.substitution.len(),
        items = document.item_count(),
        "Published document"
    );
    Ok(())
}

/// Validate `document` against `schema` and publish it to `path`.
///
/// # Errors
///
/// [`RunError::Validation`] when the schema rejects the document (nothing is
/// written), [`RunError::Persistence`] when the write fails.
pub async fn publish(
    document: &FormattedDocument,
    schema: &Schema,
    path: &Path,
) -> Result<(), RunError> {
    schema::validate(document, schema)?;
    write_document(document, path).await?;
    Ok(())
}
