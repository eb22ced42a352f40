//! Link bookkeeping and the web-page ingestion pipeline.
//!
//! A link is a tracked URL: at most one row per distinct URL, with a
//! `last_processed` timestamp updated on every successful re-ingestion.
//! Adding a duplicate URL is a no-op that reports the existing id.
//!
//! Refreshing a link replaces the resource produced by its previous
//! ingestion (matched by `source_id`) rather than appending another copy,
//! so repeated refreshes do not grow the store unboundedly.

use anyhow::{bail, Context, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::config::Config;
use crate::fetch;
use crate::models::{Link, SourceType};
use crate::normalize;
use crate::resources::{self, IngestSummary};

/// Result of [`create_link`].
#[derive(Debug)]
pub enum CreateLinkOutcome {
    /// New row inserted and its content ingested.
    Created {
        link_id: String,
        ingest: IngestSummary,
    },
    /// A link with this URL already exists; nothing was inserted.
    AlreadyExists { link_id: String },
}

/// Register a URL and immediately ingest its content.
///
/// The uniqueness pre-check makes a duplicate URL report the existing id
/// instead of erroring. If the row is inserted but ingestion fails, the
/// link survives and can be retried with [`refresh_link`].
pub async fn create_link(
    pool: &SqlitePool,
    config: &Config,
    client: &reqwest::Client,
    url: &str,
    title: &str,
    description: Option<&str>,
) -> Result<CreateLinkOutcome> {
    let url = url.trim();
    if url.is_empty() {
        bail!("URL must not be empty.");
    }
    if title.trim().is_empty() {
        bail!("Title must not be empty.");
    }

    let existing: Option<String> = sqlx::query_scalar("SELECT id FROM links WHERE url = ?")
        .bind(url)
        .fetch_optional(pool)
        .await?;

    if let Some(link_id) = existing {
        return Ok(CreateLinkOutcome::AlreadyExists { link_id });
    }

    let link_id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        "INSERT INTO links (id, url, title, description, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&link_id)
    .bind(url)
    .bind(title.trim())
    .bind(description)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to persist link")?;

    let ingest = process_link_content(pool, config, client, &link_id).await?;

    Ok(CreateLinkOutcome::Created { link_id, ingest })
}

/// Re-fetch a tracked URL and replace its knowledge-base content.
pub async fn refresh_link(
    pool: &SqlitePool,
    config: &Config,
    client: &reqwest::Client,
    link_id: &str,
) -> Result<IngestSummary> {
    process_link_content(pool, config, client, link_id).await
}

/// Fetch → normalize → replace prior resource → record `last_processed`.
///
/// No resource is created when acquisition fails; the previous ingestion's
/// resource is removed only once the fresh content is in hand.
async fn process_link_content(
    pool: &SqlitePool,
    config: &Config,
    client: &reqwest::Client,
    link_id: &str,
) -> Result<IngestSummary> {
    let link = get_link(pool, link_id)
        .await?
        .with_context(|| format!("Link not found: {}", link_id))?;

    let html = fetch::fetch_with_retry(client, &link.url, &config.fetch)
        .await
        .with_context(|| format!("Could not fetch {}", link.url))?;

    let content = normalize::normalize_html(&link.url, &link.title, &html)
        .with_context(|| format!("Could not extract content from {}", link.url))?;

    resources::delete_resources_by_source(pool, link_id).await?;

    let summary =
        resources::create_resource(pool, config, &content, SourceType::Link, Some(link_id)).await?;

    let now = chrono::Utc::now().timestamp();
    sqlx::query("UPDATE links SET last_processed = ? WHERE id = ?")
        .bind(now)
        .bind(link_id)
        .execute(pool)
        .await?;

    Ok(summary)
}

/// Delete a link row. Resources it produced are left in place; remove
/// them separately with `resource rm` if desired.
pub async fn delete_link(pool: &SqlitePool, link_id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM links WHERE id = ?")
        .bind(link_id)
        .execute(pool)
        .await
        .context("Failed to delete link")?;

    Ok(result.rows_affected() > 0)
}

/// All links, oldest first.
pub async fn list_links(pool: &SqlitePool) -> Result<Vec<Link>> {
    let rows = sqlx::query(
        "SELECT id, url, title, description, created_at, last_processed FROM links ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(link_from_row).collect())
}

async fn get_link(pool: &SqlitePool, link_id: &str) -> Result<Option<Link>> {
    let row = sqlx::query(
        "SELECT id, url, title, description, created_at, last_processed FROM links WHERE id = ?",
    )
    .bind(link_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(link_from_row))
}

fn link_from_row(row: &sqlx::sqlite::SqliteRow) -> Link {
    Link {
        id: row.get("id"),
        url: row.get("url"),
        title: row.get("title"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        last_processed: row.get("last_processed"),
    }
}
