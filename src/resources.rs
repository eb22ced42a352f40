//! Resource store — the ingestion write path.
//!
//! Persists a normalized document as a resource, fans its chunks through
//! the embedder, and writes the (chunk, vector) pairs in size-bounded
//! batches with inter-batch pacing. Embedding failures are collected per
//! chunk rather than aborting the whole document; a persistence failure
//! mid-way leaves the resource under-embedded (a documented degraded state
//! the caller may repair by re-ingesting).

use anyhow::{bail, Context, Result};
use sqlx::{Row, SqlitePool};
use std::time::Duration;
use uuid::Uuid;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding;
use crate::models::{Resource, SourceType};

/// Counters describing one ingestion call.
#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub resource_id: String,
    pub chunks: usize,
    pub embedded: usize,
    /// Chunks the embedder rejected (oversized, empty, provider error).
    pub failed: usize,
}

/// Create a resource and its embeddings.
///
/// Validation happens before any side effect. The resource row is
/// committed first; embedding rows reference it only after that commit
/// (write-after-write ordering). Embedding rows are inserted in fixed
/// batches with a pause between batches to avoid overwhelming the
/// provider or the store.
pub async fn create_resource(
    pool: &SqlitePool,
    config: &Config,
    content: &str,
    source_type: SourceType,
    source_id: Option<&str>,
) -> Result<IngestSummary> {
    let content = content.trim();
    if content.is_empty() {
        bail!("Content must not be empty.");
    }

    let resource_id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        "INSERT INTO resources (id, content, source_type, source_id, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&resource_id)
    .bind(content)
    .bind(source_type.as_str())
    .bind(source_id)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to persist resource")?;

    let chunks = chunk_text(content, config.chunking.max_chars);

    if !config.embedding.is_enabled() {
        // Resource persisted without vectors; retrieval will not see it
        // until embeddings are generated.
        return Ok(IngestSummary {
            resource_id,
            chunks: chunks.len(),
            embedded: 0,
            failed: 0,
        });
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let dims = provider.dims();

    let (pairs, failed) = embed_chunks(provider.as_ref(), config, &chunks).await?;

    for vector in pairs.iter().map(|(_, v)| v) {
        if vector.len() != dims {
            bail!(
                "Embedder returned a {}-dimension vector, expected {}; refusing to mix dimensionalities",
                vector.len(),
                dims
            );
        }
    }

    let batch_size = config.retrieval.insert_batch_size.max(1);
    let pause = Duration::from_millis(config.retrieval.batch_pause_ms);
    let total_batches = pairs.len().div_ceil(batch_size);

    for (i, batch) in pairs.chunks(batch_size).enumerate() {
        insert_embedding_batch(pool, &resource_id, batch)
            .await
            .with_context(|| {
                format!(
                    "Failed to persist embedding batch {}/{}; resource {} is under-embedded",
                    i + 1,
                    total_batches,
                    resource_id
                )
            })?;

        if i + 1 < total_batches && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }

    Ok(IngestSummary {
        resource_id,
        chunks: chunks.len(),
        embedded: pairs.len(),
        failed,
    })
}

/// Embed chunks best-effort: provider batches first, then a per-chunk
/// retry for any failed batch so one bad chunk cannot sink its siblings.
async fn embed_chunks(
    provider: &dyn embedding::EmbeddingProvider,
    config: &Config,
    chunks: &[String],
) -> Result<(Vec<(String, Vec<f32>)>, usize)> {
    let mut pairs = Vec::with_capacity(chunks.len());
    let mut failed = 0usize;

    for batch in chunks.chunks(config.embedding.batch_size.max(1)) {
        match embedding::embed_texts(provider, &config.embedding, batch).await {
            Ok(vectors) => {
                for (text, vector) in batch.iter().zip(vectors) {
                    pairs.push((text.clone(), vector));
                }
            }
            Err(batch_err) => {
                eprintln!("Warning: embedding batch failed, retrying per chunk: {}", batch_err);
                for text in batch {
                    match embedding::embed_texts(provider, &config.embedding, std::slice::from_ref(text))
                        .await
                    {
                        Ok(mut vectors) if !vectors.is_empty() => {
                            pairs.push((text.clone(), vectors.remove(0)));
                        }
                        Ok(_) => failed += 1,
                        Err(e) => {
                            eprintln!("Warning: chunk skipped: {}", e);
                            failed += 1;
                        }
                    }
                }
            }
        }
    }

    Ok((pairs, failed))
}

async fn insert_embedding_batch(
    pool: &SqlitePool,
    resource_id: &str,
    batch: &[(String, Vec<f32>)],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    for (text, vector) in batch {
        sqlx::query(
            "INSERT INTO embeddings (id, resource_id, content, embedding) VALUES (?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(resource_id)
        .bind(text)
        .bind(embedding::vec_to_blob(vector))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Delete a resource. The store's ON DELETE CASCADE removes all owned
/// embeddings atomically. Returns whether a row was deleted.
pub async fn delete_resource(pool: &SqlitePool, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM resources WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete resource")?;

    Ok(result.rows_affected() > 0)
}

/// All resources, oldest first.
pub async fn list_resources(pool: &SqlitePool) -> Result<Vec<Resource>> {
    let rows = sqlx::query(
        "SELECT id, content, source_type, source_id, created_at FROM resources ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    let resources = rows
        .iter()
        .map(|row| {
            let source_type: String = row.get("source_type");
            Resource {
                id: row.get("id"),
                content: row.get("content"),
                source_type: SourceType::parse(&source_type).unwrap_or(SourceType::Text),
                source_id: row.get("source_id"),
                created_at: row.get("created_at"),
            }
        })
        .collect();

    Ok(resources)
}

/// Delete every resource carrying the given source id. Used by the link
/// refresh path so a re-ingested page replaces its prior resource instead
/// of accumulating copies.
pub async fn delete_resources_by_source(pool: &SqlitePool, source_id: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM resources WHERE source_id = ?")
        .bind(source_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
