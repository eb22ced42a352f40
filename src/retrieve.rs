//! Retrieval engine — the read path.
//!
//! Embeds one or more query strings, scans stored vectors with cosine
//! similarity, merges candidates across sub-queries, deduplicates by exact
//! content, ranks by similarity descending, and truncates to a bounded
//! result count. A failing sub-query contributes nothing rather than
//! failing the call: partial recall beats no answer in an advisory lookup.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;

use crate::config::Config;
use crate::embedding;
use crate::models::{RankedMatch, ScoredChunk};

/// Similarity-search a single query string against all stored embeddings.
///
/// Candidates below `min_similarity` are dropped; at most `candidate_k`
/// are returned, ordered by descending similarity.
pub async fn find_relevant_content(
    pool: &SqlitePool,
    config: &Config,
    query: &str,
) -> Result<Vec<ScoredChunk>> {
    let provider = embedding::create_provider(&config.embedding)?;
    let query_vec = embedding::embed_query(provider.as_ref(), &config.embedding, query).await?;

    let rows = sqlx::query("SELECT content, embedding FROM embeddings")
        .fetch_all(pool)
        .await?;

    let mut candidates: Vec<ScoredChunk> = rows
        .iter()
        .filter_map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let vec = embedding::blob_to_vec(&blob);
            let similarity = embedding::cosine_similarity(&query_vec, &vec) as f64;
            if similarity < config.retrieval.min_similarity {
                return None;
            }
            Some(ScoredChunk {
                content: row.get("content"),
                similarity,
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(config.retrieval.candidate_k);

    Ok(candidates)
}

/// The principal query-time entry point: fan the question and each keyword
/// out as independent similarity searches, then merge, dedup, rank, and
/// truncate to `top_k`.
///
/// A sub-query whose embedding or scan fails is skipped with a warning.
pub async fn get_information(
    pool: &SqlitePool,
    config: &Config,
    question: &str,
    keywords: &[String],
) -> Result<Vec<RankedMatch>> {
    let mut merged: Vec<RankedMatch> = Vec::new();

    let mut sub_queries: Vec<&str> = vec![question];
    sub_queries.extend(keywords.iter().map(|k| k.as_str()));

    for sub_query in sub_queries {
        if sub_query.trim().is_empty() {
            continue;
        }
        match find_relevant_content(pool, config, sub_query).await {
            Ok(hits) => {
                merged.extend(hits.into_iter().map(|c| RankedMatch {
                    name: c.content,
                    similarity: Some(c.similarity),
                }));
            }
            Err(e) => {
                eprintln!("Warning: sub-query \"{}\" skipped: {}", sub_query, e);
            }
        }
    }

    Ok(merge_rank(merged, config.retrieval.top_k))
}

/// Deduplicate, rank, and truncate a merged candidate list.
///
/// Pure function of its input:
/// - duplicates (exact content equality) keep the first-seen occurrence,
///   discarding any later score silently;
/// - sort is stable, descending by similarity; score-less items tie with
///   each other (keeping first-seen relative order) and rank after any
///   scored item;
/// - at most `top_k` items survive.
pub fn merge_rank(items: Vec<RankedMatch>, top_k: usize) -> Vec<RankedMatch> {
    let mut seen = HashSet::new();
    let mut unique: Vec<RankedMatch> = items
        .into_iter()
        .filter(|item| seen.insert(item.name.clone()))
        .collect();

    unique.sort_by(|a, b| match (a.similarity, b.similarity) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(std::cmp::Ordering::Equal),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    unique.truncate(top_k);
    unique
}
