//! Core data models used throughout Lorebase.
//!
//! These types represent the resources, embeddings, and ranked matches that
//! flow through the ingestion and retrieval pipeline.

/// Provenance of a resource's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    Text,
    Link,
    Pdf,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Text => "text",
            SourceType::Link => "link",
            SourceType::Pdf => "pdf",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(SourceType::Text),
            "link" => Some(SourceType::Link),
            "pdf" => Some(SourceType::Pdf),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted normalized document. Created once per ingestion call and
/// never updated in place; re-ingestion creates a fresh row.
#[derive(Debug, Clone)]
pub struct Resource {
    pub id: String,
    pub content: String,
    pub source_type: SourceType,
    pub source_id: Option<String>,
    pub created_at: i64,
}

/// Ingestion-source bookkeeping for a tracked URL. At most one row per
/// distinct URL.
#[derive(Debug, Clone)]
pub struct Link {
    pub id: String,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub created_at: i64,
    pub last_processed: Option<i64>,
}

/// A single similarity hit from one sub-query (ephemeral, not persisted).
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub content: String,
    pub similarity: f64,
}

/// A final ranked match returned to the orchestration layer. The `name`
/// field carries the chunk content — an output-shape contract for the
/// consuming tool layer, not a semantic rename.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedMatch {
    pub name: String,
    pub similarity: Option<f64>,
}
