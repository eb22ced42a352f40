//! End-to-end pipeline tests against a real SQLite store, with HTTP
//! dependencies (embedding provider, web pages) served by a local mock.

use httpmock::prelude::*;
use serde_json::json;
use sqlx::SqlitePool;
use tempfile::TempDir;

use lorebase::config::{
    ChunkingConfig, Config, DbConfig, EmbeddingConfig, ExpanderConfig, FetchConfig,
    RetrievalConfig,
};
use lorebase::expand::{self, Expansion};
use lorebase::links::{self, CreateLinkOutcome};
use lorebase::models::SourceType;
use lorebase::{db, fetch, migrate, normalize, resources, retrieve};

fn base_config(dir: &TempDir) -> Config {
    Config {
        db: DbConfig {
            path: dir.path().join("lore.sqlite"),
        },
        chunking: ChunkingConfig::default(),
        embedding: EmbeddingConfig::default(),
        expander: ExpanderConfig::default(),
        fetch: FetchConfig {
            timeout_secs: 5,
            max_attempts: 3,
            backoff_base_ms: 1,
        },
        retrieval: RetrievalConfig {
            batch_pause_ms: 0,
            ..Default::default()
        },
    }
}

fn ollama_config(dir: &TempDir, server: &MockServer) -> Config {
    let mut cfg = base_config(dir);
    cfg.embedding = EmbeddingConfig {
        provider: "ollama".to_string(),
        model: Some("test-embed".to_string()),
        dims: Some(4),
        url: Some(server.base_url()),
        ..Default::default()
    };
    cfg
}

async fn setup(cfg: &Config) -> SqlitePool {
    let pool = db::connect(cfg).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    pool
}

async fn count(pool: &SqlitePool, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let tmp = TempDir::new().unwrap();
    let cfg = base_config(&tmp);
    let pool = setup(&cfg).await;

    migrate::run_migrations(&pool).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM resources").await, 0);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM embeddings").await, 0);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM links").await, 0);
}

#[tokio::test]
async fn empty_content_is_rejected_before_any_write() {
    let tmp = TempDir::new().unwrap();
    let cfg = base_config(&tmp);
    let pool = setup(&cfg).await;

    let err = resources::create_resource(&pool, &cfg, "   \n  ", SourceType::Text, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("must not be empty"));
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM resources").await, 0);
}

#[tokio::test]
async fn disabled_provider_persists_resource_without_vectors() {
    let tmp = TempDir::new().unwrap();
    let cfg = base_config(&tmp);
    let pool = setup(&cfg).await;

    let summary = resources::create_resource(
        &pool,
        &cfg,
        "Employees accrue vacation days monthly.",
        SourceType::Text,
        None,
    )
    .await
    .unwrap();

    assert_eq!(summary.chunks, 1);
    assert_eq!(summary.embedded, 0);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM resources").await, 1);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM embeddings").await, 0);
}

#[tokio::test]
async fn deleting_a_resource_cascades_to_its_embeddings() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/embed");
            then.status(200)
                .json_body(json!({ "embeddings": [[1.0, 0.0, 0.0, 0.0]] }));
        })
        .await;

    let tmp = TempDir::new().unwrap();
    let cfg = ollama_config(&tmp, &server);
    let pool = setup(&cfg).await;

    let summary = resources::create_resource(
        &pool,
        &cfg,
        "Employees accrue vacation days monthly.",
        SourceType::Text,
        None,
    )
    .await
    .unwrap();
    assert_eq!(summary.embedded, 1);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM embeddings").await, 1);

    let deleted = resources::delete_resource(&pool, &summary.resource_id)
        .await
        .unwrap();
    assert!(deleted);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM resources").await, 0);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM embeddings").await, 0);
}

#[tokio::test]
async fn mismatched_vector_dimensionality_is_refused() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/embed");
            then.status(200)
                .json_body(json!({ "embeddings": [[0.1, 0.2, 0.3]] }));
        })
        .await;

    let tmp = TempDir::new().unwrap();
    let cfg = ollama_config(&tmp, &server);
    let pool = setup(&cfg).await;

    let err = resources::create_resource(&pool, &cfg, "short note", SourceType::Text, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("dimension"));
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM embeddings").await, 0);
}

#[tokio::test]
async fn retrieval_ranks_relevant_chunks_first() {
    let server = MockServer::start_async().await;
    // Deterministic vectors keyed off the request body: anything mentioning
    // vacation embeds along one axis, deployment along another.
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/embed").body_contains("vacation");
            then.status(200)
                .json_body(json!({ "embeddings": [[1.0, 0.0, 0.0, 0.0]] }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/embed").body_contains("deployment");
            then.status(200)
                .json_body(json!({ "embeddings": [[0.0, 1.0, 0.0, 0.0]] }));
        })
        .await;

    let tmp = TempDir::new().unwrap();
    let cfg = ollama_config(&tmp, &server);
    let pool = setup(&cfg).await;

    resources::create_resource(
        &pool,
        &cfg,
        "Employees accrue vacation days monthly.",
        SourceType::Text,
        None,
    )
    .await
    .unwrap();
    resources::create_resource(
        &pool,
        &cfg,
        "The deployment pipeline runs on Kubernetes.",
        SourceType::Text,
        None,
    )
    .await
    .unwrap();

    let matches = retrieve::get_information(&pool, &cfg, "how much vacation do I get?", &[])
        .await
        .unwrap();
    assert_eq!(matches.len(), 1);
    assert!(matches[0].name.contains("vacation"));
    assert!(matches[0].similarity.unwrap() > 0.9);

    // A keyword widens recall to the other topic; results stay bounded
    // and deduplicated.
    let keywords = vec!["deployment".to_string()];
    let matches =
        retrieve::get_information(&pool, &cfg, "how much vacation do I get?", &keywords)
            .await
            .unwrap();
    assert_eq!(matches.len(), 2);
    assert!(matches.len() <= cfg.retrieval.top_k);
}

#[tokio::test]
async fn duplicate_link_url_reports_existing_id() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/handbook");
            then.status(200).body(
                "<html><head><title>Handbook</title></head>\
                 <body><p>First revision of the page.</p></body></html>",
            );
        })
        .await;

    let tmp = TempDir::new().unwrap();
    let cfg = base_config(&tmp);
    let pool = setup(&cfg).await;
    let client = fetch::build_client(&cfg.fetch).unwrap();
    let url = server.url("/handbook");

    let first = links::create_link(&pool, &cfg, &client, &url, "Handbook", None)
        .await
        .unwrap();
    let first_id = match first {
        CreateLinkOutcome::Created { link_id, .. } => link_id,
        other => panic!("expected Created, got {:?}", other),
    };

    let second = links::create_link(&pool, &cfg, &client, &url, "Handbook again", None)
        .await
        .unwrap();
    match second {
        CreateLinkOutcome::AlreadyExists { link_id } => assert_eq!(link_id, first_id),
        other => panic!("expected AlreadyExists, got {:?}", other),
    }

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM links").await, 1);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM resources").await, 1);
}

#[tokio::test]
async fn fetch_failures_retry_to_the_ceiling_then_surface() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/flaky");
            then.status(500);
        })
        .await;

    let tmp = TempDir::new().unwrap();
    let cfg = base_config(&tmp);
    let pool = setup(&cfg).await;
    let client = fetch::build_client(&cfg.fetch).unwrap();

    let err = links::create_link(&pool, &cfg, &client, &server.url("/flaky"), "Flaky", None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Could not fetch"));

    assert_eq!(mock.hits_async().await, 3);
    // The link row survives the failed ingestion and can be refreshed.
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM links").await, 1);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM resources").await, 0);
}

#[tokio::test]
async fn refreshing_a_link_replaces_its_resource() {
    let server = MockServer::start_async().await;
    let mut page = server
        .mock_async(|when, then| {
            when.method(GET).path("/handbook");
            then.status(200).body(
                "<html><head><title>Handbook</title></head>\
                 <body><p>First revision of the page.</p></body></html>",
            );
        })
        .await;

    let tmp = TempDir::new().unwrap();
    let cfg = base_config(&tmp);
    let pool = setup(&cfg).await;
    let client = fetch::build_client(&cfg.fetch).unwrap();
    let url = server.url("/handbook");

    let outcome = links::create_link(&pool, &cfg, &client, &url, "Handbook", None)
        .await
        .unwrap();
    let link_id = match outcome {
        CreateLinkOutcome::Created { link_id, .. } => link_id,
        other => panic!("expected Created, got {:?}", other),
    };

    page.delete_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/handbook");
            then.status(200).body(
                "<html><head><title>Handbook</title></head>\
                 <body><p>Second revision entirely.</p></body></html>",
            );
        })
        .await;

    links::refresh_link(&pool, &cfg, &client, &link_id)
        .await
        .unwrap();

    let all = resources::list_resources(&pool).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].source_id.as_deref(), Some(link_id.as_str()));
    assert!(all[0].content.contains("Second revision"));
    assert!(!all[0].content.contains("First revision"));
}

/// Hand-built single-page PDF containing `phrase` as its only text.
fn minimal_pdf_with_phrase(phrase: &str) -> Vec<u8> {
    let stream = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET\n", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}endstream endobj\n",
            stream.len(),
            stream
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n");
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

#[tokio::test]
async fn pdf_ingestion_persists_content_under_a_stable_hash() {
    let tmp = TempDir::new().unwrap();
    let cfg = base_config(&tmp);
    let pool = setup(&cfg).await;

    let bytes = minimal_pdf_with_phrase("annual leave overview");
    let (content, source_id) = normalize::normalize_pdf(&bytes, "employee-handbook.pdf").unwrap();
    assert!(content.starts_with("# employee-handbook\n\n"));
    assert!(content.contains("annual leave overview"));
    // Source id is the hex SHA-256 of the raw bytes.
    assert_eq!(source_id.len(), 64);
    let (_, again) = normalize::normalize_pdf(&bytes, "employee-handbook.pdf").unwrap();
    assert_eq!(source_id, again);

    let summary =
        resources::create_resource(&pool, &cfg, &content, SourceType::Pdf, Some(&source_id))
            .await
            .unwrap();
    let all = resources::list_resources(&pool).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, summary.resource_id);
    assert_eq!(all[0].source_type, SourceType::Pdf);
    assert_eq!(all[0].source_id.as_deref(), Some(source_id.as_str()));
}

fn expander_config(server: &MockServer) -> ExpanderConfig {
    std::env::set_var("OPENAI_API_KEY", "test-key");
    ExpanderConfig {
        provider: "openai".to_string(),
        model: Some("test-chat".to_string()),
        url: Some(server.base_url()),
        max_retries: 1,
        ..Default::default()
    }
}

#[tokio::test]
async fn query_expansion_parses_model_reply() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200).json_body(json!({
                "choices": [{ "message": { "content":
                    "{\"questions\": [\"How many vacation days accrue?\"], \
                      \"keywords\": [\"vacation\", \"paid leave\"]}" } }]
            }));
        })
        .await;

    let cfg = expander_config(&server);
    let exp = expand::expand_query(&cfg, "how much leave do I get?").await;
    assert_eq!(exp.questions, vec!["How many vacation days accrue?"]);
    assert_eq!(exp.keywords, vec!["vacation", "paid leave"]);
}

#[tokio::test]
async fn failed_expansion_retries_then_degrades_to_empty() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(500);
        })
        .await;

    let cfg = expander_config(&server);
    let exp = expand::expand_query(&cfg, "anything").await;
    assert_eq!(exp, Expansion::default());
    // One retry after the initial attempt (max_retries = 1).
    assert_eq!(mock.hits_async().await, 2);
}

#[tokio::test]
async fn encoding_we_cannot_decode_fails_ingestion() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/legacy");
            then.status(200).body(
                "<html><head><meta charset=\"shift_jis\"><title>Legacy</title></head>\
                 <body><p>text</p></body></html>",
            );
        })
        .await;

    let tmp = TempDir::new().unwrap();
    let cfg = base_config(&tmp);
    let pool = setup(&cfg).await;
    let client = fetch::build_client(&cfg.fetch).unwrap();

    let err = links::create_link(&pool, &cfg, &client, &server.url("/legacy"), "Legacy", None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Could not extract content"));
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM resources").await, 0);
}
