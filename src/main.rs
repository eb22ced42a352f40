//! # Lorebase CLI (`lore`)
//!
//! The `lore` binary is the primary interface for Lorebase. It provides
//! commands for database initialization, knowledge ingestion (raw text,
//! web pages, PDFs), link management, and retrieval.
//!
//! ## Usage
//!
//! ```bash
//! lore --config ./config/lore.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lore init` | Create the SQLite database and run schema migrations |
//! | `lore add "<text>"` | Ingest raw text into the knowledge base |
//! | `lore pdf <path>` | Ingest a PDF document |
//! | `lore link add <url>` | Track a URL and ingest its content |
//! | `lore link list` | List tracked links |
//! | `lore link refresh <id>` | Re-fetch a link and replace its content |
//! | `lore link rm <id>` | Stop tracking a link |
//! | `lore resource list` | List stored resources |
//! | `lore resource rm <id>` | Delete a resource and its embeddings |
//! | `lore ask "<question>"` | Retrieve the most relevant stored chunks |
//! | `lore expand "<query>"` | Show the expansion a query would get |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! lore init --config ./config/lore.toml
//!
//! # Ingest raw text
//! lore add "Employees accrue 1.5 vacation days per month."
//!
//! # Track a documentation page
//! lore link add https://example.com/handbook --title "Handbook"
//!
//! # Ask with extra keywords and model-generated expansion
//! lore ask "how much paid leave do I get?" --keyword vacation --expand
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use lorebase::config;
use lorebase::db;
use lorebase::expand;
use lorebase::fetch;
use lorebase::links::{self, CreateLinkOutcome};
use lorebase::migrate;
use lorebase::models::SourceType;
use lorebase::normalize;
use lorebase::resources::{self, IngestSummary};
use lorebase::retrieve;

/// Lorebase CLI — a local-first retrieval-augmented knowledge base.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/lore.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "lore",
    about = "Lorebase — a local-first retrieval-augmented knowledge base",
    version,
    long_about = "Lorebase ingests raw text, web pages, and PDF documents into a SQLite-backed \
    knowledge base, chunking and embedding them, and answers questions by multi-query \
    similarity retrieval over the stored vectors."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/lore.toml`. Database, chunking, embedding,
    /// fetch, and retrieval settings are read from this file.
    #[arg(long, global = true, default_value = "./config/lore.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (resources, embeddings, links). Idempotent — running it multiple
    /// times is safe.
    Init,

    /// Ingest raw text into the knowledge base.
    ///
    /// Chunks the text, embeds each chunk with the configured provider,
    /// and stores everything as a single resource.
    Add {
        /// The text to ingest.
        text: String,
    },

    /// Ingest a PDF document.
    ///
    /// Extracts the text layer, chunks and embeds it, and stores it as a
    /// resource keyed by the file's content hash.
    Pdf {
        /// Path to the PDF file.
        path: PathBuf,
    },

    /// Manage tracked links (URLs ingested into the knowledge base).
    Link {
        #[command(subcommand)]
        action: LinkAction,
    },

    /// Manage stored resources.
    Resource {
        #[command(subcommand)]
        action: ResourceAction,
    },

    /// Retrieve the stored chunks most relevant to a question.
    ///
    /// The question and each keyword run as independent similarity
    /// searches; results are merged, deduplicated, ranked by similarity,
    /// and truncated.
    Ask {
        /// The question to answer from the knowledge base.
        question: String,

        /// Extra search keyword (repeatable).
        #[arg(long = "keyword")]
        keywords: Vec<String>,

        /// Also expand the question into paraphrases and keywords with
        /// the configured expander model.
        #[arg(long)]
        expand: bool,
    },

    /// Show the paraphrases and keywords the expander would generate.
    Expand {
        /// The query to expand.
        query: String,
    },
}

/// Link management subcommands.
#[derive(Subcommand)]
enum LinkAction {
    /// Track a URL and ingest its content.
    ///
    /// Each URL is tracked at most once; adding a duplicate reports the
    /// existing link instead of erroring.
    Add {
        /// The URL to track.
        url: String,

        /// Human-readable title for the link.
        #[arg(long)]
        title: String,

        /// Optional description.
        #[arg(long)]
        description: Option<String>,
    },

    /// List tracked links.
    List,

    /// Re-fetch a link and replace its knowledge-base content.
    Refresh {
        /// Link UUID.
        id: String,
    },

    /// Stop tracking a link. Its ingested resource is left in place.
    Rm {
        /// Link UUID.
        id: String,
    },
}

/// Resource management subcommands.
#[derive(Subcommand)]
enum ResourceAction {
    /// List stored resources.
    List,

    /// Delete a resource and all embeddings derived from it.
    Rm {
        /// Resource UUID.
        id: String,
    },
}

fn print_summary(summary: &IngestSummary) {
    println!(
        "Ingested resource {} ({} chunks, {} embedded).",
        summary.resource_id, summary.chunks, summary.embedded
    );
    if summary.failed > 0 {
        eprintln!("Warning: {} chunks could not be embedded.", summary.failed);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let pool = db::connect(&cfg).await?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Add { text } => {
            let content = normalize::normalize_text(&text);
            let summary =
                resources::create_resource(&pool, &cfg, &content, SourceType::Text, None).await?;
            print_summary(&summary);
        }
        Commands::Pdf { path } => {
            let bytes = std::fs::read(&path)?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());
            let (content, source_id) = normalize::normalize_pdf(&bytes, &filename)?;
            let summary =
                resources::create_resource(&pool, &cfg, &content, SourceType::Pdf, Some(&source_id))
                    .await?;
            print_summary(&summary);
        }
        Commands::Link { action } => match action {
            LinkAction::Add {
                url,
                title,
                description,
            } => {
                let client = fetch::build_client(&cfg.fetch)?;
                match links::create_link(&pool, &cfg, &client, &url, &title, description.as_deref())
                    .await?
                {
                    CreateLinkOutcome::Created { link_id, ingest } => {
                        println!("Link {} added.", link_id);
                        print_summary(&ingest);
                    }
                    CreateLinkOutcome::AlreadyExists { link_id } => {
                        println!("Link already exists: {}", link_id);
                    }
                }
            }
            LinkAction::List => {
                let all = links::list_links(&pool).await?;
                if all.is_empty() {
                    println!("No links tracked.");
                }
                for link in all {
                    let processed = match link.last_processed {
                        Some(ts) => format!("processed {}", format_timestamp(ts)),
                        None => "never processed".to_string(),
                    };
                    println!("{}  {}  [{}]  {}", link.id, link.url, link.title, processed);
                }
            }
            LinkAction::Refresh { id } => {
                let client = fetch::build_client(&cfg.fetch)?;
                let summary = links::refresh_link(&pool, &cfg, &client, &id).await?;
                println!("Link {} refreshed.", id);
                print_summary(&summary);
            }
            LinkAction::Rm { id } => {
                if links::delete_link(&pool, &id).await? {
                    println!("Link {} deleted.", id);
                } else {
                    println!("Link not found: {}", id);
                }
            }
        },
        Commands::Resource { action } => match action {
            ResourceAction::List => {
                let all = resources::list_resources(&pool).await?;
                if all.is_empty() {
                    println!("No resources stored.");
                }
                for resource in all {
                    println!(
                        "{}  [{}]  {}  {}",
                        resource.id,
                        resource.source_type,
                        format_timestamp(resource.created_at),
                        preview(&resource.content, 72)
                    );
                }
            }
            ResourceAction::Rm { id } => {
                if resources::delete_resource(&pool, &id).await? {
                    println!("Resource {} deleted (embeddings cascade).", id);
                } else {
                    println!("Resource not found: {}", id);
                }
            }
        },
        Commands::Ask {
            question,
            mut keywords,
            expand: with_expansion,
        } => {
            if with_expansion {
                let expansion = expand::expand_query(&cfg.expander, &question).await;
                keywords.extend(expansion.questions);
                keywords.extend(expansion.keywords);
            }

            let matches = retrieve::get_information(&pool, &cfg, &question, &keywords).await?;
            if matches.is_empty() {
                println!("No relevant content found.");
            }
            for (i, m) in matches.iter().enumerate() {
                let score = m
                    .similarity
                    .map(|s| format!("{:.3}", s))
                    .unwrap_or_else(|| "  -  ".to_string());
                println!("{:>2}. [{}] {}", i + 1, score, m.name);
            }
        }
        Commands::Expand { query } => {
            let expansion = expand::expand_query(&cfg.expander, &query).await;
            if expansion.questions.is_empty() && expansion.keywords.is_empty() {
                println!("No expansion generated.");
            }
            for q in &expansion.questions {
                println!("question: {}", q);
            }
            for k in &expansion.keywords {
                println!("keyword:  {}", k);
            }
        }
    }

    Ok(())
}

/// Render a unix timestamp as a UTC date-time for listings.
fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// First line of `content`, truncated on a char boundary.
fn preview(content: &str, max_chars: usize) -> String {
    let first_line = content.lines().next().unwrap_or("");
    let truncated: String = first_line.chars().take(max_chars).collect();
    if truncated.len() < first_line.len() {
        format!("{}…", truncated)
    } else {
        truncated
    }
}
