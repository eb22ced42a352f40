//! # Lorebase
//!
//! An ingestion and retrieval engine for LLM knowledge bases.
//!
//! Lorebase ingests free text, web pages, and PDF documents; splits them into
//! retrievable chunks; embeds each chunk into a fixed-dimension vector; and
//! persists (chunk, vector) pairs in SQLite alongside their source resource.
//! At query time it fans a question and its keywords out as independent
//! similarity searches, merges and deduplicates the hits, ranks them by
//! cosine similarity, and returns a bounded result list for a tool-calling
//! LLM layer to consume.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────┐
//! │ Normalizers  │──▶│   Pipeline   │──▶│  SQLite   │
//! │ text/link/pdf│   │ Chunk+Embed  │   │ resources │
//! └──────────────┘   └──────────────┘   │ embeddings│
//!                                       └─────┬─────┘
//!                                             ▼
//!                                       ┌───────────┐
//!                                       │ Retrieval │
//!                                       │ merge+rank│
//!                                       └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lore init                                  # create database
//! lore add "Employees get 30 days of leave"  # ingest raw text
//! lore link add https://example.com/policy   # fetch + ingest a web page
//! lore pdf ./handbook.pdf                    # extract + ingest a PDF
//! lore ask "how much paid leave?" --keyword vacation
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`chunk`] | Paragraph-boundary text chunking |
//! | [`embedding`] | Embedding provider abstraction + vector math |
//! | [`normalize`] | Text, HTML, and PDF normalizers |
//! | [`fetch`] | Link fetching with retry and backoff |
//! | [`resources`] | Resource write path (batched embedding persistence) |
//! | [`links`] | Link bookkeeping and refresh pipeline |
//! | [`retrieve`] | Multi-query retrieval, dedup, and ranking |
//! | [`expand`] | Advisory query expansion |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod expand;
pub mod fetch;
pub mod links;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod resources;
pub mod retrieve;
