//! # devintel: semantic code and documentation search
//!
//! Indexes project directories and library documentation into per-collection
//! vector stores and serves semantic search to AI assistants via the Model
//! Context Protocol (MCP) or the command line.
//!
//! ## Architecture
//!
//! - **[`cache`]**: One resolved handle per collection name
//! - **[`router`]**: Collection name → embedding profile rule table
//! - **[`store`]**: Vector store boundary (SQLite + sqlite-vec, in-memory)
//! - **[`embedder`]**: Text embedding (OpenAI, Ollama, deterministic mock)
//! - **[`indexer`]**: Paragraph chunking, differential directory sync, JSONL conversation import
//! - **[`query_cache`]**: TTL cache of search results
//! - **[`service`]**: Project operations shared by the CLI and MCP server
//! - **[`mcp`]**: MCP server (stdio transport via rmcp)
//! - **[`config`]**: Configuration loading and validation

pub mod cache;
pub mod config;
pub mod embedder;
pub mod indexer;
pub mod mcp;
pub mod query_cache;
pub mod router;
pub mod service;
pub mod store;
