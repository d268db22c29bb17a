//! # devintel CLI
//!
//! ```bash
//! devintel index ./my-app                 # index a project (differential sync)
//! devintel index-docs llamaindex ./docs   # index library documentation
//! devintel search my-app "config loader"  # semantic search
//! devintel index-conversations chat.jsonl # import a JSONL conversation log
//! devintel serve                          # MCP server on stdio
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use devintel::config::Config;
use devintel::mcp::{McpContext, McpServer};
use devintel::service::ProjectService;

#[derive(Parser)]
#[command(
    name = "devintel",
    version,
    about = "Semantic code and documentation search over local vector collections"
)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, global = true, default_value = "config.json")]
    config: String,

    /// Keep collections in memory instead of the configured database.
    #[arg(long, global = true)]
    ephemeral: bool,

    /// Embed with the local mock embedder, keeping configured dimensions.
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server on stdio.
    Serve,

    /// Index a project directory.
    Index {
        path: PathBuf,
        /// Collection name (default: the directory name).
        #[arg(long)]
        name: Option<String>,
        /// Re-index files even if unchanged.
        #[arg(long)]
        force: bool,
    },

    /// Index a library's documentation into `docs_<library>`.
    IndexDocs { library: String, path: PathBuf },

    /// Re-index only files changed since the last sync.
    Refresh {
        path: PathBuf,
        #[arg(long)]
        name: Option<String>,
    },

    /// Delete the collection and index it again from scratch.
    Reindex {
        path: PathBuf,
        #[arg(long)]
        name: Option<String>,
    },

    /// Semantic search over one project.
    Search {
        project: String,
        query: String,
        #[arg(long, short = 'k')]
        top_k: Option<usize>,
    },

    /// Semantic search over a library's documentation.
    SearchDocs {
        library: String,
        query: String,
        #[arg(long, short = 'k')]
        top_k: Option<usize>,
        /// Steer the search towards code examples.
        #[arg(long)]
        examples: bool,
    },

    /// Implementation examples for a task from a library's documentation.
    HowTo {
        library: String,
        task: String,
        #[arg(long, short = 'k')]
        top_k: Option<usize>,
    },

    /// Compare how several libraries' documentation covers one task.
    Compare {
        task: String,
        #[arg(required = true)]
        libraries: Vec<String>,
        #[arg(long, short = 'k')]
        top_k: Option<usize>,
    },

    /// Import a JSONL conversation log.
    IndexConversations {
        path: PathBuf,
        /// Collection name (default: conversations).
        #[arg(long)]
        name: Option<String>,
        /// Re-import even if unchanged.
        #[arg(long)]
        force: bool,
    },

    /// List indexed projects.
    List,

    /// List libraries with indexed documentation.
    Frameworks,

    /// Show collection metadata and its routed embedding profile.
    Info { project: String },

    /// Delete a project's collection.
    Clear { project: String },

    /// Show which embedding profile a collection name routes to.
    Route { name: String },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries MCP traffic and command output
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    if cli.offline {
        config.profiles = config.profiles.offline();
    }

    let service = Arc::new(ProjectService::open(config, cli.ephemeral)?);

    match cli.command {
        Commands::Serve => {
            info!("Starting devintel MCP server...");
            let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
            let server = McpServer::new(McpContext {
                service: service.clone(),
            });
            runtime.block_on(server.start())?;
        }
        Commands::Index { path, name, force } => {
            print_json(&service.index_project(&path, name.as_deref(), force)?)?;
        }
        Commands::IndexDocs { library, path } => {
            print_json(&service.index_docs(&library, &path, false)?)?;
        }
        Commands::Refresh { path, name } => {
            print_json(&service.refresh_project(&path, name.as_deref())?)?;
        }
        Commands::Reindex { path, name } => {
            print_json(&service.reindex_project(&path, name.as_deref())?)?;
        }
        Commands::Search {
            project,
            query,
            top_k,
        } => {
            print_json(&service.search(&project, &query, top_k)?)?;
        }
        Commands::SearchDocs {
            library,
            query,
            top_k,
            examples,
        } => {
            print_json(&service.search_docs(&library, &query, top_k, examples)?)?;
        }
        Commands::HowTo {
            library,
            task,
            top_k,
        } => {
            print_json(&service.how_to(&task, &library, top_k)?)?;
        }
        Commands::Compare {
            task,
            libraries,
            top_k,
        } => {
            print_json(&service.compare_libraries(&task, &libraries, top_k)?)?;
        }
        Commands::IndexConversations { path, name, force } => {
            print_json(&service.index_conversations(&path, name.as_deref(), force)?)?;
        }
        Commands::List => {
            for name in service.list_projects()? {
                println!("{name}");
            }
        }
        Commands::Frameworks => {
            for name in service.list_frameworks()? {
                println!("{name}");
            }
        }
        Commands::Info { project } => {
            print_json(&service.project_info(&project)?)?;
        }
        Commands::Clear { project } => {
            if service.clear_project(&project)? {
                println!("Cleared {project}");
            } else {
                println!("Project '{project}' not found");
            }
        }
        Commands::Route { name } => {
            print_json(service.route(&name))?;
        }
    }

    Ok(())
}
