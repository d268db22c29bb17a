/// MCP Tool handlers for devintel.
///
/// 1. search            – semantic search over one project collection
/// 2. search_docs       – semantic search over a library's documentation
/// 3. index_project     – index a directory (differential sync)
/// 4. refresh_project   – re-index only changed files
/// 5. list_projects     – list project and documentation collections
/// 6. project_info      – collection metadata and routed profile
/// 7. clear_project     – delete a collection and its cached handle
/// 8. route_collection  – show which embedding profile a name routes to
/// 9. get_pattern       – code examples from a library's documentation
/// 10. how_to           – implementation steps for a task in one library
/// 11. compare_libraries – the same task across several libraries
/// 12. index_conversations – import a JSONL conversation log
///
/// The service is synchronous, so every handler runs it on a blocking thread.
use std::path::PathBuf;
use std::sync::Arc;

use rmcp::handler::server::ServerHandler;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{ErrorData as McpError, handler::server::tool::ToolRouter, model::*, tool, tool_router};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::cache::IndexError;
use crate::mcp::server::McpContext;
use crate::service::ProjectService;

// ── Parameter structs ────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct SearchParams {
    /// Project (collection) name
    project: String,
    /// Search query (natural language)
    query: String,
    /// Max results (default: search_top_k from config)
    top_k: Option<usize>,
}

#[derive(Deserialize, JsonSchema)]
struct SearchDocsParams {
    /// Library name, e.g. 'llamaindex'
    library: String,
    /// Search query (natural language)
    query: String,
    /// Max results (default: search_top_k from config)
    top_k: Option<usize>,
    /// Steer the search towards code examples (default: false)
    examples_only: Option<bool>,
}

#[derive(Deserialize, JsonSchema)]
struct PatternParams {
    /// What to implement (natural language)
    query: String,
    /// Library name (default: 'llamaindex')
    framework: Option<String>,
}

#[derive(Deserialize, JsonSchema)]
struct HowToParams {
    /// Task to implement, e.g. 'stream responses'
    task: String,
    /// Library name, e.g. 'llamaindex'
    library: String,
}

#[derive(Deserialize, JsonSchema)]
struct CompareParams {
    /// Task to implement
    task: String,
    /// Library names to compare
    libraries: Vec<String>,
}

#[derive(Deserialize, JsonSchema)]
struct ConversationParams {
    /// JSONL file with one message or conversation per line
    path: String,
    /// Collection name (default: 'conversations')
    name: Option<String>,
    /// Re-import even if unchanged (default: false)
    force: Option<bool>,
}

#[derive(Deserialize, JsonSchema)]
struct IndexParams {
    /// Directory to index recursively
    path: String,
    /// Collection name (default: the directory name)
    name: Option<String>,
    /// Force re-index even if unchanged (default: false)
    force: Option<bool>,
}

#[derive(Deserialize, JsonSchema)]
struct RefreshParams {
    /// Directory that was indexed
    path: String,
    /// Collection name (default: the directory name)
    name: Option<String>,
}

#[derive(Deserialize, JsonSchema)]
struct ProjectParam {
    /// Project (collection) name
    project: String,
}

const DEFAULT_FRAMEWORK: &str = "llamaindex";

// ── Response helpers ─────────────────────────────────────────────────

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("failed to encode result: {e}"), None))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

fn error_result(msg: &str) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(msg.to_string())]))
}

/// Caller mistakes become tool errors; everything else is an internal error.
fn index_error(err: IndexError) -> Result<CallToolResult, McpError> {
    match err {
        IndexError::InvalidName(_)
        | IndexError::NotFound { .. }
        | IndexError::DimensionMismatch { .. } => error_result(&err.to_string()),
        other => Err(McpError::internal_error(other.to_string(), None)),
    }
}

/// Run a service call on the blocking pool.
async fn run_blocking<T, F>(service: &Arc<ProjectService>, f: F) -> Result<T, McpError>
where
    F: FnOnce(&ProjectService) -> T + Send + 'static,
    T: Send + 'static,
{
    let service = service.clone();
    tokio::task::spawn_blocking(move || f(&service))
        .await
        .map_err(|e| McpError::internal_error(format!("worker task failed: {e}"), None))
}

// ── Tool implementations ─────────────────────────────────────────────

#[derive(Clone)]
pub struct AppTools {
    pub ctx: McpContext,
    pub tool_router: ToolRouter<Self>,
}

impl ServerHandler for AppTools {}

#[tool_router]
impl AppTools {
    pub fn new(ctx: McpContext) -> Self {
        Self {
            ctx,
            tool_router: Self::tool_router(),
        }
    }

    // ── Tool 1: search ──────────────────────────────────────────────

    #[tool(
        description = "Semantic search over an indexed project. Returns the closest chunks with their file and similarity score."
    )]
    async fn search(&self, params: Parameters<SearchParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        if p.query.is_empty() {
            return error_result("query is required");
        }

        let results = run_blocking(&self.ctx.service, move |svc| {
            svc.search(&p.project, &p.query, p.top_k)
        })
        .await?;

        match results {
            Ok(results) => json_result(&serde_json::json!({ "results": results })),
            Err(e) => index_error(e),
        }
    }

    // ── Tool 2: search_docs ─────────────────────────────────────────

    #[tool(description = "Semantic search over a library's indexed documentation")]
    async fn search_docs(
        &self,
        params: Parameters<SearchDocsParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        if p.query.is_empty() || p.library.is_empty() {
            return error_result("library and query are required");
        }

        let results = run_blocking(&self.ctx.service, move |svc| {
            svc.search_docs(&p.library, &p.query, p.top_k, p.examples_only.unwrap_or(false))
        })
        .await?;

        match results {
            Ok(results) => json_result(&serde_json::json!({ "results": results })),
            Err(e) => index_error(e),
        }
    }

    // ── Tool 3: index_project ───────────────────────────────────────

    #[tool(
        description = "Index a project directory. Unchanged files are skipped unless force is set; deleted files are removed from the index."
    )]
    async fn index_project(
        &self,
        params: Parameters<IndexParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let path = PathBuf::from(&p.path);
        if !path.is_dir() {
            return error_result(&format!("directory not found: {}", p.path));
        }

        let summary = run_blocking(&self.ctx.service, move |svc| {
            svc.index_project(&path, p.name.as_deref(), p.force.unwrap_or(false))
        })
        .await?;

        match summary {
            Ok(summary) => json_result(&summary),
            Err(e) => error_result(&format!("indexing failed: {e:#}")),
        }
    }

    // ── Tool 4: refresh_project ─────────────────────────────────────

    #[tool(description = "Incremental refresh: re-index only files changed since the last sync")]
    async fn refresh_project(
        &self,
        params: Parameters<RefreshParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let path = PathBuf::from(&p.path);
        if !path.is_dir() {
            return error_result(&format!("directory not found: {}", p.path));
        }

        let summary = run_blocking(&self.ctx.service, move |svc| {
            svc.refresh_project(&path, p.name.as_deref())
        })
        .await?;

        match summary {
            Ok(summary) => json_result(&summary),
            Err(e) => error_result(&format!("refresh failed: {e:#}")),
        }
    }

    // ── Tool 5: list_projects ───────────────────────────────────────

    #[tool(description = "List indexed projects and documentation libraries")]
    async fn list_projects(&self) -> Result<CallToolResult, McpError> {
        let listed = run_blocking(&self.ctx.service, |svc| {
            Ok::<_, anyhow::Error>((svc.list_projects()?, svc.list_frameworks()?))
        })
        .await?;

        match listed {
            Ok((projects, frameworks)) => json_result(&serde_json::json!({
                "projects": projects,
                "frameworks": frameworks,
            })),
            Err(e) => Err(McpError::internal_error(format!("{e:#}"), None)),
        }
    }

    // ── Tool 6: project_info ────────────────────────────────────────

    #[tool(description = "Show a collection's routed embedding profile, dimensions and size")]
    async fn project_info(
        &self,
        params: Parameters<ProjectParam>,
    ) -> Result<CallToolResult, McpError> {
        let project = params.0.project;
        let info = run_blocking(&self.ctx.service, move |svc| svc.project_info(&project)).await?;

        match info {
            Ok(info) => json_result(&info),
            Err(e) => Err(McpError::internal_error(format!("{e:#}"), None)),
        }
    }

    // ── Tool 7: clear_project ───────────────────────────────────────

    #[tool(description = "Delete a project's collection and drop its cached handle and results")]
    async fn clear_project(
        &self,
        params: Parameters<ProjectParam>,
    ) -> Result<CallToolResult, McpError> {
        let project = params.0.project;
        if project.is_empty() {
            return error_result("project is required");
        }

        let name = project.clone();
        let deleted = run_blocking(&self.ctx.service, move |svc| svc.clear_project(&name)).await?;

        match deleted {
            Ok(true) => json_result(&serde_json::json!({ "project": project, "deleted": true })),
            Ok(false) => error_result(&format!("Project '{project}' not found")),
            Err(e) => Err(McpError::internal_error(format!("{e:#}"), None)),
        }
    }

    // ── Tool 8: route_collection ────────────────────────────────────

    #[tool(description = "Show which embedding profile a collection name routes to")]
    async fn route_collection(
        &self,
        params: Parameters<ProjectParam>,
    ) -> Result<CallToolResult, McpError> {
        let profile = self.ctx.service.route(&params.0.project);
        json_result(profile)
    }

    // ── Tool 9: get_pattern ─────────────────────────────────────────

    #[tool(description = "Get implementation code examples from a library's documentation")]
    async fn get_pattern(
        &self,
        params: Parameters<PatternParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        if p.query.is_empty() {
            return error_result("query is required");
        }
        let framework = p.framework.unwrap_or_else(|| DEFAULT_FRAMEWORK.to_string());

        let results = run_blocking(&self.ctx.service, move |svc| {
            svc.search_docs(&framework, &p.query, None, true)
        })
        .await?;

        match results {
            Ok(results) => json_result(&serde_json::json!({ "results": results })),
            Err(e) => index_error(e),
        }
    }

    // ── Tool 10: how_to ─────────────────────────────────────────────

    #[tool(description = "Step-by-step implementation examples for a task in one library")]
    async fn how_to(&self, params: Parameters<HowToParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        if p.task.is_empty() || p.library.is_empty() {
            return error_result("task and library are required");
        }

        let results = run_blocking(&self.ctx.service, move |svc| {
            svc.how_to(&p.task, &p.library, None)
        })
        .await?;

        match results {
            Ok(results) => json_result(&serde_json::json!({ "results": results })),
            Err(e) => index_error(e),
        }
    }

    // ── Tool 11: compare_libraries ──────────────────────────────────

    #[tool(description = "Compare how several libraries' documentation handles the same task")]
    async fn compare_libraries(
        &self,
        params: Parameters<CompareParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        if p.task.is_empty() || p.libraries.is_empty() {
            return error_result("task and at least one library are required");
        }

        let answers = run_blocking(&self.ctx.service, move |svc| {
            svc.compare_libraries(&p.task, &p.libraries, None)
        })
        .await?;

        match answers {
            Ok(answers) => json_result(&serde_json::json!({ "libraries": answers })),
            Err(e) => index_error(e),
        }
    }

    // ── Tool 12: index_conversations ────────────────────────────────

    #[tool(
        description = "Import a JSONL conversation log. Each line is one message object or an array of messages with role and content."
    )]
    async fn index_conversations(
        &self,
        params: Parameters<ConversationParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let path = PathBuf::from(&p.path);
        if !path.is_file() {
            return error_result(&format!("file not found: {}", p.path));
        }

        let summary = run_blocking(&self.ctx.service, move |svc| {
            svc.index_conversations(&path, p.name.as_deref(), p.force.unwrap_or(false))
        })
        .await?;

        match summary {
            Ok(summary) => json_result(&summary),
            Err(e) => error_result(&format!("import failed: {e:#}")),
        }
    }
}
