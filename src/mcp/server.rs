/// MCP Server setup using `rmcp` with stdio transport.
///
/// Provides `McpContext` (shared state) and `McpServer` (startup logic).
use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::{ServiceExt, handler::server::router::Router, transport::io::stdio};
use tracing::info;

use crate::mcp::tools::AppTools;
use crate::service::ProjectService;

/// Shared application context available to all tool handlers.
#[derive(Clone)]
pub struct McpContext {
    pub service: Arc<ProjectService>,
}

/// MCP Server wrapping the context and serving via stdio.
#[derive(Clone)]
pub struct McpServer {
    pub ctx: McpContext,
}

impl McpServer {
    pub fn new(ctx: McpContext) -> Self {
        Self { ctx }
    }

    /// Start the MCP server on stdio transport (blocks until the client disconnects).
    pub async fn start(self) -> Result<()> {
        info!("Starting MCP server on stdio...");
        let (stdin, stdout) = stdio();

        let app_tools = AppTools::new(self.ctx.clone());
        let router = Router::new(app_tools.clone()).with_tools(app_tools.tool_router.clone());

        let running = router
            .serve((stdin, stdout))
            .await
            .context("failed to start MCP server on stdio")?;
        running
            .waiting()
            .await
            .context("MCP Server encountered an error during stdio transport")?;

        info!("MCP client disconnected");
        Ok(())
    }
}
