//! MCP adapter: every tool is a thin wrapper over [`crate::service::ProjectService`].

pub mod server;
pub mod tools;

pub use server::{McpContext, McpServer};
