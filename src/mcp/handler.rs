use crate::task::TaskController;
use rmcp::{
    ServerHandler,
    handler::server::router::tool::ToolRouter,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool_handler,
};
use std::sync::Arc;

const INSTRUCTIONS: &str = "Drives a browser to complete natural-language tasks. Start one with task_run, \
poll task_status, answer checkpoints with task_decide and stop with task_interrupt.";

/// MCP server exposing a [`TaskController`]
#[derive(Clone)]
pub struct WandServer {
    controller: Arc<TaskController>,
    pub(super) tool_router: ToolRouter<Self>,
}

impl WandServer {
    /// Server over `controller`; every MCP session shares it
    pub fn new(controller: Arc<TaskController>) -> Self {
        Self { controller, tool_router: Self::tool_router() }
    }

    pub fn controller(&self) -> &Arc<TaskController> {
        &self.controller
    }
}

#[tool_handler]
impl ServerHandler for WandServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(INSTRUCTIONS.to_string()),
        }
    }
}
