use std::collections::HashMap;
use std::sync::Arc;

use tenx_mcp::{
    Arguments, Error as McpError, Result as McpResult, Server, ServerConn, ServerCtx,
    schema::{
        CallToolResult, ClientCapabilities, Cursor, Implementation, InitializeResult,
        ListToolsResult, ServerCapabilities, Tool, ToolSchema,
    },
};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::{
    Result,
    client::StravaClient,
    ctx::VERSION,
    tools::{self, ToolArgs, ToolError, ToolSpec},
};

pub const SERVER_NAME: &str = "stravamcp";

/// One MCP connection. All connections share a single client, and calls are
/// serialized through its lock.
#[derive(Clone)]
pub struct StravaServerConn {
    client: Arc<Mutex<StravaClient>>,
}

impl StravaServerConn {
    pub fn new(client: Arc<Mutex<StravaClient>>) -> Self {
        Self { client }
    }
}

/// MCP tool definition for a catalogue entry.
pub fn tool_definition(spec: &ToolSpec) -> Tool {
    let properties: HashMap<String, serde_json::Value> = spec
        .params
        .iter()
        .map(|param| (param.name.to_string(), param.schema()))
        .collect();
    let required = spec.required();

    let schema = ToolSchema {
        schema_type: "object".to_string(),
        properties: Some(properties),
        required: if required.is_empty() {
            None
        } else {
            Some(required)
        },
    };

    Tool::new(spec.name, schema).with_description(spec.description)
}

/// Pull the arguments a tool declares out of the host's argument bag.
fn collect_args(spec: &ToolSpec, arguments: Option<&Arguments>) -> ToolArgs {
    let mut args = ToolArgs::new();
    if let Some(arguments) = arguments {
        for param in &spec.params {
            if let Some(value) = arguments.get::<serde_json::Value>(param.name) {
                args.insert(param.name.to_string(), value);
            }
        }
    }
    args
}

/// Render a tool outcome for the host. Errors become text, never faults.
pub fn tool_result(outcome: std::result::Result<serde_json::Value, ToolError>) -> CallToolResult {
    match outcome {
        Ok(value) => {
            let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
            CallToolResult::new().with_text_content(text)
        }
        Err(e) => {
            error!("{e}");
            let mut result = CallToolResult::new().with_text_content(e.to_string());
            result.is_error = Some(true);
            result
        }
    }
}

#[async_trait::async_trait]
impl ServerConn for StravaServerConn {
    async fn on_connect(&self, _context: &ServerCtx, remote_addr: &str) -> McpResult<()> {
        info!("MCP client connected from {remote_addr}");
        Ok(())
    }

    async fn on_shutdown(&self) -> McpResult<()> {
        info!("MCP connection closed");
        Ok(())
    }

    async fn initialize(
        &self,
        _context: &ServerCtx,
        protocol_version: String,
        _capabilities: ClientCapabilities,
        client_info: Implementation,
    ) -> McpResult<InitializeResult> {
        info!(
            "Initializing session for {} {} (protocol {protocol_version})",
            client_info.name, client_info.version
        );

        Ok(InitializeResult {
            protocol_version: tenx_mcp::schema::LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities::default().with_tools(Some(true)),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: VERSION.to_string(),
                title: Some("Strava MCP Server".to_string()),
            },
            instructions: Some(
                "Read-only access to the authenticated athlete's Strava profile, stats, zones \
                 and activities."
                    .to_string(),
            ),
            _meta: None,
        })
    }

    async fn list_tools(
        &self,
        _context: &ServerCtx,
        _cursor: Option<Cursor>,
    ) -> McpResult<ListToolsResult> {
        Ok(ListToolsResult {
            tools: tools::catalogue().iter().map(tool_definition).collect(),
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        _context: &ServerCtx,
        name: String,
        arguments: Option<Arguments>,
    ) -> McpResult<CallToolResult> {
        let Some(spec) = tools::find(&name) else {
            return Err(McpError::ToolNotFound(format!("Unknown tool: {name}")));
        };
        let args = collect_args(&spec, arguments.as_ref());
        info!("tools/call {name}");

        let mut client = self.client.lock().await;
        Ok(tool_result(tools::invoke(&mut client, &name, &args).await))
    }
}

/// Serve the Strava tools over stdio until the host hangs up.
pub async fn run_server(client: StravaClient) -> Result<()> {
    let client = Arc::new(Mutex::new(client));

    info!("Starting Strava MCP Server...");
    info!("Version: {VERSION}");
    info!("Protocol: {}", tenx_mcp::schema::LATEST_PROTOCOL_VERSION);

    let server = Server::default()
        .with_connection(move || StravaServerConn::new(client.clone()))
        .with_capabilities(ServerCapabilities::default().with_tools(Some(true)));

    server.serve_stdio().await?;
    Ok(())
}
