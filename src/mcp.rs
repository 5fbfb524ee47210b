//! MCP server over stdio.
//!
//! Exposes the dodo-doc search and read APIs to MCP clients (editors,
//! agents) as two read-only tools:
//!
//! | Tool | Arguments | Result |
//! |------|-----------|--------|
//! | `search` | `query` (string) | pretty JSON `{"items": [...]}` |
//! | `read_document` | `url` (document URL) | the document's Markdown |
//!
//! Failures of a tool are returned as error results; only an unknown tool
//! name is a protocol error.

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler, ServiceExt};
use serde_json::{json, Map, Value};

use crate::client::{parse_document_url, Client, ClientError, Endpoint};

const SEARCH: &str = "search";
const READ_DOCUMENT: &str = "read_document";

/// Handler shared by the stdio session.
#[derive(Clone)]
pub struct DodoMcp {
    client: Arc<Client>,
    endpoint: Arc<Endpoint>,
}

impl DodoMcp {
    pub fn new(client: Client, endpoint: Endpoint) -> Self {
        Self {
            client: Arc::new(client),
            endpoint: Arc::new(endpoint),
        }
    }

    fn tools() -> Vec<Tool> {
        vec![
            tool(
                SEARCH,
                "Search the documents published on dodo-doc. Returns matching records \
                 with their project, title, URL and contents.",
                "query",
                "Full-text search query",
            ),
            tool(
                READ_DOCUMENT,
                "Read a published document as Markdown, given its URL \
                 (e.g. https://<project>.docs.dodo-doc.com/guide/intro).",
                "url",
                "URL of the document",
            ),
        ]
    }

    async fn search(&self, query: &str) -> Result<String, ClientError> {
        let records = self.client.search(&self.endpoint, query, &[]).await?;
        tracing::debug!(query, records = records.len(), "mcp search");
        Ok(serde_json::to_string_pretty(&json!({ "items": records })).unwrap_or_default())
    }

    async fn read_document(&self, url: &str) -> Result<String, ClientError> {
        let (slug, path) = parse_document_url(url)?;
        self.client.read_document(&self.endpoint, &slug, &path).await
    }
}

/// A tool taking one required string argument.
fn tool(name: &'static str, description: &'static str, arg: &str, arg_description: &str) -> Tool {
    let schema = json!({
        "type": "object",
        "properties": {
            arg: { "type": "string", "description": arg_description }
        },
        "required": [arg]
    });
    let input_schema: Arc<Map<String, Value>> = match schema {
        Value::Object(map) => Arc::new(map),
        _ => Arc::new(Map::new()),
    };
    Tool {
        name: Cow::Borrowed(name),
        title: None,
        description: Some(Cow::Borrowed(description)),
        input_schema,
        output_schema: None,
        annotations: Some(ToolAnnotations::new().read_only(true)),
        execution: None,
        icons: None,
        meta: None,
    }
}

fn string_arg<'a>(arguments: &'a Option<Map<String, Value>>, key: &str) -> Option<&'a str> {
    arguments
        .as_ref()?
        .get(key)?
        .as_str()
        .filter(|s| !s.is_empty())
}

impl ServerHandler for DodoMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "dodo".to_string(),
                title: Some("dodo-doc".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Use `search` to find documents published on dodo-doc and \
                 `read_document` with a result URL to read one in full."
                    .to_string(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult::with_all_items(Self::tools())))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        Self::tools().into_iter().find(|t| t.name == name)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let (arg, result) = match request.name.as_ref() {
            SEARCH => match string_arg(&request.arguments, "query") {
                Some(query) => ("query", Some(self.search(query).await)),
                None => ("query", None),
            },
            READ_DOCUMENT => match string_arg(&request.arguments, "url") {
                Some(url) => ("url", Some(self.read_document(url).await)),
                None => ("url", None),
            },
            other => {
                return Err(McpError::new(
                    ErrorCode::METHOD_NOT_FOUND,
                    format!("no tool registered with name: {}", other),
                    None,
                ))
            }
        };
        match result {
            Some(Ok(text)) => Ok(CallToolResult::success(vec![Content::text(text)])),
            Some(Err(e)) => {
                tracing::warn!(tool = %request.name, error = %e, "tool call failed");
                Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
            }
            None => Ok(CallToolResult::error(vec![Content::text(format!(
                "`{}` argument is required",
                arg
            ))])),
        }
    }
}

/// Serve `handler` on stdin/stdout until the client disconnects.
pub async fn serve_stdio(handler: DodoMcp) -> anyhow::Result<()> {
    tracing::info!("starting MCP server on stdio");
    let service = handler.serve(rmcp::transport::stdio()).await?;
    service.waiting().await?;
    Ok(())
}
