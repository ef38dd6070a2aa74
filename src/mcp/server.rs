use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use super::{eda_tools::*, tools::ToolRegistry, types::*, MCP_PROTOCOL_VERSION, SERVER_NAME};
use crate::error::AppError;
use crate::flows::FlowContext;

pub struct McpServer {
    pub tools: ToolRegistry,
    context: FlowContext,
}

/// Macro to register multiple tools at once
macro_rules! register_tools {
    ($registry:expr, $($tool:expr),+ $(,)?) => {
        $(
            $registry.register($tool);
        )+
    };
}

impl McpServer {
    pub fn new(context: FlowContext) -> Self {
        let mut tools = ToolRegistry::new();

        register_tools!(
            tools,
            // Flows that create projects
            SynthesizeVerilogTool,
            SimulateVerilogTool,
            RunOpenlaneTool,
            // Tools operating on existing projects
            ViewWaveformTool,
            ViewGdsTool,
            ReadOpenlaneReportsTool,
        );

        Self { tools, context }
    }

    pub fn context(&self) -> &FlowContext {
        &self.context
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        debug!("Handling MCP request: {}", request.method);

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "notifications/initialized" => self.handle_initialized(),
            "ping" => Ok(json!({})),
            "tools/list" => self.handle_list_tools(),
            "tools/call" => self.handle_call_tool(request.params).await,
            _ => Err(JsonRpcError::new(
                METHOD_NOT_FOUND,
                format!("Method '{}' not found", request.method),
            )),
        };

        match response {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(error) => JsonRpcResponse::failure(request.id, error),
        }
    }

    fn handle_initialize(&self, params: Option<Value>) -> std::result::Result<Value, JsonRpcError> {
        info!("Handling initialize request");

        let request: InitializeRequest = match params {
            Some(params) => serde_json::from_value(params).map_err(|e| {
                JsonRpcError::new(INVALID_PARAMS, format!("Invalid initialize params: {}", e))
            })?,
            None => {
                return Err(JsonRpcError::new(
                    INVALID_PARAMS,
                    "Missing initialize parameters",
                ))
            }
        };

        info!(
            "Client {} requested protocol {}, server speaks {}",
            request.client_info.name, request.protocol_version, MCP_PROTOCOL_VERSION
        );

        let response = InitializeResponse {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        serde_json::to_value(response).map_err(|e| {
            JsonRpcError::new(
                INTERNAL_ERROR,
                format!("Failed to serialize response: {}", e),
            )
        })
    }

    fn handle_initialized(&self) -> std::result::Result<Value, JsonRpcError> {
        info!("Client finished initialization");
        Ok(Value::Null)
    }

    fn handle_list_tools(&self) -> std::result::Result<Value, JsonRpcError> {
        let response = ListToolsResponse {
            tools: self.tools.list_tools(),
        };
        serde_json::to_value(response).map_err(|e| {
            JsonRpcError::new(INTERNAL_ERROR, format!("Failed to serialize tools: {}", e))
        })
    }

    async fn handle_call_tool(
        &self,
        params: Option<Value>,
    ) -> std::result::Result<Value, JsonRpcError> {
        let request: CallToolRequest = match params {
            Some(params) => serde_json::from_value(params).map_err(|e| {
                JsonRpcError::new(INVALID_PARAMS, format!("Invalid call_tool params: {}", e))
            })?,
            None => {
                return Err(JsonRpcError::new(
                    INVALID_PARAMS,
                    "Missing call_tool parameters",
                ))
            }
        };

        let tool_name = request.name.clone();
        info!("Calling tool: {}", tool_name);

        let response = self
            .tools
            .call_tool(&self.context, request)
            .await
            .map_err(|e| match e {
                AppError::ToolNotFound(_) => {
                    warn!("Unknown tool requested: {}", tool_name);
                    JsonRpcError::new(METHOD_NOT_FOUND, e.to_string())
                }
                AppError::BadRequest(message) => {
                    warn!("Rejected call to '{}': {}", tool_name, message);
                    JsonRpcError::new(
                        INVALID_PARAMS,
                        format!("Invalid parameters for tool '{}': {}", tool_name, message),
                    )
                }
                other => {
                    error!("Tool execution error: {}", other);
                    JsonRpcError::new(
                        INTERNAL_ERROR,
                        format!("Tool execution failed: {}", other),
                    )
                }
            })?;

        serde_json::to_value(response).map_err(|e| {
            JsonRpcError::new(
                INTERNAL_ERROR,
                format!("Failed to serialize tool response: {}", e),
            )
        })
    }
}
