use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use super::types::{CallToolRequest, CallToolResponse, Tool, ToolContent};
use crate::error::{AppError, Result};
use crate::flows::{envelope, FlowContext};

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, ctx: &FlowContext, arguments: Option<Value>) -> Result<CallToolResponse>;
    fn definition(&self) -> Tool;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: ToolHandler + 'static>(&mut self, tool: T) {
        let name = tool.definition().name.clone();
        self.tools.insert(name, Box::new(tool));
    }

    pub fn get_tool(&self, name: &str) -> Option<&dyn ToolHandler> {
        self.tools.get(name).map(|tool| tool.as_ref())
    }

    /// Tool definitions sorted by name.
    pub fn list_tools(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self.tools.values().map(|tool| tool.definition()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub async fn call_tool(
        &self,
        ctx: &FlowContext,
        request: CallToolRequest,
    ) -> Result<CallToolResponse> {
        match self.get_tool(&request.name) {
            Some(tool) => tool.call(ctx, request.arguments).await,
            None => Err(AppError::ToolNotFound(request.name)),
        }
    }
}

/// Wrap a flow envelope as tool output. `isError` mirrors `success: false`.
pub fn create_envelope_response(result: &Value) -> Result<CallToolResponse> {
    Ok(CallToolResponse {
        content: vec![ToolContent {
            content_type: "text".to_string(),
            text: serde_json::to_string_pretty(result)?,
        }],
        is_error: (!envelope::is_success(result)).then_some(true),
    })
}

// Utility function to extract and validate parameters
pub fn extract_param<T>(arguments: &Option<Value>, key: &str) -> Result<T>
where
    T: for<'de> serde::Deserialize<'de>,
{
    match arguments {
        Some(Value::Object(map)) => match map.get(key) {
            Some(value) if !value.is_null() => serde_json::from_value(value.clone())
                .map_err(|e| AppError::BadRequest(format!("Invalid parameter '{}': {}", key, e))),
            _ => Err(AppError::BadRequest(format!(
                "Missing required parameter '{}'",
                key
            ))),
        },
        None => Err(AppError::BadRequest(format!(
            "Missing required parameter '{}'",
            key
        ))),
        _ => Err(AppError::BadRequest(
            "Arguments must be an object".to_string(),
        )),
    }
}

pub fn extract_optional_param<T>(arguments: &Option<Value>, key: &str) -> Result<Option<T>>
where
    T: for<'de> serde::Deserialize<'de>,
{
    match arguments {
        Some(Value::Object(map)) => match map.get(key) {
            Some(value) if !value.is_null() => {
                let parsed: T = serde_json::from_value(value.clone()).map_err(|e| {
                    AppError::BadRequest(format!("Invalid parameter '{}': {}", key, e))
                })?;
                Ok(Some(parsed))
            }
            _ => Ok(None),
        },
        None => Ok(None),
        _ => Err(AppError::BadRequest(
            "Arguments must be an object".to_string(),
        )),
    }
}
