//! Tool server exposing the `generate_image` tool.
//!
//! Owns the full translation pipeline: normalize arguments, build the
//! upstream payload, call NovelAI, decode the response. Pipeline errors are
//! converted into error-flagged tool results at this boundary; one failed
//! generation must not disrupt the session.

use crate::client::NovelAiClient;
use crate::decode::decode_image;
use crate::error::Error;
use crate::params::{GenerateImageArgs, normalize};
use crate::upstream::build_payload;
use rmcp::ErrorData as McpError;
use rmcp::model::{
    CallToolResult, Content, ListToolsResult, ServerCapabilities, ServerInfo, Tool,
};
use serde_json::Value;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Name of the single exposed tool.
pub const GENERATE_IMAGE_TOOL: &str = "generate_image";

/// MCP tool server for NovelAI image generation.
#[derive(Clone)]
pub struct ImageServer {
    client: Arc<NovelAiClient>,
}

impl ImageServer {
    /// Create a new server around a NovelAI client.
    pub fn new(client: NovelAiClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    /// Server identity and capabilities for the initialize handshake.
    pub fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Image generation server backed by the NovelAI Diffusion V4.5 Full model. \
                 Call generate_image whenever the user asks to draw, generate, or create \
                 an image. Use the characters array for single- and multi-character \
                 scenes alike."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    /// List the exposed tools.
    pub fn list_tools(&self) -> ListToolsResult {
        use schemars::schema_for;

        let schema = schema_for!(GenerateImageArgs);
        let schema_value = serde_json::to_value(&schema).unwrap_or_default();
        let input_schema = match schema_value {
            Value::Object(map) => Arc::new(map),
            _ => Arc::new(serde_json::Map::new()),
        };

        ListToolsResult {
            tools: vec![Tool {
                name: Cow::Borrowed(GENERATE_IMAGE_TOOL),
                description: Some(Cow::Borrowed(
                    "Generate an image with the NovelAI V4.5 Full model. Call this \
                     immediately when the user asks to draw, generate, or create any \
                     kind of image: anime, realistic, landscapes, portraits, scenes. \
                     Describe the overall scene in base_prompt and define every \
                     character (even a single one, centered at x=0.5) in the \
                     characters array. Returns base64-encoded PNG data.",
                )),
                input_schema,
                annotations: None,
                icons: None,
                meta: None,
                output_schema: None,
                title: None,
            }],
            next_cursor: None,
            meta: None,
        }
    }

    /// Dispatch a tool call by name.
    ///
    /// Pipeline failures come back as `Ok` with an error-flagged result;
    /// only an unknown tool name is a protocol-level error.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> Result<CallToolResult, McpError> {
        match name {
            GENERATE_IMAGE_TOOL => {
                let args = arguments.unwrap_or(Value::Object(serde_json::Map::new()));
                match self.generate_image(args).await {
                    Ok(result) => Ok(result),
                    Err(e) => {
                        error!(error = %e, "Image generation failed");
                        Ok(CallToolResult::error(vec![Content::text(format!(
                            "Error: {e}"
                        ))]))
                    }
                }
            }
            other => Err(McpError::invalid_params(
                format!("Unknown tool: {other}"),
                None,
            )),
        }
    }

    /// Run the generation pipeline end to end.
    #[instrument(level = "info", name = "generate_image_tool", skip_all)]
    async fn generate_image(&self, args: Value) -> Result<CallToolResult, Error> {
        let request = normalize(args)?;
        info!(
            seed = request.seed,
            width = request.width,
            height = request.height,
            characters = request.characters.len(),
            "Generating image"
        );

        let payload = build_payload(&request);
        let bytes = self.client.generate_image(&payload).await?;
        let data = decode_image(&bytes)?;

        Ok(CallToolResult::success(vec![Content::image(
            data,
            "image/png".to_string(),
        )]))
    }
}
