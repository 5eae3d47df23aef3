//! The six protocol operations the gateway forwards to the backend

use rmcp::model::{GetPromptResult, JsonObject, Prompt, Resource, Tool};

use crate::backend::{BackendClient, BackendError, ResourcePayload, ToolOutcome};

#[derive(Debug, Clone)]
pub enum Operation {
    ListTools,
    CallTool {
        name: String,
        arguments: Option<JsonObject>,
    },
    ListResources,
    ReadResource {
        uri: String,
    },
    ListPrompts,
    GetPrompt {
        name: String,
        arguments: Option<JsonObject>,
    },
}

#[derive(Debug)]
pub enum OperationOutput {
    Tools(Vec<Tool>),
    ToolOutcome(ToolOutcome),
    Resources(Vec<Resource>),
    ResourceContents(Vec<ResourcePayload>),
    Prompts(Vec<Prompt>),
    Prompt(GetPromptResult),
}

impl Operation {
    /// Backend JSON-RPC method name
    pub fn method(&self) -> &'static str {
        match self {
            Operation::ListTools => "tools/list",
            Operation::CallTool { .. } => "tools/call",
            Operation::ListResources => "resources/list",
            Operation::ReadResource { .. } => "resources/read",
            Operation::ListPrompts => "prompts/list",
            Operation::GetPrompt { .. } => "prompts/get",
        }
    }

    /// Tool name, prompt name or resource URI, if the operation has one
    pub fn target(&self) -> Option<&str> {
        match self {
            Operation::CallTool { name, .. } | Operation::GetPrompt { name, .. } => Some(name),
            Operation::ReadResource { uri } => Some(uri),
            _ => None,
        }
    }

    /// Catalog reads surface backend errors as retryable failures
    pub fn is_catalog_read(&self) -> bool {
        !matches!(self, Operation::CallTool { .. })
    }

    pub async fn execute(self, client: &BackendClient) -> Result<OperationOutput, BackendError> {
        match self {
            Operation::ListTools => client.list_tools().await.map(OperationOutput::Tools),
            Operation::CallTool { name, arguments } => client
                .call_tool(&name, arguments)
                .await
                .map(OperationOutput::ToolOutcome),
            Operation::ListResources => client.list_resources().await.map(OperationOutput::Resources),
            Operation::ReadResource { uri } => client
                .read_resource(&uri)
                .await
                .map(OperationOutput::ResourceContents),
            Operation::ListPrompts => client.list_prompts().await.map(OperationOutput::Prompts),
            Operation::GetPrompt { name, arguments } => client
                .get_prompt(&name, arguments)
                .await
                .map(OperationOutput::Prompt),
        }
    }
}

impl OperationOutput {
    pub fn kind(&self) -> &'static str {
        match self {
            OperationOutput::Tools(_) => "tools",
            OperationOutput::ToolOutcome(_) => "tool_outcome",
            OperationOutput::Resources(_) => "resources",
            OperationOutput::ResourceContents(_) => "resource_contents",
            OperationOutput::Prompts(_) => "prompts",
            OperationOutput::Prompt(_) => "prompt",
        }
    }
}
