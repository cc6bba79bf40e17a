//! Prompt templates rendered from live backend data.

use std::sync::Arc;

use serde_json::Value;

use super::types::{GetPromptResult, PromptArgument, PromptInfo};
use crate::consul::ConsulBackend;
use crate::utils::args::{optional_str, required_str};

#[derive(Debug, Clone)]
pub struct PromptRegistry {
    backend: Arc<dyn ConsulBackend>,
    prompts: Vec<PromptInfo>,
}

impl PromptRegistry {
    pub fn new(backend: Arc<dyn ConsulBackend>) -> Self {
        let prompts = vec![
            PromptInfo {
                name: "service_discovery".to_string(),
                description: "Discover and list services in Consul".to_string(),
                arguments: vec![PromptArgument {
                    name: "datacenter".to_string(),
                    description: "Datacenter to query (optional)".to_string(),
                    required: false,
                }],
            },
            PromptInfo {
                name: "service_health_check".to_string(),
                description: "Check health status of a service".to_string(),
                arguments: vec![PromptArgument {
                    name: "service_name".to_string(),
                    description: "Name of the service to check".to_string(),
                    required: true,
                }],
            },
        ];
        Self { backend, prompts }
    }

    pub fn all(&self) -> &[PromptInfo] {
        &self.prompts
    }

    /// Render a prompt. Unknown names and backend failures render an
    /// `Error` result instead of failing.
    pub async fn get(&self, name: &str, arguments: Option<Value>) -> GetPromptResult {
        tracing::info!(prompt = name, "Getting prompt");
        let args = arguments.unwrap_or(Value::Null);

        let rendered = match name {
            "service_discovery" => self.service_discovery(&args).await,
            "service_health_check" => self.service_health_check(&args).await,
            _ => Err(format!("Unknown prompt: {}", name)),
        };

        rendered.unwrap_or_else(|message| {
            tracing::error!(prompt = name, error = %message, "Error getting prompt");
            GetPromptResult::user_text("Error", format!("Error: {}", message))
        })
    }

    async fn service_discovery(&self, args: &Value) -> Result<GetPromptResult, String> {
        let dc = optional_str(args, "datacenter");
        let services = self
            .backend
            .list_services(dc)
            .await
            .map_err(|e| e.to_string())?;

        let listing: Vec<String> = services.iter().map(|s| format!("- {}", s)).collect();
        let text = format!(
            "Found {} services in Consul:\n{}",
            services.len(),
            listing.join("\n")
        );
        Ok(GetPromptResult::user_text("Service discovery results", text))
    }

    async fn service_health_check(&self, args: &Value) -> Result<GetPromptResult, String> {
        let service_name = required_str(args, "service_name")?;
        let entries = self
            .backend
            .service_health(service_name, None)
            .await
            .map_err(|e| e.to_string())?;

        let passing = entries.iter().filter(|e| e.status() == "passing").count();
        let details: Vec<String> = entries
            .iter()
            .map(|e| format!("- {}: {}", e.node.node, e.status()))
            .collect();

        tracing::info!(
            service = service_name,
            passing,
            total = entries.len(),
            "Health check completed"
        );

        let text = format!(
            "Service: {}\nHealth Status: {}/{} instances passing\nDetails:\n{}",
            service_name,
            passing,
            entries.len(),
            details.join("\n")
        );
        Ok(GetPromptResult::user_text(
            format!("Health check for {}", service_name),
            text,
        ))
    }
}
