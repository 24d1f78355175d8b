use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use crate::llm::client::{ChatRequest, JsonSchemaFormat, Message, ResponseFormat};
use crate::types::TokenUsage;

/// OpenRouter models known to honour `response_format: json_schema`.
pub const MODELS_WITH_STRUCTURED_OUTPUT: &[&str] = &[
    "openai/gpt-5",
    "openai/o4-mini",
    "openai/o4-mini-high",
    "openai/o3",
    "openai/gpt-oss-120b",
    "x-ai/grok-4",
    "google/gemini-2.5-pro",
    "google/gemini-2.5-flash",
    "qwen/qwen3-235b-a22b-2507",
    "qwen/qwen3-30b-a3b",
    "mistralai/magistral-medium-2506:thinking",
];

pub const MODELS_WITHOUT_STRUCTURED_OUTPUT: &[&str] = &["anthropic/claude-opus-4.1"];

const SCHEMA_NAME: &str = "analytics_report";

/// File-name slug of a model name (`openai/o4-mini` -> `openai-o4-mini`).
pub fn slug_for(model_name: &str) -> String {
    model_name.replace('/', "-")
}

/// Slugs of every listed model.
pub fn known_model_slugs() -> impl Iterator<Item = String> {
    MODELS_WITH_STRUCTURED_OUTPUT
        .iter()
        .chain(MODELS_WITHOUT_STRUCTURED_OUTPUT)
        .map(|m| slug_for(m))
}

/// USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub prompt_per_million: f64,
    pub completion_per_million: f64,
}

impl ModelPricing {
    const fn new(prompt_per_million: f64, completion_per_million: f64) -> Self {
        Self {
            prompt_per_million,
            completion_per_million,
        }
    }

    /// Rate card for `model`; unlisted models are priced like GPT-5.
    pub fn for_model(model: &str) -> Self {
        match model {
            "openai/o4-mini" | "openai/o4-mini-high" => Self::new(1.10, 4.40),
            "openai/o3" => Self::new(2.0, 8.0),
            "openai/gpt-oss-120b" => Self::new(0.073, 0.29),
            "x-ai/grok-4" => Self::new(3.0, 15.0),
            "google/gemini-2.5-pro" => Self::new(1.25, 10.0),
            "google/gemini-2.5-flash" => Self::new(0.30, 2.50),
            "qwen/qwen3-235b-a22b-2507" => Self::new(0.078, 0.312),
            "qwen/qwen3-30b-a3b" => Self::new(0.02, 0.08),
            "mistralai/magistral-medium-2506:thinking" => Self::new(2.0, 5.0),
            _ => Self::new(1.25, 10.0),
        }
    }

    /// `(prompt_cost, completion_cost)` in USD.
    pub fn cost(&self, usage: TokenUsage) -> (f64, f64) {
        (
            self.prompt_per_million * usage.prompt_tokens as f64 / 1_000_000.0,
            self.completion_per_million * usage.completion_tokens as f64 / 1_000_000.0,
        )
    }
}

/// Model-specific request settings: which model, the instruction prefix, and
/// the JSON schema the answer must follow.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub model_name: String,
    pub superprompt: String,
    /// `None` sends free-form requests.
    pub response_schema: Option<Value>,
}

impl LlmConfig {
    pub fn new(model_name: impl Into<String>, superprompt: impl Into<String>, response_schema: Option<Value>) -> Self {
        let cfg = Self {
            model_name: model_name.into(),
            superprompt: superprompt.into(),
            response_schema,
        };
        if !cfg.is_known_model() {
            warn!(model = %cfg.model_name, "Model is not in the known model list, it might be unsupported");
        }
        cfg
    }

    /// Load the superprompt and schema from disk. A missing superprompt leaves
    /// the prefix empty; a missing or invalid schema disables structured output.
    pub fn load(model_name: &str, superprompt_path: &Path, schema_path: &Path) -> Self {
        let superprompt = match std::fs::read_to_string(superprompt_path) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to load superprompt from {}, sending bare payloads: {e}", superprompt_path.display());
                String::new()
            }
        };

        let response_schema = std::fs::read_to_string(schema_path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str::<Value>(&text).map_err(|e| e.to_string()));
        let response_schema = match response_schema {
            Ok(schema) => {
                info!("Structured output enforced with schema {}", schema_path.display());
                Some(schema)
            }
            Err(e) => {
                warn!(
                    "Failed to load response schema from {}, structured output will not be enforced: {e}",
                    schema_path.display()
                );
                None
            }
        };

        Self::new(model_name, superprompt, response_schema)
    }

    pub fn is_known_model(&self) -> bool {
        let name = self.model_name.as_str();
        MODELS_WITH_STRUCTURED_OUTPUT.contains(&name) || MODELS_WITHOUT_STRUCTURED_OUTPUT.contains(&name)
    }

    pub fn model_slug(&self) -> String {
        slug_for(&self.model_name)
    }

    pub fn pricing(&self) -> ModelPricing {
        ModelPricing::for_model(&self.model_name)
    }

    pub fn build_prompt(&self, payload: &Value) -> String {
        let body = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
        if self.superprompt.trim().is_empty() {
            body
        } else {
            format!("{}\n\n{}", self.superprompt.trim_end(), body)
        }
    }

    pub fn build_request(&self, payload: &Value) -> ChatRequest {
        let response_format = self.response_schema.as_ref().map(|schema| ResponseFormat {
            format_type: "json_schema".to_string(),
            json_schema: JsonSchemaFormat {
                name: SCHEMA_NAME.to_string(),
                strict: true,
                schema: schema.clone(),
            },
        });

        ChatRequest {
            model: self.model_name.clone(),
            messages: vec![Message::user(&self.build_prompt(payload))],
            response_format,
        }
    }
}
