//! Prompt/request builder — turns extracted text, the extraction mode and the
//! user's model parameters into a single chat-completion request.

use serde::Serialize;

use crate::errors::AppError;
use crate::llm_client::prompts::JSON_ONLY_SYSTEM;
use crate::llm_client::{ChatMessage, CompletionRequest, Role};
use crate::processing::prompts::{AUTOMATIC_PROMPT, SCHEMA_GUIDED_PROMPT};

pub const MIN_TEMPERATURE: f32 = 0.0;
pub const MAX_TEMPERATURE: f32 = 2.0;

/// How the output JSON is shaped.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionMode {
    /// The model picks the structure.
    Automatic,
    /// The model follows the user's template. The text is sent verbatim, unvalidated.
    SchemaGuided { schema: String },
}

impl ExtractionMode {
    /// Parses the form's `mode` value. Missing means automatic.
    pub fn from_form(mode: Option<&str>, schema: Option<String>) -> Result<Self, AppError> {
        match mode.map(str::trim).unwrap_or("automatic") {
            "" | "automatic" => Ok(ExtractionMode::Automatic),
            "schema_guided" | "schema" => {
                let schema = schema
                    .filter(|s| !s.trim().is_empty())
                    .ok_or_else(|| {
                        AppError::Validation(
                            "Schema-guided extraction needs a JSON schema template".to_string(),
                        )
                    })?;
                Ok(ExtractionMode::SchemaGuided { schema })
            }
            other => Err(AppError::Validation(format!(
                "Unknown extraction mode '{other}' (expected 'automatic' or 'schema_guided')"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExtractionMode::Automatic => "automatic",
            ExtractionMode::SchemaGuided { .. } => "schema_guided",
        }
    }

    pub fn schema(&self) -> Option<&str> {
        match self {
            ExtractionMode::Automatic => None,
            ExtractionMode::SchemaGuided { schema } => Some(schema.as_str()),
        }
    }
}

/// User-tunable model parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ModelParams {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.model.trim().is_empty() {
            return Err(AppError::Validation("model cannot be empty".to_string()));
        }
        if !self.temperature.is_finite()
            || !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&self.temperature)
        {
            return Err(AppError::Validation(format!(
                "temperature must be between {MIN_TEMPERATURE} and {MAX_TEMPERATURE}, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(AppError::Validation(
                "max_tokens must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything the pipeline needs besides the input and the credential.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub mode: ExtractionMode,
    pub params: ModelParams,
    /// Reject schema-guided output whose top-level fields don't match the schema.
    /// Only enforceable when field names can be read from the schema text;
    /// otherwise the result passes with a warning attached.
    pub strict_schema: bool,
}

pub fn build_prompt(mode: &ExtractionMode, document: &str) -> String {
    match mode {
        ExtractionMode::Automatic => AUTOMATIC_PROMPT.replace("{document}", document),
        ExtractionMode::SchemaGuided { schema } => SCHEMA_GUIDED_PROMPT
            .replace("{schema}", schema)
            .replace("{document}", document),
    }
}

/// Builds the request payload. Parameters are validated first.
pub fn build_request(
    mode: &ExtractionMode,
    document: &str,
    params: &ModelParams,
) -> Result<CompletionRequest, AppError> {
    params.validate()?;

    Ok(CompletionRequest {
        model: params.model.trim().to_string(),
        messages: vec![
            ChatMessage {
                role: Role::System,
                content: JSON_ONLY_SYSTEM.to_string(),
            },
            ChatMessage {
                role: Role::User,
                content: build_prompt(mode, document),
            },
        ],
        temperature: params.temperature,
        max_tokens: params.max_tokens,
    })
}
