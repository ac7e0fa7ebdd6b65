//! Axum route handlers for the extraction API.

use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::errors::AppError;
use crate::extraction::SUPPORTED_EXTENSIONS;
use crate::llm_client::Usage;
use crate::processing::pipeline::{run_extraction, DocumentSummary, InputSource, UploadedFile};
use crate::processing::request::{
    ExtractOptions, ExtractionMode, ModelParams, MAX_TEMPERATURE, MIN_TEMPERATURE,
};
use crate::processing::response::{to_pretty, ExtractionResult, DOWNLOAD_FILE_NAME};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

/// Raw multipart form fields of `POST /api/v1/extract`.
#[derive(Default)]
pub struct ExtractForm {
    pub file: Option<UploadedFile>,
    pub text: Option<String>,
    pub mode: Option<String>,
    pub schema: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<String>,
    pub max_tokens: Option<String>,
    pub api_key: Option<String>,
    pub strict_schema: Option<String>,
}

/// A body cut off by the size limit surfaces as a multipart error; report it
/// against the configured upload limit rather than as a malformed form.
fn multipart_error(e: MultipartError, context: &str, max_upload_bytes: usize) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge {
            limit_bytes: max_upload_bytes,
        }
    } else {
        AppError::Validation(format!("{context}: {e}"))
    }
}

impl ExtractForm {
    pub async fn from_multipart(
        mut multipart: Multipart,
        max_upload_bytes: usize,
    ) -> Result<Self, AppError> {
        let mut form = ExtractForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, "Invalid form data", max_upload_bytes))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .filter(|n| !n.is_empty());
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(e, "Could not read upload", max_upload_bytes))?;
                if bytes.len() > max_upload_bytes {
                    return Err(AppError::PayloadTooLarge {
                        limit_bytes: max_upload_bytes,
                    });
                }
                // Browsers send an empty, nameless part when no file was chosen.
                if file_name.is_some() || !bytes.is_empty() {
                    form.file = Some(UploadedFile {
                        file_name,
                        content_type,
                        bytes,
                    });
                }
                continue;
            }

            let value = field
                .text()
                .await
                .map_err(|e| {
                    multipart_error(e, &format!("Could not read field '{name}'"), max_upload_bytes)
                })?;
            let slot = match name.as_str() {
                "text" => &mut form.text,
                "mode" => &mut form.mode,
                "schema" => &mut form.schema,
                "model" => &mut form.model,
                "temperature" => &mut form.temperature,
                "max_tokens" => &mut form.max_tokens,
                "api_key" => &mut form.api_key,
                "strict_schema" => &mut form.strict_schema,
                _ => continue,
            };
            *slot = Some(value).filter(|v| !v.trim().is_empty());
        }

        Ok(form)
    }

    /// Resolves options against the configured defaults.
    pub fn options(&self, state: &AppState) -> Result<ExtractOptions, AppError> {
        let config = &state.config;
        let temperature = match self.temperature.as_deref() {
            Some(t) => t.trim().parse::<f32>().map_err(|_| {
                AppError::Validation(format!("temperature must be a number, got '{t}'"))
            })?,
            None => config.default_temperature,
        };
        let max_tokens = match self.max_tokens.as_deref() {
            Some(m) => m.trim().parse::<u32>().map_err(|_| {
                AppError::Validation(format!("max_tokens must be a positive integer, got '{m}'"))
            })?,
            None => config.default_max_tokens,
        };

        Ok(ExtractOptions {
            mode: ExtractionMode::from_form(self.mode.as_deref(), self.schema.clone())?,
            params: ModelParams {
                model: self
                    .model
                    .clone()
                    .unwrap_or_else(|| config.default_model().to_string()),
                temperature,
                max_tokens,
            },
            strict_schema: matches!(
                self.strict_schema.as_deref().map(str::trim),
                Some("true" | "on" | "1")
            ),
        })
    }

    /// The request's key wins over the server's.
    pub fn api_key<'a>(&'a self, state: &'a AppState) -> Result<&'a str, AppError> {
        self.api_key
            .as_deref()
            .or(state.config.openai_api_key.as_deref())
            .map(str::trim)
            .ok_or(AppError::MissingApiKey)
    }
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub request_id: Uuid,
    pub extracted_at: DateTime<Utc>,
    pub mode: &'static str,
    pub model: String,
    pub document: DocumentSummary,
    pub result: ExtractionResult,
    pub download_file_name: &'static str,
    pub usage: Option<Usage>,
}

#[derive(Debug, Serialize)]
pub struct Defaults {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Serialize)]
pub struct OptionsResponse {
    pub models: Vec<String>,
    pub defaults: Defaults,
    pub temperature_range: [f32; 2],
    pub modes: [&'static str; 2],
    pub supported_extensions: &'static [&'static str],
    pub server_api_key: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/extract
///
/// Multipart form: `file` or `text`, plus `mode`, `schema`, `model`,
/// `temperature`, `max_tokens`, `api_key`, `strict_schema`.
pub async fn handle_extract(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ExtractResponse>, AppError> {
    let form = ExtractForm::from_multipart(multipart, state.config.max_upload_bytes).await?;
    let api_key = form.api_key(&state)?;
    let options = form.options(&state)?;
    let input = InputSource::select(form.file.clone(), form.text.clone())?;

    let outcome = run_extraction(state.llm.as_ref(), api_key, input, &options).await?;

    Ok(Json(ExtractResponse {
        request_id: Uuid::new_v4(),
        extracted_at: Utc::now(),
        mode: options.mode.name(),
        model: outcome.model,
        document: outcome.document,
        result: outcome.result,
        download_file_name: DOWNLOAD_FILE_NAME,
        usage: outcome.usage,
    }))
}

/// POST /api/v1/download
///
/// Echoes a JSON result back pretty-printed as a file attachment.
pub async fn handle_download(Json(data): Json<Value>) -> Result<impl IntoResponse, AppError> {
    let body = to_pretty(&data)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{DOWNLOAD_FILE_NAME}\""),
            ),
        ],
        body,
    ))
}

/// GET /api/v1/options
///
/// What the page needs to render its controls.
pub async fn handle_options(State(state): State<AppState>) -> Json<OptionsResponse> {
    let config = &state.config;
    Json(OptionsResponse {
        models: config.models.clone(),
        defaults: Defaults {
            model: config.default_model().to_string(),
            temperature: config.default_temperature,
            max_tokens: config.default_max_tokens,
        },
        temperature_range: [MIN_TEMPERATURE, MAX_TEMPERATURE],
        modes: ["automatic", "schema_guided"],
        supported_extensions: SUPPORTED_EXTENSIONS,
        server_api_key: config.openai_api_key.is_some(),
    })
}
