//! One extraction run: Idle → InputReceived → Extracting → Requesting → Success | Failure.
//!
//! Each run owns its input and result; nothing survives between runs.

use std::fmt;

use bytes::Bytes;
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::extraction::{self, DocumentFormat, ExtractedDocument};
use crate::llm_client::{CompletionProvider, Usage};
use crate::processing::request::{build_request, ExtractOptions};
use crate::processing::response::{handle_model_output, ExtractionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    InputReceived,
    Extracting,
    Requesting,
    Success,
    Failure,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::InputReceived => "input_received",
            Stage::Extracting => "extracting",
            Stage::Requesting => "requesting",
            Stage::Success => "success",
            Stage::Failure => "failure",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// The document to process. An upload always wins over pasted text.
#[derive(Debug, Clone)]
pub enum InputSource {
    Upload(UploadedFile),
    Pasted(String),
}

impl InputSource {
    pub fn select(upload: Option<UploadedFile>, pasted: Option<String>) -> Result<Self, AppError> {
        match (upload, pasted.filter(|t| !t.trim().is_empty())) {
            (Some(file), _) => Ok(InputSource::Upload(file)),
            (None, Some(text)) => Ok(InputSource::Pasted(text)),
            (None, None) => Err(AppError::Validation(
                "Please upload a file or paste text".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub format: DocumentFormat,
    pub source_name: Option<String>,
    pub characters: usize,
}

impl From<&ExtractedDocument> for DocumentSummary {
    fn from(doc: &ExtractedDocument) -> Self {
        Self {
            format: doc.format,
            source_name: doc.source_name.clone(),
            characters: doc.text.chars().count(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub document: DocumentSummary,
    pub model: String,
    pub usage: Option<Usage>,
    pub result: ExtractionResult,
}

/// Runs one extraction end to end. Errors are returned, never retried.
pub async fn run_extraction(
    provider: &dyn CompletionProvider,
    api_key: &str,
    input: InputSource,
    options: &ExtractOptions,
) -> Result<ExtractionOutcome, AppError> {
    let outcome = run_stages(provider, api_key, input, options).await;
    match &outcome {
        Ok(o) => info!(
            stage = %Stage::Success,
            model = %o.model,
            fields = ?o.result.analysis.total_fields,
            "extraction finished"
        ),
        Err(e) => warn!(stage = %Stage::Failure, error = %e, "extraction failed"),
    }
    outcome
}

async fn run_stages(
    provider: &dyn CompletionProvider,
    api_key: &str,
    input: InputSource,
    options: &ExtractOptions,
) -> Result<ExtractionOutcome, AppError> {
    // Fail on bad parameters before spending time on extraction.
    options.params.validate()?;
    info!(stage = %Stage::InputReceived, mode = options.mode.name(), "extraction requested");

    info!(stage = %Stage::Extracting, "extracting text");
    let document = match input {
        InputSource::Upload(file) => {
            extraction::extract_upload(
                file.file_name.as_deref(),
                file.content_type.as_deref(),
                file.bytes,
            )
            .await?
        }
        InputSource::Pasted(text) => extraction::extract_pasted(text)?,
    };
    let summary = DocumentSummary::from(&document);

    let request = build_request(&options.mode, &document.text, &options.params)?;
    info!(
        stage = %Stage::Requesting,
        model = %request.model,
        characters = summary.characters,
        "calling model"
    );
    let completion = provider.complete(api_key, &request).await?;
    if completion.finish_reason.as_deref() == Some("length") {
        warn!(
            max_tokens = request.max_tokens,
            "model stopped at the token limit; output is likely truncated"
        );
    }

    let result = handle_model_output(
        &completion.text,
        options.mode.schema(),
        options.strict_schema,
    )?;

    Ok(ExtractionOutcome {
        document: summary,
        model: completion.model,
        usage: completion.usage,
        result,
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::StubProvider;
    use super::*;
    use crate::processing::request::{ExtractionMode, ModelParams};

    const INVOICE: &str = "Invoice #123 dated 2024-01-01, total $50.00";
    const INVOICE_SCHEMA: &str = r#"{"invoice_number": string, "date": string, "total": number}"#;

    fn options(mode: ExtractionMode) -> ExtractOptions {
        ExtractOptions {
            mode,
            params: ModelParams {
                model: "gpt-4-turbo-preview".into(),
                temperature: 0.3,
                max_tokens: 1500,
            },
            strict_schema: false,
        }
    }

    #[test]
    fn test_upload_takes_precedence_over_paste() {
        let upload = UploadedFile {
            file_name: Some("a.txt".into()),
            content_type: None,
            bytes: Bytes::from_static(b"file text"),
        };
        let input = InputSource::select(Some(upload), Some("pasted".into())).unwrap();
        assert!(matches!(input, InputSource::Upload(_)));
    }

    #[test]
    fn test_no_input_is_validation_error() {
        let err = InputSource::select(None, Some("   ".into())).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m.contains("upload a file or paste text")));
    }

    #[tokio::test]
    async fn test_invoice_schema_guided_end_to_end() {
        let provider = StubProvider::replying(
            r#"{"invoice_number": "123", "date": "2024-01-01", "total": 50.00}"#,
        );
        let mode = ExtractionMode::SchemaGuided {
            schema: INVOICE_SCHEMA.into(),
        };

        let outcome = run_extraction(
            &provider,
            "sk-test",
            InputSource::Pasted(INVOICE.into()),
            &options(mode),
        )
        .await
        .unwrap();

        let data = outcome.result.data.as_object().unwrap();
        let mut keys: Vec<&str> = data.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(keys, vec!["date", "invoice_number", "total"]);
        assert_eq!(data["invoice_number"], "123");
        assert_eq!(data["total"].as_f64(), Some(50.0));
        assert!(outcome.result.conformance.unwrap().conforms);
        assert_eq!(outcome.document.format, DocumentFormat::Pasted);

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "sk-test");
        assert!(requests[0].1.messages[1].content.contains(INVOICE_SCHEMA));
        assert!(requests[0].1.messages[1].content.contains(INVOICE));
    }

    #[tokio::test]
    async fn test_automatic_mode_yields_parseable_json() {
        let provider = StubProvider::replying(
            "```json\n{\"entities\": {\"organizations\": [\"ACME\"]}, \"confidence\": 0.8}\n```",
        );
        let outcome = run_extraction(
            &provider,
            "sk-test",
            InputSource::Pasted("ACME signed a contract.".into()),
            &options(ExtractionMode::Automatic),
        )
        .await
        .unwrap();
        assert!(outcome.result.data.is_object());
        assert!(outcome.result.conformance.is_none());
        assert_eq!(outcome.result.analysis.average_confidence, Some(0.8));
    }

    #[tokio::test]
    async fn test_unsupported_upload_never_reaches_model() {
        let provider = StubProvider::replying("{}");
        let input = InputSource::Upload(UploadedFile {
            file_name: Some("photo.jpg".into()),
            content_type: Some("image/jpeg".into()),
            bytes: Bytes::from_static(b"\xFF\xD8\xFF"),
        });
        let err = run_extraction(&provider, "sk-test", input, &options(ExtractionMode::Automatic))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnsupportedFormat(_)));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_params_never_reach_model() {
        let provider = StubProvider::replying("{}");
        let mut opts = options(ExtractionMode::Automatic);
        opts.params.temperature = 5.0;
        let err = run_extraction(&provider, "sk-test", InputSource::Pasted(INVOICE.into()), &opts)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_is_api_failure() {
        let provider = StubProvider::failing(429, "Rate limit reached");
        let err = run_extraction(
            &provider,
            "sk-test",
            InputSource::Pasted(INVOICE.into()),
            &options(ExtractionMode::Automatic),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::ApiFailure(ref m) if m.contains("Rate limit reached")));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_non_json_reply_is_malformed() {
        let provider = StubProvider::replying("I could not find an invoice.");
        let err = run_extraction(
            &provider,
            "sk-test",
            InputSource::Pasted(INVOICE.into()),
            &options(ExtractionMode::Automatic),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            AppError::MalformedModelOutput { ref raw_output, .. } if raw_output == "I could not find an invoice."
        ));
    }

    #[tokio::test]
    async fn test_repeated_identical_runs_are_independent() {
        let provider = StubProvider::replying(r#"{"name": "Ada", "date": "1843-07-01"}"#);
        let mode = ExtractionMode::SchemaGuided {
            schema: r#"{"name": string, "date": string}"#.into(),
        };
        let opts = options(mode);

        let first = run_extraction(&provider, "sk-test", InputSource::Pasted("Ada, 1843".into()), &opts)
            .await
            .unwrap();
        let second = run_extraction(&provider, "sk-test", InputSource::Pasted("Ada, 1843".into()), &opts)
            .await
            .unwrap();

        assert_eq!(first.result.data, second.result.data);
        assert_eq!(first.result.pretty, second.result.pretty);
        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests[0].1.messages, requests[1].1.messages);
    }
}
