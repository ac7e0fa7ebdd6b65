//! Response handler — parses the model's reply as JSON and summarizes it.
//!
//! The only normalization applied is stripping markdown code fences. Anything
//! that still fails to parse is `MalformedModelOutput`, with the raw text kept
//! for the user to inspect.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;

use tracing::warn;

use crate::errors::AppError;
use crate::llm_client::strip_json_fences;

/// File name offered for the downloadable result.
pub const DOWNLOAD_FILE_NAME: &str = "extracted_data.json";

/// A successfully parsed model reply.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub data: Value,
    /// `data` pretty-printed with two-space indentation; the download body.
    pub pretty: String,
    pub analysis: ResultAnalysis,
    /// Present in schema-guided mode when the schema's fields could be read.
    pub conformance: Option<SchemaConformance>,
    /// Checks that were requested but could not run.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

pub const SCHEMA_UNCHECKED_WARNING: &str =
    "Strict schema checking was requested, but no field names could be read from the schema; the result was not checked";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultAnalysis {
    /// Top-level key count; `None` unless the result is an object.
    pub total_fields: Option<usize>,
    pub confidence_scores: usize,
    pub average_confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaConformance {
    pub expected_fields: Vec<String>,
    pub missing_fields: Vec<String>,
    pub unexpected_fields: Vec<String>,
    pub conforms: bool,
}

/// Parses raw model text into a JSON value.
pub fn parse_model_output(raw: &str) -> Result<Value, AppError> {
    serde_json::from_str(strip_json_fences(raw)).map_err(|e| AppError::MalformedModelOutput {
        message: e.to_string(),
        raw_output: raw.to_string(),
    })
}

/// Parses the reply and builds the full result. With `strict`, a schema-guided
/// reply whose fields don't match the schema is rejected as malformed. A
/// strict request whose schema yields no field names passes with a warning.
pub fn handle_model_output(
    raw: &str,
    schema: Option<&str>,
    strict: bool,
) -> Result<ExtractionResult, AppError> {
    let data = parse_model_output(raw)?;
    let conformance = schema.and_then(|s| check_conformance(s, &data));
    let mut warnings = Vec::new();

    if strict && schema.is_some() && conformance.is_none() {
        warn!("strict schema check skipped: no fields could be read from the schema");
        warnings.push(SCHEMA_UNCHECKED_WARNING.to_string());
    }

    if strict {
        if let Some(c) = conformance.as_ref().filter(|c| !c.conforms) {
            return Err(AppError::MalformedModelOutput {
                message: format!(
                    "output does not match the schema (missing: [{}], unexpected: [{}])",
                    c.missing_fields.join(", "),
                    c.unexpected_fields.join(", ")
                ),
                raw_output: raw.to_string(),
            });
        }
    }

    Ok(ExtractionResult {
        pretty: to_pretty(&data)?,
        analysis: analyze(&data),
        conformance,
        warnings,
        data,
    })
}

pub fn to_pretty(data: &Value) -> Result<String, AppError> {
    serde_json::to_string_pretty(data).map_err(|e| AppError::Internal(e.into()))
}

pub fn analyze(data: &Value) -> ResultAnalysis {
    let mut scores = Vec::new();
    collect_confidences(data, &mut scores);

    ResultAnalysis {
        total_fields: data.as_object().map(|o| o.len()),
        confidence_scores: scores.len(),
        average_confidence: (!scores.is_empty())
            .then(|| scores.iter().sum::<f64>() / scores.len() as f64),
    }
}

fn is_confidence_key(key: &str) -> bool {
    key.to_ascii_lowercase().contains("confidence")
}

/// Collects every numeric value stored under a key mentioning "confidence",
/// at any depth.
fn collect_confidences(value: &Value, out: &mut Vec<f64>) {
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                if is_confidence_key(key) {
                    if let Some(n) = v.as_f64() {
                        out.push(n);
                        continue;
                    }
                }
                collect_confidences(v, out);
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_confidences(v, out)),
        _ => {}
    }
}

/// Compares the result's top-level keys with the fields the schema names.
/// Returns `None` when no field list can be read from the schema text.
pub fn check_conformance(schema: &str, data: &Value) -> Option<SchemaConformance> {
    let expected = schema_fields(schema)?;
    let expected_set: BTreeSet<&str> = expected.iter().map(String::as_str).collect();
    let actual: BTreeSet<&str> = data
        .as_object()
        .map(|o| o.keys().map(String::as_str).collect())
        .unwrap_or_default();

    let missing_fields: Vec<String> = expected_set
        .difference(&actual)
        .map(|s| s.to_string())
        .collect();
    let unexpected_fields: Vec<String> = actual
        .difference(&expected_set)
        .filter(|k| !is_confidence_key(k))
        .map(|s| s.to_string())
        .collect();

    Some(SchemaConformance {
        conforms: missing_fields.is_empty() && unexpected_fields.is_empty(),
        expected_fields: expected,
        missing_fields,
        unexpected_fields,
    })
}

/// Field names a schema template asks for.
///
/// Valid JSON: the keys of `properties` for a JSON Schema, otherwise the
/// template's own top-level keys. Anything else (e.g. `{"name": string}`)
/// falls back to a scan for top-level `"key":` pairs.
pub fn schema_fields(schema: &str) -> Option<Vec<String>> {
    match serde_json::from_str::<Value>(schema) {
        Ok(Value::Object(obj)) => {
            let keys: Vec<String> = match obj.get("properties").and_then(Value::as_object) {
                Some(props) => props.keys().cloned().collect(),
                None => obj.keys().cloned().collect(),
            };
            (!keys.is_empty()).then_some(keys)
        }
        Ok(_) => None,
        Err(_) => {
            let keys = scan_top_level_keys(schema);
            (!keys.is_empty()).then_some(keys)
        }
    }
}

fn scan_top_level_keys(text: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let mut depth = 0usize;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' | '[' => depth += 1,
            '}' | ']' => depth = depth.saturating_sub(1),
            '"' => {
                let mut literal = String::new();
                let mut escaped = false;
                for c in chars.by_ref() {
                    match c {
                        _ if escaped => {
                            literal.push(c);
                            escaped = false;
                        }
                        '\\' => escaped = true,
                        '"' => break,
                        _ => literal.push(c),
                    }
                }
                while chars.peek().is_some_and(|c| c.is_whitespace()) {
                    chars.next();
                }
                if depth == 1 && chars.peek() == Some(&':') && !keys.contains(&literal) {
                    keys.push(literal);
                }
            }
            _ => {}
        }
    }

    keys
}
