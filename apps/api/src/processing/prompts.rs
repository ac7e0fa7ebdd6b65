// Extraction prompt templates.
// Placeholders are substituted with `str::replace`; `{schema}` is always filled before `{document}`.

pub const AUTOMATIC_PROMPT: &str = r#"Analyze this document and extract structured data as comprehensive JSON.
Include:
- Key entities (people, organizations, locations)
- Important dates and numbers
- Relationships between entities
- Key-value pairs
- Document structure

Choose the JSON structure that best fits the content.
Add confidence scores (0-1) for each extracted field.
Return ONLY the JSON output.

Document:
{document}"#;

pub const SCHEMA_GUIDED_PROMPT: &str = r#"Convert this document into JSON following exactly this schema:
{schema}

Document content:
{document}

Rules:
1. Include all available data
2. Mark missing fields as null
3. Add "_confidence" scores (0-1) for each field
4. Use only the top-level fields the schema defines (plus their "_confidence" scores)
5. Return ONLY valid JSON"#;
