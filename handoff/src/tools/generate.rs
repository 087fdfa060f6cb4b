//! `gemini_generate`: multi-file generation from one specification.

use anyhow::{Context, Result};
use minijinja::context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::core::prompt::build_prompt;
use crate::core::validation::{ValidationReport, validate_code_blocks, validate_file_list};
use crate::delegate::Delegate;
use crate::templates;
use crate::tools::{Reply, ToolName, delegate_structured, narrow, respond};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRequest {
    pub path: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateInput {
    pub spec: String,
    pub files: Vec<FileRequest>,
    pub templates: Option<Map<String, Value>>,
    pub style_guide: Option<String>,
    pub timeout_ms: Option<u64>,
}

pub fn handle<D: Delegate>(delegate: &D, args: &Value) -> Result<Value> {
    let input: GenerateInput = narrow(ToolName::Generate, args)?;
    let templates_json = match input.templates.as_ref().filter(|t| !t.is_empty()) {
        Some(t) => Some(serde_json::to_string_pretty(t).context("serialize templates")?),
        None => None,
    };
    let text = templates::render(
        "generate",
        &context! {
            spec => &input.spec,
            files => &input.files,
            style_guide => &input.style_guide,
            templates => templates_json,
        },
    )?;
    let prompt = build_prompt(&text.task, &Map::new(), Some(&text.output_format));
    let options = ToolName::Generate.options(args, input.timeout_ms);

    match delegate_structured(delegate, &prompt, &options)? {
        Reply::Done(body) => Ok(body),
        Reply::Parsed { fields, completion } => {
            let validation = validate_generated(&fields, &input.files);
            Ok(respond(fields, [("validation", validation)], &completion))
        }
    }
}

/// `{files: <requested paths present>, code: {valid, warnings}}`.
fn validate_generated(fields: &Map<String, Value>, requested: &[FileRequest]) -> Value {
    let paths: Vec<&str> = requested.iter().map(|f| f.path.as_str()).collect();
    let files = validate_file_list(fields, "generated_files", &paths);

    let code = ValidationReport::combine(
        fields
            .get("generated_files")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(|file| {
                let content = file.get("content").and_then(Value::as_str).unwrap_or("");
                validate_code_blocks(content)
            }),
    );

    json!({
        "files": files,
        "code": {
            "valid": code.valid,
            "warnings": code.warnings,
        },
    })
}
