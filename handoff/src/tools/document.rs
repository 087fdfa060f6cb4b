//! `gemini_document`: documentation for a scope.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::prompt::build_prompt;
use crate::core::validation::validate_document_output;
use crate::delegate::Delegate;
use crate::templates;
use crate::tools::{Reply, ToolName, delegate_structured, narrow, respond};

/// Sections expected when the caller names none.
pub const DEFAULT_SECTIONS: [&str; 3] = ["Overview", "Usage", "API"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocFormat {
    Markdown,
    Jsdoc,
    Readme,
    Api,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInput {
    pub scope: String,
    pub format: DocFormat,
    pub sections: Option<Vec<String>>,
    #[serde(default = "default_include_examples")]
    pub include_examples: bool,
    pub timeout_ms: Option<u64>,
}

fn default_include_examples() -> bool {
    true
}

impl DocumentInput {
    pub fn required_sections(&self) -> Vec<String> {
        match &self.sections {
            Some(sections) => sections.clone(),
            None => DEFAULT_SECTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

pub fn handle<D: Delegate>(delegate: &D, args: &Value) -> Result<Value> {
    let input: DocumentInput = narrow(ToolName::Document, args)?;
    let text = templates::render("document", &input)?;
    let prompt = build_prompt(&text.task, &Map::new(), Some(&text.output_format));
    let options = ToolName::Document
        .options(args, input.timeout_ms)
        .with_file_refs(vec![input.scope.clone()]);

    match delegate_structured(delegate, &prompt, &options)? {
        Reply::Done(body) => Ok(body),
        Reply::Parsed { fields, completion } => {
            let report = validate_document_output(&fields, &input.required_sections());
            let validation = serde_json::to_value(report)?;
            Ok(respond(fields, [("validation", validation)], &completion))
        }
    }
}
