//! `gemini_file_scan`: summarize a large directory.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::prompt::build_prompt;
use crate::core::validation::validate_file_scan_output;
use crate::delegate::Delegate;
use crate::templates;
use crate::tools::{Reply, ToolName, delegate_structured, directory_ref, narrow, respond};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileScanInput {
    pub path: String,
    pub pattern: Option<String>,
    #[serde(default = "default_max_files")]
    pub max_files: u64,
    #[serde(default = "default_true")]
    pub include_content: bool,
    #[serde(default = "default_true")]
    pub recursive: bool,
    pub timeout_ms: Option<u64>,
}

fn default_max_files() -> u64 {
    50
}

fn default_true() -> bool {
    true
}

impl FileScanInput {
    /// A recursive scan hands the engine the whole directory.
    pub fn file_ref(&self) -> String {
        if self.recursive {
            directory_ref(&self.path)
        } else {
            self.path.clone()
        }
    }
}

pub fn handle<D: Delegate>(delegate: &D, args: &Value) -> Result<Value> {
    let input: FileScanInput = narrow(ToolName::FileScan, args)?;
    let text = templates::render("file_scan", &input)?;
    let prompt = build_prompt(&text.task, &Map::new(), Some(&text.output_format));
    let options = ToolName::FileScan
        .options(args, input.timeout_ms)
        .with_file_refs(vec![input.file_ref()]);

    match delegate_structured(delegate, &prompt, &options)? {
        Reply::Done(body) => Ok(body),
        Reply::Parsed { fields, completion } => {
            let report = validate_file_scan_output(&fields, Some(input.max_files));
            let validation = serde_json::to_value(report)?;
            Ok(respond(fields, [("validation", validation)], &completion))
        }
    }
}
