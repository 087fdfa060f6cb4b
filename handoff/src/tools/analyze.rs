//! `gemini_analyze`: deep codebase analysis.

use anyhow::Result;
use minijinja::context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::core::prompt::build_prompt;
use crate::core::validation::validate_analysis_output;
use crate::delegate::Delegate;
use crate::templates;
use crate::tools::{Depth, Reply, ToolName, delegate_structured, directory_ref, narrow, respond};

const SEVERITIES: [&str; 5] = ["critical", "high", "medium", "low", "info"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Focus {
    Architecture,
    Patterns,
    Dependencies,
    Security,
    Performance,
    #[default]
    All,
}

impl Focus {
    pub fn instructions(self) -> &'static str {
        match self {
            Focus::Architecture => {
                "Focus on architectural patterns, layers, and component relationships"
            }
            Focus::Patterns => "Focus on code patterns, design patterns, and anti-patterns",
            Focus::Dependencies => "Focus on dependencies, imports, and module relationships",
            Focus::Security => {
                "Focus on security vulnerabilities, input validation, and auth patterns"
            }
            Focus::Performance => {
                "Focus on performance bottlenecks, optimization opportunities, and efficiency"
            }
            Focus::All => "Provide comprehensive analysis across all areas",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeInput {
    pub path: String,
    #[serde(default)]
    pub depth: Depth,
    #[serde(default)]
    pub focus: Focus,
    pub timeout_ms: Option<u64>,
}

pub fn handle<D: Delegate>(delegate: &D, args: &Value) -> Result<Value> {
    let input: AnalyzeInput = narrow(ToolName::Analyze, args)?;
    let text = templates::render(
        "analyze",
        &context! {
            path => &input.path,
            depth => input.depth,
            focus => input.focus,
            focus_instructions => input.focus.instructions(),
        },
    )?;
    let prompt = build_prompt(&text.task, &Map::new(), Some(&text.output_format));
    let options = ToolName::Analyze
        .options(args, input.timeout_ms)
        .with_file_refs(vec![directory_ref(&input.path)]);

    match delegate_structured(delegate, &prompt, &options)? {
        Reply::Done(body) => Ok(body),
        Reply::Parsed { fields, completion } => {
            let summary = findings_summary(&fields);
            let validation = serde_json::to_value(validate_analysis_output(&fields))?;
            Ok(respond(
                fields,
                [("findings_summary", summary), ("validation", validation)],
                &completion,
            ))
        }
    }
}

/// Finding counts per severity, every severity present.
fn findings_summary(fields: &Map<String, Value>) -> Value {
    let findings = fields
        .get("findings")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let mut summary = Map::new();
    for severity in SEVERITIES {
        let count = findings
            .iter()
            .filter(|f| f.get("severity").and_then(Value::as_str) == Some(severity))
            .count();
        summary.insert(severity.to_string(), json!(count));
    }
    Value::Object(summary)
}
