//! `gemini_research`: research and documentation lookup.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::prompt::build_prompt;
use crate::core::validation::validate_research_output;
use crate::delegate::Delegate;
use crate::templates;
use crate::tools::{Depth, Reply, ToolName, delegate_structured, narrow, respond};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchInput {
    pub query: String,
    #[serde(default)]
    pub depth: Depth,
    pub sources: Option<Vec<String>>,
    pub max_results: Option<u64>,
    pub timeout_ms: Option<u64>,
}

pub fn handle<D: Delegate>(delegate: &D, args: &Value) -> Result<Value> {
    let input: ResearchInput = narrow(ToolName::Research, args)?;
    let text = templates::render("research", &input)?;
    let prompt = build_prompt(&text.task, &Map::new(), Some(&text.output_format));
    let options = ToolName::Research.options(args, input.timeout_ms);

    match delegate_structured(delegate, &prompt, &options)? {
        Reply::Done(body) => Ok(body),
        Reply::Parsed { fields, completion } => {
            let validation = serde_json::to_value(validate_research_output(&fields))?;
            Ok(respond(fields, [("validation", validation)], &completion))
        }
    }
}
