//! `gemini_dialogue`: a second perspective for brainstorming.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::prompt::build_prompt;
use crate::core::validation::validate_dialogue_output;
use crate::delegate::Delegate;
use crate::templates;
use crate::tools::{Reply, ToolName, delegate_structured, narrow, respond};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueInput {
    pub topic: String,
    pub context: String,
    pub questions: Vec<String>,
    pub perspective: Option<String>,
    pub timeout_ms: Option<u64>,
}

pub fn handle<D: Delegate>(delegate: &D, args: &Value) -> Result<Value> {
    let input: DialogueInput = narrow(ToolName::Dialogue, args)?;
    let text = templates::render("dialogue", &input)?;
    let prompt = build_prompt(&text.task, &Map::new(), Some(&text.output_format));
    let options = ToolName::Dialogue.options(args, input.timeout_ms);

    match delegate_structured(delegate, &prompt, &options)? {
        Reply::Done(body) => Ok(body),
        Reply::Parsed { fields, completion } => {
            let mut extras = Vec::new();
            if let Some(average) = average_confidence(&fields) {
                extras.push(("average_confidence", Value::from(average)));
            }
            let report = validate_dialogue_output(&fields, &input.questions);
            extras.push(("validation", serde_json::to_value(report)?));
            Ok(respond(fields, extras, &completion))
        }
    }
}

/// Mean confidence over responses that report one.
fn average_confidence(fields: &Map<String, Value>) -> Option<f64> {
    let confidences: Vec<f64> = fields
        .get("responses")?
        .as_array()?
        .iter()
        .filter_map(|response| response.get("confidence").and_then(Value::as_f64))
        .collect();
    if confidences.is_empty() {
        return None;
    }
    Some(confidences.iter().sum::<f64>() / confidences.len() as f64)
}
