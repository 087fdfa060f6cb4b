//! `gemini_test`: run or generate tests for a scope.

use anyhow::Result;
use minijinja::context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::prompt::build_prompt;
use crate::core::validation::validate_test_output;
use crate::delegate::Delegate;
use crate::templates;
use crate::tools::{Reply, ToolName, delegate_structured, narrow, respond};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    Unit,
    Integration,
    E2e,
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestInput {
    pub test_type: TestType,
    pub scope: String,
    #[serde(default = "default_coverage_threshold")]
    pub coverage_threshold: f64,
    #[serde(default)]
    pub generate_missing: bool,
    pub timeout_ms: Option<u64>,
}

fn default_coverage_threshold() -> f64 {
    80.0
}

pub fn handle<D: Delegate>(delegate: &D, args: &Value) -> Result<Value> {
    let input: TestInput = narrow(ToolName::Test, args)?;
    let text = templates::render(
        "test",
        &context! {
            test_type => input.test_type,
            scope => &input.scope,
            coverage_threshold => input.coverage_threshold.to_string(),
            generate_missing => input.generate_missing,
        },
    )?;
    let prompt = build_prompt(&text.task, &Map::new(), Some(&text.output_format));
    let options = ToolName::Test
        .options(args, input.timeout_ms)
        .with_file_refs(vec![input.scope.clone()]);

    match delegate_structured(delegate, &prompt, &options)? {
        Reply::Done(body) => Ok(body),
        Reply::Parsed { fields, completion } => {
            let meets = meets_coverage_threshold(&fields, input.coverage_threshold);
            let meets = meets.map_or(Value::Null, Value::Bool);
            let validation = serde_json::to_value(validate_test_output(&fields))?;
            let extras = [
                ("meets_coverage_threshold", meets),
                ("validation", validation),
            ];
            Ok(respond(fields, extras, &completion))
        }
    }
}

/// `None` when the engine reported no coverage figure.
fn meets_coverage_threshold(fields: &Map<String, Value>, threshold: f64) -> Option<bool> {
    let coverage = fields.get("coverage").and_then(Value::as_f64)?;
    Some(coverage >= threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedDelegate;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn scope_is_passed_as_file_reference() {
        let delegate = ScriptedDelegate::answering("{\"passed\": 3, \"failed\": 0}");
        let args = json!({"test_type": "unit", "scope": "src/parser"});
        handle(&delegate, &args).expect("handle");

        let call = delegate.only_call();
        assert_eq!(call.options.file_refs, vec!["src/parser"]);
        assert_eq!(call.options.timeout, Duration::from_secs(300));
        let prompt = &call.prompt;
        assert!(prompt.contains("Analyze and execute tests in: src/parser"));
        assert!(prompt.contains("Coverage threshold: 80%"));
        assert!(prompt.contains("\"test_type\": \"unit\""));
    }

    #[test]
    fn coverage_is_compared_to_threshold() {
        let reply = "{\"passed\": 3, \"failed\": 0, \"coverage\": 72.5}";
        let delegate = ScriptedDelegate::answering(reply);
        let args = json!({"test_type": "all", "scope": "src", "coverage_threshold": 70});
        let body = handle(&delegate, &args).expect("handle");
        assert_eq!(body["meets_coverage_threshold"], json!(true));

        let delegate = ScriptedDelegate::answering(reply);
        let args = json!({"test_type": "all", "scope": "src"});
        let body = handle(&delegate, &args).expect("handle");
        assert_eq!(body["meets_coverage_threshold"], json!(false));
    }

    #[test]
    fn missing_coverage_is_null() {
        let delegate = ScriptedDelegate::answering("{\"passed\": 1}");
        let args = json!({"test_type": "unit", "scope": "src"});
        let body = handle(&delegate, &args).expect("handle");
        assert_eq!(body["meets_coverage_threshold"], Value::Null);
        assert_eq!(body["validation"]["valid"], json!(true));
    }

    #[test]
    fn generation_mode_asks_for_generated_tests() {
        let delegate = ScriptedDelegate::answering("{\"passed\": 0, \"failed\": 0}");
        let args = json!({"test_type": "integration", "scope": "api", "generate_missing": true});
        handle(&delegate, &args).expect("handle");
        let prompt = delegate.only_call().prompt;
        assert!(prompt.contains("Generate missing tests for uncovered code"));
        assert!(prompt.contains("\"generated_tests\""));
    }

    #[test]
    fn unknown_test_type_is_rejected() {
        let delegate = ScriptedDelegate::new(Vec::new());
        let args = json!({"test_type": "fuzz", "scope": "src"});
        let err = handle(&delegate, &args).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("invalid arguments for gemini_test"));
    }
}
