//! Tool handlers and the dispatch boundary.
//!
//! Each handler narrows loosely-typed caller arguments into its input type,
//! renders a prompt, delegates to the engine, and shapes the reply:
//!
//! - engine failure: `{success: false, error, session_id, needs_continue}`
//! - unparseable output: `{success: true, raw_output, warning, session_id}`
//! - parsed output: `{success: true, ..parsed, <extras>, session_id}`
//!
//! [`dispatch`] maps a tool name onto its handler and wraps the reply in a
//! [`ToolResponse`].

pub mod analyze;
pub mod dialogue;
pub mod document;
pub mod file_scan;
pub mod generate;
pub mod research;
pub mod resume;
pub mod testing;

use std::fmt;
use std::time::Duration;

use anyhow::{Result, anyhow};
use jsonschema::validator_for;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, instrument, warn};

use crate::continuation::CONTINUE_TIMEOUT;
use crate::core::parse::parse_structured;
use crate::delegate::{Delegate, DelegateOptions, Delegator};
use crate::error::DelegateError;
use crate::exit_codes;
use crate::io::engine::ProcessRunner;

const RAW_OUTPUT_WARNING: &str = "Could not parse structured output - returning raw";

/// Every tool the dispatcher knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    Research,
    FileScan,
    Generate,
    Dialogue,
    Test,
    Document,
    Analyze,
    Continue,
}

impl ToolName {
    pub const ALL: [ToolName; 8] = [
        ToolName::Research,
        ToolName::FileScan,
        ToolName::Generate,
        ToolName::Dialogue,
        ToolName::Test,
        ToolName::Document,
        ToolName::Analyze,
        ToolName::Continue,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::Research => "gemini_research",
            ToolName::FileScan => "gemini_file_scan",
            ToolName::Generate => "gemini_generate",
            ToolName::Dialogue => "gemini_dialogue",
            ToolName::Test => "gemini_test",
            ToolName::Document => "gemini_document",
            ToolName::Analyze => "gemini_analyze",
            ToolName::Continue => "gemini_continue",
        }
    }

    pub fn parse(name: &str) -> Option<ToolName> {
        ToolName::ALL.into_iter().find(|tool| tool.as_str() == name)
    }

    pub fn contract(self) -> ToolContract {
        let (description, input_schema, timeout_secs) = match self {
            ToolName::Research => (
                "Delegate web research and documentation lookup to the engine's large context \
                 window.\n\
                 Use for deep research across multiple sources, documentation analysis across \
                 frameworks, and comparative analysis of technologies.\n\
                 Returns structured findings with sources to validate.",
                include_str!("schemas/research.json"),
                120,
            ),
            ToolName::FileScan => (
                "Scan large directories (more than 10 files) with the engine's large context \
                 window.\n\
                 Use for understanding codebase structure, finding patterns across many files, \
                 and initial project exploration.\n\
                 Returns file summaries and structure analysis.",
                include_str!("schemas/file_scan.json"),
                180,
            ),
            ToolName::Generate => (
                "Generate multiple files (more than 5) from one specification.\n\
                 Use for scaffolding features, boilerplate across components, and test suites \
                 for existing code.\n\
                 Generated files are checked for requested paths and balanced code fences.",
                include_str!("schemas/generate.json"),
                300,
            ),
            ToolName::Dialogue => (
                "Get the engine's perspective for multi-model brainstorming.\n\
                 Use for exploring design alternatives, second opinions on architecture, and \
                 validating assumptions.\n\
                 Returns per-question responses with confidence and a synthesis.",
                include_str!("schemas/dialogue.json"),
                120,
            ),
            ToolName::Test => (
                "Execute or generate tests with the engine's large context window.\n\
                 Use for large test suites, generating tests for many files, and coverage gap \
                 analysis.\n\
                 Returns structured pass/fail results and a coverage threshold check.",
                include_str!("schemas/test.json"),
                300,
            ),
            ToolName::Document => (
                "Generate documentation with the engine's large context window.\n\
                 Use for documenting large codebases, API references, READMEs, and \
                 architecture notes.\n\
                 Returns structured documentation with completeness validation.",
                include_str!("schemas/document.json"),
                180,
            ),
            ToolName::Analyze => (
                "Deep codebase analysis with the engine's large context window.\n\
                 Use for architecture review, pattern and anti-pattern detection, security and \
                 performance analysis, and dependency analysis.\n\
                 Returns findings by severity with actionable recommendations.",
                include_str!("schemas/analyze.json"),
                300,
            ),
            ToolName::Continue => (
                "Resume an incomplete delegated operation.\n\
                 Use when a previous operation timed out or its output was truncated.\n\
                 Restores session state and continues from where it left off.",
                include_str!("schemas/continue.json"),
                CONTINUE_TIMEOUT.as_secs(),
            ),
        };
        ToolContract {
            name: self,
            description,
            input_schema,
            default_timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Delegation options for a call with the raw `args`, honoring `timeout_ms`.
    pub fn options(self, args: &Value, timeout_ms: Option<u64>) -> DelegateOptions {
        let timeout = timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.contract().default_timeout);
        DelegateOptions::new(self.as_str(), args.clone()).with_timeout(timeout)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of one tool.
#[derive(Debug, Clone, Copy)]
pub struct ToolContract {
    pub name: ToolName,
    pub description: &'static str,
    input_schema: &'static str,
    pub default_timeout: Duration,
}

impl ToolContract {
    pub fn input_schema(&self) -> Result<Value> {
        serde_json::from_str(self.input_schema)
            .map_err(|err| anyhow!("invalid input schema for {}: {}", self.name, err))
    }

    /// `{name, description, inputSchema}` as listed to hosts.
    pub fn descriptor(&self) -> Result<Value> {
        Ok(json!({
            "name": self.name.as_str(),
            "description": self.description,
            "inputSchema": self.input_schema()?,
        }))
    }
}

/// Descriptors for every tool, in [`ToolName::ALL`] order.
pub fn descriptors() -> Result<Vec<Value>> {
    ToolName::ALL
        .into_iter()
        .map(|tool| tool.contract().descriptor())
        .collect()
}

/// Check `args` against the tool's input schema, then deserialize it.
pub fn narrow<T: DeserializeOwned>(tool: ToolName, args: &Value) -> Result<T> {
    let schema = tool.contract().input_schema()?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(args) {
        let messages = compiled
            .iter_errors(args)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(DelegateError::InvalidInput {
            tool: tool.as_str().to_string(),
            reason: messages.join("; "),
        }
        .into());
    }
    serde_json::from_value(args.clone()).map_err(|err| {
        DelegateError::InvalidInput {
            tool: tool.as_str().to_string(),
            reason: err.to_string(),
        }
        .into()
    })
}

/// Research and analysis depth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    Shallow,
    #[default]
    Medium,
    Deep,
}

/// Engine reply after the shared failure and parse handling.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Final response body; nothing left for the handler to add.
    Done(Value),
    /// Structured output ready for validation.
    Parsed {
        fields: Map<String, Value>,
        completion: Completion,
    },
}

/// Session facts every structured reply carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub session_id: String,
    /// The engine answered but was cut short; the session awaits a resume.
    pub needs_continue: bool,
}

/// Delegate `prompt` and apply the failure and raw-output rules common to
/// every handler.
pub fn delegate_structured<D: Delegate>(
    delegate: &D,
    prompt: &str,
    options: &DelegateOptions,
) -> Result<Reply> {
    let result = delegate.delegate(prompt, options)?;
    if !result.success {
        return Ok(Reply::Done(json!({
            "success": false,
            "error": result.error,
            "session_id": result.session_id,
            "needs_continue": result.needs_continue,
        })));
    }

    match parse_structured::<Map<String, Value>>(&result.output) {
        Some(fields) => Ok(Reply::Parsed {
            fields,
            completion: Completion {
                session_id: result.session_id,
                needs_continue: result.needs_continue,
            },
        }),
        None => {
            debug!(session_id = %result.session_id, "engine output is not structured");
            let mut body = json!({
                "success": true,
                "raw_output": result.output,
                "warning": RAW_OUTPUT_WARNING,
                "session_id": result.session_id,
            });
            if result.needs_continue {
                body["needs_continue"] = Value::Bool(true);
            }
            Ok(Reply::Done(body))
        }
    }
}

/// `{success: true, ..fields, ..extras, session_id}`, plus
/// `needs_continue: true` when the answer was truncated.
pub fn respond<I>(fields: Map<String, Value>, extras: I, completion: &Completion) -> Value
where
    I: IntoIterator<Item = (&'static str, Value)>,
{
    let mut body = Map::new();
    body.insert("success".to_string(), Value::Bool(true));
    body.extend(fields);
    for (key, value) in extras {
        body.insert(key.to_string(), value);
    }
    body.insert(
        "session_id".to_string(),
        Value::String(completion.session_id.clone()),
    );
    if completion.needs_continue {
        body.insert("needs_continue".to_string(), Value::Bool(true));
    }
    Value::Object(body)
}

/// `path/` for directory markers, without doubling an existing slash.
pub fn directory_ref(path: &str) -> String {
    format!("{}/", path.trim_end_matches('/'))
}

/// Reply to one dispatched call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResponse {
    /// Pretty-printed JSON body.
    pub text: String,
    /// Dispatch-level failure (unknown tool or handler error).
    pub is_error: bool,
    pub success: bool,
    pub needs_continue: bool,
}

impl ToolResponse {
    fn from_body(body: &Value, is_error: bool) -> Self {
        let text = serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string());
        let flag = |key: &str| body.get(key).and_then(Value::as_bool).unwrap_or(false);
        Self {
            text,
            is_error,
            success: !is_error && flag("success"),
            needs_continue: flag("needs_continue"),
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.needs_continue {
            exit_codes::NEEDS_CONTINUE
        } else if self.success {
            exit_codes::OK
        } else {
            exit_codes::FAILED
        }
    }
}

/// Route `name` to its handler. Never fails; errors become `is_error` replies.
#[instrument(skip(delegator, arguments))]
pub fn dispatch<R: ProcessRunner>(
    delegator: &Delegator<R>,
    name: &str,
    arguments: &Value,
) -> ToolResponse {
    let Some(tool) = ToolName::parse(name) else {
        warn!("unknown tool");
        let available: Vec<&str> = ToolName::ALL.iter().map(|t| t.as_str()).collect();
        return ToolResponse::from_body(
            &json!({
                "error": DelegateError::UnknownTool(name.to_string()).to_string(),
                "available_tools": available,
            }),
            true,
        );
    };

    match run_tool(delegator, tool, arguments) {
        Ok(body) => ToolResponse::from_body(&body, false),
        Err(err) => {
            warn!(err = %format!("{err:#}"), "tool handler failed");
            ToolResponse::from_body(
                &json!({
                    "error": format!("{err:#}"),
                    "tool": name,
                    "input": arguments,
                }),
                true,
            )
        }
    }
}

fn run_tool<R: ProcessRunner>(
    delegator: &Delegator<R>,
    tool: ToolName,
    args: &Value,
) -> Result<Value> {
    match tool {
        ToolName::Research => research::handle(delegator, args),
        ToolName::FileScan => file_scan::handle(delegator, args),
        ToolName::Generate => generate::handle(delegator, args),
        ToolName::Dialogue => dialogue::handle(delegator, args),
        ToolName::Test => testing::handle(delegator, args),
        ToolName::Document => document::handle(delegator, args),
        ToolName::Analyze => analyze::handle(delegator, args),
        ToolName::Continue => resume::handle(delegator, args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ExecutionResult, SessionStatus};
    use crate::test_support::{ScriptedDelegate, ScriptedRunner, TestSessions, completed, failure};

    #[test]
    fn names_round_trip() {
        for tool in ToolName::ALL {
            assert_eq!(ToolName::parse(tool.as_str()), Some(tool));
        }
        assert_eq!(ToolName::parse("gemini_unknown"), None);
    }

    #[test]
    fn every_schema_parses_and_compiles() {
        for descriptor in descriptors().expect("descriptors") {
            let schema = &descriptor["inputSchema"];
            assert_eq!(schema["type"], json!("object"), "{}", descriptor["name"]);
            validator_for(schema).expect("schema compiles");
        }
    }

    #[test]
    fn default_timeouts_follow_tool_table() {
        let secs = |tool: ToolName| tool.contract().default_timeout.as_secs();
        assert_eq!(secs(ToolName::Research), 120);
        assert_eq!(secs(ToolName::FileScan), 180);
        assert_eq!(secs(ToolName::Generate), 300);
        assert_eq!(secs(ToolName::Dialogue), 120);
        assert_eq!(secs(ToolName::Test), 300);
        assert_eq!(secs(ToolName::Document), 180);
        assert_eq!(secs(ToolName::Analyze), 300);
        assert_eq!(secs(ToolName::Continue), 300);
    }

    #[test]
    fn timeout_override_is_milliseconds() {
        let options = ToolName::Research.options(&json!({}), Some(1_500));
        assert_eq!(options.timeout, Duration::from_millis(1_500));
        assert_eq!(options.tool, "gemini_research");
    }

    #[test]
    fn narrow_rejects_missing_required_field() {
        #[derive(Debug, Deserialize)]
        struct Query {
            #[allow(dead_code)]
            query: String,
        }
        let err = narrow::<Query>(ToolName::Research, &json!({"depth": "deep"})).unwrap_err();
        match err.downcast_ref::<DelegateError>() {
            Some(DelegateError::InvalidInput { tool, reason }) => {
                assert_eq!(tool, "gemini_research");
                assert!(reason.contains("query"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn narrow_rejects_out_of_enum_values() {
        let args = json!({"path": "src", "focus": "style"});
        let err = narrow::<Value>(ToolName::Analyze, &args).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("invalid arguments for gemini_analyze"));
    }

    fn research_options() -> DelegateOptions {
        ToolName::Research.options(&json!({}), None)
    }

    #[test]
    fn failed_delegation_passes_state_through() {
        let delegate = ScriptedDelegate::new(vec![failure("s-9", "boom", true)]);
        let reply = delegate_structured(&delegate, "p", &research_options()).expect("reply");
        assert_eq!(
            reply,
            Reply::Done(json!({
                "success": false,
                "error": "boom",
                "session_id": "s-9",
                "needs_continue": true,
            }))
        );
    }

    #[test]
    fn prose_output_degrades_to_raw() {
        let delegate = ScriptedDelegate::answering("no json here");
        let reply = delegate_structured(&delegate, "p", &research_options()).expect("reply");
        let Reply::Done(body) = reply else {
            panic!("expected raw reply");
        };
        assert_eq!(body["raw_output"], json!("no json here"));
        assert_eq!(body["warning"], json!(RAW_OUTPUT_WARNING));
        assert_eq!(body["success"], json!(true));
    }

    #[test]
    fn truncated_structured_output_keeps_resume_flag() {
        let delegate = ScriptedDelegate::new(vec![ExecutionResult {
            success: true,
            output: "{\"findings\": []}".to_string(),
            error: None,
            needs_continue: true,
            session_id: "s-3".to_string(),
        }]);
        let reply = delegate_structured(&delegate, "p", &research_options()).expect("reply");
        let Reply::Parsed { completion, .. } = reply else {
            panic!("expected parsed reply");
        };
        assert_eq!(
            completion,
            Completion {
                session_id: "s-3".to_string(),
                needs_continue: true,
            }
        );
    }

    #[test]
    fn respond_spreads_fields_before_extras() {
        let mut fields = Map::new();
        fields.insert("summary".to_string(), json!("s"));
        let completion = Completion {
            session_id: "s-1".to_string(),
            needs_continue: false,
        };
        let extras = [("validation", json!({"valid": true}))];
        let body = respond(fields, extras, &completion);
        let keys: Vec<&str> = body
            .as_object()
            .expect("object")
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, vec!["success", "summary", "validation", "session_id"]);
    }

    #[test]
    fn respond_marks_truncated_answers() {
        let completion = Completion {
            session_id: "s-2".to_string(),
            needs_continue: true,
        };
        let body = respond(Map::new(), [], &completion);
        assert_eq!(body["needs_continue"], json!(true));
        assert_eq!(body["session_id"], json!("s-2"));
    }

    #[test]
    fn directory_ref_adds_single_slash() {
        assert_eq!(directory_ref("src"), "src/");
        assert_eq!(directory_ref("src/"), "src/");
    }

    #[test]
    fn unknown_tool_lists_available_tools() {
        let sessions = TestSessions::new();
        let delegator = sessions.delegator(ScriptedRunner::new(Vec::new()));
        let response = dispatch(&delegator, "gemini_magic", &json!({}));
        assert!(response.is_error);
        let body: Value = serde_json::from_str(&response.text).expect("json");
        assert_eq!(body["error"], json!("Unknown tool: gemini_magic"));
        assert_eq!(body["available_tools"].as_array().map(Vec::len), Some(8));
        assert_eq!(response.exit_code(), exit_codes::FAILED);
    }

    #[test]
    fn handler_error_echoes_tool_and_input() {
        let sessions = TestSessions::new();
        let delegator = sessions.delegator(ScriptedRunner::new(Vec::new()));
        let args = json!({"depth": "deep"});
        let response = dispatch(&delegator, "gemini_research", &args);
        assert!(response.is_error);
        let body: Value = serde_json::from_str(&response.text).expect("json");
        assert_eq!(body["tool"], json!("gemini_research"));
        assert_eq!(body["input"], args);
        assert_eq!(delegator.runner().calls(), 0);
    }

    #[test]
    fn dispatch_runs_engine_and_parses() {
        let sessions = TestSessions::new();
        let reply = "{\"findings\": [], \"sources\": [], \"summary\": \"none\"}";
        let delegator = sessions.delegator(ScriptedRunner::new(vec![Ok(completed(reply))]));
        let response = dispatch(&delegator, "gemini_research", &json!({"query": "q"}));
        assert!(!response.is_error);
        assert!(response.success);
        assert_eq!(response.exit_code(), exit_codes::OK);
        let body: Value = serde_json::from_str(&response.text).expect("json");
        assert_eq!(body["summary"], json!("none"));
        assert_eq!(body["validation"]["valid"], json!(true));
    }

    #[test]
    fn oversized_parseable_answer_exits_needs_continue() {
        let sessions = TestSessions::new();
        let answer = format!(
            "{{\"findings\": [], \"sources\": [], \"summary\": \"{}\"}}",
            "x".repeat(100_000)
        );
        let delegator = sessions.delegator(ScriptedRunner::new(vec![Ok(completed(&answer))]));

        let response = dispatch(&delegator, "gemini_research", &json!({"query": "q"}));
        assert!(!response.is_error);
        assert!(response.needs_continue);
        assert_eq!(response.exit_code(), exit_codes::NEEDS_CONTINUE);

        let body: Value = serde_json::from_str(&response.text).expect("json");
        assert_eq!(body["needs_continue"], json!(true));
        let session_id = body["session_id"].as_str().expect("session id");
        let session = sessions.store().load(session_id).expect("session");
        assert_eq!(session.status, SessionStatus::NeedsContinue);
    }
}
