//! Line-delimited JSON serve loop for a host process.
//!
//! Each stdin line is one request, `{"id"?, "tool", "arguments"}`. Each request
//! runs on its own thread and answers with exactly one line,
//! `{"id", "is_error", "text"}`, so responses may arrive out of order. The
//! loop ends at end of input once every in-flight request has answered.

use std::io::{BufRead, Write};
use std::sync::Mutex;
use std::thread;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error, instrument, warn};

use crate::delegate::Delegator;
use crate::io::engine::ProcessRunner;
use crate::tools::{ToolResponse, dispatch};

#[derive(Debug, Deserialize)]
struct ServeRequest {
    #[serde(default)]
    id: Value,
    tool: String,
    #[serde(default = "empty_arguments")]
    arguments: Value,
}

fn empty_arguments() -> Value {
    json!({})
}

#[derive(Debug, Serialize)]
struct ServeResponse<'a> {
    id: &'a Value,
    is_error: bool,
    text: &'a str,
}

/// Serve requests from `input` until it is exhausted. Returns the number of
/// requests answered.
#[instrument(skip_all)]
pub fn serve<R, I, W>(delegator: &Delegator<R>, input: I, output: W) -> Result<usize>
where
    R: ProcessRunner + Sync,
    I: BufRead,
    W: Write + Send,
{
    let output = Mutex::new(output);
    let mut answered = 0;

    thread::scope(|scope| -> Result<()> {
        for line in input.lines() {
            let line = line.context("read request line")?;
            if line.trim().is_empty() {
                continue;
            }
            answered += 1;
            let output = &output;
            scope.spawn(move || {
                let (id, response) = answer(delegator, &line);
                if let Err(err) = write_response(output, &id, &response) {
                    error!(err = %format!("{err:#}"), "failed to write response");
                }
            });
        }
        Ok(())
    })?;

    debug!(answered, "input closed");
    Ok(answered)
}

fn answer<R: ProcessRunner>(delegator: &Delegator<R>, line: &str) -> (Value, ToolResponse) {
    match serde_json::from_str::<ServeRequest>(line) {
        Ok(request) => {
            let response = dispatch(delegator, &request.tool, &request.arguments);
            (request.id, response)
        }
        Err(err) => {
            warn!(err = %err, "malformed request line");
            let body = json!({"error": format!("invalid request: {err}")});
            let response = ToolResponse {
                text: serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string()),
                is_error: true,
                success: false,
                needs_continue: false,
            };
            (Value::Null, response)
        }
    }
}

fn write_response<W: Write>(output: &Mutex<W>, id: &Value, response: &ToolResponse) -> Result<()> {
    let line = serde_json::to_string(&ServeResponse {
        id,
        is_error: response.is_error,
        text: &response.text,
    })
    .context("serialize response")?;
    let mut out = output.lock().unwrap_or_else(|e| e.into_inner());
    writeln!(out, "{line}").context("write response")?;
    out.flush().context("flush response")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedRunner, TestSessions, completed};
    use std::collections::HashMap;
    use std::io::Cursor;

    fn responses(raw: &[u8]) -> HashMap<String, Value> {
        String::from_utf8_lossy(raw)
            .lines()
            .map(|line| {
                let value: Value = serde_json::from_str(line).expect("response json");
                (value["id"].to_string(), value)
            })
            .collect()
    }

    #[test]
    fn answers_every_request_line() {
        let sessions = TestSessions::new();
        let reply = "{\"findings\": [], \"sources\": []}";
        let delegator = sessions.delegator(ScriptedRunner::new(vec![Ok(completed(reply))]));
        let input = concat!(
            "{\"id\": 1, \"tool\": \"gemini_research\", \"arguments\": {\"query\": \"q\"}}\n",
            "\n",
            "{\"id\": \"two\", \"tool\": \"gemini_nope\"}\n",
            "not json\n",
        );
        let mut out = Vec::new();

        let answered = serve(&delegator, Cursor::new(input), &mut out).expect("serve");
        assert_eq!(answered, 3);

        let by_id = responses(&out);
        assert_eq!(by_id.len(), 3);

        let first = &by_id["1"];
        assert_eq!(first["is_error"], json!(false));
        let text = first["text"].as_str().expect("text");
        let body: Value = serde_json::from_str(text).expect("body");
        assert_eq!(body["success"], json!(true));

        let unknown = &by_id["\"two\""];
        assert_eq!(unknown["is_error"], json!(true));
        let text = unknown["text"].as_str().expect("text");
        assert!(text.contains("Unknown tool: gemini_nope"));

        let malformed = &by_id["null"];
        assert_eq!(malformed["is_error"], json!(true));
        let text = malformed["text"].as_str().expect("text");
        assert!(text.contains("invalid request"));
    }

    #[test]
    fn empty_input_answers_nothing() {
        let sessions = TestSessions::new();
        let delegator = sessions.delegator(ScriptedRunner::new(Vec::new()));
        let mut out = Vec::new();
        let answered = serve(&delegator, Cursor::new(""), &mut out).expect("serve");
        assert_eq!(answered, 0);
        assert!(out.is_empty());
    }
}
