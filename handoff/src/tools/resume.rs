//! `gemini_continue`: resume an interrupted session.

use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;

use crate::continuation::resume;
use crate::delegate::Delegator;
use crate::io::engine::ProcessRunner;
use crate::tools::{ToolName, narrow};

#[derive(Debug, Clone, Deserialize)]
pub struct ContinueInput {
    pub session_id: String,
}

pub fn handle<R: ProcessRunner>(delegator: &Delegator<R>, args: &Value) -> Result<Value> {
    let input: ContinueInput = narrow(ToolName::Continue, args)?;
    Ok(resume(delegator, &input.session_id)?.to_json())
}
