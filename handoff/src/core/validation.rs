//! Structural checks for parsed engine output.
//!
//! Validation trusts content quality and only checks shape. Errors flag
//! missing critical fields; warnings flag gaps worth a second look. Neither
//! blocks a successful tool response.

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

/// Findings from a structural check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn from_parts(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Merge several reports into one.
    pub fn combine<I: IntoIterator<Item = ValidationReport>>(reports: I) -> Self {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        for report in reports {
            errors.extend(report.errors);
            warnings.extend(report.warnings);
        }
        Self::from_parts(errors, warnings)
    }
}

fn array<'a>(output: &'a Map<String, Value>, key: &str) -> Option<&'a Vec<Value>> {
    output.get(key).and_then(Value::as_array)
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(_) => true,
    }
}

/// Warning when `key` holds a number outside `[min, max]`.
pub fn check_range(output: &Map<String, Value>, key: &str, min: f64, max: f64) -> Option<String> {
    let value = output.get(key)?.as_f64()?;
    if value < min || value > max {
        Some(format!("{key} {value} is outside {min}-{max}"))
    } else {
        None
    }
}

/// Check that every requested path appears in `output[key]` (`[{path}]`).
pub fn validate_file_list(
    output: &Map<String, Value>,
    key: &str,
    requested_paths: &[&str],
) -> ValidationReport {
    let Some(files) = array(output, key) else {
        return ValidationReport::from_parts(
            vec![format!("Output missing {key} array")],
            Vec::new(),
        );
    };

    let listed: Vec<&str> = files
        .iter()
        .filter_map(|file| file.get("path").and_then(Value::as_str))
        .collect();
    let warnings = requested_paths
        .iter()
        .filter(|path| !listed.contains(*path))
        .map(|path| format!("Requested file not in output: {path}"))
        .collect();
    ValidationReport::from_parts(Vec::new(), warnings)
}

/// Check generated content for unbalanced code fences and placeholder TODOs.
///
/// Fence lines alternate between opening and closing a block.
pub fn validate_code_blocks(content: &str) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let (mut starts, mut ends) = (0usize, 0usize);
    for line in content.lines() {
        if !line.trim_start().starts_with("```") {
            continue;
        }
        if starts == ends {
            starts += 1;
        } else {
            ends += 1;
        }
    }
    if starts != ends {
        errors.push(format!(
            "Unbalanced code blocks: {starts} starts, {ends} ends"
        ));
    }

    if content.contains("// TODO: implement") && !content.contains("// Implementation") {
        warnings.push("Contains placeholder TODOs without implementation".to_string());
    }

    ValidationReport::from_parts(errors, warnings)
}

pub fn validate_research_output(output: &Map<String, Value>) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let findings = array(output, "findings");
    let sources = array(output, "sources");
    if findings.is_none() {
        errors.push("Research output missing findings array".to_string());
    }
    if sources.is_none() {
        warnings.push("Research output missing sources - cannot verify claims".to_string());
    }
    if let (Some(findings), Some(sources)) = (findings, sources)
        && !findings.is_empty()
        && sources.is_empty()
    {
        warnings.push("Findings present but no sources cited".to_string());
    }
    warnings.extend(check_range(output, "confidence", 0.0, 1.0));

    ValidationReport::from_parts(errors, warnings)
}

/// File scan output must list files; warns when it lists more than requested
/// or reports a total smaller than what it listed.
pub fn validate_file_scan_output(
    output: &Map<String, Value>,
    max_files: Option<u64>,
) -> ValidationReport {
    let Some(files) = array(output, "files") else {
        return ValidationReport::from_parts(
            vec!["Output missing files array".to_string()],
            Vec::new(),
        );
    };

    let mut warnings = Vec::new();
    let listed = files.len() as u64;
    if let Some(max) = max_files
        && listed > max
    {
        warnings.push(format!("Listed {listed} files, more than max_files {max}"));
    }
    if let Some(total) = output.get("total_files").and_then(Value::as_u64)
        && total < listed
    {
        warnings.push(format!("total_files {total} is smaller than the {listed} files listed"));
    }
    if output.get("structure").is_none() {
        warnings.push("File scan output missing structure summary".to_string());
    }
    ValidationReport::from_parts(Vec::new(), warnings)
}

pub fn validate_dialogue_output(
    output: &Map<String, Value>,
    questions: &[String],
) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let Some(responses) = array(output, "responses") else {
        errors.push("Dialogue output missing responses array".to_string());
        return ValidationReport::from_parts(errors, warnings);
    };

    for (idx, response) in responses.iter().enumerate() {
        if let Some(confidence) = response.get("confidence").and_then(Value::as_f64)
            && !(0.0..=1.0).contains(&confidence)
        {
            warnings.push(format!(
                "Response {} confidence {confidence} is outside 0-1",
                idx + 1
            ));
        }
    }
    if responses.len() < questions.len() {
        warnings.push(format!(
            "{} of {} questions unanswered",
            questions.len() - responses.len(),
            questions.len()
        ));
    }
    if !is_truthy(output.get("synthesis")) {
        warnings.push("Dialogue output missing synthesis".to_string());
    }

    ValidationReport::from_parts(errors, warnings)
}

pub fn validate_test_output(output: &Map<String, Value>) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let passed = output.get("passed").and_then(Value::as_f64);
    let failed = output.get("failed").and_then(Value::as_f64);
    if passed.is_none() && failed.is_none() {
        errors.push("Test output missing pass/fail counts".to_string());
    }
    if failed.is_some_and(|n| n > 0.0) && array(output, "failures").is_none() {
        warnings.push("Failed tests reported but no failure details provided".to_string());
    }
    warnings.extend(check_range(output, "coverage", 0.0, 100.0));

    ValidationReport::from_parts(errors, warnings)
}

/// Document output must carry `content`; each required section should appear
/// as a markdown heading (case-insensitive).
pub fn validate_document_output(
    output: &Map<String, Value>,
    required_sections: &[String],
) -> ValidationReport {
    let Some(content) = output
        .get("content")
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
    else {
        return ValidationReport::from_parts(
            vec!["Document output missing content".to_string()],
            Vec::new(),
        );
    };

    let mut warnings: Vec<String> = required_sections
        .iter()
        .filter(|section| !has_heading(content, section))
        .map(|section| format!("Missing section: {section}"))
        .collect();
    if let Some(completeness) = output.get("completeness").and_then(Value::as_object) {
        warnings.extend(check_range(completeness, "score", 0.0, 100.0));
    }

    ValidationReport::from_parts(Vec::new(), warnings)
}

fn has_heading(content: &str, section: &str) -> bool {
    let pattern = format!(r"(?im)^#+\s*{}", regex::escape(section));
    Regex::new(&pattern).is_ok_and(|re| re.is_match(content))
}

pub fn validate_analysis_output(output: &Map<String, Value>) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if !is_truthy(output.get("summary")) {
        errors.push("Analysis output missing summary".to_string());
    }
    if !is_truthy(output.get("recommendations")) && !is_truthy(output.get("findings")) {
        warnings.push("Analysis lacks actionable recommendations or findings".to_string());
    }
    if let Some(metrics) = output.get("metrics").and_then(Value::as_object) {
        warnings.extend(check_range(metrics, "complexity_score", 0.0, 100.0));
    }

    ValidationReport::from_parts(errors, warnings)
}
