//! Task and output-format texts for each tool, rendered with minijinja.
//!
//! Templates are compiled once per process. Each tool has a `<stem>.task`
//! template (the instructions) and a `<stem>.format` template (the literal
//! output shape the engine is asked to return).

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::Environment;
use serde::Serialize;

macro_rules! template {
    ($name:literal) => {
        ($name, include_str!(concat!("templates/", $name, ".md")))
    };
}

const TEMPLATES: &[(&str, &str)] = &[
    template!("research.task"),
    template!("research.format"),
    template!("file_scan.task"),
    template!("file_scan.format"),
    template!("generate.task"),
    template!("generate.format"),
    template!("dialogue.task"),
    template!("dialogue.format"),
    template!("test.task"),
    template!("test.format"),
    template!("document.task"),
    template!("document.format"),
    template!("analyze.task"),
    template!("analyze.format"),
    template!("continue.task"),
    template!("continue.format"),
];

static ENGINE: LazyLock<PromptTemplates> = LazyLock::new(PromptTemplates::new);

/// Rendered pair of texts handed to `build_prompt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskText {
    pub task: String,
    pub output_format: String,
}

/// Template engine wrapper around minijinja.
struct PromptTemplates {
    env: Environment<'static>,
}

impl PromptTemplates {
    fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        for (name, source) in TEMPLATES {
            env.add_template(name, source)
                .expect("prompt template should be valid");
        }
        Self { env }
    }

    fn render<S: Serialize>(&self, name: &str, ctx: &S) -> Result<String> {
        let template = self
            .env
            .get_template(name)
            .with_context(|| format!("template {name}"))?;
        let rendered = template
            .render(ctx)
            .with_context(|| format!("render template {name}"))?;
        Ok(rendered.trim_end().to_string())
    }
}

/// Render the task and output-format texts for `stem` with the same context.
pub fn render<S: Serialize>(stem: &str, ctx: &S) -> Result<TaskText> {
    Ok(TaskText {
        task: ENGINE.render(&format!("{stem}.task"), ctx)?,
        output_format: ENGINE.render(&format!("{stem}.format"), ctx)?,
    })
}
