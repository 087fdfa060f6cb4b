//! Delegate tasks to a large-context reasoning engine.
//!
//! Every call is tracked as a session under the session directory
//! (`.claude/sessions/` by default, overridable with `SCW_SESSION_DIR`), so an
//! interrupted call can be resumed with `handoff resume <id>`.

use std::fs;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};

use handoff::delegate::Delegator;
use handoff::exit_codes;
use handoff::io::config::{DEFAULT_CONFIG_FILE, HandoffConfig, load_config, render_config};
use handoff::io::engine::CliRunner;
use handoff::logging;
use handoff::serve::serve;
use handoff::tools::{ToolName, descriptors, dispatch};

#[derive(Parser)]
#[command(
    name = "handoff",
    version,
    about = "Delegate tasks to a large-context reasoning engine with resumable sessions"
)]
struct Cli {
    /// Config file. Defaults to `./handoff.toml` when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one tool and print its JSON response.
    Call {
        /// Tool name, e.g. `gemini_research`.
        tool: String,
        /// Tool arguments as a JSON object.
        #[arg(long, conflicts_with = "args_file")]
        args: Option<String>,
        /// Read tool arguments from a JSON file.
        #[arg(long)]
        args_file: Option<PathBuf>,
    },
    /// Resume an interrupted session.
    Resume { session_id: String },
    /// Inspect or prune stored sessions.
    Sessions {
        #[command(subcommand)]
        command: SessionsCommand,
    },
    /// Print tool descriptors (name, description, input schema).
    Tools,
    /// Print the effective configuration as TOML.
    Config,
    /// Answer line-delimited JSON requests on stdin until it closes.
    Serve,
}

#[derive(Subcommand)]
enum SessionsCommand {
    /// List sessions, most recently updated first.
    List,
    /// Print one session record.
    Show { session_id: String },
    /// Delete sessions not updated recently.
    Cleanup {
        /// Age threshold in hours. Defaults to `sessions.max_age_hours`.
        #[arg(long)]
        max_age_hours: Option<u64>,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FAILED);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("resolve working directory")?;
    let config = resolve_config(cli.config.as_deref(), &cwd)?;

    match cli.command {
        Command::Call {
            tool,
            args,
            args_file,
        } => {
            let arguments = read_arguments(args.as_deref(), args_file.as_deref())?;
            cmd_dispatch(&config, &cwd, &tool, &arguments)
        }
        Command::Resume { session_id } => cmd_dispatch(
            &config,
            &cwd,
            ToolName::Continue.as_str(),
            &json!({ "session_id": session_id }),
        ),
        Command::Sessions { command } => cmd_sessions(&config, &cwd, command),
        Command::Tools => {
            println!("{}", serde_json::to_string_pretty(&descriptors()?)?);
            Ok(exit_codes::OK)
        }
        Command::Config => {
            print!("{}", render_config(&config)?);
            Ok(exit_codes::OK)
        }
        Command::Serve => {
            let delegator = Delegator::from_config(&config, config.session_dir(&cwd));
            let stdout = BufWriter::new(io::stdout());
            serve(&delegator, io::stdin().lock(), stdout)?;
            Ok(exit_codes::OK)
        }
    }
}

/// An explicit `--config` must exist; the implicit default may be absent.
fn resolve_config(explicit: Option<&Path>, cwd: &Path) -> Result<HandoffConfig> {
    match explicit {
        Some(path) => {
            if !path.exists() {
                bail!("config file not found: {}", path.display());
            }
            load_config(path)
        }
        None => load_config(&cwd.join(DEFAULT_CONFIG_FILE)),
    }
}

fn read_arguments(inline: Option<&str>, file: Option<&Path>) -> Result<Value> {
    let raw = match (inline, file) {
        (Some(inline), _) => inline.to_string(),
        (None, Some(path)) => {
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?
        }
        (None, None) => return Ok(json!({})),
    };
    serde_json::from_str(&raw).context("parse tool arguments as JSON")
}

fn cmd_dispatch(config: &HandoffConfig, cwd: &Path, tool: &str, arguments: &Value) -> Result<i32> {
    let delegator = Delegator::from_config(config, config.session_dir(cwd));
    let response = dispatch(&delegator, tool, arguments);
    println!("{}", response.text);
    Ok(response.exit_code())
}

fn cmd_sessions(config: &HandoffConfig, cwd: &Path, command: SessionsCommand) -> Result<i32> {
    let delegator: Delegator<CliRunner> = Delegator::from_config(config, config.session_dir(cwd));
    let store = delegator.store();
    match command {
        SessionsCommand::List => {
            let sessions = store.list()?;
            if sessions.is_empty() {
                println!("no sessions in {}", store.dir().display());
            }
            for session in sessions {
                println!(
                    "{}\t{}\t{}\tcontinues={}\t{}",
                    session.id,
                    session.status,
                    session.tool,
                    session.continue_count,
                    session.updated_at.to_rfc3339(),
                );
            }
            Ok(exit_codes::OK)
        }
        SessionsCommand::Show { session_id } => match store.load(&session_id) {
            Some(session) => {
                println!("{}", serde_json::to_string_pretty(&session)?);
                Ok(exit_codes::OK)
            }
            None => {
                eprintln!("Session not found: {session_id}");
                Ok(exit_codes::FAILED)
            }
        },
        SessionsCommand::Cleanup { max_age_hours } => {
            let hours = max_age_hours.unwrap_or(config.sessions.max_age_hours);
            let removed = store.cleanup(hours)?;
            println!("removed {removed} sessions older than {hours}h");
            Ok(exit_codes::OK)
        }
    }
}
