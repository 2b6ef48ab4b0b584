//! Top-level CLI definition and dispatch.

use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use pdf_unlock::core::config::Config;
use pdf_unlock::core::ids;
use pdf_unlock::logger::{AuditLoggerConfig, AuditLoggerHandle, spawn_logger};
use pdf_unlock::probe::{ExternalTool, probe};
use pdf_unlock::service::{UnlockService, jsonl_config};

/// pdu: remove PDF access restrictions and hold the results briefly.
#[derive(Debug, Parser)]
#[command(
    name = "pdu",
    author,
    version,
    about = "PDF unlock pipeline with an ephemeral artifact store",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Unlock a document and store the result.
    Unlock(UnlockArgs),
    /// Mint a fresh namespace token.
    Namespace,
    /// List live artifacts in a namespace.
    List(ListArgs),
    /// Retrieve an unlocked document to a local file.
    Retrieve(RetrieveArgs),
    /// Report availability of the external tools.
    Probe,
    /// Evict expired artifacts now.
    Sweep,
}

#[derive(Debug, Clone, Args)]
struct UnlockArgs {
    /// Input document. Omit when using --url.
    #[arg(value_name = "FILE", required_unless_present = "url", conflicts_with = "url")]
    input: Option<PathBuf>,
    /// Fetch the document from a URL instead of a local file.
    #[arg(long, value_name = "URL")]
    url: Option<String>,
    /// Namespace token; a fresh one is minted when omitted.
    #[arg(long, value_name = "TOKEN")]
    namespace: Option<String>,
    /// Also write the unlocked bytes to this path.
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct ListArgs {
    /// Namespace token.
    #[arg(value_name = "TOKEN")]
    namespace: String,
}

#[derive(Debug, Clone, Args)]
struct RetrieveArgs {
    /// Namespace token.
    #[arg(value_name = "TOKEN")]
    namespace: String,
    /// Artifact id from a previous unlock.
    #[arg(value_name = "ID")]
    id: String,
    /// Destination path; defaults to the stored display name.
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Unlock(args) => with_service(cli, |service| run_unlock(cli, service, args)),
        Command::Namespace => with_service(cli, |service| run_namespace(cli, service)),
        Command::List(args) => with_service(cli, |service| run_list(cli, service, args)),
        Command::Retrieve(args) => with_service(cli, |service| run_retrieve(cli, service, args)),
        Command::Probe => run_probe(cli),
        Command::Sweep => with_service(cli, |service| run_sweep(cli, service)),
    }
}

/// Build the service around a loaded config and a live audit logger, run
/// the command, then drain the logger so every audit line hits disk.
fn with_service(
    cli: &Cli,
    body: impl FnOnce(&UnlockService) -> Result<(), CliError>,
) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let (audit, join) = spawn_logger(AuditLoggerConfig {
        jsonl_config: jsonl_config(&config),
        ..AuditLoggerConfig::default()
    })
    .map_err(|e| CliError::Runtime(e.to_string()))?;

    let service = UnlockService::new(config, audit.clone());
    let result = body(&service);
    shutdown_logger(&audit, join);
    result
}

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    Config::load(cli.config.as_deref()).map_err(|e| CliError::User(e.to_string()))
}

fn shutdown_logger(audit: &AuditLoggerHandle, join: std::thread::JoinHandle<()>) {
    audit.shutdown();
    let _ = join.join();
}

fn run_unlock(cli: &Cli, service: &UnlockService, args: &UnlockArgs) -> Result<(), CliError> {
    let namespace = match &args.namespace {
        Some(token) => {
            ids::validate_namespace(token).map_err(|e| CliError::User(e.to_string()))?;
            token.clone()
        }
        None => service.issue_namespace(),
    };

    let submission = match (&args.input, &args.url) {
        (Some(input), None) => {
            let bytes = fs::read(input)
                .map_err(|e| CliError::User(format!("{}: {e}", input.display())))?;
            let name = input
                .file_name()
                .map_or_else(|| "document.pdf".to_string(), |n| n.to_string_lossy().into_owned());
            service.submit_bytes(&namespace, &name, &bytes)
        }
        (None, Some(url)) => submit_url(service, &namespace, url),
        _ => unreachable!("clap enforces exactly one source"),
    }
    .map_err(|e| CliError::Runtime(e.to_string()))?;

    if let Some(output) = &args.output {
        let bytes = service
            .retrieve(&namespace, &submission.artifact_id)
            .map_err(|e| CliError::Runtime(e.to_string()))?;
        fs::write(output, bytes)?;
    }

    match output_mode(cli) {
        OutputMode::Human => {
            println!("{} {}", "unlocked".green().bold(), submission.display_name);
            println!("  namespace: {namespace}");
            println!("  artifact:  {}", submission.artifact_id);
            println!("  strategy:  {}", submission.winning_strategy);
            println!("  expires:   {}", submission.expires_at.to_rfc3339());
            if let Some(output) = &args.output {
                println!("  written:   {}", output.display());
            }
        }
        OutputMode::Json => {
            let mut payload = serde_json::to_value(&submission)?;
            payload["namespace"] = json!(namespace);
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

#[cfg(feature = "remote")]
fn submit_url(
    service: &UnlockService,
    namespace: &str,
    url: &str,
) -> pdf_unlock::core::errors::Result<pdf_unlock::service::Submission> {
    service.submit_url(namespace, url)
}

#[cfg(not(feature = "remote"))]
fn submit_url(
    _service: &UnlockService,
    _namespace: &str,
    url: &str,
) -> pdf_unlock::core::errors::Result<pdf_unlock::service::Submission> {
    Err(pdf_unlock::core::errors::PduError::SourceUnavailable {
        url: url.to_string(),
        details: "built without the \"remote\" feature".to_string(),
    })
}

fn run_namespace(cli: &Cli, service: &UnlockService) -> Result<(), CliError> {
    let namespace = service.issue_namespace();
    match output_mode(cli) {
        OutputMode::Human => println!("{namespace}"),
        OutputMode::Json => write_json_line(&json!({ "namespace": namespace }))?,
    }
    Ok(())
}

fn run_list(cli: &Cli, service: &UnlockService, args: &ListArgs) -> Result<(), CliError> {
    let listings = service
        .list(&args.namespace)
        .map_err(|e| CliError::User(e.to_string()))?;

    match output_mode(cli) {
        OutputMode::Human => {
            if listings.is_empty() {
                println!("no live artifacts");
            }
            for item in &listings {
                println!(
                    "{}  {:>4}s left  {}",
                    item.id, item.seconds_remaining, item.name
                );
            }
        }
        OutputMode::Json => write_json_line(&serde_json::to_value(&listings)?)?,
    }
    Ok(())
}

fn run_retrieve(cli: &Cli, service: &UnlockService, args: &RetrieveArgs) -> Result<(), CliError> {
    let bytes = service
        .retrieve(&args.namespace, &args.id)
        .map_err(|e| CliError::User(e.to_string()))?;

    let destination = match &args.output {
        Some(path) => path.clone(),
        None => {
            let name = service
                .store()
                .read_metadata(&args.namespace, &args.id)
                .map(|meta| meta.original_name)
                .unwrap_or_else(|_| format!("{}.pdf", args.id));
            PathBuf::from(name)
        }
    };
    fs::write(&destination, &bytes)?;

    match output_mode(cli) {
        OutputMode::Human => {
            println!(
                "{} {} ({} bytes)",
                "retrieved".green().bold(),
                destination.display(),
                bytes.len()
            );
        }
        OutputMode::Json => write_json_line(&json!({
            "path": destination,
            "bytes": bytes.len(),
        }))?,
    }
    Ok(())
}

fn run_probe(cli: &Cli) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let tools = [
        (ExternalTool::Ghostscript, config.pipeline.gs_binary.clone()),
        (ExternalTool::Qpdf, config.pipeline.qpdf_binary.clone()),
        (ExternalTool::Pdftk, config.pipeline.pdftk_binary.clone()),
    ];

    let mut rows = Vec::new();
    for (tool, binary) in tools {
        let status = probe(&binary);
        rows.push((tool, binary, status));
    }

    match output_mode(cli) {
        OutputMode::Human => {
            for (tool, binary, status) in &rows {
                let verdict = if status.available {
                    "ok".green().bold()
                } else {
                    "missing".red().bold()
                };
                let version = status.version.as_deref().unwrap_or("-");
                println!("{tool:?} ({binary}): {verdict} {version}");
            }
        }
        OutputMode::Json => {
            let payload: Vec<Value> = rows
                .iter()
                .map(|(tool, binary, status)| {
                    json!({
                        "tool": tool,
                        "binary": binary,
                        "status": status,
                    })
                })
                .collect();
            write_json_line(&Value::Array(payload))?;
        }
    }
    Ok(())
}

fn run_sweep(cli: &Cli, service: &UnlockService) -> Result<(), CliError> {
    let report = service.sweep();
    match output_mode(cli) {
        OutputMode::Human => {
            println!(
                "swept: {} scanned, {} evicted, {} skipped",
                report.scanned, report.evicted, report.skipped
            );
        }
        OutputMode::Json => write_json_line(&serde_json::to_value(report)?)?,
    }
    Ok(())
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("PDU_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn output_mode_resolution_honors_precedence() {
        assert_eq!(
            resolve_output_mode(true, Some("human"), true),
            OutputMode::Json
        );
        assert_eq!(
            resolve_output_mode(false, Some("json"), true),
            OutputMode::Json
        );
        assert_eq!(
            resolve_output_mode(false, Some("human"), false),
            OutputMode::Human
        );
        assert_eq!(resolve_output_mode(false, None, true), OutputMode::Human);
        assert_eq!(resolve_output_mode(false, None, false), OutputMode::Json);
    }

    #[test]
    fn unlock_requires_exactly_one_source() {
        assert!(Cli::try_parse_from(["pdu", "unlock"]).is_err());
        assert!(Cli::try_parse_from(["pdu", "unlock", "a.pdf", "--url", "https://x/y.pdf"]).is_err());
        assert!(Cli::try_parse_from(["pdu", "unlock", "a.pdf"]).is_ok());
        assert!(Cli::try_parse_from(["pdu", "unlock", "--url", "https://x/y.pdf"]).is_ok());
    }
}
