//! # dstar
//!
//! Command-line client for a DS-STAR analysis server: uploads data files,
//! runs a query over the WebSocket and prints progress as it arrives.

#![deny(unsafe_code)]

mod progress;
mod run;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dstar_client::UploadClient;
use dstar_core::AgentConfigPatch;
use dstar_settings::ClientSettings;

/// DS-STAR analysis client.
#[derive(Parser, Debug)]
#[command(name = "dstar", about = "DS-STAR analysis client", version)]
struct Cli {
    /// Server base URL (overrides settings).
    #[arg(long, global = true)]
    server: Option<String>,

    /// Log filter when `RUST_LOG` is unset (overrides settings).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Settings file (defaults to `~/.dstar/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload files, run a query and print progress.
    Run(RunArgs),
    /// Upload files and print their server paths.
    Upload {
        /// Local files.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// List files stored on the server.
    Uploads,
    /// Delete a stored file by its stored name.
    Delete {
        /// Name as shown by `uploads`.
        name: String,
    },
    /// Check that the server is up.
    Health,
}

/// Arguments of `dstar run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Question to answer.
    #[arg(long, short)]
    pub query: String,

    /// Local data file; repeat for several.
    #[arg(long = "file", short = 'f', required = true)]
    pub files: Vec<PathBuf>,

    /// Upper bound on plan/verify iterations.
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Debug retries per failed execution.
    #[arg(long)]
    pub max_debug_attempts: Option<u32>,

    /// Per-execution timeout in seconds.
    #[arg(long = "timeout")]
    pub execution_timeout_seconds: Option<f64>,

    /// Sampling temperature.
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Token budget per model call.
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Leave uploaded files on the server afterwards.
    #[arg(long)]
    pub keep_uploads: bool,
}

impl RunArgs {
    /// Configuration edits named on the command line.
    pub fn patch(&self) -> AgentConfigPatch {
        AgentConfigPatch {
            max_iterations: self.max_iterations,
            max_debug_attempts: self.max_debug_attempts,
            execution_timeout_seconds: self.execution_timeout_seconds,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

fn load_settings(cli: &Cli) -> Result<ClientSettings> {
    let path = cli
        .settings
        .clone()
        .unwrap_or_else(dstar_settings::settings_path);
    let mut settings = dstar_settings::load_settings_from_path(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    if let Some(server) = &cli.server {
        settings.server.base_url.clone_from(server);
    }
    if let Some(level) = &cli.log_level {
        settings.logging.level.clone_from(level);
    }
    settings.validate().context("invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    dstar_core::logging::init_subscriber(&settings.logging.level);
    let _ = dstar_settings::init_settings(settings.clone());

    match cli.command {
        Command::Run(args) => run::run(&settings, &args).await,
        Command::Upload { paths } => {
            let client = UploadClient::from_settings(&settings)?;
            for path in &paths {
                let file = client
                    .upload(path)
                    .await
                    .with_context(|| format!("failed to upload {}", path.display()))?;
                println!("{}\t{}", file.path, file.size);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Uploads => {
            let client = UploadClient::from_settings(&settings)?;
            for file in client.list().await.context("failed to list uploads")? {
                println!("{}\t{}", file.filename, file.size);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Delete { name } => {
            let client = UploadClient::from_settings(&settings)?;
            client
                .delete(&name)
                .await
                .with_context(|| format!("failed to delete {name}"))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Health => {
            let client = UploadClient::from_settings(&settings)?;
            let health = client.health().await.context("server is not reachable")?;
            println!("{} {} ({})", health.service, health.version, health.status);
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn run_args_parse_into_patch() {
        let cli = Cli::parse_from([
            "dstar",
            "run",
            "-q",
            "total revenue by category",
            "-f",
            "a.csv",
            "--file",
            "b.csv",
            "--max-iterations",
            "5",
            "--timeout",
            "120",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.files.len(), 2);
        let patch = args.patch();
        assert_eq!(patch.max_iterations, Some(5));
        assert_eq!(patch.execution_timeout_seconds, Some(120.0));
        assert!(patch.temperature.is_none());
        assert!(!args.keep_uploads);
    }

    #[test]
    fn run_requires_a_file() {
        assert!(Cli::try_parse_from(["dstar", "run", "-q", "x"]).is_err());
    }

    #[test]
    fn global_flags_override_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"baseUrl": "http://file.example"}}"#).unwrap();

        let cli = Cli::parse_from([
            "dstar",
            "--settings",
            path.to_str().unwrap(),
            "--server",
            "https://flag.example",
            "--log-level",
            "debug",
            "health",
        ]);
        let settings = load_settings(&cli).unwrap();
        assert_eq!(settings.server.base_url, "https://flag.example");
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn bad_server_flag_is_rejected() {
        let cli = Cli::parse_from(["dstar", "--server", "localhost:8000", "uploads"]);
        assert!(load_settings(&cli).is_err());
    }
}
