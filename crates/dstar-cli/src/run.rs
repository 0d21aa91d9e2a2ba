//! `dstar run`: upload, connect, execute, report, clean up.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use dstar_client::{
    ConnectionConfig, ConnectionManager, SessionController, SessionHandle, SessionRuntime,
    SessionView, UploadClient, UploadedFile,
};
use dstar_core::SessionStatus;
use dstar_settings::ClientSettings;
use tracing::{info, warn};

use crate::RunArgs;
use crate::progress::ProgressPrinter;

pub async fn run(settings: &ClientSettings, args: &RunArgs) -> Result<ExitCode> {
    let config = settings
        .agent
        .config()
        .merged(&args.patch())
        .context("invalid agent configuration")?;
    let uploads = UploadClient::from_settings(settings)?;
    let files = upload_all(&uploads, args).await?;

    let outcome = execute(settings, config, args, &files).await;

    if args.keep_uploads {
        for file in &files {
            println!("kept {}", file.path);
        }
    } else {
        for file in &files {
            uploads.discard(file).await;
        }
    }
    outcome
}

async fn upload_all(uploads: &UploadClient, args: &RunArgs) -> Result<Vec<UploadedFile>> {
    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        match uploads.upload(path).await {
            Ok(file) => files.push(file),
            Err(e) => {
                for file in &files {
                    uploads.discard(file).await;
                }
                return Err(e).with_context(|| format!("failed to upload {}", path.display()));
            }
        }
    }
    Ok(files)
}

async fn execute(
    settings: &ClientSettings,
    config: dstar_core::AgentConfig,
    args: &RunArgs,
    files: &[UploadedFile],
) -> Result<ExitCode> {
    let (mut manager, events) = ConnectionManager::new(ConnectionConfig::from_settings(settings)?);
    let controller = SessionController::with_config(manager.handle(), config);
    let (runtime, handle) = SessionRuntime::new(controller, events);
    let runtime = runtime.with_connection_status(manager.handle().watch_status());
    let task = tokio::spawn(runtime.run());

    let result = async {
        connect_with_retries(&mut manager, settings).await?;
        let data_files = files.iter().map(|f| f.path.clone()).collect();
        handle.start(args.query.as_str(), data_files).await?;
        follow(&handle).await
    }
    .await;

    handle.shutdown().await;
    if let Err(e) = task.await {
        warn!(error = %e, "session runtime ended abnormally");
    }
    manager.close().await;
    result
}

async fn connect_with_retries(manager: &mut ConnectionManager, settings: &ClientSettings) -> Result<()> {
    let attempts = settings.connection.connect_retries.saturating_add(1);
    let delay = Duration::from_millis(settings.connection.retry_delay_ms);
    let mut attempt = 1;
    loop {
        match manager.open().await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < attempts => {
                warn!(attempt, attempts, error = %e, "connect attempt failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("could not connect to {}", manager.url()));
            }
        }
    }
}

/// Print progress until the session reaches a terminal status.
async fn follow(handle: &SessionHandle) -> Result<ExitCode> {
    let mut views = handle.subscribe();
    let mut printer = ProgressPrinter::default();
    let mut cancel_sent = false;

    loop {
        let view = views.borrow_and_update().clone();
        for line in printer.lines(&view) {
            println!("{line}");
        }
        if view.status.is_terminal() {
            return Ok(report(&view));
        }
        if view.is_executing() && !view.connection.is_connected() {
            bail!("connection lost while the session was running");
        }

        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    bail!("session runtime stopped unexpectedly");
                }
            }
            signal = tokio::signal::ctrl_c(), if !cancel_sent => {
                signal.context("failed to listen for ctrl-c")?;
                cancel_sent = true;
                if handle.cancel().await? {
                    info!("cancel requested");
                    eprintln!("cancelling...");
                }
            }
        }
    }
}

fn report(view: &SessionView) -> ExitCode {
    match view.status {
        SessionStatus::Completed => {
            println!();
            println!("{}", view.final_answer.as_deref().unwrap_or_default());
            ExitCode::SUCCESS
        }
        SessionStatus::Cancelled => {
            eprintln!("cancelled");
            ExitCode::from(130)
        }
        _ => {
            eprintln!(
                "error: {}",
                view.error.as_deref().unwrap_or("session failed")
            );
            if let Some(traceback) = failed_traceback(view) {
                eprintln!("{traceback}");
            }
            ExitCode::FAILURE
        }
    }
}

/// Traceback of the last execution, when that execution failed.
fn failed_traceback(view: &SessionView) -> Option<&str> {
    view.snapshot
        .as_ref()?
        .latest_result()
        .filter(|result| !result.success)?
        .error_traceback
        .as_deref()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn code(view: &SessionView) -> String {
        format!("{:?}", report(view))
    }

    #[test]
    fn completed_view_exits_cleanly() {
        let view = SessionView {
            status: SessionStatus::Completed,
            final_answer: Some("42".into()),
            ..SessionView::default()
        };
        assert_eq!(code(&view), format!("{:?}", ExitCode::SUCCESS));
    }

    #[test]
    fn errored_and_cancelled_views_exit_non_zero() {
        let errored = SessionView {
            status: SessionStatus::Errored,
            error: Some("boom".into()),
            ..SessionView::default()
        };
        assert_eq!(code(&errored), format!("{:?}", ExitCode::FAILURE));

        let cancelled = SessionView {
            status: SessionStatus::Cancelled,
            ..SessionView::default()
        };
        assert_eq!(code(&cancelled), format!("{:?}", ExitCode::from(130)));
    }

    #[test]
    fn traceback_only_from_a_failed_last_execution() {
        use dstar_core::{ExecutionResult, ExecutionSnapshot};

        let result = |success: bool| ExecutionResult {
            success,
            error_traceback: Some("Traceback: KeyError 'revenue'".into()),
            ..ExecutionResult::default()
        };
        let mut view = SessionView {
            status: SessionStatus::Errored,
            snapshot: Some(ExecutionSnapshot {
                execution_results: vec![result(true), result(false)],
                ..ExecutionSnapshot::default()
            }),
            ..SessionView::default()
        };
        assert_eq!(failed_traceback(&view), Some("Traceback: KeyError 'revenue'"));

        if let Some(snapshot) = view.snapshot.as_mut() {
            snapshot.execution_results.push(result(true));
        }
        assert_eq!(failed_traceback(&view), None);
        assert_eq!(failed_traceback(&SessionView::default()), None);
    }

    #[tokio::test]
    async fn connect_gives_up_after_configured_retries() {
        let mut settings = ClientSettings::default();
        // Nothing listens on port 9; every attempt fails fast.
        settings.server.base_url = "http://127.0.0.1:9".into();
        settings.connection.connect_retries = 1;
        settings.connection.retry_delay_ms = 10;
        settings.connection.connect_timeout_ms = 500;

        let (mut manager, _events) =
            ConnectionManager::new(ConnectionConfig::from_settings(&settings).unwrap());
        let err = connect_with_retries(&mut manager, &settings).await.unwrap_err();
        assert!(err.to_string().contains("could not connect"));
    }
}
