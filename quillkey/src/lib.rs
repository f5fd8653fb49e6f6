pub mod audio;
pub mod config;
mod error;
pub mod gate;
pub mod history;
pub mod hotkey;
pub mod input;
pub mod logging;
pub mod network;
pub mod notify;
pub mod pipeline;
pub mod secure_storage;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

pub use error::AppError;

use config::{ConfigStore, app_data_dir};
use gate::ActionKind;
use history::HistoryLog;
use hotkey::HotkeyEvent;
use input::{Desktop, SystemDesktop};
use notify::{Notification, Notifier};
use pipeline::{Pipeline, TriggerOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Trigger(HotkeyEvent),
    TestConnection,
    History,
    Quit,
}

fn parse_command(line: &str) -> Option<Result<Command, String>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let command = match trimmed.to_ascii_lowercase().as_str() {
        "test-connection" | "test" => Ok(Command::TestConnection),
        "history" => Ok(Command::History),
        "quit" | "exit" => Ok(Command::Quit),
        _ => trimmed.parse::<HotkeyEvent>().map(Command::Trigger),
    };
    Some(command)
}

pub fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    match logging::init(log_dir) {
        Ok(guard) => guard,
        Err(init_err) => {
            eprintln!("logging bootstrap failed: {init_err}");
            None
        }
    }
}

fn init_rustls_crypto_provider() {
    if rustls::crypto::CryptoProvider::get_default().is_some() {
        return;
    }

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls CryptoProvider was already installed");
    } else {
        info!("rustls CryptoProvider initialized with ring");
    }
}

fn build_pipeline(notifier: Notifier) -> Result<Pipeline, AppError> {
    let store = ConfigStore::in_app_data_dir()?;
    let mut config = store.load_or_default();
    config.resolve_api_keys();
    info!(
        path = %store.path().display(),
        refine_hotkey = %config.hotkey,
        transcribe_hotkey = %config.transcriber_hotkey,
        transcriber_enabled = config.transcriber.enabled,
        "configuration loaded"
    );

    let history = HistoryLog::in_app_data_dir()?;
    let desktop: Arc<dyn Desktop> = Arc::new(SystemDesktop::new());
    let audio = audio::source_from_config(&config.transcriber);

    Ok(Pipeline::new(config, desktop, audio, history, notifier))
}

fn spawn_notification_printer(mut rx: broadcast::Receiver<Notification>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(note) => println!("[{}] {}", note.severity, note.message),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "notification printer fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn print_history(pipeline: &Pipeline) {
    let entries = pipeline.history().read_all();
    if entries.is_empty() {
        println!("history is empty");
        return;
    }
    for entry in entries {
        println!(
            "{} [{}] {} => {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.model,
            entry.original,
            entry.refined
        );
    }
}

fn spawn_connection_test(pipeline: &Pipeline) {
    let pipeline = pipeline.clone();
    tokio::spawn(async move {
        match pipeline.test_connection().await {
            Ok(text) => pipeline
                .notifier()
                .success(format!("Transcriber connection OK. Response: {text:?}")),
            Err(err) => pipeline
                .notifier()
                .error(format!("Transcriber connection test failed: {err}")),
        }
    });
}

async fn serve() -> anyhow::Result<()> {
    let notifier = Notifier::new();
    let printer = spawn_notification_printer(notifier.subscribe());
    let pipeline = build_pipeline(notifier).context("failed to start pipeline")?;
    info!(
        actions = ?ActionKind::ALL,
        "ready; type refine, transcribe, test-connection, history or quit"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let command = match parse_command(&line) {
            None => continue,
            Some(Ok(command)) => command,
            Some(Err(err)) => {
                warn!("ignoring input: {err}");
                continue;
            }
        };

        match command {
            Command::Trigger(event) => match pipeline.trigger(event.kind) {
                TriggerOutcome::Started(_) => info!(kind = %event.kind, "hotkey accepted"),
                TriggerOutcome::Busy | TriggerOutcome::Disabled => {
                    info!(kind = %event.kind, "hotkey rejected");
                }
            },
            Command::TestConnection => spawn_connection_test(&pipeline),
            Command::History => print_history(&pipeline),
            Command::Quit => break,
        }
    }

    info!("shutting down");
    printer.abort();
    Ok(())
}

pub fn run() {
    let log_dir = app_data_dir().ok();
    let _log_guard = init_logging(log_dir.as_deref());
    init_rustls_crypto_provider();

    info!("starting quillkey");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Runtime(err.to_string()))
    {
        Ok(runtime) => runtime,
        Err(build_err) => {
            error!("{build_err}");
            return;
        }
    };

    if let Err(run_err) = runtime.block_on(serve()) {
        error!("quillkey stopped: {run_err:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdin_lines_map_to_commands() {
        assert_eq!(
            parse_command(" refine "),
            Some(Ok(Command::Trigger(HotkeyEvent::new(ActionKind::Refine))))
        );
        assert_eq!(
            parse_command("2"),
            Some(Ok(Command::Trigger(HotkeyEvent::new(ActionKind::Transcribe))))
        );
        assert_eq!(parse_command("test-connection"), Some(Ok(Command::TestConnection)));
        assert_eq!(parse_command("HISTORY"), Some(Ok(Command::History)));
        assert_eq!(parse_command("quit"), Some(Ok(Command::Quit)));
    }

    #[test]
    fn blank_and_unknown_lines() {
        assert_eq!(parse_command("   "), None);
        assert!(matches!(parse_command("dance"), Some(Err(_))));
        assert!(matches!(parse_command("7"), Some(Err(_))));
    }
}
