use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::audio::{AudioError, AudioSource};
use crate::config::AppConfig;
use crate::gate::{ActionKind, BusyGuard, TriggerGate};
use crate::history::HistoryLog;
use crate::input::{Desktop, DispatchOutcome, InputError, ResultDispatcher, SelectionCapture};
use crate::logging::fingerprint;
use crate::network::refiner::DEFAULT_MAX_ATTEMPTS;
use crate::network::{RefineClient, RemoteError, TranscribeClient};
use crate::notify::{Notifier, Severity};

pub const REFINE_BUSY_MESSAGE: &str = "Refinement already in progress. Please wait.";
pub const TRANSCRIBE_BUSY_MESSAGE: &str = "Transcription already in progress. Please wait.";
pub const TRANSCRIBER_DISABLED_MESSAGE: &str =
    "Remote transcription is disabled. Enable it in settings first.";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No text selected or in clipboard.")]
    NothingCaptured,
    #[error("Provider returned empty result.")]
    EmptyRefinement,
    #[error("No speech detected or transcription returned empty result.")]
    EmptyTranscript,
    #[error("Refinement failed: {0}")]
    Refine(#[source] RemoteError),
    #[error("Transcription failed: {0}")]
    Transcribe(#[source] RemoteError),
    #[error("Failed to acquire audio for transcription: {0}")]
    Audio(#[source] AudioError),
    #[error("Failed to put the result on the clipboard: {0}")]
    Clipboard(#[source] InputError),
    #[error("background task failed: {0}")]
    Task(String),
}

impl PipelineError {
    pub fn severity(&self) -> Severity {
        match self {
            Self::NothingCaptured | Self::EmptyTranscript => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

#[derive(Debug)]
pub enum TriggerOutcome {
    Started(JoinHandle<()>),
    Busy,
    Disabled,
}

impl TriggerOutcome {
    pub fn started(&self) -> bool {
        matches!(self, Self::Started(_))
    }
}

#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

struct Inner {
    config: AppConfig,
    desktop: Arc<dyn Desktop>,
    audio: Arc<dyn AudioSource>,
    history: HistoryLog,
    notifier: Notifier,
    gate: Arc<TriggerGate>,
}

impl Pipeline {
    pub fn new(
        config: AppConfig,
        desktop: Arc<dyn Desktop>,
        audio: Arc<dyn AudioSource>,
        history: HistoryLog,
        notifier: Notifier,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                desktop,
                audio,
                history,
                notifier,
                gate: TriggerGate::new(),
            }),
        }
    }

    pub fn config(&self) -> AppConfig {
        self.inner.config.clone()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }

    pub fn history(&self) -> &HistoryLog {
        &self.inner.history
    }

    pub fn is_busy(&self, kind: ActionKind) -> bool {
        self.inner.gate.is_busy(kind)
    }

    pub fn trigger(&self, kind: ActionKind) -> TriggerOutcome {
        if kind == ActionKind::Transcribe && !self.config().transcriber.enabled {
            self.inner.notifier.warning(TRANSCRIBER_DISABLED_MESSAGE);
            return TriggerOutcome::Disabled;
        }

        let Some(guard) = self.inner.gate.try_acquire(kind) else {
            self.inner.notifier.warning(busy_message(kind));
            return TriggerOutcome::Busy;
        };

        let pipeline = self.clone();
        TriggerOutcome::Started(tokio::spawn(async move {
            pipeline.run_guarded(guard).await;
        }))
    }

    async fn run_guarded(&self, guard: BusyGuard) {
        let kind = guard.kind();
        info!(%kind, "pipeline started");
        let result = match kind {
            ActionKind::Refine => self.run_refine().await,
            ActionKind::Transcribe => self.run_transcribe().await,
        };

        match result {
            Ok(outcome) => info!(%kind, ?outcome, "pipeline completed"),
            Err(err) => self.report(kind, &err),
        }
        drop(guard);
    }

    fn report(&self, kind: ActionKind, err: &PipelineError) {
        warn!(%kind, "pipeline ended without a result: {err}");
        match err.severity() {
            Severity::Warning => self.inner.notifier.warning(err.to_string()),
            _ => self.inner.notifier.error(err.to_string()),
        }
    }

    pub async fn run_refine(&self) -> Result<DispatchOutcome, PipelineError> {
        let config = self.config();

        let capture = SelectionCapture::new(Arc::clone(&self.inner.desktop), config.timings)
            .capture(config.use_clipboard_fallback)
            .await;
        info!(provenance = ?capture.provenance, "captured {}", fingerprint(&capture.text));
        if capture.is_empty() {
            return Err(PipelineError::NothingCaptured);
        }

        let client = RefineClient::new(&config.llm)
            .map_err(PipelineError::Refine)?
            .with_retry(DEFAULT_MAX_ATTEMPTS, config.timings.retry_backoff());
        let refined = client
            .refine(&capture.text)
            .await
            .map_err(PipelineError::Refine)?;
        info!("refined {}", fingerprint(&refined));
        if refined.trim().is_empty() {
            return Err(PipelineError::EmptyRefinement);
        }

        let outcome = self
            .dispatcher(&config)
            .dispatch(&refined, config.auto_paste)
            .await
            .map_err(PipelineError::Clipboard)?;

        self.record_history(capture.text, refined, config.llm.model.clone())
            .await;
        Ok(outcome)
    }

    pub async fn run_transcribe(&self) -> Result<DispatchOutcome, PipelineError> {
        let config = self.config();

        let audio = self.acquire_audio().await?;
        info!(audio_bytes = audio.len(), "audio acquired");

        let client = TranscribeClient::new(&config.transcriber).map_err(PipelineError::Transcribe)?;
        let attempts = config.transcriber.max_attempts.max(1);
        let mut attempt = 1;
        let transcript = loop {
            match client.transcribe(audio.clone()).await {
                Ok(text) => break text,
                Err(err) if err.is_retryable() && attempt < attempts => {
                    warn!(attempt, attempts, "retryable transcription failure: {err}");
                    self.inner
                        .notifier
                        .warning(format!("Transcription failed, but will retry. Error: {err}"));
                    sleep(config.timings.retry_backoff()).await;
                    attempt += 1;
                }
                Err(err) => return Err(PipelineError::Transcribe(err)),
            }
        };
        info!("transcribed {}", fingerprint(&transcript));
        if transcript.trim().is_empty() {
            return Err(PipelineError::EmptyTranscript);
        }

        let outcome = self
            .dispatcher(&config)
            .dispatch(&transcript, config.transcriber.auto_paste)
            .await
            .map_err(PipelineError::Clipboard)?;

        self.record_history(
            format!("[audio {} bytes]", audio.len()),
            transcript,
            config.transcriber.model.clone(),
        )
        .await;
        Ok(outcome)
    }

    pub async fn test_connection(&self) -> Result<String, RemoteError> {
        let config = self.config();
        TranscribeClient::new(&config.transcriber)?
            .test_connection()
            .await
    }

    fn dispatcher(&self, config: &AppConfig) -> ResultDispatcher {
        ResultDispatcher::new(
            Arc::clone(&self.inner.desktop),
            config.timings,
            self.inner.notifier.clone(),
        )
    }

    async fn acquire_audio(&self) -> Result<Vec<u8>, PipelineError> {
        let source = Arc::clone(&self.inner.audio);
        tokio::task::spawn_blocking(move || source.acquire())
            .await
            .map_err(|err| PipelineError::Task(err.to_string()))?
            .map_err(PipelineError::Audio)
    }

    async fn record_history(&self, original: String, result: String, model: String) {
        let history = self.inner.history.clone();
        let written = tokio::task::spawn_blocking(move || {
            history.append(&original, &result, &model);
        })
        .await;
        if let Err(err) = written {
            warn!("history task failed: {err}");
        }
    }
}

fn busy_message(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Refine => REFINE_BUSY_MESSAGE,
        ActionKind::Transcribe => TRANSCRIBE_BUSY_MESSAGE,
    }
}
