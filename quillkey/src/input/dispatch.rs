use std::sync::Arc;

use tokio::time::sleep;
use tracing::{info, warn};

use super::{Desktop, InputError, run_blocking};
use crate::config::TimingConfig;
use crate::notify::Notifier;

pub const MANUAL_PASTE_MESSAGE: &str = "Text is ready. You can paste manually with Ctrl+V.";
pub const TEXT_READY_MESSAGE: &str = "Text copied to the clipboard and ready to paste.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Pasted,
    ManualPaste,
    ClipboardOnly,
}

pub struct ResultDispatcher {
    desktop: Arc<dyn Desktop>,
    timings: TimingConfig,
    notifier: Notifier,
}

impl ResultDispatcher {
    pub fn new(desktop: Arc<dyn Desktop>, timings: TimingConfig, notifier: Notifier) -> Self {
        Self {
            desktop,
            timings,
            notifier,
        }
    }

    pub async fn dispatch(
        &self,
        text: &str,
        auto_paste: bool,
    ) -> Result<DispatchOutcome, InputError> {
        self.write_with_retry(text).await?;
        sleep(self.timings.paste_settle()).await;

        if !auto_paste {
            self.notifier.success(TEXT_READY_MESSAGE);
            return Ok(DispatchOutcome::ClipboardOnly);
        }

        match run_blocking(&self.desktop, |desktop| desktop.send_paste()).await {
            Ok(()) => {
                info!("auto-paste sent");
                Ok(DispatchOutcome::Pasted)
            }
            Err(err) => {
                warn!("auto-paste failed: {err}");
                self.notifier.info(MANUAL_PASTE_MESSAGE);
                Ok(DispatchOutcome::ManualPaste)
            }
        }
    }

    async fn write_with_retry(&self, text: &str) -> Result<(), InputError> {
        let attempts = self.timings.clipboard_write_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let owned = text.to_string();
            match run_blocking(&self.desktop, move |desktop| desktop.write_text(&owned)).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(attempt, attempts, "clipboard write failed: {err}");
                    last_error = Some(err);
                    if attempt < attempts {
                        sleep(self.timings.clipboard_retry()).await;
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| InputError::Clipboard("clipboard write failed".to_string())))
    }
}
