use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::{Desktop, run_blocking};
use crate::config::TimingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    FreshSelection,
    FallbackClipboard,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResult {
    pub text: String,
    pub provenance: Provenance,
}

impl CaptureResult {
    fn empty() -> Self {
        Self {
            text: String::new(),
            provenance: Provenance::Empty,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

pub struct SelectionCapture {
    desktop: Arc<dyn Desktop>,
    timings: TimingConfig,
}

impl SelectionCapture {
    pub fn new(desktop: Arc<dyn Desktop>, timings: TimingConfig) -> Self {
        Self { desktop, timings }
    }

    pub async fn capture(&self, use_clipboard_fallback: bool) -> CaptureResult {
        let snapshot = match run_blocking(&self.desktop, |desktop| desktop.read_text()).await {
            Ok(text) => text,
            Err(err) => {
                warn!("failed to snapshot clipboard: {err}");
                None
            }
        };
        let foreground = self.desktop.foreground_window();

        if let Err(err) = run_blocking(&self.desktop, |desktop| desktop.clear()).await {
            warn!("failed to clear clipboard before capture: {err}");
        }
        sleep(self.timings.clear_settle()).await;

        if let Some(window) = foreground {
            if let Err(err) =
                run_blocking(&self.desktop, move |desktop| desktop.focus_window(window)).await
            {
                debug!("refocusing foreground window failed: {err}");
            }
            sleep(self.timings.refocus_settle()).await;
        }

        if let Err(err) = run_blocking(&self.desktop, |desktop| desktop.send_copy()).await {
            warn!("copy shortcut failed: {err}");
        }
        sleep(self.timings.copy_wait()).await;

        match run_blocking(&self.desktop, |desktop| desktop.read_text()).await {
            Ok(Some(text)) if !text.trim().is_empty() => {
                info!(chars = text.chars().count(), "captured fresh selection");
                return CaptureResult {
                    text,
                    provenance: Provenance::FreshSelection,
                };
            }
            Ok(_) => debug!("copy shortcut produced no text"),
            Err(err) => warn!("failed to read clipboard after copy: {err}"),
        }

        self.restore(snapshot.as_deref()).await;

        match snapshot {
            Some(text) if use_clipboard_fallback && !text.trim().is_empty() => {
                info!(
                    chars = text.chars().count(),
                    "no selection, falling back to clipboard text"
                );
                CaptureResult {
                    text,
                    provenance: Provenance::FallbackClipboard,
                }
            }
            _ => {
                info!("nothing captured");
                CaptureResult::empty()
            }
        }
    }

    async fn restore(&self, snapshot: Option<&str>) {
        let restored = match snapshot.filter(|text| !text.is_empty()) {
            Some(text) => {
                let text = text.to_string();
                run_blocking(&self.desktop, move |desktop| desktop.write_text(&text)).await
            }
            None => run_blocking(&self.desktop, |desktop| desktop.clear()).await,
        };
        if let Err(err) = restored {
            warn!("failed to restore clipboard snapshot: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::fake::{CopyBehavior, FakeDesktop};

    fn capture_with(desktop: &Arc<FakeDesktop>) -> SelectionCapture {
        let desktop: Arc<dyn Desktop> = desktop.clone();
        SelectionCapture::new(desktop, TimingConfig::immediate())
    }

    #[tokio::test]
    async fn fresh_selection_wins_over_clipboard() {
        let desktop = FakeDesktop::new(
            Some("old clipboard"),
            CopyBehavior::Selection("helo wrold".to_string()),
        );

        let result = capture_with(&desktop).capture(true).await;

        assert_eq!(result.text, "helo wrold");
        assert_eq!(result.provenance, Provenance::FreshSelection);
        assert_eq!(
            desktop.events(),
            vec!["read", "clear", "focus:42", "copy", "read"]
        );
    }

    #[tokio::test]
    async fn empty_copy_restores_snapshot_exactly() {
        let original = "  keep\r\nthis exactly\t";
        let desktop = FakeDesktop::new(Some(original), CopyBehavior::Nothing);

        let result = capture_with(&desktop).capture(false).await;

        assert_eq!(desktop.clipboard().as_deref(), Some(original));
        assert_eq!(result.provenance, Provenance::Empty);
        assert!(result.text.is_empty());
    }

    #[tokio::test]
    async fn whitespace_selection_falls_back_to_snapshot() {
        let desktop = FakeDesktop::new(
            Some("clipboard text"),
            CopyBehavior::Selection("   \n".to_string()),
        );

        let result = capture_with(&desktop).capture(true).await;

        assert_eq!(result.text, "clipboard text");
        assert_eq!(result.provenance, Provenance::FallbackClipboard);
        assert_eq!(desktop.clipboard().as_deref(), Some("clipboard text"));
    }

    #[tokio::test]
    async fn empty_clipboard_and_no_selection_is_empty() {
        let desktop = FakeDesktop::new(None, CopyBehavior::Nothing);

        let result = capture_with(&desktop).capture(true).await;

        assert!(result.is_empty());
        assert_eq!(result.provenance, Provenance::Empty);
        assert_eq!(desktop.clipboard(), None);
    }

    #[tokio::test]
    async fn whitespace_copy_without_snapshot_leaves_clipboard_empty() {
        let desktop = FakeDesktop::new(None, CopyBehavior::Selection("  \n".to_string()));

        let result = capture_with(&desktop).capture(true).await;

        assert_eq!(result.provenance, Provenance::Empty);
        assert_eq!(desktop.clipboard(), None);
        assert_eq!(
            desktop.events(),
            vec!["read", "clear", "focus:42", "copy", "read", "clear"]
        );
    }
}
