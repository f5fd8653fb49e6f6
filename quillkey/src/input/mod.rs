pub mod capture;
pub mod dispatch;
pub mod system;

use std::sync::Arc;

use thiserror::Error;

pub use capture::{CaptureResult, Provenance, SelectionCapture};
pub use dispatch::{DispatchOutcome, ResultDispatcher};
pub use system::SystemDesktop;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to initialize input simulation: {0}")]
    Initialization(String),
    #[error("failed to simulate keyboard input: {0}")]
    Keyboard(String),
    #[error("clipboard operation failed: {0}")]
    Clipboard(String),
    #[error("failed to focus window: {0}")]
    Focus(String),
    #[error("desktop task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHandle(pub isize);

pub trait Desktop: Send + Sync + 'static {
    fn read_text(&self) -> Result<Option<String>, InputError>;
    fn write_text(&self, text: &str) -> Result<(), InputError>;
    fn clear(&self) -> Result<(), InputError>;
    fn foreground_window(&self) -> Option<WindowHandle>;
    fn focus_window(&self, window: WindowHandle) -> Result<(), InputError>;
    fn send_copy(&self) -> Result<(), InputError>;
    fn send_paste(&self) -> Result<(), InputError>;
}

pub async fn run_blocking<T, F>(desktop: &Arc<dyn Desktop>, op: F) -> Result<T, InputError>
where
    T: Send + 'static,
    F: FnOnce(&dyn Desktop) -> Result<T, InputError> + Send + 'static,
{
    let desktop = Arc::clone(desktop);
    tokio::task::spawn_blocking(move || op(desktop.as_ref()))
        .await
        .map_err(|err| InputError::Task(err.to_string()))?
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone)]
    pub enum CopyBehavior {
        Selection(String),
        Nothing,
    }

    #[derive(Debug, Default)]
    pub struct FakeState {
        pub clipboard: Option<String>,
        pub events: Vec<String>,
        pub write_failures: VecDeque<()>,
        pub paste_fails: bool,
        pub pastes: usize,
    }

    #[derive(Debug)]
    pub struct FakeDesktop {
        pub state: Mutex<FakeState>,
        copy: CopyBehavior,
    }

    impl FakeDesktop {
        pub fn new(clipboard: Option<&str>, copy: CopyBehavior) -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(FakeState {
                    clipboard: clipboard.map(str::to_string),
                    ..FakeState::default()
                }),
                copy,
            })
        }

        pub fn fail_writes(&self, count: usize) {
            let mut state = self.state.lock().expect("fake state");
            state.write_failures = std::iter::repeat_n((), count).collect();
        }

        pub fn fail_paste(&self) {
            self.state.lock().expect("fake state").paste_fails = true;
        }

        pub fn clipboard(&self) -> Option<String> {
            self.state.lock().expect("fake state").clipboard.clone()
        }

        pub fn events(&self) -> Vec<String> {
            self.state.lock().expect("fake state").events.clone()
        }

        pub fn pastes(&self) -> usize {
            self.state.lock().expect("fake state").pastes
        }
    }

    impl Desktop for FakeDesktop {
        fn read_text(&self) -> Result<Option<String>, InputError> {
            let mut state = self.state.lock().expect("fake state");
            state.events.push("read".to_string());
            Ok(state.clipboard.clone())
        }

        fn write_text(&self, text: &str) -> Result<(), InputError> {
            let mut state = self.state.lock().expect("fake state");
            state.events.push(format!("write:{text}"));
            if state.write_failures.pop_front().is_some() {
                return Err(InputError::Clipboard("clipboard is locked".to_string()));
            }
            state.clipboard = Some(text.to_string());
            Ok(())
        }

        fn clear(&self) -> Result<(), InputError> {
            let mut state = self.state.lock().expect("fake state");
            state.events.push("clear".to_string());
            state.clipboard = None;
            Ok(())
        }

        fn foreground_window(&self) -> Option<WindowHandle> {
            Some(WindowHandle(42))
        }

        fn focus_window(&self, window: WindowHandle) -> Result<(), InputError> {
            let mut state = self.state.lock().expect("fake state");
            state.events.push(format!("focus:{}", window.0));
            Ok(())
        }

        fn send_copy(&self) -> Result<(), InputError> {
            let mut state = self.state.lock().expect("fake state");
            state.events.push("copy".to_string());
            if let CopyBehavior::Selection(text) = &self.copy {
                state.clipboard = Some(text.clone());
            }
            Ok(())
        }

        fn send_paste(&self) -> Result<(), InputError> {
            let mut state = self.state.lock().expect("fake state");
            state.events.push("paste".to_string());
            if state.paste_fails {
                return Err(InputError::Keyboard("no focused window".to_string()));
            }
            state.pastes += 1;
            Ok(())
        }
    }
}
