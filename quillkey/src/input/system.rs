use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arboard::Clipboard;
use enigo::{
    Direction::{Click, Press, Release},
    Enigo, Key, Keyboard, Settings,
};
use tracing::{debug, warn};

use super::{Desktop, InputError, WindowHandle};

const KEY_GAP_MS: u64 = 10;

#[cfg(target_os = "macos")]
const SHORTCUT_MODIFIER: Key = Key::Meta;
#[cfg(not(target_os = "macos"))]
const SHORTCUT_MODIFIER: Key = Key::Control;

/// The clipboard handle is kept alive for the lifetime of the desktop: on X11
/// the written text is only served while its owner exists.
pub struct SystemDesktop {
    clipboard: Mutex<Option<Clipboard>>,
}

impl SystemDesktop {
    pub fn new() -> Self {
        Self {
            clipboard: Mutex::new(None),
        }
    }

    fn with_clipboard<T>(
        &self,
        op: impl FnOnce(&mut Clipboard) -> Result<T, arboard::Error>,
    ) -> Result<T, InputError> {
        let mut slot = self.clipboard_slot();
        if slot.is_none() {
            let clipboard =
                Clipboard::new().map_err(|err| InputError::Clipboard(err.to_string()))?;
            *slot = Some(clipboard);
        }

        let Some(clipboard) = slot.as_mut() else {
            return Err(InputError::Clipboard("clipboard unavailable".to_string()));
        };
        op(clipboard).map_err(|err| {
            // A broken handle is rebuilt on the next call.
            *slot = None;
            InputError::Clipboard(err.to_string())
        })
    }

    fn clipboard_slot(&self) -> MutexGuard<'_, Option<Clipboard>> {
        self.clipboard.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send_shortcut(&self, letter: char) -> Result<(), InputError> {
        let mut enigo = Enigo::new(&Settings::default())
            .map_err(|err| InputError::Initialization(err.to_string()))?;

        enigo
            .key(SHORTCUT_MODIFIER, Press)
            .map_err(|err| InputError::Keyboard(err.to_string()))?;
        std::thread::sleep(Duration::from_millis(KEY_GAP_MS));

        let click = enigo
            .key(Key::Unicode(letter), Click)
            .map_err(|err| InputError::Keyboard(err.to_string()));
        std::thread::sleep(Duration::from_millis(KEY_GAP_MS));

        // Always let go of the modifier, even if the letter failed.
        let release = enigo
            .key(SHORTCUT_MODIFIER, Release)
            .map_err(|err| InputError::Keyboard(err.to_string()));

        click.and(release)
    }
}

// An empty or non-text clipboard is not a failure.
fn text_or_none(read: Result<String, arboard::Error>) -> Result<Option<String>, arboard::Error> {
    match read {
        Ok(text) => Ok(Some(text)),
        Err(arboard::Error::ContentNotAvailable) => Ok(None),
        Err(err) => Err(err),
    }
}

impl Default for SystemDesktop {
    fn default() -> Self {
        Self::new()
    }
}

impl Desktop for SystemDesktop {
    fn read_text(&self) -> Result<Option<String>, InputError> {
        self.with_clipboard(|clipboard| text_or_none(clipboard.get_text()))
    }

    fn write_text(&self, text: &str) -> Result<(), InputError> {
        let owned = text.to_string();
        self.with_clipboard(move |clipboard| clipboard.set_text(owned))
    }

    fn clear(&self) -> Result<(), InputError> {
        self.with_clipboard(|clipboard| clipboard.clear())
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        foreground_window_handle()
    }

    fn focus_window(&self, window: WindowHandle) -> Result<(), InputError> {
        focus_window_handle(window)
    }

    fn send_copy(&self) -> Result<(), InputError> {
        debug!("sending copy shortcut");
        self.send_shortcut('c')
    }

    fn send_paste(&self) -> Result<(), InputError> {
        debug!("sending paste shortcut");
        self.send_shortcut('v')
    }
}

#[cfg(target_os = "windows")]
fn foreground_window_handle() -> Option<WindowHandle> {
    use windows_sys::Win32::UI::WindowsAndMessaging::GetForegroundWindow;

    let window = unsafe { GetForegroundWindow() };
    if window.is_null() {
        None
    } else {
        Some(WindowHandle(window as isize))
    }
}

#[cfg(target_os = "windows")]
fn focus_window_handle(window: WindowHandle) -> Result<(), InputError> {
    use windows_sys::Win32::UI::WindowsAndMessaging::SetForegroundWindow;

    let ok = unsafe { SetForegroundWindow(window.0 as _) };
    if ok == 0 {
        warn!(window = window.0, "SetForegroundWindow refused focus change");
        return Err(InputError::Focus(format!("window {} did not accept focus", window.0)));
    }
    Ok(())
}

// Other platforms keep focus on the window that owned the hotkey press.
#[cfg(not(target_os = "windows"))]
fn foreground_window_handle() -> Option<WindowHandle> {
    None
}

#[cfg(not(target_os = "windows"))]
fn focus_window_handle(window: WindowHandle) -> Result<(), InputError> {
    warn!(window = window.0, "window focusing is not supported on this platform");
    Ok(())
}
