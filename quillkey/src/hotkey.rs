use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::gate::ActionKind;

pub const MOD_ALT: u32 = 0x0001;
pub const MOD_CONTROL: u32 = 0x0002;
pub const MOD_SHIFT: u32 = 0x0004;
pub const MOD_WIN: u32 = 0x0008;

pub const REFINE_HOTKEY_ID: u32 = 1;
pub const TRANSCRIBE_HOTKEY_ID: u32 = 2;

const VK_R: u32 = 0x52;
const VK_T: u32 = 0x54;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotkeyBinding {
    pub modifiers: u32,
    pub key: u32,
}

impl HotkeyBinding {
    pub fn default_refine() -> Self {
        Self {
            modifiers: MOD_CONTROL | MOD_ALT,
            key: VK_R,
        }
    }

    pub fn default_transcribe() -> Self {
        Self {
            modifiers: MOD_CONTROL | MOD_ALT,
            key: VK_T,
        }
    }

    pub fn or_default(self, fallback: Self) -> Self {
        Self {
            modifiers: if self.modifiers == 0 {
                fallback.modifiers
            } else {
                self.modifiers
            },
            key: if self.key == 0 { fallback.key } else { self.key },
        }
    }

    pub fn display(&self) -> String {
        let mut parts = Vec::new();
        if self.modifiers & MOD_CONTROL != 0 {
            parts.push("Ctrl".to_string());
        }
        if self.modifiers & MOD_ALT != 0 {
            parts.push("Alt".to_string());
        }
        if self.modifiers & MOD_SHIFT != 0 {
            parts.push("Shift".to_string());
        }
        if self.modifiers & MOD_WIN != 0 {
            parts.push("Win".to_string());
        }
        parts.push(key_name(self.key));
        parts.join("+")
    }
}

fn key_name(key: u32) -> String {
    match key {
        0x30..=0x39 | 0x41..=0x5A => char::from_u32(key)
            .map(|ch| ch.to_string())
            .unwrap_or_else(|| format!("0x{key:02X}")),
        0x70..=0x87 => format!("F{}", key - 0x6F),
        0x20 => "Space".to_string(),
        _ => format!("0x{key:02X}"),
    }
}

impl fmt::Display for HotkeyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotkeyEvent {
    pub kind: ActionKind,
}

impl HotkeyEvent {
    pub fn new(kind: ActionKind) -> Self {
        Self { kind }
    }

    pub fn from_hotkey_id(id: u32) -> Option<Self> {
        match id {
            REFINE_HOTKEY_ID => Some(Self::new(ActionKind::Refine)),
            TRANSCRIBE_HOTKEY_ID => Some(Self::new(ActionKind::Transcribe)),
            _ => None,
        }
    }
}

impl FromStr for HotkeyEvent {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if let Ok(id) = trimmed.parse::<u32>() {
            return Self::from_hotkey_id(id).ok_or_else(|| format!("unknown hotkey id {id}"));
        }
        trimmed.parse::<ActionKind>().map(Self::new)
    }
}
