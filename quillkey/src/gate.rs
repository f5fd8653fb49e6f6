use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Refine,
    Transcribe,
}

impl ActionKind {
    pub const ALL: [ActionKind; 2] = [ActionKind::Refine, ActionKind::Transcribe];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Refine => "refine",
            Self::Transcribe => "transcribe",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "refine" => Ok(Self::Refine),
            "transcribe" => Ok(Self::Transcribe),
            other => Err(format!("unknown action `{other}`")),
        }
    }
}

#[derive(Debug, Default)]
pub struct TriggerGate {
    busy: Mutex<HashMap<ActionKind, bool>>,
}

impl TriggerGate {
    pub fn new() -> Arc<Self> {
        let busy = ActionKind::ALL.iter().map(|kind| (*kind, false)).collect();
        Arc::new(Self {
            busy: Mutex::new(busy),
        })
    }

    pub fn try_acquire(self: &Arc<Self>, kind: ActionKind) -> Option<BusyGuard> {
        let mut busy = self.flags();
        let flag = busy.entry(kind).or_insert(false);
        if *flag {
            debug!(action = kind.as_str(), "trigger rejected, run in flight");
            return None;
        }
        *flag = true;
        Some(BusyGuard {
            gate: Arc::clone(self),
            kind,
        })
    }

    pub fn is_busy(&self, kind: ActionKind) -> bool {
        self.flags().get(&kind).copied().unwrap_or(false)
    }

    fn release(&self, kind: ActionKind) {
        self.flags().insert(kind, false);
        debug!(action = kind.as_str(), "trigger released");
    }

    // A panic while holding the lock cannot leave a flag half-written.
    fn flags(&self) -> MutexGuard<'_, HashMap<ActionKind, bool>> {
        self.busy.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
pub struct BusyGuard {
    gate: Arc<TriggerGate>,
    kind: ActionKind,
}

impl BusyGuard {
    pub fn kind(&self) -> ActionKind {
        self.kind
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.gate.release(self.kind);
    }
}
