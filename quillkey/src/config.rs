use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::hotkey::HotkeyBinding;
use crate::secure_storage;

const APP_DIR_NAME: &str = "quillkey";
const CONFIG_FILE_NAME: &str = "config.json";
const DEFAULT_LLM_BASE_URL: &str = "http://localhost:11434/v1";
const DEFAULT_LLM_MODEL: &str = "llama3.1";
const DEFAULT_TEMPERATURE: f64 = 0.2;
const MAX_TEMPERATURE: f64 = 2.0;
const DEFAULT_TRANSCRIBER_URL: &str = "http://localhost:18000/v1/audio/transcriptions";
const DEFAULT_TRANSCRIBER_MODEL: &str = "whisper-1";
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_TRANSCRIBE_ATTEMPTS: u32 = 2;
const DEFAULT_RECORD_SECONDS: u64 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration directory is available on this platform")]
    NoConfigDir,
    #[error("failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default = "default_true")]
    pub auto_paste: bool,
    #[serde(default = "default_true")]
    pub use_clipboard_fallback: bool,
    #[serde(default = "HotkeyBinding::default_refine")]
    pub hotkey: HotkeyBinding,
    #[serde(default = "HotkeyBinding::default_transcribe")]
    pub transcriber_hotkey: HotkeyBinding,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub transcriber: TranscriberConfig,
    #[serde(default)]
    pub timings: TimingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            auto_paste: true,
            use_clipboard_fallback: true,
            hotkey: HotkeyBinding::default_refine(),
            transcriber_hotkey: HotkeyBinding::default_transcribe(),
            llm: LlmConfig::default(),
            transcriber: TranscriberConfig::default(),
            timings: TimingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_referer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_title: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
            api_key: String::new(),
            http_referer: None,
            x_title: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TranscriberConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_transcriber_url")]
    pub base_url: String,
    #[serde(default = "default_transcriber_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_true")]
    pub auto_paste: bool,
    #[serde(default = "default_transcribe_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_record_seconds")]
    pub record_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_file: Option<PathBuf>,
}

impl TranscriberConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_transcriber_url(),
            model: default_transcriber_model(),
            api_key: String::new(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            auto_paste: true,
            max_attempts: DEFAULT_TRANSCRIBE_ATTEMPTS,
            record_seconds: DEFAULT_RECORD_SECONDS,
            audio_file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct TimingConfig {
    pub clear_settle_ms: u64,
    pub refocus_settle_ms: u64,
    pub copy_wait_ms: u64,
    pub clipboard_retry_ms: u64,
    pub clipboard_write_attempts: u32,
    pub paste_settle_ms: u64,
    pub retry_backoff_ms: u64,
}

impl TimingConfig {
    pub fn immediate() -> Self {
        Self {
            clear_settle_ms: 0,
            refocus_settle_ms: 0,
            copy_wait_ms: 0,
            clipboard_retry_ms: 0,
            clipboard_write_attempts: 3,
            paste_settle_ms: 0,
            retry_backoff_ms: 0,
        }
    }

    pub fn clear_settle(&self) -> Duration {
        Duration::from_millis(self.clear_settle_ms)
    }

    pub fn refocus_settle(&self) -> Duration {
        Duration::from_millis(self.refocus_settle_ms)
    }

    pub fn copy_wait(&self) -> Duration {
        Duration::from_millis(self.copy_wait_ms)
    }

    pub fn clipboard_retry(&self) -> Duration {
        Duration::from_millis(self.clipboard_retry_ms)
    }

    pub fn paste_settle(&self) -> Duration {
        Duration::from_millis(self.paste_settle_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            clear_settle_ms: 100,
            refocus_settle_ms: 100,
            copy_wait_ms: 500,
            clipboard_retry_ms: 50,
            clipboard_write_attempts: 3,
            paste_settle_ms: 100,
            retry_backoff_ms: 1000,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_llm_base_url() -> String {
    DEFAULT_LLM_BASE_URL.to_string()
}

fn default_llm_model() -> String {
    DEFAULT_LLM_MODEL.to_string()
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_transcriber_url() -> String {
    DEFAULT_TRANSCRIBER_URL.to_string()
}

fn default_transcriber_model() -> String {
    DEFAULT_TRANSCRIBER_MODEL.to_string()
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_transcribe_attempts() -> u32 {
    DEFAULT_TRANSCRIBE_ATTEMPTS
}

fn default_record_seconds() -> u64 {
    DEFAULT_RECORD_SECONDS
}

impl AppConfig {
    pub fn validated(&self) -> Self {
        let mut config = self.clone();

        if !config.llm.temperature.is_finite() {
            config.llm.temperature = DEFAULT_TEMPERATURE;
        }
        config.llm.temperature = config.llm.temperature.clamp(0.0, MAX_TEMPERATURE);
        if config.llm.max_tokens == Some(0) {
            config.llm.max_tokens = None;
        }

        config.transcriber.timeout_seconds = config.transcriber.timeout_seconds.max(1);
        config.transcriber.max_attempts = config.transcriber.max_attempts.max(1);
        config.transcriber.record_seconds = config.transcriber.record_seconds.max(1);
        config.timings.clipboard_write_attempts = config.timings.clipboard_write_attempts.max(1);

        config.hotkey = config.hotkey.or_default(HotkeyBinding::default_refine());
        config.transcriber_hotkey = config
            .transcriber_hotkey
            .or_default(HotkeyBinding::default_transcribe());

        config
    }

    pub fn resolve_api_keys(&mut self) {
        if self.llm.api_key.trim().is_empty() {
            if let Some(key) = lookup_api_key(
                secure_storage::LLM_API_KEY_ACCOUNT,
                &["QUILLKEY_LLM_API_KEY", "OPENAI_API_KEY"],
            ) {
                self.llm.api_key = key;
            }
        }
        if self.transcriber.api_key.trim().is_empty() {
            if let Some(key) = lookup_api_key(
                secure_storage::TRANSCRIBER_API_KEY_ACCOUNT,
                &["QUILLKEY_TRANSCRIBER_API_KEY"],
            ) {
                self.transcriber.api_key = key;
            }
        }
    }
}

fn lookup_api_key(account: &str, env_names: &[&str]) -> Option<String> {
    match secure_storage::read_api_key(account) {
        Ok(Some(value)) if !value.trim().is_empty() => return Some(value.trim().to_string()),
        Ok(_) => {}
        Err(err) => warn!(account, "secure storage lookup failed: {err}"),
    }

    read_api_key_from_environment(env_names)
}

fn read_api_key_from_environment(env_names: &[&str]) -> Option<String> {
    for key_name in env_names {
        if let Ok(value) = std::env::var(key_name) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }

    None
}

pub fn app_data_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or(ConfigError::NoConfigDir)
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn in_app_data_dir() -> Result<Self, ConfigError> {
        Ok(Self::new(app_data_dir()?.join(CONFIG_FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_or_default(&self) -> AppConfig {
        if !self.path.exists() {
            let config = AppConfig::default();
            match self.save(&config) {
                Ok(()) => info!(path = %self.path.display(), "wrote default config"),
                Err(err) => warn!("failed to write default config: {err}"),
            }
            return config;
        }

        match fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str::<AppConfig>(&raw) {
                Ok(config) => config.validated(),
                Err(err) => {
                    warn!(path = %self.path.display(), "config is malformed, using defaults: {err}");
                    AppConfig::default()
                }
            },
            Err(err) => {
                warn!(path = %self.path.display(), "failed to read config, using defaults: {err}");
                AppConfig::default()
            }
        }
    }

    pub fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let serialized = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, serialized).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })
    }
}
