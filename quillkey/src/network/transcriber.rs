use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tracing::{info, warn};

use super::error::{RemoteError, classify_reqwest};
use crate::config::TranscriberConfig;

const AUDIO_MIME: &str = "audio/wav";
const UPLOAD_FILE_NAME: &str = "recording.wav";
const TEST_FILE_NAME: &str = "connection_test.wav";
const SILENCE_SAMPLE_RATE: u32 = 16_000;
const TEST_SILENCE_SECONDS: f32 = 0.6;
const TEXT_KEYS: [&str; 3] = ["text", "transcription", "result"];
const RESULT_ITEM_KEYS: [&str; 2] = ["text", "transcription"];

pub struct TranscribeClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl TranscribeClient {
    pub fn new(config: &TranscriberConfig) -> Result<Self, RemoteError> {
        if !config.enabled {
            return Err(RemoteError::configuration("remote transcription is disabled"));
        }
        if config.base_url.trim().is_empty() {
            return Err(RemoteError::configuration("transcription endpoint is empty"));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|err| RemoteError::configuration(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http,
            endpoint: config.base_url.trim().to_string(),
            model: config.model.trim().to_string(),
            api_key: config.api_key.trim().to_string(),
        })
    }

    pub async fn transcribe(&self, audio: Vec<u8>) -> Result<String, RemoteError> {
        self.upload(audio, UPLOAD_FILE_NAME).await
    }

    pub async fn test_connection(&self) -> Result<String, RemoteError> {
        let silence = silence_wav(TEST_SILENCE_SECONDS)?;
        self.upload(silence, TEST_FILE_NAME).await
    }

    async fn upload(&self, audio: Vec<u8>, file_name: &str) -> Result<String, RemoteError> {
        validate_wav(&audio)?;
        let audio_len = audio.len();

        let file_part = Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str(AUDIO_MIME)
            .map_err(|err| RemoteError::format(format!("invalid audio part: {err}")))?;
        let mut form = Form::new().part("file", file_part);
        if !self.model.is_empty() {
            form = form.text("model", self.model.clone());
        }

        let mut request = self.http.post(&self.endpoint).multipart(form);
        if !self.api_key.is_empty() {
            request = request.header(AUTHORIZATION, format!("Bearer {}", self.api_key));
        }

        info!(
            endpoint = self.endpoint.as_str(),
            model = self.model.as_str(),
            audio_bytes = audio_len,
            "calling transcription endpoint"
        );
        let response = request.send().await.map_err(|err| {
            warn!("transcription request failed: {err}");
            classify_reqwest(&err)
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|err| classify_reqwest(&err))?;
        if !status.is_success() {
            return Err(RemoteError::http(status.as_u16(), &body));
        }

        let payload: Value = serde_json::from_str(&body).map_err(|err| {
            RemoteError::parse(format!("remote API returned invalid JSON: {err}"), None)
                .with_body(&body)
        })?;

        extract_transcript(&payload).ok_or_else(|| {
            RemoteError::parse(
                "API response does not contain transcription text",
                Some(body.clone()),
            )
        })
    }
}

/// Looks for transcript text in the shapes speech APIs commonly return, in
/// priority order: top-level `text`/`transcription`/`result`, then the first
/// element of `results` (object or bare string), then a nested `data` object.
pub fn extract_transcript(payload: &Value) -> Option<String> {
    if let Some(text) = first_string(payload, &TEXT_KEYS) {
        return Some(text);
    }

    if let Some(first) = payload
        .get("results")
        .and_then(Value::as_array)
        .and_then(|results| results.first())
    {
        let found = match first {
            Value::String(text) => Some(text.clone()),
            Value::Object(_) => first_string(first, &RESULT_ITEM_KEYS),
            _ => None,
        };
        if found.is_some() {
            return found;
        }
    }

    payload
        .get("data")
        .filter(|data| data.is_object())
        .and_then(|data| first_string(data, &TEXT_KEYS))
}

fn first_string(object: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn validate_wav(audio: &[u8]) -> Result<(), RemoteError> {
    if audio.is_empty() {
        return Err(RemoteError::format("audio payload is empty"));
    }
    if audio.len() < 12 || &audio[0..4] != b"RIFF" || &audio[8..12] != b"WAVE" {
        return Err(RemoteError::format("audio payload is not a WAV file"));
    }
    Ok(())
}

pub fn silence_wav(duration_seconds: f32) -> Result<Vec<u8>, RemoteError> {
    let frames = ((duration_seconds * SILENCE_SAMPLE_RATE as f32) as usize).max(1);
    crate::audio::encode_wav(&vec![0_i16; frames], SILENCE_SAMPLE_RATE)
        .map_err(|err| RemoteError::format(format!("failed to build silence clip: {err}")))
}
