#[cfg(feature = "microphone")]
pub mod microphone;

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use hound::{SampleFormat, WavSpec, WavWriter};
use thiserror::Error;
use tracing::info;

use crate::config::TranscriberConfig;
#[cfg(feature = "microphone")]
pub use microphone::MicrophoneRecorder;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio source is configured")]
    NoSource,
    #[error("failed to read audio file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode WAV audio: {0}")]
    Encode(String),
    #[error("no audio input device available")]
    NoInputDevice,
    #[error("failed to read default input config: {0}")]
    DefaultInputConfig(String),
    #[error("unsupported audio sample format: {0}")]
    UnsupportedSampleFormat(String),
    #[error("failed to build audio stream: {0}")]
    StreamBuild(String),
    #[error("failed to start audio stream: {0}")]
    StreamStart(String),
    #[error("recording produced no samples")]
    EmptyRecording,
}

pub trait AudioSource: Send + Sync + 'static {
    fn acquire(&self) -> Result<Vec<u8>, AudioError>;
}

pub struct WavFileSource {
    path: PathBuf,
}

impl WavFileSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl AudioSource for WavFileSource {
    fn acquire(&self) -> Result<Vec<u8>, AudioError> {
        std::fs::read(&self.path).map_err(|source| AudioError::ReadFile {
            path: self.path.clone(),
            source,
        })
    }
}

pub struct UnavailableSource;

impl AudioSource for UnavailableSource {
    fn acquire(&self) -> Result<Vec<u8>, AudioError> {
        Err(AudioError::NoSource)
    }
}

pub fn source_from_config(config: &TranscriberConfig) -> Arc<dyn AudioSource> {
    if let Some(path) = config.audio_file.clone() {
        info!(path = %path.display(), "transcription audio comes from file");
        return Arc::new(WavFileSource::new(path));
    }

    #[cfg(feature = "microphone")]
    {
        info!(seconds = config.record_seconds, "transcription audio comes from microphone");
        Arc::new(MicrophoneRecorder::new(config.record_seconds))
    }

    #[cfg(not(feature = "microphone"))]
    {
        tracing::warn!("no audioFile configured and microphone support is not compiled in");
        Arc::new(UnavailableSource)
    }
}

pub fn encode_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, AudioError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|err| AudioError::Encode(err.to_string()))?;
        for sample in samples {
            writer
                .write_sample(*sample)
                .map_err(|err| AudioError::Encode(err.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|err| AudioError::Encode(err.to_string()))?;
    }
    Ok(cursor.into_inner())
}

pub fn convert_f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
