use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use tracing::{debug, info, warn};

use super::{AudioError, AudioSource, convert_f32_to_i16, encode_wav};

type SampleSink = Arc<Mutex<Vec<f32>>>;

pub struct MicrophoneRecorder {
    duration: Duration,
}

impl MicrophoneRecorder {
    pub fn new(record_seconds: u64) -> Self {
        Self {
            duration: Duration::from_secs(record_seconds.max(1)),
        }
    }
}

impl AudioSource for MicrophoneRecorder {
    fn acquire(&self) -> Result<Vec<u8>, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(AudioError::NoInputDevice)?;
        let device_name = device
            .name()
            .unwrap_or_else(|_| "unknown-input-device".to_string());

        let supported_config = device
            .default_input_config()
            .map_err(|err| AudioError::DefaultInputConfig(err.to_string()))?;
        let sample_format = supported_config.sample_format();
        let stream_config: StreamConfig = supported_config.into();
        let sample_rate = stream_config.sample_rate.0;
        let channels = usize::from(stream_config.channels);

        let sink: SampleSink = Arc::new(Mutex::new(Vec::new()));
        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, &sink, move |data| {
                interleaved_f32_to_mono(data, channels)
            })?,
            SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, &sink, move |data| {
                interleaved_i16_to_mono(data, channels)
            })?,
            SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, &sink, move |data| {
                interleaved_u16_to_mono(data, channels)
            })?,
            other => return Err(AudioError::UnsupportedSampleFormat(format!("{other:?}"))),
        };

        info!(
            device_name = device_name.as_str(),
            sample_rate,
            seconds = self.duration.as_secs(),
            "recording from microphone"
        );
        stream
            .play()
            .map_err(|err| AudioError::StreamStart(err.to_string()))?;
        std::thread::sleep(self.duration);
        drop(stream);

        let recorded = std::mem::take(&mut *sink.lock().unwrap_or_else(PoisonError::into_inner));
        if recorded.is_empty() {
            return Err(AudioError::EmptyRecording);
        }
        debug!(samples = recorded.len(), "microphone recording finished");

        let pcm: Vec<i16> = recorded.into_iter().map(convert_f32_to_i16).collect();
        encode_wav(&pcm, sample_rate)
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    stream_config: &StreamConfig,
    sink: &SampleSink,
    to_mono: impl Fn(&[T]) -> Vec<f32> + Send + 'static,
) -> Result<Stream, AudioError>
where
    T: cpal::SizedSample,
{
    let sink = Arc::clone(sink);
    device
        .build_input_stream(
            stream_config,
            move |data: &[T], _| {
                let mono = to_mono(data);
                sink.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(&mono);
            },
            move |err| warn!("audio stream callback error: {err}"),
            None,
        )
        .map_err(|err| AudioError::StreamBuild(err.to_string()))
}

fn interleaved_f32_to_mono(data: &[f32], input_channels: usize) -> Vec<f32> {
    if input_channels <= 1 {
        return data.to_vec();
    }

    data.chunks_exact(input_channels)
        .map(|frame| frame.iter().copied().sum::<f32>() / input_channels as f32)
        .collect()
}

fn interleaved_i16_to_mono(data: &[i16], input_channels: usize) -> Vec<f32> {
    let normalized: Vec<f32> = data
        .iter()
        .map(|sample| *sample as f32 / i16::MAX as f32)
        .collect();
    interleaved_f32_to_mono(&normalized, input_channels)
}

fn interleaved_u16_to_mono(data: &[u16], input_channels: usize) -> Vec<f32> {
    let normalized: Vec<f32> = data
        .iter()
        .map(|sample| (*sample as f32 / u16::MAX as f32) * 2.0 - 1.0)
        .collect();
    interleaved_f32_to_mono(&normalized, input_channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_frames_are_averaged() {
        let mono = interleaved_f32_to_mono(&[0.2, 0.4, -1.0, 1.0], 2);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert!(mono[1].abs() < 1e-6);
    }

    #[test]
    fn integer_formats_are_normalized() {
        let from_i16 = interleaved_i16_to_mono(&[i16::MAX, 0], 1);
        assert!((from_i16[0] - 1.0).abs() < 1e-6);
        let from_u16 = interleaved_u16_to_mono(&[u16::MAX, 0], 2);
        assert!(from_u16[0].abs() < 1e-6);
    }
}
