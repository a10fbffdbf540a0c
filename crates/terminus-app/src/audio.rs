//! Local audio devices for the voice console.
//!
//! Microphone capture uses cpal and playback uses rodio. Device streams are
//! not `Send` on every platform, so each one lives on its own thread and
//! talks to the session over channels.

use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use rodio::buffer::SamplesBuffer;
use tokio::sync::{mpsc, oneshot};

use terminus_agent::RoomInput;
use terminus_core::AudioFrame;

/// Length of each captured frame handed to voice activity detection.
const FRAME_MS: u32 = 20;

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("No input device available")]
    NoInputDevice,

    #[error("No output device available: {0}")]
    NoOutputDevice(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Audio device error: {0}")]
    Device(String),
}

// =============================================================================
// Capture
// =============================================================================

/// Keeps the microphone open. Dropping it stops capture.
pub struct Capture {
    _stop: std::sync::mpsc::Sender<()>,
    pub sample_rate: u32,
}

/// Open the default microphone and send mono frames to `inputs`.
///
/// Frames are dropped, not queued, when `inputs` is full.
pub async fn start_capture(inputs: mpsc::Sender<RoomInput>) -> Result<Capture, AudioError> {
    let (ready_tx, ready_rx) = oneshot::channel();
    let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

    thread::Builder::new()
        .name("console-capture".to_string())
        .spawn(move || {
            let stream = match open_input(inputs) {
                Ok((stream, rate)) => {
                    let _ = ready_tx.send(Ok(rate));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            // Returns once the `Capture` is dropped.
            let _ = stop_rx.recv();
            drop(stream);
            tracing::debug!("Microphone closed");
        })
        .map_err(|e| AudioError::Device(e.to_string()))?;

    let sample_rate = ready_rx
        .await
        .map_err(|_| AudioError::Device("capture thread exited".to_string()))??;
    Ok(Capture {
        _stop: stop_tx,
        sample_rate,
    })
}

fn open_input(inputs: mpsc::Sender<RoomInput>) -> Result<(cpal::Stream, u32), AudioError> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or(AudioError::NoInputDevice)?;
    let supported = device
        .default_input_config()
        .map_err(|e| AudioError::Device(e.to_string()))?;
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    let config = supported.config();

    tracing::info!(
        device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
        sample_rate,
        channels,
        "Opening microphone"
    );

    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_input::<f32>(&device, &config, channels, inputs),
        SampleFormat::I16 => build_input::<i16>(&device, &config, channels, inputs),
        SampleFormat::U16 => build_input::<u16>(&device, &config, channels, inputs),
        other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
    }?;
    stream
        .play()
        .map_err(|e| AudioError::Device(e.to_string()))?;
    Ok((stream, sample_rate))
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    inputs: mpsc::Sender<RoomInput>,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let mut chunker = FrameChunker::new(config.sample_rate.0);
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data.iter().map(|s| s.to_sample::<f32>()).collect();
                for frame in chunker.push(&downmix(&samples, channels)) {
                    if inputs.try_send(RoomInput::Audio(frame)).is_err() {
                        tracing::trace!("Room input full, microphone frame dropped");
                    }
                }
            },
            |err| tracing::warn!(error = %err, "Microphone stream error"),
            None,
        )
        .map_err(|e| AudioError::Device(e.to_string()))
}

/// Average interleaved channels into one.
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|c| c.iter().sum::<f32>() / c.len() as f32)
        .collect()
}

/// Regroups device buffers of arbitrary size into fixed-length frames.
struct FrameChunker {
    sample_rate: u32,
    frame_len: usize,
    pending: Vec<f32>,
}

impl FrameChunker {
    fn new(sample_rate: u32) -> Self {
        let frame_len = (sample_rate * FRAME_MS / 1000).max(1) as usize;
        Self {
            sample_rate,
            frame_len,
            pending: Vec::with_capacity(frame_len),
        }
    }

    fn push(&mut self, mono: &[f32]) -> Vec<AudioFrame> {
        self.pending.extend_from_slice(mono);
        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_len {
            let rest = self.pending.split_off(self.frame_len);
            let full = std::mem::replace(&mut self.pending, rest);
            frames.push(AudioFrame::new(full, self.sample_rate));
        }
        frames
    }
}

// =============================================================================
// Playback
// =============================================================================

/// Open the default output device. Frames sent on the returned channel are
/// played in order; closing the channel lets queued audio finish.
pub async fn start_playback() -> Result<mpsc::UnboundedSender<AudioFrame>, AudioError> {
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<AudioFrame>();
    let (ready_tx, ready_rx) = oneshot::channel();

    thread::Builder::new()
        .name("console-playback".to_string())
        .spawn(move || {
            let (_stream, handle) = match rodio::OutputStream::try_default() {
                Ok(output) => output,
                Err(e) => {
                    let _ = ready_tx.send(Err(AudioError::NoOutputDevice(e.to_string())));
                    return;
                }
            };
            let sink = match rodio::Sink::try_new(&handle) {
                Ok(sink) => sink,
                Err(e) => {
                    let _ = ready_tx.send(Err(AudioError::Device(e.to_string())));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));

            while let Some(frame) = frames_rx.blocking_recv() {
                if frame.is_empty() || frame.sample_rate == 0 {
                    continue;
                }
                sink.append(SamplesBuffer::new(1, frame.sample_rate, frame.samples));
            }
            sink.sleep_until_end();
            tracing::debug!("Speaker closed");
        })
        .map_err(|e| AudioError::Device(e.to_string()))?;

    ready_rx
        .await
        .map_err(|_| AudioError::Device("playback thread exited".to_string()))??;
    Ok(frames_tx)
}
