//! Microphone recorder - owns the cpal stream and the recording buffer
//!
//! The stream is acquired once at probe time and held for the life of the
//! process so toggling listening never re-requests the device. cpal streams
//! are not Send, so a dedicated thread owns the stream; the session arms
//! and disarms recording through shared atomics.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;

use tracing::{info, warn};

/// Upload sample rate; captured audio is downmixed and resampled to this.
pub const CLIP_RATE: u32 = 16_000;

#[derive(Debug, thiserror::Error)]
pub enum MicError {
    #[error("no microphone found")]
    NotFound,

    #[error("microphone access denied")]
    AccessDenied,

    #[error("microphone unavailable: {0}")]
    Device(String),

    #[error("audio encoding failed: {0}")]
    Encode(String),
}

fn classify(desc: String) -> MicError {
    let lower = desc.to_lowercase();
    if lower.contains("denied") || lower.contains("permission") {
        MicError::AccessDenied
    } else {
        MicError::Device(desc)
    }
}

/// Linear resample between sample rates
pub fn resample(samples: &[f32], from_rate: usize, to_rate: usize) -> Vec<f32> {
    if from_rate == to_rate {
        return samples.to_vec();
    }
    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = (samples.len() as f64 * ratio) as usize;
    (0..new_len)
        .map(|i| {
            let src_idx = i as f64 / ratio;
            let idx = src_idx as usize;
            let frac = src_idx - idx as f64;
            if idx + 1 < samples.len() {
                samples[idx] * (1.0 - frac as f32) + samples[idx + 1] * frac as f32
            } else {
                samples.get(idx).copied().unwrap_or(0.0)
            }
        })
        .collect()
}

// ============================================================================
// AudioClip
// ============================================================================

/// One recording's worth of audio, WAV-encoded in memory. Owned exclusively
/// by the session for the duration of a single exchange and dropped after
/// upload.
pub struct AudioClip {
    pub wav: Vec<u8>,
    pub samples: usize,
}

impl AudioClip {
    /// Encode mono f32 samples as 16-bit PCM WAV
    pub fn from_samples(samples: &[f32], sample_rate: u32) -> Result<Self, MicError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .map_err(|e| MicError::Encode(e.to_string()))?;
            for &s in samples {
                let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                writer
                    .write_sample(v)
                    .map_err(|e| MicError::Encode(e.to_string()))?;
            }
            writer
                .finalize()
                .map_err(|e| MicError::Encode(e.to_string()))?;
        }
        Ok(Self {
            wav: cursor.into_inner(),
            samples: samples.len(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }
}

// ============================================================================
// Recorder seam
// ============================================================================

/// Recording control over whichever device implementation is in use.
/// `begin` clears the buffer and arms capture; `end` disarms and hands the
/// buffered samples back; `cancel` discards them.
pub trait AudioInput: Send {
    fn begin(&mut self) -> Result<(), MicError>;
    fn end(&mut self) -> Result<Vec<f32>, MicError>;
    fn cancel(&mut self);
}

// ============================================================================
// Microphone
// ============================================================================

struct MicShared {
    recording: AtomicBool,
    buffer: Mutex<Vec<f32>>,
}

/// Handle to the capture thread. Dropping it shuts the thread (and the
/// stream) down.
pub struct Microphone {
    shared: Arc<MicShared>,
    _shutdown: flume::Sender<()>,
}

impl Microphone {
    /// Acquire the default input device and start the stream. Blocks until
    /// the capture thread reports the stream live or failed.
    pub fn open() -> Result<Self, MicError> {
        let shared = Arc::new(MicShared {
            recording: AtomicBool::new(false),
            buffer: Mutex::new(Vec::new()),
        });
        let (ready_tx, ready_rx) = flume::bounded(1);
        let (shutdown_tx, shutdown_rx) = flume::bounded::<()>(0);

        let thread_shared = Arc::clone(&shared);
        thread::spawn(move || capture_thread(thread_shared, ready_tx, shutdown_rx));

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                shared,
                _shutdown: shutdown_tx,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(MicError::Device("capture thread exited".into())),
        }
    }
}

impl AudioInput for Microphone {
    fn begin(&mut self) -> Result<(), MicError> {
        self.shared.buffer.lock().unwrap().clear();
        self.shared.recording.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn end(&mut self) -> Result<Vec<f32>, MicError> {
        self.shared.recording.store(false, Ordering::SeqCst);
        let mut buf = self.shared.buffer.lock().unwrap();
        Ok(std::mem::take(&mut *buf))
    }

    fn cancel(&mut self) {
        self.shared.recording.store(false, Ordering::SeqCst);
        self.shared.buffer.lock().unwrap().clear();
    }
}

fn capture_thread(
    shared: Arc<MicShared>,
    ready_tx: flume::Sender<Result<(), MicError>>,
    shutdown_rx: flume::Receiver<()>,
) {
    let stream = match build_stream(shared) {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let _ = ready_tx.send(Ok(()));

    // Block until the handle is dropped; the stream lives on this thread.
    let _ = shutdown_rx.recv();
    drop(stream);
}

fn build_stream(shared: Arc<MicShared>) -> Result<cpal::Stream, MicError> {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(MicError::NotFound)?;
    let supported = device.default_input_config().map_err(|e| match e {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => MicError::NotFound,
        other => classify(other.to_string()),
    })?;
    let sample_rate = u32::from(supported.sample_rate()) as usize;
    let channels = supported.channels() as usize;

    info!(
        device = %device.name().unwrap_or_default(),
        rate = sample_rate,
        channels,
        "microphone stream starting"
    );

    let stream = device
        .build_input_stream(
            &supported.config(),
            move |data: &[f32], _| {
                if !shared.recording.load(Ordering::SeqCst) {
                    return;
                }
                let mono: Vec<f32> = if channels == 1 {
                    data.to_vec()
                } else {
                    data.chunks(channels)
                        .map(|c| c.iter().sum::<f32>() / channels as f32)
                        .collect()
                };
                let resampled = resample(&mono, sample_rate, CLIP_RATE as usize);
                shared.buffer.lock().unwrap().extend_from_slice(&resampled);
            },
            |e| warn!("microphone stream error: {}", e),
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => MicError::NotFound,
            other => classify(other.to_string()),
        })?;

    stream.play().map_err(|e| match e {
        cpal::PlayStreamError::DeviceNotAvailable => MicError::NotFound,
        other => classify(other.to_string()),
    })?;

    Ok(stream)
}
