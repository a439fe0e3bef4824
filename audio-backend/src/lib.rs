// Native device layer: device enumeration, a master voice per device, and a small
// voice graph (source voices, submix voices, one reverb effect) rendered by a
// software mixer. Backends differ only in where the mixed output goes.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod adpcm;
pub mod cpal_backend;
pub mod mixer;
pub mod reverb;
pub mod spatial;

#[cfg(feature = "mock-audio")]
pub mod mock_backend;

pub use adpcm::{adpcm_samples_per_block, decode_ms_adpcm};
pub use reverb::ReverbParameters;
pub use spatial::SpatialTables;

/// A specialized error type for audio backend failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("no audio output device found")]
    DeviceNotFound,
    #[error("unsupported voice format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to create output stream: {0}")]
    StreamCreationFailed(String),
    #[error("voice pool exhausted ({limit} source voices)")]
    VoicePoolExhausted { limit: usize },
    #[error("unknown voice {0}")]
    UnknownVoice(VoiceId),
    #[error("invalid call: {0}")]
    InvalidCall(String),
    #[error("{0}")]
    Other(String),
}

/// Handle to a voice owned by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u32);

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Sample encoding of a source voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaveEncoding {
    Pcm,
    Adpcm,
}

/// Format description handed to the backend when a source voice is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveFormat {
    pub encoding: WaveEncoding,
    pub channels: u16,
    pub sample_rate: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

/// An output device as reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub index: usize,
    pub name: String,
    /// Set on the device the host designates for game audio (the host default).
    pub is_default_game_device: bool,
}

/// Effective configuration of the master voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterVoiceInfo {
    pub voice: VoiceId,
    pub channels: u16,
    pub sample_rate: u32,
    pub channel_mask: u32,
}

/// Loop count meaning "loop until the buffer is flushed".
pub const LOOP_INFINITE: u32 = u32::MAX;

/// A payload submitted to a source voice.
///
/// Offsets and lengths are in sample frames. A zero `play_length` plays to the end of
/// the payload; a zero `loop_length` loops to the end of the play region.
#[derive(Debug, Clone)]
pub struct SubmittedBuffer {
    pub data: Arc<[u8]>,
    pub play_begin: u32,
    pub play_length: u32,
    pub loop_begin: u32,
    pub loop_length: u32,
    pub loop_count: u32,
}

impl SubmittedBuffer {
    /// Whole payload, played once.
    pub fn once(data: Arc<[u8]>) -> Self {
        Self {
            data,
            play_begin: 0,
            play_length: 0,
            loop_begin: 0,
            loop_length: 0,
            loop_count: 0,
        }
    }
}

/// One entry of a voice's send table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceSend {
    pub target: VoiceId,
}

/// Snapshot of a voice's playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoiceStatus {
    pub running: bool,
    pub buffers_queued: u32,
    pub frames_played: u64,
}

/// Backend construction options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Upper bound on simultaneously allocated source voices.
    pub max_source_voices: usize,
    /// Fixed device buffer size in frames; `None` lets the host choose.
    pub buffer_frames: Option<u32>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            max_source_voices: 128,
            buffer_frames: None,
        }
    }
}

/// Diagnostics events emitted by the backend (non-RT callbacks expected).
#[derive(Debug, Clone)]
pub enum DiagnosticEvent {
    StreamError(String),
    DeviceRemoved,
    Other(String),
}

impl fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticEvent::StreamError(e) => write!(f, "StreamError({})", e),
            DiagnosticEvent::DeviceRemoved => write!(f, "DeviceRemoved"),
            DiagnosticEvent::Other(s) => write!(f, "Other({})", s),
        }
    }
}

/// Non-RT diagnostics callback type.
pub type DiagnosticsCb = Arc<dyn Fn(DiagnosticEvent) + Send + Sync + 'static>;

/// The core trait defining the audio backend's contract.
///
/// Every voice-level call fails with `InvalidCall` until `create_master_voice` has
/// succeeded. Source and submix voices route to the master voice unless a send table
/// says otherwise.
pub trait AudioBackend: Send {
    fn enumerate_devices(&mut self) -> Result<Vec<DeviceDescriptor>, BackendError>;
    fn create_master_voice(&mut self, device_index: usize) -> Result<MasterVoiceInfo, BackendError>;
    fn create_source_voice(&mut self, format: &WaveFormat) -> Result<VoiceId, BackendError>;
    fn create_submix_voice(&mut self, channels: u16, sample_rate: u32) -> Result<VoiceId, BackendError>;
    /// Install (or clear) the single reverb effect of a submix voice.
    fn set_effect_chain(&mut self, voice: VoiceId, reverb: Option<ReverbParameters>) -> Result<(), BackendError>;
    fn set_output_voices(&mut self, voice: VoiceId, sends: &[VoiceSend]) -> Result<(), BackendError>;
    /// Row-major `dst_channels x src_channels` gains. `destination == None` is the master voice.
    fn set_output_matrix(&mut self, voice: VoiceId, destination: Option<VoiceId>, matrix: &[f32]) -> Result<(), BackendError>;
    fn destroy_voice(&mut self, voice: VoiceId) -> Result<(), BackendError>;
    fn submit_buffer(&mut self, voice: VoiceId, buffer: SubmittedBuffer) -> Result<(), BackendError>;
    fn flush_source_buffers(&mut self, voice: VoiceId) -> Result<(), BackendError>;
    fn start_voice(&mut self, voice: VoiceId) -> Result<(), BackendError>;
    fn stop_voice(&mut self, voice: VoiceId) -> Result<(), BackendError>;
    fn set_volume(&mut self, voice: VoiceId, volume: f32) -> Result<(), BackendError>;
    fn volume(&self, voice: VoiceId) -> Result<f32, BackendError>;
    fn set_frequency_ratio(&mut self, voice: VoiceId, ratio: f32) -> Result<(), BackendError>;
    fn voice_state(&self, voice: VoiceId) -> Result<VoiceStatus, BackendError>;
    /// Rebuild the 3D coefficient tables for the given speaker layout.
    fn initialize_3d(&mut self, channel_mask: u32, speed_of_sound: f32) -> Result<(), BackendError>;
    /// Register or clear non-RT diagnostics callback.
    fn set_diagnostics_callback(&mut self, cb: Option<DiagnosticsCb>);
}

#[cfg(not(feature = "mock-audio"))]
pub fn create_audio_backend(config: &BackendConfig) -> Result<Box<dyn AudioBackend>, BackendError> {
    let backend = cpal_backend::CpalAudioBackend::new(config.clone())?;
    tracing::debug!(
        max_source_voices = config.max_source_voices,
        "create_audio_backend: using CPAL backend"
    );
    Ok(Box::new(backend))
}

/// Whether `create_audio_backend` hands out the mock backend in this build.
pub fn is_mock_backend_enabled() -> bool {
    cfg!(feature = "mock-audio")
}

#[cfg(feature = "mock-audio")]
pub fn create_audio_backend(config: &BackendConfig) -> Result<Box<dyn AudioBackend>, BackendError> {
    let backend = mock_backend::MockAudioBackend::new().with_voice_limit(config.max_source_voices);
    tracing::debug!(
        max_source_voices = config.max_source_voices,
        "create_audio_backend: using MOCK backend"
    );
    Ok(Box::new(backend))
}
