use std::io;

use audio_backend::BackendError;
use thiserror::Error;

/// Errors surfaced by the engine.
///
/// `Clone` so the device slot can hand out a recorded initialization failure to every
/// later caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AudioError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("stream truncated while reading {0}")]
    Truncated(&'static str),
    #[error("malformed '{chunk}' chunk: {reason}")]
    MalformedChunk { chunk: &'static str, reason: String },
    #[error("missing '{0}' chunk")]
    MissingChunk(&'static str),
    #[error("i/o error ({kind:?}): {message}")]
    Io { kind: io::ErrorKind, message: String },
    #[error("no audio hardware available: {0}")]
    NoAudioHardware(String),
    #[error("audio device has been shut down")]
    DeviceClosed,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("sound buffer has been disposed")]
    BufferDisposed,
    #[error("playback instance has been disposed")]
    InstanceDisposed,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl From<io::Error> for AudioError {
    fn from(e: io::Error) -> Self {
        AudioError::Io { kind: e.kind(), message: e.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, AudioError>;

pub(crate) fn invalid_argument(msg: impl Into<String>) -> AudioError {
    AudioError::InvalidArgument(msg.into())
}
