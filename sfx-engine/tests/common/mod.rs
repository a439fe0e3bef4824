#![allow(dead_code)]

use std::sync::Arc;

use audio_backend::mock_backend::{MockAudioBackend, MockProbe};
use sfx_engine::{AudioDevice, EngineConfig};

/// Open a device on a fresh mock backend.
pub fn mock_device() -> (Arc<AudioDevice>, Arc<MockProbe>) {
    mock_device_with(MockAudioBackend::new())
}

pub fn mock_device_with(backend: MockAudioBackend) -> (Arc<AudioDevice>, Arc<MockProbe>) {
    let probe = backend.probe();
    let device = AudioDevice::open(Box::new(backend), &EngineConfig::default()).expect("open mock device");
    (device, probe)
}

/// `frames` of a 16-bit sawtooth, interleaved over `channels`.
pub fn pcm16(frames: usize, channels: usize) -> Vec<u8> {
    let mut v = Vec::with_capacity(frames * channels * 2);
    for i in 0..frames {
        let s = ((i % 100) as i16 - 50) * 400;
        for _ in 0..channels {
            v.extend_from_slice(&s.to_le_bytes());
        }
    }
    v
}
