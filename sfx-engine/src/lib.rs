//! Sound-effect playback engine.
//!
//! Decodes RIFF/WAVE data into [`SoundBuffer`]s, plays them through
//! [`PlaybackInstance`]s bound to voices of the process-wide [`AudioDevice`], and
//! guarantees that a buffer's payload outlives every instance reading it.

use std::time::Duration;

pub mod buffer;
pub mod config;
pub mod device;
pub mod error;
pub mod format;
pub mod instance;
mod registry;
pub mod wave;

pub use buffer::SoundBuffer;
pub use config::EngineConfig;
pub use device::{
    AudioDevice, DeviceSlot, distance_scale, doppler_scale, global_slot, master_volume,
    set_distance_scale, set_doppler_scale, set_master_volume, set_speed_of_sound, shutdown,
    speed_of_sound,
};
pub use error::{AudioError, Result};
pub use format::{AudioChannels, AudioFormat, FormatTag, LoopRegion};
pub use instance::{PlaybackInstance, SoundState};
pub use registry::InstanceId;
pub use wave::{DecodedWave, decode, write_wave};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Playback time of `size_in_bytes` of 16-bit PCM.
pub fn sample_duration(size_in_bytes: usize, sample_rate: u32, channels: AudioChannels) -> Result<Duration> {
    format::check_sample_rate(sample_rate)?;
    let frames = (size_in_bytes / (channels.count() as usize * 2)) as u128;
    let nanos = frames * NANOS_PER_SEC / sample_rate as u128;
    Ok(Duration::from_nanos(nanos as u64))
}

/// Bytes of 16-bit PCM needed for `duration`, rounded down to whole frames.
pub fn sample_size_in_bytes(duration: Duration, sample_rate: u32, channels: AudioChannels) -> Result<usize> {
    format::check_sample_rate(sample_rate)?;
    let frames = duration.as_nanos() * sample_rate as u128 / NANOS_PER_SEC;
    Ok(frames as usize * channels.count() as usize * 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_second_of_stereo() {
        let d = sample_duration(176_400, 44_100, AudioChannels::Stereo).unwrap();
        assert_eq!(d, Duration::from_secs(1));
        let n = sample_size_in_bytes(Duration::from_secs(1), 44_100, AudioChannels::Stereo).unwrap();
        assert_eq!(n, 176_400);
    }

    #[test]
    fn size_rounds_down_to_frames() {
        let n = sample_size_in_bytes(Duration::from_micros(1_010), 22_050, AudioChannels::Stereo).unwrap();
        assert_eq!(n % 4, 0);
        assert_eq!(n, 22 * 4);
    }

    #[test]
    fn helpers_are_approximate_inverses() {
        for &(ms, rate, ch) in &[
            (250u64, 8_000u32, AudioChannels::Mono),
            (1_000, 22_050, AudioChannels::Stereo),
            (37, 44_100, AudioChannels::Mono),
            (5_000, 48_000, AudioChannels::Stereo),
        ] {
            let d = Duration::from_millis(ms);
            let bytes = sample_size_in_bytes(d, rate, ch).unwrap();
            let back = sample_duration(bytes, rate, ch).unwrap();
            let frame = Duration::from_nanos(NANOS_PER_SEC as u64 / rate as u64 + 1);
            assert!(back <= d && d - back <= frame, "{:?} -> {} -> {:?}", d, bytes, back);
        }
    }

    #[test]
    fn helpers_validate_sample_rate() {
        match sample_duration(100, 4_000, AudioChannels::Mono) {
            Err(AudioError::InvalidArgument(_)) => {}
            other => panic!("expected InvalidArgument, got {:?}", other),
        }
        assert!(sample_size_in_bytes(Duration::from_secs(1), 96_000, AudioChannels::Mono).is_err());
    }
}
