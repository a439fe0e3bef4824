use audio_backend::{WaveEncoding, WaveFormat, adpcm_samples_per_block};

use crate::error::{AudioError, Result};

pub const MIN_SAMPLE_RATE: u32 = 8_000;
pub const MAX_SAMPLE_RATE: u32 = 48_000;

/// Container format tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatTag {
    Pcm,
    Adpcm,
}

impl FormatTag {
    pub fn from_raw(tag: u16) -> Result<Self> {
        match tag {
            1 => Ok(FormatTag::Pcm),
            2 => Ok(FormatTag::Adpcm),
            other => Err(AudioError::UnsupportedFormat(format!("format tag {}", other))),
        }
    }

    pub fn raw(self) -> u16 {
        match self {
            FormatTag::Pcm => 1,
            FormatTag::Adpcm => 2,
        }
    }
}

/// Channel layouts accepted by the raw-PCM constructors and helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioChannels {
    Mono = 1,
    Stereo = 2,
}

impl AudioChannels {
    pub fn count(self) -> u16 {
        self as u16
    }
}

/// Immutable description of a payload's encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub tag: FormatTag,
    pub channels: u16,
    pub sample_rate: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl AudioFormat {
    /// 16-bit PCM with the derived byte rate and block alignment.
    pub fn pcm16(sample_rate: u32, channels: AudioChannels) -> Self {
        let ch = channels.count();
        Self {
            tag: FormatTag::Pcm,
            channels: ch,
            sample_rate,
            avg_bytes_per_sec: sample_rate * ch as u32 * 2,
            block_align: ch * 2,
            bits_per_sample: 16,
        }
    }

    /// Sample frames held by a payload of `payload_len` bytes.
    pub fn play_length(&self, payload_len: usize) -> u32 {
        match self.tag {
            FormatTag::Pcm => {
                let bytes_per_sample = (self.bits_per_sample / 8).max(1) as usize;
                (payload_len / self.channels.max(1) as usize / bytes_per_sample) as u32
            }
            FormatTag::Adpcm => {
                if self.block_align == 0 {
                    return 0;
                }
                let blocks = payload_len / self.block_align as usize;
                blocks as u32 * adpcm_samples_per_block(self.block_align, self.channels)
            }
        }
    }

    pub(crate) fn to_wave_format(self) -> WaveFormat {
        WaveFormat {
            encoding: match self.tag {
                FormatTag::Pcm => WaveEncoding::Pcm,
                FormatTag::Adpcm => WaveEncoding::Adpcm,
            },
            channels: self.channels,
            sample_rate: self.sample_rate,
            avg_bytes_per_sec: self.avg_bytes_per_sec,
            block_align: self.block_align,
            bits_per_sample: self.bits_per_sample,
        }
    }
}

/// Loop region in sample frames. `(0, 0)` loops the whole play range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopRegion {
    pub start: u32,
    pub length: u32,
}

impl LoopRegion {
    pub fn new(start: u32, length: u32) -> Self {
        Self { start, length }
    }

    pub fn is_whole_range(&self) -> bool {
        self.start == 0 && self.length == 0
    }

    /// Only `(0, 0)` may have zero length; any other region must be non-empty and end
    /// within the play range.
    pub(crate) fn fits(&self, play_length: u32) -> bool {
        if self.length == 0 {
            return self.start == 0;
        }
        self.start as u64 + self.length as u64 <= play_length as u64
    }
}

pub(crate) fn check_sample_rate(sample_rate: u32) -> Result<()> {
    if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
        return Err(AudioError::InvalidArgument(format!(
            "sample rate {} outside {}..={}",
            sample_rate, MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
        )));
    }
    Ok(())
}
