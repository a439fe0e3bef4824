use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::device::AudioDevice;
use crate::error::{AudioError, Result, invalid_argument};
use crate::format::{AudioChannels, AudioFormat, LoopRegion, check_sample_rate};
use crate::instance::{InstanceCell, PlaybackInstance, check_pan, check_pitch, check_volume};
use crate::registry::{InstanceId, InstanceRegistry};
use crate::wave;

/// State shared by a buffer and every instance created from it.
pub(crate) struct BufferShared {
    device: Arc<AudioDevice>,
    format: AudioFormat,
    payload: RwLock<Option<Arc<[u8]>>>,
    payload_len: usize,
    play_length: u32,
    loop_region: LoopRegion,
    registry: Mutex<InstanceRegistry>,
}

impl BufferShared {
    pub(crate) fn device(&self) -> &AudioDevice {
        &self.device
    }

    pub(crate) fn format(&self) -> AudioFormat {
        self.format
    }

    pub(crate) fn play_length(&self) -> u32 {
        self.play_length
    }

    pub(crate) fn loop_region(&self) -> LoopRegion {
        self.loop_region
    }

    pub(crate) fn payload(&self) -> Option<Arc<[u8]>> {
        self.payload.read().clone()
    }

    pub(crate) fn untrack(&self, id: InstanceId) {
        self.registry.lock().remove(id);
    }

    /// Sweep every transient instance whose voice has finished.
    pub(crate) fn collect_finished(&self) -> usize {
        let transients = self.registry.lock().transients();
        self.sweep(transients)
    }

    /// Sweep only when enough transients have piled up since the last sweep.
    fn collect_if_due(&self) {
        let due = self.registry.lock().transients_due();
        if let Some(transients) = due {
            self.sweep(transients);
        }
    }

    fn sweep(&self, transients: Vec<Arc<InstanceCell>>) -> usize {
        let mut swept = 0;
        for cell in transients {
            if cell.dispose_if_finished(&self.device) {
                self.untrack(cell.id());
                swept += 1;
            }
        }
        self.registry.lock().swept();
        if swept > 0 {
            tracing::debug!(swept, "collected finished instances");
        }
        swept
    }

    /// Register a transient instance and start it. `Ok(false)` means no voice was available.
    fn start_transient(&self, volume: f32, pitch: f32, pan: f32) -> Result<bool> {
        let cell = self.registry.lock().register(true)?;
        let started = cell.preset(volume, pitch, pan).and_then(|_| cell.play(self));
        match started {
            Ok(true) => Ok(true),
            Ok(false) => {
                cell.force_dispose(&self.device);
                self.untrack(cell.id());
                Ok(false)
            }
            Err(e) => {
                cell.force_dispose(&self.device);
                self.untrack(cell.id());
                match e {
                    // Torn down between registration and start.
                    AudioError::InstanceDisposed => Err(AudioError::BufferDisposed),
                    other => Err(other),
                }
            }
        }
    }

    fn dispose(&self) {
        let Some(cells) = self.registry.lock().begin_teardown() else {
            return;
        };
        let count = cells.len();
        // Every instance is torn down before the payload goes away.
        for cell in cells {
            cell.force_dispose(&self.device);
        }
        *self.payload.write() = None;
        tracing::debug!(instances = count, bytes = self.payload_len, "sound buffer disposed");
    }
}

/// A loaded sound: format, payload, and loop metadata.
///
/// Dropping the buffer disposes it, which force-disposes every live instance first.
pub struct SoundBuffer {
    shared: Arc<BufferShared>,
}

impl SoundBuffer {
    /// Build from an already-decoded format and payload.
    ///
    /// A loop region that does not fit the play length, or is empty without being
    /// `(0, 0)`, is replaced by the whole range.
    pub fn new(
        device: &Arc<AudioDevice>,
        format: AudioFormat,
        payload: impl Into<Arc<[u8]>>,
        loop_region: LoopRegion,
    ) -> Result<Self> {
        if format.channels == 0 || format.block_align == 0 || format.sample_rate == 0 {
            return Err(invalid_argument(format!("unusable format {:?}", format)));
        }
        let payload: Arc<[u8]> = payload.into();
        let play_length = format.play_length(payload.len());
        let loop_region = if loop_region.fits(play_length) {
            loop_region
        } else {
            tracing::warn!(
                loop_start = loop_region.start,
                loop_length = loop_region.length,
                play_length,
                "unusable loop region, looping whole sound"
            );
            LoopRegion::default()
        };
        tracing::debug!(
            bytes = payload.len(),
            play_length,
            channels = format.channels,
            sample_rate = format.sample_rate,
            "sound buffer created"
        );
        Ok(Self {
            shared: Arc::new(BufferShared {
                device: device.clone(),
                format,
                payload_len: payload.len(),
                payload: RwLock::new(Some(payload)),
                play_length,
                loop_region,
                registry: Mutex::new(InstanceRegistry::new()),
            }),
        })
    }

    /// Decode a RIFF/WAVE stream.
    pub fn from_stream<R: Read>(device: &Arc<AudioDevice>, stream: R) -> Result<Self> {
        let wave = wave::decode(stream)?;
        Self::new(device, wave.format, wave.payload, wave.loop_region)
    }

    pub fn from_path(device: &Arc<AudioDevice>, path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_stream(device, BufReader::new(file))
    }

    /// 16-bit PCM, whole buffer, no loop region.
    pub fn from_pcm(device: &Arc<AudioDevice>, buffer: &[u8], sample_rate: u32, channels: AudioChannels) -> Result<Self> {
        Self::from_pcm_region(device, buffer, 0, buffer.len(), sample_rate, channels, 0, 0)
    }

    /// 16-bit PCM from `buffer[offset..offset + count]` with a loop region in frames.
    #[allow(clippy::too_many_arguments)]
    pub fn from_pcm_region(
        device: &Arc<AudioDevice>,
        buffer: &[u8],
        offset: usize,
        count: usize,
        sample_rate: u32,
        channels: AudioChannels,
        loop_start: u32,
        loop_length: u32,
    ) -> Result<Self> {
        check_sample_rate(sample_rate)?;
        let format = AudioFormat::pcm16(sample_rate, channels);
        let end = offset
            .checked_add(count)
            .filter(|end| *end <= buffer.len())
            .ok_or_else(|| {
                invalid_argument(format!(
                    "region {}+{} outside buffer of {} bytes",
                    offset,
                    count,
                    buffer.len()
                ))
            })?;
        let align = format.block_align as usize;
        if count == 0 || count % align != 0 {
            return Err(invalid_argument(format!(
                "byte count {} must be a non-zero multiple of {}",
                count, align
            )));
        }
        let region = LoopRegion::new(loop_start, loop_length);
        let play_length = (count / align) as u32;
        if !region.fits(play_length) {
            return Err(invalid_argument(format!(
                "loop {}+{} does not fit play length {}",
                loop_start, loop_length, play_length
            )));
        }
        Self::new(device, format, &buffer[offset..end], region)
    }

    pub fn device(&self) -> &Arc<AudioDevice> {
        &self.shared.device
    }

    pub fn format(&self) -> AudioFormat {
        self.shared.format
    }

    /// Length in sample frames.
    pub fn play_length(&self) -> u32 {
        self.shared.play_length
    }

    pub fn loop_start(&self) -> u32 {
        self.shared.loop_region.start
    }

    pub fn loop_length(&self) -> u32 {
        self.shared.loop_region.length
    }

    pub fn payload_len(&self) -> usize {
        self.shared.payload_len
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.shared.play_length as f64 / self.shared.format.sample_rate as f64)
    }

    /// Instances currently tracked, transient ones included.
    pub fn live_instances(&self) -> usize {
        self.shared.registry.lock().len()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.registry.lock().is_disposed()
    }

    pub fn create_instance(&self) -> Result<PlaybackInstance> {
        self.shared.collect_if_due();
        let cell = self.shared.registry.lock().register(false)?;
        tracing::debug!(instance = %cell.id(), "instance created");
        Ok(PlaybackInstance::new(cell, self.shared.clone()))
    }

    /// Fire-and-forget playback at full volume, no pitch shift, centred.
    pub fn play(&self) -> Result<bool> {
        self.play_with(1.0, 0.0, 0.0)
    }

    /// Fire-and-forget playback. `Ok(false)` means no voice was available.
    pub fn play_with(&self, volume: f32, pitch: f32, pan: f32) -> Result<bool> {
        check_volume(volume)?;
        check_pitch(pitch)?;
        check_pan(pan)?;
        self.shared.collect_if_due();

        match self.shared.start_transient(volume, pitch, pan)? {
            true => Ok(true),
            // Finished transients may be holding every voice.
            false if self.shared.collect_finished() > 0 => self.shared.start_transient(volume, pitch, pan),
            false => Ok(false),
        }
    }

    /// Dispose finished fire-and-forget instances now. Returns how many were swept.
    pub fn collect_finished(&self) -> usize {
        self.shared.collect_finished()
    }

    /// Force-dispose every live instance, then release the payload. Idempotent.
    pub fn dispose(&self) {
        self.shared.dispose();
    }
}

impl Drop for SoundBuffer {
    fn drop(&mut self) {
        self.shared.dispose();
    }
}

impl std::fmt::Debug for SoundBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundBuffer")
            .field("format", &self.shared.format)
            .field("play_length", &self.shared.play_length)
            .field("loop_region", &self.shared.loop_region)
            .finish()
    }
}
