use std::sync::Arc;

use audio_backend::mixer::default_matrix;
use audio_backend::{LOOP_INFINITE, SubmittedBuffer, VoiceId};
use parking_lot::{Mutex, MutexGuard};

use crate::buffer::BufferShared;
use crate::device::AudioDevice;
use crate::error::{AudioError, Result, invalid_argument};
use crate::registry::InstanceId;

/// Transport state of a playback instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundState {
    Stopped,
    Playing,
    Paused,
}

struct InstanceCore {
    voice: Option<VoiceId>,
    state: SoundState,
    volume: f32,
    pitch: f32,
    pan: f32,
    looped: bool,
    reverb_mix: Option<f32>,
    /// Set once a voice has been started; the sweep never touches a cell before that.
    started: bool,
    disposed: bool,
}

/// Shared transport state of one instance. The buffer's registry and the user's
/// [`PlaybackInstance`] handle both point at the same cell.
pub(crate) struct InstanceCell {
    id: InstanceId,
    core: Mutex<InstanceCore>,
}

pub(crate) fn check_volume(volume: f32) -> Result<()> {
    if volume.is_nan() || !(0.0..=1.0).contains(&volume) {
        return Err(invalid_argument(format!("volume {} outside 0..=1", volume)));
    }
    Ok(())
}

pub(crate) fn check_pitch(pitch: f32) -> Result<()> {
    if pitch.is_nan() || !(-1.0..=1.0).contains(&pitch) {
        return Err(invalid_argument(format!("pitch {} outside -1..=1", pitch)));
    }
    Ok(())
}

pub(crate) fn check_pan(pan: f32) -> Result<()> {
    if pan.is_nan() || !(-1.0..=1.0).contains(&pan) {
        return Err(invalid_argument(format!("pan {} outside -1..=1", pan)));
    }
    Ok(())
}

fn check_reverb_mix(mix: f32) -> Result<()> {
    if mix.is_nan() || !(0.0..=2.0).contains(&mix) {
        return Err(invalid_argument(format!("reverb mix {} outside 0..=2", mix)));
    }
    Ok(())
}

fn frequency_ratio(pitch: f32) -> f32 {
    2f32.powf(pitch)
}

/// Row-major `dst x src` gains. Centre is unity on both sides; panning attenuates the
/// opposite side down to silence. Outputs beyond the front pair receive nothing.
pub(crate) fn pan_matrix(src_channels: u16, dst_channels: u16, pan: f32) -> Vec<f32> {
    let (src, dst) = (src_channels as usize, dst_channels as usize);
    if dst < 2 || src > 2 {
        return default_matrix(src_channels, dst_channels);
    }
    let left = (1.0 - pan).min(1.0);
    let right = (1.0 + pan).min(1.0);
    let mut m = vec![0.0; src * dst];
    if src == 1 {
        m[0] = left;
        m[1] = right;
    } else {
        m[0] = left;
        m[src + 1] = right;
    }
    m
}

impl InstanceCell {
    pub(crate) fn new(id: InstanceId) -> Self {
        Self {
            id,
            core: Mutex::new(InstanceCore {
                voice: None,
                state: SoundState::Stopped,
                volume: 1.0,
                pitch: 0.0,
                pan: 0.0,
                looped: false,
                reverb_mix: None,
                started: false,
                disposed: false,
            }),
        }
    }

    pub(crate) fn id(&self) -> InstanceId {
        self.id
    }

    fn live(&self) -> Result<MutexGuard<'_, InstanceCore>> {
        let core = self.core.lock();
        if core.disposed {
            return Err(AudioError::InstanceDisposed);
        }
        Ok(core)
    }

    /// Notice a non-looping voice that has consumed its buffer.
    fn refresh(core: &mut InstanceCore, device: &AudioDevice) {
        if core.state != SoundState::Playing || core.looped {
            return;
        }
        if let Some(v) = core.voice {
            match device.with_backend(|b| b.voice_state(v)) {
                Ok(status) if status.buffers_queued == 0 => core.state = SoundState::Stopped,
                Ok(_) => {}
                Err(e) => tracing::warn!(voice = %v, error = %e, "voice state query failed"),
            }
        }
    }

    fn apply_pan(device: &AudioDevice, voice: VoiceId, src_channels: u16, pan: f32) -> Result<()> {
        let matrix = pan_matrix(src_channels, device.master().channels, pan);
        device.with_backend(|b| b.set_output_matrix(voice, None, &matrix))?;
        Ok(())
    }

    fn apply_reverb(device: &AudioDevice, voice: VoiceId, src_channels: u16, mix: f32) -> Result<()> {
        let reverb = device.attach_reverb(voice)?;
        let matrix: Vec<f32> = default_matrix(src_channels, device.master().channels)
            .into_iter()
            .map(|g| g * mix)
            .collect();
        device.with_backend(|b| b.set_output_matrix(voice, Some(reverb), &matrix))?;
        Ok(())
    }

    fn configure_voice(core: &InstanceCore, device: &AudioDevice, voice: VoiceId, src_channels: u16) -> Result<()> {
        let (volume, ratio) = (core.volume, frequency_ratio(core.pitch));
        device.with_backend(|b| {
            b.set_volume(voice, volume)?;
            b.set_frequency_ratio(voice, ratio)
        })?;
        if let Some(mix) = core.reverb_mix {
            Self::apply_reverb(device, voice, src_channels, mix)?;
        }
        Self::apply_pan(device, voice, src_channels, core.pan)
    }

    pub(crate) fn state(&self, device: &AudioDevice) -> SoundState {
        let mut core = self.core.lock();
        if core.disposed {
            return SoundState::Stopped;
        }
        Self::refresh(&mut core, device);
        core.state
    }

    /// Dispose the cell if it has played and its voice has drained. Checked and
    /// disposed under one lock so a cell that is still starting is never collected.
    pub(crate) fn dispose_if_finished(&self, device: &AudioDevice) -> bool {
        let mut core = self.core.lock();
        if core.disposed || !core.started {
            return false;
        }
        Self::refresh(&mut core, device);
        if core.state != SoundState::Stopped {
            return false;
        }
        self.release(&mut core, device);
        true
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.core.lock().disposed
    }

    /// Start, restart, or resume. `Ok(false)` means the cell stayed stopped, either
    /// because no voice was free or because the buffer is empty.
    pub(crate) fn play(&self, buffer: &BufferShared) -> Result<bool> {
        let device = buffer.device();
        let mut core = self.live()?;
        Self::refresh(&mut core, device);
        match core.state {
            SoundState::Playing => return Ok(true),
            SoundState::Paused => {
                if let Some(v) = core.voice {
                    device.with_backend(|b| b.start_voice(v))?;
                }
                core.state = SoundState::Playing;
                return Ok(true);
            }
            SoundState::Stopped => {}
        }

        let payload = buffer.payload().ok_or(AudioError::BufferDisposed)?;
        if buffer.play_length() == 0 {
            tracing::debug!(instance = %self.id, "empty buffer, nothing to play");
            return Ok(false);
        }
        let format = buffer.format();
        let voice = match core.voice {
            Some(v) => {
                device.with_backend(|b| {
                    b.stop_voice(v)?;
                    b.flush_source_buffers(v)
                })?;
                v
            }
            None => {
                let Some(v) = device.create_voice(&format)? else {
                    tracing::debug!(instance = %self.id, "no voice available, instance stays stopped");
                    return Ok(false);
                };
                // Bound before configuring so disposal releases it even if setup fails.
                core.voice = Some(v);
                Self::configure_voice(&core, device, v, format.channels)?;
                v
            }
        };

        let region = buffer.loop_region();
        let submitted = SubmittedBuffer {
            data: payload,
            play_begin: 0,
            play_length: buffer.play_length(),
            loop_begin: if core.looped { region.start } else { 0 },
            loop_length: if core.looped { region.length } else { 0 },
            loop_count: if core.looped { LOOP_INFINITE } else { 0 },
        };
        device.with_backend(|b| {
            b.submit_buffer(voice, submitted)?;
            b.start_voice(voice)
        })?;
        core.state = SoundState::Playing;
        core.started = true;
        tracing::debug!(instance = %self.id, voice = %voice, looped = core.looped, "instance playing");
        Ok(true)
    }

    pub(crate) fn pause(&self, device: &AudioDevice) -> Result<()> {
        let mut core = self.live()?;
        Self::refresh(&mut core, device);
        if core.state == SoundState::Playing {
            if let Some(v) = core.voice {
                device.with_backend(|b| b.stop_voice(v))?;
            }
            core.state = SoundState::Paused;
        }
        Ok(())
    }

    pub(crate) fn resume(&self, device: &AudioDevice) -> Result<()> {
        let mut core = self.live()?;
        if core.state == SoundState::Paused {
            if let Some(v) = core.voice {
                device.with_backend(|b| b.start_voice(v))?;
            }
            core.state = SoundState::Playing;
        }
        Ok(())
    }

    pub(crate) fn stop(&self, device: &AudioDevice) -> Result<()> {
        let mut core = self.live()?;
        if let Some(v) = core.voice {
            device.with_backend(|b| {
                b.stop_voice(v)?;
                b.flush_source_buffers(v)
            })?;
        }
        core.state = SoundState::Stopped;
        Ok(())
    }

    pub(crate) fn volume(&self) -> f32 {
        self.core.lock().volume
    }

    pub(crate) fn set_volume(&self, device: &AudioDevice, volume: f32) -> Result<()> {
        check_volume(volume)?;
        let mut core = self.live()?;
        if let Some(v) = core.voice {
            device.with_backend(|b| b.set_volume(v, volume))?;
        }
        core.volume = volume;
        Ok(())
    }

    pub(crate) fn pitch(&self) -> f32 {
        self.core.lock().pitch
    }

    pub(crate) fn set_pitch(&self, device: &AudioDevice, pitch: f32) -> Result<()> {
        check_pitch(pitch)?;
        let mut core = self.live()?;
        if let Some(v) = core.voice {
            device.with_backend(|b| b.set_frequency_ratio(v, frequency_ratio(pitch)))?;
        }
        core.pitch = pitch;
        Ok(())
    }

    pub(crate) fn pan(&self) -> f32 {
        self.core.lock().pan
    }

    pub(crate) fn set_pan(&self, buffer: &BufferShared, pan: f32) -> Result<()> {
        check_pan(pan)?;
        let mut core = self.live()?;
        if let Some(v) = core.voice {
            Self::apply_pan(buffer.device(), v, buffer.format().channels, pan)?;
        }
        core.pan = pan;
        Ok(())
    }

    pub(crate) fn is_looped(&self) -> bool {
        self.core.lock().looped
    }

    pub(crate) fn set_looped(&self, looped: bool) -> Result<()> {
        self.live()?.looped = looped;
        Ok(())
    }

    pub(crate) fn reverb_mix(&self) -> Option<f32> {
        self.core.lock().reverb_mix
    }

    pub(crate) fn set_reverb_mix(&self, buffer: &BufferShared, mix: f32) -> Result<()> {
        check_reverb_mix(mix)?;
        let mut core = self.live()?;
        if let Some(v) = core.voice {
            Self::apply_reverb(buffer.device(), v, buffer.format().channels, mix)?;
        }
        core.reverb_mix = Some(mix);
        Ok(())
    }

    /// Apply all three transport parameters before the first `play`.
    pub(crate) fn preset(&self, volume: f32, pitch: f32, pan: f32) -> Result<()> {
        let mut core = self.live()?;
        core.volume = volume;
        core.pitch = pitch;
        core.pan = pan;
        Ok(())
    }

    /// Stop and release the voice. Returns `false` if the cell was already disposed.
    pub(crate) fn force_dispose(&self, device: &AudioDevice) -> bool {
        let mut core = self.core.lock();
        if core.disposed {
            return false;
        }
        self.release(&mut core, device);
        true
    }

    fn release(&self, core: &mut InstanceCore, device: &AudioDevice) {
        core.disposed = true;
        core.state = SoundState::Stopped;
        if let Some(v) = core.voice.take() {
            device.release_voice(v);
        }
        tracing::debug!(instance = %self.id, "instance disposed");
    }
}

/// A voice bound to one [`SoundBuffer`](crate::SoundBuffer).
///
/// Keeps the buffer's format and payload alive. Dropping the handle disposes it.
pub struct PlaybackInstance {
    cell: Arc<InstanceCell>,
    buffer: Arc<BufferShared>,
}

impl PlaybackInstance {
    pub(crate) fn new(cell: Arc<InstanceCell>, buffer: Arc<BufferShared>) -> Self {
        Self { cell, buffer }
    }

    pub fn id(&self) -> InstanceId {
        self.cell.id()
    }

    pub fn state(&self) -> SoundState {
        self.cell.state(self.buffer.device())
    }

    /// Start or resume. When no voice is free, finished fire-and-forget instances
    /// are collected and the start is retried once.
    pub fn play(&self) -> Result<()> {
        if !self.cell.play(&self.buffer)? && self.buffer.collect_finished() > 0 {
            self.cell.play(&self.buffer)?;
        }
        Ok(())
    }

    pub fn pause(&self) -> Result<()> {
        self.cell.pause(self.buffer.device())
    }

    pub fn resume(&self) -> Result<()> {
        self.cell.resume(self.buffer.device())
    }

    pub fn stop(&self) -> Result<()> {
        self.cell.stop(self.buffer.device())
    }

    pub fn volume(&self) -> f32 {
        self.cell.volume()
    }

    pub fn set_volume(&self, volume: f32) -> Result<()> {
        self.cell.set_volume(self.buffer.device(), volume)
    }

    /// Pitch shift in octaves.
    pub fn pitch(&self) -> f32 {
        self.cell.pitch()
    }

    pub fn set_pitch(&self, pitch: f32) -> Result<()> {
        self.cell.set_pitch(self.buffer.device(), pitch)
    }

    pub fn pan(&self) -> f32 {
        self.cell.pan()
    }

    pub fn set_pan(&self, pan: f32) -> Result<()> {
        self.cell.set_pan(&self.buffer, pan)
    }

    pub fn is_looped(&self) -> bool {
        self.cell.is_looped()
    }

    /// Takes effect at the next `play`.
    pub fn set_is_looped(&self, looped: bool) -> Result<()> {
        self.cell.set_looped(looped)
    }

    pub fn reverb_mix(&self) -> Option<f32> {
        self.cell.reverb_mix()
    }

    pub fn set_reverb_mix(&self, mix: f32) -> Result<()> {
        self.cell.set_reverb_mix(&self.buffer, mix)
    }

    pub fn is_disposed(&self) -> bool {
        self.cell.is_disposed()
    }

    /// Stop, release the voice, and stop being tracked by the buffer. Idempotent.
    pub fn dispose(&self) {
        self.cell.force_dispose(self.buffer.device());
        self.buffer.untrack(self.cell.id());
    }
}

impl Drop for PlaybackInstance {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for PlaybackInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackInstance")
            .field("id", &self.cell.id())
            .field("disposed", &self.cell.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centred_pan_is_unity() {
        assert_eq!(pan_matrix(1, 2, 0.0), vec![1.0, 1.0]);
        assert_eq!(pan_matrix(2, 2, 0.0), vec![1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn hard_pan_silences_opposite_side() {
        assert_eq!(pan_matrix(1, 2, 1.0), vec![0.0, 1.0]);
        assert_eq!(pan_matrix(1, 2, -1.0), vec![1.0, 0.0]);
        assert_eq!(pan_matrix(2, 2, 0.5), vec![0.5, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn mono_output_ignores_pan() {
        assert_eq!(pan_matrix(2, 1, 1.0), vec![0.5, 0.5]);
    }

    #[test]
    fn pitch_maps_to_octaves() {
        assert!((frequency_ratio(1.0) - 2.0).abs() < 1e-6);
        assert!((frequency_ratio(-1.0) - 0.5).abs() < 1e-6);
        assert!((frequency_ratio(0.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn range_checks() {
        assert!(check_volume(1.0).is_ok());
        assert!(check_volume(1.01).is_err());
        assert!(check_pitch(-1.5).is_err());
        assert!(check_pan(f32::NAN).is_err());
        assert!(check_reverb_mix(2.0).is_ok());
        assert!(check_reverb_mix(-0.1).is_err());
    }
}
