//! The process-wide output device.

use std::sync::Arc;

use audio_backend::{
    AudioBackend, BackendError, DeviceDescriptor, DiagnosticEvent, MasterVoiceInfo,
    ReverbParameters, VoiceId, VoiceSend, create_audio_backend,
};
use parking_lot::Mutex;

use crate::config::{self, EngineConfig};
use crate::error::{AudioError, Result};
use crate::format::AudioFormat;

struct DeviceState {
    backend: Box<dyn AudioBackend>,
    reverb: Option<VoiceId>,
}

#[derive(Debug, Clone, Copy)]
struct GlobalParams {
    master_volume: f32,
    distance_scale: f32,
    doppler_scale: f32,
    speed_of_sound: f32,
}

/// An opened output device: backend, master voice, lazily created reverb voice, and the
/// global 3D parameters.
pub struct AudioDevice {
    state: Mutex<DeviceState>,
    params: Mutex<GlobalParams>,
    master: MasterVoiceInfo,
    device_name: String,
}

fn no_hardware(e: BackendError) -> AudioError {
    AudioError::NoAudioHardware(e.to_string())
}

/// Preferred name if it matches, else the default game device, else the first device.
fn select_device<'a>(devices: &'a [DeviceDescriptor], preferred: Option<&str>) -> Option<&'a DeviceDescriptor> {
    if let Some(name) = preferred {
        if let Some(d) = devices.iter().find(|d| d.name == name) {
            return Some(d);
        }
        tracing::warn!(device = name, "preferred output device not found, using default policy");
    }
    devices.iter().find(|d| d.is_default_game_device).or_else(|| devices.first())
}

impl AudioDevice {
    /// The process-wide device, created on first use.
    ///
    /// A failed first attempt is recorded and returned to every later caller.
    pub fn get_or_create() -> Result<Arc<AudioDevice>> {
        global_slot().get_or_try_init(|| {
            let config = EngineConfig::from_env();
            let backend = create_audio_backend(&config.backend_config()).map_err(no_hardware)?;
            AudioDevice::open(backend, &config)
        })
    }

    /// Open a device on an explicit backend.
    pub fn open(mut backend: Box<dyn AudioBackend>, config: &EngineConfig) -> Result<Arc<AudioDevice>> {
        config.validate()?;

        let devices = backend.enumerate_devices().map_err(no_hardware)?;
        let selected = select_device(&devices, config.preferred_device.as_deref())
            .ok_or_else(|| AudioError::NoAudioHardware("no output devices".into()))?;
        let master = backend.create_master_voice(selected.index).map_err(no_hardware)?;

        if let Err(e) = backend.initialize_3d(master.channel_mask, config.speed_of_sound) {
            if let Err(e) = backend.destroy_voice(master.voice) {
                tracing::warn!(error = %e, "failed to release master voice");
            }
            return Err(no_hardware(e));
        }

        backend.set_diagnostics_callback(Some(Arc::new(|event: DiagnosticEvent| {
            tracing::warn!(%event, "audio backend diagnostic");
        })));

        tracing::info!(
            device = %selected.name,
            index = selected.index,
            channels = master.channels,
            sample_rate = master.sample_rate,
            "audio device opened"
        );

        Ok(Arc::new(AudioDevice {
            state: Mutex::new(DeviceState { backend, reverb: None }),
            params: Mutex::new(GlobalParams {
                master_volume: 1.0,
                distance_scale: config.distance_scale,
                doppler_scale: config.doppler_scale,
                speed_of_sound: config.speed_of_sound,
            }),
            master,
            device_name: selected.name.clone(),
        }))
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn master(&self) -> MasterVoiceInfo {
        self.master
    }

    pub fn master_volume(&self) -> f32 {
        self.params.lock().master_volume
    }

    pub fn set_master_volume(&self, volume: f32) -> Result<()> {
        self.state.lock().backend.set_volume(self.master.voice, volume)?;
        self.params.lock().master_volume = volume;
        Ok(())
    }

    pub fn distance_scale(&self) -> f32 {
        self.params.lock().distance_scale
    }

    pub fn set_distance_scale(&self, value: f32) -> Result<()> {
        config::check_distance_scale(value)?;
        self.params.lock().distance_scale = value;
        Ok(())
    }

    pub fn doppler_scale(&self) -> f32 {
        self.params.lock().doppler_scale
    }

    pub fn set_doppler_scale(&self, value: f32) -> Result<()> {
        config::check_doppler_scale(value)?;
        self.params.lock().doppler_scale = value;
        Ok(())
    }

    pub fn speed_of_sound(&self) -> f32 {
        self.params.lock().speed_of_sound
    }

    /// Store the new speed of sound and rebuild the 3D tables for the master layout.
    pub fn set_speed_of_sound(&self, value: f32) -> Result<()> {
        config::check_speed_of_sound(value)?;
        self.state.lock().backend.initialize_3d(self.master.channel_mask, value)?;
        self.params.lock().speed_of_sound = value;
        Ok(())
    }

    /// Route `voice` to both the master voice and the shared reverb voice, creating the
    /// reverb voice on first use. Returns the reverb voice.
    pub fn attach_reverb(&self, voice: VoiceId) -> Result<VoiceId> {
        let mut state = self.state.lock();
        let reverb = match state.reverb {
            Some(r) => r,
            None => {
                let r = state
                    .backend
                    .create_submix_voice(self.master.channels, self.master.sample_rate)?;
                if let Err(e) = state.backend.set_effect_chain(r, Some(ReverbParameters::generic_room())) {
                    if let Err(e) = state.backend.destroy_voice(r) {
                        tracing::warn!(voice = %r, error = %e, "failed to release reverb voice");
                    }
                    return Err(e.into());
                }
                tracing::info!(voice = %r, "reverb voice created");
                state.reverb = Some(r);
                r
            }
        };
        state.backend.set_output_voices(
            voice,
            &[VoiceSend { target: self.master.voice }, VoiceSend { target: reverb }],
        )?;
        Ok(reverb)
    }

    pub fn reverb_voice(&self) -> Option<VoiceId> {
        self.state.lock().reverb
    }

    /// Allocate a source voice; `None` when the voice pool is exhausted.
    pub(crate) fn create_voice(&self, format: &AudioFormat) -> Result<Option<VoiceId>> {
        match self.state.lock().backend.create_source_voice(&format.to_wave_format()) {
            Ok(v) => {
                tracing::debug!(voice = %v, "source voice created");
                Ok(Some(v))
            }
            Err(BackendError::VoicePoolExhausted { limit }) => {
                tracing::warn!(limit, "voice pool exhausted");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stop, flush, and destroy a source voice. Failures are logged, never returned.
    pub(crate) fn release_voice(&self, voice: VoiceId) {
        let mut state = self.state.lock();
        let backend = &mut state.backend;
        if let Err(e) = backend
            .stop_voice(voice)
            .and_then(|_| backend.flush_source_buffers(voice))
            .and_then(|_| backend.destroy_voice(voice))
        {
            tracing::warn!(voice = %voice, error = %e, "failed to release voice");
        } else {
            tracing::debug!(voice = %voice, "source voice released");
        }
    }

    pub(crate) fn with_backend<R>(&self, f: impl FnOnce(&mut dyn AudioBackend) -> R) -> R {
        let mut state = self.state.lock();
        f(state.backend.as_mut())
    }
}

impl Drop for AudioDevice {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(r) = state.reverb.take() {
            if let Err(e) = state.backend.destroy_voice(r) {
                tracing::warn!(voice = %r, error = %e, "failed to destroy reverb voice");
            }
        }
        if let Err(e) = state.backend.destroy_voice(self.master.voice) {
            tracing::warn!(error = %e, "failed to destroy master voice");
        }
        tracing::info!(device = %self.device_name, "audio device closed");
    }
}

enum SlotState {
    Empty,
    Ready(Arc<AudioDevice>),
    Failed(AudioError),
    Closed,
}

/// Initialize-once, tear-down-once holder for a device.
pub struct DeviceSlot {
    state: Mutex<SlotState>,
}

impl DeviceSlot {
    pub const fn new() -> Self {
        Self { state: parking_lot::const_mutex(SlotState::Empty) }
    }

    /// Return the device, running `init` if the slot is empty.
    ///
    /// `init` runs under the slot lock, so concurrent first callers create at most one
    /// device. Its error is stored and replayed; `init` never runs twice.
    pub fn get_or_try_init<F>(&self, init: F) -> Result<Arc<AudioDevice>>
    where
        F: FnOnce() -> Result<Arc<AudioDevice>>,
    {
        let mut state = self.state.lock();
        match &*state {
            SlotState::Ready(device) => return Ok(device.clone()),
            SlotState::Failed(e) => return Err(e.clone()),
            SlotState::Closed => return Err(AudioError::DeviceClosed),
            SlotState::Empty => {}
        }
        match init() {
            Ok(device) => {
                *state = SlotState::Ready(device.clone());
                Ok(device)
            }
            Err(e) => {
                tracing::warn!(error = %e, "audio device initialization failed");
                *state = SlotState::Failed(e.clone());
                Err(e)
            }
        }
    }

    /// The device if one is ready.
    pub fn get(&self) -> Option<Arc<AudioDevice>> {
        match &*self.state.lock() {
            SlotState::Ready(device) => Some(device.clone()),
            _ => None,
        }
    }

    /// Release the slot's reference. Returns `true` only on the call that released a
    /// ready device.
    pub fn shutdown(&self) -> bool {
        let previous = std::mem::replace(&mut *self.state.lock(), SlotState::Closed);
        matches!(previous, SlotState::Ready(_))
    }
}

impl Default for DeviceSlot {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_DEVICE: DeviceSlot = DeviceSlot::new();

pub fn global_slot() -> &'static DeviceSlot {
    &GLOBAL_DEVICE
}

/// Close the process-wide device slot.
pub fn shutdown() -> bool {
    GLOBAL_DEVICE.shutdown()
}

pub fn master_volume() -> Result<f32> {
    Ok(AudioDevice::get_or_create()?.master_volume())
}

pub fn set_master_volume(volume: f32) -> Result<()> {
    AudioDevice::get_or_create()?.set_master_volume(volume)
}

pub fn distance_scale() -> Result<f32> {
    Ok(AudioDevice::get_or_create()?.distance_scale())
}

pub fn set_distance_scale(value: f32) -> Result<()> {
    AudioDevice::get_or_create()?.set_distance_scale(value)
}

pub fn doppler_scale() -> Result<f32> {
    Ok(AudioDevice::get_or_create()?.doppler_scale())
}

pub fn set_doppler_scale(value: f32) -> Result<()> {
    AudioDevice::get_or_create()?.set_doppler_scale(value)
}

pub fn speed_of_sound() -> Result<f32> {
    Ok(AudioDevice::get_or_create()?.speed_of_sound())
}

pub fn set_speed_of_sound(value: f32) -> Result<()> {
    AudioDevice::get_or_create()?.set_speed_of_sound(value)
}
