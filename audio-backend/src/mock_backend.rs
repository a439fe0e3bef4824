use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::mixer::Mixer;
use crate::{
    AudioBackend, BackendError, DeviceDescriptor, DiagnosticEvent, DiagnosticsCb, MasterVoiceInfo,
    ReverbParameters, SubmittedBuffer, VoiceId, VoiceSend, VoiceStatus, WaveFormat,
};

/// Counters and an offline render hook shared between a [`MockAudioBackend`] and the
/// test that created it.
#[derive(Default)]
pub struct MockProbe {
    mixer: Mutex<Option<Mixer>>,
    selected_device: Mutex<Option<usize>>,
    diagnostics: Mutex<Option<DiagnosticsCb>>,
    pub enumerations: AtomicUsize,
    pub source_voices_created: AtomicUsize,
    pub submix_voices_created: AtomicUsize,
    pub voices_destroyed: AtomicUsize,
    pub invalid_destroys: AtomicUsize,
    pub effect_chains_set: AtomicUsize,
    pub spatial_inits: AtomicUsize,
    pub buffers_submitted: AtomicUsize,
}

impl MockProbe {
    /// Source voices currently allocated.
    pub fn live_source_voices(&self) -> usize {
        self.mixer.lock().as_ref().map_or(0, |m| m.source_voice_count())
    }

    pub fn live_submix_voices(&self) -> usize {
        self.mixer.lock().as_ref().map_or(0, |m| m.submix_voice_count())
    }

    /// Device index the master voice was created on.
    pub fn selected_device(&self) -> Option<usize> {
        *self.selected_device.lock()
    }

    pub fn has_master_voice(&self) -> bool {
        self.mixer.lock().is_some()
    }

    /// Speaker mask and speed of sound passed to the last 3D initialization.
    pub fn spatial_config(&self) -> Option<(u32, f32)> {
        self.mixer
            .lock()
            .as_ref()
            .and_then(|m| m.spatial_tables().map(|t| (t.channel_mask, t.speed_of_sound)))
    }

    /// Pull `frames` of interleaved output from the voice graph.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut guard = self.mixer.lock();
        match guard.as_mut() {
            Some(m) => {
                let mut out = vec![0.0; frames * m.channels() as usize];
                m.render(&mut out);
                out
            }
            None => Vec::new(),
        }
    }

    /// Deliver a diagnostics event as a real device would.
    pub fn emit(&self, event: DiagnosticEvent) {
        let cb = self.diagnostics.lock().clone();
        if let Some(cb) = cb {
            cb(event);
        }
    }

    fn count(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// A deterministic backend that runs the voice graph without any audio hardware.
pub struct MockAudioBackend {
    devices: Vec<DeviceDescriptor>,
    fail_master_voice: bool,
    voice_limit: usize,
    output: (u16, u32),
    probe: Arc<MockProbe>,
}

impl MockAudioBackend {
    pub fn new() -> Self {
        Self {
            devices: vec![DeviceDescriptor {
                index: 0,
                name: "mock-device".to_string(),
                is_default_game_device: true,
            }],
            fail_master_voice: false,
            voice_limit: 128,
            output: (2, 48_000),
            probe: Arc::new(MockProbe::default()),
        }
    }

    pub fn with_devices(mut self, devices: Vec<DeviceDescriptor>) -> Self {
        self.devices = devices;
        self
    }

    /// Make `create_master_voice` fail as if the device could not be opened.
    pub fn failing_master_voice(mut self) -> Self {
        self.fail_master_voice = true;
        self
    }

    pub fn with_voice_limit(mut self, limit: usize) -> Self {
        self.voice_limit = limit;
        self
    }

    pub fn with_output(mut self, channels: u16, sample_rate: u32) -> Self {
        self.output = (channels, sample_rate);
        self
    }

    pub fn probe(&self) -> Arc<MockProbe> {
        self.probe.clone()
    }

    fn with_mixer<R>(&self, f: impl FnOnce(&mut Mixer) -> Result<R, BackendError>) -> Result<R, BackendError> {
        let mut guard = self.probe.mixer.lock();
        let mixer = guard
            .as_mut()
            .ok_or_else(|| BackendError::InvalidCall("master voice has not been created".into()))?;
        f(mixer)
    }
}

impl Default for MockAudioBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for MockAudioBackend {
    fn enumerate_devices(&mut self) -> Result<Vec<DeviceDescriptor>, BackendError> {
        MockProbe::count(&self.probe.enumerations);
        Ok(self.devices.clone())
    }

    fn create_master_voice(&mut self, device_index: usize) -> Result<MasterVoiceInfo, BackendError> {
        if self.fail_master_voice {
            return Err(BackendError::StreamCreationFailed("mock device refused to open".into()));
        }
        if device_index >= self.devices.len() {
            return Err(BackendError::DeviceNotFound);
        }
        let mut guard = self.probe.mixer.lock();
        if guard.is_some() {
            return Err(BackendError::InvalidCall("master voice already exists".into()));
        }
        let (channels, sample_rate) = self.output;
        let mixer = Mixer::new(channels, sample_rate, self.voice_limit);
        let info = mixer.master_info();
        *guard = Some(mixer);
        *self.probe.selected_device.lock() = Some(device_index);
        Ok(info)
    }

    fn create_source_voice(&mut self, format: &WaveFormat) -> Result<VoiceId, BackendError> {
        let id = self.with_mixer(|m| m.create_source_voice(format))?;
        MockProbe::count(&self.probe.source_voices_created);
        Ok(id)
    }

    fn create_submix_voice(&mut self, channels: u16, sample_rate: u32) -> Result<VoiceId, BackendError> {
        let id = self.with_mixer(|m| m.create_submix_voice(channels, sample_rate))?;
        MockProbe::count(&self.probe.submix_voices_created);
        Ok(id)
    }

    fn set_effect_chain(&mut self, voice: VoiceId, reverb: Option<ReverbParameters>) -> Result<(), BackendError> {
        self.with_mixer(|m| m.set_effect_chain(voice, reverb))?;
        MockProbe::count(&self.probe.effect_chains_set);
        Ok(())
    }

    fn set_output_voices(&mut self, voice: VoiceId, sends: &[VoiceSend]) -> Result<(), BackendError> {
        self.with_mixer(|m| m.set_output_voices(voice, sends))
    }

    fn set_output_matrix(&mut self, voice: VoiceId, destination: Option<VoiceId>, matrix: &[f32]) -> Result<(), BackendError> {
        self.with_mixer(|m| m.set_output_matrix(voice, destination, matrix))
    }

    fn destroy_voice(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        let mut guard = self.probe.mixer.lock();
        let Some(mixer) = guard.as_mut() else {
            MockProbe::count(&self.probe.invalid_destroys);
            return Err(BackendError::InvalidCall("master voice has not been created".into()));
        };
        if let Err(e) = mixer.destroy_voice(voice) {
            MockProbe::count(&self.probe.invalid_destroys);
            return Err(e);
        }
        if voice == mixer.master_info().voice {
            *guard = None;
        }
        MockProbe::count(&self.probe.voices_destroyed);
        Ok(())
    }

    fn submit_buffer(&mut self, voice: VoiceId, buffer: SubmittedBuffer) -> Result<(), BackendError> {
        self.with_mixer(|m| m.submit_buffer(voice, buffer))?;
        MockProbe::count(&self.probe.buffers_submitted);
        Ok(())
    }

    fn flush_source_buffers(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        self.with_mixer(|m| m.flush_source_buffers(voice))
    }

    fn start_voice(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        self.with_mixer(|m| m.start_voice(voice))
    }

    fn stop_voice(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        self.with_mixer(|m| m.stop_voice(voice))
    }

    fn set_volume(&mut self, voice: VoiceId, volume: f32) -> Result<(), BackendError> {
        self.with_mixer(|m| m.set_volume(voice, volume))
    }

    fn volume(&self, voice: VoiceId) -> Result<f32, BackendError> {
        self.with_mixer(|m| m.volume(voice))
    }

    fn set_frequency_ratio(&mut self, voice: VoiceId, ratio: f32) -> Result<(), BackendError> {
        self.with_mixer(|m| m.set_frequency_ratio(voice, ratio))
    }

    fn voice_state(&self, voice: VoiceId) -> Result<VoiceStatus, BackendError> {
        self.with_mixer(|m| m.voice_state(voice))
    }

    fn initialize_3d(&mut self, channel_mask: u32, speed_of_sound: f32) -> Result<(), BackendError> {
        self.with_mixer(|m| m.initialize_3d(channel_mask, speed_of_sound))?;
        MockProbe::count(&self.probe.spatial_inits);
        Ok(())
    }

    fn set_diagnostics_callback(&mut self, cb: Option<DiagnosticsCb>) {
        *self.probe.diagnostics.lock() = cb;
    }
}
