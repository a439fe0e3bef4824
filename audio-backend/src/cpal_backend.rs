use std::sync::Arc;
use std::thread::{self, JoinHandle};

use arc_swap::ArcSwapOption;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, StreamConfig};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use parking_lot::Mutex;

use crate::mixer::Mixer;
use crate::{
    AudioBackend, BackendConfig, BackendError, DeviceDescriptor, DiagnosticEvent, DiagnosticsCb,
    MasterVoiceInfo, ReverbParameters, SubmittedBuffer, VoiceId, VoiceSend, VoiceStatus,
    WaveFormat,
};

/// Worker-thread-backed CPAL backend.
///
/// The public handle is `Send`; the CPAL `Stream` lives on a worker thread spawned
/// when the master voice is created and torn down when it is destroyed. The stream
/// callback renders the shared [`Mixer`].
pub struct CpalAudioBackend {
    config: BackendConfig,
    mixer: Option<Arc<Mutex<Mixer>>>,
    worker: Option<Worker>,
    diagnostics: Arc<ArcSwapOption<DiagnosticsCb>>,
}

struct Worker {
    ctrl_tx: Sender<CtrlMsg>,
    handle: JoinHandle<()>,
}

enum CtrlMsg {
    Shutdown,
}

impl CpalAudioBackend {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        Ok(Self {
            config,
            mixer: None,
            worker: None,
            diagnostics: Arc::new(ArcSwapOption::empty()),
        })
    }

    fn mixer(&self) -> Result<&Arc<Mutex<Mixer>>, BackendError> {
        self.mixer
            .as_ref()
            .ok_or_else(|| BackendError::InvalidCall("master voice has not been created".into()))
    }

    fn shutdown_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.ctrl_tx.send(CtrlMsg::Shutdown).ok();
            if worker.handle.join().is_err() {
                tracing::warn!("cpal worker thread panicked during shutdown");
            }
        }
        self.mixer = None;
    }
}

fn report(diagnostics: &ArcSwapOption<DiagnosticsCb>, event: DiagnosticEvent) {
    if let Some(cb) = diagnostics.load_full() {
        // Diagnostics callbacks never run on the audio thread.
        thread::spawn(move || (*cb)(event));
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mixer: Arc<Mutex<Mixer>>,
    diagnostics: Arc<ArcSwapOption<DiagnosticsCb>>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    let data_cb = move |data: &mut [T], _info: &cpal::OutputCallbackInfo| {
        if scratch.len() != data.len() {
            scratch.resize(data.len(), 0.0);
        }
        mixer.lock().render(&mut scratch);
        for (out, s) in data.iter_mut().zip(scratch.iter()) {
            *out = T::from_sample(s.clamp(-1.0, 1.0));
        }
    };
    let err_cb = move |err: cpal::StreamError| {
        tracing::warn!(error = %err, "cpal stream error");
        let event = match err {
            cpal::StreamError::DeviceNotAvailable => DiagnosticEvent::DeviceRemoved,
            other => DiagnosticEvent::StreamError(other.to_string()),
        };
        report(&diagnostics, event);
    };
    device.build_output_stream(config, data_cb, err_cb, None)
}

fn worker_loop(
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    mixer: Arc<Mutex<Mixer>>,
    diagnostics: Arc<ArcSwapOption<DiagnosticsCb>>,
    ready_tx: Sender<Result<(), BackendError>>,
    ctrl_rx: Receiver<CtrlMsg>,
) {
    let built = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer, diagnostics),
        SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer, diagnostics),
        SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer, diagnostics),
        SampleFormat::I32 => build_stream::<i32>(&device, &config, mixer, diagnostics),
        other => {
            ready_tx
                .send(Err(BackendError::UnsupportedFormat(format!("device sample format {:?}", other))))
                .ok();
            return;
        }
    };
    let stream = match built {
        Ok(s) => s,
        Err(e) => {
            ready_tx.send(Err(BackendError::StreamCreationFailed(e.to_string()))).ok();
            return;
        }
    };
    if let Err(e) = stream.play() {
        ready_tx.send(Err(BackendError::StreamCreationFailed(e.to_string()))).ok();
        return;
    }
    ready_tx.send(Ok(())).ok();

    // Park until the owner shuts us down (or goes away); dropping the stream stops it.
    match ctrl_rx.recv() {
        Ok(CtrlMsg::Shutdown) | Err(_) => {}
    }
    drop(stream);
    tracing::debug!("cpal worker exiting");
}

impl AudioBackend for CpalAudioBackend {
    fn enumerate_devices(&mut self) -> Result<Vec<DeviceDescriptor>, BackendError> {
        let host = cpal::default_host();
        let default_name = host.default_output_device().and_then(|d| d.name().ok());
        let devices = host
            .output_devices()
            .map_err(|e| BackendError::Other(e.to_string()))?;
        let list: Vec<DeviceDescriptor> = devices
            .enumerate()
            .map(|(index, device)| {
                let name = device.name().unwrap_or_else(|_| format!("output device {}", index));
                let is_default_game_device = default_name.as_deref() == Some(name.as_str());
                DeviceDescriptor { index, name, is_default_game_device }
            })
            .collect();
        tracing::debug!(count = list.len(), "enumerated output devices");
        Ok(list)
    }

    fn create_master_voice(&mut self, device_index: usize) -> Result<MasterVoiceInfo, BackendError> {
        if self.worker.is_some() {
            return Err(BackendError::InvalidCall("master voice already exists".into()));
        }
        let host = cpal::default_host();
        let device = host
            .output_devices()
            .map_err(|e| BackendError::Other(e.to_string()))?
            .nth(device_index)
            .ok_or(BackendError::DeviceNotFound)?;
        let supported = device
            .default_output_config()
            .map_err(|e| BackendError::StreamCreationFailed(e.to_string()))?;
        let sample_format = supported.sample_format();
        let mut stream_config = supported.config();
        if let Some(frames) = self.config.buffer_frames {
            stream_config.buffer_size = cpal::BufferSize::Fixed(frames);
        }

        let mixer = Arc::new(Mutex::new(Mixer::new(
            stream_config.channels,
            stream_config.sample_rate.0,
            self.config.max_source_voices,
        )));
        let info = mixer.lock().master_info();

        let (ready_tx, ready_rx) = bounded::<Result<(), BackendError>>(1);
        let (ctrl_tx, ctrl_rx) = unbounded::<CtrlMsg>();
        let mixer_worker = mixer.clone();
        let diagnostics = self.diagnostics.clone();
        let handle = thread::Builder::new()
            .name("sfx-cpal-worker".into())
            .spawn(move || {
                worker_loop(device, stream_config, sample_format, mixer_worker, diagnostics, ready_tx, ctrl_rx)
            })
            .map_err(|e| BackendError::StreamCreationFailed(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                handle.join().ok();
                return Err(e);
            }
            Err(_) => {
                handle.join().ok();
                return Err(BackendError::StreamCreationFailed("worker exited before reporting".into()));
            }
        }

        tracing::info!(
            device_index,
            channels = info.channels,
            sample_rate = info.sample_rate,
            ?sample_format,
            "cpal master voice created"
        );
        self.mixer = Some(mixer);
        self.worker = Some(Worker { ctrl_tx, handle });
        Ok(info)
    }

    fn create_source_voice(&mut self, format: &WaveFormat) -> Result<VoiceId, BackendError> {
        self.mixer()?.lock().create_source_voice(format)
    }

    fn create_submix_voice(&mut self, channels: u16, sample_rate: u32) -> Result<VoiceId, BackendError> {
        self.mixer()?.lock().create_submix_voice(channels, sample_rate)
    }

    fn set_effect_chain(&mut self, voice: VoiceId, reverb: Option<ReverbParameters>) -> Result<(), BackendError> {
        self.mixer()?.lock().set_effect_chain(voice, reverb)
    }

    fn set_output_voices(&mut self, voice: VoiceId, sends: &[VoiceSend]) -> Result<(), BackendError> {
        self.mixer()?.lock().set_output_voices(voice, sends)
    }

    fn set_output_matrix(&mut self, voice: VoiceId, destination: Option<VoiceId>, matrix: &[f32]) -> Result<(), BackendError> {
        self.mixer()?.lock().set_output_matrix(voice, destination, matrix)
    }

    fn destroy_voice(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        let is_master = {
            let mut mixer = self.mixer()?.lock();
            mixer.destroy_voice(voice)?;
            voice == mixer.master_info().voice
        };
        if is_master {
            self.shutdown_worker();
        }
        Ok(())
    }

    fn submit_buffer(&mut self, voice: VoiceId, buffer: SubmittedBuffer) -> Result<(), BackendError> {
        self.mixer()?.lock().submit_buffer(voice, buffer)
    }

    fn flush_source_buffers(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        self.mixer()?.lock().flush_source_buffers(voice)
    }

    fn start_voice(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        self.mixer()?.lock().start_voice(voice)
    }

    fn stop_voice(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        self.mixer()?.lock().stop_voice(voice)
    }

    fn set_volume(&mut self, voice: VoiceId, volume: f32) -> Result<(), BackendError> {
        self.mixer()?.lock().set_volume(voice, volume)
    }

    fn volume(&self, voice: VoiceId) -> Result<f32, BackendError> {
        self.mixer()?.lock().volume(voice)
    }

    fn set_frequency_ratio(&mut self, voice: VoiceId, ratio: f32) -> Result<(), BackendError> {
        self.mixer()?.lock().set_frequency_ratio(voice, ratio)
    }

    fn voice_state(&self, voice: VoiceId) -> Result<VoiceStatus, BackendError> {
        self.mixer()?.lock().voice_state(voice)
    }

    fn initialize_3d(&mut self, channel_mask: u32, speed_of_sound: f32) -> Result<(), BackendError> {
        self.mixer()?.lock().initialize_3d(channel_mask, speed_of_sound)
    }

    fn set_diagnostics_callback(&mut self, cb: Option<DiagnosticsCb>) {
        self.diagnostics.store(cb.map(Arc::new));
    }
}

impl Drop for CpalAudioBackend {
    fn drop(&mut self) {
        self.shutdown_worker();
    }
}
