//! Software voice graph shared by every backend.
//!
//! Source voices read their payload straight from the submitted `Arc<[u8]>`, so a
//! payload stays alive exactly as long as some queued buffer references it. Submix
//! voices accumulate their inputs, run the optional reverb, and feed the master mix.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use crate::reverb::{Reverb, ReverbParameters};
use crate::spatial::{SpatialTables, channel_mask_for};
use crate::{
    BackendError, LOOP_INFINITE, MasterVoiceInfo, SubmittedBuffer, VoiceId, VoiceSend,
    VoiceStatus, WaveEncoding, WaveFormat, adpcm,
};

const MASTER_VOICE: VoiceId = VoiceId(0);
const MAX_FREQUENCY_RATIO: f32 = 1024.0;

#[derive(Clone)]
enum SampleData {
    Pcm8(Arc<[u8]>),
    Pcm16(Arc<[u8]>),
    Decoded(Arc<[i16]>),
}

impl SampleData {
    fn frames(&self, channels: usize) -> usize {
        match self {
            SampleData::Pcm8(d) => d.len() / channels,
            SampleData::Pcm16(d) => d.len() / (2 * channels),
            SampleData::Decoded(d) => d.len() / channels,
        }
    }

    fn sample(&self, frame: usize, channel: usize, channels: usize) -> f32 {
        let i = frame * channels + channel;
        match self {
            // 8-bit PCM is unsigned with a 128 midpoint.
            SampleData::Pcm8(d) => (d[i] as f32 - 128.0) / 128.0,
            SampleData::Pcm16(d) => i16::from_le_bytes([d[2 * i], d[2 * i + 1]]) as f32 / 32768.0,
            SampleData::Decoded(d) => d[i] as f32 / 32768.0,
        }
    }
}

struct QueuedBuffer {
    samples: SampleData,
    play_end: usize,
    loop_begin: usize,
    loop_end: usize,
    loops_remaining: u32,
    cursor: f64,
}

struct SourceVoice {
    format: WaveFormat,
    queue: VecDeque<QueuedBuffer>,
    running: bool,
    volume: f32,
    frequency_ratio: f32,
    sends: Vec<VoiceId>,
    matrices: HashMap<VoiceId, Vec<f32>>,
    frames_played: u64,
}

struct SubmixVoice {
    channels: u16,
    volume: f32,
    input: Vec<f32>,
    reverb: Option<Reverb>,
    sample_rate: u32,
    matrix: Option<Vec<f32>>,
}

/// Gains used when no explicit output matrix has been set.
pub fn default_matrix(src_channels: u16, dst_channels: u16) -> Vec<f32> {
    let (src, dst) = (src_channels as usize, dst_channels as usize);
    let mut m = vec![0.0; src * dst];
    for d in 0..dst {
        for s in 0..src {
            m[d * src + s] = if src == 1 {
                1.0
            } else if dst == 1 {
                1.0 / src as f32
            } else if d == s {
                1.0
            } else {
                0.0
            };
        }
    }
    m
}

fn mix_frame(dest: &mut [f32], frame: &[f32], matrix: &[f32]) {
    let src = frame.len();
    for (d, out) in dest.iter_mut().enumerate() {
        let row = &matrix[d * src..(d + 1) * src];
        *out += row.iter().zip(frame).map(|(g, s)| g * s).sum::<f32>();
    }
}

pub struct Mixer {
    channels: u16,
    sample_rate: u32,
    max_source_voices: usize,
    next_id: u32,
    master_volume: f32,
    master_alive: bool,
    sources: BTreeMap<VoiceId, SourceVoice>,
    submixes: BTreeMap<VoiceId, SubmixVoice>,
    spatial: Option<SpatialTables>,
    frame_scratch: Vec<f32>,
}

impl Mixer {
    pub fn new(channels: u16, sample_rate: u32, max_source_voices: usize) -> Self {
        Self {
            channels: channels.max(1),
            sample_rate,
            max_source_voices,
            next_id: MASTER_VOICE.0 + 1,
            master_volume: 1.0,
            master_alive: true,
            sources: BTreeMap::new(),
            submixes: BTreeMap::new(),
            spatial: None,
            frame_scratch: Vec::new(),
        }
    }

    pub fn master_info(&self) -> MasterVoiceInfo {
        MasterVoiceInfo {
            voice: MASTER_VOICE,
            channels: self.channels,
            sample_rate: self.sample_rate,
            channel_mask: channel_mask_for(self.channels),
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn source_voice_count(&self) -> usize {
        self.sources.len()
    }

    pub fn submix_voice_count(&self) -> usize {
        self.submixes.len()
    }

    pub fn spatial_tables(&self) -> Option<&SpatialTables> {
        self.spatial.as_ref()
    }

    fn allocate_id(&mut self) -> VoiceId {
        let id = VoiceId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1).max(MASTER_VOICE.0 + 1);
        id
    }

    fn source_mut(&mut self, voice: VoiceId) -> Result<&mut SourceVoice, BackendError> {
        self.sources.get_mut(&voice).ok_or(BackendError::UnknownVoice(voice))
    }

    fn source(&self, voice: VoiceId) -> Result<&SourceVoice, BackendError> {
        self.sources.get(&voice).ok_or(BackendError::UnknownVoice(voice))
    }

    fn destination_channels(&self, voice: VoiceId) -> Option<u16> {
        if voice == MASTER_VOICE {
            Some(self.channels)
        } else {
            self.submixes.get(&voice).map(|s| s.channels)
        }
    }

    pub fn create_source_voice(&mut self, format: &WaveFormat) -> Result<VoiceId, BackendError> {
        if format.channels == 0 || format.sample_rate == 0 {
            return Err(BackendError::UnsupportedFormat(format!(
                "{} channels at {} Hz",
                format.channels, format.sample_rate
            )));
        }
        match (format.encoding, format.bits_per_sample) {
            (WaveEncoding::Pcm, 8) | (WaveEncoding::Pcm, 16) => {}
            (WaveEncoding::Adpcm, _) if format.channels <= 2 => {}
            (encoding, bits) => {
                return Err(BackendError::UnsupportedFormat(format!(
                    "{:?} with {} bits per sample and {} channels",
                    encoding, bits, format.channels
                )));
            }
        }
        if self.sources.len() >= self.max_source_voices {
            return Err(BackendError::VoicePoolExhausted { limit: self.max_source_voices });
        }
        let id = self.allocate_id();
        self.sources.insert(
            id,
            SourceVoice {
                format: *format,
                queue: VecDeque::new(),
                running: false,
                volume: 1.0,
                frequency_ratio: 1.0,
                sends: Vec::new(),
                matrices: HashMap::new(),
                frames_played: 0,
            },
        );
        Ok(id)
    }

    pub fn create_submix_voice(&mut self, channels: u16, sample_rate: u32) -> Result<VoiceId, BackendError> {
        if channels == 0 || sample_rate == 0 {
            return Err(BackendError::UnsupportedFormat(format!(
                "submix with {} channels at {} Hz",
                channels, sample_rate
            )));
        }
        let id = self.allocate_id();
        self.submixes.insert(
            id,
            SubmixVoice {
                channels,
                volume: 1.0,
                input: Vec::new(),
                reverb: None,
                sample_rate,
                matrix: None,
            },
        );
        Ok(id)
    }

    pub fn set_effect_chain(&mut self, voice: VoiceId, reverb: Option<ReverbParameters>) -> Result<(), BackendError> {
        let submix = self.submixes.get_mut(&voice).ok_or_else(|| {
            BackendError::InvalidCall(format!("effects are only supported on submix voices, not {}", voice))
        })?;
        submix.reverb = reverb.map(|p| Reverb::new(p, submix.channels, submix.sample_rate));
        Ok(())
    }

    pub fn set_output_voices(&mut self, voice: VoiceId, sends: &[VoiceSend]) -> Result<(), BackendError> {
        for send in sends {
            if self.destination_channels(send.target).is_none() {
                return Err(BackendError::UnknownVoice(send.target));
            }
        }
        let source = self.source_mut(voice)?;
        source.sends = sends.iter().map(|s| s.target).collect();
        source.matrices.retain(|dest, _| sends.iter().any(|s| s.target == *dest));
        Ok(())
    }

    pub fn set_output_matrix(&mut self, voice: VoiceId, destination: Option<VoiceId>, matrix: &[f32]) -> Result<(), BackendError> {
        let dest = destination.unwrap_or(MASTER_VOICE);
        let dst_channels = self
            .destination_channels(dest)
            .ok_or(BackendError::UnknownVoice(dest))?;
        if let Some(submix) = self.submixes.get_mut(&voice) {
            if dest != MASTER_VOICE {
                return Err(BackendError::InvalidCall("submix voices only feed the master voice".into()));
            }
            if matrix.len() != submix.channels as usize * dst_channels as usize {
                return Err(BackendError::InvalidCall(format!(
                    "matrix has {} gains, expected {}",
                    matrix.len(),
                    submix.channels as usize * dst_channels as usize
                )));
            }
            submix.matrix = Some(matrix.to_vec());
            return Ok(());
        }
        let source = self.source_mut(voice)?;
        let expected = source.format.channels as usize * dst_channels as usize;
        if matrix.len() != expected {
            return Err(BackendError::InvalidCall(format!(
                "matrix has {} gains, expected {}",
                matrix.len(),
                expected
            )));
        }
        source.matrices.insert(dest, matrix.to_vec());
        Ok(())
    }

    pub fn destroy_voice(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        if voice == MASTER_VOICE {
            if !self.sources.is_empty() || !self.submixes.is_empty() {
                return Err(BackendError::InvalidCall(
                    "master voice destroyed while other voices are alive".into(),
                ));
            }
            self.master_alive = false;
            return Ok(());
        }
        if self.sources.remove(&voice).is_some() {
            return Ok(());
        }
        if self.submixes.remove(&voice).is_some() {
            for source in self.sources.values_mut() {
                source.sends.retain(|t| *t != voice);
                source.matrices.remove(&voice);
            }
            return Ok(());
        }
        Err(BackendError::UnknownVoice(voice))
    }

    pub fn submit_buffer(&mut self, voice: VoiceId, buffer: SubmittedBuffer) -> Result<(), BackendError> {
        let source = self.source_mut(voice)?;
        let fmt = source.format;
        let channels = fmt.channels as usize;
        let samples = match fmt.encoding {
            WaveEncoding::Pcm if fmt.bits_per_sample == 8 => SampleData::Pcm8(buffer.data),
            WaveEncoding::Pcm => SampleData::Pcm16(buffer.data),
            WaveEncoding::Adpcm => SampleData::Decoded(
                adpcm::decode_ms_adpcm(&buffer.data, fmt.channels, fmt.block_align)?.into(),
            ),
        };
        let total = samples.frames(channels);
        let play_begin = buffer.play_begin as usize;
        let play_end = if buffer.play_length == 0 {
            total
        } else {
            play_begin + buffer.play_length as usize
        };
        if play_begin >= play_end || play_end > total {
            return Err(BackendError::InvalidCall(format!(
                "play region {}..{} outside {} frames",
                play_begin, play_end, total
            )));
        }
        let (loop_begin, loop_end) = if buffer.loop_count == 0 {
            (play_begin, play_end)
        } else {
            let begin = buffer.loop_begin as usize;
            let end = if buffer.loop_length == 0 {
                play_end
            } else {
                begin + buffer.loop_length as usize
            };
            if begin < play_begin || end > play_end || begin >= end {
                return Err(BackendError::InvalidCall(format!(
                    "loop region {}..{} outside play region {}..{}",
                    begin, end, play_begin, play_end
                )));
            }
            (begin, end)
        };
        source.queue.push_back(QueuedBuffer {
            samples,
            play_end,
            loop_begin,
            loop_end,
            loops_remaining: buffer.loop_count,
            cursor: play_begin as f64,
        });
        Ok(())
    }

    pub fn flush_source_buffers(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        self.source_mut(voice)?.queue.clear();
        Ok(())
    }

    pub fn start_voice(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        self.source_mut(voice)?.running = true;
        Ok(())
    }

    pub fn stop_voice(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        self.source_mut(voice)?.running = false;
        Ok(())
    }

    pub fn set_volume(&mut self, voice: VoiceId, volume: f32) -> Result<(), BackendError> {
        if voice == MASTER_VOICE {
            self.master_volume = volume;
            return Ok(());
        }
        if let Some(submix) = self.submixes.get_mut(&voice) {
            submix.volume = volume;
            return Ok(());
        }
        self.source_mut(voice)?.volume = volume;
        Ok(())
    }

    pub fn volume(&self, voice: VoiceId) -> Result<f32, BackendError> {
        if voice == MASTER_VOICE {
            return Ok(self.master_volume);
        }
        if let Some(submix) = self.submixes.get(&voice) {
            return Ok(submix.volume);
        }
        Ok(self.source(voice)?.volume)
    }

    pub fn set_frequency_ratio(&mut self, voice: VoiceId, ratio: f32) -> Result<(), BackendError> {
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(BackendError::InvalidCall(format!("frequency ratio {}", ratio)));
        }
        self.source_mut(voice)?.frequency_ratio = ratio.min(MAX_FREQUENCY_RATIO);
        Ok(())
    }

    pub fn voice_state(&self, voice: VoiceId) -> Result<VoiceStatus, BackendError> {
        let source = self.source(voice)?;
        Ok(VoiceStatus {
            running: source.running,
            buffers_queued: source.queue.len() as u32,
            frames_played: source.frames_played,
        })
    }

    pub fn initialize_3d(&mut self, channel_mask: u32, speed_of_sound: f32) -> Result<(), BackendError> {
        self.spatial = Some(SpatialTables::new(channel_mask, speed_of_sound)?);
        Ok(())
    }

    /// Mix every running voice into `out` (interleaved, master channel count).
    pub fn render(&mut self, out: &mut [f32]) {
        out.iter_mut().for_each(|s| *s = 0.0);
        if !self.master_alive {
            return;
        }
        let ch = self.channels as usize;
        let frames = out.len() / ch;
        let out_rate = self.sample_rate as f64;

        let Mixer { sources, submixes, frame_scratch, .. } = self;

        for submix in submixes.values_mut() {
            let len = frames * submix.channels as usize;
            submix.input.clear();
            submix.input.resize(len, 0.0);
        }

        for source in sources.values_mut() {
            if !source.running {
                continue;
            }
            let src_ch = source.format.channels as usize;
            let step = source.frequency_ratio as f64 * source.format.sample_rate as f64 / out_rate;
            frame_scratch.clear();
            frame_scratch.resize(src_ch, 0.0);

            for f in 0..frames {
                let Some(buf) = source.queue.front_mut() else {
                    break;
                };
                let pos = buf.cursor.floor() as usize;
                let frac = (buf.cursor - pos as f64) as f32;
                let limit = if buf.loops_remaining > 0 { buf.loop_end } else { buf.play_end };
                let next = if pos + 1 < limit {
                    pos + 1
                } else if buf.loops_remaining > 0 {
                    buf.loop_begin
                } else {
                    pos
                };
                for (c, slot) in frame_scratch.iter_mut().enumerate() {
                    let a = buf.samples.sample(pos, c, src_ch);
                    let b = buf.samples.sample(next, c, src_ch);
                    *slot = (a + (b - a) * frac) * source.volume;
                }

                if source.sends.is_empty() {
                    let matrix = source
                        .matrices
                        .entry(MASTER_VOICE)
                        .or_insert_with(|| default_matrix(src_ch as u16, ch as u16));
                    mix_frame(&mut out[f * ch..(f + 1) * ch], frame_scratch, matrix);
                } else {
                    for target in &source.sends {
                        let dst_ch = if *target == MASTER_VOICE {
                            ch
                        } else if let Some(sm) = submixes.get(target) {
                            sm.channels as usize
                        } else {
                            continue;
                        };
                        let matrix = source
                            .matrices
                            .entry(*target)
                            .or_insert_with(|| default_matrix(src_ch as u16, dst_ch as u16));
                        if *target == MASTER_VOICE {
                            mix_frame(&mut out[f * ch..(f + 1) * ch], frame_scratch, matrix);
                        } else if let Some(sm) = submixes.get_mut(target) {
                            mix_frame(&mut sm.input[f * dst_ch..(f + 1) * dst_ch], frame_scratch, matrix);
                        }
                    }
                }

                source.frames_played += 1;
                buf.cursor += step;
                if buf.loops_remaining > 0 && buf.cursor >= buf.loop_end as f64 {
                    let span = (buf.loop_end - buf.loop_begin) as f64;
                    while buf.cursor >= buf.loop_end as f64 {
                        buf.cursor -= span;
                    }
                    if buf.loops_remaining != LOOP_INFINITE {
                        buf.loops_remaining -= 1;
                    }
                } else if buf.cursor >= buf.play_end as f64 {
                    source.queue.pop_front();
                }
            }
        }

        for submix in submixes.values_mut() {
            let sub_ch = submix.channels as usize;
            if let Some(reverb) = submix.reverb.as_mut() {
                reverb.process(&mut submix.input);
            }
            let matrix = submix
                .matrix
                .get_or_insert_with(|| default_matrix(sub_ch as u16, ch as u16));
            for f in 0..frames {
                let frame = &mut submix.input[f * sub_ch..(f + 1) * sub_ch];
                frame.iter_mut().for_each(|s| *s *= submix.volume);
                mix_frame(&mut out[f * ch..(f + 1) * ch], frame, matrix);
            }
        }

        let master_volume = self.master_volume;
        if master_volume != 1.0 {
            out.iter_mut().for_each(|s| *s *= master_volume);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm16_format(channels: u16, sample_rate: u32) -> WaveFormat {
        WaveFormat {
            encoding: WaveEncoding::Pcm,
            channels,
            sample_rate,
            avg_bytes_per_sec: sample_rate * channels as u32 * 2,
            block_align: channels * 2,
            bits_per_sample: 16,
        }
    }

    fn constant_pcm16(frames: usize, channels: usize, value: i16) -> Arc<[u8]> {
        let mut v = Vec::with_capacity(frames * channels * 2);
        for _ in 0..frames * channels {
            v.extend_from_slice(&value.to_le_bytes());
        }
        v.into()
    }

    fn peak(buf: &[f32]) -> f32 {
        buf.iter().fold(0.0f32, |a, b| a.max(b.abs()))
    }

    #[test]
    fn stopped_voice_is_silent() {
        let mut m = Mixer::new(2, 48_000, 8);
        let v = m.create_source_voice(&pcm16_format(1, 48_000)).unwrap();
        m.submit_buffer(v, SubmittedBuffer::once(constant_pcm16(64, 1, 16_384))).unwrap();
        let mut out = vec![0.0; 64];
        m.render(&mut out);
        assert_eq!(peak(&out), 0.0);
    }

    #[test]
    fn volume_scales_output() {
        let mut m = Mixer::new(2, 48_000, 8);
        let v = m.create_source_voice(&pcm16_format(1, 48_000)).unwrap();
        m.submit_buffer(v, SubmittedBuffer::once(constant_pcm16(256, 1, 16_384))).unwrap();
        m.start_voice(v).unwrap();
        let mut loud = vec![0.0; 64];
        m.render(&mut loud);
        m.set_volume(v, 0.25).unwrap();
        let mut quiet = vec![0.0; 64];
        m.render(&mut quiet);
        assert!((peak(&loud) - 0.5).abs() < 1e-3);
        assert!((peak(&quiet) - 0.125).abs() < 1e-3);
    }

    #[test]
    fn output_matrix_biases_channels() {
        let mut m = Mixer::new(2, 48_000, 8);
        let v = m.create_source_voice(&pcm16_format(1, 48_000)).unwrap();
        m.submit_buffer(v, SubmittedBuffer::once(constant_pcm16(64, 1, 16_384))).unwrap();
        m.set_output_matrix(v, None, &[0.0, 1.0]).unwrap();
        m.start_voice(v).unwrap();
        let mut out = vec![0.0; 32];
        m.render(&mut out);
        let left: f32 = out.iter().step_by(2).map(|s| s.abs()).sum();
        let right: f32 = out.iter().skip(1).step_by(2).map(|s| s.abs()).sum();
        assert_eq!(left, 0.0);
        assert!(right > 0.0);
    }

    #[test]
    fn non_looping_buffer_drains() {
        let mut m = Mixer::new(1, 8_000, 8);
        let v = m.create_source_voice(&pcm16_format(1, 8_000)).unwrap();
        m.submit_buffer(v, SubmittedBuffer::once(constant_pcm16(10, 1, 1000))).unwrap();
        m.start_voice(v).unwrap();
        let mut out = vec![0.0; 16];
        m.render(&mut out);
        let st = m.voice_state(v).unwrap();
        assert_eq!(st.buffers_queued, 0);
        assert!(st.running);
        assert_eq!(st.frames_played, 10);
        assert!(out[12].abs() < 1e-9);
    }

    #[test]
    fn infinite_loop_keeps_buffer_queued() {
        let mut m = Mixer::new(1, 8_000, 8);
        let v = m.create_source_voice(&pcm16_format(1, 8_000)).unwrap();
        let mut buf = SubmittedBuffer::once(constant_pcm16(10, 1, 1000));
        buf.loop_begin = 2;
        buf.loop_length = 4;
        buf.loop_count = LOOP_INFINITE;
        m.submit_buffer(v, buf).unwrap();
        m.start_voice(v).unwrap();
        let mut out = vec![0.0; 100];
        m.render(&mut out);
        assert_eq!(m.voice_state(v).unwrap().buffers_queued, 1);
        assert!(out.iter().all(|s| s.abs() > 0.0));
    }

    #[test]
    fn voice_pool_limit_enforced() {
        let mut m = Mixer::new(2, 48_000, 2);
        let fmt = pcm16_format(2, 44_100);
        let a = m.create_source_voice(&fmt).unwrap();
        m.create_source_voice(&fmt).unwrap();
        assert_eq!(
            m.create_source_voice(&fmt),
            Err(BackendError::VoicePoolExhausted { limit: 2 })
        );
        m.destroy_voice(a).unwrap();
        assert!(m.create_source_voice(&fmt).is_ok());
    }

    #[test]
    fn destroying_twice_reports_unknown_voice() {
        let mut m = Mixer::new(2, 48_000, 4);
        let v = m.create_source_voice(&pcm16_format(1, 22_050)).unwrap();
        m.destroy_voice(v).unwrap();
        assert_eq!(m.destroy_voice(v), Err(BackendError::UnknownVoice(v)));
    }

    #[test]
    fn reverb_send_reaches_master() {
        let mut m = Mixer::new(2, 8_000, 4);
        let sub = m.create_submix_voice(2, 8_000).unwrap();
        let params = ReverbParameters { reflections_delay_ms: 0.0, ..ReverbParameters::generic_room() };
        m.set_effect_chain(sub, Some(params)).unwrap();
        let v = m.create_source_voice(&pcm16_format(1, 8_000)).unwrap();
        m.set_output_voices(v, &[VoiceSend { target: MASTER_VOICE }, VoiceSend { target: sub }]).unwrap();
        m.set_output_matrix(v, None, &[0.0, 0.0]).unwrap();
        m.submit_buffer(v, SubmittedBuffer::once(constant_pcm16(400, 1, 16_384))).unwrap();
        m.start_voice(v).unwrap();
        let mut out = vec![0.0; 2 * 2000];
        m.render(&mut out);
        // Dry path is muted, so anything audible came through the reverb.
        assert!(peak(&out) > 0.0);
    }

    #[test]
    fn master_volume_applies_last() {
        let mut m = Mixer::new(1, 8_000, 4);
        let v = m.create_source_voice(&pcm16_format(1, 8_000)).unwrap();
        m.submit_buffer(v, SubmittedBuffer::once(constant_pcm16(32, 1, 16_384))).unwrap();
        m.start_voice(v).unwrap();
        m.set_volume(MASTER_VOICE, 0.5).unwrap();
        let mut out = vec![0.0; 16];
        m.render(&mut out);
        assert!((peak(&out) - 0.25).abs() < 1e-3);
    }

    #[test]
    fn bad_play_region_rejected() {
        let mut m = Mixer::new(2, 48_000, 4);
        let v = m.create_source_voice(&pcm16_format(1, 48_000)).unwrap();
        let mut buf = SubmittedBuffer::once(constant_pcm16(10, 1, 0));
        buf.play_begin = 4;
        buf.play_length = 10;
        assert!(matches!(m.submit_buffer(v, buf), Err(BackendError::InvalidCall(_))));
    }
}
