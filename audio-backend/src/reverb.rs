//! Single reverb effect applied on submix voices.
//!
//! A Schroeder network per channel: a short pre-delay, four parallel damped comb
//! filters, then two series allpass filters. Delay lengths are the classic 44.1 kHz
//! tunings scaled to the voice rate and the room size.

use serde::{Deserialize, Serialize};

const COMB_TUNING: [usize; 4] = [1116, 1188, 1277, 1356];
const ALLPASS_TUNING: [usize; 2] = [556, 441];
const STEREO_SPREAD: usize = 23;
const ALLPASS_FEEDBACK: f32 = 0.5;
const TUNING_RATE: f32 = 44_100.0;

/// Reverb preset parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReverbParameters {
    /// Wet share of the output in percent (0..=100).
    pub wet_dry_mix: f32,
    /// Delay before the reverberant tail starts, in milliseconds.
    pub reflections_delay_ms: f32,
    /// Time for the tail to decay by 60 dB, in seconds.
    pub decay_time: f32,
    /// High-frequency damping inside the comb feedback paths (0..=1).
    pub damping: f32,
    /// Scales the delay-line lengths (0..=1).
    pub room_size: f32,
}

impl ReverbParameters {
    /// Medium-sized generic room.
    pub fn generic_room() -> Self {
        Self {
            wet_dry_mix: 100.0,
            reflections_delay_ms: 7.0,
            decay_time: 1.49,
            damping: 0.17,
            room_size: 0.5,
        }
    }
}

impl Default for ReverbParameters {
    fn default() -> Self {
        Self::generic_room()
    }
}

struct DelayLine {
    buf: Vec<f32>,
    idx: usize,
}

impl DelayLine {
    fn new(len: usize) -> Self {
        Self { buf: vec![0.0; len.max(1)], idx: 0 }
    }

    fn read(&self) -> f32 {
        self.buf[self.idx]
    }

    fn write_advance(&mut self, v: f32) {
        self.buf[self.idx] = v;
        self.idx = (self.idx + 1) % self.buf.len();
    }
}

struct Comb {
    line: DelayLine,
    feedback: f32,
    damping: f32,
    filter_store: f32,
}

impl Comb {
    fn process(&mut self, input: f32) -> f32 {
        let out = self.line.read();
        self.filter_store = out * (1.0 - self.damping) + self.filter_store * self.damping;
        self.line.write_advance(input + self.filter_store * self.feedback);
        out
    }
}

struct Allpass {
    line: DelayLine,
}

impl Allpass {
    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.line.read();
        let out = delayed - input;
        self.line.write_advance(input + delayed * ALLPASS_FEEDBACK);
        out
    }
}

struct ChannelNetwork {
    pre_delay: DelayLine,
    combs: Vec<Comb>,
    allpasses: Vec<Allpass>,
}

impl ChannelNetwork {
    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.pre_delay.read();
        self.pre_delay.write_advance(input);
        let mut acc = 0.0;
        for comb in &mut self.combs {
            acc += comb.process(delayed);
        }
        acc *= 0.25;
        for ap in &mut self.allpasses {
            acc = ap.process(acc);
        }
        acc
    }
}

/// Running reverb state for one submix voice.
pub struct Reverb {
    params: ReverbParameters,
    channels: Vec<ChannelNetwork>,
}

impl Reverb {
    pub fn new(params: ReverbParameters, channels: u16, sample_rate: u32) -> Self {
        let rate_scale = sample_rate as f32 / TUNING_RATE;
        let size_scale = 0.5 + params.room_size.clamp(0.0, 1.0);
        let damping = params.damping.clamp(0.0, 1.0);
        let decay = params.decay_time.max(0.01);
        let pre_delay = (params.reflections_delay_ms.max(0.0) / 1000.0 * sample_rate as f32) as usize;

        let networks = (0..channels as usize)
            .map(|ch| {
                let spread = ch * STEREO_SPREAD;
                let combs = COMB_TUNING
                    .iter()
                    .map(|&tuning| {
                        let len = (((tuning + spread) as f32) * rate_scale * size_scale) as usize;
                        let delay_secs = len as f32 / sample_rate as f32;
                        Comb {
                            line: DelayLine::new(len),
                            // -60 dB after `decay` seconds of recirculation.
                            feedback: 10f32.powf(-3.0 * delay_secs / decay),
                            damping,
                            filter_store: 0.0,
                        }
                    })
                    .collect();
                let allpasses = ALLPASS_TUNING
                    .iter()
                    .map(|&tuning| Allpass {
                        line: DelayLine::new((((tuning + spread) as f32) * rate_scale) as usize),
                    })
                    .collect();
                ChannelNetwork {
                    pre_delay: DelayLine::new(pre_delay),
                    combs,
                    allpasses,
                }
            })
            .collect();

        Self { params, channels: networks }
    }

    pub fn params(&self) -> &ReverbParameters {
        &self.params
    }

    /// Process an interleaved buffer in place.
    pub fn process(&mut self, buffer: &mut [f32]) {
        let ch = self.channels.len();
        if ch == 0 {
            return;
        }
        let wet = (self.params.wet_dry_mix / 100.0).clamp(0.0, 1.0);
        for frame in buffer.chunks_exact_mut(ch) {
            for (sample, network) in frame.iter_mut().zip(self.channels.iter_mut()) {
                let dry = *sample;
                let tail = network.process(dry);
                *sample = dry * (1.0 - wet) + tail * wet;
            }
        }
    }
}
