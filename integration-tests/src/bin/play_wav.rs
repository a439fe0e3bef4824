use std::f32::consts::PI;
use std::path::PathBuf;
use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use sfx_engine::{AudioChannels, AudioDevice, SoundBuffer, SoundState};

/// Play a WAVE file, or a generated tone, through the default output device.
#[derive(Parser)]
struct Args {
    /// WAVE file to play. A sine tone is generated when omitted.
    path: Option<PathBuf>,
    /// Tone frequency in Hz
    #[arg(long, default_value_t = 440.0)]
    freq: f32,
    /// Tone length in seconds
    #[arg(long, default_value_t = 2.0)]
    seconds: f32,
    #[arg(long, default_value_t = 0.5)]
    volume: f32,
    /// Pitch shift in octaves, -1..=1
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pitch: f32,
    /// Stereo pan, -1..=1
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pan: f32,
    /// Route through the shared reverb voice with this mix level
    #[arg(long)]
    reverb: Option<f32>,
}

fn tone(freq: f32, seconds: f32, sample_rate: u32) -> Result<Vec<u8>> {
    let bytes = sfx_engine::sample_size_in_bytes(Duration::from_secs_f32(seconds), sample_rate, AudioChannels::Mono)?;
    let frames = bytes / 2;
    let mut pcm = Vec::with_capacity(bytes);
    for i in 0..frames {
        let s = (2.0 * PI * freq * i as f32 / sample_rate as f32).sin() * 0.3;
        pcm.extend_from_slice(&((s * i16::MAX as f32) as i16).to_le_bytes());
    }
    Ok(pcm)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let device = AudioDevice::get_or_create().context("opening audio device")?;
    let master = device.master();
    println!(
        "Output: {} ({} ch @ {} Hz)",
        device.device_name(),
        master.channels,
        master.sample_rate
    );

    let buffer = match &args.path {
        Some(path) => SoundBuffer::from_path(&device, path).with_context(|| format!("loading {}", path.display()))?,
        None => {
            let rate = 44_100;
            SoundBuffer::from_pcm(&device, &tone(args.freq, args.seconds, rate)?, rate, AudioChannels::Mono)?
        }
    };
    println!(
        "Playing {:?} ({} frames, {:.2}s)",
        buffer.format().tag,
        buffer.play_length(),
        buffer.duration().as_secs_f32()
    );

    let instance = buffer.create_instance()?;
    instance.set_volume(args.volume)?;
    instance.set_pitch(args.pitch)?;
    instance.set_pan(args.pan)?;
    if let Some(mix) = args.reverb {
        instance.set_reverb_mix(mix)?;
    }
    instance.play()?;
    if instance.state() != SoundState::Playing {
        anyhow::bail!("no voice available");
    }

    // Pitch shifts change how long the buffer takes to drain.
    let limit = buffer.duration().mul_f32(2f32.powf(-args.pitch)) + Duration::from_secs(1);
    let started = Instant::now();
    while instance.state() == SoundState::Playing && started.elapsed() < limit {
        sleep(Duration::from_millis(20));
    }
    tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "playback finished");

    drop(instance);
    drop(buffer);
    sfx_engine::shutdown();
    Ok(())
}
