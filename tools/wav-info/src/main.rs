use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use sfx_engine::{AudioDevice, DecodedWave, SoundBuffer, SoundState};

#[derive(Parser)]
struct Args {
    /// WAVE files to inspect
    #[arg(required = true)]
    paths: Vec<PathBuf>,
    /// Print one JSON object per file
    #[arg(long)]
    json: bool,
    /// Play each file once through the default output device
    #[arg(long)]
    play: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let mut failures = 0;
    for path in &args.paths {
        if let Err(e) = inspect(path, &args) {
            eprintln!("{}: {:#}", path.display(), e);
            failures += 1;
        }
    }
    sfx_engine::shutdown();
    if failures > 0 {
        anyhow::bail!("{} of {} files failed", failures, args.paths.len());
    }
    Ok(())
}

fn inspect(path: &Path, args: &Args) -> Result<()> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let wave = sfx_engine::decode(BufReader::new(file)).context("decoding")?;
    report(path, &wave, args.json);
    if args.play {
        play(&wave)?;
    }
    Ok(())
}

fn report(path: &Path, wave: &DecodedWave, json: bool) {
    let f = &wave.format;
    let frames = f.play_length(wave.payload.len());
    let seconds = frames as f64 / f.sample_rate.max(1) as f64;
    if json {
        let obj = serde_json::json!({
            "path": path.display().to_string(),
            "tag": format!("{:?}", f.tag),
            "channels": f.channels,
            "sample_rate": f.sample_rate,
            "bits_per_sample": f.bits_per_sample,
            "block_align": f.block_align,
            "payload_bytes": wave.payload.len(),
            "play_length": frames,
            "seconds": seconds,
            "loop_start": wave.loop_region.start,
            "loop_length": wave.loop_region.length,
        });
        println!("{}", obj);
        return;
    }
    println!("{}", path.display());
    println!(
        "  format: {:?} {} ch @ {} Hz, {} bits, block align {}",
        f.tag, f.channels, f.sample_rate, f.bits_per_sample, f.block_align
    );
    println!("  payload: {} bytes, {} frames, {:.3}s", wave.payload.len(), frames, seconds);
    if wave.loop_region.is_whole_range() {
        println!("  loop: none");
    } else {
        println!(
            "  loop: start {} length {}",
            wave.loop_region.start, wave.loop_region.length
        );
    }
}

fn play(wave: &DecodedWave) -> Result<()> {
    let device = AudioDevice::get_or_create().context("opening audio device")?;
    let buffer = SoundBuffer::new(&device, wave.format, wave.payload.clone(), wave.loop_region)?;
    let instance = buffer.create_instance()?;
    instance.play()?;
    let limit = buffer.duration() + Duration::from_millis(500);
    let started = Instant::now();
    while instance.state() == SoundState::Playing && started.elapsed() < limit {
        sleep(Duration::from_millis(20));
    }
    tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "played");
    Ok(())
}
