#![cfg(feature = "real-audio-tests")]

// Exercises the real output device. Run locally with
// `cargo test -p integration-tests --features real-audio-tests -- --ignored`.

use std::thread::sleep;
use std::time::{Duration, Instant};

use serial_test::serial;
use sfx_engine::{AudioChannels, AudioDevice, SoundBuffer, SoundState};

fn tone(frames: usize, rate: u32) -> Vec<u8> {
    let mut v = Vec::with_capacity(frames * 2);
    for i in 0..frames {
        let s = (2.0 * std::f32::consts::PI * 660.0 * i as f32 / rate as f32).sin() * 0.2;
        v.extend_from_slice(&((s * i16::MAX as f32) as i16).to_le_bytes());
    }
    v
}

#[test]
#[ignore]
#[serial]
fn tone_plays_to_completion_on_default_device() {
    let device = AudioDevice::get_or_create().expect("audio device");
    let buffer = SoundBuffer::from_pcm(&device, &tone(22_050, 44_100), 44_100, AudioChannels::Mono).unwrap();
    let instance = buffer.create_instance().unwrap();
    instance.set_volume(0.5).unwrap();
    instance.play().unwrap();
    assert_eq!(instance.state(), SoundState::Playing);

    let started = Instant::now();
    while instance.state() == SoundState::Playing && started.elapsed() < Duration::from_secs(3) {
        sleep(Duration::from_millis(10));
    }
    assert_eq!(instance.state(), SoundState::Stopped);

    // Fire-and-forget with reverb and a pitch shift.
    assert!(buffer.play_with(0.4, 0.5, -0.5).unwrap());
    let looped = buffer.create_instance().unwrap();
    looped.set_reverb_mix(0.8).unwrap();
    looped.set_is_looped(true).unwrap();
    looped.play().unwrap();
    sleep(Duration::from_millis(600));
    buffer.dispose();
    assert!(looped.is_disposed());
}
