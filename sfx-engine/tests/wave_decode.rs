mod common;

use std::io::{Seek, SeekFrom, Write};

use sfx_engine::{
    AudioChannels, AudioError, AudioFormat, FormatTag, LoopRegion, SoundBuffer, decode, write_wave,
};

fn chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut v = id.to_vec();
    v.extend_from_slice(&(body.len() as u32).to_le_bytes());
    v.extend_from_slice(body);
    v
}

fn riff(chunks: &[Vec<u8>]) -> Vec<u8> {
    let body: Vec<u8> = chunks.concat();
    let mut v = b"RIFF".to_vec();
    v.extend_from_slice(&(body.len() as u32 + 4).to_le_bytes());
    v.extend_from_slice(b"WAVE");
    v.extend_from_slice(&body);
    v
}

fn pcm_fmt(channels: u16, rate: u32) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&1u16.to_le_bytes());
    v.extend_from_slice(&channels.to_le_bytes());
    v.extend_from_slice(&rate.to_le_bytes());
    v.extend_from_slice(&(rate * channels as u32 * 2).to_le_bytes());
    v.extend_from_slice(&(channels * 2).to_le_bytes());
    v.extend_from_slice(&16u16.to_le_bytes());
    v
}

fn smpl(loops: &[(u32, u32)], sampler_data: usize) -> Vec<u8> {
    let mut v = vec![0u8; 36];
    v[28..32].copy_from_slice(&(loops.len() as u32).to_le_bytes());
    v[32..36].copy_from_slice(&(sampler_data as u32).to_le_bytes());
    for &(start, end) in loops {
        v.extend_from_slice(&[0u8; 8]);
        v.extend_from_slice(&start.to_le_bytes());
        v.extend_from_slice(&end.to_le_bytes());
        v.extend_from_slice(&[0u8; 8]);
    }
    v.extend(std::iter::repeat(0xAB).take(sampler_data));
    v
}

#[test]
fn one_second_stereo_example() {
    let payload = common::pcm16(44_100, 2);
    assert_eq!(payload.len(), 176_400);
    let bytes = riff(&[chunk(b"fmt ", &pcm_fmt(2, 44_100)), chunk(b"data", &payload)]);

    let (device, _probe) = common::mock_device();
    let buffer = SoundBuffer::from_stream(&device, &bytes[..]).expect("decode");
    assert_eq!(buffer.play_length(), 44_100);
    assert!((buffer.duration().as_secs_f64() - 1.0).abs() < 1e-6);
    assert_eq!(buffer.format().tag, FormatTag::Pcm);
    assert_eq!(buffer.payload_len(), 176_400);
    assert_eq!((buffer.loop_start(), buffer.loop_length()), (0, 0));
}

#[test]
fn loop_from_first_entry_after_data() {
    let bytes = riff(&[
        chunk(b"fmt ", &pcm_fmt(1, 22_050)),
        chunk(b"data", &common::pcm16(1_000, 1)),
        chunk(b"LIST", b"INFOjunk"),
        chunk(b"smpl", &smpl(&[(100, 499), (10, 20)], 6)),
    ]);
    let wave = decode(&bytes[..]).expect("decode");
    assert_eq!(wave.loop_region, LoopRegion::new(100, 400));
}

#[test]
fn inverted_loop_plays_whole_sound() {
    let bytes = riff(&[
        chunk(b"fmt ", &pcm_fmt(1, 22_050)),
        chunk(b"data", &common::pcm16(1_000, 1)),
        chunk(b"smpl", &smpl(&[(600, 200)], 0)),
    ]);
    let wave = decode(&bytes[..]).expect("decode");
    assert_eq!(wave.loop_region, LoopRegion::new(600, 0));

    let (device, _probe) = common::mock_device();
    let buffer = SoundBuffer::from_stream(&device, &bytes[..]).expect("buffer");
    assert_eq!((buffer.loop_start(), buffer.loop_length()), (0, 0));
}

#[test]
fn play_length_follows_pcm_formula() {
    for &(channels, frames) in &[(1u16, 123usize), (2, 4_410)] {
        let payload = common::pcm16(frames, channels as usize);
        let bytes = riff(&[chunk(b"fmt ", &pcm_fmt(channels, 8_000)), chunk(b"data", &payload)]);
        let wave = decode(&bytes[..]).unwrap();
        let expected = payload.len() / channels as usize / (wave.format.bits_per_sample as usize / 8);
        assert_eq!(wave.format.play_length(wave.payload.len()) as usize, expected);
    }
}

#[test]
fn round_trip_through_temp_file() {
    let format = AudioFormat::pcm16(32_000, AudioChannels::Stereo);
    let payload = common::pcm16(3_200, 2);
    let mut file = tempfile::tempfile().expect("tempfile");
    write_wave(&mut file, &format, &payload, Some(LoopRegion::new(320, 640))).expect("write");
    file.seek(SeekFrom::Start(0)).unwrap();

    let wave = decode(&mut file).expect("decode");
    assert_eq!(wave.format, format);
    assert_eq!(wave.payload, payload);
    assert_eq!(wave.loop_region, LoopRegion::new(320, 640));
}

#[test]
fn buffer_from_path() {
    let format = AudioFormat::pcm16(11_025, AudioChannels::Mono);
    let payload = common::pcm16(11_025, 1);
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    write_wave(file.as_file_mut(), &format, &payload, None).expect("write");
    file.flush().unwrap();

    let (device, _probe) = common::mock_device();
    let buffer = SoundBuffer::from_path(&device, file.path()).expect("load");
    assert_eq!(buffer.play_length(), 11_025);
}

#[test]
fn missing_file_is_io_error() {
    let (device, _probe) = common::mock_device();
    let dir = tempfile::tempdir().unwrap();
    match SoundBuffer::from_path(&device, dir.path().join("nope.wav")) {
        Err(AudioError::Io { kind, .. }) => assert_eq!(kind, std::io::ErrorKind::NotFound),
        other => panic!("expected Io, got {:?}", other),
    }
}

#[test]
fn bad_signatures_are_unsupported() {
    let mut not_riff = riff(&[chunk(b"fmt ", &pcm_fmt(1, 8_000))]);
    not_riff[0..4].copy_from_slice(b"RIFX");
    match decode(&not_riff[..]) {
        Err(AudioError::UnsupportedFormat(_)) => {}
        other => panic!("expected UnsupportedFormat, got {:?}", other),
    }

    let mut not_wave = riff(&[chunk(b"fmt ", &pcm_fmt(1, 8_000))]);
    not_wave[8..12].copy_from_slice(b"AVI ");
    match decode(&not_wave[..]) {
        Err(AudioError::UnsupportedFormat(_)) => {}
        other => panic!("expected UnsupportedFormat, got {:?}", other),
    }

    match decode(&b""[..]) {
        Err(AudioError::UnsupportedFormat(_)) => {}
        other => panic!("expected UnsupportedFormat, got {:?}", other),
    }
}

#[test]
fn unsupported_tag_is_rejected() {
    let mut fmt = pcm_fmt(1, 8_000);
    fmt[0..2].copy_from_slice(&3u16.to_le_bytes());
    let bytes = riff(&[chunk(b"fmt ", &fmt), chunk(b"data", &[0; 4])]);
    match decode(&bytes[..]) {
        Err(AudioError::UnsupportedFormat(_)) => {}
        other => panic!("expected UnsupportedFormat, got {:?}", other),
    }
}

#[test]
fn truncated_data_is_hard_failure() {
    let mut bytes = riff(&[chunk(b"fmt ", &pcm_fmt(1, 8_000)), chunk(b"data", &[0; 64])]);
    bytes.truncate(bytes.len() - 10);
    match decode(&bytes[..]) {
        Err(AudioError::Truncated(_)) => {}
        other => panic!("expected Truncated, got {:?}", other),
    }
}

#[test]
fn truncated_chunk_header_is_hard_failure() {
    let mut bytes = riff(&[chunk(b"fmt ", &pcm_fmt(1, 8_000)), chunk(b"data", &[0; 4])]);
    bytes.extend_from_slice(b"sm");
    match decode(&bytes[..]) {
        Err(AudioError::Truncated(_)) => {}
        other => panic!("expected Truncated, got {:?}", other),
    }
}

#[test]
fn missing_chunks_are_reported() {
    let no_fmt = riff(&[chunk(b"data", &[0; 4])]);
    match decode(&no_fmt[..]) {
        Err(AudioError::MissingChunk("fmt ")) => {}
        other => panic!("expected missing fmt, got {:?}", other),
    }
    let no_data = riff(&[chunk(b"fmt ", &pcm_fmt(1, 8_000))]);
    match decode(&no_data[..]) {
        Err(AudioError::MissingChunk("data")) => {}
        other => panic!("expected missing data, got {:?}", other),
    }
}

#[test]
fn smpl_table_larger_than_chunk_is_malformed() {
    let mut body = smpl(&[(0, 10)], 0);
    body[28..32].copy_from_slice(&4u32.to_le_bytes());
    let bytes = riff(&[
        chunk(b"fmt ", &pcm_fmt(1, 8_000)),
        chunk(b"data", &[0; 40]),
        chunk(b"smpl", &body),
    ]);
    match decode(&bytes[..]) {
        Err(AudioError::MalformedChunk { chunk: "smpl", .. }) => {}
        other => panic!("expected MalformedChunk, got {:?}", other),
    }
}

#[test]
fn zero_channels_is_malformed() {
    let mut fmt = pcm_fmt(1, 8_000);
    fmt[2..4].copy_from_slice(&0u16.to_le_bytes());
    let bytes = riff(&[chunk(b"fmt ", &fmt), chunk(b"data", &[0; 4])]);
    match decode(&bytes[..]) {
        Err(AudioError::MalformedChunk { chunk: "fmt ", .. }) => {}
        other => panic!("expected MalformedChunk, got {:?}", other),
    }
}
