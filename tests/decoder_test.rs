// Decoding real files through Symphonia
mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use common::{fast_settings, write_wav, TEST_SAMPLE_RATE};
use songstream::audio::decoder::{ChannelLayout, TrackDecoder, DEFAULT_BUFFER_CAPACITY};
use songstream::audio::{ChannelNotifier, MemoryDevice, SymphoniaProvider};
use songstream::{PlaybackError, Player};

#[test]
fn test_wav_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("half_second.wav");
    write_wav(&path, 2, TEST_SAMPLE_RATE / 2, 1000).unwrap();

    let decoder = TrackDecoder::open(&SymphoniaProvider, &path).unwrap();
    let track = decoder.track();
    assert_eq!(track.name(), "half_second");
    assert_eq!(track.sample_rate(), TEST_SAMPLE_RATE);
    assert_eq!(track.layout(), ChannelLayout::Stereo);
    assert_eq!(track.total_samples(), (TEST_SAMPLE_RATE / 2) as u64);
    assert_eq!(track.duration(), Duration::from_millis(500));
}

#[test]
fn test_wav_decodes_every_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mono.wav");
    write_wav(&path, 1, 10_000, -1200).unwrap();

    let mut decoder = TrackDecoder::open(&SymphoniaProvider, &path).unwrap();
    assert_eq!(decoder.track().layout(), ChannelLayout::Mono);

    let mut frames = 0;
    loop {
        let chunk = decoder.fill(DEFAULT_BUFFER_CAPACITY);
        if chunk.is_empty() {
            break;
        }
        assert!(chunk.len() <= DEFAULT_BUFFER_CAPACITY);
        assert!(chunk.samples().iter().all(|s| *s == -1200));
        frames += chunk.frames();
    }

    assert_eq!(frames, 10_000);
    assert!(decoder.is_finished());
    assert_eq!(decoder.cursor().offset, 10_000);
    assert!(decoder.fill(DEFAULT_BUFFER_CAPACITY).is_empty());
}

#[test]
fn test_garbage_file_is_decode_open_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.wav");
    fs::write(&path, b"definitely not audio").unwrap();

    let result = TrackDecoder::open(&SymphoniaProvider, &path);
    assert!(matches!(result, Err(PlaybackError::DecodeOpen { .. })));
}

#[test]
fn test_missing_file_is_decode_open_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = Player::open(
        dir.path().join("gone.ogg"),
        Arc::new(SymphoniaProvider),
        Arc::new(MemoryDevice::new()),
        fast_settings(),
    );
    assert!(matches!(result, Err(PlaybackError::DecodeOpen { .. })));
}

#[test]
fn test_wav_plays_to_the_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    write_wav(&path, 2, 12_345, 500).unwrap();

    let device = Arc::new(MemoryDevice::new());
    let mut player = Player::open(
        &path,
        Arc::new(SymphoniaProvider),
        device.clone(),
        fast_settings(),
    )
    .unwrap();
    let (notifier, finished) = ChannelNotifier::new();
    player.set_notifier(Arc::new(notifier));

    let session = player.play().unwrap();
    assert_eq!(finished.recv_timeout(Duration::from_secs(5)).unwrap(), session);
    assert_eq!(device.uploaded_samples(), 12_345 * 2);

    // Second run decodes the file again from the start
    let session = player.play().unwrap();
    assert_eq!(finished.recv_timeout(Duration::from_secs(5)).unwrap(), session);
    assert_eq!(device.uploaded_samples(), 2 * 12_345 * 2);
    player.stop().unwrap();
}
