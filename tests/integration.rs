//! Integration tests for sound-device.
//!
//! Note: Tests that require actual audio hardware live next to the CPAL
//! driver and are marked with `#[ignore]`; they should be run manually.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ringbuf::traits::{Consumer, Observer, Producer};
use sound_device::{
    clock_callback, shared, AudioPath, AudioPathKind, BufferSizeObservable, ChannelGroup,
    DeviceConfig, DeviceState, InputBinding, NetworkSoundDevice, OutputBinding, SampleBuffer,
    SoundDevice, SoundDeviceError,
};

const FRAMES: usize = 64;

fn network(outputs: u16, inputs: u16) -> (NetworkSoundDevice, Arc<BufferSizeObservable>) {
    let observable = Arc::new(BufferSizeObservable::new());
    let device = NetworkSoundDevice::new(observable.clone()).with_channels(outputs, inputs);
    (device, observable)
}

fn stereo(value: f32) -> Arc<SampleBuffer> {
    let buffer = Arc::new(SampleBuffer::new(2, FRAMES));
    buffer.fill(value);
    buffer
}

#[test]
fn test_main_and_headphones_land_on_their_channels() {
    let (mut device, _) = network(4, 0);
    device
        .add_output(OutputBinding::new(AudioPathKind::Main, ChannelGroup::stereo(0), stereo(0.25)))
        .unwrap();
    device
        .add_output(OutputBinding::new(
            AudioPathKind::Headphones,
            ChannelGroup::stereo(2),
            stereo(-0.5),
        ))
        .unwrap();
    device.set_frames_per_buffer(FRAMES);
    device.open(true, 2).unwrap();
    let mut stream = device.take_output_stream().unwrap();

    device.read_process(FRAMES);
    device.write_process(FRAMES);

    let mut hw = vec![0.0f32; FRAMES * 4];
    assert_eq!(stream.pop_slice(&mut hw), FRAMES * 4);
    for frame in hw.chunks_exact(4) {
        assert_eq!(frame, [0.25, 0.25, -0.5, -0.5]);
    }
    device.close().unwrap();
}

#[test]
fn test_unbound_channels_are_silent() {
    let (mut device, _) = network(6, 0);
    device
        .add_output(OutputBinding::new(AudioPathKind::Booth, ChannelGroup::stereo(2), stereo(0.75)))
        .unwrap();
    device.set_frames_per_buffer(FRAMES);
    device.open(false, 1).unwrap();
    let mut stream = device.take_output_stream().unwrap();

    device.write_process(FRAMES);

    let mut hw = vec![1.0f32; FRAMES * 6];
    stream.pop_slice(&mut hw);
    for frame in hw.chunks_exact(6) {
        assert_eq!(frame, [0.0, 0.0, 0.75, 0.75, 0.0, 0.0]);
    }
}

#[test]
fn test_overlapping_outputs_are_summed_without_clamping() {
    let (mut device, _) = network(4, 0);
    device
        .add_output(OutputBinding::new(AudioPathKind::Main, ChannelGroup::stereo(0), stereo(0.75)))
        .unwrap();
    device
        .add_output(OutputBinding::new(
            AudioPath::indexed(AudioPathKind::Deck, 0),
            ChannelGroup::stereo(0),
            stereo(0.75),
        ))
        .unwrap();
    device.set_frames_per_buffer(FRAMES);
    device.open(false, 2).unwrap();
    let mut stream = device.take_output_stream().unwrap();

    device.write_process(FRAMES);

    let mut frame = [0.0f32; 4];
    stream.pop_slice(&mut frame);
    assert_eq!(frame, [1.5, 1.5, 0.0, 0.0]);
}

#[test]
fn test_excessive_binding_leaves_registry_unchanged() {
    let (mut device, _) = network(4, 0);
    device
        .add_output(OutputBinding::new(AudioPathKind::Main, ChannelGroup::stereo(0), stereo(0.0)))
        .unwrap();

    let err = device
        .add_output(OutputBinding::new(
            AudioPathKind::Headphones,
            ChannelGroup::stereo(3),
            stereo(0.0),
        ))
        .unwrap_err();

    assert_eq!(
        err,
        SoundDeviceError::ExcessiveOutputChannels {
            path: "Headphones".to_string(),
            requested: 5,
            available: 4,
        }
    );
    assert!(err.is_binding_error());
    assert_eq!(device.outputs().len(), 1);
    assert_eq!(device.outputs()[0].path().kind(), AudioPathKind::Main);
}

#[test]
fn test_input_capacity_counts_total_width() {
    let (mut device, _) = network(0, 2);
    device
        .add_input(InputBinding::new(
            AudioPath::indexed(AudioPathKind::Microphone, 0),
            ChannelGroup::stereo(0),
            stereo(0.0),
        ))
        .unwrap();

    let err = device
        .add_input(InputBinding::new(
            AudioPath::indexed(AudioPathKind::Microphone, 1),
            ChannelGroup::mono(1),
            Arc::new(SampleBuffer::new(1, FRAMES)),
        ))
        .unwrap_err();

    assert!(matches!(err, SoundDeviceError::ExcessiveInputChannels { requested: 3, available: 2, .. }));
    assert_eq!(device.inputs().len(), 1);
}

#[test]
fn test_empty_channel_group_rejected() {
    let (mut device, _) = network(2, 2);
    let err = device
        .add_output(OutputBinding::new(AudioPathKind::Main, ChannelGroup::new(0, 0), stereo(0.0)))
        .unwrap_err();
    assert!(matches!(err, SoundDeviceError::EmptyChannelGroup { .. }));
    assert!(device.outputs().is_empty());
}

#[test]
fn test_callback_frame_count_drives_composition() {
    let (mut device, observable) = network(2, 0);
    let main = Arc::new(SampleBuffer::new(2, 1024));
    let samples: Vec<f32> = (0..2048).map(|i| i as f32).collect();
    main.write_interleaved(0, &samples);
    device
        .add_output(OutputBinding::new(AudioPathKind::Main, ChannelGroup::stereo(0), main))
        .unwrap();
    // Configured for 1024, the callback delivers 100
    device.open(true, 2).unwrap();
    let mut stream = device.take_output_stream().unwrap();

    device.read_process(100);
    device.write_process(100);

    assert_eq!(stream.occupied_len(), 200);
    let mut hw = vec![0.0f32; 200];
    stream.pop_slice(&mut hw);
    assert_eq!(hw, samples[..200].to_vec());
    assert!((observable.current_ms() - 100.0 * 1000.0 / 44100.0).abs() < 1e-9);
}

#[test]
fn test_zero_frames_is_noop() {
    let (mut device, observable) = network(2, 0);
    device
        .add_output(OutputBinding::new(AudioPathKind::Main, ChannelGroup::stereo(0), stereo(0.5)))
        .unwrap();
    device.open(true, 2).unwrap();
    let stream = device.take_output_stream().unwrap();

    device.read_process(0);
    device.write_process(0);

    assert!(stream.is_empty());
    assert_eq!(observable.publications(), 0);
}

#[test]
fn test_buffer_size_published_once_per_change() {
    let (mut device, observable) = network(2, 0);
    device
        .add_output(OutputBinding::new(AudioPathKind::Main, ChannelGroup::stereo(0), stereo(0.0)))
        .unwrap();
    device.open(true, 2).unwrap();

    device.read_process(512);
    device.read_process(512);
    assert_eq!(observable.publications(), 1);

    device.read_process(256);
    assert_eq!(observable.publications(), 2);
    assert_eq!(observable.publishers(), 1);

    drop(device);
    assert_eq!(observable.publishers(), 0);
}

#[tokio::test]
async fn test_buffer_size_subscribers_woken() {
    let (mut device, observable) = network(2, 0);
    let mut rx = observable.subscribe();
    let waiter = tokio::spawn(async move { rx.changed().await });

    device
        .add_output(OutputBinding::new(AudioPathKind::Main, ChannelGroup::stereo(0), stereo(0.0)))
        .unwrap();
    device.set_sample_rate(48000.0);
    device.open(true, 2).unwrap();
    device.read_process(480);

    let ms = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap();
    assert!((ms - 10.0).abs() < 1e-9);
}

#[test]
fn test_clock_device_drives_follower() {
    let (mut clock, observable) = network(2, 0);
    let main = stereo(0.0);
    clock
        .add_output(OutputBinding::new(AudioPathKind::Main, ChannelGroup::stereo(0), main.clone()))
        .unwrap();
    clock.set_frames_per_buffer(FRAMES);

    let mic = Arc::new(SampleBuffer::new(1, FRAMES));
    let mut follower = NetworkSoundDevice::new(observable.clone()).with_channels(0, 1);
    follower
        .add_input(InputBinding::new(AudioPathKind::Microphone, ChannelGroup::mono(0), mic.clone()))
        .unwrap();
    follower.set_frames_per_buffer(FRAMES);

    clock.open(true, 2).unwrap();
    follower.open(false, 2).unwrap();
    let mut out = clock.take_output_stream().unwrap();
    let mut mic_in = follower.take_input_stream().unwrap();
    let follower = shared(follower);

    // The engine monitors the microphone on the main output
    let cycles = Arc::new(AtomicUsize::new(0));
    let engine = {
        let cycles = cycles.clone();
        clock_callback(move |frames| {
            cycles.fetch_add(1, Ordering::Relaxed);
            for frame in 0..frames {
                let sample = mic.get(frame, 0);
                main.set(frame, 0, sample);
                main.set(frame, 1, sample);
            }
        })
    };

    mic_in.push_slice(&[0.3; FRAMES]);
    clock.read_process(FRAMES);
    follower.lock().read_process(FRAMES);
    engine(FRAMES);
    clock.write_process(FRAMES);
    follower.lock().write_process(FRAMES);

    let mut hw = vec![0.0f32; FRAMES * 2];
    assert_eq!(out.pop_slice(&mut hw), FRAMES * 2);
    assert!(hw.iter().all(|&s| s == 0.3));
    assert_eq!(cycles.load(Ordering::Relaxed), 1);
    // Only the clock reference publishes
    assert_eq!(observable.publications(), 1);
    assert_eq!(follower.lock().stats().underruns, 0);
}

#[test]
fn test_follower_underrun_is_silence() {
    let (device, _) = network(0, 2);
    let mut device = device;
    let aux = stereo(0.9);
    device
        .add_input(InputBinding::new(AudioPathKind::Auxiliary, ChannelGroup::stereo(0), aux.clone()))
        .unwrap();
    device.set_frames_per_buffer(FRAMES);
    device.open(false, 2).unwrap();

    device.read_process(FRAMES);

    let mut region = vec![1.0f32; FRAMES * 2];
    aux.read_interleaved(0, &mut region);
    assert!(region.iter().all(|&s| s == 0.0));
    assert_eq!(device.stats().underruns, 1);
    assert_eq!(device.state(), DeviceState::Open);
}

#[test]
fn test_lifecycle() {
    let (mut device, _) = network(2, 2);
    assert_eq!(device.state(), DeviceState::Closed);
    assert!(!device.is_open());

    device
        .add_output(OutputBinding::new(AudioPathKind::Main, ChannelGroup::stereo(0), stereo(0.0)))
        .unwrap();
    device.open(true, 2).unwrap();
    assert!(device.is_open());
    assert!(matches!(
        device.configure(&DeviceConfig::default()),
        Err(SoundDeviceError::DeviceOpen { .. })
    ));

    device.close().unwrap();
    device.close().unwrap();
    assert_eq!(device.state(), DeviceState::Closed);

    device
        .configure(&DeviceConfig::from_latency(48000.0, Duration::from_millis(5)))
        .unwrap();
    assert_eq!(device.frames_per_buffer(), 256);
}

#[test]
fn test_device_equality() {
    let (a, _) = network(2, 2);
    let (b, _) = network(8, 8);
    let a: Box<dyn SoundDevice> = Box::new(a);
    let b: Box<dyn SoundDevice> = Box::new(b);

    assert!(*a == *b);
    assert!(*a == "Network stream");
    assert!(a.descriptor() == "Network stream");
    assert!(*a != "Scarlett 2i2");
}
