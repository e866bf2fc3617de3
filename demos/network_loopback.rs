//! Network loopback example.
//!
//! Drives the network-stream device as the clock reference: a timer paces
//! the callbacks, the "engine" renders a sine into the main mix, and a
//! consumer task drains the stream the way a broadcaster would.
//!
//! Run with: RUST_LOG=info cargo run --example network_loopback

use std::f32::consts::TAU;
use std::sync::Arc;
use std::time::Duration;

use ringbuf::traits::{Consumer, Observer};
use sound_device::{
    clock_callback, AudioPathKind, BufferSizeObservable, ChannelGroup, DeviceConfig,
    NetworkSoundDevice, OutputBinding, SampleBuffer, SoundDevice,
};
use tracing_subscriber::EnvFilter;

const TONE_HZ: f32 = 440.0;
const RUN_FOR: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = DeviceConfig::from_latency(48000.0, Duration::from_millis(10));
    let observable = Arc::new(BufferSizeObservable::new());

    // Latency display: logs whenever the clock's buffer size changes
    let mut buffer_size = observable.subscribe();
    tokio::spawn(async move {
        loop {
            let ms = buffer_size.changed().await;
            tracing::info!(buffer_ms = ms, "buffer size changed");
        }
    });

    let main_mix = Arc::new(SampleBuffer::new(2, config.frames_per_buffer));
    let mut device = NetworkSoundDevice::new(observable.clone());
    device.configure(&config)?;
    device.add_output(OutputBinding::new(
        AudioPathKind::Main,
        ChannelGroup::stereo(0),
        main_mix.clone(),
    ))?;
    device.open(true, config.sync_buffers)?;
    let mut stream = device
        .take_output_stream()
        .ok_or("network device has no output stream")?;

    // The engine: a sine on both channels of the main mix
    let sample_rate = config.sample_rate as f32;
    let tone = {
        let main_mix = main_mix.clone();
        let phase = parking_lot::Mutex::new(0.0f32);
        clock_callback(move |frames| {
            let mut phase = phase.lock();
            for frame in 0..frames {
                let sample = (*phase * TAU).sin() * 0.25;
                main_mix.set(frame, 0, sample);
                main_mix.set(frame, 1, sample);
                *phase = (*phase + TONE_HZ / sample_rate).fract();
            }
        })
    };

    // The broadcaster: drains the stream and reports its level
    let consumer = tokio::spawn(async move {
        let mut scratch = vec![0.0f32; 4096];
        let mut total = 0usize;
        let mut peak = 0.0f32;
        // Drain faster than the clock so the FIFO never fills
        let mut ticker = tokio::time::interval(Duration::from_millis(5));
        let deadline = tokio::time::Instant::now() + RUN_FOR;
        while tokio::time::Instant::now() < deadline {
            ticker.tick().await;
            while !stream.is_empty() {
                let popped = stream.pop_slice(&mut scratch);
                peak = scratch[..popped].iter().fold(peak, |p, s| p.max(s.abs()));
                total += popped;
            }
        }
        (total, peak)
    });

    let mut clock = tokio::time::interval(config.buffer_duration());
    let cycles = (RUN_FOR.as_secs_f64() / config.buffer_duration().as_secs_f64()) as usize;
    for _ in 0..cycles {
        clock.tick().await;
        device.read_process(config.frames_per_buffer);
        tone(config.frames_per_buffer);
        device.write_process(config.frames_per_buffer);
    }
    tracing::debug!(cycles, "clock stopped");

    let (samples, peak) = consumer.await?;
    let stats = device.stats();
    tracing::info!(
        samples,
        peak,
        callbacks = stats.callbacks,
        overruns = stats.overruns,
        "stream drained"
    );
    device.close()?;
    Ok(())
}
