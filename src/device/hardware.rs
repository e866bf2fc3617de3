//! Hardware sound devices through CPAL.
//!
//! `cpal::Stream` is not `Send`, so each open device owns a dedicated
//! stream thread that builds, plays and finally drops its streams. The
//! device itself only keeps the thread handle, which keeps it `Send` and
//! lets it live behind a [`SharedSoundDevice`](crate::SharedSoundDevice).
//!
//! - **Clock reference**: the output callback (or the input callback of an
//!   input-only device) runs the whole cycle through a [`ClockDriver`]
//! - **Other devices**: callbacks only move raw frames through FIFOs; the
//!   clock thread composes them via `read_process`/`write_process`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, SampleFormat, SampleRate, StreamConfig, SupportedBufferSize,
    SupportedStreamConfigRange,
};
use parking_lot::Mutex;
use ringbuf::traits::Producer;

use crate::config::clamp_sync_buffers;
use crate::device::clock::{ClockCallback, ClockDriver};
use crate::device::fifo::{drain_fifo_into, fifo_pair, fill_fifo_from, FifoBridge};
use crate::device::stats::StatsState;
use crate::device::{DeviceDescriptor, DeviceId, DeviceState, DeviceStats, SoundDevice};
use crate::notify::{BufferSizeNotifier, BufferSizeObservable};
use crate::routing::ChannelRouting;
use crate::SoundDeviceError;

/// Sample rate assumed when the backend reports no default configuration.
const FALLBACK_SAMPLE_RATE: u32 = 44100;

/// Largest callback assumed when the backend chooses its own buffer size.
const DEFAULT_BUFFER_FRAMES_BOUND: usize = 8192;

/// Symmetric i16 max for audio conversion (avoids asymmetric clipping).
const I16_MAX_SYMMETRIC: f32 = i16::MAX as f32;
const I16_MIN_F32: f32 = i16::MIN as f32;
const I16_MAX_F32: f32 = i16::MAX as f32;

type HwOutput = Box<dyn FnMut(&mut [f32]) + Send>;
type HwInput = Box<dyn FnMut(&[f32]) + Send>;

/// A physical sound device reached through CPAL.
pub struct CpalSoundDevice {
    device: cpal::Device,
    descriptor: DeviceDescriptor,
    routing: ChannelRouting,
    notifier: Arc<BufferSizeNotifier>,
    clock_callback: Option<ClockCallback>,
    default_sample_rate: u32,
    state: DeviceState,
    streams: Option<StreamThread>,
    bridge: Option<FifoBridge>,
    stats: Arc<StatsState>,
    errors: ErrorSink,
}

impl CpalSoundDevice {
    /// Wraps a CPAL device, probing its channel counts and default rate.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the device name cannot be read.
    pub fn new(
        device: cpal::Device,
        host_api: impl Into<String>,
        observable: Arc<BufferSizeObservable>,
    ) -> Result<Self, SoundDeviceError> {
        let name = device.name().map_err(SoundDeviceError::backend)?;
        Self::with_id(device, DeviceId::new(name), host_api.into(), observable)
    }

    /// Opens the host's default output device.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if the host has no default output device.
    pub fn default_output(observable: Arc<BufferSizeObservable>) -> Result<Self, SoundDeviceError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| SoundDeviceError::DeviceUnavailable {
                name: "default output".to_string(),
                reason: "host has no default output device".to_string(),
            })?;
        Self::new(device, host.id().name(), observable)
    }

    /// Enumerates every device of the default host.
    ///
    /// Devices whose name cannot be read are skipped. Identifiers carry the
    /// enumeration index to tell apart devices with the same name.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the host cannot enumerate devices.
    pub fn enumerate(observable: &Arc<BufferSizeObservable>) -> Result<Vec<Self>, SoundDeviceError> {
        let host = cpal::default_host();
        let host_api = host.id().name();
        let mut found = Vec::new();
        for (index, device) in host.devices().map_err(SoundDeviceError::backend)?.enumerate() {
            let Ok(name) = device.name() else {
                continue;
            };
            let id = DeviceId::new(name).with_index(index as u32);
            found.push(Self::with_id(device, id, host_api.to_string(), observable.clone())?);
        }
        Ok(found)
    }

    fn with_id(
        device: cpal::Device,
        id: DeviceId,
        host_api: String,
        observable: Arc<BufferSizeObservable>,
    ) -> Result<Self, SoundDeviceError> {
        let outputs = device
            .supported_output_configs()
            .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
            .unwrap_or(0);
        let inputs = device
            .supported_input_configs()
            .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
            .unwrap_or(0);
        let default_sample_rate = device
            .default_output_config()
            .or_else(|_| device.default_input_config())
            .map_or(FALLBACK_SAMPLE_RATE, |c| c.sample_rate().0);

        let display_name = id.name().to_string();
        let mut descriptor =
            DeviceDescriptor::new(id, display_name, host_api).with_channels(outputs, inputs);
        descriptor.set_sample_rate(f64::from(default_sample_rate));

        let errors = ErrorSink {
            device: descriptor.id().to_string(),
            last_error: Arc::new(Mutex::new(None)),
            faulted: Arc::new(AtomicBool::new(false)),
        };
        Ok(Self {
            device,
            descriptor,
            routing: ChannelRouting::new(),
            notifier: Arc::new(BufferSizeNotifier::new(observable)),
            clock_callback: None,
            default_sample_rate,
            state: DeviceState::Closed,
            streams: None,
            bridge: None,
            stats: Arc::new(StatsState::new()),
            errors,
        })
    }

    /// Sets the engine hook run once per callback when this device is the
    /// clock reference. Takes effect at the next `open()`.
    pub fn set_clock_callback(&mut self, callback: ClockCallback) {
        if self.is_open() {
            tracing::warn!(device = %self.descriptor.id(), "clock callback applies from the next open");
        }
        self.clock_callback = Some(callback);
    }

    fn fail(&mut self, err: SoundDeviceError) -> SoundDeviceError {
        tracing::warn!(device = %self.descriptor.id(), error = %err, "failed to open device");
        *self.errors.last_error.lock() = Some(err.to_string());
        self.state = DeviceState::Error;
        err
    }

    fn start(&mut self, is_clock_reference: bool, sync_buffers: u32) -> Result<(), SoundDeviceError> {
        let name = self.descriptor.id().to_string();
        if self.routing.is_empty() {
            return Err(SoundDeviceError::NoChannelsBound { name });
        }

        let sample_rate = self.descriptor.sample_rate().round() as u32;
        let frames = self.descriptor.frames_per_buffer().max(1);
        let requested_frames = u32::try_from(frames).unwrap_or(u32::MAX);

        let output = if self.routing.outputs().is_empty() {
            None
        } else {
            let ranges = self
                .device
                .supported_output_configs()
                .map_err(|e| map_configs_error(&name, e))?;
            let needed = self.routing.output_channels_used();
            Some(
                pick_config(ranges, needed, sample_rate, requested_frames).ok_or_else(|| {
                    SoundDeviceError::UnsupportedConfig {
                        name: name.clone(),
                        reason: format!(
                            "no f32 or i16 output with {needed} channels at {sample_rate} Hz"
                        ),
                    }
                })?,
            )
        };
        let input = if self.routing.inputs().is_empty() {
            None
        } else {
            let ranges = self
                .device
                .supported_input_configs()
                .map_err(|e| map_configs_error(&name, e))?;
            let needed = self.routing.input_channels_used();
            Some(
                pick_config(ranges, needed, sample_rate, requested_frames).ok_or_else(|| {
                    SoundDeviceError::UnsupportedConfig {
                        name: name.clone(),
                        reason: format!(
                            "no f32 or i16 input with {needed} channels at {sample_rate} Hz"
                        ),
                    }
                })?,
            )
        };
        for negotiated in output.iter().chain(input.iter()) {
            if negotiated.config.buffer_size == BufferSize::Default {
                tracing::warn!(
                    device = %name,
                    frames,
                    max_frames = negotiated.max_frames,
                    "fixed buffer size refused, using backend default"
                );
            }
            if negotiated.format != SampleFormat::F32 {
                tracing::debug!(device = %name, format = ?negotiated.format, "converting samples");
            }
        }

        let output_frame_size = output.as_ref().map_or(0, |n| usize::from(n.config.channels));
        let input_frame_size = input.as_ref().map_or(0, |n| usize::from(n.config.channels));
        // FIFOs must hold whole callbacks, which exceed `frames` under a backend default
        let fifo_frames = output
            .iter()
            .chain(input.iter())
            .map(|n| n.max_frames)
            .max()
            .unwrap_or(frames);
        let depth = clamp_sync_buffers(sync_buffers) as usize + 1;
        let mut bridge = FifoBridge::new(
            self.routing.composer(),
            output_frame_size,
            input_frame_size,
            fifo_frames,
            self.stats.clone(),
        );

        let mut output_callback: Option<HwOutput> = None;
        let mut input_callback: Option<HwInput> = None;
        if is_clock_reference {
            if output.is_some() {
                if input.is_some() {
                    let (mut producer, consumer) = fifo_pair(fifo_frames, input_frame_size, depth);
                    bridge = bridge.with_input_fifo(consumer);
                    let stats = self.stats.clone();
                    input_callback = Some(Box::new(move |data: &[f32]| {
                        fill_fifo_from(&mut producer, data, &stats);
                    }));
                }
                let mut driver = self.clock_driver(bridge, sample_rate);
                output_callback = Some(Box::new(move |data: &mut [f32]| driver.process_output(data)));
            } else {
                let mut driver = self.clock_driver(bridge, sample_rate);
                input_callback = Some(Box::new(move |data: &[f32]| driver.process_input(data)));
            }
        } else {
            if output.is_some() {
                let (mut producer, mut consumer) = fifo_pair(fifo_frames, output_frame_size, depth);
                // One buffer of silence so the first hardware callback has data
                producer.push_iter(std::iter::repeat(0.0).take(fifo_frames * output_frame_size));
                bridge = bridge.with_output_fifo(producer);
                let stats = self.stats.clone();
                output_callback = Some(Box::new(move |data: &mut [f32]| {
                    drain_fifo_into(&mut consumer, data, &stats);
                }));
            }
            if input.is_some() {
                let (mut producer, consumer) = fifo_pair(fifo_frames, input_frame_size, depth);
                bridge = bridge.with_input_fifo(consumer);
                let stats = self.stats.clone();
                input_callback = Some(Box::new(move |data: &[f32]| {
                    fill_fifo_from(&mut producer, data, &stats);
                }));
            }
            self.bridge = Some(bridge);
        }

        let request = StreamRequest {
            device: self.device.clone(),
            output: output.zip(output_callback),
            input: input.zip(input_callback),
            errors: self.errors.clone(),
        };
        match StreamThread::spawn(request) {
            Ok(streams) => {
                self.streams = Some(streams);
                self.descriptor.set_sample_rate(f64::from(sample_rate));
                Ok(())
            }
            Err(err) => {
                self.bridge = None;
                Err(err)
            }
        }
    }

    fn clock_driver(&self, bridge: FifoBridge, sample_rate: u32) -> ClockDriver {
        ClockDriver::new(
            bridge,
            self.notifier.clone(),
            f64::from(sample_rate),
            self.clock_callback.clone(),
            self.stats.clone(),
        )
    }
}

impl SoundDevice for CpalSoundDevice {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn descriptor_mut(&mut self) -> &mut DeviceDescriptor {
        &mut self.descriptor
    }

    fn routing(&self) -> &ChannelRouting {
        &self.routing
    }

    fn routing_mut(&mut self) -> &mut ChannelRouting {
        &mut self.routing
    }

    fn open(&mut self, is_clock_reference: bool, sync_buffers: u32) -> Result<(), SoundDeviceError> {
        if self.is_open() {
            return Err(SoundDeviceError::AlreadyOpen {
                name: self.descriptor.id().to_string(),
            });
        }
        self.state = DeviceState::Opening;
        self.errors.faulted.store(false, Ordering::Relaxed);
        if let Err(err) = self.start(is_clock_reference, sync_buffers) {
            return Err(self.fail(err));
        }

        *self.errors.last_error.lock() = None;
        self.state = DeviceState::Open;
        tracing::info!(
            device = %self.descriptor.id(),
            host_api = self.descriptor.host_api(),
            clock_reference = is_clock_reference,
            sample_rate = self.descriptor.sample_rate(),
            frames_per_buffer = self.descriptor.frames_per_buffer(),
            "device opened"
        );
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state == DeviceState::Open
    }

    fn close(&mut self) -> Result<(), SoundDeviceError> {
        match self.state {
            DeviceState::Closed => return Ok(()),
            DeviceState::Error => {
                self.state = DeviceState::Closed;
                return Ok(());
            }
            _ => {}
        }
        self.state = DeviceState::Closing;
        let result = self.streams.take().map_or(Ok(()), |mut streams| streams.stop());
        self.bridge = None;
        self.errors.faulted.store(false, Ordering::Relaxed);
        self.state = DeviceState::Closed;
        tracing::info!(device = %self.descriptor.id(), "device closed");
        result
    }

    fn read_process(&mut self, frames: usize) {
        if let Some(bridge) = self.bridge.as_mut() {
            self.stats.record_callback();
            bridge.read_process(frames);
        }
    }

    fn write_process(&mut self, frames: usize) {
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.write_process(frames);
        }
    }

    fn error(&self) -> Option<String> {
        self.errors.last_error.lock().clone()
    }

    fn default_sample_rate(&self) -> u32 {
        self.default_sample_rate
    }

    fn state(&self) -> DeviceState {
        if self.state == DeviceState::Open && self.errors.faulted.load(Ordering::Relaxed) {
            return DeviceState::Error;
        }
        self.state
    }

    fn stats(&self) -> DeviceStats {
        self.stats.snapshot()
    }
}

impl std::fmt::Debug for CpalSoundDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalSoundDevice")
            .field("descriptor", &self.descriptor)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Records backend errors reported on the audio threads.
#[derive(Clone)]
struct ErrorSink {
    device: String,
    last_error: Arc<Mutex<Option<String>>>,
    faulted: Arc<AtomicBool>,
}

impl ErrorSink {
    fn handler(&self) -> impl FnMut(cpal::StreamError) + Send + 'static {
        let sink = self.clone();
        move |err| {
            tracing::error!(device = %sink.device, error = %err, "audio stream error");
            *sink.last_error.lock() = Some(err.to_string());
            sink.faulted.store(true, Ordering::Relaxed);
        }
    }
}

/// Everything the stream thread needs to build and play the streams.
struct StreamRequest {
    device: cpal::Device,
    output: Option<(Negotiated, HwOutput)>,
    input: Option<(Negotiated, HwInput)>,
    errors: ErrorSink,
}

impl StreamRequest {
    fn build(self) -> Result<Vec<cpal::Stream>, SoundDeviceError> {
        let name = self.errors.device.clone();
        let mut streams = Vec::with_capacity(2);
        if let Some((negotiated, mut callback)) = self.output {
            let config = &negotiated.config;
            let stream = if negotiated.format == SampleFormat::I16 {
                let mut callback = i16_output(callback, negotiated.scratch_samples(), config.channels);
                self.device.build_output_stream(
                    config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| callback(data),
                    self.errors.handler(),
                    None,
                )
            } else {
                self.device.build_output_stream(
                    config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| callback(data),
                    self.errors.handler(),
                    None,
                )
            }
            .map_err(|e| map_build_error(&name, e))?;
            streams.push(stream);
        }
        if let Some((negotiated, mut callback)) = self.input {
            let config = &negotiated.config;
            let stream = if negotiated.format == SampleFormat::I16 {
                let mut callback = i16_input(callback, negotiated.scratch_samples(), config.channels);
                self.device.build_input_stream(
                    config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| callback(data),
                    self.errors.handler(),
                    None,
                )
            } else {
                self.device.build_input_stream(
                    config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| callback(data),
                    self.errors.handler(),
                    None,
                )
            }
            .map_err(|e| map_build_error(&name, e))?;
            streams.push(stream);
        }
        for stream in &streams {
            stream.play().map_err(|e| map_play_error(&name, e))?;
        }
        Ok(streams)
    }
}

/// Thread that owns a device's `cpal::Stream`s until stopped.
struct StreamThread {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StreamThread {
    /// Spawns the thread and waits until its streams are playing.
    fn spawn(request: StreamRequest) -> Result<Self, SoundDeviceError> {
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), SoundDeviceError>>(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread_name = format!("sound-device:{}", request.errors.device);

        let handle = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || match request.build() {
                Ok(streams) => {
                    let _ = ready_tx.send(Ok(()));
                    // Returns on stop or when the device drops its sender
                    let _ = stop_rx.recv();
                    drop(streams);
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })
            .map_err(SoundDeviceError::backend)?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                stop: Some(stop_tx),
                handle: Some(handle),
            }),
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = handle.join();
                Err(SoundDeviceError::BackendError(
                    "stream thread exited before starting".to_string(),
                ))
            }
        }
    }

    fn stop(&mut self) -> Result<(), SoundDeviceError> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| SoundDeviceError::BackendError("stream thread panicked".to_string()))?;
        }
        Ok(())
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// A stream configuration chosen for one direction of a device.
struct Negotiated {
    config: StreamConfig,
    format: SampleFormat,
    /// Upper bound on frames per callback.
    max_frames: usize,
}

impl Negotiated {
    fn scratch_samples(&self) -> usize {
        self.max_frames * usize::from(self.config.channels)
    }
}

/// Picks the narrowest configuration with at least `channels` channels that
/// supports `sample_rate`, preferring f32 over i16.
fn pick_config(
    ranges: impl Iterator<Item = SupportedStreamConfigRange>,
    channels: u16,
    sample_rate: u32,
    frames: u32,
) -> Option<Negotiated> {
    let range = ranges
        .filter(|r| matches!(r.sample_format(), SampleFormat::F32 | SampleFormat::I16))
        .filter(|r| r.channels() >= channels)
        .filter(|r| r.min_sample_rate().0 <= sample_rate && sample_rate <= r.max_sample_rate().0)
        .min_by_key(|r| (r.sample_format() != SampleFormat::F32, r.channels()))?;

    let (buffer_size, max_frames) = buffer_plan(range.buffer_size(), frames);
    Some(Negotiated {
        config: StreamConfig {
            channels: range.channels(),
            sample_rate: SampleRate(sample_rate),
            buffer_size,
        },
        format: range.sample_format(),
        max_frames,
    })
}

/// Requests a fixed buffer of `frames` when the range allows it and falls
/// back to the backend default otherwise.
///
/// Also returns the largest callback to expect. Under a backend default that
/// is the range's maximum, capped at [`DEFAULT_BUFFER_FRAMES_BOUND`], and
/// never less than `frames`.
fn buffer_plan(buffer: &SupportedBufferSize, frames: u32) -> (BufferSize, usize) {
    let requested = frames as usize;
    match buffer {
        SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&frames) => {
            (BufferSize::Fixed(frames), requested)
        }
        SupportedBufferSize::Range { max, .. } => (
            BufferSize::Default,
            (*max as usize).min(DEFAULT_BUFFER_FRAMES_BOUND).max(requested),
        ),
        SupportedBufferSize::Unknown => {
            (BufferSize::Default, DEFAULT_BUFFER_FRAMES_BOUND.max(requested))
        }
    }
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample * I16_MAX_SYMMETRIC).clamp(I16_MIN_F32, I16_MAX_F32) as i16
}

fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / I16_MAX_SYMMETRIC
}

/// Frame-aligned chunk length for a scratch of `scratch_samples`.
fn chunk_len(scratch_samples: usize, channels: u16) -> usize {
    let channels = usize::from(channels).max(1);
    (scratch_samples / channels).max(1) * channels
}

/// Runs an f32 output callback for an i16 stream.
///
/// Larger callbacks than the scratch are processed in frame-aligned chunks.
fn i16_output(
    mut callback: HwOutput,
    scratch_samples: usize,
    channels: u16,
) -> impl FnMut(&mut [i16]) + Send {
    let chunk = chunk_len(scratch_samples, channels);
    let mut scratch = vec![0.0f32; chunk];
    move |data: &mut [i16]| {
        for out in data.chunks_mut(chunk) {
            let scratch = &mut scratch[..out.len()];
            callback(scratch);
            for (sample, &value) in out.iter_mut().zip(scratch.iter()) {
                *sample = f32_to_i16(value);
            }
        }
    }
}

/// Feeds an i16 input stream to an f32 input callback.
fn i16_input(mut callback: HwInput, scratch_samples: usize, channels: u16) -> impl FnMut(&[i16]) + Send {
    let chunk = chunk_len(scratch_samples, channels);
    let mut scratch = vec![0.0f32; chunk];
    move |data: &[i16]| {
        for input in data.chunks(chunk) {
            let scratch = &mut scratch[..input.len()];
            for (value, &sample) in scratch.iter_mut().zip(input) {
                *value = i16_to_f32(sample);
            }
            callback(scratch);
        }
    }
}

fn map_configs_error(name: &str, err: cpal::SupportedStreamConfigsError) -> SoundDeviceError {
    match err {
        cpal::SupportedStreamConfigsError::DeviceNotAvailable => SoundDeviceError::DeviceUnavailable {
            name: name.to_string(),
            reason: err.to_string(),
        },
        cpal::SupportedStreamConfigsError::InvalidArgument => SoundDeviceError::UnsupportedConfig {
            name: name.to_string(),
            reason: err.to_string(),
        },
        other => SoundDeviceError::backend(other),
    }
}

fn map_build_error(name: &str, err: cpal::BuildStreamError) -> SoundDeviceError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => SoundDeviceError::DeviceUnavailable {
            name: name.to_string(),
            reason: err.to_string(),
        },
        cpal::BuildStreamError::StreamConfigNotSupported
        | cpal::BuildStreamError::InvalidArgument => SoundDeviceError::UnsupportedConfig {
            name: name.to_string(),
            reason: err.to_string(),
        },
        other => SoundDeviceError::backend(other),
    }
}

fn map_play_error(name: &str, err: cpal::PlayStreamError) -> SoundDeviceError {
    match err {
        cpal::PlayStreamError::DeviceNotAvailable => SoundDeviceError::DeviceUnavailable {
            name: name.to_string(),
            reason: err.to_string(),
        },
        other => SoundDeviceError::backend(other),
    }
}
