//! Virtual device that exchanges frames with a network stream.
//!
//! The device has no hardware callback of its own. Its "hardware" side is a
//! pair of SPSC FIFOs: the broadcast/streaming collaborator takes the
//! consumer end of the output FIFO and the producer end of the input FIFO,
//! and the clock thread calls `read_process`/`write_process` each cycle.
//! When nothing else drives the clock, the caller makes this device the
//! clock reference and paces those calls itself.

use std::sync::Arc;

use ringbuf::{HeapCons, HeapProd};

use crate::config::clamp_sync_buffers;
use crate::device::fifo::{fifo_pair, FifoBridge};
use crate::device::stats::StatsState;
use crate::device::{
    DeviceDescriptor, DeviceId, DeviceState, DeviceStats, SoundDevice, NETWORK_DEVICE_NAME,
};
use crate::notify::{BufferSizeNotifier, BufferSizeObservable};
use crate::routing::ChannelRouting;
use crate::SoundDeviceError;

const NETWORK_HOST_API: &str = "Network";
const NETWORK_SAMPLE_RATE: u32 = 44100;
const DEFAULT_NETWORK_CHANNELS: u16 = 2;

/// The reserved network-stream device.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use sound_device::{
///     AudioPathKind, BufferSizeObservable, ChannelGroup, NetworkSoundDevice, OutputBinding,
///     SampleBuffer, SoundDevice,
/// };
///
/// let observable = Arc::new(BufferSizeObservable::new());
/// let mut device = NetworkSoundDevice::new(observable.clone());
/// let main = Arc::new(SampleBuffer::new(2, 1024));
/// device
///     .add_output(OutputBinding::new(AudioPathKind::Main, ChannelGroup::stereo(0), main))
///     .unwrap();
///
/// device.open(true, 2).unwrap();
/// let _stream = device.take_output_stream().unwrap();
/// device.read_process(1024);
/// device.write_process(1024);
/// assert!(observable.current_ms() > 23.0);
/// device.close().unwrap();
/// ```
pub struct NetworkSoundDevice {
    descriptor: DeviceDescriptor,
    routing: ChannelRouting,
    notifier: BufferSizeNotifier,
    state: DeviceState,
    is_clock_reference: bool,
    bridge: Option<FifoBridge>,
    output_stream: Option<HeapCons<f32>>,
    input_stream: Option<HeapProd<f32>>,
    stats: Arc<StatsState>,
    last_error: Option<String>,
}

impl NetworkSoundDevice {
    /// Creates the device with two output and two input channels.
    pub fn new(observable: Arc<BufferSizeObservable>) -> Self {
        let descriptor = DeviceDescriptor::new(
            DeviceId::network(),
            NETWORK_DEVICE_NAME,
            NETWORK_HOST_API,
        )
        .with_channels(DEFAULT_NETWORK_CHANNELS, DEFAULT_NETWORK_CHANNELS);
        Self {
            descriptor,
            routing: ChannelRouting::new(),
            notifier: BufferSizeNotifier::new(observable),
            state: DeviceState::Closed,
            is_clock_reference: false,
            bridge: None,
            output_stream: None,
            input_stream: None,
            stats: Arc::new(StatsState::new()),
            last_error: None,
        }
    }

    /// Sets the channel counts of the stream.
    #[must_use]
    pub fn with_channels(mut self, outputs: u16, inputs: u16) -> Self {
        self.descriptor = self.descriptor.with_channels(outputs, inputs);
        self
    }

    /// Takes the consumer end of the output FIFO.
    ///
    /// Available once per `open()`, and only if outputs are bound. Frames
    /// are interleaved with [`num_output_channels`](SoundDevice::num_output_channels)
    /// channels.
    pub fn take_output_stream(&mut self) -> Option<HeapCons<f32>> {
        self.output_stream.take()
    }

    /// Takes the producer end of the input FIFO.
    ///
    /// Available once per `open()`, and only if inputs are bound.
    pub fn take_input_stream(&mut self) -> Option<HeapProd<f32>> {
        self.input_stream.take()
    }

    /// Returns `true` if the device was opened as the clock reference.
    pub fn is_clock_reference(&self) -> bool {
        self.is_clock_reference
    }

    fn fail(&mut self, err: SoundDeviceError) -> SoundDeviceError {
        tracing::warn!(device = %self.descriptor.id(), error = %err, "failed to open network device");
        self.last_error = Some(err.to_string());
        self.state = DeviceState::Error;
        err
    }
}

impl SoundDevice for NetworkSoundDevice {
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
        if self.routing.is_empty() {
            let err = SoundDeviceError::NoChannelsBound {
                name: self.descriptor.id().to_string(),
            };
            return Err(self.fail(err));
        }

        let sync_buffers = clamp_sync_buffers(sync_buffers);
        let frames = self.descriptor.frames_per_buffer().max(1);
        let output_frame_size = usize::from(self.descriptor.num_output_channels());
        let input_frame_size = usize::from(self.descriptor.num_input_channels());
        // One extra buffer so a full cycle fits while the other side catches up
        let depth = sync_buffers as usize + 1;

        let mut bridge = FifoBridge::new(
            self.routing.composer(),
            output_frame_size,
            input_frame_size,
            frames,
            self.stats.clone(),
        );
        if !self.routing.outputs().is_empty() {
            let (producer, consumer) = fifo_pair(frames, output_frame_size, depth);
            bridge = bridge.with_output_fifo(producer);
            self.output_stream = Some(consumer);
        }
        if !self.routing.inputs().is_empty() {
            let (producer, consumer) = fifo_pair(frames, input_frame_size, depth);
            bridge = bridge.with_input_fifo(consumer);
            self.input_stream = Some(producer);
        }

        self.bridge = Some(bridge);
        self.is_clock_reference = is_clock_reference;
        self.last_error = None;
        self.state = DeviceState::Open;
        tracing::info!(
            device = %self.descriptor.id(),
            clock_reference = is_clock_reference,
            sync_buffers,
            outputs = self.routing.outputs().len(),
            inputs = self.routing.inputs().len(),
            "network device opened"
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
        self.bridge = None;
        self.output_stream = None;
        self.input_stream = None;
        self.is_clock_reference = false;
        self.state = DeviceState::Closed;
        tracing::info!(device = %self.descriptor.id(), "network device closed");
        Ok(())
    }

    fn read_process(&mut self, frames: usize) {
        let Some(bridge) = self.bridge.as_mut() else {
            return;
        };
        self.stats.record_callback();
        if self.is_clock_reference {
            self.notifier
                .maybe_update_for_frames(frames, self.descriptor.sample_rate());
        }
        bridge.read_process(frames);
    }

    fn write_process(&mut self, frames: usize) {
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.write_process(frames);
        }
    }

    fn error(&self) -> Option<String> {
        self.last_error.clone()
    }

    fn default_sample_rate(&self) -> u32 {
        NETWORK_SAMPLE_RATE
    }

    fn state(&self) -> DeviceState {
        self.state
    }

    fn stats(&self) -> DeviceStats {
        self.stats.snapshot()
    }
}

impl std::fmt::Debug for NetworkSoundDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkSoundDevice")
            .field("descriptor", &self.descriptor)
            .field("state", &self.state)
            .field("is_clock_reference", &self.is_clock_reference)
            .finish_non_exhaustive()
    }
}
