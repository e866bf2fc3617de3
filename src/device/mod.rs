//! Sound device lifecycle and driver bindings.
//!
//! A [`SoundDevice`] pairs a [`DeviceDescriptor`] with a [`ChannelRouting`]
//! registry and a driver that moves frames between hardware callbacks and
//! the logical buffers. Bindings and configuration are only mutable while
//! the device is closed; `open()` snapshots them for the audio thread.
//!
//! ```text
//!            open() ok             close()
//! Closed ──▶ Opening ──▶ Open ──▶ Closing ──▶ Closed
//!               │          │
//!               └──────────┴──▶ Error ──close()──▶ Closed
//! ```

mod clock;
mod descriptor;
mod fifo;
mod hardware;
mod network;
mod stats;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::routing::{ChannelRouting, InputBinding, OutputBinding};
use crate::{DeviceConfig, SoundDeviceError};

pub use clock::{clock_callback, ClockCallback};
pub use descriptor::{DeviceDescriptor, DeviceId, NETWORK_DEVICE_NAME};
pub use hardware::CpalSoundDevice;
pub use network::NetworkSoundDevice;
pub use stats::DeviceStats;

/// Lifecycle state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    /// Not open. Bindings and configuration may change.
    #[default]
    Closed,
    /// `open()` is negotiating with the backend.
    Opening,
    /// Callbacks are running.
    Open,
    /// `close()` is tearing the streams down.
    Closing,
    /// The last open failed, or the backend reported a runtime failure.
    ///
    /// [`SoundDevice::error`] describes the failure. `close()` returns the
    /// device to `Closed`.
    Error,
}

/// A physical or virtual sound device.
///
/// Drivers implement the lifecycle; the registry and configuration
/// operations are provided on top of [`descriptor`](Self::descriptor) and
/// [`routing`](Self::routing).
pub trait SoundDevice: Send {
    /// Identity, capabilities and configuration.
    fn descriptor(&self) -> &DeviceDescriptor;

    /// Mutable descriptor. Only mutate while the device is closed.
    fn descriptor_mut(&mut self) -> &mut DeviceDescriptor;

    /// Bindings registered on this device.
    fn routing(&self) -> &ChannelRouting;

    /// Mutable bindings. Only mutate while the device is closed.
    fn routing_mut(&mut self) -> &mut ChannelRouting;

    /// Opens the device and starts its callbacks.
    ///
    /// `is_clock_reference` selects the one device whose callbacks drive
    /// buffer-size notification and the engine. `sync_buffers` sizes the
    /// FIFOs of the other devices and is clamped to
    /// `1..=MAX_SYNC_BUFFERS`.
    ///
    /// On failure the device is not open, [`state()`](Self::state) reports
    /// `Error` and [`error()`](Self::error) describes why.
    fn open(&mut self, is_clock_reference: bool, sync_buffers: u32) -> Result<(), SoundDeviceError>;

    /// Returns `true` while streams exist, including a faulted open device.
    fn is_open(&self) -> bool;

    /// Stops callbacks and releases backend resources. Idempotent.
    fn close(&mut self) -> Result<(), SoundDeviceError>;

    /// Fills `frames` frames of every logical input from this device.
    ///
    /// Only called while open, from the clock-reference callback thread.
    fn read_process(&mut self, frames: usize);

    /// Composes `frames` frames of every logical output into this device.
    ///
    /// Only called while open, from the clock-reference callback thread.
    fn write_process(&mut self, frames: usize);

    /// Description of the last open or runtime failure.
    fn error(&self) -> Option<String>;

    /// The backend's preferred sample rate in Hz.
    fn default_sample_rate(&self) -> u32;

    /// Current lifecycle state.
    fn state(&self) -> DeviceState;

    /// Callback counters since the device was created.
    fn stats(&self) -> DeviceStats;

    /// The device identifier.
    fn device_id(&self) -> &DeviceId {
        self.descriptor().id()
    }

    /// User-facing label.
    fn display_name(&self) -> &str {
        self.descriptor().display_name()
    }

    /// Audio subsystem name.
    fn host_api(&self) -> &str {
        self.descriptor().host_api()
    }

    /// Hardware output channels.
    fn num_output_channels(&self) -> u16 {
        self.descriptor().num_output_channels()
    }

    /// Hardware input channels.
    fn num_input_channels(&self) -> u16 {
        self.descriptor().num_input_channels()
    }

    /// Configured (or, while open, negotiated) sample rate in Hz.
    fn sample_rate(&self) -> f64 {
        self.descriptor().sample_rate()
    }

    /// Requested frames per buffer.
    fn frames_per_buffer(&self) -> usize {
        self.descriptor().frames_per_buffer()
    }

    /// Returns `DeviceOpen` if the device is open.
    fn ensure_closed(&self) -> Result<(), SoundDeviceError> {
        if self.is_open() {
            return Err(SoundDeviceError::DeviceOpen {
                name: self.device_id().to_string(),
            });
        }
        Ok(())
    }

    /// Sets the sample rate. Ignored with a warning while open.
    fn set_sample_rate(&mut self, sample_rate: f64) {
        if self.is_open() {
            tracing::warn!(device = %self.device_id(), sample_rate, "sample rate change ignored while open");
            return;
        }
        self.descriptor_mut().set_sample_rate(sample_rate);
    }

    /// Sets the requested frames per buffer. Ignored with a warning while open.
    fn set_frames_per_buffer(&mut self, frames_per_buffer: usize) {
        if self.is_open() {
            tracing::warn!(
                device = %self.device_id(),
                frames_per_buffer,
                "buffer size change ignored while open"
            );
            return;
        }
        self.descriptor_mut().set_frames_per_buffer(frames_per_buffer);
    }

    /// Applies the sample rate and frames per buffer of `config`.
    ///
    /// `sync_buffers` is passed to [`open()`](Self::open) instead.
    fn configure(&mut self, config: &DeviceConfig) -> Result<(), SoundDeviceError> {
        if let Err(err) = self.ensure_closed() {
            tracing::warn!(device = %self.device_id(), "configuration refused while open");
            return Err(err);
        }
        let descriptor = self.descriptor_mut();
        descriptor.set_sample_rate(config.sample_rate);
        descriptor.set_frames_per_buffer(config.frames_per_buffer);
        Ok(())
    }

    /// Registers an output binding against this device's output channels.
    ///
    /// A buffer shorter than the configured frames per buffer is accepted
    /// with a warning; its frames wrap within a callback.
    fn add_output(&mut self, binding: OutputBinding) -> Result<(), SoundDeviceError> {
        self.ensure_closed()?;
        if binding.buffer().frames() < self.frames_per_buffer() {
            tracing::warn!(
                device = %self.device_id(),
                path = %binding.path(),
                buffer_frames = binding.buffer().frames(),
                frames_per_buffer = self.frames_per_buffer(),
                "output buffer shorter than the device buffer, frames will wrap"
            );
        }
        let available = self.num_output_channels();
        self.routing_mut().add_output(binding, available)
    }

    /// Registers an input binding against this device's input channels.
    fn add_input(&mut self, binding: InputBinding) -> Result<(), SoundDeviceError> {
        self.ensure_closed()?;
        if binding.buffer().frames() < self.frames_per_buffer() {
            tracing::warn!(
                device = %self.device_id(),
                path = %binding.path(),
                buffer_frames = binding.buffer().frames(),
                frames_per_buffer = self.frames_per_buffer(),
                "input buffer shorter than the device buffer, frames will wrap"
            );
        }
        let available = self.num_input_channels();
        self.routing_mut().add_input(binding, available)
    }

    /// Output bindings in registration order.
    fn outputs(&self) -> &[OutputBinding] {
        self.routing().outputs()
    }

    /// Input bindings in registration order.
    fn inputs(&self) -> &[InputBinding] {
        self.routing().inputs()
    }

    /// Removes all output bindings. Ignored with a warning while open.
    fn clear_outputs(&mut self) {
        if self.is_open() {
            tracing::warn!(device = %self.device_id(), "clear_outputs ignored while open");
            return;
        }
        self.routing_mut().clear_outputs();
    }

    /// Removes all input bindings. Ignored with a warning while open.
    fn clear_inputs(&mut self) {
        if self.is_open() {
            tracing::warn!(device = %self.device_id(), "clear_inputs ignored while open");
            return;
        }
        self.routing_mut().clear_inputs();
    }
}

impl PartialEq for dyn SoundDevice + '_ {
    fn eq(&self, other: &Self) -> bool {
        self.device_id() == other.device_id()
    }
}

impl PartialEq<str> for dyn SoundDevice + '_ {
    fn eq(&self, other: &str) -> bool {
        *self.device_id() == *other
    }
}

impl PartialEq<&str> for dyn SoundDevice + '_ {
    fn eq(&self, other: &&str) -> bool {
        *self.device_id() == **other
    }
}

/// Shared handle to a device, held by the device manager and its users.
pub type SharedSoundDevice = Arc<Mutex<dyn SoundDevice>>;

/// Wraps a device in a [`SharedSoundDevice`].
pub fn shared<D: SoundDevice + 'static>(device: D) -> SharedSoundDevice {
    Arc::new(Mutex::new(device))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::BufferSizeObservable;
    use crate::routing::{AudioPathKind, ChannelGroup, SampleBuffer};

    fn network(outputs: u16, inputs: u16) -> NetworkSoundDevice {
        NetworkSoundDevice::new(Arc::new(BufferSizeObservable::new())).with_channels(outputs, inputs)
    }

    #[test]
    fn test_dyn_equality_by_id() {
        let a: Box<dyn SoundDevice> = Box::new(network(2, 2));
        let b: Box<dyn SoundDevice> = Box::new(network(8, 0));
        assert!(*a == *b);
        assert!(*a == *NETWORK_DEVICE_NAME);
        assert!(*a == "Network stream");
        assert!(*a != "hw:0,0");
    }

    #[test]
    fn test_bindings_rejected_while_open() {
        let mut device = network(2, 0);
        device
            .add_output(OutputBinding::new(
                AudioPathKind::Main,
                ChannelGroup::stereo(0),
                Arc::new(SampleBuffer::new(2, 64)),
            ))
            .unwrap();
        device.open(true, 2).unwrap();

        let err = device
            .add_output(OutputBinding::new(
                AudioPathKind::Booth,
                ChannelGroup::stereo(0),
                Arc::new(SampleBuffer::new(2, 64)),
            ))
            .unwrap_err();
        assert!(matches!(err, SoundDeviceError::DeviceOpen { .. }));
        assert_eq!(device.outputs().len(), 1);

        device.clear_outputs();
        assert_eq!(device.outputs().len(), 1);
        device.close().unwrap();
        device.clear_outputs();
        assert!(device.outputs().is_empty());
    }

    #[test]
    fn test_short_buffers_still_bind() {
        let mut device = network(2, 2);
        device.set_frames_per_buffer(1024);

        device
            .add_output(OutputBinding::new(
                AudioPathKind::Main,
                ChannelGroup::stereo(0),
                Arc::new(SampleBuffer::new(2, 64)),
            ))
            .unwrap();
        device
            .add_input(InputBinding::new(
                AudioPathKind::Microphone,
                ChannelGroup::stereo(0),
                Arc::new(SampleBuffer::new(2, 64)),
            ))
            .unwrap();

        assert_eq!(device.outputs().len(), 1);
        assert_eq!(device.inputs().len(), 1);
    }

    #[test]
    fn test_configure_while_closed() {
        let mut device = network(2, 2);
        device
            .configure(&DeviceConfig {
                sample_rate: 48000.0,
                frames_per_buffer: 256,
                sync_buffers: 2,
            })
            .unwrap();
        assert_eq!(device.sample_rate(), 48000.0);
        assert_eq!(device.frames_per_buffer(), 256);
    }

    #[test]
    fn test_setters_ignored_while_open() {
        let mut device = network(0, 1);
        device
            .add_input(InputBinding::new(
                AudioPathKind::Microphone,
                ChannelGroup::mono(0),
                Arc::new(SampleBuffer::new(1, 64)),
            ))
            .unwrap();
        device.open(false, 2).unwrap();

        device.set_sample_rate(96000.0);
        device.set_frames_per_buffer(64);
        assert_eq!(device.sample_rate(), 44100.0);
        assert_eq!(device.frames_per_buffer(), 1024);
        assert!(matches!(
            device.configure(&DeviceConfig::default()),
            Err(SoundDeviceError::DeviceOpen { .. })
        ));
    }

    #[test]
    fn test_shared_handle() {
        let device = shared(network(2, 2));
        let other = device.clone();
        assert_eq!(other.lock().num_output_channels(), 2);
        assert_eq!(device.lock().state(), DeviceState::Closed);
    }
}
