//! # sound-device
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Real-time channel routing between sound device callbacks and the logical
//! audio streams of a mixing engine.
//!
//! `sound-device` keeps a per-device registry of which hardware channels
//! carry which logical stream (main mix, headphones, microphone, ...) and
//! composes interleaved hardware buffers from, and back into, those
//! streams on the audio thread without allocating or locking.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use sound_device::{
//!     AudioPathKind, BufferSizeObservable, ChannelGroup, NetworkSoundDevice, OutputBinding,
//!     SampleBuffer, SoundDevice,
//! };
//! use ringbuf::traits::Consumer;
//!
//! let observable = Arc::new(BufferSizeObservable::new());
//! let mut device = NetworkSoundDevice::new(observable.clone()).with_channels(4, 0);
//!
//! // Logical streams are owned by the engine and shared with the device
//! let main = Arc::new(SampleBuffer::new(2, 1024));
//! let headphones = Arc::new(SampleBuffer::new(2, 1024));
//! device.add_output(OutputBinding::new(AudioPathKind::Main, ChannelGroup::stereo(0), main.clone()))?;
//! device.add_output(OutputBinding::new(AudioPathKind::Headphones, ChannelGroup::stereo(2), headphones))?;
//!
//! device.open(true, 2)?;
//! let mut stream = device.take_output_stream().expect("outputs are bound");
//!
//! // One clock cycle: publish the buffer size, fill inputs, compose outputs
//! main.fill(0.5);
//! device.read_process(256);
//! device.write_process(256);
//!
//! let mut frame = [0.0f32; 4];
//! stream.pop_slice(&mut frame);
//! assert_eq!(frame, [0.5, 0.5, 0.0, 0.0]);
//!
//! device.close()?;
//! # Ok::<(), sound_device::SoundDeviceError>(())
//! ```
//!
//! ## Architecture
//!
//! The crate maintains a strict thread boundary:
//!
//! - **Control thread**: registers bindings, configures and opens devices;
//!   every fallible operation lives here
//! - **Audio thread**: the clock-reference device's callback publishes the
//!   buffer size, fills logical inputs, runs the engine hook and composes
//!   outputs against an immutable routing snapshot
//! - **FIFOs**: lock-free SPSC queues carry frames for devices that are not
//!   the clock reference

// unsafe_code lint is configured in Cargo.toml as "deny"
#![warn(missing_docs)]
// Audio code requires intentional numeric casts between frame and time units
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod config;
pub mod device;
mod error;
mod notify;
pub mod routing;

pub use config::{DeviceConfig, MAX_SYNC_BUFFERS};
pub use device::{
    clock_callback, shared, ClockCallback, CpalSoundDevice, DeviceDescriptor, DeviceId,
    DeviceState, DeviceStats, NetworkSoundDevice, SharedSoundDevice, SoundDevice,
    NETWORK_DEVICE_NAME,
};
pub use error::SoundDeviceError;
pub use notify::{
    BufferSizeNotifier, BufferSizeObservable, BufferSizeReceiver, BUFFER_SIZE_EPSILON_MS,
};
pub use routing::{
    AudioPath, AudioPathKind, BufferComposer, ChannelGroup, ChannelRouting, InputBinding,
    OutputBinding, SampleBuffer,
};
