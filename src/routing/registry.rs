//! Channel-binding registry.
//!
//! Holds the ordered output and input bindings of one device. The registry
//! performs no locking: it is only mutated while the device is closed, and
//! `open()` hands the audio thread an immutable snapshot via
//! [`ChannelRouting::composer`].

use std::sync::Arc;

use crate::routing::{AudioPath, BufferComposer, ChannelGroup, SampleBuffer};
use crate::SoundDeviceError;

/// Places a logical output stream on a range of hardware output channels.
#[derive(Debug, Clone)]
pub struct OutputBinding {
    path: AudioPath,
    channels: ChannelGroup,
    buffer: Arc<SampleBuffer>,
}

impl OutputBinding {
    /// Binds `path`, whose samples live in `buffer`, to `channels`.
    ///
    /// Frame indices into `buffer` wrap modulo its capacity, so a callback
    /// longer than the buffer repeats its contents within one cycle. Size
    /// the buffer to at least the device's frames per buffer.
    pub fn new(path: impl Into<AudioPath>, channels: ChannelGroup, buffer: Arc<SampleBuffer>) -> Self {
        Self {
            path: path.into(),
            channels,
            buffer,
        }
    }

    /// The logical stream.
    pub fn path(&self) -> AudioPath {
        self.path
    }

    /// Hardware channels the stream is placed on.
    pub fn channel_group(&self) -> ChannelGroup {
        self.channels
    }

    /// The stream's sample buffer.
    pub fn buffer(&self) -> &Arc<SampleBuffer> {
        &self.buffer
    }
}

/// Places a range of hardware input channels into a logical input stream.
#[derive(Debug, Clone)]
pub struct InputBinding {
    path: AudioPath,
    channels: ChannelGroup,
    buffer: Arc<SampleBuffer>,
}

impl InputBinding {
    /// Binds hardware `channels` to `path`, whose samples live in `buffer`.
    ///
    /// Frame indices into `buffer` wrap modulo its capacity, so a callback
    /// longer than the buffer overwrites its own start. Size the buffer to
    /// at least the device's frames per buffer.
    pub fn new(path: impl Into<AudioPath>, channels: ChannelGroup, buffer: Arc<SampleBuffer>) -> Self {
        Self {
            path: path.into(),
            channels,
            buffer,
        }
    }

    /// The logical stream.
    pub fn path(&self) -> AudioPath {
        self.path
    }

    /// Hardware channels read into the stream.
    pub fn channel_group(&self) -> ChannelGroup {
        self.channels
    }

    /// The stream's sample buffer.
    pub fn buffer(&self) -> &Arc<SampleBuffer> {
        &self.buffer
    }
}

/// Ordered output and input bindings of one device.
///
/// Insertion order is preserved and is the iteration order during
/// composition. It implies no priority: outputs are additive.
#[derive(Debug, Clone, Default)]
pub struct ChannelRouting {
    outputs: Vec<OutputBinding>,
    inputs: Vec<InputBinding>,
}

impl ChannelRouting {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an output binding if it fits in `available` output channels.
    ///
    /// Both the binding's channel range and the total width of all output
    /// bindings must fit. On error the registry is unchanged.
    ///
    /// # Errors
    ///
    /// Returns `EmptyChannelGroup` or `ExcessiveOutputChannels`.
    pub fn add_output(
        &mut self,
        binding: OutputBinding,
        available: u16,
    ) -> Result<(), SoundDeviceError> {
        let in_use = self.outputs.iter().map(|o| u32::from(o.channels.count())).sum();
        check_capacity(binding.channels, in_use, available).map_err(|error| {
            match error {
                CapacityError::Empty => SoundDeviceError::EmptyChannelGroup {
                    path: binding.path.to_string(),
                },
                CapacityError::Exceeded(requested) => SoundDeviceError::ExcessiveOutputChannels {
                    path: binding.path.to_string(),
                    requested,
                    available,
                },
            }
        })?;
        self.outputs.push(binding);
        Ok(())
    }

    /// Appends an input binding if it fits in `available` input channels.
    ///
    /// # Errors
    ///
    /// Returns `EmptyChannelGroup` or `ExcessiveInputChannels`.
    pub fn add_input(
        &mut self,
        binding: InputBinding,
        available: u16,
    ) -> Result<(), SoundDeviceError> {
        let in_use = self.inputs.iter().map(|i| u32::from(i.channels.count())).sum();
        check_capacity(binding.channels, in_use, available).map_err(|error| {
            match error {
                CapacityError::Empty => SoundDeviceError::EmptyChannelGroup {
                    path: binding.path.to_string(),
                },
                CapacityError::Exceeded(requested) => SoundDeviceError::ExcessiveInputChannels {
                    path: binding.path.to_string(),
                    requested,
                    available,
                },
            }
        })?;
        self.inputs.push(binding);
        Ok(())
    }

    /// Removes all output bindings.
    pub fn clear_outputs(&mut self) {
        self.outputs.clear();
    }

    /// Removes all input bindings.
    pub fn clear_inputs(&mut self) {
        self.inputs.clear();
    }

    /// Output bindings in registration order.
    pub fn outputs(&self) -> &[OutputBinding] {
        &self.outputs
    }

    /// Input bindings in registration order.
    pub fn inputs(&self) -> &[InputBinding] {
        &self.inputs
    }

    /// Number of hardware output channels the bindings reach.
    ///
    /// This is the channel count a driver opens its output stream with.
    pub fn output_channels_used(&self) -> u16 {
        self.outputs
            .iter()
            .map(|o| o.channels.end())
            .max()
            .unwrap_or(0)
    }

    /// Number of hardware input channels the bindings reach.
    pub fn input_channels_used(&self) -> u16 {
        self.inputs
            .iter()
            .map(|i| i.channels.end())
            .max()
            .unwrap_or(0)
    }

    /// Returns `true` if neither outputs nor inputs are bound.
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty() && self.inputs.is_empty()
    }

    /// Takes an immutable snapshot for the audio thread.
    pub fn composer(&self) -> BufferComposer {
        BufferComposer::new(
            Arc::from(self.outputs.as_slice()),
            Arc::from(self.inputs.as_slice()),
        )
    }
}

enum CapacityError {
    Empty,
    Exceeded(u16),
}

/// Checks both the channel range and the summed width against `available`.
fn check_capacity(group: ChannelGroup, width_in_use: u32, available: u16) -> Result<(), CapacityError> {
    if group.is_empty() {
        return Err(CapacityError::Empty);
    }
    let total = width_in_use + u32::from(group.count());
    let end = u32::from(group.base()) + u32::from(group.count());
    let requested = total.max(end);
    if requested > u32::from(available) {
        return Err(CapacityError::Exceeded(
            u16::try_from(requested).unwrap_or(u16::MAX),
        ));
    }
    Ok(())
}
