//! Per-callback buffer composition.
//!
//! Everything here runs on the audio callback thread: no allocation, no
//! locking, no I/O, and bounded work proportional to the frame count.
//!
//! All routines take the frame count delivered by the callback. It may
//! differ from the configured frames per buffer and a count of zero is a
//! no-op.
//!
//! Overlapping output bindings are summed with plain f32 addition. Nothing
//! is clamped; the result may exceed `[-1.0, 1.0]`.

use std::sync::Arc;

use crate::routing::{InputBinding, OutputBinding, SampleBuffer};

/// Immutable snapshot of a device's bindings, owned by the audio thread.
///
/// Built by [`ChannelRouting::composer`](crate::ChannelRouting::composer)
/// when the device opens. Cloning is cheap (two `Arc` copies).
#[derive(Debug, Clone, Default)]
pub struct BufferComposer {
    outputs: Arc<[OutputBinding]>,
    inputs: Arc<[InputBinding]>,
}

impl BufferComposer {
    /// Creates a composer over the given bindings.
    pub fn new(outputs: Arc<[OutputBinding]>, inputs: Arc<[InputBinding]>) -> Self {
        Self { outputs, inputs }
    }

    /// Output bindings in registration order.
    pub fn outputs(&self) -> &[OutputBinding] {
        &self.outputs
    }

    /// Input bindings in registration order.
    pub fn inputs(&self) -> &[InputBinding] {
        &self.inputs
    }

    /// Builds `frames` interleaved frames of `frame_size` channels in
    /// `hw_buffer` from the output bindings.
    ///
    /// Each binding contributes the frames of its logical buffer starting at
    /// `read_offset`, summed into its channel slice. Channels no binding
    /// covers end up silent. If `hw_buffer` is shorter than requested, only
    /// the frames that fit are written.
    pub fn compose_output_buffer(
        &self,
        hw_buffer: &mut [f32],
        frames: usize,
        read_offset: usize,
        frame_size: usize,
    ) {
        if frames == 0 || frame_size == 0 {
            return;
        }
        let frames = frames.min(hw_buffer.len() / frame_size);
        let hw_buffer = &mut hw_buffer[..frames * frame_size];
        hw_buffer.fill(0.0);

        for output in self.outputs.iter() {
            accumulate_output(output, hw_buffer, read_offset, frame_size);
        }
    }

    /// Copies the input bindings' channel slices out of `hw_buffer` into their
    /// logical buffers, starting at `write_offset` frames.
    ///
    /// Frames the hardware buffer is too short to supply are written as
    /// silence so the logical region is always fully defined.
    pub fn compose_input_buffer(
        &self,
        hw_buffer: &[f32],
        frames: usize,
        write_offset: usize,
        frame_size: usize,
    ) {
        if frames == 0 {
            return;
        }
        let available = if frame_size == 0 {
            0
        } else {
            frames.min(hw_buffer.len() / frame_size)
        };

        for input in self.inputs.iter() {
            if available > 0 {
                scatter_input(
                    input,
                    &hw_buffer[..available * frame_size],
                    write_offset,
                    frame_size,
                );
            }
            if available < frames {
                input
                    .buffer()
                    .clear_frames(write_offset + available, frames - available);
            }
        }
    }

    /// Zero-fills `frames` frames at `write_offset` in every input binding's
    /// logical buffer.
    ///
    /// Used when no hardware input is available for this callback.
    pub fn clear_input_buffer(&self, frames: usize, write_offset: usize) {
        for input in self.inputs.iter() {
            input.buffer().clear_frames(write_offset, frames);
        }
    }
}

fn accumulate_output(
    output: &OutputBinding,
    hw_buffer: &mut [f32],
    read_offset: usize,
    frame_size: usize,
) {
    let group = output.channel_group();
    let base = usize::from(group.base());
    if base >= frame_size {
        return;
    }
    let declared = usize::from(group.count());
    let width = declared.min(frame_size - base);
    let source: &SampleBuffer = output.buffer();
    let source_channels = source.channels();

    for (frame, hw_frame) in hw_buffer.chunks_exact_mut(frame_size).enumerate() {
        let src_frame = read_offset + frame;
        let slice = &mut hw_frame[base..base + width];

        if declared == 1 && source_channels > 1 {
            // Downmix to a mono hardware channel
            let sum: f32 = (0..source_channels).map(|ch| source.get(src_frame, ch)).sum();
            slice[0] += sum / source_channels as f32;
        } else if source_channels == 1 {
            let sample = source.get(src_frame, 0);
            for slot in slice.iter_mut() {
                *slot += sample;
            }
        } else {
            for (ch, slot) in slice.iter_mut().enumerate().take(source_channels) {
                *slot += source.get(src_frame, ch);
            }
        }
    }
}

fn scatter_input(input: &InputBinding, hw_buffer: &[f32], write_offset: usize, frame_size: usize) {
    let group = input.channel_group();
    let base = usize::from(group.base());
    let declared = usize::from(group.count());
    let width = declared.min(frame_size.saturating_sub(base));
    let target: &SampleBuffer = input.buffer();
    let target_channels = target.channels();

    for (frame, hw_frame) in hw_buffer.chunks_exact(frame_size).enumerate() {
        let dst_frame = write_offset + frame;
        // Channels the hardware frame doesn't carry read as silence
        let hw_sample = |ch: usize| if ch < width { hw_frame[base + ch] } else { 0.0 };

        if target_channels == 1 && declared > 1 {
            let sum: f32 = (0..declared).map(hw_sample).sum();
            target.set(dst_frame, 0, sum / declared as f32);
        } else if declared == 1 {
            let sample = hw_sample(0);
            for ch in 0..target_channels {
                target.set(dst_frame, ch, sample);
            }
        } else {
            for ch in 0..target_channels {
                let sample = if ch < declared { hw_sample(ch) } else { 0.0 };
                target.set(dst_frame, ch, sample);
            }
        }
    }
}
