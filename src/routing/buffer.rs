//! Shared sample buffers owned by logical streams.

use std::sync::atomic::{AtomicU32, Ordering};

/// A fixed-size interleaved f32 buffer shared between a logical stream and
/// the device routing it.
///
/// The owner (mixing engine, recorder, ...) keeps an `Arc<SampleBuffer>` and
/// hands a clone to the binding. Samples are stored as atomic bit patterns so
/// both sides can touch the buffer without locks or allocation, which keeps
/// it usable from the audio callback.
///
/// Frame indices wrap modulo [`frames()`](Self::frames), so the buffer can be
/// addressed either linearly or as a ring.
///
/// # Example
///
/// ```
/// use sound_device::SampleBuffer;
///
/// let buffer = SampleBuffer::new(2, 4);
/// buffer.write_interleaved(0, &[0.5, -0.5, 0.25, -0.25]);
/// assert_eq!(buffer.get(1, 0), 0.25);
/// // Frame 5 wraps to frame 1
/// assert_eq!(buffer.get(5, 1), -0.25);
/// ```
pub struct SampleBuffer {
    channels: usize,
    frames: usize,
    samples: Box<[AtomicU32]>,
}

impl SampleBuffer {
    /// Creates a silent buffer of `frames` frames with `channels` channels.
    ///
    /// A channel count of zero is treated as mono.
    pub fn new(channels: usize, frames: usize) -> Self {
        let channels = channels.max(1);
        let samples = (0..channels * frames)
            .map(|_| AtomicU32::new(0.0f32.to_bits()))
            .collect();
        Self {
            channels,
            frames,
            samples,
        }
    }

    /// Number of interleaved channels.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Capacity in frames.
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    fn index(&self, frame: usize, channel: usize) -> Option<usize> {
        if self.frames == 0 || channel >= self.channels {
            return None;
        }
        Some((frame % self.frames) * self.channels + channel)
    }

    /// Reads one sample. Out-of-range channels read as silence.
    #[inline]
    pub fn get(&self, frame: usize, channel: usize) -> f32 {
        self.index(frame, channel)
            .map_or(0.0, |i| f32::from_bits(self.samples[i].load(Ordering::Relaxed)))
    }

    /// Writes one sample. Out-of-range channels are ignored.
    #[inline]
    pub fn set(&self, frame: usize, channel: usize, value: f32) {
        if let Some(i) = self.index(frame, channel) {
            self.samples[i].store(value.to_bits(), Ordering::Relaxed);
        }
    }

    /// Writes interleaved samples starting at `offset` frames.
    ///
    /// A trailing partial frame is written channel by channel.
    pub fn write_interleaved(&self, offset: usize, samples: &[f32]) {
        for (i, &sample) in samples.iter().enumerate() {
            self.set(offset + i / self.channels, i % self.channels, sample);
        }
    }

    /// Reads interleaved samples starting at `offset` frames into `out`.
    pub fn read_interleaved(&self, offset: usize, out: &mut [f32]) {
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.get(offset + i / self.channels, i % self.channels);
        }
    }

    /// Sets every sample to `value`.
    pub fn fill(&self, value: f32) {
        let bits = value.to_bits();
        for sample in self.samples.iter() {
            sample.store(bits, Ordering::Relaxed);
        }
    }

    /// Zeroes `frames` frames starting at `offset`.
    pub fn clear_frames(&self, offset: usize, frames: usize) {
        for frame in offset..offset + frames.min(self.frames) {
            for channel in 0..self.channels {
                self.set(frame, channel, 0.0);
            }
        }
    }
}

impl std::fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("channels", &self.channels)
            .field("frames", &self.frames)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffer_is_silent() {
        let buffer = SampleBuffer::new(2, 8);
        let mut out = [1.0f32; 16];
        buffer.read_interleaved(0, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_zero_channels_is_mono() {
        let buffer = SampleBuffer::new(0, 8);
        assert_eq!(buffer.channels(), 1);
    }

    #[test]
    fn test_wraps_as_ring() {
        let buffer = SampleBuffer::new(1, 4);
        buffer.write_interleaved(3, &[1.0, 2.0, 3.0]);
        assert_eq!(buffer.get(3, 0), 1.0);
        assert_eq!(buffer.get(0, 0), 2.0);
        assert_eq!(buffer.get(1, 0), 3.0);
    }

    #[test]
    fn test_out_of_range_channel() {
        let buffer = SampleBuffer::new(2, 4);
        buffer.set(0, 5, 1.0);
        assert_eq!(buffer.get(0, 5), 0.0);
    }

    #[test]
    fn test_empty_buffer_ignores_access() {
        let buffer = SampleBuffer::new(2, 0);
        buffer.set(3, 0, 1.0);
        assert_eq!(buffer.get(3, 0), 0.0);
        buffer.clear_frames(0, 10);
    }

    #[test]
    fn test_clear_frames() {
        let buffer = SampleBuffer::new(2, 4);
        buffer.fill(0.5);
        buffer.clear_frames(1, 2);

        assert_eq!(buffer.get(0, 0), 0.5);
        assert_eq!(buffer.get(1, 0), 0.0);
        assert_eq!(buffer.get(2, 1), 0.0);
        assert_eq!(buffer.get(3, 1), 0.5);
    }
}
