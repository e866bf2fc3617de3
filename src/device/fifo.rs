//! FIFO bridge between a device's hardware side and the clock thread.
//!
//! Devices that are not the clock reference cannot compose inside their own
//! callbacks: the logical buffers are only valid while the clock device's
//! callback runs. Instead their hardware callbacks move raw interleaved
//! frames through lock-free SPSC ring buffers, and the clock thread calls
//! `read_process`/`write_process` to compose against those FIFOs.
//!
//! ```text
//! hw input cb ──▶ input FIFO ──▶ read_process  ──▶ logical inputs
//! hw output cb ◀── output FIFO ◀── write_process ◀── logical outputs
//! ```

use std::sync::Arc;

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::device::stats::StatsState;
use crate::routing::BufferComposer;

/// Creates a FIFO holding `buffers` buffers of `frames` frames of `frame_size` channels.
pub(crate) fn fifo_pair(
    frames: usize,
    frame_size: usize,
    buffers: usize,
) -> (HeapProd<f32>, HeapCons<f32>) {
    let capacity = (frames * frame_size * buffers).max(1);
    HeapRb::<f32>::new(capacity).split()
}

/// Hardware output side: drains the FIFO into `data`, filling any shortfall
/// with silence.
pub(crate) fn drain_fifo_into(fifo: &mut HeapCons<f32>, data: &mut [f32], stats: &StatsState) {
    let popped = fifo.pop_slice(data);
    if popped < data.len() {
        data[popped..].fill(0.0);
        stats.record_underrun();
    }
}

/// Hardware input side: pushes `data` into the FIFO, dropping what doesn't fit.
pub(crate) fn fill_fifo_from(fifo: &mut HeapProd<f32>, data: &[f32], stats: &StatsState) {
    // Non-blocking push - drops samples if the clock thread fell behind
    let pushed = fifo.push_slice(data);
    if pushed < data.len() {
        stats.record_overrun();
    }
}

/// Composes logical buffers against FIFOs in scratch-sized chunks.
///
/// The scratch buffer is allocated when the device opens, so processing any
/// frame count allocates nothing.
pub(crate) struct FifoBridge {
    composer: BufferComposer,
    output_frame_size: usize,
    input_frame_size: usize,
    output_fifo: Option<HeapProd<f32>>,
    input_fifo: Option<HeapCons<f32>>,
    scratch: Vec<f32>,
    scratch_frames: usize,
    stats: Arc<StatsState>,
}

impl FifoBridge {
    pub fn new(
        composer: BufferComposer,
        output_frame_size: usize,
        input_frame_size: usize,
        scratch_frames: usize,
        stats: Arc<StatsState>,
    ) -> Self {
        let scratch_frames = scratch_frames.max(1);
        let width = output_frame_size.max(input_frame_size).max(1);
        Self {
            composer,
            output_frame_size,
            input_frame_size,
            output_fifo: None,
            input_fifo: None,
            scratch: vec![0.0; scratch_frames * width],
            scratch_frames,
            stats,
        }
    }

    pub fn with_output_fifo(mut self, fifo: HeapProd<f32>) -> Self {
        self.output_fifo = Some(fifo);
        self
    }

    pub fn with_input_fifo(mut self, fifo: HeapCons<f32>) -> Self {
        self.input_fifo = Some(fifo);
        self
    }

    pub fn composer(&self) -> &BufferComposer {
        &self.composer
    }

    pub fn output_frame_size(&self) -> usize {
        self.output_frame_size
    }

    pub fn input_frame_size(&self) -> usize {
        self.input_frame_size
    }

    /// Fills `frames` frames of every logical input from the input FIFO.
    ///
    /// With no FIFO, or an empty one, the logical region is zero-filled.
    pub fn read_process(&mut self, frames: usize) {
        if frames == 0 || self.composer.inputs().is_empty() {
            return;
        }
        let frame_size = self.input_frame_size;
        let Some(fifo) = self.input_fifo.as_mut() else {
            self.composer.clear_input_buffer(frames, 0);
            return;
        };
        if frame_size == 0 {
            self.composer.clear_input_buffer(frames, 0);
            return;
        }

        let mut underrun = false;
        let mut done = 0;
        while done < frames {
            let chunk = (frames - done).min(self.scratch_frames);
            let len = chunk * frame_size;
            if fifo.occupied_len() == 0 {
                self.composer.clear_input_buffer(chunk, done);
                underrun = true;
            } else {
                let scratch = &mut self.scratch[..len];
                let popped = fifo.pop_slice(scratch);
                if popped < len {
                    scratch[popped..].fill(0.0);
                    underrun = true;
                }
                self.composer
                    .compose_input_buffer(scratch, chunk, done, frame_size);
            }
            done += chunk;
        }
        if underrun {
            self.stats.record_underrun();
        }
    }

    /// Composes `frames` frames of output and pushes them into the output FIFO.
    pub fn write_process(&mut self, frames: usize) {
        if frames == 0 || self.output_frame_size == 0 {
            return;
        }
        let frame_size = self.output_frame_size;
        let Some(fifo) = self.output_fifo.as_mut() else {
            return;
        };

        let mut overrun = false;
        let mut done = 0;
        while done < frames {
            let chunk = (frames - done).min(self.scratch_frames);
            let len = chunk * frame_size;
            let scratch = &mut self.scratch[..len];
            self.composer
                .compose_output_buffer(scratch, chunk, done, frame_size);
            if fifo.push_slice(scratch) < len {
                overrun = true;
            }
            done += chunk;
        }
        if overrun {
            self.stats.record_overrun();
        }
    }
}
