//! Clock-reference callback processing.
//!
//! The clock-reference device is the one whose hardware callback drives the
//! whole system: per callback it publishes the buffer size, fills the
//! logical inputs, runs the engine hook and composes its own output.

use std::sync::Arc;

use crate::device::fifo::FifoBridge;
use crate::device::stats::StatsState;
use crate::notify::BufferSizeNotifier;

/// Hook run on the clock-reference callback thread once per callback.
///
/// Receives the callback's actual frame count. It runs after the logical
/// inputs are filled and before the outputs are composed, so this is where
/// the mixing engine renders into its output buffers and where
/// `read_process`/`write_process` of other devices are driven.
///
/// The hook runs under the audio deadline: it must not block or allocate.
pub type ClockCallback = Arc<dyn Fn(usize) + Send + Sync>;

/// Creates a [`ClockCallback`] from a closure.
///
/// # Example
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use sound_device::clock_callback;
///
/// let frames_seen = Arc::new(AtomicUsize::new(0));
/// let counter = frames_seen.clone();
/// let callback = clock_callback(move |frames| {
///     counter.fetch_add(frames, Ordering::Relaxed);
/// });
///
/// callback(256);
/// assert_eq!(frames_seen.load(Ordering::Relaxed), 256);
/// ```
pub fn clock_callback<F>(f: F) -> ClockCallback
where
    F: Fn(usize) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Callback-side state of a clock-reference hardware device.
pub(crate) struct ClockDriver {
    bridge: FifoBridge,
    notifier: Arc<BufferSizeNotifier>,
    sample_rate: f64,
    callback: Option<ClockCallback>,
    stats: Arc<StatsState>,
}

impl ClockDriver {
    /// `bridge` carries the composer and, when the device has a separate
    /// input stream, the FIFO that stream fills.
    pub fn new(
        bridge: FifoBridge,
        notifier: Arc<BufferSizeNotifier>,
        sample_rate: f64,
        callback: Option<ClockCallback>,
        stats: Arc<StatsState>,
    ) -> Self {
        Self {
            bridge,
            notifier,
            sample_rate,
            callback,
            stats,
        }
    }

    /// Output-driven cycle: the hardware output buffer defines the frame count.
    pub fn process_output(&mut self, hw_output: &mut [f32]) {
        let frame_size = self.bridge.output_frame_size();
        if frame_size == 0 {
            return;
        }
        let frames = hw_output.len() / frame_size;
        self.stats.record_callback();
        self.notifier
            .maybe_update_for_frames(frames, self.sample_rate);

        self.bridge.read_process(frames);
        if let Some(callback) = &self.callback {
            callback(frames);
        }
        self.bridge
            .composer()
            .compose_output_buffer(hw_output, frames, 0, frame_size);
    }

    /// Input-driven cycle for devices without outputs.
    pub fn process_input(&mut self, hw_input: &[f32]) {
        let frame_size = self.bridge.input_frame_size();
        if frame_size == 0 {
            return;
        }
        let frames = hw_input.len() / frame_size;
        self.stats.record_callback();
        self.notifier
            .maybe_update_for_frames(frames, self.sample_rate);

        self.bridge
            .composer()
            .compose_input_buffer(hw_input, frames, 0, frame_size);
        if let Some(callback) = &self.callback {
            callback(frames);
        }
    }
}
