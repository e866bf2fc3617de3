//! Buffer-size change notification.
//!
//! The clock-reference device publishes the duration of the buffers its
//! callback actually receives. Timing-sensitive consumers (waveform
//! visualizers, latency displays) subscribe to a [`BufferSizeObservable`]
//! that is passed into each device at construction.
//!
//! Publishing runs on the audio thread. The value and its version live in
//! atomics, so nothing a subscriber does can hold up a publish; async
//! subscribers are woken through [`tokio::sync::Notify`].

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Changes smaller than this (in milliseconds) are treated as float noise.
pub const BUFFER_SIZE_EPSILON_MS: f64 = 1e-6;

#[derive(Debug)]
struct Shared {
    value_bits: AtomicU64,
    /// Doubles as the version subscribers compare against.
    publications: AtomicU64,
    publishers: AtomicUsize,
    notify: Notify,
}

impl Shared {
    fn current_ms(&self) -> f64 {
        f64::from_bits(self.value_bits.load(Ordering::Acquire))
    }

    fn version(&self) -> u64 {
        self.publications.load(Ordering::Acquire)
    }
}

/// Process-wide observable holding the current buffer duration in ms.
///
/// Create one per process (or per device manager) and share it with every
/// device through an `Arc`. Consumers call [`subscribe()`](Self::subscribe)
/// to be woken on changes, or poll [`current_ms()`](Self::current_ms).
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use sound_device::{BufferSizeNotifier, BufferSizeObservable};
///
/// let observable = Arc::new(BufferSizeObservable::new());
/// let notifier = BufferSizeNotifier::new(observable.clone());
///
/// notifier.maybe_update_buffer_size(23.2);
/// notifier.maybe_update_buffer_size(23.2);
/// assert_eq!(observable.publications(), 1);
/// assert_eq!(observable.current_ms(), 23.2);
/// ```
#[derive(Debug)]
pub struct BufferSizeObservable {
    shared: Arc<Shared>,
}

impl Default for BufferSizeObservable {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferSizeObservable {
    /// Creates an observable with an initial value of 0 ms.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                value_bits: AtomicU64::new(0.0f64.to_bits()),
                publications: AtomicU64::new(0),
                publishers: AtomicUsize::new(0),
                notify: Notify::new(),
            }),
        }
    }

    /// Returns a receiver that starts out having seen the current value.
    pub fn subscribe(&self) -> BufferSizeReceiver {
        BufferSizeReceiver {
            seen_version: self.shared.version(),
            shared: self.shared.clone(),
        }
    }

    /// The most recently published buffer duration in ms.
    pub fn current_ms(&self) -> f64 {
        self.shared.current_ms()
    }

    /// Total number of values published.
    pub fn publications(&self) -> u64 {
        self.shared.version()
    }

    /// Number of live notifiers registered with this observable.
    pub fn publishers(&self) -> usize {
        self.shared.publishers.load(Ordering::Relaxed)
    }

    fn publish(&self, buffer_size_ms: f64) {
        self.shared
            .value_bits
            .store(buffer_size_ms.to_bits(), Ordering::Release);
        self.shared.publications.fetch_add(1, Ordering::AcqRel);
        // Wakes only futures already registered; never waits on them
        self.shared.notify.notify_waiters();
    }
}

/// Subscriber side of a [`BufferSizeObservable`].
///
/// Tracks which publication it last saw. Reading never blocks the
/// publisher, and a subscriber that falls behind only sees the newest value.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use sound_device::{BufferSizeNotifier, BufferSizeObservable};
///
/// let observable = Arc::new(BufferSizeObservable::new());
/// let mut rx = observable.subscribe();
/// let notifier = BufferSizeNotifier::new(observable.clone());
///
/// notifier.maybe_update_buffer_size(5.8);
/// assert!(rx.has_changed());
/// assert_eq!(rx.update(), 5.8);
/// assert!(!rx.has_changed());
/// ```
#[derive(Debug, Clone)]
pub struct BufferSizeReceiver {
    shared: Arc<Shared>,
    seen_version: u64,
}

impl BufferSizeReceiver {
    /// The most recently published buffer duration in ms.
    pub fn current_ms(&self) -> f64 {
        self.shared.current_ms()
    }

    /// Returns `true` if a value was published since the last update.
    pub fn has_changed(&self) -> bool {
        self.shared.version() != self.seen_version
    }

    /// Marks the current value as seen and returns it.
    pub fn update(&mut self) -> f64 {
        self.seen_version = self.shared.version();
        self.shared.current_ms()
    }

    /// Waits for a publication newer than the last one seen, marks it seen
    /// and returns its value.
    pub async fn changed(&mut self) -> f64 {
        let shared = Arc::clone(&self.shared);
        loop {
            // Registered before the check so a publish in between still wakes us
            let notified = shared.notify.notified();
            if self.has_changed() {
                return self.update();
            }
            notified.await;
        }
    }
}

/// Per-device publisher that suppresses duplicate buffer-size values.
///
/// Registers with the observable when created and deregisters on drop. Only
/// the clock-reference device calls
/// [`maybe_update_buffer_size`](Self::maybe_update_buffer_size), once at the
/// start of each callback and before any composition.
#[derive(Debug)]
pub struct BufferSizeNotifier {
    observable: Arc<BufferSizeObservable>,
    last_buffer_size_ms: AtomicU64,
}

impl BufferSizeNotifier {
    /// Registers a new publisher with `observable`.
    pub fn new(observable: Arc<BufferSizeObservable>) -> Self {
        observable.shared.publishers.fetch_add(1, Ordering::Relaxed);
        Self {
            observable,
            last_buffer_size_ms: AtomicU64::new(0.0f64.to_bits()),
        }
    }

    /// Publishes `buffer_size_ms` if it differs from the last published value.
    ///
    /// Returns `true` if a notification was sent. Non-finite values are
    /// ignored.
    pub fn maybe_update_buffer_size(&self, buffer_size_ms: f64) -> bool {
        if !buffer_size_ms.is_finite() {
            return false;
        }
        let last = f64::from_bits(self.last_buffer_size_ms.load(Ordering::Relaxed));
        if (buffer_size_ms - last).abs() <= BUFFER_SIZE_EPSILON_MS {
            return false;
        }
        self.last_buffer_size_ms
            .store(buffer_size_ms.to_bits(), Ordering::Relaxed);
        self.observable.publish(buffer_size_ms);
        true
    }

    /// Converts a callback's actual frame count to ms and publishes it if changed.
    pub fn maybe_update_for_frames(&self, frames: usize, sample_rate: f64) -> bool {
        if frames == 0 || sample_rate <= 0.0 {
            return false;
        }
        self.maybe_update_buffer_size(frames as f64 * 1000.0 / sample_rate)
    }

    /// The last value this notifier published (0 before the first).
    pub fn last_buffer_size_ms(&self) -> f64 {
        f64::from_bits(self.last_buffer_size_ms.load(Ordering::Relaxed))
    }

    /// The observable this notifier publishes to.
    pub fn observable(&self) -> &Arc<BufferSizeObservable> {
        &self.observable
    }
}

impl Drop for BufferSizeNotifier {
    fn drop(&mut self) {
        self.observable
            .shared
            .publishers
            .fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_same_value_publishes_once() {
        let observable = Arc::new(BufferSizeObservable::new());
        let notifier = BufferSizeNotifier::new(observable.clone());

        assert!(notifier.maybe_update_buffer_size(10.0));
        assert!(!notifier.maybe_update_buffer_size(10.0));
        assert_eq!(observable.publications(), 1);
    }

    #[test]
    fn test_distinct_values_publish_twice() {
        let observable = Arc::new(BufferSizeObservable::new());
        let notifier = BufferSizeNotifier::new(observable.clone());

        notifier.maybe_update_buffer_size(10.0);
        notifier.maybe_update_buffer_size(5.0);

        assert_eq!(observable.publications(), 2);
        assert_eq!(observable.current_ms(), 5.0);
        assert_eq!(notifier.last_buffer_size_ms(), 5.0);
    }

    #[test]
    fn test_float_noise_suppressed() {
        let observable = Arc::new(BufferSizeObservable::new());
        let notifier = BufferSizeNotifier::new(observable.clone());

        notifier.maybe_update_buffer_size(23.219_954);
        notifier.maybe_update_buffer_size(23.219_954 + 1e-9);
        assert_eq!(observable.publications(), 1);
    }

    #[test]
    fn test_non_finite_ignored() {
        let observable = Arc::new(BufferSizeObservable::new());
        let notifier = BufferSizeNotifier::new(observable.clone());

        assert!(!notifier.maybe_update_buffer_size(f64::NAN));
        assert!(!notifier.maybe_update_buffer_size(f64::INFINITY));
        assert_eq!(observable.publications(), 0);
    }

    #[test]
    fn test_update_for_frames() {
        let observable = Arc::new(BufferSizeObservable::new());
        let notifier = BufferSizeNotifier::new(observable.clone());

        assert!(notifier.maybe_update_for_frames(480, 48000.0));
        assert!((observable.current_ms() - 10.0).abs() < 1e-9);
        assert!(!notifier.maybe_update_for_frames(0, 48000.0));
        assert!(!notifier.maybe_update_for_frames(480, 0.0));
    }

    #[test]
    fn test_registration_lifecycle() {
        let observable = Arc::new(BufferSizeObservable::new());
        assert_eq!(observable.publishers(), 0);

        let a = BufferSizeNotifier::new(observable.clone());
        let b = BufferSizeNotifier::new(observable.clone());
        assert_eq!(observable.publishers(), 2);

        drop(a);
        assert_eq!(observable.publishers(), 1);
        drop(b);
        assert_eq!(observable.publishers(), 0);
    }

    #[test]
    fn test_subscriber_sees_latest() {
        let observable = Arc::new(BufferSizeObservable::new());
        let mut rx = observable.subscribe();
        let notifier = BufferSizeNotifier::new(observable.clone());

        notifier.maybe_update_buffer_size(2.9);
        notifier.maybe_update_buffer_size(5.8);
        assert!(rx.has_changed());
        assert_eq!(rx.update(), 5.8);
        assert!(!rx.has_changed());
    }

    #[test]
    fn test_publish_does_not_wait_for_busy_subscriber() {
        let observable = Arc::new(BufferSizeObservable::new());
        let notifier = BufferSizeNotifier::new(observable.clone());
        let mut rx = observable.subscribe();

        // The subscriber reads the value, then stays busy with it
        let (reading_tx, reading_rx) = std::sync::mpsc::channel();
        let reader = std::thread::spawn(move || {
            let seen = rx.update();
            reading_tx.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(300));
            (seen, rx)
        });
        reading_rx.recv().unwrap();

        let start = Instant::now();
        assert!(notifier.maybe_update_buffer_size(10.0));
        assert!(start.elapsed() < Duration::from_millis(50));

        let (seen, rx) = reader.join().unwrap();
        assert_eq!(seen, 0.0);
        assert!(rx.has_changed());
        assert_eq!(rx.current_ms(), 10.0);
    }

    #[tokio::test]
    async fn test_changed_wakes_pending_subscriber() {
        let observable = Arc::new(BufferSizeObservable::new());
        let notifier = BufferSizeNotifier::new(observable.clone());
        let mut rx = observable.subscribe();

        let waiter = tokio::spawn(async move { rx.changed().await });
        tokio::task::yield_now().await;
        notifier.maybe_update_buffer_size(21.3);

        let ms = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ms, 21.3);
    }
}
