//! Configuration types for sound devices.

use std::time::Duration;

/// Largest number of callback buffers a sync FIFO may hold.
pub const MAX_SYNC_BUFFERS: u32 = 4;

/// Stream parameters requested of a device before it is opened.
///
/// Use [`DeviceConfig::default()`] for sensible defaults, or customize as needed.
///
/// # Example
///
/// ```
/// use sound_device::DeviceConfig;
/// use std::time::Duration;
///
/// let config = DeviceConfig::from_latency(48000.0, Duration::from_millis(10));
/// assert_eq!(config.frames_per_buffer, 512);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    /// Requested sample rate in Hz.
    ///
    /// Default: 44100
    pub sample_rate: f64,

    /// Frames per buffer requested from the hardware.
    ///
    /// The hardware may still deliver differently sized buffers, so this is
    /// only used to configure the device, never for timing math.
    /// Default: 1024
    pub frames_per_buffer: usize,

    /// Number of callback buffers held by the FIFOs of devices that are not
    /// the clock reference.
    ///
    /// Clamped to `1..=MAX_SYNC_BUFFERS`. Default: 2
    pub sync_buffers: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            frames_per_buffer: 1024,
            sync_buffers: 2,
        }
    }
}

impl DeviceConfig {
    /// Picks the smallest power-of-two buffer covering `latency` at `sample_rate`.
    #[must_use]
    pub fn from_latency(sample_rate: f64, latency: Duration) -> Self {
        let frames = (sample_rate * latency.as_secs_f64()).ceil().max(1.0) as usize;
        Self {
            sample_rate,
            frames_per_buffer: frames.next_power_of_two(),
            ..Self::default()
        }
    }

    /// Returns the configured buffer duration.
    ///
    /// This is what was requested, not what callbacks deliver.
    #[must_use]
    pub fn buffer_duration(&self) -> Duration {
        if self.sample_rate <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames_per_buffer as f64 / self.sample_rate)
    }

    /// Returns `sync_buffers` clamped to the supported range.
    #[must_use]
    pub fn effective_sync_buffers(&self) -> u32 {
        clamp_sync_buffers(self.sync_buffers)
    }
}

pub(crate) fn clamp_sync_buffers(sync_buffers: u32) -> u32 {
    sync_buffers.clamp(1, MAX_SYNC_BUFFERS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_config_defaults() {
        let config = DeviceConfig::default();
        assert_eq!(config.sample_rate, 44100.0);
        assert_eq!(config.frames_per_buffer, 1024);
        assert_eq!(config.sync_buffers, 2);
    }

    #[test]
    fn test_from_latency_rounds_up_to_power_of_two() {
        let config = DeviceConfig::from_latency(44100.0, Duration::from_millis(23));
        // 44100 * 0.023 = 1014.3 frames
        assert_eq!(config.frames_per_buffer, 1024);

        let config = DeviceConfig::from_latency(48000.0, Duration::from_millis(1));
        assert_eq!(config.frames_per_buffer, 64);
    }

    #[test]
    fn test_from_latency_zero() {
        let config = DeviceConfig::from_latency(48000.0, Duration::ZERO);
        assert_eq!(config.frames_per_buffer, 1);
    }

    #[test]
    fn test_buffer_duration() {
        let config = DeviceConfig {
            sample_rate: 48000.0,
            frames_per_buffer: 480,
            sync_buffers: 2,
        };
        assert_eq!(config.buffer_duration(), Duration::from_millis(10));
    }

    #[test]
    fn test_buffer_duration_zero_rate() {
        let config = DeviceConfig {
            sample_rate: 0.0,
            ..Default::default()
        };
        assert_eq!(config.buffer_duration(), Duration::ZERO);
    }

    #[test]
    fn test_sync_buffers_clamped() {
        let mut config = DeviceConfig::default();
        config.sync_buffers = 0;
        assert_eq!(config.effective_sync_buffers(), 1);
        config.sync_buffers = 99;
        assert_eq!(config.effective_sync_buffers(), MAX_SYNC_BUFFERS);
    }
}
