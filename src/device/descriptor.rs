//! Device identity and negotiated parameters.

use std::fmt;
use std::time::Duration;

use crate::DeviceConfig;

/// Reserved name of the virtual network-stream device.
pub const NETWORK_DEVICE_NAME: &str = "Network stream";

/// Process-unique identifier of a physical or virtual sound device.
///
/// The canonical string form is the device name, which is what persisted
/// configuration stores. The ALSA hardware device and backend index
/// disambiguate devices that share a name.
///
/// # Example
///
/// ```
/// use sound_device::DeviceId;
///
/// let id = DeviceId::new("Scarlett 2i2").with_alsa_hw_device("hw:1,0");
/// assert_eq!(id.to_string(), "Scarlett 2i2");
/// assert!(id == *"Scarlett 2i2");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DeviceId {
    name: String,
    alsa_hw_device: Option<String>,
    index: Option<u32>,
}

impl DeviceId {
    /// Creates an identifier from the backend's device name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alsa_hw_device: None,
            index: None,
        }
    }

    /// The identifier of the virtual network-stream device.
    pub fn network() -> Self {
        Self::new(NETWORK_DEVICE_NAME)
    }

    /// Sets the ALSA hardware device string (e.g. `hw:1,0`).
    #[must_use]
    pub fn with_alsa_hw_device(mut self, hw_device: impl Into<String>) -> Self {
        self.alsa_hw_device = Some(hw_device.into());
        self
    }

    /// Sets the backend's enumeration index.
    #[must_use]
    pub fn with_index(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }

    /// The device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ALSA hardware device string, if any.
    pub fn alsa_hw_device(&self) -> Option<&str> {
        self.alsa_hw_device.as_deref()
    }

    /// The backend's enumeration index, if any.
    pub fn index(&self) -> Option<u32> {
        self.index
    }

    /// Returns `true` for the reserved network-stream identifier.
    pub fn is_network(&self) -> bool {
        self.name == NETWORK_DEVICE_NAME
    }

    /// Name plus all disambiguating fields, for logs.
    pub fn debug_name(&self) -> String {
        let mut out = self.name.clone();
        if let Some(hw) = &self.alsa_hw_device {
            out.push_str(", ");
            out.push_str(hw);
        }
        if let Some(index) = self.index {
            out.push_str(&format!(", {index}"));
        }
        out
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl PartialEq<str> for DeviceId {
    fn eq(&self, other: &str) -> bool {
        self.name == other
    }
}

/// Identity, capabilities and configuration of one sound device.
///
/// Equality is identity: two descriptors are equal when their [`DeviceId`]s
/// are, regardless of display name or host API. A descriptor also compares
/// equal to its identifier's string form, which is how persisted
/// preferences are matched to enumerated devices.
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    id: DeviceId,
    display_name: String,
    host_api: String,
    num_output_channels: u16,
    num_input_channels: u16,
    sample_rate: f64,
    frames_per_buffer: usize,
}

impl DeviceDescriptor {
    /// Creates a descriptor with no channels and default configuration.
    pub fn new(id: DeviceId, display_name: impl Into<String>, host_api: impl Into<String>) -> Self {
        let config = DeviceConfig::default();
        Self {
            id,
            display_name: display_name.into(),
            host_api: host_api.into(),
            num_output_channels: 0,
            num_input_channels: 0,
            sample_rate: config.sample_rate,
            frames_per_buffer: config.frames_per_buffer,
        }
    }

    /// Sets the channel counts reported by the hardware.
    #[must_use]
    pub fn with_channels(mut self, outputs: u16, inputs: u16) -> Self {
        self.num_output_channels = outputs;
        self.num_input_channels = inputs;
        self
    }

    /// The device identifier.
    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    /// User-facing label.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Name of the audio subsystem used to reach the device.
    pub fn host_api(&self) -> &str {
        &self.host_api
    }

    /// Output channels reported by the hardware.
    pub fn num_output_channels(&self) -> u16 {
        self.num_output_channels
    }

    /// Input channels reported by the hardware.
    pub fn num_input_channels(&self) -> u16 {
        self.num_input_channels
    }

    /// Sample rate in Hz. Equals the negotiated rate while the device is open.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Frames per buffer *requested* from the hardware.
    ///
    /// Callbacks may receive different sizes; timing math must use the
    /// frame count each callback reports.
    pub fn frames_per_buffer(&self) -> usize {
        self.frames_per_buffer
    }

    /// Duration of the configured buffer.
    pub fn configured_buffer_duration(&self) -> Duration {
        DeviceConfig {
            sample_rate: self.sample_rate,
            frames_per_buffer: self.frames_per_buffer,
            ..DeviceConfig::default()
        }
        .buffer_duration()
    }

    /// Sets the sample rate. Devices only call this while closed.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    /// Sets the requested frames per buffer. Devices only call this while closed.
    pub fn set_frames_per_buffer(&mut self, frames_per_buffer: usize) {
        self.frames_per_buffer = frames_per_buffer;
    }
}

impl PartialEq for DeviceDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DeviceDescriptor {}

impl PartialEq<str> for DeviceDescriptor {
    fn eq(&self, other: &str) -> bool {
        self.id == *other
    }
}

impl PartialEq<&str> for DeviceDescriptor {
    fn eq(&self, other: &&str) -> bool {
        self.id == **other
    }
}

impl PartialEq<String> for DeviceDescriptor {
    fn eq(&self, other: &String) -> bool {
        self.id == *other.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_ignores_display_metadata() {
        let a = DeviceDescriptor::new(DeviceId::new("hw0"), "Built-in Output", "ALSA");
        let b = DeviceDescriptor::new(DeviceId::new("hw0"), "Speakers", "JACK");
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_ids_not_equal() {
        let a = DeviceDescriptor::new(DeviceId::new("hw0").with_index(0), "Card", "ALSA");
        let b = DeviceDescriptor::new(DeviceId::new("hw0").with_index(1), "Card", "ALSA");
        assert_ne!(a, b);
    }

    #[test]
    fn test_equality_against_string_form() {
        let device = DeviceDescriptor::new(
            DeviceId::new("Scarlett 2i2").with_alsa_hw_device("hw:1,0"),
            "Scarlett",
            "ALSA",
        );
        assert!(device == "Scarlett 2i2");
        assert!(device == "Scarlett 2i2".to_string());
        assert!(device != "Scarlett 4i4");
    }

    #[test]
    fn test_network_id() {
        let id = DeviceId::network();
        assert!(id.is_network());
        assert_eq!(id.to_string(), NETWORK_DEVICE_NAME);
        assert!(!DeviceId::new("hw0").is_network());
    }

    #[test]
    fn test_debug_name() {
        let id = DeviceId::new("Card").with_alsa_hw_device("hw:0,0").with_index(3);
        assert_eq!(id.debug_name(), "Card, hw:0,0, 3");
    }

    #[test]
    fn test_configured_duration() {
        let mut device = DeviceDescriptor::new(DeviceId::new("hw0"), "Card", "ALSA");
        device.set_sample_rate(48000.0);
        device.set_frames_per_buffer(960);
        assert_eq!(device.configured_buffer_duration(), Duration::from_millis(20));
    }

    #[test]
    fn test_channels() {
        let device =
            DeviceDescriptor::new(DeviceId::new("hw0"), "Card", "ALSA").with_channels(4, 2);
        assert_eq!(device.num_output_channels(), 4);
        assert_eq!(device.num_input_channels(), 2);
    }
}
