//! Error types for sound-device.
//!
//! Errors are split into two categories:
//! - **Configuration errors** ([`SoundDeviceError`]): returned synchronously from
//!   binding registration, configuration and `open()`
//! - **Runtime degradation**: underruns and overruns on the audio thread are
//!   never errors. They are absorbed with silence and counted in
//!   [`DeviceStats`](crate::DeviceStats)

/// Errors reported to the non-real-time caller managing a device.
///
/// None of these are produced on the audio callback thread. The device
/// manager decides whether to retry with different parameters or disable the
/// device.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SoundDeviceError {
    /// An output binding does not fit in the device's output channels.
    #[error("output '{path}' needs {requested} output channels but the device has {available}")]
    ExcessiveOutputChannels {
        /// Display form of the rejected logical path.
        path: String,
        /// Channels the registry would need after adding the binding.
        requested: u16,
        /// Output channels reported by the hardware.
        available: u16,
    },

    /// An input binding does not fit in the device's input channels.
    #[error("input '{path}' needs {requested} input channels but the device has {available}")]
    ExcessiveInputChannels {
        /// Display form of the rejected logical path.
        path: String,
        /// Channels the registry would need after adding the binding.
        requested: u16,
        /// Input channels reported by the hardware.
        available: u16,
    },

    /// A binding was registered with a zero-width channel group.
    #[error("'{path}' is bound to an empty channel group")]
    EmptyChannelGroup {
        /// Display form of the rejected logical path.
        path: String,
    },

    /// Bindings or configuration were changed while the device is open.
    #[error("device '{name}' is open - close it before reconfiguring")]
    DeviceOpen {
        /// Display name of the device.
        name: String,
    },

    /// `open()` was called on a device that is already open.
    #[error("device '{name}' is already open")]
    AlreadyOpen {
        /// Display name of the device.
        name: String,
    },

    /// The device has neither output nor input bindings to open for.
    #[error("device '{name}' has no channels bound")]
    NoChannelsBound {
        /// Display name of the device.
        name: String,
    },

    /// The hardware refused the requested stream configuration.
    #[error("unsupported configuration for '{name}': {reason}")]
    UnsupportedConfig {
        /// Display name of the device.
        name: String,
        /// What the backend rejected.
        reason: String,
    },

    /// The device exists but cannot be used right now (busy, unplugged).
    #[error("device unavailable: {name} - {reason}")]
    DeviceUnavailable {
        /// Display name of the device.
        name: String,
        /// Reason the device is unavailable.
        reason: String,
    },

    /// An error from the underlying audio library.
    #[error("audio backend error: {0}")]
    BackendError(String),
}

impl SoundDeviceError {
    /// Returns `true` for binding-capacity errors.
    pub fn is_binding_error(&self) -> bool {
        matches!(
            self,
            Self::ExcessiveOutputChannels { .. }
                | Self::ExcessiveInputChannels { .. }
                | Self::EmptyChannelGroup { .. }
        )
    }

    /// Creates a backend error from any displayable native error.
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::BackendError(err.to_string())
    }
}
