//! Logical stream identification.

use std::fmt;

/// Kind of logical stream a binding carries.
///
/// Output kinds are produced by the mixing engine, input kinds are consumed
/// by recorders, vinyl control and microphone processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AudioPathKind {
    /// Main mix output.
    Main,
    /// Headphone cue output.
    Headphones,
    /// Booth monitor output.
    Booth,
    /// Crossfader bus output (left, center, right).
    Bus,
    /// Direct output of a single deck.
    Deck,
    /// Record/broadcast feed, as output or input.
    RecordBroadcast,
    /// Timecode input for vinyl control.
    VinylControl,
    /// Microphone input.
    Microphone,
    /// Auxiliary line input.
    Auxiliary,
}

impl AudioPathKind {
    /// Returns the user-facing label for this kind.
    pub fn label(self) -> &'static str {
        match self {
            Self::Main => "Main",
            Self::Headphones => "Headphones",
            Self::Booth => "Booth",
            Self::Bus => "Bus",
            Self::Deck => "Deck",
            Self::RecordBroadcast => "Record/Broadcast",
            Self::VinylControl => "Vinyl Control",
            Self::Microphone => "Microphone",
            Self::Auxiliary => "Auxiliary",
        }
    }

    /// Returns `true` if several instances of this kind can exist.
    pub fn is_indexed(self) -> bool {
        matches!(
            self,
            Self::Bus | Self::Deck | Self::VinylControl | Self::Microphone | Self::Auxiliary
        )
    }
}

/// Identifies one logical stream, e.g. `Main` or `Deck 2`.
///
/// The index is zero-based and only shown for indexed kinds.
///
/// # Example
///
/// ```
/// use sound_device::{AudioPath, AudioPathKind};
///
/// let deck = AudioPath::indexed(AudioPathKind::Deck, 1);
/// assert_eq!(deck.to_string(), "Deck 2");
/// assert_eq!(AudioPath::new(AudioPathKind::Main).to_string(), "Main");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AudioPath {
    kind: AudioPathKind,
    index: u8,
}

impl AudioPath {
    /// Creates a path for a kind that exists once.
    pub fn new(kind: AudioPathKind) -> Self {
        Self { kind, index: 0 }
    }

    /// Creates a path for the `index`-th instance of a kind.
    pub fn indexed(kind: AudioPathKind, index: u8) -> Self {
        Self { kind, index }
    }

    /// Returns the kind of stream.
    pub fn kind(&self) -> AudioPathKind {
        self.kind
    }

    /// Returns the zero-based instance index.
    pub fn index(&self) -> u8 {
        self.index
    }
}

impl fmt::Display for AudioPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.is_indexed() {
            write!(f, "{} {}", self.kind.label(), u16::from(self.index) + 1)
        } else {
            f.write_str(self.kind.label())
        }
    }
}

impl From<AudioPathKind> for AudioPath {
    fn from(kind: AudioPathKind) -> Self {
        Self::new(kind)
    }
}
