//! Channel ranges within an interleaved hardware frame.

use std::fmt;

/// A contiguous range of hardware channels: `count` channels starting at `base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelGroup {
    base: u16,
    count: u16,
}

impl ChannelGroup {
    /// Creates a group of `count` channels starting at `base`.
    pub fn new(base: u16, count: u16) -> Self {
        Self { base, count }
    }

    /// Stereo pair starting at `base`.
    pub fn stereo(base: u16) -> Self {
        Self::new(base, 2)
    }

    /// Single channel at `base`.
    pub fn mono(base: u16) -> Self {
        Self::new(base, 1)
    }

    /// First channel of the group.
    pub fn base(&self) -> u16 {
        self.base
    }

    /// Number of channels in the group.
    pub fn count(&self) -> u16 {
        self.count
    }

    /// One past the last channel, saturating at `u16::MAX`.
    pub fn end(&self) -> u16 {
        self.base.saturating_add(self.count)
    }

    /// Returns `true` if the group has no channels.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns `true` if `channel` lies inside the group.
    pub fn contains(&self, channel: u16) -> bool {
        channel >= self.base && channel < self.end()
    }

    /// Returns `true` if the two groups share at least one channel.
    pub fn clashes_with(&self, other: &ChannelGroup) -> bool {
        !self.is_empty() && !other.is_empty() && self.base < other.end() && other.base < self.end()
    }
}

impl fmt::Display for ChannelGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.count {
            0 => write!(f, "none"),
            1 => write!(f, "{}", u32::from(self.base) + 1),
            _ => write!(f, "{}-{}", u32::from(self.base) + 1, u32::from(self.end())),
        }
    }
}
