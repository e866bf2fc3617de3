//! Channel routing between hardware frames and logical streams.
//!
//! ```text
//! Logical outputs ──┐                         ┌── Logical inputs
//!   (SampleBuffer)  │   ┌─────────────────┐   │    (SampleBuffer)
//!                   ├──▶│ BufferComposer  │───┤
//!                   │   └─────────────────┘   │
//!                   ▼            ▲            ▼
//!           hw output frame      │      hw input frame
//!                        ChannelRouting (snapshot at open)
//! ```
//!
//! - **Registry**: [`ChannelRouting`] holds ordered bindings, validated
//!   against the device's channel counts at registration time
//! - **Composer**: [`BufferComposer`] sums outputs into and scatters inputs
//!   out of interleaved hardware buffers on the audio thread

mod buffer;
mod channel_group;
mod compose;
mod path;
mod registry;

pub use buffer::SampleBuffer;
pub use channel_group::ChannelGroup;
pub use compose::BufferComposer;
pub use path::{AudioPath, AudioPathKind};
pub use registry::{ChannelRouting, InputBinding, OutputBinding};
