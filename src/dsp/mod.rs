pub mod biquad;
pub mod buffer;
pub mod common;
pub mod freeverb;
pub mod oversampler;

pub use buffer::AudioBuffer;

/// Number of channels every per-channel DSP state holder supports.
pub const MAX_CHANNELS: usize = 2;
