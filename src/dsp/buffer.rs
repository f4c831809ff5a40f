use anyhow::{Result, bail};

/// Planar block of samples indexed by (channel, frame).
///
/// Effects mutate it in place and never change its shape.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    num_frames: usize,
}

impl AudioBuffer {
    pub fn new(num_channels: usize, num_frames: usize) -> Self {
        Self {
            channels: vec![vec![0.0; num_frames]; num_channels],
            num_frames,
        }
    }

    /// Builds a buffer from per-channel sample vectors, which must all have the same length.
    pub fn from_channels(channels: Vec<Vec<f32>>) -> Result<Self> {
        let num_frames = channels.first().map_or(0, Vec::len);
        if let Some(bad) = channels.iter().position(|c| c.len() != num_frames) {
            bail!(
                "channel {bad} has {} frames, expected {num_frames}",
                channels[bad].len()
            );
        }

        Ok(Self {
            channels,
            num_frames,
        })
    }

    pub fn from_interleaved(samples: &[f32], num_channels: usize) -> Result<Self> {
        if num_channels == 0 {
            bail!("interleaved buffer needs at least one channel");
        }
        if samples.len() % num_channels != 0 {
            bail!(
                "sample count {} is not divisible by channel count {num_channels}",
                samples.len()
            );
        }

        let num_frames = samples.len() / num_channels;
        let mut buffer = Self::new(num_channels, num_frames);
        for (frame, chunk) in samples.chunks_exact(num_channels).enumerate() {
            for (ch, &s) in chunk.iter().enumerate() {
                buffer.channels[ch][frame] = s;
            }
        }

        Ok(buffer)
    }

    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.num_frames * self.channels.len());
        for frame in 0..self.num_frames {
            for channel in &self.channels {
                out.push(channel[frame]);
            }
        }
        out
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub const fn num_frames(&self) -> usize {
        self.num_frames
    }

    pub fn is_empty(&self) -> bool {
        self.num_frames == 0 || self.channels.is_empty()
    }

    pub fn channel(&self, channel: usize) -> &[f32] {
        &self.channels[channel]
    }

    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        &mut self.channels[channel]
    }

    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut [f32]> {
        self.channels.iter_mut().map(Vec::as_mut_slice)
    }

    /// Left and right channels borrowed together, if the buffer has at least two.
    pub fn stereo_mut(&mut self) -> Option<(&mut [f32], &mut [f32])> {
        match self.channels.as_mut_slice() {
            [left, right, ..] => Some((left.as_mut_slice(), right.as_mut_slice())),
            _ => None,
        }
    }

    pub fn get(&self, channel: usize, frame: usize) -> f32 {
        self.channels[channel][frame]
    }

    pub fn set(&mut self, channel: usize, frame: usize, value: f32) {
        self.channels[channel][frame] = value;
    }

    pub fn apply_gain(&mut self, gain: f32) {
        for channel in &mut self.channels {
            for s in channel.iter_mut() {
                *s *= gain;
            }
        }
    }

    pub fn clear(&mut self) {
        for channel in &mut self.channels {
            channel.fill(0.0);
        }
    }

    /// Changes the frame count of every channel. Only allocates when growing past capacity.
    pub fn set_num_frames(&mut self, num_frames: usize) {
        for channel in &mut self.channels {
            channel.resize(num_frames, 0.0);
        }
        self.num_frames = num_frames;
    }

    /// Copies `len` frames starting at `offset` in `source` into the start of this buffer.
    pub fn copy_frames_from(&mut self, source: &Self, offset: usize, len: usize) {
        for (dst, src) in self.channels.iter_mut().zip(&source.channels) {
            dst[..len].copy_from_slice(&src[offset..offset + len]);
        }
    }

    /// Copies the first `len` frames of this buffer into `target` at `offset`.
    pub fn copy_frames_to(&self, target: &mut Self, offset: usize, len: usize) {
        for (src, dst) in self.channels.iter().zip(&mut target.channels) {
            dst[offset..offset + len].copy_from_slice(&src[..len]);
        }
    }

    /// Largest absolute sample value over all channels.
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|c| c.iter())
            .map(|s| s.abs())
            .fold(0.0f32, f32::max)
    }
}
