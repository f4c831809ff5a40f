use crate::dsp::biquad::{BiquadFilter, FilterType};
use crate::dsp::common::{DcBlocker, soft_limit};
use crate::dsp::{AudioBuffer, MAX_CHANNELS};
use crate::effects::{Effect, EffectType, ParameterSpec, find_spec};
use std::any::Any;

static PARAMS: [ParameterSpec; 3] = [
    ParameterSpec::new("gain", "Gain", 0.0, 1.0, 0.01, 0.5, ""),
    ParameterSpec::new("tone", "Tone", 0.0, 1.0, 0.01, 0.5, ""),
    ParameterSpec::new("level", "Level", 0.0, 1.0, 0.01, 0.7, ""),
];

const KNEE: f32 = 0.33;
const OUTPUT_KNEE: f32 = 0.9;

#[inline]
fn low_pass_cutoff(tone: f32) -> f32 {
    tone.mul_add(4_500.0, 1_000.0)
}

#[inline]
fn high_pass_cutoff(tone: f32) -> f32 {
    (1.0 - tone).mul_add(150.0, 50.0)
}

/// British-style tube clip. Hard beyond +-1, exponential knee from +-0.33,
/// with a gentler curve on the negative half.
#[inline]
pub fn tube_clip(sample: f32) -> f32 {
    let shaped = if sample > 1.0 {
        1.0
    } else if sample > KNEE {
        (2.0 / 3.0f32).mul_add(1.0 - (-1.5 * (sample - KNEE)).exp(), KNEE)
    } else if sample < -1.0 {
        -1.0
    } else if sample < -KNEE {
        -(2.0 / 3.0f32).mul_add(1.0 - (-1.3 * (-sample - KNEE)).exp(), KNEE)
    } else {
        sample
    };
    shaped * 0.6
}

/// Single-stage amp overdrive with a swept high-pass/low-pass tone stack.
pub struct Orange {
    gain: f32,
    tone: f32,
    level: f32,

    high_pass: BiquadFilter,
    low_pass: BiquadFilter,
    dc_blockers: [DcBlocker; MAX_CHANNELS],

    bypassed: bool,
}

impl Orange {
    pub fn new() -> Self {
        let tone = PARAMS[1].default;
        Self {
            gain: PARAMS[0].default,
            tone,
            level: PARAMS[2].default,
            high_pass: BiquadFilter::new(FilterType::HighPass, high_pass_cutoff(tone), 44_100.0),
            low_pass: BiquadFilter::new(FilterType::LowPass, low_pass_cutoff(tone), 44_100.0),
            dc_blockers: Default::default(),
            bypassed: false,
        }
    }

    fn update_tone_stack(&mut self) {
        self.high_pass.set_cutoff(high_pass_cutoff(self.tone));
        self.low_pass.set_cutoff(low_pass_cutoff(self.tone));
    }
}

impl Default for Orange {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Orange {
    fn prepare(&mut self, sample_rate: f32, _max_block_size: usize) {
        self.high_pass.set_sample_rate(sample_rate);
        self.low_pass.set_sample_rate(sample_rate);
        self.update_tone_stack();
        self.reset();
    }

    fn reset(&mut self) {
        self.high_pass.reset();
        self.low_pass.reset();
        for dc in &mut self.dc_blockers {
            dc.reset();
        }
    }

    fn process_block(&mut self, buffer: &mut AudioBuffer) {
        if self.bypassed {
            return;
        }

        let drive = self.gain.mul_add(19.0, 1.0);

        for (ch, samples) in buffer.channels_mut().take(MAX_CHANNELS).enumerate() {
            for sample in samples {
                let x = tube_clip(*sample * drive);
                let x = self.high_pass.process_sample(x, ch);
                let x = self.low_pass.process_sample(x, ch);
                let x = self.dc_blockers[ch].process(x) * self.level;
                *sample = soft_limit(x, OUTPUT_KNEE);
            }
        }
    }

    fn effect_type(&self) -> EffectType {
        EffectType::Orange
    }

    fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    fn set_bypassed(&mut self, bypassed: bool) {
        self.bypassed = bypassed;
    }

    fn parameter_specs(&self) -> &'static [ParameterSpec] {
        &PARAMS
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> Result<(), &'static str> {
        let value = find_spec(&PARAMS, name)?.clamp(value);
        match name {
            "gain" => self.gain = value,
            "tone" => {
                self.tone = value;
                self.update_tone_stack();
            }
            "level" => self.level = value,
            _ => return Err("Unknown parameter"),
        }
        Ok(())
    }

    fn get_parameter(&self, name: &str) -> Result<f32, &'static str> {
        match name {
            "gain" => Ok(self.gain),
            "tone" => Ok(self.tone),
            "level" => Ok(self.level),
            _ => Err("Unknown parameter"),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tube_clip_regions() {
        assert!((tube_clip(0.2) - 0.12).abs() < 1e-7);
        assert_eq!(tube_clip(3.0), 0.6);
        assert_eq!(tube_clip(-3.0), -0.6);
        // Negative knee is gentler than the positive one.
        assert!(tube_clip(0.8) > -tube_clip(-0.8));
        // Continuous at the knee.
        assert!((tube_clip(KNEE + 1e-4) - tube_clip(KNEE)).abs() < 1e-3);
    }

    #[test]
    fn tone_moves_both_cutoffs() {
        let mut amp = Orange::new();
        amp.prepare(48_000.0, 64);

        amp.set_parameter("tone", 0.0).unwrap();
        assert!((amp.low_pass.cutoff() - 1_000.0).abs() < 1e-3);
        assert!((amp.high_pass.cutoff() - 200.0).abs() < 1e-3);

        amp.set_parameter("tone", 1.0).unwrap();
        assert!((amp.low_pass.cutoff() - 5_500.0).abs() < 1e-3);
        assert!((amp.high_pass.cutoff() - 50.0).abs() < 1e-3);
    }

    #[test]
    fn full_scale_square_stays_bounded() {
        for &gain in &[0.0f32, 0.5, 1.0] {
            let mut amp = Orange::new();
            amp.prepare(44_100.0, 2048);
            amp.set_parameter("gain", gain).unwrap();
            amp.set_parameter("level", 1.0).unwrap();

            let mut buffer = AudioBuffer::new(2, 2048);
            for ch in 0..2 {
                for (i, s) in buffer.channel_mut(ch).iter_mut().enumerate() {
                    *s = if (i / 100) % 2 == 0 { 1.0 } else { -1.0 };
                }
            }
            amp.process_block(&mut buffer);
            assert!(buffer.peak() <= 1.0, "gain {gain}: peak {}", buffer.peak());
        }
    }
}
