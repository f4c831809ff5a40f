use crate::dsp::{AudioBuffer, MAX_CHANNELS};
use crate::effects::{Effect, EffectType, ParameterSpec, find_spec};
use std::any::Any;

static PARAMS: [ParameterSpec; 3] = [
    ParameterSpec::new("rate", "Rate", 0.1, 5.0, 0.01, 1.5, "Hz"),
    ParameterSpec::new("depth", "Depth", 0.0, 1.0, 0.01, 0.5, ""),
    ParameterSpec::new("mix", "Mix", 0.0, 1.0, 0.01, 0.5, ""),
];

pub const MAX_DELAY_MS: f32 = 50.0;
const BASE_DELAY_MS: f32 = 15.0;
const MOD_DELAY_MS: f32 = 15.0;

/// Triangle LFO in `0.0..=1.0` for a phase in `0.0..1.0`.
#[inline]
fn triangle(phase: f32) -> f32 {
    let value = phase * 2.0;
    if value > 1.0 { 2.0 - value } else { value }
}

/// Triangle-modulated delay line with linear interpolation.
pub struct Chorus {
    rate: f32,
    depth: f32,
    mix: f32,

    delay_lines: [Vec<f32>; MAX_CHANNELS],
    write_pos: usize,
    lfo_phase: f32,
    sample_rate: f32,

    bypassed: bool,
}

impl Chorus {
    pub fn new() -> Self {
        Self {
            rate: PARAMS[0].default,
            depth: PARAMS[1].default,
            mix: PARAMS[2].default,
            delay_lines: Default::default(),
            write_pos: 0,
            lfo_phase: 0.0,
            sample_rate: 44_100.0,
            bypassed: false,
        }
    }

    /// Current delay in samples for the given LFO value.
    #[inline]
    fn delay_samples(&self, lfo: f32) -> f32 {
        let delay_ms = (lfo * self.depth).mul_add(MOD_DELAY_MS, BASE_DELAY_MS);
        delay_ms * self.sample_rate / 1000.0
    }

    pub const fn lfo_phase(&self) -> f32 {
        self.lfo_phase
    }
}

impl Default for Chorus {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Chorus {
    fn prepare(&mut self, sample_rate: f32, _max_block_size: usize) {
        self.sample_rate = sample_rate;
        let len = (sample_rate * MAX_DELAY_MS / 1000.0) as usize + 1;
        for line in &mut self.delay_lines {
            *line = vec![0.0; len];
        }
        self.reset();
    }

    fn reset(&mut self) {
        for line in &mut self.delay_lines {
            line.fill(0.0);
        }
        self.write_pos = 0;
        self.lfo_phase = 0.0;
    }

    fn process_block(&mut self, buffer: &mut AudioBuffer) {
        let len = self.delay_lines[0].len();
        if self.bypassed || len == 0 {
            return;
        }

        let channels = buffer.num_channels().min(MAX_CHANNELS);
        let phase_inc = self.rate / self.sample_rate;

        for frame in 0..buffer.num_frames() {
            let delay = self.delay_samples(triangle(self.lfo_phase));
            let mut read_pos = self.write_pos as f32 - delay;
            while read_pos < 0.0 {
                read_pos += len as f32;
            }
            let idx1 = (read_pos as usize).min(len - 1);
            let idx2 = (idx1 + 1) % len;
            let frac = read_pos - idx1 as f32;

            for ch in 0..channels {
                let line = &mut self.delay_lines[ch];
                let input = buffer.get(ch, frame);
                line[self.write_pos] = input;

                let delayed = frac.mul_add(line[idx2] - line[idx1], line[idx1]);
                buffer.set(ch, frame, input.mul_add(1.0 - self.mix, delayed * self.mix));
            }

            self.write_pos = (self.write_pos + 1) % len;
            self.lfo_phase += phase_inc;
            if self.lfo_phase >= 1.0 {
                self.lfo_phase -= 1.0;
            }
        }
    }

    fn effect_type(&self) -> EffectType {
        EffectType::Chorus
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
            "rate" => self.rate = value,
            "depth" => self.depth = value,
            "mix" => self.mix = value,
            _ => return Err("Unknown parameter"),
        }
        Ok(())
    }

    fn get_parameter(&self, name: &str) -> Result<f32, &'static str> {
        match name {
            "rate" => Ok(self.rate),
            "depth" => Ok(self.depth),
            "mix" => Ok(self.mix),
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
    fn triangle_shape() {
        assert_eq!(triangle(0.0), 0.0);
        assert_eq!(triangle(0.25), 0.5);
        assert_eq!(triangle(0.5), 1.0);
        assert_eq!(triangle(0.75), 0.5);
    }

    #[test]
    fn delay_line_covers_max_delay() {
        let mut chorus = Chorus::new();
        chorus.prepare(48_000.0, 128);
        assert_eq!(chorus.delay_lines[0].len(), 2_401);
        assert_eq!(chorus.delay_lines[1].len(), 2_401);
    }

    #[test]
    fn zero_depth_is_a_fixed_15ms_delay() {
        let mut chorus = Chorus::new();
        chorus.prepare(48_000.0, 2048);
        chorus.set_parameter("depth", 0.0).unwrap();
        chorus.set_parameter("mix", 0.5).unwrap();
        chorus.set_parameter("rate", 5.0).unwrap();

        // Run some silence first so the LFO is at an arbitrary phase.
        let mut silence = AudioBuffer::new(2, 777);
        chorus.process_block(&mut silence);
        assert!(chorus.lfo_phase() > 0.0);

        let mut buffer = AudioBuffer::new(2, 2048);
        buffer.set(0, 0, 1.0);
        buffer.set(1, 0, 1.0);
        chorus.process_block(&mut buffer);

        for ch in 0..2 {
            let out = buffer.channel(ch);
            assert!((out[0] - 0.5).abs() < 1e-6);
            assert!((out[720] - 0.5).abs() < 1e-6, "echo {}", out[720]);
            let stray: f32 = out
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != 0 && i != 720)
                .map(|(_, s)| s.abs())
                .sum();
            assert!(stray < 1e-6, "unexpected energy {stray}");
        }
    }

    #[test]
    fn fractional_delay_splits_an_impulse_between_neighbours() {
        // 15 ms at 44.1 kHz is 661.5 samples, so the echo lands half on 661 and half on 662.
        for lead_in in [0, 777] {
            let mut chorus = Chorus::new();
            chorus.prepare(44_100.0, 1024);
            chorus.set_parameter("depth", 0.0).unwrap();
            chorus.set_parameter("mix", 0.5).unwrap();
            assert_eq!(chorus.delay_lines[0].len(), 2_206);

            // Without a lead-in the read position wraps across the end of the line.
            let mut silence = AudioBuffer::new(2, lead_in);
            chorus.process_block(&mut silence);

            let mut buffer = AudioBuffer::new(2, 1024);
            buffer.set(0, 0, 1.0);
            buffer.set(1, 0, 1.0);
            chorus.process_block(&mut buffer);

            for ch in 0..2 {
                let out = buffer.channel(ch);
                assert!((out[0] - 0.5).abs() < 1e-6);
                assert!((out[661] - 0.25).abs() < 1e-6, "lead-in {lead_in}: {}", out[661]);
                assert!((out[662] - 0.25).abs() < 1e-6, "lead-in {lead_in}: {}", out[662]);
                let stray: f32 = out
                    .iter()
                    .enumerate()
                    .filter(|&(i, _)| ![0, 661, 662].contains(&i))
                    .map(|(_, s)| s.abs())
                    .sum();
                assert!(stray < 1e-6, "unexpected energy {stray}");
            }
        }
    }

    #[test]
    fn full_mix_with_depth_modulates_delay() {
        let mut chorus = Chorus::new();
        chorus.prepare(44_100.0, 64);
        chorus.set_parameter("depth", 1.0).unwrap();
        let base = chorus.delay_samples(0.0);
        let peak = chorus.delay_samples(1.0);
        assert!((base - 661.5).abs() < 1e-3);
        assert!((peak - 1_323.0).abs() < 1e-2);
        assert!(peak < chorus.delay_lines[0].len() as f32);
    }

    #[test]
    fn reset_clears_delay_and_phase() {
        let mut chorus = Chorus::new();
        chorus.prepare(44_100.0, 256);
        let mut buffer = AudioBuffer::new(1, 256);
        buffer.channel_mut(0).fill(0.3);
        chorus.process_block(&mut buffer);

        chorus.reset();
        assert_eq!(chorus.lfo_phase(), 0.0);
        assert!(chorus.delay_lines[0].iter().all(|&s| s == 0.0));
    }
}
