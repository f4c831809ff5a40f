//! Schroeder/Moorer stereo reverb in the Freeverb topology:
//! eight damped feedback combs in parallel, four allpass diffusers in series, per channel.

/// Comb delays in samples at 44.1 kHz.
const COMB_TUNINGS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
/// Allpass delays in samples at 44.1 kHz.
const ALLPASS_TUNINGS: [usize; 4] = [556, 441, 341, 225];
/// Extra delay given to the right channel's lines.
const STEREO_SPREAD: usize = 23;
const REFERENCE_SAMPLE_RATE: f32 = 44_100.0;

const FIXED_GAIN: f32 = 0.015;
const ROOM_SCALE: f32 = 0.28;
const ROOM_OFFSET: f32 = 0.7;
const DAMP_SCALE: f32 = 0.4;
const WET_SCALE: f32 = 3.0;
const DRY_SCALE: f32 = 2.0;

/// User-facing reverb settings, all in `0.0..=1.0`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ReverbParameters {
    pub room_size: f32,
    pub damping: f32,
    pub wet_level: f32,
    pub dry_level: f32,
    pub width: f32,
}

impl Default for ReverbParameters {
    fn default() -> Self {
        Self {
            room_size: 0.5,
            damping: 0.5,
            wet_level: 0.33,
            dry_level: 0.4,
            width: 1.0,
        }
    }
}

#[derive(Clone, Debug, Default)]
struct Comb {
    buffer: Vec<f32>,
    index: usize,
    last: f32,
}

impl Comb {
    fn set_size(&mut self, size: usize) {
        self.buffer = vec![0.0; size.max(1)];
        self.index = 0;
        self.last = 0.0;
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
        self.last = 0.0;
    }

    #[inline]
    fn process(&mut self, input: f32, damp: f32, feedback: f32) -> f32 {
        let output = self.buffer[self.index];
        self.last = output * (1.0 - damp) + self.last * damp;
        if self.last.abs() < 1e-20 {
            self.last = 0.0;
        }
        self.buffer[self.index] = input + self.last * feedback;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }
}

#[derive(Clone, Debug, Default)]
struct Allpass {
    buffer: Vec<f32>,
    index: usize,
}

impl Allpass {
    fn set_size(&mut self, size: usize) {
        self.buffer = vec![0.0; size.max(1)];
        self.index = 0;
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.index];
        self.buffer[self.index] = input + buffered * 0.5;
        self.index = (self.index + 1) % self.buffer.len();
        buffered - input
    }
}

#[derive(Clone, Debug)]
pub struct Freeverb {
    combs: [[Comb; 8]; 2],
    allpasses: [[Allpass; 4]; 2],
    parameters: ReverbParameters,
    damping: f32,
    feedback: f32,
    wet1: f32,
    wet2: f32,
    dry: f32,
}

impl Freeverb {
    pub fn new() -> Self {
        let mut reverb = Self {
            combs: Default::default(),
            allpasses: Default::default(),
            parameters: ReverbParameters::default(),
            damping: 0.0,
            feedback: 0.0,
            wet1: 0.0,
            wet2: 0.0,
            dry: 0.0,
        };
        reverb.set_sample_rate(REFERENCE_SAMPLE_RATE);
        reverb.set_parameters(ReverbParameters::default());
        reverb
    }

    /// Resizes every delay line for `sample_rate`. Allocates.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        let scale = sample_rate / REFERENCE_SAMPLE_RATE;
        let scaled = |samples: usize| (samples as f32 * scale) as usize;

        for (ch, spread) in [0, STEREO_SPREAD].into_iter().enumerate() {
            for (comb, &tuning) in self.combs[ch].iter_mut().zip(&COMB_TUNINGS) {
                comb.set_size(scaled(tuning + spread));
            }
            for (allpass, &tuning) in self.allpasses[ch].iter_mut().zip(&ALLPASS_TUNINGS) {
                allpass.set_size(scaled(tuning + spread));
            }
        }
    }

    pub fn set_parameters(&mut self, parameters: ReverbParameters) {
        let wet = parameters.wet_level * WET_SCALE;
        self.dry = parameters.dry_level * DRY_SCALE;
        self.wet1 = 0.5 * wet * (1.0 + parameters.width);
        self.wet2 = 0.5 * wet * (1.0 - parameters.width);
        self.damping = parameters.damping * DAMP_SCALE;
        self.feedback = parameters.room_size.mul_add(ROOM_SCALE, ROOM_OFFSET);
        self.parameters = parameters;
    }

    pub const fn parameters(&self) -> &ReverbParameters {
        &self.parameters
    }

    pub fn reset(&mut self) {
        for comb in self.combs.iter_mut().flatten() {
            comb.clear();
        }
        for allpass in self.allpasses.iter_mut().flatten() {
            allpass.clear();
        }
    }

    pub fn process_stereo(&mut self, left: &mut [f32], right: &mut [f32]) {
        let [combs_l, combs_r] = &mut self.combs;
        let [allpasses_l, allpasses_r] = &mut self.allpasses;

        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let input = (*l + *r) * FIXED_GAIN;
            let mut out_l = 0.0;
            let mut out_r = 0.0;

            for (comb_l, comb_r) in combs_l.iter_mut().zip(combs_r.iter_mut()) {
                out_l += comb_l.process(input, self.damping, self.feedback);
                out_r += comb_r.process(input, self.damping, self.feedback);
            }
            for (ap_l, ap_r) in allpasses_l.iter_mut().zip(allpasses_r.iter_mut()) {
                out_l = ap_l.process(out_l);
                out_r = ap_r.process(out_r);
            }

            *l = out_l * self.wet1 + out_r * self.wet2 + *l * self.dry;
            *r = out_r * self.wet1 + out_l * self.wet2 + *r * self.dry;
        }
    }

    pub fn process_mono(&mut self, samples: &mut [f32]) {
        for s in samples.iter_mut() {
            let input = *s * FIXED_GAIN;
            let mut out = 0.0;

            for comb in &mut self.combs[0] {
                out += comb.process(input, self.damping, self.feedback);
            }
            for allpass in &mut self.allpasses[0] {
                out = allpass.process(out);
            }

            *s = out * self.wet1 + *s * self.dry;
        }
    }
}

impl Default for Freeverb {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_only_scales_input() {
        let mut reverb = Freeverb::new();
        reverb.set_parameters(ReverbParameters {
            wet_level: 0.0,
            dry_level: 0.5,
            ..ReverbParameters::default()
        });

        let mut left = vec![0.25f32; 256];
        let mut right = vec![-0.25f32; 256];
        reverb.process_stereo(&mut left, &mut right);

        assert!(left.iter().all(|&s| (s - 0.25).abs() < 1e-6));
        assert!(right.iter().all(|&s| (s + 0.25).abs() < 1e-6));
    }

    #[test]
    fn impulse_produces_a_decaying_tail() {
        let mut reverb = Freeverb::new();
        reverb.set_parameters(ReverbParameters {
            wet_level: 1.0,
            dry_level: 0.0,
            ..ReverbParameters::default()
        });

        let mut left = vec![0.0f32; 44_100];
        let mut right = vec![0.0f32; 44_100];
        left[0] = 1.0;
        right[0] = 1.0;
        reverb.process_stereo(&mut left, &mut right);

        let energy = |s: &[f32]| s.iter().map(|x| x * x).sum::<f32>();
        let early = energy(&left[..11_025]);
        let late = energy(&left[33_075..]);
        assert!(early > 0.0, "no reverb tail");
        assert!(late < early, "tail does not decay: {late} >= {early}");
        assert!(left.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn reset_silences_the_tail() {
        let mut reverb = Freeverb::new();
        let mut block = vec![1.0f32; 2048];
        reverb.process_mono(&mut block);

        reverb.reset();
        reverb.set_parameters(ReverbParameters {
            dry_level: 0.0,
            ..ReverbParameters::default()
        });
        let mut silence = vec![0.0f32; 2048];
        reverb.process_mono(&mut silence);
        assert!(silence.iter().all(|&s| s == 0.0));
    }
}
