use crate::dsp::AudioBuffer;
use crate::effects::{Effect, EffectType, ParameterSpec};
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

const BUFFER_SIZE: usize = 8192;
const HOP_SIZE: usize = 512;
const HISTORY_SIZE: usize = 25;

const MIN_RMS: f32 = 0.01;
const MIN_CORRELATION: f32 = 0.5;
/// A correlation peak within this fraction of the best one wins if it comes earlier,
/// so period multiples are not mistaken for the fundamental.
const OCTAVE_GUARD: f32 = 0.9;
const MIN_FREQUENCY: f32 = 80.0;
const MAX_FREQUENCY: f32 = 1000.0;
const IN_TUNE_CENTS: f32 = 5.0;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];
const NO_NOTE: &str = "--";

/// (index into [`NOTE_NAMES`], octave, cents off) of the nearest note, A4 = 440 Hz.
fn nearest_note(freq: f32) -> (usize, i32, f32) {
    let semitones_from_a4 = 12.0 * (freq / 440.0).log2();
    let semitone = semitones_from_a4.round() as i32;
    let cents = 100.0 * (semitones_from_a4 - semitone as f32);

    // C-based index: A sits nine semitones above C.
    let from_c = semitone + 9;
    (from_c.rem_euclid(12) as usize, 4 + from_c.div_euclid(12), cents)
}

/// Nearest equal-tempered note for `freq`: (name, octave, cents off).
pub fn freq_to_note(freq: f32) -> (&'static str, i32, f32) {
    let (note, octave, cents) = nearest_note(freq);
    (NOTE_NAMES[note], octave, cents)
}

/// Last published tuner reading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TunerInfo {
    pub frequency: Option<f32>,
    pub note: Option<String>,
    pub cents_off: Option<f32>,
    pub in_tune: bool,
}

/// Readout shared between the audio thread and observers.
///
/// Everything lives in one word so a reader never sees a frequency from one analysis
/// next to a note from another. Layout, low bits first: frequency as `f32` bits (32),
/// cents in hundredths as `i16` (16), note index (4), octave as `i8` (8), detected flag.
#[derive(Debug, Default)]
struct Readout {
    packed: AtomicU64,
}

impl Readout {
    const DETECTED_BIT: u64 = 1 << 60;

    fn publish(&self, frequency: f32, detected: Option<(usize, i32, f32)>) {
        let mut packed = u64::from(frequency.to_bits());
        if let Some((note_index, octave, cents)) = detected {
            let hundredths = (cents * 100.0)
                .round()
                .clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16;
            packed |= u64::from(hundredths as u16) << 32
                | ((note_index as u64) & 0xf) << 48
                | u64::from(octave as i8 as u8) << 52
                | Self::DETECTED_BIT;
        }
        self.packed.store(packed, Ordering::Release);
    }

    /// Frequency of the last detection, plus (note index, octave, cents) while a
    /// note is detected.
    fn load(&self) -> (f32, Option<(usize, i32, f32)>) {
        let packed = self.packed.load(Ordering::Acquire);
        let frequency = f32::from_bits(packed as u32);
        if packed & Self::DETECTED_BIT == 0 {
            return (frequency, None);
        }
        let cents = f32::from((packed >> 32) as u16 as i16) / 100.0;
        let note_index = ((packed >> 48) & 0xf) as usize;
        let octave = i32::from(((packed >> 52) & 0xff) as u8 as i8);
        (frequency, Some((note_index, octave, cents)))
    }

    fn note(&self) -> Option<(usize, i32, f32)> {
        self.load().1
    }

    fn frequency(&self) -> f32 {
        self.load().0
    }
}

/// Cloneable, lock-free view of a [`Tuner`]'s readout for display threads.
#[derive(Debug, Clone)]
pub struct TunerHandle {
    readout: Arc<Readout>,
}

impl TunerHandle {
    pub fn is_note_detected(&self) -> bool {
        self.readout.note().is_some()
    }

    /// Note name with octave, e.g. "A4", or "--" while nothing is detected.
    pub fn note_name(&self) -> String {
        match self.readout.note() {
            Some((note, octave, _)) => format!("{}{}", NOTE_NAMES[note], octave),
            None => NO_NOTE.to_string(),
        }
    }

    pub fn cents_deviation(&self) -> f32 {
        self.readout.note().map_or(0.0, |(_, _, cents)| cents)
    }

    /// Smoothed frequency of the last detection. Kept after the note drops out.
    pub fn detected_frequency(&self) -> f32 {
        self.readout.frequency()
    }

    /// +1 when sharp, -1 when flat, 0 within five cents.
    pub fn tuning_direction(&self) -> i32 {
        let cents = self.cents_deviation();
        if cents > IN_TUNE_CENTS {
            1
        } else if cents < -IN_TUNE_CENTS {
            -1
        } else {
            0
        }
    }

    pub fn get_tuner_info(&self) -> TunerInfo {
        match self.readout.load() {
            (frequency, Some((note, octave, cents))) => TunerInfo {
                frequency: Some(frequency),
                note: Some(format!("{}{}", NOTE_NAMES[note], octave)),
                cents_off: Some(cents),
                in_tune: cents.abs() <= IN_TUNE_CENTS,
            },
            (_, None) => TunerInfo::default(),
        }
    }
}

/// Passthrough pitch detector using normalised autocorrelation.
pub struct Tuner {
    ring: Vec<f32>,
    write_pos: usize,
    samples_since_analysis: usize,
    ordered: Vec<f32>,
    correlations: Vec<f32>,

    history: [f32; HISTORY_SIZE],
    history_pos: usize,

    sample_rate: f32,
    readout: Arc<Readout>,
    bypassed: bool,
}

impl Tuner {
    pub fn new() -> Self {
        Self {
            ring: Vec::new(),
            write_pos: 0,
            samples_since_analysis: 0,
            ordered: Vec::new(),
            correlations: Vec::new(),
            history: [0.0; HISTORY_SIZE],
            history_pos: 0,
            sample_rate: 44_100.0,
            readout: Arc::new(Readout::default()),
            bypassed: false,
        }
    }

    pub fn handle(&self) -> TunerHandle {
        TunerHandle {
            readout: Arc::clone(&self.readout),
        }
    }

    /// Lag search range `[min, max)` in samples.
    fn lag_range(&self) -> (usize, usize) {
        let min_lag = (self.sample_rate / MAX_FREQUENCY) as usize;
        let max_lag = ((self.sample_rate / MIN_FREQUENCY) as usize).min(BUFFER_SIZE - 1);
        (min_lag.max(1), max_lag)
    }

    fn push(&mut self, sample: f32) {
        self.ring[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % BUFFER_SIZE;
    }

    fn analyse(&mut self) {
        let (older, newer) = self.ring.split_at(self.write_pos);
        self.ordered[..newer.len()].copy_from_slice(newer);
        self.ordered[newer.len()..].copy_from_slice(older);

        match self.detect_pitch() {
            Some(frequency) => {
                self.history[self.history_pos] = frequency;
                self.history_pos = (self.history_pos + 1) % HISTORY_SIZE;

                let (sum, count) = self
                    .history
                    .iter()
                    .filter(|&&f| f > 0.0)
                    .fold((0.0, 0), |(sum, count), &f| (sum + f, count + 1));
                if count > 0 {
                    let smoothed = sum / count as f32;
                    self.readout.publish(smoothed, Some(nearest_note(smoothed)));
                }
            }
            None => {
                let last = self.readout.frequency();
                self.readout.publish(last, None);
            }
        }
    }

    fn detect_pitch(&mut self) -> Option<f32> {
        let samples = &self.ordered;
        let energy: f32 = samples.iter().map(|x| x * x).sum();
        let rms = (energy / samples.len() as f32).sqrt();
        if rms < MIN_RMS {
            return None;
        }

        let (min_lag, max_lag) = self.lag_range();
        if max_lag <= min_lag {
            return None;
        }
        let correlations = &mut self.correlations[..max_lag - min_lag];
        for (corr, lag) in correlations.iter_mut().zip(min_lag..max_lag) {
            *corr = autocorrelation(samples, lag);
        }

        let max = correlations.iter().copied().fold(0.0f32, f32::max);
        if max < MIN_CORRELATION {
            return None;
        }

        let best = first_peak_above(correlations, max * OCTAVE_GUARD)?;
        let lag = (best + min_lag) as f32;

        let refined = if best > 0 && best + 1 < correlations.len() {
            let (y1, y2, y3) = (correlations[best - 1], correlations[best], correlations[best + 1]);
            let denom = 2.0f32.mul_add(y2, -y1 - y3);
            if denom.abs() > f32::EPSILON {
                lag + 0.5 * (y3 - y1) / denom
            } else {
                lag
            }
        } else {
            lag
        };

        Some(self.sample_rate / refined)
    }
}

/// `sum(x[i] * x[i + lag]) / sum(x[i]^2)` over the overlapping part.
fn autocorrelation(samples: &[f32], lag: usize) -> f32 {
    let count = samples.len() - lag;
    let (sum, norm) = samples[..count]
        .iter()
        .zip(&samples[lag..])
        .fold((0.0f32, 0.0f32), |(sum, norm), (&a, &b)| {
            (a.mul_add(b, sum), a.mul_add(a, norm))
        });
    if norm > 0.0 { sum / norm } else { 0.0 }
}

/// Index of the earliest local maximum reaching `threshold`.
fn first_peak_above(values: &[f32], threshold: f32) -> Option<usize> {
    let last = values.len().checked_sub(1)?;
    (0..=last).find(|&i| {
        let v = values[i];
        v >= threshold
            && (i == 0 || v >= values[i - 1])
            && (i == last || v >= values[i + 1])
    })
}

impl Default for Tuner {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Tuner {
    fn prepare(&mut self, sample_rate: f32, _max_block_size: usize) {
        self.sample_rate = sample_rate;
        self.ring = vec![0.0; BUFFER_SIZE];
        self.ordered = vec![0.0; BUFFER_SIZE];
        let (min_lag, max_lag) = self.lag_range();
        self.correlations = vec![0.0; max_lag.saturating_sub(min_lag)];
        self.reset();
    }

    fn reset(&mut self) {
        self.ring.fill(0.0);
        self.write_pos = 0;
        self.samples_since_analysis = 0;
        self.history = [0.0; HISTORY_SIZE];
        self.history_pos = 0;
        self.readout.publish(0.0, None);
    }

    fn process_block(&mut self, buffer: &mut AudioBuffer) {
        let channels = buffer.num_channels();
        if self.bypassed || self.ring.is_empty() || channels == 0 {
            return;
        }

        let scale = 1.0 / channels as f32;
        for frame in 0..buffer.num_frames() {
            let mono: f32 = (0..channels).map(|ch| buffer.get(ch, frame)).sum();
            self.push(mono * scale);
        }

        self.samples_since_analysis += buffer.num_frames();
        if self.samples_since_analysis >= HOP_SIZE {
            self.samples_since_analysis = 0;
            self.analyse();
        }
    }

    fn effect_type(&self) -> EffectType {
        EffectType::Tuner
    }

    fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    fn set_bypassed(&mut self, bypassed: bool) {
        self.bypassed = bypassed;
    }

    fn parameter_specs(&self) -> &'static [ParameterSpec] {
        &[]
    }

    fn set_parameter(&mut self, _name: &str, _value: f32) -> Result<(), &'static str> {
        Err("Unknown parameter")
    }

    fn get_parameter(&self, _name: &str) -> Result<f32, &'static str> {
        Err("Unknown parameter")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn feed_sine(tuner: &mut Tuner, freq: f32, sample_rate: f32, frames: usize) {
        const BLOCK: usize = 512;
        let mut n = 0;
        while n < frames {
            let mut buffer = AudioBuffer::new(2, BLOCK);
            for ch in 0..2 {
                for (i, s) in buffer.channel_mut(ch).iter_mut().enumerate() {
                    let t = (n + i) as f32 / sample_rate;
                    *s = 0.5 * (2.0 * PI * freq * t).sin();
                }
            }
            let before = buffer.clone();
            tuner.process_block(&mut buffer);
            assert_eq!(buffer, before, "tuner must pass audio through");
            n += BLOCK;
        }
    }

    #[test]
    fn freq_to_note_names() {
        let (note, octave, cents) = freq_to_note(440.0);
        assert_eq!((note, octave), ("A", 4));
        assert!(cents.abs() < 0.01);

        assert_eq!(freq_to_note(261.63).0, "C");
        assert_eq!(freq_to_note(261.63).1, 4);
        assert_eq!(freq_to_note(82.41).0, "E");
        assert_eq!(freq_to_note(82.41).1, 2);
        // B3 sits just below the C4 octave boundary.
        assert_eq!(freq_to_note(246.94).1, 3);

        let (_, _, sharp) = freq_to_note(440.0 * 2f32.powf(20.0 / 1200.0));
        assert!((sharp - 20.0).abs() < 0.05);
    }

    #[test]
    fn first_peak_skips_period_multiples() {
        let values = [0.1, 0.93, 0.5, 0.2, 0.96, 0.3];
        assert_eq!(first_peak_above(&values, 0.96 * OCTAVE_GUARD), Some(1));
        assert_eq!(first_peak_above(&values, 0.95), Some(4));
        assert_eq!(first_peak_above(&[], 0.5), None);
    }

    #[test]
    fn detects_a4() {
        let mut tuner = Tuner::new();
        tuner.prepare(44_100.0, 512);
        let handle = tuner.handle();

        feed_sine(&mut tuner, 440.0, 44_100.0, 44_100);

        assert!(handle.is_note_detected());
        assert_eq!(handle.note_name(), "A4");
        assert!(handle.cents_deviation().abs() < 1.0, "{}", handle.cents_deviation());
        assert!((handle.detected_frequency() - 440.0).abs() < 0.5);
        assert_eq!(handle.tuning_direction(), 0);

        let info = handle.get_tuner_info();
        assert_eq!(info.note.as_deref(), Some("A4"));
        assert!(info.in_tune);
    }

    #[test]
    fn detects_low_e() {
        let mut tuner = Tuner::new();
        tuner.prepare(48_000.0, 512);
        feed_sine(&mut tuner, 82.41, 48_000.0, 48_000);
        assert_eq!(tuner.handle().note_name(), "E2");
    }

    #[test]
    fn silence_is_never_detected() {
        let mut tuner = Tuner::new();
        tuner.prepare(44_100.0, 256);
        let handle = tuner.handle();

        for _ in 0..100 {
            let mut buffer = AudioBuffer::new(1, 256);
            tuner.process_block(&mut buffer);
            assert!(!handle.is_note_detected());
        }
        assert_eq!(handle.note_name(), "--");
        assert_eq!(handle.get_tuner_info(), TunerInfo::default());
    }

    #[test]
    fn readout_packing_round_trips() {
        let readout = Readout::default();
        readout.publish(82.5, Some((4, 2, -12.5)));
        assert_eq!(readout.load(), (82.5, Some((4, 2, -12.5))));
        readout.publish(1046.5, Some((11, -1, 3.0)));
        assert_eq!(readout.load(), (1046.5, Some((11, -1, 3.0))));
        readout.publish(82.5, None);
        assert_eq!(readout.load(), (82.5, None));
        assert_eq!(readout.frequency(), 82.5);
    }

    #[test]
    fn readout_keeps_cents_to_a_hundredth() {
        let readout = Readout::default();
        for cents in [-50.0_f32, -49.996, -0.004, 0.0, 7.123, 49.99, 50.0] {
            readout.publish(440.0, Some((9, 4, cents)));
            let (frequency, note) = readout.load();
            assert_eq!(frequency, 440.0);
            let (_, _, stored) = note.unwrap();
            assert!((stored - cents).abs() <= 0.005 + 1e-6, "{cents} -> {stored}");
        }
    }

    #[test]
    fn tuner_info_comes_from_a_single_reading() {
        let mut tuner = Tuner::new();
        tuner.prepare(44_100.0, 512);
        let handle = tuner.handle();

        tuner.readout.publish(110.0, Some((9, 2, -1.5)));
        let info = handle.get_tuner_info();
        assert_eq!(info.frequency, Some(110.0));
        assert_eq!(info.note.as_deref(), Some("A2"));
        assert_eq!(info.cents_off, Some(-1.5));
        assert!(info.in_tune);

        // A dropout keeps the frequency but clears the note in the same store.
        tuner.readout.publish(110.0, None);
        assert_eq!(handle.get_tuner_info(), TunerInfo::default());
        assert_eq!(handle.detected_frequency(), 110.0);
        assert_eq!(handle.note_name(), "--");
    }

    #[test]
    fn has_no_parameters_but_keeps_bypass_state() {
        let mut tuner = Tuner::new();
        assert!(tuner.parameter_specs().is_empty());
        assert!(tuner.set_parameter("gain", 1.0).is_err());
        tuner.set_bypassed(true);
        let state = tuner.get_state();
        assert_eq!(state.len(), 1);
        assert_eq!(state.get_bool(crate::effects::BYPASSED_KEY), Some(true));
    }
}
