/// Level reported for silence, in dB.
pub const SILENCE_DB: f32 = -100.0;

/// Convert decibels to linear amplitude.
#[inline]
pub fn db_to_lin(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels, flooring near-silence at [`SILENCE_DB`].
#[inline]
pub fn lin_to_db(lin: f32) -> f32 {
    if lin > 0.000_01 {
        20.0 * lin.log10()
    } else {
        SILENCE_DB
    }
}

/// Calculate a one-pole smoothing coefficient from a time constant in milliseconds.
///
/// Returns `exp(-1 / (time_ms * sample_rate * 0.001))`.
#[inline]
pub fn calculate_coefficient(time_ms: f32, sample_rate: f32) -> f32 {
    (-1.0 / (time_ms * sample_rate * 0.001)).exp()
}

/// Leaky-integrator DC blocker.
///
/// `y[n] = x[n] - x[n-1] + R * y[n-1]`
///
/// Reference: <https://ccrma.stanford.edu/~jos/fp/DC_Blocker.html>
#[derive(Clone, Debug)]
pub struct DcBlocker {
    x_prev: f32,
    y_prev: f32,
    coeff: f32,
}

impl DcBlocker {
    /// Pole radius used by the distortion pedals.
    pub const PEDAL_COEFF: f32 = 0.995;

    pub const fn new(coeff: f32) -> Self {
        Self {
            x_prev: 0.0,
            y_prev: 0.0,
            coeff,
        }
    }

    pub const fn reset(&mut self) {
        self.x_prev = 0.0;
        self.y_prev = 0.0;
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let output = self.coeff.mul_add(self.y_prev, input - self.x_prev);
        self.x_prev = input;
        self.y_prev = output;
        output
    }
}

impl Default for DcBlocker {
    fn default() -> Self {
        Self::new(Self::PEDAL_COEFF)
    }
}

/// Output limiter: linear up to `knee`, then a tanh shoulder that never exceeds 1.0.
#[inline]
pub fn soft_limit(sample: f32, knee: f32) -> f32 {
    let headroom = 1.0 - knee;
    if sample > knee {
        knee + headroom * ((sample - knee) * 5.0).tanh()
    } else if sample < -knee {
        -knee + headroom * ((sample + knee) * 5.0).tanh()
    } else {
        sample
    }
}
