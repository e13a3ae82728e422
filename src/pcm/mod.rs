//! Linear-interpolation sample-rate and pitch conversion
//!
//! A pure, deterministic resampler shared by the extraction stage (sample-rate
//! normalization to the device rate) and the fill stage (pitch shifting by a
//! semitone factor). A fractional read cursor walks the input, linearly
//! interpolating between the two bounding samples at each step; results are
//! truncated to 16-bit output. No clipping guard is needed: interpolation
//! between two i16 values cannot leave the i16 range.

/// The device's fixed output sample rate in Hz
pub const DEVICE_SAMPLE_RATE: u32 = 48_000;

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Stretch `samples` to exactly `out_len` samples by linear interpolation.
///
/// The read cursor advances by `len / (out_len - 1)` so the first output
/// sample is the first input sample; the final cursor position is clamped to
/// the last input sample.
pub fn stretch(samples: &[i16], out_len: usize) -> Vec<i16> {
    if samples.is_empty() || out_len == 0 {
        return Vec::new();
    }
    if out_len == 1 {
        return vec![samples[0]];
    }

    let n = samples.len();
    let step = n as f64 / (out_len - 1) as f64;

    let mut out = Vec::with_capacity(out_len);
    let mut t = 0.0f64;
    for _ in 0..out_len {
        let floor = (t as usize).min(n - 1);
        let ceil = (floor + 1).min(n - 1);
        let frac = t - floor as f64;

        let a = samples[floor] as f64;
        let b = samples[ceil] as f64;
        out.push(lerp(a, b, frac) as i16);

        t += step;
    }

    out
}

/// Resample `samples` from `rate_in` Hz to `rate_out` Hz.
///
/// Output length is `round(len * rate_out / rate_in)`.
pub fn resample(samples: &[i16], rate_in: u32, rate_out: u32) -> Vec<i16> {
    if samples.is_empty() || rate_in == 0 || rate_out == 0 {
        return Vec::new();
    }

    let ratio = rate_out as f64 / rate_in as f64;
    let out_len = (samples.len() as f64 * ratio).round() as usize;
    stretch(samples, out_len)
}
