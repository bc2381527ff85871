use std::f64::consts::PI;
use rustfft::num_complex::Complex64;
use crate::drivers::{PipelineError, Result};
/// Expanded transfer function of the whole cascade. `a[0]` is always 1.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterCoefficients {
    pub b: Vec<f64>,
    pub a: Vec<f64>,
}
/// One second-order section, normalized so that `a[0] == 1`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BiquadCoeffs {
    pub b: [f64; 3],
    pub a: [f64; 3],
}
impl BiquadCoeffs {
    fn dc_gain(&self) -> f64 {
        self.b.iter().sum::<f64>() / self.a.iter().sum::<f64>()
    }
    /// Internal state that holds the output constant for a unit-step input.
    fn step_state(&self) -> [f64; 2] {
        let g = self.dc_gain();
        let z2 = self.b[2] - self.a[2] * g;
        let z1 = self.b[1] + self.b[2] - (self.a[1] + self.a[2]) * g;
        [z1, z2]
    }
    fn run(&self, signal: &mut [f64], mut z: [f64; 2]) {
        // Transposed direct form II
        for sample in signal.iter_mut() {
            let x = *sample;
            let y = self.b[0] * x + z[0];
            z[0] = self.b[1] * x - self.a[1] * y + z[1];
            z[1] = self.b[2] * x - self.a[2] * y;
            *sample = y;
        }
    }
    fn response(&self, z_inv: Complex64) -> Complex64 {
        let num = Complex64::new(self.b[0], 0.0) + z_inv * self.b[1] + z_inv * z_inv * self.b[2];
        let den = Complex64::new(self.a[0], 0.0) + z_inv * self.a[1] + z_inv * z_inv * self.a[2];
        num / den
    }
    /// Both poles strictly inside the unit circle.
    pub fn is_stable(&self) -> bool {
        self.a[2].abs() < 1.0 && self.a[1].abs() < 1.0 + self.a[2]
    }
}
/// Digital Butterworth band-pass of the given prototype order, as `order` biquad sections.
///
/// Standard design chain: analog low-pass prototype, low-pass to band-pass transform on
/// pre-warped edges, then bilinear transform. Every section carries one zero at DC and one at
/// Nyquist, so the cascade has zero gain at both ends of the spectrum.
pub fn butterworth_bandpass(
    order: usize,
    low_hz: f64,
    high_hz: f64,
    sample_rate_hz: f64,
) -> Result<Vec<BiquadCoeffs>> {
    if order == 0 {
        return Err(PipelineError::Config("filter order must be at least 1".into()));
    }
    if !(sample_rate_hz > 0.0 && sample_rate_hz.is_finite()) {
        return Err(PipelineError::Config(format!(
            "sample rate must be positive, got {sample_rate_hz}"
        )));
    }
    let nyquist = sample_rate_hz / 2.0;
    let (wl, wh) = (low_hz / nyquist, high_hz / nyquist);
    let inside = |w: f64| w > 0.0 && w < 1.0;
    if !inside(wl) || !inside(wh) {
        return Err(PipelineError::Config(format!(
            "band-pass cutoffs {low_hz}..{high_hz} Hz must lie strictly between 0 and Nyquist ({nyquist} Hz)"
        )));
    }
    if wl >= wh {
        return Err(PipelineError::Config(format!(
            "band-pass low cutoff {low_hz} Hz must be below high cutoff {high_hz} Hz"
        )));
    }
    // Pre-warp for a bilinear transform with a normalized rate of 2.
    let warp = |w: f64| 4.0 * (PI * w / 2.0).tan();
    let (al, ah) = (warp(wl), warp(wh));
    let bw = ah - al;
    let w0_sq = al * ah;
    let mut pole_pairs = Vec::with_capacity(order);
    for k in 0..order / 2 {
        let m = (2 * k + 1) as f64 - order as f64;
        let prototype = -Complex64::from_polar(1.0, PI * m / (2.0 * order as f64));
        let (q1, q2) = lowpass_to_bandpass(prototype, bw, w0_sq);
        pole_pairs.push((q1, q1.conj()));
        pole_pairs.push((q2, q2.conj()));
    }
    if order % 2 == 1 {
        pole_pairs.push(lowpass_to_bandpass(Complex64::new(-1.0, 0.0), bw, w0_sq));
    }
    Ok(pole_pairs
        .into_iter()
        .map(|(q1, q2)| bilinear_section(q1, q2, bw))
        .collect())
}
fn lowpass_to_bandpass(pole: Complex64, bw: f64, w0_sq: f64) -> (Complex64, Complex64) {
    let p = pole * (bw / 2.0);
    let root = (p * p - w0_sq).sqrt();
    (p + root, p - root)
}
/// Maps `bw * s / ((s - q1)(s - q2))` into the z-domain.
fn bilinear_section(q1: Complex64, q2: Complex64, bw: f64) -> BiquadCoeffs {
    let fs2 = Complex64::new(4.0, 0.0);
    let z1 = (fs2 + q1) / (fs2 - q1);
    let z2 = (fs2 + q2) / (fs2 - q2);
    let gain = (fs2 * bw / ((fs2 - q1) * (fs2 - q2))).re;
    BiquadCoeffs {
        b: [gain, 0.0, -gain],
        a: [1.0, -(z1 + z2).re, (z1 * z2).re],
    }
}
/// Edge padding used by the forward-backward pass for a cascade of `sections` biquads.
pub fn pad_len_for(sections: usize) -> usize {
    3 * (2 * sections + 1)
}
fn convolve(lhs: &[f64], rhs: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; lhs.len() + rhs.len() - 1];
    for (i, l) in lhs.iter().enumerate() {
        for (j, r) in rhs.iter().enumerate() {
            out[i + j] += l * r;
        }
    }
    out
}
/// Forward-backward (zero-phase) band-pass filter with fixed coefficients.
#[derive(Clone, Debug)]
pub struct ZeroPhaseFilter {
    sections: Vec<BiquadCoeffs>,
    initial: Vec<[f64; 2]>,
    sample_rate_hz: f64,
}
impl ZeroPhaseFilter {
    pub fn bandpass(order: usize, low_hz: f64, high_hz: f64, sample_rate_hz: f64) -> Result<Self> {
        let sections = butterworth_bandpass(order, low_hz, high_hz, sample_rate_hz)?;
        let mut initial = Vec::with_capacity(sections.len());
        let mut scale = 1.0;
        for section in &sections {
            let [z1, z2] = section.step_state();
            initial.push([z1 * scale, z2 * scale]);
            scale *= section.dc_gain();
        }
        Ok(Self {
            sections,
            initial,
            sample_rate_hz,
        })
    }
    pub fn sections(&self) -> &[BiquadCoeffs] {
        &self.sections
    }
    pub fn pad_len(&self) -> usize {
        pad_len_for(self.sections.len())
    }
    pub fn coefficients(&self) -> FilterCoefficients {
        let mut b = vec![1.0];
        let mut a = vec![1.0];
        for section in &self.sections {
            b = convolve(&b, &section.b);
            a = convolve(&a, &section.a);
        }
        FilterCoefficients { b, a }
    }
    /// Single-pass magnitude response at `freq_hz`.
    pub fn magnitude_at(&self, freq_hz: f64) -> f64 {
        let z_inv = Complex64::from_polar(1.0, -2.0 * PI * freq_hz / self.sample_rate_hz);
        self.sections
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, s| acc * s.response(z_inv))
            .norm()
    }
    /// Filters `signal` forward then backward. Edges are odd-extended and each pass starts from
    /// the steady state for its first sample, which keeps start-up transients out of the output.
    pub fn apply(&self, signal: &[f64]) -> Result<Vec<f64>> {
        let n = signal.len();
        let pad = self.pad_len();
        if n <= pad {
            return Err(PipelineError::Shape(format!(
                "zero-phase filtering needs more than {pad} samples, got {n}"
            )));
        }
        let (first, last) = (signal[0], signal[n - 1]);
        let mut ext = Vec::with_capacity(n + 2 * pad);
        ext.extend((1..=pad).rev().map(|i| 2.0 * first - signal[i]));
        ext.extend_from_slice(signal);
        ext.extend((1..=pad).map(|i| 2.0 * last - signal[n - 1 - i]));
        self.run_cascade(&mut ext);
        ext.reverse();
        self.run_cascade(&mut ext);
        ext.reverse();
        Ok(ext[pad..pad + n].to_vec())
    }
    fn run_cascade(&self, data: &mut [f64]) {
        let x0 = data[0];
        for (section, zi) in self.sections.iter().zip(&self.initial) {
            section.run(data, [zi[0] * x0, zi[1] * x0]);
        }
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    fn sine(freq_hz: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq_hz * i as f64 / fs).sin())
            .collect()
    }
    #[test]
    fn rejects_cutoffs_outside_nyquist() {
        for (low, high) in [(3.0, 300.0), (0.0, 30.0), (30.0, 3.0), (250.0, 251.0)] {
            let err = ZeroPhaseFilter::bandpass(4, low, high, 500.0).unwrap_err();
            assert!(matches!(err, PipelineError::Config(_)), "{low}..{high}");
        }
        assert!(ZeroPhaseFilter::bandpass(0, 3.0, 30.0, 500.0).is_err());
    }
    #[test]
    fn sections_are_stable() {
        for order in 1..=6 {
            let filter = ZeroPhaseFilter::bandpass(order, 3.0, 30.0, 500.0).unwrap();
            assert_eq!(filter.sections().len(), order);
            assert!(filter.sections().iter().all(BiquadCoeffs::is_stable));
        }
    }
    #[test]
    fn passes_band_and_rejects_edges() {
        let filter = ZeroPhaseFilter::bandpass(4, 3.0, 30.0, 500.0).unwrap();
        assert!((filter.magnitude_at(10.0) - 1.0).abs() < 0.01);
        assert!(filter.magnitude_at(0.0) < 1e-9);
        assert!(filter.magnitude_at(0.5) < 0.01);
        assert!(filter.magnitude_at(150.0) < 0.01);
        assert!(filter.magnitude_at(250.0) < 1e-9);
    }
    #[test]
    fn expanded_coefficients_have_expected_shape() {
        let filter = ZeroPhaseFilter::bandpass(4, 3.0, 30.0, 500.0).unwrap();
        let coeffs = filter.coefficients();
        assert_eq!(coeffs.b.len(), 9);
        assert_eq!(coeffs.a.len(), 9);
        assert_eq!(coeffs.a[0], 1.0);
        // (1 - z^-2)^N has only even powers.
        for odd in coeffs.b.iter().skip(1).step_by(2) {
            assert!(odd.abs() < 1e-15);
        }
    }
    #[test]
    fn forward_backward_pass_has_no_phase_lag() {
        let filter = ZeroPhaseFilter::bandpass(4, 3.0, 30.0, 500.0).unwrap();
        let input = sine(10.0, 500.0, 2000);
        let output = filter.apply(&input).unwrap();
        assert_eq!(output.len(), input.len());
        let worst = input[200..1800]
            .iter()
            .zip(&output[200..1800])
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f64, f64::max);
        assert!(worst < 0.02, "max deviation {worst}");
    }
    #[test]
    fn constant_input_settles_to_zero() {
        let filter = ZeroPhaseFilter::bandpass(4, 3.0, 30.0, 500.0).unwrap();
        let output = filter.apply(&vec![5.0; 500]).unwrap();
        assert!(output.iter().all(|v| v.abs() < 1e-9));
    }
    #[test]
    fn short_signal_is_a_shape_error() {
        let filter = ZeroPhaseFilter::bandpass(4, 3.0, 30.0, 500.0).unwrap();
        assert_eq!(filter.pad_len(), 27);
        let err = filter.apply(&[0.0; 27]).unwrap_err();
        assert!(matches!(err, PipelineError::Shape(_)));
    }
}
