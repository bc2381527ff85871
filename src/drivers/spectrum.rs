use std::f64::consts::PI;
use std::sync::Arc;
use rustfft::{num_complex::Complex64, Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use crate::drivers::{PipelineError, Result};
/// Composite rule used to integrate a uniformly sampled spectrum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quadrature {
    /// Non-decreasing as in-band bins are added, for any non-negative spectrum.
    #[default]
    Trapezoid,
    /// Composite Simpson over the largest odd-length prefix; a trailing interval falls back to
    /// the trapezoid rule.
    Simpson,
}
impl Quadrature {
    pub fn integrate(self, values: &[f64], dx: f64) -> f64 {
        match values.len() {
            0 | 1 => 0.0,
            2 => trapezoid(values, dx),
            n => match self {
                Quadrature::Trapezoid => trapezoid(values, dx),
                Quadrature::Simpson if n % 2 == 1 => simpson(values, dx),
                Quadrature::Simpson => {
                    simpson(&values[..n - 1], dx) + trapezoid(&values[n - 2..], dx)
                }
            },
        }
    }
}
fn trapezoid(values: &[f64], dx: f64) -> f64 {
    values.windows(2).map(|w| (w[0] + w[1]) * 0.5).sum::<f64>() * dx
}
/// Expects an odd number of points.
fn simpson(values: &[f64], dx: f64) -> f64 {
    let last = values.len() - 1;
    let interior: f64 = values[1..last]
        .iter()
        .enumerate()
        .map(|(i, v)| if i % 2 == 0 { 4.0 * v } else { 2.0 * v })
        .sum();
    (values[0] + interior + values[last]) * dx / 3.0
}
/// Spectral density estimate used by the band power estimator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpectralMethod {
    /// Hann-windowed, overlapping segments of `welch_segment` samples.
    #[default]
    Welch,
    /// One rectangular-window segment spanning the whole buffer.
    Periodogram,
}
/// Welch power spectral density estimator for a fixed segment length.
///
/// Each segment is mean-detrended and weighted by a periodic Hann window; periodograms are
/// density-scaled, folded to one side and averaged. [`periodogram`](Self::periodogram) is the
/// single-segment, rectangular-window case.
#[derive(Clone)]
pub struct WelchEstimator {
    sample_rate_hz: f64,
    segment: usize,
    step: usize,
    window: Vec<f64>,
    scale: f64,
    fft: Arc<dyn Fft<f64>>,
}
impl std::fmt::Debug for WelchEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WelchEstimator")
            .field("sample_rate_hz", &self.sample_rate_hz)
            .field("segment", &self.segment)
            .field("step", &self.step)
            .finish()
    }
}
impl WelchEstimator {
    pub fn new(sample_rate_hz: f64, segment: usize, overlap: f64) -> Result<Self> {
        if segment < 8 {
            return Err(PipelineError::Config(format!(
                "Welch segment must be at least 8 samples, got {segment}"
            )));
        }
        if !(0.0..1.0).contains(&overlap) {
            return Err(PipelineError::Config(format!(
                "Welch overlap must be in [0, 1), got {overlap}"
            )));
        }
        let overlap_len = (segment as f64 * overlap).floor() as usize;
        Ok(Self::build(
            sample_rate_hz,
            segment,
            segment - overlap_len,
            hann_periodic(segment),
        ))
    }
    /// Plain periodogram of `len` samples. Longer signals are split into back-to-back
    /// segments of `len` and averaged.
    pub fn periodogram(sample_rate_hz: f64, len: usize) -> Result<Self> {
        if len < 8 {
            return Err(PipelineError::Config(format!(
                "periodogram needs at least 8 samples, got {len}"
            )));
        }
        Ok(Self::build(sample_rate_hz, len, len, vec![1.0; len]))
    }
    fn build(sample_rate_hz: f64, segment: usize, step: usize, window: Vec<f64>) -> Self {
        let scale = 1.0 / (sample_rate_hz * window.iter().map(|w| w * w).sum::<f64>());
        let fft = FftPlanner::<f64>::new().plan_fft_forward(segment);
        Self {
            sample_rate_hz,
            segment,
            step,
            window,
            scale,
            fft,
        }
    }
    pub fn segment_len(&self) -> usize {
        self.segment
    }
    pub fn resolution_hz(&self) -> f64 {
        self.sample_rate_hz / self.segment as f64
    }
    /// Bin centre frequencies, DC through Nyquist.
    pub fn frequencies(&self) -> Vec<f64> {
        (0..=self.segment / 2)
            .map(|k| k as f64 * self.resolution_hz())
            .collect()
    }
    pub fn segment_count(&self, len: usize) -> usize {
        if len < self.segment {
            0
        } else {
            (len - self.segment) / self.step + 1
        }
    }
    /// One-sided PSD of `signal` in units²/Hz, one value per entry of [`frequencies`](Self::frequencies).
    pub fn density(&self, signal: &[f64]) -> Result<Vec<f64>> {
        let segments = self.segment_count(signal.len());
        if segments == 0 {
            return Err(PipelineError::Shape(format!(
                "Welch estimate needs at least {} samples, got {}",
                self.segment,
                signal.len()
            )));
        }
        let bins = self.segment / 2 + 1;
        let mut psd = vec![0.0; bins];
        let mut buffer = vec![Complex64::new(0.0, 0.0); self.segment];
        for s in 0..segments {
            let chunk = &signal[s * self.step..s * self.step + self.segment];
            let mean = chunk.iter().sum::<f64>() / self.segment as f64;
            for ((slot, &x), &w) in buffer.iter_mut().zip(chunk).zip(&self.window) {
                *slot = Complex64::new((x - mean) * w, 0.0);
            }
            self.fft.process(&mut buffer);
            for (acc, c) in psd.iter_mut().zip(&buffer) {
                *acc += c.norm_sqr();
            }
        }
        let norm = self.scale / segments as f64;
        let nyquist_bin = if self.segment % 2 == 0 { bins - 1 } else { bins };
        for (k, value) in psd.iter_mut().enumerate() {
            *value *= norm;
            if k > 0 && k < nyquist_bin {
                *value *= 2.0;
            }
        }
        Ok(psd)
    }
}
fn hann_periodic(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / size as f64).cos())
        .collect()
}
