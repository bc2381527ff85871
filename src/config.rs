// src/config.rs
//! Static run configuration. Loaded once at start-up, never reloaded.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::detector::{StabilizationMode, StabilizationPolicy};
use crate::drivers::filter::pad_len_for;
use crate::drivers::{
    ChannelGrouping, PipelineError, Quadrature, RelativeTo, Result, SpectralMethod,
};
use crate::stimulus::StimulusMap;
use crate::types::Band;

/// Periods of the band-pass low edge a window must span.
pub const MIN_PERIODS: f64 = 3.0;

/// Closed frequency interval, both edges included.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BandRange {
    pub low_hz: f64,
    pub high_hz: f64,
}

impl BandRange {
    pub const fn new(low_hz: f64, high_hz: f64) -> Self {
        Self { low_hz, high_hz }
    }

    pub fn contains(&self, freq_hz: f64) -> bool {
        freq_hz >= self.low_hz && freq_hz <= self.high_hz
    }
}

/// Frequency interval for each of the five bands.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<Band, BandRange>", into = "BTreeMap<Band, BandRange>")]
pub struct BandTable {
    ranges: [BandRange; 5],
}

impl BandTable {
    pub fn new(ranges: [BandRange; 5]) -> Self {
        Self { ranges }
    }

    pub fn range(&self, band: Band) -> BandRange {
        self.ranges[band.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Band, BandRange)> + '_ {
        Band::ALL.into_iter().map(move |band| (band, self.range(band)))
    }

    fn validate(&self) -> Result<()> {
        for (band, range) in self.iter() {
            if !(range.low_hz >= 0.0 && range.low_hz < range.high_hz && range.high_hz.is_finite()) {
                return Err(PipelineError::Config(format!(
                    "band {band} needs 0 <= low < high, got {}..{}",
                    range.low_hz, range.high_hz
                )));
            }
        }
        Ok(())
    }
}

impl Default for BandTable {
    fn default() -> Self {
        Self::new([
            BandRange::new(0.5, 4.0),
            BandRange::new(4.0, 8.0),
            BandRange::new(8.0, 13.0),
            BandRange::new(13.0, 30.0),
            BandRange::new(30.0, 50.0),
        ])
    }
}

impl TryFrom<BTreeMap<Band, BandRange>> for BandTable {
    type Error = PipelineError;
    fn try_from(map: BTreeMap<Band, BandRange>) -> Result<Self> {
        let mut ranges = [BandRange::new(0.0, 0.0); 5];
        for band in Band::ALL {
            ranges[band.index()] = *map
                .get(&band)
                .ok_or_else(|| PipelineError::Config(format!("missing band `{band}`")))?;
        }
        Ok(Self { ranges })
    }
}

impl From<BandTable> for BTreeMap<Band, BandRange> {
    fn from(table: BandTable) -> Self {
        table.iter().collect()
    }
}

/// Everything the estimator, classifier and driver need for one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sampling_rate_hz: f64,
    pub window_seconds: f64,
    /// Time between consecutive update ticks; windows overlap when shorter than the window.
    pub update_interval_seconds: f64,
    pub bandpass_low_hz: f64,
    pub bandpass_high_hz: f64,
    /// Butterworth prototype order; the band-pass cascade has this many biquads.
    pub filter_order: usize,
    pub bands: BandTable,
    pub spectral_method: SpectralMethod,
    /// Welch segment length in samples.
    pub welch_segment: usize,
    /// Fraction of a segment shared with its neighbour.
    pub welch_overlap: f64,
    pub quadrature: Quadrature,
    pub relative_to: RelativeTo,
    pub grouping: ChannelGrouping,
    pub hysteresis_margin: f64,
    pub stabilization: StabilizationMode,
    pub stimuli: StimulusMap,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sampling_rate_hz: 500.0,
            window_seconds: 4.0,
            update_interval_seconds: 2.0,
            bandpass_low_hz: 3.0,
            bandpass_high_hz: 30.0,
            filter_order: 4,
            bands: BandTable::default(),
            spectral_method: SpectralMethod::default(),
            welch_segment: 512,
            welch_overlap: 0.5,
            quadrature: Quadrature::default(),
            relative_to: RelativeTo::default(),
            grouping: ChannelGrouping::default(),
            hysteresis_margin: 0.20,
            stabilization: StabilizationMode::default(),
            stimuli: StimulusMap::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn nyquist_hz(&self) -> f64 {
        self.sampling_rate_hz / 2.0
    }

    /// Samples per Sample Buffer.
    pub fn buffer_len(&self) -> usize {
        (self.sampling_rate_hz * self.window_seconds).round() as usize
    }

    /// New samples between update ticks.
    pub fn update_len(&self) -> usize {
        (self.sampling_rate_hz * self.update_interval_seconds).round() as usize
    }

    /// Samples per spectral segment: the Welch segment, or the whole buffer for a periodogram.
    pub fn spectral_segment(&self) -> usize {
        match self.spectral_method {
            SpectralMethod::Welch => self.welch_segment,
            SpectralMethod::Periodogram => self.buffer_len(),
        }
    }

    /// Shortest buffer the estimator accepts.
    pub fn min_samples(&self) -> usize {
        let periods = (MIN_PERIODS * self.sampling_rate_hz / self.bandpass_low_hz).ceil() as usize;
        periods
            .max(pad_len_for(self.filter_order) + 1)
            .max(self.spectral_segment())
    }

    pub fn policy(&self) -> StabilizationPolicy {
        StabilizationPolicy {
            mode: self.stabilization,
            margin: self.hysteresis_margin,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let cfg_err = |msg: String| Err(PipelineError::Config(msg));
        if !(self.sampling_rate_hz > 0.0 && self.sampling_rate_hz.is_finite()) {
            return cfg_err(format!("sampling rate must be positive, got {}", self.sampling_rate_hz));
        }
        if !(self.update_interval_seconds > 0.0 && self.window_seconds >= self.update_interval_seconds) {
            return cfg_err(format!(
                "need 0 < update interval ({} s) <= window ({} s)",
                self.update_interval_seconds, self.window_seconds
            ));
        }
        let (wl, wh) = (
            self.bandpass_low_hz / self.nyquist_hz(),
            self.bandpass_high_hz / self.nyquist_hz(),
        );
        if !(wl > 0.0 && wl < wh && wh < 1.0) {
            return cfg_err(format!(
                "band-pass {}..{} Hz must satisfy 0 < low < high < Nyquist ({} Hz)",
                self.bandpass_low_hz,
                self.bandpass_high_hz,
                self.nyquist_hz()
            ));
        }
        if self.filter_order == 0 {
            return cfg_err("filter order must be at least 1".into());
        }
        self.bands.validate()?;
        if self.welch_segment < 8 || !(0.0..1.0).contains(&self.welch_overlap) {
            return cfg_err(format!(
                "Welch segment {} (>= 8) and overlap {} (in [0, 1)) out of range",
                self.welch_segment, self.welch_overlap
            ));
        }
        self.policy().validate()?;
        if self.buffer_len() < self.min_samples() {
            return cfg_err(format!(
                "window of {} samples is shorter than the {} needed for a stable estimate",
                self.buffer_len(),
                self.min_samples()
            ));
        }
        self.grouping.validate()?;
        self.stimuli.validate()?;
        Ok(())
    }
}
