use std::collections::BTreeMap;
use std::ops::Range;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use crate::config::{BandTable, PipelineConfig};
use crate::drivers::filter::{FilterCoefficients, ZeroPhaseFilter};
use crate::drivers::spectrum::{Quadrature, SpectralMethod, WelchEstimator};
use crate::drivers::{PipelineError, Result, SampleBuffer};
use crate::types::{Band, PowerVector};
/// How channels are split into groups (e.g. hemispheres) before averaging.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelGrouping {
    /// First half / second half. Needs an even channel count.
    #[default]
    Halves,
    /// Group id for each channel index.
    Explicit(Vec<usize>),
}
impl ChannelGrouping {
    pub fn validate(&self) -> Result<()> {
        match self {
            ChannelGrouping::Explicit(ids) if ids.is_empty() => Err(PipelineError::Config(
                "explicit channel grouping must assign at least one channel".into(),
            )),
            _ => Ok(()),
        }
    }
    /// Channel indices per group, in ascending group id order.
    pub fn resolve(&self, channel_count: usize) -> Result<Vec<Vec<usize>>> {
        match self {
            ChannelGrouping::Halves => {
                if channel_count == 0 || channel_count % 2 != 0 {
                    return Err(PipelineError::Shape(format!(
                        "channel count must be even to split into two groups, got {channel_count}"
                    )));
                }
                let half = channel_count / 2;
                Ok(vec![(0..half).collect(), (half..channel_count).collect()])
            }
            ChannelGrouping::Explicit(ids) => {
                if ids.len() != channel_count {
                    return Err(PipelineError::Shape(format!(
                        "grouping covers {} channels, buffer has {channel_count}",
                        ids.len()
                    )));
                }
                let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
                for (channel, &group) in ids.iter().enumerate() {
                    groups.entry(group).or_default().push(channel);
                }
                Ok(groups.into_values().collect())
            }
        }
    }
}
/// Denominator used for per-channel band power.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelativeTo {
    /// Integral of the whole one-sided spectrum. Band values sum to at most 1; power outside
    /// the five bands (below delta, above gamma) is left out of the vector.
    #[default]
    FullSpectrum,
    /// Sum of the five band integrals. The only setting whose Power Vector sums to exactly 1
    /// for every non-degenerate buffer.
    DefinedBands,
    /// No normalization: band integrals in signal units² (µV² for EEG). The classifier still
    /// normalizes before comparing bands.
    Absolute,
}
/// Turns a Sample Buffer into the five-band relative power vector.
///
/// Holds only construction-time state (filter sections, Welch plan, band bin ranges), so
/// `process` is pure and repeatable.
#[derive(Clone, Debug)]
pub struct BandpowerEstimator {
    filter: ZeroPhaseFilter,
    welch: WelchEstimator,
    bands: BandTable,
    band_bins: [Range<usize>; 5],
    quadrature: Quadrature,
    relative_to: RelativeTo,
    grouping: ChannelGrouping,
    min_samples: usize,
}
impl BandpowerEstimator {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        let filter = ZeroPhaseFilter::bandpass(
            config.filter_order,
            config.bandpass_low_hz,
            config.bandpass_high_hz,
            config.sampling_rate_hz,
        )?;
        let welch = match config.spectral_method {
            SpectralMethod::Welch => WelchEstimator::new(
                config.sampling_rate_hz,
                config.welch_segment,
                config.welch_overlap,
            )?,
            SpectralMethod::Periodogram => {
                WelchEstimator::periodogram(config.sampling_rate_hz, config.spectral_segment())?
            }
        };
        let freqs = welch.frequencies();
        let band_bins = Band::ALL.map(|band| {
            let range = config.bands.range(band);
            let start = freqs.iter().position(|&f| f >= range.low_hz).unwrap_or(freqs.len());
            let end = freqs
                .iter()
                .rposition(|&f| range.contains(f))
                .map(|k| k + 1)
                .unwrap_or(start);
            start..end.max(start)
        });
        debug!(
            "estimator ready: {} biquads, {} Hz bins, band bins {:?}",
            filter.sections().len(),
            welch.resolution_hz(),
            band_bins
        );
        Ok(Self {
            filter,
            welch,
            bands: config.bands.clone(),
            band_bins,
            quadrature: config.quadrature,
            relative_to: config.relative_to,
            grouping: config.grouping.clone(),
            min_samples: config.min_samples(),
        })
    }
    pub fn coefficients(&self) -> FilterCoefficients {
        self.filter.coefficients()
    }
    pub fn bands(&self) -> &BandTable {
        &self.bands
    }
    pub fn min_samples(&self) -> usize {
        self.min_samples
    }
    /// Filters every channel, estimates relative band power per channel, averages within each
    /// channel group and then across groups.
    pub fn process(&self, buffer: &SampleBuffer) -> Result<PowerVector> {
        let samples = buffer.time_samples();
        if samples < self.min_samples {
            return Err(PipelineError::Shape(format!(
                "buffer has {samples} samples, at least {} required",
                self.min_samples
            )));
        }
        let groups = self.grouping.resolve(buffer.channel_count())?;
        let mut group_means = Vec::with_capacity(groups.len());
        for (group_id, channels) in groups.iter().enumerate() {
            let mut per_channel = Vec::with_capacity(channels.len());
            for &channel in channels {
                let signal = buffer.channel(channel).to_vec();
                match self.channel_powers(&signal)? {
                    Some(powers) => per_channel.push(powers),
                    None => {
                        warn!("channel {channel} has no spectral power; counting it as zero in every band");
                        per_channel.push(PowerVector::default());
                    }
                }
            }
            let mean = PowerVector::mean_of(&per_channel).unwrap_or_default();
            debug!("group {group_id}: {mean:?}");
            group_means.push(mean);
        }
        Ok(PowerVector::mean_of(&group_means).unwrap_or_default())
    }
    /// Band powers of one raw channel, normalized per [`RelativeTo`], or `None` when its
    /// spectrum integrates to zero (e.g. a flat-line channel).
    pub fn channel_powers(&self, signal: &[f64]) -> Result<Option<PowerVector>> {
        let filtered = self.filter.apply(signal)?;
        let psd = self.welch.density(&filtered)?;
        let df = self.welch.resolution_hz();
        let absolute =
            PowerVector::from_fn(|band| self.quadrature.integrate(&psd[self.band_bins[band.index()].clone()], df));
        let full = self.quadrature.integrate(&psd, df);
        if !(full > 0.0 && full.is_finite()) {
            return Ok(None);
        }
        let total = match self.relative_to {
            RelativeTo::FullSpectrum => full,
            RelativeTo::DefinedBands => absolute.total(),
            RelativeTo::Absolute => return Ok(Some(absolute)),
        };
        if !(total > 0.0 && total.is_finite()) {
            return Ok(None);
        }
        Ok(Some(absolute.scaled(1.0 / total)))
    }
}
