// src/types.rs
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::drivers::{ErrorKind, PipelineError, Result};
use crate::stimulus::Stimulus;

/// Canonical EEG frequency bands, declared in tie-break priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Delta,
    Theta,
    Alpha,
    Beta,
    Gamma,
}

impl Band {
    /// All bands, highest priority first.
    pub const ALL: [Band; 5] = [Band::Delta, Band::Theta, Band::Alpha, Band::Beta, Band::Gamma];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Band::Delta => "delta",
            Band::Theta => "theta",
            Band::Alpha => "alpha",
            Band::Beta => "beta",
            Band::Gamma => "gamma",
        }
    }

    pub fn from_name(name: &str) -> Option<Band> {
        Band::ALL
            .into_iter()
            .find(|band| band.name().eq_ignore_ascii_case(name.trim()))
    }

    pub fn state(self) -> BrainState {
        match self {
            Band::Delta => BrainState::Delta,
            Band::Theta => BrainState::Theta,
            Band::Alpha => BrainState::Alpha,
            Band::Beta => BrainState::Beta,
            Band::Gamma => BrainState::Gamma,
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Discrete brain-state label emitted by the classifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BrainState {
    Delta,
    Theta,
    Alpha,
    Beta,
    Gamma,
}

impl BrainState {
    pub const ALL: [BrainState; 5] = [
        BrainState::Delta,
        BrainState::Theta,
        BrainState::Alpha,
        BrainState::Beta,
        BrainState::Gamma,
    ];

    pub fn band(self) -> Band {
        match self {
            BrainState::Delta => Band::Delta,
            BrainState::Theta => Band::Theta,
            BrainState::Alpha => Band::Alpha,
            BrainState::Beta => Band::Beta,
            BrainState::Gamma => Band::Gamma,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BrainState::Delta => "DELTA",
            BrainState::Theta => "THETA",
            BrainState::Alpha => "ALPHA",
            BrainState::Beta => "BETA",
            BrainState::Gamma => "GAMMA",
        }
    }
}

impl fmt::Display for BrainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `pad` keeps width/alignment flags working in tabular output.
        f.pad(self.label())
    }
}

/// One scalar per band. Serializes as a `{ "delta": .., "theta": .., .. }` map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct PowerVector {
    values: [f64; 5],
}

impl PowerVector {
    /// Values in `Band::ALL` order.
    pub fn new(values: [f64; 5]) -> Self {
        Self { values }
    }

    pub fn from_fn(mut f: impl FnMut(Band) -> f64) -> Self {
        let mut values = [0.0; 5];
        for band in Band::ALL {
            values[band.index()] = f(band);
        }
        Self { values }
    }

    /// Builds a vector from `(band name, value)` pairs. Every band must be present exactly once.
    pub fn from_named<'a>(entries: impl IntoIterator<Item = (&'a str, f64)>) -> Result<Self> {
        let mut slots: [Option<f64>; 5] = [None; 5];
        for (name, value) in entries {
            let band = Band::from_name(name)
                .ok_or_else(|| PipelineError::Config(format!("unknown band `{name}`")))?;
            if slots[band.index()].replace(value).is_some() {
                return Err(PipelineError::Config(format!("band `{band}` given twice")));
            }
        }
        let mut values = [0.0; 5];
        for band in Band::ALL {
            values[band.index()] = slots[band.index()]
                .ok_or_else(|| PipelineError::Config(format!("missing band `{band}`")))?;
        }
        Ok(Self { values })
    }

    pub fn get(&self, band: Band) -> f64 {
        self.values[band.index()]
    }

    pub fn set(&mut self, band: Band, value: f64) {
        self.values[band.index()] = value;
    }

    pub fn values(&self) -> [f64; 5] {
        self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (Band, f64)> + '_ {
        Band::ALL.into_iter().map(move |band| (band, self.get(band)))
    }

    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Band with the largest value; exact ties go to the higher-priority band.
    pub fn dominant(&self) -> Band {
        let mut best = Band::Delta;
        for band in Band::ALL.into_iter().skip(1) {
            if self.get(band) > self.get(best) {
                best = band;
            }
        }
        best
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self::from_fn(|band| self.get(band) * factor)
    }

    pub fn mean_of(vectors: &[PowerVector]) -> Option<PowerVector> {
        if vectors.is_empty() {
            return None;
        }
        let n = vectors.len() as f64;
        Some(PowerVector::from_fn(|band| {
            vectors.iter().map(|v| v.get(band)).sum::<f64>() / n
        }))
    }
}

impl Index<Band> for PowerVector {
    type Output = f64;
    fn index(&self, band: Band) -> &f64 {
        &self.values[band.index()]
    }
}

impl TryFrom<BTreeMap<String, f64>> for PowerVector {
    type Error = PipelineError;
    fn try_from(map: BTreeMap<String, f64>) -> Result<Self> {
        PowerVector::from_named(map.iter().map(|(k, v)| (k.as_str(), *v)))
    }
}

impl From<PowerVector> for BTreeMap<String, f64> {
    fn from(vector: PowerVector) -> Self {
        vector
            .iter()
            .map(|(band, value)| (band.name().to_owned(), value))
            .collect()
    }
}

/// Where the engine pulls samples from.
#[derive(PartialEq, Clone, Copy, Debug)]
pub enum SourceMode {
    Synthetic,
    Recording,
}

/// Commands sent to a running engine.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineCommand {
    Stop,
    /// Forget the classifier's previous label; the next tick accepts its argmax.
    ResetState,
}

/// Result of one successful update tick.
#[derive(Clone, Debug, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub elapsed_seconds: f64,
    pub powers: PowerVector,
    pub state: BrainState,
    /// Set only when the selected stimulus changed on this tick.
    pub stimulus_changed: Option<Stimulus>,
}

/// Messages the engine sends back to its owner.
#[derive(Clone, Debug)]
pub enum EngineEvent {
    Log(String),
    Tick(TickReport),
    /// The tick was dropped; `reused` is the label still in effect, if any.
    TickFailed {
        tick: u64,
        kind: ErrorKind,
        message: String,
        reused: Option<BrainState>,
    },
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dominant_prefers_priority_on_ties() {
        let v = PowerVector::new([0.1, 0.3, 0.3, 0.3, 0.0]);
        assert_eq!(v.dominant(), Band::Theta);
        let v = PowerVector::new([0.2, 0.2, 0.2, 0.2, 0.2]);
        assert_eq!(v.dominant(), Band::Delta);
        let v = PowerVector::new([0.0, 0.0, 0.1, 0.2, 0.2]);
        assert_eq!(v.dominant(), Band::Beta);
    }

    #[test]
    fn from_named_rejects_missing_and_unknown_bands() {
        let err = PowerVector::from_named([("delta", 0.1), ("theta", 0.1), ("alpha", 0.1), ("beta", 0.1)])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        let err = PowerVector::from_named([("mu", 0.1)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn serializes_as_band_map() {
        let v = PowerVector::new([0.1, 0.2, 0.3, 0.25, 0.15]);
        let json = serde_json::to_string(&v).unwrap();
        assert!(json.contains("\"alpha\":0.3"));
        let back: PowerVector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
        let missing = serde_json::from_str::<PowerVector>(r#"{"delta":1.0}"#);
        assert!(missing.is_err());
    }

    #[test]
    fn labels_are_uppercase() {
        assert_eq!(BrainState::Alpha.to_string(), "ALPHA");
        assert_eq!(format!("{:<7}|", BrainState::Beta), "BETA   |");
        assert_eq!(Band::Gamma.state(), BrainState::Gamma);
        assert_eq!(BrainState::Theta.band(), Band::Theta);
    }
}
