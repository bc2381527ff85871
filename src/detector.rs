// src/detector.rs
//! Maps a band power vector to a brain-state label, with optional hysteresis so that
//! noise-level changes between neighbouring bands do not flip the label every tick.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::drivers::{PipelineError, Result};
use crate::types::{BrainState, PowerVector};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilizationMode {
    /// Switch only when the challenger clearly beats the current label.
    #[default]
    Hysteresis,
    /// Always report the raw argmax; history is recorded but ignored.
    Argmax,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StabilizationPolicy {
    pub mode: StabilizationMode,
    /// Fractional excess the challenger needs, e.g. 0.20 for 20%.
    pub margin: f64,
}

impl Default for StabilizationPolicy {
    fn default() -> Self {
        Self {
            mode: StabilizationMode::Hysteresis,
            margin: 0.20,
        }
    }
}

impl StabilizationPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.margin >= 0.0 && self.margin.is_finite() {
            Ok(())
        } else {
            Err(PipelineError::Config(format!(
                "hysteresis margin must be a non-negative fraction, got {}",
                self.margin
            )))
        }
    }
}

/// Label reported on the last successful call and the relative powers seen on that call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClassifierState {
    pub label: BrainState,
    pub relative: PowerVector,
}

/// Normalizes `powers` by their total.
pub fn relative_powers(powers: &PowerVector) -> Result<PowerVector> {
    if !powers.is_finite() {
        return Err(PipelineError::DegenerateInput(format!(
            "band powers must be finite, got {powers:?}"
        )));
    }
    let total = powers.total();
    if total <= 0.0 {
        return Err(PipelineError::DegenerateInput(format!(
            "total band power is {total}, nothing to classify"
        )));
    }
    Ok(powers.scaled(1.0 / total))
}

/// One classification step against an explicit previous state.
///
/// Returns the state to carry into the next call. The caller's previous state is never
/// touched, so a failed call leaves it exactly as it was.
pub fn classify(
    powers: &PowerVector,
    previous: Option<&ClassifierState>,
    policy: StabilizationPolicy,
) -> Result<ClassifierState> {
    policy.validate()?;
    let relative = relative_powers(powers)?;
    let candidate = relative.dominant().state();
    let label = match (policy.mode, previous) {
        (StabilizationMode::Hysteresis, Some(prev)) if prev.label != candidate => {
            let held = prev.relative[prev.label.band()];
            let challenger = relative[candidate.band()];
            if challenger > held * (1.0 + policy.margin) {
                debug!("switching {} -> {candidate}: {challenger:.3} beats {held:.3}", prev.label);
                candidate
            } else {
                debug!("holding {}: {candidate} at {challenger:.3} does not beat {held:.3}", prev.label);
                prev.label
            }
        }
        _ => candidate,
    };
    Ok(ClassifierState { label, relative })
}

/// Owns the carried-over state for one stream. Single writer; not meant to be shared.
#[derive(Clone, Debug, Default)]
pub struct StateClassifier {
    policy: StabilizationPolicy,
    previous: Option<ClassifierState>,
}

impl StateClassifier {
    pub fn new(policy: StabilizationPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            policy,
            previous: None,
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Self::new(config.policy())
    }

    pub fn detect_state(&mut self, powers: &PowerVector) -> Result<BrainState> {
        let next = self.evaluate(powers)?;
        self.accept(next);
        Ok(next.label)
    }

    /// Classifies against the carried-over state without updating it.
    pub fn evaluate(&self, powers: &PowerVector) -> Result<ClassifierState> {
        classify(powers, self.previous.as_ref(), self.policy)
    }

    /// Carries `next` into the following call.
    pub fn accept(&mut self, next: ClassifierState) {
        self.previous = Some(next);
    }

    /// Same as [`detect_state`](Self::detect_state) for a name-keyed map, which must name all
    /// five bands.
    pub fn detect_named<'a>(
        &mut self,
        powers: impl IntoIterator<Item = (&'a str, f64)>,
    ) -> Result<BrainState> {
        let vector = PowerVector::from_named(powers)?;
        self.detect_state(&vector)
    }

    pub fn previous(&self) -> Option<&ClassifierState> {
        self.previous.as_ref()
    }

    pub fn policy(&self) -> StabilizationPolicy {
        self.policy
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::ErrorKind;
    use crate::types::Band;

    fn vector(delta: f64, theta: f64, alpha: f64, beta: f64, gamma: f64) -> PowerVector {
        PowerVector::new([delta, theta, alpha, beta, gamma])
    }

    #[test]
    fn first_call_takes_argmax_regardless_of_margin() {
        let mut classifier = StateClassifier::new(StabilizationPolicy {
            mode: StabilizationMode::Hysteresis,
            margin: 10.0,
        })
        .unwrap();
        assert_eq!(
            classifier.detect_state(&vector(0.1, 0.1, 0.2, 0.5, 0.1)).unwrap(),
            BrainState::Beta
        );
    }

    #[test]
    fn alpha_holds_against_weak_beta() {
        let mut classifier = StateClassifier::default();
        let tick1 = vector(0.10, 0.10, 0.40, 0.30, 0.10);
        let tick2 = vector(0.10, 0.10, 0.30, 0.44, 0.06);
        assert_eq!(classifier.detect_state(&tick1).unwrap(), BrainState::Alpha);
        // 0.44 < 0.40 * 1.20
        assert_eq!(classifier.detect_state(&tick2).unwrap(), BrainState::Alpha);
    }

    #[test]
    fn switches_only_past_the_margin() {
        let policy = StabilizationPolicy::default();
        let prev = classify(&vector(0.1, 0.1, 0.5, 0.2, 0.1), None, policy).unwrap();
        assert_eq!(prev.label, BrainState::Alpha);
        // p = 0.5, threshold 0.6
        let hold = classify(&vector(0.0, 0.0, 0.42, 0.58, 0.0), Some(&prev), policy).unwrap();
        assert_eq!(hold.label, BrainState::Alpha);
        let switch = classify(&vector(0.0, 0.0, 0.35, 0.65, 0.0), Some(&prev), policy).unwrap();
        assert_eq!(switch.label, BrainState::Beta);
    }

    #[test]
    fn challenger_exactly_at_threshold_does_not_switch() {
        let policy = StabilizationPolicy {
            mode: StabilizationMode::Hysteresis,
            margin: 0.25,
        };
        let prev = classify(&vector(0.0, 0.0, 0.5, 0.25, 0.25), None, policy).unwrap();
        assert_eq!(prev.relative[Band::Alpha], 0.5);
        // q == p * (1 + margin) == 0.625, all exact in binary
        let at = classify(&vector(0.0, 0.0, 0.375, 0.625, 0.0), Some(&prev), policy).unwrap();
        assert_eq!(at.relative[Band::Beta], 0.5 * 1.25);
        assert_eq!(at.label, BrainState::Alpha);
    }

    #[test]
    fn rejects_negative_or_nan_margin() {
        for margin in [-0.1, f64::NAN, f64::INFINITY] {
            let policy = StabilizationPolicy {
                mode: StabilizationMode::Hysteresis,
                margin,
            };
            assert_eq!(StateClassifier::new(policy).unwrap_err().kind(), ErrorKind::Config);
            let err = classify(&vector(0.1, 0.1, 0.5, 0.2, 0.1), None, policy).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Config);
        }
    }

    #[test]
    fn recorded_vector_tracks_latest_call() {
        let mut classifier = StateClassifier::default();
        classifier.detect_state(&vector(0.1, 0.1, 0.5, 0.2, 0.1)).unwrap();
        classifier.detect_state(&vector(0.1, 0.1, 0.35, 0.4, 0.05)).unwrap();
        let prev = classifier.previous().unwrap();
        assert_eq!(prev.label, BrainState::Alpha);
        assert!((prev.relative[Band::Alpha] - 0.35).abs() < 1e-12);
        // 0.45 > 0.35 * 1.2
        assert_eq!(
            classifier.detect_state(&vector(0.1, 0.1, 0.3, 0.45, 0.05)).unwrap(),
            BrainState::Beta
        );
    }

    #[test]
    fn argmax_mode_ignores_history() {
        let mut classifier = StateClassifier::new(StabilizationPolicy {
            mode: StabilizationMode::Argmax,
            margin: 0.2,
        })
        .unwrap();
        classifier.detect_state(&vector(0.1, 0.1, 0.4, 0.3, 0.1)).unwrap();
        assert_eq!(
            classifier.detect_state(&vector(0.1, 0.1, 0.3, 0.44, 0.06)).unwrap(),
            BrainState::Beta
        );
    }

    #[test]
    fn ties_resolve_by_band_priority() {
        let mut classifier = StateClassifier::default();
        assert_eq!(
            classifier.detect_state(&vector(0.1, 0.3, 0.3, 0.2, 0.1)).unwrap(),
            BrainState::Theta
        );
        classifier.reset();
        assert_eq!(
            classifier.detect_state(&vector(0.0, 0.0, 0.0, 0.5, 0.5)).unwrap(),
            BrainState::Beta
        );
    }

    #[test]
    fn normalizes_unnormalized_input() {
        let state = classify(&vector(1.0, 1.0, 6.0, 1.0, 1.0), None, StabilizationPolicy::default())
            .unwrap();
        assert!((state.relative[Band::Alpha] - 0.6).abs() < 1e-12);
        assert!((state.relative.total() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_input_leaves_state_untouched() {
        let mut classifier = StateClassifier::default();
        classifier.detect_state(&vector(0.1, 0.1, 0.5, 0.2, 0.1)).unwrap();
        let before = *classifier.previous().unwrap();
        let err = classifier.detect_state(&PowerVector::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DegenerateInput);
        let err = classifier
            .detect_state(&vector(f64::NAN, 0.1, 0.1, 0.1, 0.1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DegenerateInput);
        assert_eq!(*classifier.previous().unwrap(), before);
    }

    #[test]
    fn named_input_must_cover_every_band() {
        let mut classifier = StateClassifier::default();
        let err = classifier
            .detect_named([("delta", 0.2), ("theta", 0.2), ("alpha", 0.6)])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(classifier.previous().is_none());
        let label = classifier
            .detect_named([
                ("delta", 0.1),
                ("theta", 0.1),
                ("alpha", 0.6),
                ("beta", 0.1),
                ("gamma", 0.1),
            ])
            .unwrap();
        assert_eq!(label, BrainState::Alpha);
    }
}
