// src/stimulus.rs
//! Label -> stimulus selection. Playback itself lives outside this crate; sinks only get told
//! what to play.

use std::collections::BTreeMap;

use log::info;
use serde::{Deserialize, Serialize};

use crate::drivers::{PipelineError, Result};
use crate::types::BrainState;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stimulus {
    /// Binaural beat frequency, for display.
    pub beat_hz: f64,
    pub file: String,
}

impl Stimulus {
    pub fn new(beat_hz: f64, file: impl Into<String>) -> Self {
        Self {
            beat_hz,
            file: file.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StimulusMap {
    entries: BTreeMap<BrainState, Stimulus>,
}

impl StimulusMap {
    pub fn new(entries: BTreeMap<BrainState, Stimulus>) -> Self {
        Self { entries }
    }

    pub fn get(&self, state: BrainState) -> Option<&Stimulus> {
        self.entries.get(&state)
    }

    pub fn validate(&self) -> Result<()> {
        match BrainState::ALL.into_iter().find(|s| !self.entries.contains_key(s)) {
            Some(missing) => Err(PipelineError::Config(format!("no stimulus for state {missing}"))),
            None => Ok(()),
        }
    }
}

impl Default for StimulusMap {
    fn default() -> Self {
        Self::new(BTreeMap::from([
            (BrainState::Gamma, Stimulus::new(13.0, "./audio_files/13Hz.wav")),
            (BrainState::Beta, Stimulus::new(10.0, "./audio_files/10Hz.wav")),
            (BrainState::Alpha, Stimulus::new(7.0, "./audio_files/7Hz.wav")),
            (BrainState::Theta, Stimulus::new(4.0, "./audio_files/5Hz.wav")),
            (BrainState::Delta, Stimulus::new(7.0, "./audio_files/7Hz.wav")),
        ]))
    }
}

/// Effector that starts a stimulus. Called only when the selected file changes.
pub trait StimulusSink {
    fn play(&mut self, state: BrainState, stimulus: &Stimulus) -> Result<()>;
}

/// Sink that only logs and remembers what it was asked to play.
#[derive(Debug, Default)]
pub struct LoggingSink {
    pub played: Vec<(BrainState, Stimulus)>,
}

impl StimulusSink for LoggingSink {
    fn play(&mut self, state: BrainState, stimulus: &Stimulus) -> Result<()> {
        info!("{state}: now playing {} ({} Hz)", stimulus.file, stimulus.beat_hz);
        self.played.push((state, stimulus.clone()));
        Ok(())
    }
}

/// Tracks the stimulus currently playing so a sink is only poked on real changes.
#[derive(Clone, Debug)]
pub struct StimulusSelector {
    map: StimulusMap,
    current: Option<String>,
}

impl StimulusSelector {
    pub fn new(map: StimulusMap) -> Self {
        Self { map, current: None }
    }

    pub fn current_file(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Returns the stimulus to switch to, or `None` when the same file keeps playing.
    /// Two labels that share a file (DELTA and ALPHA by default) do not restart playback.
    /// Nothing is recorded until [`commit`](Self::commit).
    pub fn pending(&self, state: BrainState) -> Result<Option<Stimulus>> {
        let stimulus = self
            .map
            .get(state)
            .ok_or_else(|| PipelineError::Config(format!("no stimulus for state {state}")))?;
        if self.current.as_deref() == Some(stimulus.file.as_str()) {
            return Ok(None);
        }
        Ok(Some(stimulus.clone()))
    }

    /// Marks `stimulus` as the one now playing.
    pub fn commit(&mut self, stimulus: &Stimulus) {
        self.current = Some(stimulus.file.clone());
    }

    pub fn select(&mut self, state: BrainState) -> Result<Option<Stimulus>> {
        let next = self.pending(state)?;
        if let Some(stimulus) = &next {
            self.commit(stimulus);
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_map_covers_every_state() {
        StimulusMap::default().validate().unwrap();
        let partial = StimulusMap::new(BTreeMap::from([(
            BrainState::Alpha,
            Stimulus::new(7.0, "a.wav"),
        )]));
        assert!(partial.validate().is_err());
    }

    #[test]
    fn selector_only_reports_file_changes() {
        let mut selector = StimulusSelector::new(StimulusMap::default());
        let first = selector.select(BrainState::Alpha).unwrap().unwrap();
        assert_eq!(first.file, "./audio_files/7Hz.wav");
        assert!(selector.select(BrainState::Alpha).unwrap().is_none());
        assert!(selector.select(BrainState::Delta).unwrap().is_none());
        let beta = selector.select(BrainState::Beta).unwrap().unwrap();
        assert_eq!(beta.beat_hz, 10.0);
        assert_eq!(selector.current_file(), Some("./audio_files/10Hz.wav"));
    }

    #[test]
    fn pending_does_not_record_until_committed() {
        let mut selector = StimulusSelector::new(StimulusMap::default());
        let theta = selector.pending(BrainState::Theta).unwrap().unwrap();
        assert_eq!(selector.current_file(), None);
        assert!(selector.pending(BrainState::Theta).unwrap().is_some());
        selector.commit(&theta);
        assert_eq!(selector.current_file(), Some("./audio_files/5Hz.wav"));
        assert!(selector.pending(BrainState::Theta).unwrap().is_none());
    }

    #[test]
    fn map_serializes_with_uppercase_labels() {
        let json = serde_json::to_string(&StimulusMap::default()).unwrap();
        assert!(json.contains("\"ALPHA\""));
        let back: StimulusMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, StimulusMap::default());
    }
}
