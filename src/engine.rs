// src/engine.rs
use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::detector::StateClassifier;
use crate::drivers::{BandpowerEstimator, Result, SampleBuffer, SampleSource, SignalPipeline};
use crate::stimulus::{StimulusSelector, StimulusSink};
use crate::types::{BrainState, EngineCommand, EngineEvent, TickReport};

/// One stream's estimator -> classifier -> stimulus chain. Strictly sequential.
pub struct Engine<K: StimulusSink> {
    estimator: BandpowerEstimator,
    classifier: StateClassifier,
    selector: StimulusSelector,
    sink: K,
    update_interval_seconds: f64,
    ticks: u64,
    last_state: Option<BrainState>,
}

impl<K: StimulusSink> Engine<K> {
    pub fn new(config: &PipelineConfig, sink: K) -> Result<Self> {
        Ok(Self {
            estimator: BandpowerEstimator::new(config)?,
            classifier: StateClassifier::from_config(config)?,
            selector: StimulusSelector::new(config.stimuli.clone()),
            sink,
            update_interval_seconds: config.update_interval_seconds,
            ticks: 0,
            last_state: None,
        })
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn classifier(&self) -> &StateClassifier {
        &self.classifier
    }

    pub fn last_state(&self) -> Option<BrainState> {
        self.last_state
    }

    pub fn reset_state(&mut self) {
        self.classifier.reset();
    }

    /// Runs one update tick. On error neither the classifier nor the selector moves, and the
    /// tick counter still advances so reported times stay aligned with the source.
    pub fn tick(&mut self, buffer: &SampleBuffer) -> Result<TickReport> {
        let tick = self.ticks;
        self.ticks += 1;
        let powers = self.estimator.process(buffer)?;
        let next = self.classifier.evaluate(&powers)?;
        let state = next.label;
        let stimulus_changed = self.selector.pending(state)?;
        if let Some(stimulus) = &stimulus_changed {
            self.sink.play(state, stimulus)?;
            self.selector.commit(stimulus);
        }
        self.classifier.accept(next);
        self.last_state = Some(state);
        debug!("tick {tick}: {state} from {powers:?}");
        Ok(TickReport {
            tick,
            elapsed_seconds: tick as f64 * self.update_interval_seconds,
            powers,
            state,
            stimulus_changed,
        })
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EngineSettings {
    /// Stop after this many ticks (successful or not).
    pub max_ticks: Option<u64>,
}

/// Moves one source and one engine onto a worker thread.
///
/// Construction errors (bad configuration) are returned here, before any thread starts. After
/// that, every outcome is reported on `tx`; the thread ends with `EngineEvent::Stopped`.
pub fn spawn_engine<S, K>(
    config: &PipelineConfig,
    source: S,
    sink: K,
    settings: EngineSettings,
    tx: Sender<EngineEvent>,
    rx_cmd: Receiver<EngineCommand>,
) -> Result<JoinHandle<()>>
where
    S: SampleSource + Send + 'static,
    K: StimulusSink + Send + 'static,
{
    let mut engine = Engine::new(config, sink)?;
    let mut pipeline = SignalPipeline::from_config(source, config);
    let handle = thread::spawn(move || {
        tx.send(EngineEvent::Log("engine ready".to_owned())).ok();
        info!("engine thread started");
        let mut ticks = 0u64;
        'run: loop {
            while let Ok(cmd) = rx_cmd.try_recv() {
                match cmd {
                    EngineCommand::Stop => break 'run,
                    EngineCommand::ResetState => {
                        engine.reset_state();
                        tx.send(EngineEvent::Log("classifier state reset".to_owned())).ok();
                    }
                }
            }
            if settings.max_ticks.is_some_and(|max| ticks >= max) {
                break;
            }
            let buffer = match pipeline.pump_once() {
                Ok(Some(buffer)) => buffer,
                Ok(None) => {
                    tx.send(EngineEvent::Log("source exhausted".to_owned())).ok();
                    break;
                }
                Err(e) => {
                    warn!("source failed: {e}");
                    tx.send(EngineEvent::Log(format!("source failed: {e}"))).ok();
                    break;
                }
            };
            ticks += 1;
            let event = match engine.tick(&buffer) {
                Ok(report) => EngineEvent::Tick(report),
                Err(e) => {
                    warn!("tick {} dropped: {e}", ticks - 1);
                    EngineEvent::TickFailed {
                        tick: ticks - 1,
                        kind: e.kind(),
                        message: e.to_string(),
                        reused: engine.last_state(),
                    }
                }
            };
            if tx.send(event).is_err() {
                debug!("event receiver dropped, stopping");
                break;
            }
        }
        info!("engine thread stopped after {ticks} ticks");
        tx.send(EngineEvent::Stopped).ok();
    });
    Ok(handle)
}
