// src/lib.rs
//! Near-real-time EEG brain-state classification.
//!
//! A [`drivers::BandpowerEstimator`] turns each fixed-size sample window into relative power
//! in five bands; a [`detector::StateClassifier`] maps that vector to a label with hysteresis.
//! Everything else here (sources, windowing, stimulus selection, the worker thread) is the
//! plumbing a driver needs around those two.
pub mod config;
pub mod detector;
pub mod drivers;
pub mod engine;
pub mod stimulus;
pub mod types;

pub use config::{BandRange, BandTable, PipelineConfig};
pub use detector::{classify, ClassifierState, StabilizationMode, StabilizationPolicy, StateClassifier};
pub use drivers::{BandpowerEstimator, ErrorKind, PipelineError, SampleBuffer};
pub use engine::{spawn_engine, Engine, EngineSettings};
pub use types::{Band, BrainState, EngineCommand, EngineEvent, PowerVector, SourceMode, TickReport};
