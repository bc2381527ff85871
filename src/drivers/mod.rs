// src/drivers/mod.rs
pub mod bandpower;
pub mod buffer;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod source;
pub mod spectrum;
pub use bandpower::{BandpowerEstimator, ChannelGrouping, RelativeTo};
pub use buffer::{SampleBuffer, SlidingWindow};
pub use error::{ErrorKind, PipelineError, Result};
pub use filter::{FilterCoefficients, ZeroPhaseFilter};
pub use pipeline::SignalPipeline;
pub use source::{ManualSource, RecordingSource, SampleSource, SyntheticSource};
pub use spectrum::{Quadrature, SpectralMethod, WelchEstimator};
