use ndarray::Array2;
use crate::config::PipelineConfig;
use crate::drivers::source::SampleSource;
use crate::drivers::{PipelineError, Result, SampleBuffer, SlidingWindow};
/// Pulls chunks from a source into a sliding window and yields one Sample Buffer per update tick.
pub struct SignalPipeline<S: SampleSource> {
    source: S,
    window: Option<SlidingWindow>,
    window_len: usize,
    hop_len: usize,
}
impl<S: SampleSource> SignalPipeline<S> {
    pub fn new(source: S, window_len: usize, hop_len: usize) -> Self {
        Self {
            source,
            window: None,
            window_len,
            hop_len,
        }
    }
    pub fn from_config(source: S, config: &PipelineConfig) -> Self {
        Self::new(source, config.buffer_len(), config.update_len())
    }
    /// Reads until the next window is ready. `Ok(None)` once the source is exhausted.
    pub fn pump_once(&mut self) -> Result<Option<SampleBuffer>> {
        if let Some(buffer) = self.window.as_mut().and_then(SlidingWindow::take_ready) {
            return Ok(Some(buffer));
        }
        loop {
            let Some(chunk) = self.source.next_chunk()? else {
                return Ok(None);
            };
            if let Some(buffer) = self.push_and_take(chunk)? {
                return Ok(Some(buffer));
            }
        }
    }
    pub fn push_and_take(&mut self, chunk: Array2<f64>) -> Result<Option<SampleBuffer>> {
        let window = self.ensure_window(&chunk)?;
        window.push_chunk(chunk.view())?;
        Ok(window.take_ready())
    }
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
    fn ensure_window(&mut self, chunk: &Array2<f64>) -> Result<&mut SlidingWindow> {
        if self.window.is_none() {
            self.window = Some(SlidingWindow::new(
                chunk.ncols(),
                self.window_len,
                self.hop_len,
            )?);
        }
        self.window
            .as_mut()
            .ok_or_else(|| PipelineError::Shape("window not initialized".into()))
    }
}
