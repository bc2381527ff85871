use std::collections::VecDeque;
use std::f64::consts::PI;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;
use log::{debug, info};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use crate::drivers::{PipelineError, Result};
/// Anything that can yield time × channels sample chunks on demand.
///
/// `Ok(None)` means the source is exhausted.
pub trait SampleSource {
    fn next_chunk(&mut self) -> Result<Option<Array2<f64>>>;
}
/// In-memory source useful for tests and deterministic playback.
pub struct ManualSource {
    queue: VecDeque<Array2<f64>>,
}
impl ManualSource {
    pub fn new(chunks: impl IntoIterator<Item = Array2<f64>>) -> Self {
        Self {
            queue: chunks.into_iter().collect(),
        }
    }
}
impl SampleSource for ManualSource {
    fn next_chunk(&mut self) -> Result<Option<Array2<f64>>> {
        Ok(self.queue.pop_front())
    }
}
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tone {
    pub freq_hz: f64,
    pub amplitude: f64,
}
/// Endless generator of summed sinusoids plus seeded uniform noise, identical on every channel
/// apart from the noise.
pub struct SyntheticSource {
    sample_rate_hz: f64,
    channel_count: usize,
    chunk_len: usize,
    tones: Vec<Tone>,
    noise_amplitude: f64,
    rng: StdRng,
    cursor: u64,
    paced: bool,
}
impl SyntheticSource {
    pub fn new(sample_rate_hz: f64, channel_count: usize, chunk_len: usize) -> Self {
        Self {
            sample_rate_hz,
            channel_count,
            chunk_len: chunk_len.max(1),
            tones: Vec::new(),
            noise_amplitude: 0.0,
            rng: StdRng::seed_from_u64(0),
            cursor: 0,
            paced: false,
        }
    }
    pub fn with_tone(mut self, freq_hz: f64, amplitude: f64) -> Self {
        self.tones.push(Tone { freq_hz, amplitude });
        self
    }
    pub fn with_noise(mut self, amplitude: f64, seed: u64) -> Self {
        self.noise_amplitude = amplitude;
        self.rng = StdRng::seed_from_u64(seed);
        self
    }
    /// Sleep for the chunk's duration after producing it, like a live device.
    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }
}
impl SampleSource for SyntheticSource {
    fn next_chunk(&mut self) -> Result<Option<Array2<f64>>> {
        let start = self.cursor;
        let fs = self.sample_rate_hz;
        let tones = &self.tones;
        let noise = self.noise_amplitude;
        let rng = &mut self.rng;
        let chunk = Array2::from_shape_fn((self.chunk_len, self.channel_count), |(t, _)| {
            let time = (start + t as u64) as f64 / fs;
            let clean: f64 = tones
                .iter()
                .map(|tone| tone.amplitude * (2.0 * PI * tone.freq_hz * time).sin())
                .sum();
            if noise > 0.0 {
                clean + rng.gen_range(-noise..noise)
            } else {
                clean
            }
        });
        self.cursor += self.chunk_len as u64;
        if self.paced {
            thread::sleep(Duration::from_secs_f64(self.chunk_len as f64 / fs));
        }
        Ok(Some(chunk))
    }
}
/// Replays a CSV recording with `Ch1RawEEG`, `Ch2RawEEG`, ... columns, wrapping to the first
/// row when the file runs out.
pub struct RecordingSource {
    rows: Vec<Vec<f64>>,
    cursor: usize,
    chunk_len: usize,
    sample_rate_hz: f64,
    paced: bool,
}
impl RecordingSource {
    pub fn open(path: impl AsRef<Path>, chunk_len: usize, sample_rate_hz: f64) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let rows = parse_recording(&text, &path.display().to_string())?;
        info!(
            "loaded recording {} ({} rows x {} channels)",
            path.display(),
            rows.len(),
            rows[0].len()
        );
        Ok(Self {
            rows,
            cursor: 0,
            chunk_len: chunk_len.max(1),
            sample_rate_hz,
            paced: false,
        })
    }
    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }
    pub fn channel_count(&self) -> usize {
        self.rows[0].len()
    }
    pub fn len(&self) -> usize {
        self.rows.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
impl SampleSource for RecordingSource {
    fn next_chunk(&mut self) -> Result<Option<Array2<f64>>> {
        let channels = self.channel_count();
        let mut chunk = Array2::zeros((self.chunk_len, channels));
        for mut out in chunk.rows_mut() {
            if self.cursor >= self.rows.len() {
                debug!("recording exhausted, rewinding");
                self.cursor = 0;
            }
            for (slot, value) in out.iter_mut().zip(&self.rows[self.cursor]) {
                *slot = *value;
            }
            self.cursor += 1;
        }
        if self.paced {
            thread::sleep(Duration::from_secs_f64(
                self.chunk_len as f64 / self.sample_rate_hz,
            ));
        }
        Ok(Some(chunk))
    }
}
/// Channel columns are matched by name (`Ch<N>RawEEG`, N from 1) and ordered by N; every other
/// column is ignored.
fn parse_recording(text: &str, path: &str) -> Result<Vec<Vec<f64>>> {
    let err = |line: usize, reason: String| PipelineError::Recording {
        path: path.to_owned(),
        line,
        reason,
    };
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    let (_, header) = lines
        .next()
        .ok_or_else(|| err(1, "file is empty".into()))?;
    let mut columns: Vec<(usize, usize)> = header
        .split(',')
        .enumerate()
        .filter_map(|(idx, name)| {
            let name = name.trim().trim_matches('"');
            name.strip_prefix("Ch")
                .and_then(|rest| rest.strip_suffix("RawEEG"))
                .and_then(|n| n.parse::<usize>().ok())
                .map(|n| (n, idx))
        })
        .collect();
    if columns.is_empty() {
        return Err(err(1, "no ChNRawEEG columns in header".into()));
    }
    columns.sort_unstable();
    let mut rows = Vec::new();
    for (line_idx, line) in lines {
        let fields: Vec<&str> = line.split(',').collect();
        let row = columns
            .iter()
            .map(|&(n, idx)| {
                let field = fields
                    .get(idx)
                    .ok_or_else(|| err(line_idx + 1, format!("missing Ch{n}RawEEG")))?;
                field.trim().parse::<f64>().map_err(|e| {
                    err(line_idx + 1, format!("Ch{n}RawEEG `{}`: {e}", field.trim()))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        rows.push(row);
    }
    if rows.is_empty() {
        return Err(err(2, "recording has a header but no samples".into()));
    }
    Ok(rows)
}
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    #[test]
    fn manual_source_drains_in_order() {
        let mut source = ManualSource::new(vec![Array2::zeros((2, 3)), Array2::ones((4, 3))]);
        assert_eq!(source.next_chunk().unwrap().unwrap().nrows(), 2);
        assert_eq!(source.next_chunk().unwrap().unwrap().nrows(), 4);
        assert!(source.next_chunk().unwrap().is_none());
    }
    #[test]
    fn synthetic_source_is_continuous_across_chunks() {
        let mut source = SyntheticSource::new(100.0, 2, 10).with_tone(5.0, 1.0);
        let a = source.next_chunk().unwrap().unwrap();
        let b = source.next_chunk().unwrap().unwrap();
        let expected = (2.0 * PI * 5.0 * 10.0 / 100.0).sin();
        assert!((b[[0, 0]] - expected).abs() < 1e-12);
        assert_eq!(a[[3, 0]], a[[3, 1]]);
    }
    #[test]
    fn seeded_noise_is_reproducible() {
        let mut x = SyntheticSource::new(100.0, 2, 16).with_noise(1.0, 7);
        let mut y = SyntheticSource::new(100.0, 2, 16).with_noise(1.0, 7);
        let (a, b) = (x.next_chunk().unwrap().unwrap(), y.next_chunk().unwrap().unwrap());
        assert_eq!(a, b);
        assert!(a.iter().all(|v| v.abs() <= 1.0));
    }
    #[test]
    fn recording_replays_and_wraps() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Timestamp,Ch2RawEEG,Ch1RawEEG,Other").unwrap();
        writeln!(file, "0.0,2.0,1.0,x").unwrap();
        writeln!(file, "0.1,4.0,3.0,y").unwrap();
        writeln!(file, "0.2,6.0,5.0,z").unwrap();
        let mut source = RecordingSource::open(file.path(), 2, 500.0).unwrap();
        assert_eq!(source.channel_count(), 2);
        assert_eq!(source.len(), 3);
        let first = source.next_chunk().unwrap().unwrap();
        assert_eq!(first.row(0).to_vec(), vec![1.0, 2.0]);
        let second = source.next_chunk().unwrap().unwrap();
        assert_eq!(second.row(0).to_vec(), vec![5.0, 6.0]);
        assert_eq!(second.row(1).to_vec(), vec![1.0, 2.0]);
    }
    #[test]
    fn recording_reports_bad_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Ch1RawEEG,Ch2RawEEG").unwrap();
        writeln!(file, "1.0,oops").unwrap();
        let err = RecordingSource::open(file.path(), 2, 500.0).err().unwrap();
        assert!(matches!(err, PipelineError::Recording { line: 2, .. }));
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "a,b").unwrap();
        assert!(RecordingSource::open(file.path(), 2, 500.0).is_err());
    }
}
