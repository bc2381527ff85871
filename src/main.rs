// src/main.rs
use std::path::PathBuf;
use std::sync::mpsc;

use anyhow::{bail, Context, Result};
use neuro_entrain::drivers::{RecordingSource, SyntheticSource};
use neuro_entrain::stimulus::LoggingSink;
use neuro_entrain::{spawn_engine, EngineEvent, EngineSettings, PipelineConfig, SourceMode};

/// Channel count of the synthetic headset stand-in.
const SYNTHETIC_CHANNELS: usize = 12;

struct Args {
    config: Option<PathBuf>,
    recording: Option<PathBuf>,
    write_config: Option<PathBuf>,
    ticks: Option<u64>,
    realtime: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: None,
        recording: None,
        write_config: None,
        ticks: None,
        realtime: false,
    };
    let mut it = std::env::args().skip(1);
    while let Some(flag) = it.next() {
        let mut value = || it.next().with_context(|| format!("{flag} needs a value"));
        match flag.as_str() {
            "--config" => args.config = Some(value()?.into()),
            "--recording" => args.recording = Some(value()?.into()),
            "--write-config" => args.write_config = Some(value()?.into()),
            "--ticks" => {
                let raw = value()?;
                args.ticks = Some(raw.parse().with_context(|| format!("bad --ticks `{raw}`"))?);
            }
            "--realtime" => args.realtime = true,
            "-h" | "--help" => {
                println!(
                    "usage: neuro-entrain [--config FILE] [--recording CSV] [--ticks N] [--realtime] [--write-config FILE]"
                );
                std::process::exit(0);
            }
            other => bail!("unknown argument `{other}`"),
        }
    }
    Ok(args)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = parse_args()?;

    let config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(path) = &args.write_config {
        config
            .to_json_file(path)
            .with_context(|| format!("writing config {}", path.display()))?;
        println!("wrote {}", path.display());
        return Ok(());
    }

    let mode = if args.recording.is_some() {
        SourceMode::Recording
    } else {
        SourceMode::Synthetic
    };
    let chunk_len = config.update_len();
    let settings = EngineSettings {
        max_ticks: args.ticks,
    };
    let (tx, rx) = mpsc::channel();
    let (_cmd_tx, cmd_rx) = mpsc::channel();
    let handle = match (mode, &args.recording) {
        (SourceMode::Recording, Some(path)) => {
            let source = RecordingSource::open(path, chunk_len, config.sampling_rate_hz)
                .with_context(|| format!("opening recording {}", path.display()))?
                .paced(args.realtime);
            spawn_engine(&config, source, LoggingSink::default(), settings, tx, cmd_rx)?
        }
        _ => {
            let source = SyntheticSource::new(config.sampling_rate_hz, SYNTHETIC_CHANNELS, chunk_len)
                .with_tone(10.0, 20.0)
                .with_tone(20.0, 8.0)
                .with_noise(5.0, 0)
                .paced(args.realtime);
            spawn_engine(&config, source, LoggingSink::default(), settings, tx, cmd_rx)?
        }
    };

    println!("{:<10} | {:<14} | {:>10}", "Time", "Current State", "Stimulus");
    println!("{}", "-".repeat(42));
    let mut playing: Option<f64> = None;
    for event in rx {
        match event {
            EngineEvent::Tick(report) => {
                if let Some(stimulus) = &report.stimulus_changed {
                    playing = Some(stimulus.beat_hz);
                }
                let beat = playing.map(|hz| format!("{hz:.1} Hz")).unwrap_or_default();
                println!(
                    "{:<10} | {:<14} | {:>10}",
                    format!("{:.1}s", report.elapsed_seconds),
                    report.state,
                    beat
                );
            }
            EngineEvent::TickFailed {
                tick,
                message,
                reused,
                ..
            } => match reused {
                Some(state) => eprintln!("tick {tick} skipped ({message}); keeping {state}"),
                None => eprintln!("tick {tick} skipped ({message})"),
            },
            EngineEvent::Log(line) => log::info!("{line}"),
            EngineEvent::Stopped => break,
        }
    }
    handle
        .join()
        .map_err(|_| anyhow::anyhow!("engine thread panicked"))?;
    Ok(())
}
