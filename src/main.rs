// src/main.rs
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::info;

use pose_gestures::data::SessionRecorder;
use pose_gestures::events::{MidiSink, NullOut};
use pose_gestures::replay::FrameReplay;
use pose_gestures::{EngineConfig, GestureEngine};

const USAGE: &str =
    "usage: pose_gestures <frames.jsonl> [--config cfg.json] [--strict] [--realtime] [--out DIR]";

/// Gate time for the note-offs the MIDI sink schedules.
const NOTE_GATE_MS: f64 = 150.0;

struct Args {
    frames: PathBuf,
    config: Option<PathBuf>,
    strict: bool,
    realtime: bool,
    out: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = std::env::args().skip(1);
    let mut frames = None;
    let mut config = None;
    let mut strict = false;
    let mut realtime = false;
    let mut out = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(args.next().context("--config needs a path")?.into()),
            "--out" => out = Some(args.next().context("--out needs a directory")?.into()),
            "--strict" => strict = true,
            "--realtime" => realtime = true,
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            flag if flag.starts_with("--") => bail!("unknown flag {flag}\n{USAGE}"),
            path => frames = Some(PathBuf::from(path)),
        }
    }

    Ok(Args {
        frames: frames.context(USAGE)?,
        config,
        strict,
        realtime,
        out,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args = parse_args()?;

    let config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None if args.strict => EngineConfig::strict(),
        None => EngineConfig::relaxed(),
    };
    info!(
        "confidence >= {:.2}, ground alpha {:.2}, thresholds {:?}",
        config.confidence_threshold, config.ground_smoothing_alpha, config.jump_threshold_policy
    );

    let mut replay = FrameReplay::open(&args.frames)?;
    info!("replaying {} frames at ~{:.1} fps", replay.len(), replay.fps());

    let mut engine = GestureEngine::new(config);
    let mut sink = MidiSink::new(NullOut, 0, NOTE_GATE_MS);
    let mut recorder = SessionRecorder::new(
        args.out.clone().unwrap_or_else(SessionRecorder::default_output_dir),
        None,
    );

    let mut previous_ts: Option<f64> = None;
    while let Some(recorded) = replay.next_frame() {
        if args.realtime {
            if let Some(prev) = previous_ts {
                let wait = (recorded.timestamp_ms - prev).max(0.0);
                tokio::time::sleep(Duration::from_secs_f64(wait / 1000.0)).await;
            }
        }
        previous_ts = Some(recorded.timestamp_ms);

        let failed = recorded.detection.is_err();
        let output = match &recorded.detection {
            Ok(frame) => engine.tick_into(frame, recorded.timestamp_ms, &mut sink),
            Err(_) => engine.tick_detection(recorded.detection.as_ref(), recorded.timestamp_ms),
        };
        for event in &output.events {
            println!("{event}");
        }
        sink.flush(output.timestamp_ms)?;

        if failed {
            recorder.add_failed_tick(output);
        } else {
            recorder.add_tick(output);
        }
    }
    sink.all_notes_off()?;

    let (status_path, events_path) = recorder.export_csv()?;
    let summary_path = recorder.write_summary()?;
    let summary = recorder.summary();

    println!();
    println!("frames:    {} ({} failed)", summary.total_frames, summary.failed_frames);
    println!("takeoffs:  {}", summary.takeoffs);
    println!("landings:  {}", summary.landings);
    if let Some(mean) = summary.mean_landing_distance {
        println!("mean landing distance: {mean:.1} px");
    }
    println!("status log: {}", status_path.display());
    println!("events:     {}", events_path.display());
    println!("summary:    {}", summary_path.display());

    Ok(())
}
