//! StudyLens CLI - Command-line interface for the focus engine
//!
//! Commands:
//! - simulate: Run a deterministic synthetic study session (batch mode)
//! - run: Process scripted landmark frames from stdin (streaming mode)
//! - schema: Print input/output schema information

use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use chrono::{Duration, Utc};
use serde::Deserialize;

use studylens::detect::SyntheticDetector;
use studylens::emit::JsonLineSink;
use studylens::pipeline::FocusEngine;
use studylens::types::FrameSample;
use studylens::{EngineConfig, PipelineError, ENGINE_VERSION, PRODUCER_NAME};

/// StudyLens - On-device compute engine for facial attention and emotion signals
#[derive(Parser)]
#[command(name = "studylens")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Derive focus and emotion metrics from study-session frames", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a deterministic synthetic session and emit NDJSON records
    Simulate {
        /// Number of frames to generate
        #[arg(long, default_value = "300")]
        frames: u64,

        /// Capture interval between frames (milliseconds)
        #[arg(long, default_value = "36")]
        interval_ms: i64,

        /// Session identifier
        #[arg(long, default_value = "sim-session")]
        session_id: String,

        /// Scripted attention scenario
        #[arg(long, value_enum, default_value = "steady")]
        scenario: Scenario,

        /// Engine configuration JSON file
        #[arg(long)]
        config: Option<std::path::PathBuf>,

        /// Flush output after each record
        #[arg(long, default_value = "true")]
        flush: bool,
    },

    /// Process scripted landmark frames from stdin (one JSON object per line)
    Run {
        /// Engine configuration JSON file
        #[arg(long)]
        config: Option<std::path::PathBuf>,

        /// Flush output after each record
        #[arg(long, default_value = "true")]
        flush: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print
        #[arg(value_enum)]
        schema_type: SchemaType,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Scenario {
    /// Attentive for the whole session
    Steady,
    /// Mild gaze dip through the middle of the session
    Dip,
    /// Sustained off-target gaze long enough to raise a distraction event
    Distracted,
    /// Droopy eyes with rapid blinking long enough to raise a fatigue flag
    Drowsy,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input schema (scripted frame lines for `run`)
    Input,
    /// Output schema (record/event envelopes)
    Output,
}

/// One scripted frame on stdin for the `run` command
#[derive(Debug, Deserialize)]
struct ScriptedFrame {
    session_id: String,
    sequence: u64,
    timestamp_ms: i64,
    #[serde(default = "default_true")]
    face: bool,
    #[serde(default)]
    gaze_h: f64,
    #[serde(default)]
    gaze_v: f64,
    #[serde(default = "default_openness")]
    eye_openness: f64,
    #[serde(default)]
    yaw_deg: f64,
    #[serde(default)]
    pitch_deg: f64,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_true() -> bool {
    true
}

fn default_openness() -> f64 {
    1.0
}

fn default_confidence() -> f64 {
    0.92
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), StudyLensCliError> {
    match cli.command {
        Commands::Simulate {
            frames,
            interval_ms,
            session_id,
            scenario,
            config,
            flush,
        } => cmd_simulate(frames, interval_ms, &session_id, scenario, config.as_deref(), flush),

        Commands::Run { config, flush } => cmd_run(config.as_deref(), flush),

        Commands::Schema { schema_type } => {
            cmd_schema(schema_type);
            Ok(())
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<EngineConfig, StudyLensCliError> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)?;
            Ok(EngineConfig::from_json(&json)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

fn cmd_simulate(
    frames: u64,
    interval_ms: i64,
    session_id: &str,
    scenario: Scenario,
    config_path: Option<&std::path::Path>,
    flush: bool,
) -> Result<(), StudyLensCliError> {
    let config = load_config(config_path)?;
    let detector = SyntheticDetector::default();
    let script = detector.clone();

    let sink = JsonLineSink::new(io::stdout(), flush);
    let mut engine = FocusEngine::new(config, Box::new(detector), Box::new(sink))?;
    engine.start_session(session_id)?;

    let start = Utc::now();
    for i in 0..frames {
        direct_scenario(&script, scenario, i, frames, interval_ms);
        let captured_at = start + Duration::milliseconds(i as i64 * interval_ms);
        let frame = FrameSample::test_pattern(session_id, i, captured_at, 64, 64);
        engine.process_frame(frame)?;
    }

    if let Some(p95) = engine.ops().p95_latency_ms() {
        log::info!("simulated {} frames, p95 latency {:.2} ms", frames, p95);
    }
    engine.end_session(session_id)?;
    Ok(())
}

/// Drive the synthetic face through the selected scenario
fn direct_scenario(script: &SyntheticDetector, scenario: Scenario, i: u64, frames: u64, interval_ms: i64) {
    match scenario {
        Scenario::Steady => {}
        Scenario::Dip => {
            // Gaze wanders (below the event threshold) through the middle sixth
            let in_dip = i >= frames / 3 && i < frames / 2;
            script.set_gaze(if in_dip { 0.3 } else { 0.0 }, 0.0);
        }
        Scenario::Distracted => {
            // Off-target long enough to qualify, from one third in
            let in_distraction = i >= frames / 3;
            script.set_gaze(if in_distraction { 0.6 } else { 0.0 }, 0.0);
        }
        Scenario::Drowsy => {
            // Droopy lids with a blink every 2 s (~30 blinks/min)
            let t_ms = i as i64 * interval_ms;
            let in_blink = t_ms % 2_000 < 150;
            script.set_eye_openness(if in_blink { 0.05 } else { 0.22 });
        }
    }
}

fn cmd_run(config_path: Option<&std::path::Path>, flush: bool) -> Result<(), StudyLensCliError> {
    let config = load_config(config_path)?;
    let detector = SyntheticDetector::default();
    let script = detector.clone();

    let sink = JsonLineSink::new(io::stdout(), flush);
    let mut engine = FocusEngine::new(config, Box::new(detector), Box::new(sink))?;

    if atty::is(atty::Stream::Stdin) {
        eprintln!("reading scripted frames from stdin (one JSON object per line); Ctrl-D ends");
    }

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let scripted: ScriptedFrame = serde_json::from_str(trimmed)
            .map_err(|e| StudyLensCliError::Parse(format!("bad frame line: {}", e)))?;

        engine.start_session(&scripted.session_id)?;

        script.set_face_present(scripted.face);
        script.set_gaze(scripted.gaze_h, scripted.gaze_v);
        script.set_eye_openness(scripted.eye_openness);
        script.set_head_pose(scripted.yaw_deg, scripted.pitch_deg);
        script.set_confidence(scripted.confidence);

        let frame = FrameSample::test_pattern(
            &scripted.session_id,
            scripted.sequence,
            chrono::DateTime::from_timestamp_millis(scripted.timestamp_ms).ok_or_else(|| {
                StudyLensCliError::Parse(format!(
                    "timestamp_ms {} out of range",
                    scripted.timestamp_ms
                ))
            })?,
            64,
            64,
        );

        if let Err(e) = engine.process_frame(frame) {
            // Input errors skip the frame; the stream continues
            log::warn!("frame {} rejected: {}", scripted.sequence, e);
        }
    }

    io::stdout().flush()?;
    Ok(())
}

fn cmd_schema(schema_type: SchemaType) {
    match schema_type {
        SchemaType::Input => {
            println!("Input Schema: scripted frame lines (run command)");
            println!();
            println!("One JSON object per line:");
            println!("  session_id    string, required");
            println!("  sequence      integer, required, strictly increasing per session");
            println!("  timestamp_ms  integer, required, unix milliseconds, strictly increasing");
            println!("  face          bool, default true");
            println!("  gaze_h        number, default 0.0 (normalized, negative = left)");
            println!("  gaze_v        number, default 0.0 (normalized, negative = up)");
            println!("  eye_openness  number, default 1.0 (0 = closed)");
            println!("  yaw_deg       number, default 0.0");
            println!("  pitch_deg     number, default 0.0 (positive = down)");
            println!("  confidence    number, default 0.92");
        }
        SchemaType::Output => {
            println!("Output Schema: NDJSON envelopes, one per line");
            println!();
            println!("- producer: {{ name: \"{}\", version, instance_id }}", PRODUCER_NAME);
            println!("- emitted_at_utc: RFC3339 timestamp");
            println!("- kind: \"record\" | \"event\"");
            println!("- payload (record): session_id, frame_id, timestamp, face_detected,");
            println!("    detection_confidence, focus_score, focus_confidence, features,");
            println!("    blink_rate_per_min, emotion, emotion_confidence,");
            println!("    emotion_probabilities, lighting, sharpness, quality_warning,");
            println!("    latency_ms, low_confidence");
            println!("- payload (event): event_type = fatigue | distraction plus trigger");
            println!("    metrics and the sustained duration_ms");
        }
    }
}

// Error types

#[derive(Debug)]
enum StudyLensCliError {
    Io(io::Error),
    Engine(PipelineError),
    Json(serde_json::Error),
    Parse(String),
}

impl From<io::Error> for StudyLensCliError {
    fn from(e: io::Error) -> Self {
        StudyLensCliError::Io(e)
    }
}

impl From<PipelineError> for StudyLensCliError {
    fn from(e: PipelineError) -> Self {
        StudyLensCliError::Engine(e)
    }
}

impl From<serde_json::Error> for StudyLensCliError {
    fn from(e: serde_json::Error) -> Self {
        StudyLensCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<StudyLensCliError> for CliError {
    fn from(e: StudyLensCliError) -> Self {
        match e {
            StudyLensCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            StudyLensCliError::Engine(e) => CliError {
                code: "ENGINE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'studylens schema input' for the frame format".to_string()),
            },
            StudyLensCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            StudyLensCliError::Parse(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}
