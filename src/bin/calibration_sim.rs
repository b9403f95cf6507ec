use std::fs;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use flowstate_calibration::calibration::{
    CalibrationResultData, CalibrationSummary, RecordingState, StageCallbacks, StageCommand,
    StageOutcome, StageSnapshot,
};
use flowstate_calibration::config::AppConfig;
use flowstate_calibration::device::{SessionSink, SignalSource};
use flowstate_calibration::simulator::{SimulatedDevice, SimulatedProfile};
use flowstate_calibration::telemetry::{self, TelemetrySnapshot};
use flowstate_calibration::testing::VirtualRunner;
use flowstate_calibration::{api, init_logging, FlowContext};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

/// Virtual-time step for `--instant` runs
const INSTANT_STEP_MS: u64 = 250;
/// Poll period while watching a live recording
const WATCH_POLL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(
    name = "calibration_sim",
    about = "Run the baseline calibration flow against a simulated headset"
)]
struct Cli {
    /// JSON config file (defaults are used for missing fields)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run instructions, countdown, recording and summary end to end
    Run {
        #[arg(long, default_value = "excellent")]
        profile: SimulatedProfile,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Divide every timer period by this factor
        #[arg(long, default_value_t = 60)]
        speed: u32,
        /// Drive the stages on a virtual clock instead of tokio timers
        #[arg(long)]
        instant: bool,
        /// Resume this many times after an auto-pause, then finish early
        #[arg(long, default_value_t = 1)]
        max_resumes: u32,
        /// Persist the baseline when the summary allows it
        #[arg(long)]
        save: bool,
        /// Include collected telemetry in the report
        #[arg(long)]
        telemetry: bool,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Classify a signal-quality score
    Classify {
        #[arg(long)]
        score: Option<f32>,
    },
    /// Evaluate the readiness gate
    Readiness {
        #[arg(long)]
        disconnected: bool,
        #[arg(long)]
        score: Option<f32>,
    },
    /// Grade a recording from its quality and clean-data percentage
    Evaluate {
        #[arg(long)]
        quality: f32,
        #[arg(long)]
        clean: f32,
    },
    /// Classify device metrics frames read from stdin, one JSON object per line
    Frame,
    /// Print the default configuration
    DumpConfig,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    init_logging();
    let cli = Cli::parse();
    let config = cli
        .config
        .as_ref()
        .map(AppConfig::load_from_file)
        .unwrap_or_default();

    match cli.command {
        Commands::Run {
            profile,
            seed,
            speed,
            instant,
            max_resumes,
            save,
            telemetry,
            output,
        } => {
            let options = RunOptions {
                profile,
                seed,
                speed,
                instant,
                max_resumes,
                save,
                telemetry,
            };
            run_flow(config, options, output)
        }
        Commands::Classify { score } => print_json(&api::classify_signal_quality(score)),
        Commands::Readiness {
            disconnected,
            score,
        } => {
            let status = api::check_readiness(!disconnected, score);
            print_json(&status)?;
            Ok(ExitCode::from(if status.ready { 0 } else { 3 }))
        }
        Commands::Evaluate { quality, clean } => {
            print_json(&api::evaluate_calibration_quality(quality, clean))
        }
        Commands::Frame => run_frames(),
        Commands::DumpConfig => {
            println!("{}", api::default_config_json()?);
            Ok(ExitCode::from(0))
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RunOptions {
    profile: SimulatedProfile,
    seed: u64,
    speed: u32,
    instant: bool,
    max_resumes: u32,
    save: bool,
    telemetry: bool,
}

fn run_flow(mut config: AppConfig, options: RunOptions, output: Option<PathBuf>) -> Result<ExitCode> {
    if !options.instant {
        config.timing = config.timing.scaled(options.speed);
    }

    let device = Arc::new(SimulatedDevice::new(options.profile, options.seed));
    let (ctx, session) = FlowContext::in_memory(config, device.clone())?;
    ctx.enter_instructions();

    let readiness = ctx.readiness();
    if !readiness.ready {
        eprintln!("Not ready: {}", readiness.reason_text());
        return Ok(ExitCode::from(3));
    }

    let device: Arc<dyn SignalSource> = device;
    let session_sink: Arc<dyn SessionSink> = session.clone();
    let result = if options.instant {
        run_virtual(&ctx, device, session_sink, options.max_resumes)?
    } else {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("building tokio runtime")?;
        runtime.block_on(run_live(&ctx, options.max_resumes))?
    };

    let summary = ctx.summarize(result);
    let saved = if options.save && summary.can_save {
        ctx.save_baseline(&summary)?;
        true
    } else {
        false
    };

    let report = RunReport {
        profile: options.profile,
        seed: options.seed,
        summary: &summary,
        saved,
        final_phase: flowstate_calibration::calibration::phase_name(ctx.phase()),
        telemetry: options.telemetry.then(|| telemetry::hub().snapshot()),
    };
    emit_report(&report, output)?;

    Ok(ExitCode::from(if summary.can_save { 0 } else { 2 }))
}

fn run_virtual(
    ctx: &FlowContext,
    device: Arc<dyn SignalSource>,
    session: Arc<dyn SessionSink>,
    max_resumes: u32,
) -> Result<Arc<CalibrationResultData>> {
    let countdown_limit = u64::from(ctx.config().calibration.countdown_secs + 5) * 1000;
    let mut countdown = VirtualRunner::new(ctx.prepare_countdown()?, device.clone(), session.clone());
    countdown.start();
    match countdown.run_until_terminal(INSTANT_STEP_MS, countdown_limit) {
        Some(StageOutcome::Completed(())) => {}
        other => bail!("countdown did not complete: {:?}", other),
    }

    // Room for every allowed auto-pause stall on top of the full recording
    let limit_ms = u64::from(ctx.config().calibration.recording_secs) * 1000
        + u64::from(max_resumes + 1) * ctx.config().timing.auto_pause_ms * 2;
    let mut recording = VirtualRunner::new(ctx.prepare_recording()?, device, session)
        .starting_at(countdown.now_ms());
    recording.start();

    let deadline = recording.now_ms() + limit_ms;
    let mut resumes = 0;
    while recording.outcome().is_none() {
        if recording.machine().state() == RecordingState::AutoPaused {
            if resumes < max_resumes {
                resumes += 1;
                tracing::info!("[Simulator] Auto-paused, resuming ({}/{})", resumes, max_resumes);
                recording.command(StageCommand::Resume);
            } else {
                tracing::info!("[Simulator] Auto-paused, finishing early");
                recording.command(StageCommand::Finish);
            }
            continue;
        }
        if recording.now_ms() >= deadline {
            recording.command(StageCommand::Finish);
            continue;
        }
        recording.advance(INSTANT_STEP_MS);
    }

    match recording.outcome() {
        Some(StageOutcome::Completed(result)) => Ok(Arc::clone(result)),
        other => Err(anyhow!("recording did not complete: {:?}", other)),
    }
}

async fn run_live(ctx: &FlowContext, max_resumes: u32) -> Result<Arc<CalibrationResultData>> {
    let countdown = ctx.start_countdown(StageCallbacks::new())?;
    match countdown.join().await? {
        StageOutcome::Completed(()) => {}
        other => bail!("countdown did not complete: {}", other.as_str()),
    }

    let recording = ctx.start_recording(StageCallbacks::new())?;
    let mut updates = recording.subscribe();
    let mut last_state = RecordingState::Recording;
    let mut resumes = 0;

    while !recording.is_finished() {
        let snapshot = match tokio::time::timeout(WATCH_POLL, updates.recv()).await {
            Ok(Ok(StageSnapshot::Recording(snapshot))) => snapshot,
            Ok(Err(RecvError::Closed)) => break,
            _ => continue,
        };
        if snapshot.state == last_state {
            continue;
        }
        last_state = snapshot.state;
        if snapshot.state == RecordingState::AutoPaused {
            if resumes < max_resumes {
                resumes += 1;
                tracing::info!("[Simulator] Auto-paused, resuming ({}/{})", resumes, max_resumes);
                recording.resume();
            } else {
                tracing::info!("[Simulator] Auto-paused, finishing early");
                recording.finish();
            }
        }
    }

    match recording.join().await? {
        StageOutcome::Completed(result) => Ok(result),
        other => Err(anyhow!("recording did not complete: {}", other.as_str())),
    }
}

fn run_frames() -> Result<ExitCode> {
    let mut failures = 0u32;
    for line in io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        match api::classify_device_frame(line) {
            Ok(status) => println!("{}", serde_json::to_string(&status)?),
            Err(err) => {
                failures += 1;
                eprintln!("{err}");
            }
        }
    }
    Ok(ExitCode::from(if failures == 0 { 0 } else { 2 }))
}

#[derive(Serialize)]
struct RunReport<'a> {
    profile: SimulatedProfile,
    seed: u64,
    summary: &'a CalibrationSummary,
    saved: bool,
    final_phase: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    telemetry: Option<TelemetrySnapshot>,
}

fn emit_report(report: &RunReport<'_>, output_path: Option<PathBuf>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;

    if let Some(path) = output_path {
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    } else {
        println!("{json}");
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(ExitCode::from(0))
}
