use clap::{Parser, Subcommand, ValueEnum};
use sbemkit::control::calibration::{apply_cut_duration, propose_from_points, CalibrationStep};
use sbemkit::control::{
    MotorSpeedProposal, PointPair, Rig, RunPhase, RunSlot, RunStep, SlotPoll,
    StageCalibrationProposal,
};
use sbemkit::event_bus::{
    event_bus, init_event_bus, AppEvent, EventBusConfig, EventCategory, EventFilter, RunKind,
    Severity,
};
use sbemkit::settings::{default_config_path, ConfigCalibrationStore};
use sbemkit::units::format_duration;
use sbemkit::{init_logging, SettingsManager, StageCalibration};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Operator console for a serial block-face EM rig
#[derive(Parser, Debug)]
#[command(author, version, about = "SBEM rig control: approach, motor test and stage calibration")]
struct Args {
    /// Settings file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write tracing output to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Request an abort after this many seconds
    #[arg(long, global = true)]
    abort_after: Option<f64>,

    /// Only echo operator log warnings and errors
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Cut a number of slices to approach the block surface
    Approach {
        #[arg(long)]
        slices: Option<u32>,
        /// Slice thickness in nm
        #[arg(long)]
        thickness: Option<f64>,
    },
    /// Random-walk stress test of the stage motors
    MotorTest {
        #[arg(long)]
        minutes: Option<u32>,
        /// Stop after this many moves even if time remains
        #[arg(long)]
        max_moves: Option<u64>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Automatic stage calibration at the current EHT
    Calibrate {
        /// Stage shift per axis in µm
        #[arg(long)]
        distance: Option<f64>,
        /// Accept the proposal without asking
        #[arg(long)]
        yes: bool,
    },
    /// Stage calibration from feature positions picked in the saved frames
    CalibrateManual {
        /// Reference and X-shifted feature positions: X1 Y1 X2 Y2 (px)
        #[arg(long, num_args = 4, required = true, allow_negative_numbers = true)]
        x_points: Vec<f64>,
        /// Reference and Y-shifted feature positions: X1 Y1 X2 Y2 (px)
        #[arg(long, num_args = 4, required = true, allow_negative_numbers = true)]
        y_points: Vec<f64>,
        #[arg(long)]
        distance: Option<f64>,
        #[arg(long)]
        yes: bool,
    },
    /// Compute motor speeds from timed 1000 µm travels
    MotorSpeed {
        /// Seconds for the X motor
        #[arg(long)]
        duration_x: f64,
        /// Seconds for the Y motor
        #[arg(long)]
        duration_y: f64,
        #[arg(long)]
        yes: bool,
    },
    /// Move the XY stage
    StageMove {
        #[arg(allow_negative_numbers = true)]
        x: f64,
        #[arg(allow_negative_numbers = true)]
        y: f64,
    },
    /// Switch the beam on or off
    Eht { state: BeamState },
    /// Set the nominal full cut cycle duration in seconds
    CutDuration { seconds: f64 },
    /// Print the active settings
    Config,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BeamState {
    On,
    Off,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_deref())?;
    if init_event_bus(EventBusConfig { retained: 1024 }).is_err() {
        tracing::warn!("Event bus already running; operator log lines will not be echoed");
    }

    tracing::info!(
        "SBEMKit v{} (built {})",
        sbemkit::VERSION,
        sbemkit::BUILD_DATE
    );

    let path = match &args.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let manager = SettingsManager::load_or_default(&path)?;
    tracing::info!("Settings: {}", manager.path().display());
    let mut config = manager.config().clone();
    let store = ConfigCalibrationStore::shared(sbemkit::thread_safe(manager));

    if let Command::MotorTest {
        seed: Some(seed), ..
    } = &args.command
    {
        config.motor_test.seed = Some(*seed);
    }

    let truth = StageCalibration::default();
    let rig = Rig::simulated(&config, truth, Arc::new(store.clone()));
    let abort_after = args.abort_after.map(Duration::from_secs_f64);
    let echo = Echo {
        abort_after,
        filter: if args.quiet {
            EventFilter::AtLeast(Severity::Warning)
        } else {
            EventFilter::Categories(vec![EventCategory::Log])
        },
    };

    match args.command {
        Command::Approach { slices, thickness } => {
            let run = rig.approach(
                &config,
                slices.unwrap_or(config.approach.default_slices),
                thickness.unwrap_or(config.approach.default_thickness_nm),
            )?;
            let mut slot = RunSlot::new(RunKind::Approach);
            run_to_end(&mut slot, run, &echo, |s| s.status_line())?;
        }
        Command::MotorTest {
            minutes, max_moves, ..
        } => {
            let run = rig.motor_test(
                &config,
                minutes.unwrap_or(config.motor_test.default_duration_min),
                max_moves,
            )?;
            let mut slot = RunSlot::new(RunKind::MotorTest);
            run_to_end(&mut slot, run, &echo, |s| {
                format!(
                    "{}% {} moves, {} errors{}",
                    s.percent(),
                    s.move_count,
                    s.error_count,
                    s.last_record
                        .as_ref()
                        .map(|r| format!(" (last: {})", r))
                        .unwrap_or_default()
                )
            })?;
            if let Some(report) = slot.report() {
                println!("Log written to {}", report.log_path.display());
            }
        }
        Command::Calibrate { distance, yes } => {
            let run = rig.stage_calibration(&config, distance)?;
            let mut slot = RunSlot::new(RunKind::StageCalibration);
            run_to_end(&mut slot, run, &echo, |s| {
                format!("{}/{} {}", s.completed_steps, CalibrationStep::COUNT, s.step)
            })?;
            if let Some(proposal) = slot.take_report().and_then(|r| r.proposal) {
                settle_proposal(proposal, &store, yes)?;
            }
        }
        Command::CalibrateManual {
            x_points,
            y_points,
            distance,
            yes,
        } => {
            let proposal = propose_from_points(
                point_pair(&x_points),
                point_pair(&y_points),
                distance.unwrap_or(config.calibration.shift_distance_um),
                config.calibration.pixel_size_nm,
                rig.microscope.eht_kv(),
                &store,
            )?;
            settle_proposal(proposal, &store, yes)?;
        }
        Command::MotorSpeed {
            duration_x,
            duration_y,
            yes,
        } => {
            let proposal = MotorSpeedProposal::from_durations(duration_x, duration_y)?;
            let (x, y) = rig.microtome.motor_speeds();
            println!("Current: Motor speed X: {:.2}; Motor speed Y: {:.2}", x, y);
            println!("New:     {}", proposal);
            if yes || confirm("Apply these speeds?")? {
                proposal.confirm(rig.microtome.as_ref())?;
                println!("Motor speeds updated.");
            } else {
                println!("Motor speeds unchanged.");
            }
        }
        Command::StageMove { x, y } => {
            let run = rig.stage_move(x, y)?;
            let mut slot = RunSlot::new(RunKind::StageMove);
            run_to_end(&mut slot, run, &echo, |s| {
                format!("X{:.3} Y{:.3} moved: {}", s.target.x, s.target.y, s.moved)
            })?;
        }
        Command::Eht { state } => {
            let run = rig.eht_switch(matches!(state, BeamState::On));
            let mut slot = RunSlot::new(RunKind::EhtSwitch);
            run_to_end(&mut slot, run, &echo, |s| {
                format!("poll {} is_on: {:?}", s.polls, s.is_on)
            })?;
        }
        Command::CutDuration { seconds } => {
            let applied = apply_cut_duration(rig.microtome.as_ref(), seconds)?;
            let manager = store.manager();
            let mut manager = manager.lock();
            manager.config_mut().microtome.full_cut_duration_s = applied.as_secs_f64();
            manager.save()?;
            println!("Full cut duration set to {}.", format_duration(applied));
        }
        Command::Config => {
            let manager = store.manager();
            let manager = manager.lock();
            println!("{}", serde_json::to_string_pretty(manager.config())?);
        }
    }

    Ok(())
}

/// How a run is presented on the console
struct Echo {
    abort_after: Option<Duration>,
    /// Operator log lines to print.
    filter: EventFilter,
}

/// Launch `run` and poll it until it ends, printing progress.
fn run_to_end<S, F>(
    slot: &mut RunSlot<S>,
    run: S,
    echo: &Echo,
    describe: F,
) -> anyhow::Result<RunPhase>
where
    S: RunStep,
    F: Fn(&S::Snapshot) -> String,
{
    let started = Instant::now();
    let mut abort_sent = false;
    let mut cursor = event_bus().last_seq();
    slot.launch(run)?;
    println!("{} started", slot.kind());

    let phase = loop {
        let poll = slot.poll();
        cursor = echo_log(cursor, &echo.filter);
        match poll {
            SlotPoll::Progressed => println!("  {}", describe(&slot.snapshot())),
            SlotPoll::Finished(phase) => break phase,
            SlotPoll::Idle => break slot.phase(),
            SlotPoll::Quiet => {}
        }
        if !abort_sent && echo.abort_after.is_some_and(|limit| started.elapsed() >= limit) {
            println!("Requesting abort...");
            slot.request_abort();
            abort_sent = true;
        }
        thread::sleep(POLL_INTERVAL);
    };

    echo_log(cursor, &echo.filter);
    if let Some(outcome) = slot.outcome() {
        println!("\n{}\n{}", outcome.title, outcome.message);
    }
    tracing::info!("{} ended: {}", slot.kind(), phase);
    Ok(phase)
}

/// Print operator log lines published after `cursor`; returns the new cursor.
fn echo_log(cursor: u64, filter: &EventFilter) -> u64 {
    let mut last = cursor;
    for record in event_bus().records_after(cursor, filter) {
        last = record.seq;
        if let AppEvent::Log(line) = &record.event {
            println!("{}", line);
        }
    }
    last
}

fn point_pair(coords: &[f64]) -> PointPair {
    let at = |i: usize| coords.get(i).copied().unwrap_or_default();
    PointPair::new((at(0), at(1)), (at(2), at(3)))
}

fn settle_proposal(
    proposal: StageCalibrationProposal,
    store: &ConfigCalibrationStore,
    yes: bool,
) -> anyhow::Result<()> {
    println!("\n{}", proposal);
    match proposal.previous() {
        Some(previous) => println!("Currently stored: {}", previous),
        None => println!("No calibration stored for this EHT yet."),
    }
    if yes || confirm("Use these values?")? {
        let stored = proposal.confirm(store)?;
        println!("Stored: {}", stored);
    } else {
        proposal.discard();
        println!("Proposal discarded. Stored calibration unchanged.");
    }
    Ok(())
}

fn confirm(question: &str) -> io::Result<bool> {
    print!("{} [y/N] ", question);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
