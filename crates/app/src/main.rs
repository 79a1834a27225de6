use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracker_bridge_core::{
    channel_device, read_log_file, FusionTracker, HandleResolver, InMemoryScene, PresetFile,
    SimulatedDriver, TrackerError, TrackerParams,
};

fn main() -> tracker_bridge_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            preset,
            config,
            ticks,
            tick_ms,
            record,
        } => {
            let params = load_params(&preset, config.as_deref())?;
            run_live(params, ticks, Duration::from_millis(tick_ms), record.as_deref())
        }
        Commands::Inspect { log } => inspect(&log),
        Commands::Replay {
            log,
            preset,
            config,
        } => {
            let params = load_params(&preset, config.as_deref())?;
            replay(params, &log)
        }
        Commands::Presets => {
            println!("{}", serde_json::to_string_pretty(&PresetFile::builtin())?);
            Ok(())
        }
    }
}

fn load_params(preset: &str, config: Option<&Path>) -> tracker_bridge_core::Result<TrackerParams> {
    let presets = match config {
        Some(path) => PresetFile::load(path)?,
        None => PresetFile::builtin(),
    };
    presets.get(preset).cloned()
}

fn geometry_ids(params: &TrackerParams) -> tracker_bridge_core::Result<Vec<u32>> {
    params
        .motion_configs
        .iter()
        .map(|config| tracker_bridge_core::motion::parse_geometry_id(&config.geometry_id))
        .collect()
}

fn run_live(
    params: TrackerParams,
    ticks: u32,
    tick: Duration,
    record: Option<&str>,
) -> tracker_bridge_core::Result<()> {
    tracing::info!(base = %params.optical_tracker_base, ticks, "starting live tracking");

    let driver = SimulatedDriver::new(geometry_ids(&params)?);
    let scene = InMemoryScene::with_objects(params.object_names());
    let mut tracker = FusionTracker::new(params, driver, scene);
    tracker.construct()?;
    if record.is_some() {
        tracker.start_recording()?;
    }

    let mut applied = 0;
    for _ in 0..ticks {
        applied += tracker.run_one()?;
        thread::sleep(tick);
    }

    if let Some(filename) = record {
        tracker.stop_recording()?;
        let path = tracker.save_recording(filename)?;
        tracing::info!(?path, "recording handed off");
    }
    tracker.destruct();

    let scene = tracker.host();
    for name in tracker.params().object_names() {
        let Ok(handle) = scene.resolve_name(name) else {
            continue;
        };
        if let Some(latest) = scene.latest_for(handle) {
            let t = latest.transform.translation.vector;
            tracing::info!(
                object = name,
                frame = scene.name_of(latest.reference_frame).unwrap_or("?"),
                x = t.x,
                y = t.y,
                z = t.z,
                "final pose"
            );
        }
    }
    tracing::info!(applied, "live tracking finished");
    Ok(())
}

fn inspect(log: &Path) -> tracker_bridge_core::Result<()> {
    let messages = read_log_file(log)?;
    let geometries: BTreeSet<u32> = messages
        .iter()
        .flat_map(|message| message.markers.iter().map(|marker| marker.geometry_id))
        .collect();

    println!("file:       {}", log.display());
    println!("messages:   {}", messages.len());
    if let (Some(first), Some(last)) = (messages.first(), messages.last()) {
        let span_ms = (last.host_time_us - first.host_time_us) as f64 / 1000.0;
        println!("frames:     {} ..= {}", first.frame_index, last.frame_index);
        println!("span:       {span_ms:.1} ms");
        println!("serial:     {:#x}", first.serial_number);
    }
    println!("geometries: {geometries:?}");
    Ok(())
}

fn replay(params: TrackerParams, log: &Path) -> tracker_bridge_core::Result<()> {
    let messages = read_log_file(log)?;
    if messages.is_empty() {
        return Err(TrackerError::msg("recording holds no frames"));
    }
    tracing::info!(?log, messages = messages.len(), "replaying recording");

    let (feeder, driver) = channel_device(1);
    let scene = InMemoryScene::with_objects(params.object_names());
    let mut tracker = FusionTracker::new(params, driver, scene);
    tracker.construct()?;

    let mut applied = 0;
    for (sent, message) in (1..).zip(&messages) {
        feeder.send(message.to_frame())?;
        while tracker.frames_acquired() < sent {
            // Surfaces a failed acquisition instead of waiting forever.
            tracker.run_one()?;
            thread::yield_now();
        }
        applied += tracker.run_one()?;
    }
    tracker.destruct();
    drop(feeder);

    tracing::info!(applied, "replay finished");
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Streams optical tracker poses into a host scene", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Track a simulated device and apply its poses to an in-memory scene.
    Run {
        /// Preset to run.
        #[arg(short, long, default_value = "move-bone")]
        preset: String,
        /// JSON file of presets to use instead of the built-in ones.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Number of dispatcher ticks.
        #[arg(long, default_value_t = 300)]
        ticks: u32,
        /// Delay between ticks, milliseconds.
        #[arg(long, default_value_t = 10)]
        tick_ms: u64,
        /// Record the session and save it under this name (empty for a timestamped name).
        #[arg(long)]
        record: Option<String>,
    },
    /// Verify a saved recording and summarise it.
    Inspect {
        /// Recording to read.
        log: PathBuf,
    },
    /// Feed a saved recording back through the tracker.
    Replay {
        /// Recording to replay.
        log: PathBuf,
        /// Preset whose motion configs are applied to the replayed frames.
        #[arg(short, long, default_value = "move-bone")]
        preset: String,
        /// JSON file of presets to use instead of the built-in ones.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the built-in presets as JSON.
    Presets,
}
