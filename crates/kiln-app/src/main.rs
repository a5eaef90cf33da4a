use std::env;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use serde::Serialize;

use kiln_config::ShellConfig;
use kiln_core::{
    logging::{self, LogBuffer},
    ManualScheduler, Shell,
};
use kiln_mod_counter::{CounterPlugin, INC, STATE};
use kiln_mod_media::{MediaKind, MediaPlugin, MEDIA};
use kiln_mod_stats::{StatsPlugin, StatsSnapshot, STATS};

const DEFAULT_FRAMES: u64 = 120;
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Stand-in display surface for running without a window.
#[derive(Debug, Clone, Copy)]
struct HeadlessSurface {
    width: u32,
    height: u32,
}

/// Summary printed as JSON once the shell has been disposed.
#[derive(Debug, Serialize)]
struct RunReport {
    frames_requested: u64,
    surface: (u32, u32),
    plugins: Vec<String>,
    counter: u64,
    media_kinds: Vec<MediaKind>,
    stats: StatsSnapshot,
    elapsed_seconds: f64,
}

fn configured_frames() -> Result<u64> {
    match env::var("KILN_FRAMES") {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("KILN_FRAMES must be a frame count, got {raw:?}")),
        Err(_) => Ok(DEFAULT_FRAMES),
    }
}

/// Echo buffered log records to stderr.
fn flush_logs(buffer: &LogBuffer) {
    for record in buffer.drain() {
        eprintln!("{record}");
    }
}

fn main() -> Result<()> {
    let config = ShellConfig::load()?;
    let log_buffer = logging::init(&config.logging)?;
    tracing::info!("kiln starting up");

    let report = run(&config, &log_buffer)?;
    flush_logs(&log_buffer);

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run(config: &ShellConfig, log_buffer: &LogBuffer) -> Result<RunReport> {
    let frames = configured_frames()?;
    let surface = HeadlessSurface {
        width: 1280,
        height: 720,
    };

    let scheduler = Rc::new(ManualScheduler::new());
    let mut shell = Shell::with_config(surface, scheduler.clone(), config);
    shell.use_plugin(MediaPlugin::new())?;
    shell.use_plugin(CounterPlugin::new())?;
    shell.use_plugin(StatsPlugin::new())?;

    let ctx = shell.context().clone();
    let started_at = Instant::now();
    let mut next_frame = started_at;

    for _ in 0..frames {
        next_frame += FRAME_INTERVAL;
        if let Some(wait) = next_frame.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }

        scheduler.fire(started_at.elapsed().as_secs_f64() * 1000.0);
        ctx.events().emit(&INC, &());
        flush_logs(log_buffer);
    }

    let plugins = shell
        .plugin_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    shell.dispose();

    let registry = ctx.registry();
    let surface = ctx.surface();
    Ok(RunReport {
        frames_requested: frames,
        surface: (surface.width, surface.height),
        plugins,
        counter: registry.get(&STATE).map_or(0, |s| s.count()),
        media_kinds: registry
            .with(&MEDIA, |m| m.kinds().to_vec())
            .unwrap_or_default(),
        stats: registry
            .with(&STATS, |s| s.borrow().clone())
            .unwrap_or_default(),
        elapsed_seconds: started_at.elapsed().as_secs_f64(),
    })
}
