//! sillcamd - rolling-history capture daemon for a fixed camera.
//!
//! This daemon:
//! 1. Pulls one frame per tick from the camera into a fixed-size history ring
//! 2. Listens on the MQTT trigger topic for rolling-save and capture messages
//! 3. Writes the ring plus every frame of a rolling window to disk
//! 4. Announces saved pictures and finished windows on the notify topic

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sillcam::config::SillcamConfig;
use sillcam::transport::{parse_mqtt_endpoint, MqttBus};
use sillcam::{
    CameraSource, CaptureScheduler, FrameSource, HistoryWorker, ImageCodec, LogNotifier,
    Notifier, Persister, Recorder, Trigger,
};

/// How long shutdown waits for an in-flight history dump.
const HISTORY_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(author, version, about = "Rolling-history capture daemon for a fixed camera")]
struct Args {
    /// Path to a JSON config file.
    #[arg(long, env = "SILLCAM_CONFIG")]
    config: Option<PathBuf>,

    /// Load and validate the configuration, then exit.
    #[arg(long)]
    check: bool,

    /// Run without a broker; notifications are only logged.
    #[arg(long)]
    no_bus: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = SillcamConfig::load(args.config.as_deref())?;
    if args.check {
        println!(
            "config ok: camera {} at {} fps, history {} frames, rolling window {} ticks, output {}",
            cfg.camera.device,
            cfg.camera.fps,
            cfg.history.size,
            cfg.history.save_period,
            cfg.output.template
        );
        return Ok(());
    }

    let mut camera = CameraSource::new(cfg.camera.clone())?;
    camera
        .connect()
        .with_context(|| format!("connect camera {}", cfg.camera.device))?;

    let persister = Persister::new(
        cfg.output_template()?,
        Arc::new(ImageCodec),
        cfg.output.min_frame_bytes,
    );
    let history = HistoryWorker::spawn(persister.clone(), cfg.history.throttle)?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            log::info!("shutdown requested");
            stop.store(true, Ordering::Relaxed);
        })
        .context("install ctrl-c handler")?;
    }

    let (bus, connection) = if args.no_bus {
        log::warn!("running without a message bus; triggers are disabled");
        (None, None)
    } else {
        let endpoint = parse_mqtt_endpoint(&cfg.bus.broker_addr)?;
        let (bus, connection) = MqttBus::connect(
            &endpoint,
            &cfg.bus_login(),
            cfg.bus_topics(),
            cfg.message_names(),
        )?;
        (Some(Arc::new(bus)), Some(connection))
    };

    let notifier: Arc<dyn Notifier> = match &bus {
        Some(bus) => Arc::clone(bus) as Arc<dyn Notifier>,
        None => Arc::new(LogNotifier),
    };
    let recorder = Arc::new(Recorder::new(
        cfg.recorder_config(),
        persister,
        notifier,
        history,
    )?);

    let listener = match (&bus, connection) {
        (Some(bus), Some(connection)) => {
            let handler = Arc::clone(&recorder);
            let dispatch = Arc::new(move |trigger: Trigger| handler.handle(trigger));
            Some(bus.spawn_listener(
                connection,
                cfg.trigger_router()?,
                dispatch,
                Arc::clone(&stop),
            )?)
        }
        _ => None,
    };

    log::info!(
        "sillcamd running: camera {}, history {} frames, rolling window {} ticks, writing to {}",
        cfg.camera.device,
        cfg.history.size,
        cfg.history.save_period,
        cfg.output.template
    );

    let source: Box<dyn FrameSource> = Box::new(camera);
    let mut scheduler = CaptureScheduler::new(
        Arc::clone(&recorder),
        source,
        cfg.camera.fps,
        Arc::clone(&stop),
    )?;
    scheduler.run();
    if let Some(camera) = scheduler.health().camera {
        log::info!(
            "camera {} delivered {} frames (healthy: {})",
            camera.device,
            camera.frames_captured,
            camera.healthy
        );
    }

    if let Some(report) = recorder.wait_for_history(HISTORY_DRAIN_TIMEOUT) {
        log::info!("last history dump: {} frames written", report.written);
    }
    if let Some(bus) = &bus {
        if let Err(e) = bus.disconnect() {
            log::warn!("MQTT disconnect failed: {:#}", e);
        }
    }
    if let Some(listener) = listener {
        if listener.join().is_err() {
            log::warn!("MQTT listener panicked");
        }
    }

    let stats = recorder.stats();
    log::info!(
        "sillcamd stopped: {} ticks, {} misses, {} single saves, {} rolling windows",
        stats.ticks,
        stats.misses,
        stats.single_saves,
        stats.windows_completed
    );
    Ok(())
}
