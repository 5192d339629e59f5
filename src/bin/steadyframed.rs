//! steadyframed - long-running stabilization pipeline
//!
//! This daemon:
//! 1. Captures frames from the synthetic source on a producer thread
//! 2. Runs each frame through convert, stabilize and rotate, dropping frames while busy
//! 3. Publishes the result to a single-slot frame bus
//! 4. Renders the latest frame on a consumer thread at its own cadence
//! 5. Logs pipeline health every few seconds until Ctrl-C

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use steadyframe::{
    EdgeHighlight, FrameBus, NullSink, PipelineConfig, PipelineOrchestrator, RenderLoop,
    SyntheticSource,
};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = PipelineConfig::load()?;
    log::info!(
        "steadyframed {} starting: stabilization={} alpha={} floor={} mounting_offset={}",
        env!("CARGO_PKG_VERSION"),
        cfg.stabilization.enabled,
        cfg.stabilization.alpha,
        cfg.stabilization.jitter_floor,
        cfg.orientation.mounting_offset_degrees
    );

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            running.store(false, Ordering::Release);
        })
        .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;
    }

    let bus = Arc::new(FrameBus::new());
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        cfg.pipeline_options(),
        Box::new(cfg.fixed_orientation()),
        bus.clone(),
    )?);

    let mut source = SyntheticSource::new(cfg.capture.clone())?;
    source.connect()?;
    let frame_interval = Duration::from_nanos(source.frame_interval_ns());

    let producer = {
        let running = running.clone();
        let orchestrator = orchestrator.clone();
        thread::Builder::new()
            .name("capture".into())
            .spawn(move || -> Result<()> {
                while running.load(Ordering::Acquire) {
                    let started = Instant::now();
                    let raw = match source.next_frame() {
                        Ok(raw) => raw,
                        Err(e) => {
                            running.store(false, Ordering::Release);
                            return Err(e);
                        }
                    };
                    orchestrator.submit(raw);
                    if let Some(remaining) = frame_interval.checked_sub(started.elapsed()) {
                        thread::sleep(remaining);
                    }
                }
                Ok(())
            })?
    };

    let consumer = {
        let running = running.clone();
        let mut render = RenderLoop::new(
            bus.clone(),
            Box::new(EdgeHighlight::default()),
            NullSink::default(),
            cfg.render.target_fps,
        )?
        .with_mode(cfg.render.filter_mode);
        thread::Builder::new()
            .name("render".into())
            .spawn(move || render.run(&running))?
    };

    log::info!("steadyframed running; Ctrl-C to stop");
    let mut last_health_log = Instant::now();
    while running.load(Ordering::Acquire) {
        thread::sleep(Duration::from_millis(200));
        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            let stats = orchestrator.stats();
            let bus_stats = bus.stats();
            log::info!(
                "health: submitted={} published={} dropped_busy={} failed={} warped={} passthrough={} fallback={} last_pass={:?} superseded_unread={}",
                stats.submitted,
                stats.published,
                stats.dropped_busy,
                stats.failed,
                stats.warped,
                stats.passed_through,
                stats.fallbacks,
                stats.last_pass,
                bus_stats.superseded_unread
            );
            last_health_log = Instant::now();
        }
    }

    log::info!("shutdown signal received, stopping threads...");
    let producer_result = producer
        .join()
        .map_err(|_| anyhow!("capture thread panicked"))?;
    consumer
        .join()
        .map_err(|_| anyhow!("render thread panicked"))?;
    bus.clear();
    producer_result
}
