//! demo - bounded synthetic run of the stabilization pipeline

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use steadyframe::{
    Admission, ChromaLayout, EdgeHighlight, FilterMode, FrameBus, FrameSink, NullSink,
    PipelineConfig, PipelineOrchestrator, PngSnapshotSink, RenderLoop, SyntheticConfig,
    SyntheticSource,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of synthetic frames to push through the pipeline.
    #[arg(long, default_value_t = 90)]
    frames: u64,
    /// Capture rate of the synthetic source.
    #[arg(long, default_value_t = 30)]
    fps: u32,
    #[arg(long, default_value_t = 320)]
    width: u32,
    #[arg(long, default_value_t = 240)]
    height: u32,
    /// Maximum per-frame shake in pixels.
    #[arg(long, default_value_t = 4)]
    jitter: u32,
    /// Seed for the jitter sequence.
    #[arg(long, default_value_t = 7)]
    seed: u64,
    /// Chroma layout: planar (I420) or interleaved (NV12).
    #[arg(long, default_value = "planar")]
    layout: ChromaLayout,
    /// Display filter mode: raw or edges.
    #[arg(long, default_value = "raw")]
    filter: FilterMode,
    /// Disable stabilization.
    #[arg(long)]
    no_stabilize: bool,
    /// Mounting offset in degrees (multiple of 90).
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    mounting_offset: i32,
    /// Write the last rendered frame to this PNG file.
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.frames == 0 {
        return Err(anyhow!("frames must be >= 1"));
    }

    let mut cfg = PipelineConfig {
        capture: SyntheticConfig {
            width: args.width,
            height: args.height,
            fps: args.fps,
            jitter_px: args.jitter,
            layout: args.layout,
            seed: args.seed,
        },
        ..PipelineConfig::default()
    };
    cfg.stabilization.enabled = !args.no_stabilize;
    cfg.orientation.mounting_offset_degrees = args.mounting_offset;
    cfg.render.filter_mode = args.filter;
    cfg.validate()?;

    match args.snapshot.clone() {
        Some(path) => {
            let sink = PngSnapshotSink::new(&path);
            let written = run(&cfg, args.frames, sink)?.written();
            println!("snapshot: {} ({} writes)", path.display(), written);
        }
        None => {
            run(&cfg, args.frames, NullSink::default())?;
        }
    }
    Ok(())
}

/// Feed `frames` frames through the pipeline, rendering after each one.
fn run<S: FrameSink>(cfg: &PipelineConfig, frames: u64, sink: S) -> Result<S> {
    let bus = Arc::new(FrameBus::new());
    let orchestrator = PipelineOrchestrator::new(
        cfg.pipeline_options(),
        Box::new(cfg.fixed_orientation()),
        bus.clone(),
    )?;
    let mut source = SyntheticSource::new(cfg.capture.clone())?;
    source.connect()?;
    let mut render = RenderLoop::new(
        bus,
        Box::new(EdgeHighlight::default()),
        sink,
        cfg.render.target_fps,
    )?
    .with_mode(cfg.render.filter_mode);

    let mut failed = 0u64;
    for _ in 0..frames {
        let raw = source.next_frame()?;
        if orchestrator.submit(raw) == Admission::Failed {
            failed += 1;
        }
        render.tick();
    }

    let stats = orchestrator.stats();
    let render_stats = render.stats();
    println!("frames submitted:  {}", stats.submitted);
    println!("frames published:  {}", stats.published);
    println!("dropped (busy):    {}", stats.dropped_busy);
    println!("failed:            {}", failed);
    println!("warped:            {}", stats.warped);
    println!("passed through:    {}", stats.passed_through);
    println!("fallbacks:         {}", stats.fallbacks);
    println!("last pass:         {:?}", stats.last_pass);
    println!(
        "render:            {} uploads, {} redraws, {} sink errors",
        render_stats.uploads, render_stats.redraws, render_stats.sink_errors
    );
    orchestrator.inspect_state(|state| {
        let smoothed = state.smoothed();
        println!(
            "smoothed motion:   ({:.2}, {:.2}), history {}/{}",
            smoothed.tx,
            smoothed.ty,
            state.history().len(),
            state.history().capacity()
        );
    });

    Ok(render.into_sink())
}
