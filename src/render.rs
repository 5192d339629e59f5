//! Consumer side of the `FrameBus`.
//!
//! The render loop runs on its own thread and cadence. Each cycle it polls the
//! bus; a new envelope id is filtered and uploaded, an unchanged one is just
//! redrawn. Pacing is cooperative: the loop sleeps whatever is left of the
//! cycle budget and never tries to catch up.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::bus::FrameBus;
use crate::filter::{apply_or_passthrough, DisplayFilter, FilterMode};

pub const DEFAULT_RENDER_FPS: u32 = 15;

/// Display target for filtered frames.
pub trait FrameSink: Send {
    /// Replace the displayed content.
    fn upload(&mut self, id: u64, pixels: &[u8], width: u32, height: u32) -> Result<()>;

    /// Show the previously uploaded content again.
    fn redraw(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sink that discards pixels and counts calls.
#[derive(Debug, Default)]
pub struct NullSink {
    pub uploads: u64,
    pub redraws: u64,
    pub last_id: Option<u64>,
}

impl FrameSink for NullSink {
    fn upload(&mut self, id: u64, _pixels: &[u8], _width: u32, _height: u32) -> Result<()> {
        self.uploads += 1;
        self.last_id = Some(id);
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        self.redraws += 1;
        Ok(())
    }
}

/// Sink that writes every uploaded frame over the same PNG file.
#[derive(Debug)]
pub struct PngSnapshotSink {
    path: PathBuf,
    written: u64,
}

impl PngSnapshotSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            written: 0,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for PngSnapshotSink {
    fn upload(&mut self, id: u64, pixels: &[u8], width: u32, height: u32) -> Result<()> {
        let img = image::RgbaImage::from_raw(width, height, pixels.to_vec())
            .ok_or_else(|| anyhow!("frame {} does not fit {}x{}", id, width, height))?;
        img.save(&self.path)
            .with_context(|| format!("write snapshot {}", self.path.display()))?;
        self.written += 1;
        Ok(())
    }
}

/// Result of one render cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Nothing has been published yet.
    Idle,
    /// A new envelope was filtered and uploaded.
    Uploaded(u64),
    /// The latest envelope was already shown.
    Redrawn(u64),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub cycles: u64,
    pub uploads: u64,
    pub redraws: u64,
    pub sink_errors: u64,
}

pub struct RenderLoop<S: FrameSink> {
    bus: Arc<FrameBus>,
    filter: Box<dyn DisplayFilter>,
    sink: S,
    mode: FilterMode,
    frame_budget: Duration,
    last_rendered: Option<u64>,
    stats: RenderStats,
}

impl<S: FrameSink> RenderLoop<S> {
    pub fn new(
        bus: Arc<FrameBus>,
        filter: Box<dyn DisplayFilter>,
        sink: S,
        target_fps: u32,
    ) -> Result<Self> {
        if target_fps == 0 {
            return Err(anyhow!("render target fps must be >= 1"));
        }
        Ok(Self {
            bus,
            filter,
            sink,
            mode: FilterMode::default(),
            frame_budget: Duration::from_secs(1) / target_fps,
            last_rendered: None,
            stats: RenderStats::default(),
        })
    }

    pub fn with_mode(mut self, mode: FilterMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn set_mode(&mut self, mode: FilterMode) {
        if self.mode != mode {
            self.mode = mode;
            // force the current frame through the new filter
            self.last_rendered = None;
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// One render cycle, without pacing.
    pub fn tick(&mut self) -> RenderOutcome {
        self.stats.cycles += 1;
        let Some(envelope) = self.bus.latest() else {
            return RenderOutcome::Idle;
        };

        if self.last_rendered == Some(envelope.id()) {
            if let Err(e) = self.sink.redraw() {
                self.stats.sink_errors += 1;
                log::warn!("redraw failed: {}", e);
            }
            self.stats.redraws += 1;
            return RenderOutcome::Redrawn(envelope.id());
        }

        let pixels = apply_or_passthrough(
            self.filter.as_mut(),
            envelope.pixels(),
            envelope.width(),
            envelope.height(),
            self.mode,
        );
        if let Err(e) = self
            .sink
            .upload(envelope.id(), &pixels, envelope.width(), envelope.height())
        {
            self.stats.sink_errors += 1;
            log::warn!("upload of frame {} failed: {}", envelope.id(), e);
        }
        self.last_rendered = Some(envelope.id());
        self.stats.uploads += 1;
        RenderOutcome::Uploaded(envelope.id())
    }

    /// Tick at the target rate until `running` is cleared.
    pub fn run(&mut self, running: &AtomicBool) {
        log::info!(
            "render loop started ({} filter, {:?} per cycle)",
            self.filter.name(),
            self.frame_budget
        );
        while running.load(Ordering::Acquire) {
            let started = Instant::now();
            self.tick();
            let elapsed = started.elapsed();
            if let Some(remaining) = self.frame_budget.checked_sub(elapsed) {
                std::thread::sleep(remaining);
            }
        }
        log::info!(
            "render loop stopped: {} uploads, {} redraws",
            self.stats.uploads,
            self.stats.redraws
        );
    }
}
