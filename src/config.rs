use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;

use crate::filter::FilterMode;
use crate::ingest::{ChromaLayout, SyntheticConfig};
use crate::motion::MotionConfig;
use crate::orientation::{FixedOrientation, Rotation};
use crate::pipeline::PipelineOptions;
use crate::render::DEFAULT_RENDER_FPS;
use crate::stabilize::StabilizationConfig;

pub const CONFIG_ENV: &str = "STEADYFRAME_CONFIG";

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    capture: Option<SyntheticConfig>,
    motion: Option<MotionConfig>,
    stabilization: Option<StabilizationConfig>,
    orientation: Option<OrientationConfigFile>,
    render: Option<RenderConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct OrientationConfigFile {
    sensor_degrees: Option<i32>,
    device_degrees: Option<i32>,
    mounting_offset_degrees: Option<i32>,
}

#[derive(Debug, Deserialize, Default)]
struct RenderConfigFile {
    target_fps: Option<u32>,
    filter_mode: Option<FilterMode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub capture: SyntheticConfig,
    pub motion: MotionConfig,
    pub stabilization: StabilizationConfig,
    pub orientation: OrientationSettings,
    pub render: RenderSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrientationSettings {
    pub sensor_degrees: i32,
    pub device_degrees: i32,
    pub mounting_offset_degrees: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSettings {
    pub target_fps: u32,
    pub filter_mode: FilterMode,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            target_fps: DEFAULT_RENDER_FPS,
            filter_mode: FilterMode::Raw,
        }
    }
}

impl PipelineConfig {
    /// Load from the file named by `STEADYFRAME_CONFIG` (if set), then apply
    /// `STEADYFRAME_*` overrides, then validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV).ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Self {
        let orientation = file.orientation.unwrap_or_default();
        let render = file.render.unwrap_or_default();
        let render_defaults = RenderSettings::default();
        Self {
            capture: file.capture.unwrap_or_default(),
            motion: file.motion.unwrap_or_default(),
            stabilization: file.stabilization.unwrap_or_default(),
            orientation: OrientationSettings {
                sensor_degrees: orientation.sensor_degrees.unwrap_or(0),
                device_degrees: orientation.device_degrees.unwrap_or(0),
                mounting_offset_degrees: orientation.mounting_offset_degrees.unwrap_or(0),
            },
            render: RenderSettings {
                target_fps: render.target_fps.unwrap_or(render_defaults.target_fps),
                filter_mode: render.filter_mode.unwrap_or(render_defaults.filter_mode),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(enabled) = env_parse::<bool>("STEADYFRAME_STABILIZATION")? {
            self.stabilization.enabled = enabled;
        }
        if let Some(alpha) = env_parse::<f64>("STEADYFRAME_SMOOTHING_ALPHA")? {
            self.stabilization.alpha = alpha;
        }
        if let Some(floor) = env_parse::<f64>("STEADYFRAME_JITTER_FLOOR")? {
            self.stabilization.jitter_floor = floor;
        }
        if let Some(offset) = env_parse::<i32>("STEADYFRAME_MOUNTING_OFFSET")? {
            self.orientation.mounting_offset_degrees = offset;
        }
        if let Some(fps) = env_parse::<u32>("STEADYFRAME_CAPTURE_FPS")? {
            self.capture.fps = fps;
        }
        if let Some(jitter) = env_parse::<u32>("STEADYFRAME_JITTER_PX")? {
            self.capture.jitter_px = jitter;
        }
        if let Some(layout) = env_parse::<ChromaLayout>("STEADYFRAME_CHROMA_LAYOUT")? {
            self.capture.layout = layout;
        }
        if let Some(fps) = env_parse::<u32>("STEADYFRAME_RENDER_FPS")? {
            self.render.target_fps = fps;
        }
        if let Some(mode) = env_parse::<FilterMode>("STEADYFRAME_FILTER")? {
            self.render.filter_mode = mode;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.stabilization;
        if !(s.alpha > 0.0 && s.alpha <= 1.0) {
            return Err(anyhow!("stabilization alpha must be in (0, 1], got {}", s.alpha));
        }
        if !s.jitter_floor.is_finite() || s.jitter_floor < 0.0 {
            return Err(anyhow!("jitter floor must be a non-negative number"));
        }
        if s.history_capacity == 0 {
            return Err(anyhow!("history capacity must be at least 1"));
        }

        let m = &self.motion;
        if m.grid_stride == 0 || m.search_step == 0 {
            return Err(anyhow!("motion grid stride and search step must be > 0"));
        }

        let o = &self.orientation;
        for (name, degrees) in [
            ("sensor", o.sensor_degrees),
            ("device", o.device_degrees),
            ("mounting offset", o.mounting_offset_degrees),
        ] {
            Rotation::from_degrees(degrees)
                .map_err(|e| anyhow!("invalid {} orientation: {}", name, e))?;
        }

        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(anyhow!("capture dimensions must be non-zero"));
        }
        if self.capture.fps == 0 {
            return Err(anyhow!("capture fps must be >= 1"));
        }
        if self.render.target_fps == 0 {
            return Err(anyhow!("render fps must be >= 1"));
        }
        Ok(())
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            motion: self.motion,
            stabilization: self.stabilization,
            mounting_offset_degrees: self.orientation.mounting_offset_degrees,
        }
    }

    pub fn fixed_orientation(&self) -> FixedOrientation {
        FixedOrientation {
            sensor_degrees: self.orientation.sensor_degrees,
            device_degrees: self.orientation.device_degrees,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_file(PipelineConfigFile::default())
    }
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow!("{} is invalid: {}", key, e)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = PipelineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.render.target_fps, 15);
        assert_eq!(cfg.orientation.mounting_offset_degrees, 0);
        assert!(cfg.stabilization.enabled);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let file: PipelineConfigFile = serde_json::from_str(
            r#"{"stabilization": {"alpha": 0.5}, "orientation": {"mounting_offset_degrees": 180}}"#,
        )
        .unwrap();
        let cfg = PipelineConfig::from_file(file);
        assert_eq!(cfg.stabilization.alpha, 0.5);
        assert_eq!(cfg.stabilization.history_capacity, 5);
        assert_eq!(cfg.orientation.mounting_offset_degrees, 180);
        assert_eq!(cfg.motion, MotionConfig::default());
    }

    #[test]
    fn rejects_bad_values() {
        let mut cfg = PipelineConfig::default();
        cfg.stabilization.alpha = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.orientation.sensor_degrees = 45;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.motion.search_step = 0;
        assert!(cfg.validate().is_err());
    }
}
