use std::sync::Mutex;

use tempfile::NamedTempFile;

use steadyframe::config::PipelineConfig;
use steadyframe::{ChromaLayout, FilterMode};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "STEADYFRAME_CONFIG",
        "STEADYFRAME_STABILIZATION",
        "STEADYFRAME_SMOOTHING_ALPHA",
        "STEADYFRAME_JITTER_FLOOR",
        "STEADYFRAME_MOUNTING_OFFSET",
        "STEADYFRAME_CAPTURE_FPS",
        "STEADYFRAME_JITTER_PX",
        "STEADYFRAME_CHROMA_LAYOUT",
        "STEADYFRAME_RENDER_FPS",
        "STEADYFRAME_FILTER",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_defaults_without_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = PipelineConfig::load().expect("load defaults");
    assert_eq!(cfg, PipelineConfig::default());
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "capture": {
                "width": 800,
                "height": 600,
                "fps": 24,
                "layout": "interleaved"
            },
            "motion": {
                "grid_stride": 16
            },
            "stabilization": {
                "alpha": 0.5,
                "jitter_floor": 0.25
            },
            "orientation": {
                "sensor_degrees": 90,
                "mounting_offset_degrees": 180
            },
            "render": {
                "target_fps": 10,
                "filter_mode": "edges"
            }
        }"#,
    );

    std::env::set_var("STEADYFRAME_CONFIG", file.path());
    std::env::set_var("STEADYFRAME_SMOOTHING_ALPHA", "0.4");
    std::env::set_var("STEADYFRAME_MOUNTING_OFFSET", "0");
    std::env::set_var("STEADYFRAME_STABILIZATION", "false");

    let cfg = PipelineConfig::load().expect("load config");

    assert_eq!(cfg.capture.width, 800);
    assert_eq!(cfg.capture.height, 600);
    assert_eq!(cfg.capture.fps, 24);
    assert_eq!(cfg.capture.layout, ChromaLayout::Interleaved);
    assert_eq!(cfg.capture.jitter_px, 4);
    assert_eq!(cfg.motion.grid_stride, 16);
    assert_eq!(cfg.motion.search_radius, 16);
    assert_eq!(cfg.stabilization.alpha, 0.4);
    assert_eq!(cfg.stabilization.jitter_floor, 0.25);
    assert!(!cfg.stabilization.enabled);
    assert_eq!(cfg.orientation.sensor_degrees, 90);
    assert_eq!(cfg.orientation.device_degrees, 0);
    assert_eq!(cfg.orientation.mounting_offset_degrees, 0);
    assert_eq!(cfg.render.target_fps, 10);
    assert_eq!(cfg.render.filter_mode, FilterMode::Edges);

    let options = cfg.pipeline_options();
    assert!(!options.stabilization.enabled);
    assert_eq!(options.mounting_offset_degrees, 0);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(r#"{"orientation": {"device_degrees": 45}}"#);
    std::env::set_var("STEADYFRAME_CONFIG", file.path());
    assert!(PipelineConfig::load().is_err());

    clear_env();
    std::env::set_var("STEADYFRAME_SMOOTHING_ALPHA", "1.5");
    assert!(PipelineConfig::load().is_err());

    clear_env();
    std::env::set_var("STEADYFRAME_FILTER", "sepia");
    assert!(PipelineConfig::load().is_err());

    clear_env();
    let file = write_config("{ not json");
    std::env::set_var("STEADYFRAME_CONFIG", file.path());
    assert!(PipelineConfig::load().is_err());

    clear_env();
}
