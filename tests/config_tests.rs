// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use std::path::PathBuf;
use vidmask::Config;
use vidmask::media::segmentation::SegmenterKind;

fn temp_config(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "vidmask-config-{}-{}.json",
        name,
        std::process::id()
    ));
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!((config.width, config.height), (1280, 720));
    assert_eq!(config.fps, 20);
    assert_eq!(config.scale, 1.0);
    assert_eq!(config.smooth_kernel, 21);
    assert!(config.background.is_none(), "No background by default");
    assert!(config.output_device.is_none(), "Output device is detected");
}

#[test]
fn test_load_explicit_file() {
    let path = temp_config(
        "explicit",
        r#"{
            "background": "/tmp/beach.jpg",
            "width": 640,
            "height": 480,
            "segmenter": "chroma_key",
            "chroma_key": [0, 255, 0]
        }"#,
    );

    let config = Config::load(Some(&path)).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(config.background, Some(PathBuf::from("/tmp/beach.jpg")));
    assert_eq!((config.width, config.height), (640, 480));
    assert_eq!(config.segmenter, SegmenterKind::ChromaKey);
    assert_eq!(config.segmenter_settings().chroma_key, [0, 255, 0]);
    assert_eq!(config.fps, 20);
}

#[test]
fn test_load_missing_explicit_file_fails() {
    let path = std::env::temp_dir().join("vidmask-config-does-not-exist.json");
    assert!(Config::load(Some(&path)).is_err());
}

#[test]
fn test_load_invalid_json_fails() {
    let path = temp_config("invalid", "{ scale: ");
    let result = Config::load(Some(&path));
    std::fs::remove_file(&path).ok();
    assert!(result.is_err());
}

#[test]
fn test_composition_params_clamp_scale() {
    let config = Config {
        scale: 10.0,
        width: 641,
        ..Config::default()
    };
    let params = config.composition_params();
    assert_eq!(params.scale, 4.0);
    assert_eq!(params.width, 640, "Width is forced even");
}
