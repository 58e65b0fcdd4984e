//! CLI configuration: defaults, then an optional JSON file, then environment.

use anyhow::{Context, Result};
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

use beatreel_models::{ReelConfig, TrimMode};

/// Load the pipeline configuration.
pub fn load_config(path: Option<&Path>) -> Result<ReelConfig> {
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid config file {}", path.display()))?
        }
        None => ReelConfig::default(),
    };

    apply_env(&mut config, |key| std::env::var(key).ok());
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Overlay `BEATREEL_*` variables. Unparseable values are ignored with a
/// warning.
pub fn apply_env<F>(config: &mut ReelConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    fn parsed<T: FromStr>(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<T> {
        let raw = lookup(key)?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(key, value = %raw, "Ignoring unparseable environment override");
                None
            }
        }
    }

    let lookup: &dyn Fn(&str) -> Option<String> = &lookup;

    if let Some(v) = parsed(lookup, "BEATREEL_SEGMENT_SECONDS") {
        config.segment_duration_seconds = v;
    }
    if let Some(v) = parsed(lookup, "BEATREEL_MIN_SEGMENT_SECONDS") {
        config.min_segment_seconds = v;
    }
    if let Some(v) = parsed(lookup, "BEATREEL_FRAME_RATE") {
        config.target_frame_rate = v;
    }
    if let Some(v) = parsed(lookup, "BEATREEL_MIN_OUTPUT_RATIO") {
        config.min_output_size_ratio = v;
    }
    if let Some(v) = parsed(lookup, "BEATREEL_RECORDING_TIMEOUT_MS") {
        config.recording_timeout_ms = v;
    }
    if let Some(v) = parsed::<TrimMode>(lookup, "BEATREEL_TRIM_MODE") {
        config.trim_mode = v;
    }
    if let Some(dir) = lookup("BEATREEL_WORK_DIR").filter(|d| !d.trim().is_empty()) {
        config.work_dir = Some(dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overlay() {
        let mut config = ReelConfig::default();
        apply_env(
            &mut config,
            env(&[
                ("BEATREEL_SEGMENT_SECONDS", "2.5"),
                ("BEATREEL_FRAME_RATE", "24"),
                ("BEATREEL_TRIM_MODE", "copy"),
                ("BEATREEL_WORK_DIR", "/tmp/reels"),
            ]),
        );

        assert_eq!(config.segment_duration_seconds, 2.5);
        assert_eq!(config.target_frame_rate, 24);
        assert_eq!(config.trim_mode, TrimMode::KeyframeCopy);
        assert_eq!(config.work_dir.as_deref(), Some("/tmp/reels"));
    }

    #[test]
    fn test_bad_values_are_ignored() {
        let mut config = ReelConfig::default();
        apply_env(
            &mut config,
            env(&[
                ("BEATREEL_FRAME_RATE", "fast"),
                ("BEATREEL_TRIM_MODE", "sideways"),
            ]),
        );
        assert_eq!(config, ReelConfig::default());
    }

    #[test]
    fn test_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reel.json");
        std::fs::write(&path, r#"{"segment_duration_seconds": 4.0, "min_output_size_ratio": 0.5}"#).unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.min_output_size_ratio, 0.5);
        assert_eq!(config.target_frame_rate, 30);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reel.json");
        std::fs::write(&path, r#"{"min_output_size_ratio": 2.0}"#).unwrap();

        assert!(load_config(Some(&path)).is_err());
    }
}
