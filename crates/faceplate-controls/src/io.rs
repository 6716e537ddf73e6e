//! JSON run configuration and report helpers for control detection.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::DetectorConfig;
use crate::types::{ControlDraft, ControlKind};

#[derive(thiserror::Error, Debug)]
pub enum DetectIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Configuration of one detection run, as read by the command-line tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectRunConfig {
    pub image_path: String,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub sensitivity: Option<f32>,
    /// Field overrides applied on top of the sensitivity mapping.
    #[serde(default)]
    pub detector: Option<Map<String, Value>>,
}

impl DetectRunConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, DetectIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), DetectIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Resolve the output report path.
    pub fn output_path(&self) -> PathBuf {
        self.output_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("faceplate_report.json"))
    }

    /// Build the detector configuration: the sensitivity mapping first, then
    /// the explicit field overrides.
    pub fn build_config(&self) -> Result<DetectorConfig, DetectIoError> {
        let base = DetectorConfig::from_sensitivity(self.sensitivity.unwrap_or(0.5));
        let Some(overrides) = self.detector.as_ref() else {
            return Ok(base);
        };
        let mut value = serde_json::to_value(base)?;
        if let Value::Object(fields) = &mut value {
            for (key, v) in overrides {
                fields.insert(key.clone(), v.clone());
            }
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// Result of one detection run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectReport {
    pub image_path: String,
    pub image_width: u32,
    pub image_height: u32,
    pub config: DetectorConfig,
    #[serde(default)]
    pub drafts: Vec<ControlDraft>,
    #[serde(default)]
    pub counts: BTreeMap<ControlKind, usize>,
    #[serde(default)]
    pub elapsed_ms: f64,
    #[serde(default)]
    pub error: Option<String>,
}

impl DetectReport {
    pub fn new(image_path: impl Into<String>, width: u32, height: u32, config: DetectorConfig) -> Self {
        Self {
            image_path: image_path.into(),
            image_width: width,
            image_height: height,
            config,
            drafts: Vec::new(),
            counts: BTreeMap::new(),
            elapsed_ms: 0.0,
            error: None,
        }
    }

    /// Populate the report from a finished detection.
    pub fn set_drafts(&mut self, drafts: Vec<ControlDraft>, elapsed: Duration) {
        self.counts.clear();
        for d in &drafts {
            *self.counts.entry(d.kind).or_insert(0) += 1;
        }
        self.drafts = drafts;
        self.elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        self.error = None;
    }

    /// Record a detection error.
    pub fn set_error(&mut self, err: impl std::fmt::Display) {
        self.error = Some(err.to_string());
    }

    /// One-line per-kind summary, e.g. `4 knob, 1 lit button`.
    pub fn summary(&self) -> String {
        if self.counts.is_empty() {
            return "no controls".to_string();
        }
        self.counts
            .iter()
            .map(|(kind, n)| format!("{} {}", n, kind.base_name().to_lowercase()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Load a report from JSON on disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, DetectIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this report to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), DetectIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_support::round_draft;
    use approx::assert_relative_eq;

    #[test]
    fn overrides_apply_after_sensitivity() {
        let run: DetectRunConfig = serde_json::from_str(
            r#"{
                "image_path": "panel.png",
                "sensitivity": 1.0,
                "detector": { "knob_min_diameter": 50.0 }
            }"#,
        )
        .expect("parse");
        let cfg = run.build_config().expect("config");
        let loose = DetectorConfig::from_sensitivity(1.0);
        assert_relative_eq!(cfg.knob_min_diameter, 50.0);
        assert_relative_eq!(cfg.cov_base, loose.cov_base);
        assert_eq!(run.output_path(), PathBuf::from("faceplate_report.json"));
    }

    #[test]
    fn bad_override_is_a_json_error() {
        let run = DetectRunConfig {
            image_path: "panel.png".to_string(),
            detector: serde_json::from_str(r#"{ "downscale_max": "big" }"#).ok(),
            ..DetectRunConfig::default()
        };
        assert!(matches!(run.build_config(), Err(DetectIoError::Json(_))));
    }

    #[test]
    fn report_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.json");
        let mut report = DetectReport::new("panel.png", 640, 480, DetectorConfig::default());
        report.set_drafts(
            vec![
                round_draft(0, ControlKind::Knob, 100.0, 100.0, 20.0, 0.7),
                round_draft(1, ControlKind::Knob, 200.0, 100.0, 20.0, 0.7),
                round_draft(2, ControlKind::Light, 300.0, 100.0, 5.0, 0.6),
            ],
            Duration::from_millis(12),
        );
        assert_eq!(report.summary(), "2 knob, 1 light");
        report.write_json(&path).expect("write");
        let back = DetectReport::load_json(&path).expect("read");
        assert_eq!(back.drafts, report.drafts);
        assert_eq!(back.counts.get(&ControlKind::Knob), Some(&2));
        assert_relative_eq!(back.elapsed_ms, 12.0);
    }
}
