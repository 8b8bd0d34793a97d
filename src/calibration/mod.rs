// Score calibration: per-provider, per-category linear correction.
//
// Each vendor's model has its own idea of what 0.7 toxicity means. The
// calibrator maps every provider's raw scores onto a shared scale with
// `clamp((raw + offset) * scale, 0, 1)`. Pairs with no parameters pass
// through untouched.
//
// Parameters come from a JSON blob keyed provider → category →
// {offset, scale}, loaded by the binary at startup, and are nudged at
// runtime by feedback-driven auto-tuning (see `tuning`).

pub mod tuning;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::categories::{Category, CategoryScores};

/// Linear correction for one (provider, category) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParams {
    #[serde(default)]
    pub offset: f64,
    #[serde(default = "unit_scale")]
    pub scale: f64,
}

fn unit_scale() -> f64 {
    1.0
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            offset: 0.0,
            scale: 1.0,
        }
    }
}

impl CalibrationParams {
    pub fn apply(&self, raw: f64) -> f64 {
        let calibrated = (raw + self.offset) * self.scale;
        if calibrated.is_nan() {
            return 0.0;
        }
        calibrated.clamp(0.0, 1.0)
    }
}

/// Calibration parameters for every provider, keyed by provider name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Calibrator {
    params: HashMap<String, BTreeMap<Category, CalibrationParams>>,
}

impl Calibrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply calibration for `provider` to a raw score vector.
    pub fn calibrate(&self, provider: &str, raw: &CategoryScores) -> CategoryScores {
        let Some(per_category) = self.params.get(provider) else {
            return *raw;
        };
        CategoryScores::from_fn(|category| match per_category.get(&category) {
            Some(params) => params.apply(raw.get(category)),
            None => raw.get(category),
        })
    }

    pub fn get(&self, provider: &str, category: Category) -> Option<CalibrationParams> {
        self.params
            .get(provider)
            .and_then(|m| m.get(&category))
            .copied()
    }

    /// Replace the parameters for one (provider, category) pair.
    pub fn set(&mut self, provider: &str, category: Category, params: CalibrationParams) {
        self.params
            .entry(provider.to_string())
            .or_default()
            .insert(category, params);
    }

    /// Providers with at least one calibrated category.
    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.params.values().all(BTreeMap::is_empty)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse calibration config")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize calibration config")
    }
}

/// Load a calibration blob from disk. A missing file means no calibration.
pub fn load_file(path: &Path) -> Result<Calibrator> {
    if !path.exists() {
        return Ok(Calibrator::new());
    }
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read calibration file {}", path.display()))?;
    Calibrator::from_json(&json)
}

/// Write a calibration blob to disk, creating parent directories as needed.
pub fn save_file(path: &Path, calibrator: &Calibrator) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create directory for {}", path.display())
            })?;
        }
    }
    std::fs::write(path, calibrator.to_json()?)
        .with_context(|| format!("Failed to write calibration file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncalibrated_provider_passes_through() {
        let calibrator = Calibrator::new();
        let raw = CategoryScores {
            toxicity: 0.42,
            ..Default::default()
        };
        assert_eq!(calibrator.calibrate("p1", &raw), raw);
    }

    #[test]
    fn only_configured_categories_change() {
        let mut calibrator = Calibrator::new();
        calibrator.set(
            "p1",
            Category::Toxicity,
            CalibrationParams {
                offset: -0.1,
                scale: 2.0,
            },
        );
        let raw = CategoryScores {
            toxicity: 0.3,
            hate: 0.3,
            ..Default::default()
        };
        let out = calibrator.calibrate("p1", &raw);
        assert!((out.toxicity - 0.4).abs() < 1e-9);
        assert!((out.hate - 0.3).abs() < 1e-9);
    }

    #[test]
    fn output_is_clamped_at_both_bounds() {
        let offsets = [-2.0, -0.5, 0.0, 0.5, 2.0];
        let scales = [0.0, 0.5, 1.0, 3.0, -1.0];
        for &offset in &offsets {
            for &scale in &scales {
                let params = CalibrationParams { offset, scale };
                for step in 0..=10 {
                    let raw = step as f64 / 10.0;
                    let out = params.apply(raw);
                    assert!(
                        (0.0..=1.0).contains(&out),
                        "offset={offset} scale={scale} raw={raw} gave {out}"
                    );
                }
            }
        }
    }

    #[test]
    fn blob_layout_matches_provider_category_map() {
        let json = r#"{
            "perspective": {
                "toxicity": {"offset": -0.05, "scale": 1.1},
                "hate": {"offset": 0.02}
            }
        }"#;
        let calibrator = Calibrator::from_json(json).unwrap();
        let hate = calibrator.get("perspective", Category::Hate).unwrap();
        assert!((hate.offset - 0.02).abs() < 1e-9);
        assert!((hate.scale - 1.0).abs() < 1e-9);
        assert!(calibrator.get("perspective", Category::Spam).is_none());

        let back = Calibrator::from_json(&calibrator.to_json().unwrap()).unwrap();
        assert_eq!(back, calibrator);
    }

    #[test]
    fn missing_file_loads_empty() {
        let calibrator = load_file(Path::new("/nonexistent/tribunal/calibration.json")).unwrap();
        assert!(calibrator.is_empty());
    }
}
