use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ScorecardError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("scorecard must be a JSON object")]
    NotAnObject,
}

/// Metrics compared between runs unless the regression config names its own.
pub const TRACKED_METRICS: &[&str] = &[
    "continuity",
    "outline_diversity",
    "prose_variety",
    "dialogue_balance",
    "pacing",
    "character_consistency",
    "repetition",
    "length_target",
];

/// One named metric: its value (higher is better) and whether it met its bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub value: f64,
    #[serde(default)]
    pub pass: bool,
}

impl MetricResult {
    pub fn new(value: f64, pass: bool) -> Self {
        Self { value, pass }
    }
}

/// Weighted roll-up of a scorecard's metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightedScore {
    pub score: f64,
    pub pass: bool,
    /// Metrics with `action_on_fail: fail` that failed.
    pub hard_fail: Vec<String>,
    /// Metrics with `action_on_fail: warn` that failed.
    pub warnings: Vec<String>,
}

/// Quality metrics computed for one finished manuscript.
///
/// Serialized as a flat JSON object: every metric sits at the top level
/// next to the optional `weighted` block and `scene_count`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scorecard {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weighted: Option<WeightedScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_count: Option<usize>,
    #[serde(flatten)]
    pub metrics: BTreeMap<String, MetricResult>,
}

impl Scorecard {
    /// Parse a scorecard document. Top-level entries that are not
    /// `{ value, pass }` objects are skipped rather than rejected.
    pub fn from_json(input: &str) -> Result<Scorecard, ScorecardError> {
        let value: serde_json::Value = serde_json::from_str(input)?;
        let serde_json::Value::Object(entries) = value else {
            return Err(ScorecardError::NotAnObject);
        };

        let mut scorecard = Scorecard::default();
        for (key, entry) in entries {
            match key.as_str() {
                "weighted" => {
                    if !entry.is_null() {
                        scorecard.weighted = Some(serde_json::from_value(entry)?);
                    }
                }
                "scene_count" => scorecard.scene_count = entry.as_u64().map(|n| n as usize),
                _ => match serde_json::from_value::<MetricResult>(entry) {
                    Ok(metric) => {
                        scorecard.metrics.insert(key, metric);
                    }
                    Err(e) => debug!(key = %key, error = %e, "skipping non-metric scorecard entry"),
                },
            }
        }
        Ok(scorecard)
    }

    pub fn load_json(path: &Path) -> Result<Scorecard, ScorecardError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn to_json(&self) -> Result<String, ScorecardError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn metric(&self, name: &str) -> Option<&MetricResult> {
        self.metrics.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64, pass: bool) {
        self.metrics.insert(name.into(), MetricResult::new(value, pass));
    }
}

/// Which earlier run a new run is compared against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareTo {
    #[default]
    LastSuccessful,
    Previous,
    Baseline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressionConfig {
    pub enabled: bool,
    pub compare_to: CompareTo,
    /// A score drop larger than this flags the run as a regression.
    pub regression_threshold: f64,
    /// Per-metric deltas within this band count as unchanged.
    pub epsilon: f64,
    /// Run directories kept on disk. Zero keeps everything.
    pub max_history: usize,
    /// Overrides the `baseline` pointer when comparing to a baseline.
    pub baseline_run_id: Option<String>,
    pub metrics: Vec<String>,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            compare_to: CompareTo::LastSuccessful,
            regression_threshold: 0.02,
            epsilon: 1e-6,
            max_history: 20,
            baseline_run_id: None,
            metrics: TRACKED_METRICS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl RegressionConfig {
    pub fn load_from_ron(path: &Path) -> Result<RegressionConfig, ScorecardError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<RegressionConfig, ScorecardError> {
        Ok(ron::from_str(input)?)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailAction {
    /// A failure only costs the metric's weight.
    #[default]
    Warn,
    /// A failure forces the whole run to fail.
    Fail,
    /// The metric is left out of scoring.
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricWeight {
    pub weight: f64,
    pub action_on_fail: FailAction,
}

impl Default for MetricWeight {
    fn default() -> Self {
        Self {
            weight: 1.0,
            action_on_fail: FailAction::Warn,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightsConfig {
    pub pass_score: f64,
    pub metrics: BTreeMap<String, MetricWeight>,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            pass_score: 0.7,
            metrics: BTreeMap::new(),
        }
    }
}

impl WeightsConfig {
    pub fn load_from_ron(path: &Path) -> Result<WeightsConfig, ScorecardError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<WeightsConfig, ScorecardError> {
        Ok(ron::from_str(input)?)
    }

    /// The configured weight, or weight 1.0 with `warn` for unlisted metrics.
    pub fn weight_for(&self, metric: &str) -> MetricWeight {
        self.metrics.get(metric).copied().unwrap_or_default()
    }
}

/// Caller-supplied provenance recorded in each run manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub policy_fingerprint: String,
    pub model_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_scorecard() {
        let json = r#"{
            "continuity": { "value": 0.9, "pass": true },
            "pacing": { "value": 0.4, "pass": false },
            "title": "The Drowned Station",
            "scene_count": 24,
            "weighted": { "score": 0.75, "pass": true, "hard_fail": [], "warnings": ["pacing"] }
        }"#;
        let card = Scorecard::from_json(json).unwrap();
        assert_eq!(card.metrics.len(), 2);
        assert_eq!(card.metric("pacing"), Some(&MetricResult::new(0.4, false)));
        assert_eq!(card.scene_count, Some(24));
        let weighted = card.weighted.unwrap();
        assert_eq!(weighted.warnings, vec!["pacing".to_string()]);
    }

    #[test]
    fn rejects_non_object() {
        assert!(matches!(
            Scorecard::from_json("[1, 2]"),
            Err(ScorecardError::NotAnObject)
        ));
    }

    #[test]
    fn serializes_flat() {
        let mut card = Scorecard::default();
        card.insert("continuity", 1.0, true);
        let json = card.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["continuity"]["value"], 1.0);
        assert!(value.get("weighted").is_none());
        assert_eq!(Scorecard::from_json(&json).unwrap(), card);
    }

    #[test]
    fn weights_from_ron() {
        let weights = WeightsConfig::parse_ron(
            r#"(
                pass_score: 0.8,
                metrics: {
                    "continuity": (weight: 3.0, action_on_fail: fail),
                    "pacing": (action_on_fail: off),
                },
            )"#,
        )
        .unwrap();
        assert_eq!(weights.pass_score, 0.8);
        assert_eq!(weights.weight_for("continuity").action_on_fail, FailAction::Fail);
        assert_eq!(weights.weight_for("pacing").weight, 1.0);
        assert_eq!(weights.weight_for("unlisted"), MetricWeight::default());
    }

    #[test]
    fn regression_config_defaults() {
        let config = RegressionConfig::parse_ron("(compare_to: previous, max_history: 3)").unwrap();
        assert!(config.enabled);
        assert_eq!(config.compare_to, CompareTo::Previous);
        assert_eq!(config.max_history, 3);
        assert_eq!(config.regression_threshold, 0.02);
        assert_eq!(config.metrics.len(), TRACKED_METRICS.len());
    }
}
