/// Scorecard regression store: immutable per-run snapshots, pointer
/// files and run-to-run diffs.
///
/// Layout under the output directory:
///
/// ```text
/// scorecard_diff.json
/// runs/latest.json            { "run_id": ... }
/// runs/last_successful.json
/// runs/baseline.json
/// runs/<run_id>/scorecard.json
/// runs/<run_id>/manifest.json
/// runs/<run_id>/diff.json
/// ```

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::scoring::evaluate_weighted;
use crate::schema::scorecard::{
    CompareTo, RegressionConfig, RunInfo, Scorecard, ScorecardError, WeightedScore, WeightsConfig,
};

const RUNS_DIR: &str = "runs";
const SCORECARD_FILE: &str = "scorecard.json";
const MANIFEST_FILE: &str = "manifest.json";
const DIFF_FILE: &str = "diff.json";
const CURRENT_DIFF_FILE: &str = "scorecard_diff.json";
/// Length of the top improved / regressed metric lists.
const TOP_N: usize = 5;

#[derive(Debug, Error)]
pub enum RegressionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("scorecard error: {0}")]
    Scorecard(#[from] ScorecardError),
    #[error("run not found: {0}")]
    RunNotFound(RunId),
}

/// Identifier of one stored run: UTC timestamp with microseconds plus a
/// random hex suffix. Ids sort lexicographically in creation order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn generate() -> RunId {
        Self::generate_at(Utc::now(), &mut rand::thread_rng())
    }

    pub fn generate_at<R: Rng>(at: DateTime<Utc>, rng: &mut R) -> RunId {
        let suffix: u32 = rng.gen();
        RunId(format!("{}_{:08x}", at.format("%Y%m%dT%H%M%S%6fZ"), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the id names a single directory under `runs/`. Ids read
    /// from configs or pointer files are checked before touching disk.
    pub fn is_path_safe(&self) -> bool {
        !self.0.is_empty()
            && !self.0.contains("..")
            && !self.0.contains(['/', '\\', ':'])
    }
}

impl From<String> for RunId {
    fn from(id: String) -> Self {
        RunId(id)
    }
}

impl From<&str> for RunId {
    fn from(id: &str) -> Self {
        RunId(id.to_string())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The named pointer records. These are the only files ever overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pointer {
    Latest,
    LastSuccessful,
    Baseline,
}

impl Pointer {
    fn file_name(&self) -> &'static str {
        match self {
            Pointer::Latest => "latest.json",
            Pointer::LastSuccessful => "last_successful.json",
            Pointer::Baseline => "baseline.json",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PointerRecord {
    run_id: RunId,
}

/// Summary written next to each stored scorecard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: RunId,
    pub created_at: DateTime<Utc>,
    pub pass: bool,
    pub weighted_score: Option<f64>,
    pub scene_count: Option<usize>,
    pub policy_fingerprint: String,
    pub model_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusChange {
    Improved,
    Regressed,
    Unchanged,
    NoCompare,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDiff {
    pub current: f64,
    pub previous: Option<f64>,
    pub delta: Option<f64>,
    pub pass_current: bool,
    pub pass_previous: Option<bool>,
    pub status_change: StatusChange,
}

/// Result of comparing one run against its comparison target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScorecardDiff {
    pub enabled: bool,
    pub run_id: Option<RunId>,
    pub compare_to: Option<CompareTo>,
    pub compared_run_id: Option<RunId>,
    pub comparison_available: bool,
    pub metrics: BTreeMap<String, MetricDiff>,
    pub score_current: Option<f64>,
    pub score_previous: Option<f64>,
    /// Zero when there is nothing to compare against.
    pub score_delta: f64,
    pub regression: bool,
    pub top_improved: Vec<String>,
    pub top_regressed: Vec<String>,
    pub weighted: Option<WeightedScore>,
}

impl ScorecardDiff {
    pub fn count(&self, status: StatusChange) -> usize {
        self.metrics.values().filter(|m| m.status_change == status).count()
    }
}

/// Store `scorecard` as a new run and diff it against the configured
/// comparison target.
///
/// A disabled config returns `enabled: false` without touching disk. A
/// missing comparison target is not an error; the diff then reports no
/// prior data. Only write failures are surfaced.
pub fn store_and_diff(
    output_dir: &Path,
    scorecard: &Scorecard,
    config: &RegressionConfig,
    weights: &WeightsConfig,
    run_info: &RunInfo,
) -> Result<ScorecardDiff, RegressionError> {
    if !config.enabled {
        debug!("regression tracking disabled");
        return Ok(ScorecardDiff::default());
    }

    let run_id = RunId::generate();
    let dir = run_dir(output_dir, &run_id);
    std::fs::create_dir_all(&dir)?;

    let weighted = weighted_score(scorecard, weights);
    let manifest = RunManifest {
        run_id: run_id.clone(),
        created_at: Utc::now(),
        pass: weighted.pass,
        weighted_score: Some(weighted.score),
        scene_count: scorecard.scene_count,
        policy_fingerprint: run_info.policy_fingerprint.clone(),
        model_id: run_info.model_id.clone(),
    };
    write_json(&dir.join(SCORECARD_FILE), scorecard)?;
    write_json(&dir.join(MANIFEST_FILE), &manifest)?;
    info!(run_id = %run_id, pass = manifest.pass, score = weighted.score, "stored run snapshot");

    let target = resolve_target(output_dir, config)?;
    let previous = match &target {
        Some(id) => match load_snapshot(output_dir, id) {
            Ok(card) => Some(card),
            Err(RegressionError::RunNotFound(_)) => {
                warn!(run_id = %id, "comparison snapshot missing; diffing without prior data");
                None
            }
            Err(e) => return Err(e),
        },
        None => None,
    };

    let mut diff = diff_scorecards(scorecard, previous.as_ref(), config, weights);
    diff.run_id = Some(run_id.clone());
    diff.compare_to = Some(config.compare_to);
    if previous.is_some() {
        diff.compared_run_id = target;
    }

    write_json(&dir.join(DIFF_FILE), &diff)?;
    write_json(&output_dir.join(CURRENT_DIFF_FILE), &diff)?;

    write_pointer(output_dir, Pointer::Latest, &run_id)?;
    if manifest.pass {
        write_pointer(output_dir, Pointer::LastSuccessful, &run_id)?;
    }

    prune_runs(output_dir, config.max_history, &run_id)?;

    if diff.regression {
        warn!(run_id = %run_id, score_delta = diff.score_delta, "score regression detected");
    }
    Ok(diff)
}

/// Compare two scorecards without touching disk. `previous: None` yields
/// `no_compare` for every metric and a zero score delta.
pub fn diff_scorecards(
    current: &Scorecard,
    previous: Option<&Scorecard>,
    config: &RegressionConfig,
    weights: &WeightsConfig,
) -> ScorecardDiff {
    let weighted = weighted_score(current, weights);
    let previous_weighted = previous.map(|p| weighted_score(p, weights));

    let mut metrics = BTreeMap::new();
    for name in &config.metrics {
        let Some(cur) = current.metric(name) else {
            continue;
        };
        let prev = previous.and_then(|p| p.metric(name));
        let delta = prev.map(|p| cur.value - p.value);
        let status_change = match (prev, delta) {
            (Some(p), Some(d)) => {
                if (!p.pass && cur.pass) || d > config.epsilon {
                    StatusChange::Improved
                } else if (p.pass && !cur.pass) || d < -config.epsilon {
                    StatusChange::Regressed
                } else {
                    StatusChange::Unchanged
                }
            }
            _ => StatusChange::NoCompare,
        };
        metrics.insert(
            name.clone(),
            MetricDiff {
                current: cur.value,
                previous: prev.map(|p| p.value),
                delta,
                pass_current: cur.pass,
                pass_previous: prev.map(|p| p.pass),
                status_change,
            },
        );
    }

    let score_previous = previous_weighted.as_ref().map(|w| w.score);
    let score_delta = score_previous.map_or(0.0, |prev| weighted.score - prev);

    ScorecardDiff {
        enabled: true,
        run_id: None,
        compare_to: None,
        compared_run_id: None,
        comparison_available: previous.is_some(),
        top_improved: top_metrics(&metrics, StatusChange::Improved),
        top_regressed: top_metrics(&metrics, StatusChange::Regressed),
        metrics,
        score_current: Some(weighted.score),
        score_previous,
        score_delta,
        regression: score_delta < -config.regression_threshold,
        weighted: Some(weighted),
    }
}

/// The scorecard's own weighted block when it carries one, otherwise the
/// roll-up of its metrics under `weights`.
fn weighted_score(scorecard: &Scorecard, weights: &WeightsConfig) -> WeightedScore {
    match &scorecard.weighted {
        Some(weighted) => weighted.clone(),
        None => evaluate_weighted(scorecard, weights),
    }
}

/// Largest moves first; improvements by descending delta, regressions by
/// ascending delta.
fn top_metrics(metrics: &BTreeMap<String, MetricDiff>, status: StatusChange) -> Vec<String> {
    let mut moved: Vec<(&String, f64)> = metrics
        .iter()
        .filter(|(_, m)| m.status_change == status)
        .map(|(name, m)| (name, m.delta.unwrap_or(0.0)))
        .collect();
    moved.sort_by(|a, b| {
        let order = a.1.total_cmp(&b.1);
        let order = if status == StatusChange::Improved { order.reverse() } else { order };
        order.then_with(|| a.0.cmp(b.0))
    });
    moved.into_iter().take(TOP_N).map(|(name, _)| name.clone()).collect()
}

fn resolve_target(
    output_dir: &Path,
    config: &RegressionConfig,
) -> Result<Option<RunId>, RegressionError> {
    let target = match config.compare_to {
        CompareTo::LastSuccessful => read_pointer(output_dir, Pointer::LastSuccessful)?,
        CompareTo::Previous => read_pointer(output_dir, Pointer::Latest)?,
        CompareTo::Baseline => match &config.baseline_run_id {
            Some(id) => Some(RunId::from(id.as_str())),
            None => read_pointer(output_dir, Pointer::Baseline)?,
        },
    };
    if let Some(id) = target.as_ref().filter(|id| !id.is_path_safe()) {
        warn!(run_id = %id, "comparison run id is not a plain run directory name; ignored");
        return Ok(None);
    }
    debug!(compare_to = ?config.compare_to, target = ?target, "resolved comparison target");
    Ok(target)
}

/// Point the `baseline` pointer at an existing run.
pub fn set_baseline(output_dir: &Path, run_id: &RunId) -> Result<(), RegressionError> {
    if !run_id.is_path_safe() || !run_dir(output_dir, run_id).join(SCORECARD_FILE).is_file() {
        return Err(RegressionError::RunNotFound(run_id.clone()));
    }
    write_pointer(output_dir, Pointer::Baseline, run_id)
}

/// The run id a pointer holds, or `None` if the pointer was never written
/// or cannot be read.
pub fn read_pointer(output_dir: &Path, pointer: Pointer) -> Result<Option<RunId>, RegressionError> {
    let path = runs_root(output_dir).join(pointer.file_name());
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match serde_json::from_str::<PointerRecord>(&contents) {
        Ok(record) => Ok(Some(record.run_id)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable pointer");
            Ok(None)
        }
    }
}

/// Stored run ids, oldest first.
pub fn list_runs(output_dir: &Path) -> Result<Vec<RunId>, RegressionError> {
    let root = runs_root(output_dir);
    let entries = match std::fs::read_dir(&root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut runs = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            runs.push(RunId::from(name));
        }
    }
    runs.sort();
    Ok(runs)
}

pub fn load_manifest(output_dir: &Path, run_id: &RunId) -> Result<RunManifest, RegressionError> {
    read_json(&run_dir(output_dir, run_id).join(MANIFEST_FILE), run_id)
}

pub fn load_snapshot(output_dir: &Path, run_id: &RunId) -> Result<Scorecard, RegressionError> {
    if !run_id.is_path_safe() {
        return Err(RegressionError::RunNotFound(run_id.clone()));
    }
    let path = run_dir(output_dir, run_id).join(SCORECARD_FILE);
    match Scorecard::load_json(&path) {
        Ok(card) => Ok(card),
        Err(ScorecardError::Io(e)) if e.kind() == ErrorKind::NotFound => {
            Err(RegressionError::RunNotFound(run_id.clone()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Delete the oldest run directories so at most `max_history` remain.
/// `keep` is never deleted. Zero disables pruning. Returns removed ids.
pub fn prune_runs(
    output_dir: &Path,
    max_history: usize,
    keep: &RunId,
) -> Result<Vec<RunId>, RegressionError> {
    if max_history == 0 {
        return Ok(Vec::new());
    }
    let runs = list_runs(output_dir)?;
    let excess = runs.len().saturating_sub(max_history);
    let mut removed = Vec::new();
    for run_id in runs.into_iter().filter(|id| id != keep).take(excess) {
        std::fs::remove_dir_all(run_dir(output_dir, &run_id))?;
        removed.push(run_id);
    }
    if !removed.is_empty() {
        info!(removed = removed.len(), max_history, "pruned old runs");
    }
    Ok(removed)
}

fn runs_root(output_dir: &Path) -> PathBuf {
    output_dir.join(RUNS_DIR)
}

fn run_dir(output_dir: &Path, run_id: &RunId) -> PathBuf {
    runs_root(output_dir).join(run_id.as_str())
}

fn write_pointer(output_dir: &Path, pointer: Pointer, run_id: &RunId) -> Result<(), RegressionError> {
    let record = PointerRecord {
        run_id: run_id.clone(),
    };
    write_json(&runs_root(output_dir).join(pointer.file_name()), &record)?;
    debug!(pointer = ?pointer, run_id = %run_id, "updated pointer");
    Ok(())
}

/// Pretty JSON, written to a sibling temp file first and renamed into
/// place so readers never see a partial document.
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), RegressionError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path, run_id: &RunId) -> Result<T, RegressionError> {
    if !run_id.is_path_safe() {
        return Err(RegressionError::RunNotFound(run_id.clone()));
    }
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(RegressionError::RunNotFound(run_id.clone()))
        }
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_str(&contents)?)
}
