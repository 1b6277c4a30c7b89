/// Outline diversity validation: catches repeated beats and monotone
/// stretches in a scene plan before any prose is drafted.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::signature::{compute_scene_signature, similarity, SceneSignature, SignatureField};
use crate::schema::narrative_fn::{EmotionalMode, NarrativeFunction, SceneTag};
use crate::schema::outline::{Outline, SceneId};

/// Outlines shorter than this always pass.
const MIN_SCENES: usize = 3;
/// Location clustering fires above max(this, share of all scenes).
const LOCATION_FLOOR: f64 = 5.0;
const LOCATION_SHARE: f64 = 0.25;

/// Thresholds for [`validate_outline_diversity`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiversityConfig {
    /// How many preceding scenes the window check looks back over.
    pub window: usize,
    pub adjacent_threshold: f64,
    pub window_threshold: f64,
    pub max_same_function_ratio: f64,
    pub max_same_emotion_ratio: f64,
}

impl Default for DiversityConfig {
    fn default() -> Self {
        Self {
            window: 5,
            adjacent_threshold: 0.80,
            window_threshold: 0.70,
            max_same_function_ratio: 0.45,
            max_same_emotion_ratio: 0.45,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    AdjacentDuplicate,
    WindowDuplicate,
    FunctionMonotony,
    EmotionalMonotony,
    LocationClustering,
}

/// One diversity finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub severity: Severity,
    /// The scene pair for duplicates; every affected scene otherwise.
    pub scenes: Vec<SceneId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    pub message: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiversityReport {
    /// True when no high-severity violation was found.
    pub pass: bool,
    pub scene_count: usize,
    pub violations: Vec<Violation>,
    pub signatures: Vec<(SceneId, SceneSignature)>,
}

impl DiversityReport {
    pub fn count(&self, severity: Severity) -> usize {
        self.violations.iter().filter(|v| v.severity == severity).count()
    }

    pub fn of_kind(&self, kind: ViolationKind) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(move |v| v.kind == kind)
    }
}

/// Run all five diversity checks over the outline.
pub fn validate_outline_diversity(outline: &Outline, config: &DiversityConfig) -> DiversityReport {
    let signatures: Vec<(SceneId, SceneSignature)> = outline
        .ordered_scenes()
        .into_iter()
        .map(|(id, scene)| (id, compute_scene_signature(scene)))
        .collect();

    if signatures.len() < MIN_SCENES {
        debug!(scenes = signatures.len(), "too few scenes for diversity checks");
        return DiversityReport {
            pass: true,
            scene_count: signatures.len(),
            violations: Vec::new(),
            signatures,
        };
    }

    let usage = Usage::tally(&signatures);
    let mut violations = Vec::new();
    check_adjacent(&signatures, config, &usage, &mut violations);
    check_window(&signatures, config, &usage, &mut violations);
    check_tag_monotony(
        &signatures,
        |s| s.function,
        &usage.functions,
        config.max_same_function_ratio,
        ViolationKind::FunctionMonotony,
        Severity::High,
        &mut violations,
    );
    check_tag_monotony(
        &signatures,
        |s| s.emotional_mode,
        &usage.emotions,
        config.max_same_emotion_ratio,
        ViolationKind::EmotionalMonotony,
        Severity::Medium,
        &mut violations,
    );
    check_locations(&signatures, &mut violations);

    for v in &violations {
        debug!(kind = ?v.kind, severity = ?v.severity, scenes = ?v.scenes, "diversity violation");
    }
    let pass = !violations.iter().any(|v| v.severity == Severity::High);
    info!(
        scenes = signatures.len(),
        violations = violations.len(),
        pass,
        "outline diversity validated"
    );

    DiversityReport {
        pass,
        scene_count: signatures.len(),
        violations,
        signatures,
    }
}

/// How often each label is used across the outline, for picking the
/// least-used alternatives in suggestions.
struct Usage {
    functions: FxHashMap<NarrativeFunction, usize>,
    emotions: FxHashMap<EmotionalMode, usize>,
}

impl Usage {
    fn tally(signatures: &[(SceneId, SceneSignature)]) -> Self {
        let mut functions = FxHashMap::default();
        let mut emotions = FxHashMap::default();
        for (_, sig) in signatures {
            *functions.entry(sig.function).or_default() += 1;
            *emotions.entry(sig.emotional_mode).or_default() += 1;
        }
        Self { functions, emotions }
    }
}

/// Up to `limit` labels other than `current`, least used first.
fn least_used<T: SceneTag>(current: T, counts: &FxHashMap<T, usize>, limit: usize) -> Vec<T> {
    let mut alternatives = current.alternatives();
    alternatives.sort_by_key(|label| counts.get(label).copied().unwrap_or(0));
    alternatives.truncate(limit);
    alternatives
}

fn join_labels<T: SceneTag>(labels: &[T]) -> String {
    let names: Vec<&str> = labels.iter().map(|l| l.label()).collect();
    match names.as_slice() {
        [] => String::new(),
        [one] => one.to_string(),
        [init @ .., last] => format!("{} or {}", init.join(", "), last),
    }
}

fn duplicate_suggestion(
    earlier: SceneId,
    later: SceneId,
    a: &SceneSignature,
    b: &SceneSignature,
    usage: &Usage,
) -> String {
    let shared = a.shared_fields(b);
    let names: Vec<&str> = shared.iter().map(|f| f.name()).collect();
    let remedy = if shared.contains(&SignatureField::Function) {
        format!(
            "recast {} as a {} scene",
            later,
            join_labels(&least_used(b.function, &usage.functions, 2))
        )
    } else if shared.contains(&SignatureField::EmotionalMode) {
        format!(
            "shift the emotional mode of {} toward {}",
            later,
            join_labels(&least_used(b.emotional_mode, &usage.emotions, 2))
        )
    } else if shared.contains(&SignatureField::InteractionType) {
        format!(
            "change how the characters in {} engage, e.g. {}",
            later,
            join_labels(&b.interaction_type.alternatives()[..2])
        )
    } else if shared.contains(&SignatureField::Location) {
        format!("move {} to a different location", later)
    } else {
        format!("change who is on stage in {}", later)
    };
    format!("{} and {} share {}; {}.", earlier, later, names.join(", "), remedy)
}

fn check_adjacent(
    signatures: &[(SceneId, SceneSignature)],
    config: &DiversityConfig,
    usage: &Usage,
    out: &mut Vec<Violation>,
) {
    for pair in signatures.windows(2) {
        let (prev_id, prev) = &pair[0];
        let (cur_id, cur) = &pair[1];
        let sim = similarity(prev, cur);
        if sim >= config.adjacent_threshold {
            out.push(Violation {
                kind: ViolationKind::AdjacentDuplicate,
                severity: Severity::High,
                scenes: vec![*prev_id, *cur_id],
                similarity: Some(sim),
                message: format!(
                    "Consecutive scenes {} and {} are {:.0}% similar.",
                    prev_id,
                    cur_id,
                    sim * 100.0
                ),
                suggestion: duplicate_suggestion(*prev_id, *cur_id, prev, cur, usage),
            });
        }
    }
}

fn check_window(
    signatures: &[(SceneId, SceneSignature)],
    config: &DiversityConfig,
    usage: &Usage,
    out: &mut Vec<Violation>,
) {
    for i in 2..signatures.len() {
        let (cur_id, cur) = &signatures[i];
        let start = i.saturating_sub(config.window).min(i - 1);
        for (earlier_id, earlier) in &signatures[start..i - 1] {
            let sim = similarity(earlier, cur);
            if sim >= config.window_threshold {
                out.push(Violation {
                    kind: ViolationKind::WindowDuplicate,
                    severity: Severity::Medium,
                    scenes: vec![*earlier_id, *cur_id],
                    similarity: Some(sim),
                    message: format!(
                        "{} repeats the beat of {} ({:.0}% similar) within {} scenes.",
                        cur_id,
                        earlier_id,
                        sim * 100.0,
                        config.window
                    ),
                    suggestion: duplicate_suggestion(*earlier_id, *cur_id, earlier, cur, usage),
                });
            }
        }
    }
}

fn check_tag_monotony<T: SceneTag>(
    signatures: &[(SceneId, SceneSignature)],
    tag_of: impl Fn(&SceneSignature) -> T,
    counts: &FxHashMap<T, usize>,
    max_ratio: f64,
    kind: ViolationKind,
    severity: Severity,
    out: &mut Vec<Violation>,
) {
    let classified: usize = counts
        .iter()
        .filter(|(label, _)| !label.is_mixed())
        .map(|(_, n)| *n)
        .sum();
    if classified == 0 {
        return;
    }
    let family = match kind {
        ViolationKind::FunctionMonotony => "function",
        _ => "emotional mode",
    };

    for label in T::LABELS {
        let count = counts.get(label).copied().unwrap_or(0);
        let ratio = count as f64 / classified as f64;
        if ratio <= max_ratio {
            continue;
        }
        let scenes: Vec<SceneId> = signatures
            .iter()
            .filter(|(_, s)| tag_of(s) == *label)
            .map(|(id, _)| *id)
            .collect();
        out.push(Violation {
            kind,
            severity,
            scenes,
            similarity: None,
            message: format!(
                "{} is the {} of {} of {} classified scenes ({:.0}%, limit {:.0}%).",
                label.label(),
                family,
                count,
                classified,
                ratio * 100.0,
                max_ratio * 100.0
            ),
            suggestion: format!(
                "Rework some {} scenes toward {}.",
                label.label(),
                join_labels(&least_used(*label, counts, 3))
            ),
        });
    }
}

fn check_locations(signatures: &[(SceneId, SceneSignature)], out: &mut Vec<Violation>) {
    let limit = LOCATION_FLOOR.max(LOCATION_SHARE * signatures.len() as f64);
    let mut by_location: Vec<(&str, Vec<SceneId>)> = Vec::new();
    for (id, sig) in signatures {
        if sig.location.is_empty() {
            continue;
        }
        match by_location.iter_mut().find(|(loc, _)| *loc == sig.location) {
            Some((_, ids)) => ids.push(*id),
            None => by_location.push((sig.location.as_str(), vec![*id])),
        }
    }

    for (location, scenes) in by_location {
        if scenes.len() as f64 > limit {
            out.push(Violation {
                kind: ViolationKind::LocationClustering,
                severity: Severity::Low,
                message: format!(
                    "{} scenes take place in \"{}\" (limit {:.0}).",
                    scenes.len(),
                    location,
                    limit.floor()
                ),
                suggestion: format!(
                    "Move some scenes out of \"{}\" to widen the story's geography.",
                    location
                ),
                scenes,
                similarity: None,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::outline::{Chapter, Scene};

    fn scene(purpose: &str, arc: &str, location: &str, pov: &str) -> Scene {
        Scene {
            purpose: purpose.to_string(),
            emotional_arc: arc.to_string(),
            location: location.to_string(),
            pov: pov.to_string(),
            ..Default::default()
        }
    }

    fn outline(scenes: Vec<Scene>) -> Outline {
        Outline {
            title: String::new(),
            chapters: vec![Chapter {
                number: Some(1),
                title: String::new(),
                scenes,
            }],
        }
    }

    fn varied() -> Vec<Scene> {
        vec![
            scene("Elena discovers the sabotaged valve", "dread", "pump room", "Elena"),
            scene("Elena and Mara share a drink and build trust", "warmth", "galley", "Mara"),
            scene("Elena confronts Silas about the valve", "anger", "engineering", "Elena"),
            scene("Mara decides to seal the lower deck", "resolve", "bridge", "Mara"),
            scene("The Warden hunts Elena through the vents", "terror", "ventilation shaft", "Elena"),
        ]
    }

    #[test]
    fn too_few_scenes_pass() {
        let o = outline(vec![
            scene("Elena confronts Silas", "anger", "galley", "Elena"),
            scene("Mara confronts Jonah", "anger", "galley", "Mara"),
        ]);
        let report = validate_outline_diversity(&o, &DiversityConfig::default());
        assert!(report.pass);
        assert!(report.violations.is_empty());
        assert_eq!(report.scene_count, 2);
    }

    #[test]
    fn varied_outline_passes_clean() {
        let report = validate_outline_diversity(&outline(varied()), &DiversityConfig::default());
        assert!(report.pass);
        assert!(report.violations.is_empty(), "{:?}", report.violations);
    }

    #[test]
    fn adjacent_duplicate_detected() {
        let mut scenes = varied();
        scenes.insert(3, scene("Mara confronts Jonah about the valve", "anger", "engineering", "Mara"));
        let report = validate_outline_diversity(&outline(scenes), &DiversityConfig::default());
        let dupes: Vec<_> = report.of_kind(ViolationKind::AdjacentDuplicate).collect();
        assert_eq!(dupes.len(), 1);
        assert_eq!(dupes[0].scenes, vec![SceneId::new(1, 3), SceneId::new(1, 4)]);
        assert_eq!(dupes[0].similarity, Some(0.8));
        assert!(dupes[0].suggestion.contains("function"));
        assert!(dupes[0].suggestion.starts_with("ch01_s03 and ch01_s04 share"));
        assert!(!report.pass);
    }

    #[test]
    fn window_duplicate_detected() {
        let mut scenes = varied();
        scenes.push(scene("Mara confronts Jonah about the valve", "anger", "engineering", "Mara"));
        let report = validate_outline_diversity(&outline(scenes), &DiversityConfig::default());
        let window: Vec<_> = report.of_kind(ViolationKind::WindowDuplicate).collect();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].scenes, vec![SceneId::new(1, 3), SceneId::new(1, 6)]);
        assert_eq!(window[0].severity, Severity::Medium);
        assert!(report.pass);
    }

    #[test]
    fn window_respects_size() {
        let mut scenes = varied();
        scenes.push(scene("Mara confronts Jonah about the valve", "anger", "engineering", "Mara"));
        let config = DiversityConfig {
            window: 2,
            ..Default::default()
        };
        let report = validate_outline_diversity(&outline(scenes), &config);
        assert_eq!(report.of_kind(ViolationKind::WindowDuplicate).count(), 0);
    }

    #[test]
    fn function_monotony_detected() {
        let locations = ["galley", "bridge", "airlock", "hangar", "vault"];
        let mut scenes = Vec::new();
        for (i, loc) in locations.iter().enumerate() {
            let pov = if i % 2 == 0 { "Elena" } else { "Mara" };
            scenes.push(scene("A confrontation where they fight", "", loc, pov));
        }
        scenes[4] = scene("Elena discovers the log", "", "vault", "Elena");
        let report = validate_outline_diversity(&outline(scenes), &DiversityConfig::default());
        let mono: Vec<_> = report.of_kind(ViolationKind::FunctionMonotony).collect();
        assert_eq!(mono.len(), 1);
        assert_eq!(mono[0].scenes.len(), 4);
        assert!(mono[0].message.starts_with("CONFLICT"));
        assert!(!report.pass);
    }

    #[test]
    fn emotional_monotony_is_medium() {
        let scenes = vec![
            scene("Elena discovers the log", "grief", "galley", "Elena"),
            scene("Mara confronts Silas", "grief and sorrow", "bridge", "Mara"),
            scene("Jonah decides to leave", "grief", "hangar", "Jonah"),
            scene("Silas flees", "hope", "vault", "Silas"),
        ];
        let report = validate_outline_diversity(&outline(scenes), &DiversityConfig::default());
        let mono: Vec<_> = report.of_kind(ViolationKind::EmotionalMonotony).collect();
        assert_eq!(mono.len(), 1);
        assert_eq!(mono[0].severity, Severity::Medium);
        assert!(mono[0].suggestion.contains("Rework some GRIEF scenes"));
        assert!(report.pass);
    }

    #[test]
    fn location_clustering_is_low() {
        let purposes = [
            "Elena discovers the log",
            "Mara and Elena share a drink and build trust",
            "Silas confronts Jonah",
            "Jonah decides to stay",
            "The crew mourns in the aftermath",
            "The Warden hunts Mara",
        ];
        let scenes: Vec<Scene> = purposes
            .iter()
            .map(|p| scene(p, "", "The Galley", ""))
            .collect();
        let report = validate_outline_diversity(&outline(scenes), &DiversityConfig::default());
        let clusters: Vec<_> = report.of_kind(ViolationKind::LocationClustering).collect();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].scenes.len(), 6);
        assert_eq!(clusters[0].severity, Severity::Low);
    }

    #[test]
    fn join_labels_formats() {
        assert_eq!(join_labels::<NarrativeFunction>(&[]), "");
        assert_eq!(join_labels(&[NarrativeFunction::Bond]), "BOND");
        assert_eq!(
            join_labels(&[NarrativeFunction::Bond, NarrativeFunction::Reveal, NarrativeFunction::Pursuit]),
            "BOND, REVEAL or PURSUIT"
        );
    }
}
