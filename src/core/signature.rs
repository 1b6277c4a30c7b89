/// Scene signatures: coarse keyword classification of outline scenes.
///
/// Each tag family is an ordered table of (label, keywords). The label
/// with the most keyword hits wins; ties and zero hits give `Mixed`.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::schema::narrative_fn::{EmotionalMode, InteractionType, NarrativeFunction, SceneTag};
use crate::schema::outline::Scene;

const FUNCTION_TABLE: &[(NarrativeFunction, &[&str])] = &[
    (
        NarrativeFunction::Reveal,
        &[
            "reveal", "reveals", "revealed", "discover", "discovers", "learns", "truth", "secret",
            "confess", "confesses", "uncovers", "exposes", "realizes", "finds out", "evidence",
            "identity",
        ],
    ),
    (
        NarrativeFunction::Bond,
        &[
            "bond", "bonds", "trust", "friendship", "comfort", "comforts", "connect", "connects",
            "together", "shares", "alliance", "reconcile", "reconciles", "closer",
        ],
    ),
    (
        NarrativeFunction::Conflict,
        &[
            "confront", "confronts", "argue", "argues", "fight", "fights", "clash", "clashes",
            "attack", "attacks", "betray", "betrays", "accuse", "accuses", "oppose", "opposes",
            "threatens", "battle",
        ],
    ),
    (
        NarrativeFunction::Decision,
        &[
            "decide", "decides", "decision", "choose", "chooses", "choice", "commit", "commits",
            "vow", "vows", "agrees", "refuses", "resolves to",
        ],
    ),
    (
        NarrativeFunction::Aftermath,
        &[
            "aftermath", "mourn", "mourns", "grieve", "grieves", "recover", "recovers",
            "wake of", "consequences", "bury", "buries", "funeral", "heal", "heals", "regroup",
        ],
    ),
    (
        NarrativeFunction::Pursuit,
        &[
            "chase", "chases", "pursue", "pursues", "flee", "flees", "escape", "escapes", "hunt",
            "hunts", "race", "races", "track", "tracks", "follow", "follows",
        ],
    ),
];

const EMOTION_TABLE: &[(EmotionalMode, &[&str])] = &[
    (
        EmotionalMode::Fear,
        &[
            "fear", "afraid", "terror", "terrified", "dread", "panic", "anxious", "anxiety",
            "scared", "horror",
        ],
    ),
    (
        EmotionalMode::Grief,
        &[
            "grief", "grieving", "sorrow", "loss", "mourning", "despair", "sadness", "sad",
            "heartbreak", "numb",
        ],
    ),
    (
        EmotionalMode::Hope,
        &["hope", "hopeful", "relief", "optimism", "joy", "elation", "wonder", "uplift"],
    ),
    (
        EmotionalMode::Anger,
        &[
            "anger", "angry", "rage", "fury", "furious", "resentment", "bitter", "bitterness",
            "outrage", "frustration",
        ],
    ),
    (
        EmotionalMode::Tenderness,
        &[
            "tender", "tenderness", "love", "warmth", "affection", "intimacy", "gentle", "longing",
        ],
    ),
    (
        EmotionalMode::Resolve,
        &[
            "resolve", "determination", "determined", "courage", "conviction", "defiance",
            "defiant", "grim", "steeled",
        ],
    ),
];

const INTERACTION_TABLE: &[(InteractionType, &[&str])] = &[
    (
        InteractionType::Confrontation,
        &[
            "confront", "confronts", "argue", "argues", "accuse", "accuses", "fight", "fights",
            "interrogate", "interrogates", "standoff", "clash", "demands",
        ],
    ),
    (
        InteractionType::Intimacy,
        &["kiss", "kisses", "embrace", "embraces", "intimate", "lovers", "bed", "caress"],
    ),
    (
        InteractionType::Discovery,
        &[
            "discover", "discovers", "find", "finds", "search", "searches", "investigate",
            "investigates", "uncover", "uncovers", "explore", "explores", "examines", "clue",
        ],
    ),
    (
        InteractionType::Planning,
        &[
            "plan", "plans", "plot", "plots", "strategy", "prepare", "prepares", "scheme",
            "schemes", "briefing", "map out",
        ],
    ),
    (
        InteractionType::Bonding,
        &[
            "bond", "bonds", "shares", "laugh", "laughs", "trust", "friendship", "comfort",
            "comforts", "confide", "confides",
        ],
    ),
    (
        InteractionType::Escape,
        &[
            "escape", "escapes", "flee", "flees", "run", "runs", "chase", "chased", "evade",
            "evades", "hide", "hides", "break out",
        ],
    ),
    (
        InteractionType::Reflection,
        &[
            "reflect", "reflects", "remember", "remembers", "alone", "contemplate",
            "contemplates", "journal", "memory", "memories",
        ],
    ),
    (
        InteractionType::Social,
        &[
            "party", "dinner", "gathering", "meeting", "celebration", "crowd", "negotiate",
            "negotiates", "council", "banquet", "market",
        ],
    ),
];

/// Words dropped when normalizing a location.
const LOCATION_STOPWORDS: &[&str] = &[
    "a", "aboard", "an", "at", "behind", "beneath", "by", "from", "in", "inside", "into", "near",
    "of", "on", "onto", "outside", "the", "to", "under", "within",
];

/// Categorical summary of what a scene does, used only for comparing
/// scenes with each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneSignature {
    pub function: NarrativeFunction,
    pub emotional_mode: EmotionalMode,
    /// Normalized location; empty when the outline gives none.
    pub location: String,
    /// Lowercase first names of everyone on stage.
    pub participants: BTreeSet<String>,
    pub interaction_type: InteractionType,
    pub has_plot_delta: bool,
}

/// The signature fields compared by [`similarity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureField {
    Function,
    EmotionalMode,
    Location,
    Participants,
    InteractionType,
}

impl SignatureField {
    pub const ALL: [SignatureField; 5] = [
        Self::Function,
        Self::EmotionalMode,
        Self::Location,
        Self::Participants,
        Self::InteractionType,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::EmotionalMode => "emotional_mode",
            Self::Location => "location",
            Self::Participants => "participants",
            Self::InteractionType => "interaction_type",
        }
    }
}

impl SceneSignature {
    /// `Some(equal)` if both sides carry a usable value for `field`,
    /// `None` if either side is mixed or empty.
    pub fn compare_field(&self, other: &SceneSignature, field: SignatureField) -> Option<bool> {
        match field {
            SignatureField::Function => compare_tag(self.function, other.function),
            SignatureField::EmotionalMode => compare_tag(self.emotional_mode, other.emotional_mode),
            SignatureField::InteractionType => {
                compare_tag(self.interaction_type, other.interaction_type)
            }
            SignatureField::Location => {
                if self.location.is_empty() || other.location.is_empty() {
                    None
                } else {
                    Some(self.location == other.location)
                }
            }
            SignatureField::Participants => {
                if self.participants.is_empty() || other.participants.is_empty() {
                    None
                } else {
                    Some(self.participants == other.participants)
                }
            }
        }
    }

    /// Fields that are comparable and equal on both sides.
    pub fn shared_fields(&self, other: &SceneSignature) -> Vec<SignatureField> {
        SignatureField::ALL
            .into_iter()
            .filter(|f| self.compare_field(other, *f) == Some(true))
            .collect()
    }
}

fn compare_tag<T: SceneTag>(a: T, b: T) -> Option<bool> {
    if a.is_mixed() || b.is_mixed() {
        None
    } else {
        Some(a == b)
    }
}

/// Classify one outline scene.
pub fn compute_scene_signature(scene: &Scene) -> SceneSignature {
    let plot_text = format!("{} {} {}", scene.purpose, scene.central_conflict, scene.outcome);
    let action_text = format!("{} {}", scene.purpose, scene.central_conflict);

    let mut participants = BTreeSet::new();
    for name in std::iter::once(&scene.pov).chain(scene.characters.iter()) {
        if let Some(first) = first_name(name) {
            participants.insert(first);
        }
    }

    SceneSignature {
        function: classify(&plot_text, FUNCTION_TABLE),
        emotional_mode: classify(&scene.emotional_arc, EMOTION_TABLE),
        location: normalize_location(&scene.location),
        participants,
        interaction_type: classify(&action_text, INTERACTION_TABLE),
        has_plot_delta: !scene.outcome.trim().is_empty(),
    }
}

/// Fraction of comparable fields that match. Fields where either side
/// is mixed or empty are left out; with nothing comparable the result
/// is 0.0.
pub fn similarity(a: &SceneSignature, b: &SceneSignature) -> f64 {
    let mut comparable = 0u32;
    let mut matching = 0u32;
    for field in SignatureField::ALL {
        if let Some(equal) = a.compare_field(b, field) {
            comparable += 1;
            if equal {
                matching += 1;
            }
        }
    }
    if comparable == 0 {
        0.0
    } else {
        f64::from(matching) / f64::from(comparable)
    }
}

/// Majority vote over keyword hits. Ties at the top and zero hits give
/// the family's `Mixed` label.
pub fn classify<T: SceneTag>(text: &str, table: &[(T, &[&str])]) -> T {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return T::MIXED;
    }

    let mut counts: FxHashMap<T, usize> = FxHashMap::default();
    for (label, keywords) in table {
        let hits: usize = keywords.iter().map(|kw| count_phrase(&tokens, kw)).sum();
        if hits > 0 {
            *counts.entry(*label).or_default() += hits;
        }
    }

    let best = counts.values().copied().max().unwrap_or(0);
    if best == 0 {
        return T::MIXED;
    }
    let mut leaders = counts.iter().filter(|(_, n)| **n == best).map(|(label, _)| *label);
    match (leaders.next(), leaders.next()) {
        (Some(label), None) => label,
        _ => T::MIXED,
    }
}

/// Lowercase, strip punctuation, drop articles and prepositions.
pub fn normalize_location(location: &str) -> String {
    tokenize(location)
        .into_iter()
        .filter(|w| !LOCATION_STOPWORDS.contains(&w.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_name(name: &str) -> Option<String> {
    tokenize(name).into_iter().next()
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\'').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

fn count_phrase(tokens: &[String], phrase: &str) -> usize {
    let words: Vec<&str> = phrase.split_whitespace().collect();
    if words.is_empty() || words.len() > tokens.len() {
        return 0;
    }
    tokens
        .windows(words.len())
        .filter(|window| window.iter().zip(&words).all(|(t, w)| t == w))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(purpose: &str, arc: &str, location: &str, pov: &str) -> Scene {
        Scene {
            purpose: purpose.to_string(),
            emotional_arc: arc.to_string(),
            location: location.to_string(),
            pov: pov.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn classifies_each_function() {
        let cases = [
            ("Elena discovers the truth about the secret logs", NarrativeFunction::Reveal),
            ("Elena and Mara share a meal and build trust", NarrativeFunction::Bond),
            ("Elena confronts Silas and they fight", NarrativeFunction::Conflict),
            ("Elena decides to stay and commits to the dive", NarrativeFunction::Decision),
            ("The crew mourns in the aftermath of the flood", NarrativeFunction::Aftermath),
            ("The Warden hunts Elena as she flees", NarrativeFunction::Pursuit),
        ];
        for (text, expected) in cases {
            assert_eq!(classify(text, FUNCTION_TABLE), expected, "{}", text);
        }
    }

    #[test]
    fn ties_and_silence_are_mixed() {
        assert_eq!(classify("", FUNCTION_TABLE), NarrativeFunction::Mixed);
        assert_eq!(classify("Elena eats soup", FUNCTION_TABLE), NarrativeFunction::Mixed);
        assert_eq!(
            classify("She discovers the log and confronts him", FUNCTION_TABLE),
            NarrativeFunction::Mixed
        );
    }

    #[test]
    fn multi_word_keywords() {
        assert_eq!(
            classify("In the wake of the flood", FUNCTION_TABLE),
            NarrativeFunction::Aftermath
        );
        assert_eq!(count_phrase(&tokenize("She finds out. Finds out again"), "finds out"), 2);
    }

    #[test]
    fn emotions_and_interactions() {
        assert_eq!(classify("dread building to panic", EMOTION_TABLE), EmotionalMode::Fear);
        assert_eq!(classify("quiet grief", EMOTION_TABLE), EmotionalMode::Grief);
        assert_eq!(
            classify("they plan the raid and prepare gear", INTERACTION_TABLE),
            InteractionType::Planning
        );
        assert_eq!(
            classify("a dinner party", INTERACTION_TABLE),
            InteractionType::Social
        );
    }

    #[test]
    fn location_normalization() {
        assert_eq!(normalize_location("In the Pump Room"), "pump room");
        assert_eq!(normalize_location("aboard the 'Marrow', near the airlock"), "marrow airlock");
        assert_eq!(normalize_location(""), "");
    }

    #[test]
    fn signature_fields() {
        let mut s = scene("Elena confronts Silas", "rising anger", "The Pump Room", "Elena Voss");
        s.characters = vec!["Silas Greer".to_string(), "elena".to_string()];
        s.outcome = "Silas storms off".to_string();
        let sig = compute_scene_signature(&s);
        assert_eq!(sig.function, NarrativeFunction::Conflict);
        assert_eq!(sig.emotional_mode, EmotionalMode::Anger);
        assert_eq!(sig.location, "pump room");
        assert_eq!(sig.interaction_type, InteractionType::Confrontation);
        assert_eq!(
            sig.participants.iter().cloned().collect::<Vec<_>>(),
            vec!["elena".to_string(), "silas".to_string()]
        );
        assert!(sig.has_plot_delta);
    }

    #[test]
    fn similarity_reflexive_and_symmetric() {
        let a = compute_scene_signature(&scene("Elena confronts Silas", "anger", "pump room", "Elena"));
        let b = compute_scene_signature(&scene("Mara discovers the log", "dread", "pump room", "Mara"));
        assert_eq!(similarity(&a, &a), 1.0);
        assert_eq!(similarity(&a, &b), similarity(&b, &a));
        assert!((similarity(&a, &b) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn mixed_never_matches() {
        let a = compute_scene_signature(&scene("Elena eats soup", "", "", ""));
        assert_eq!(similarity(&a, &a), 0.0);
        assert!(a.shared_fields(&a).is_empty());
    }

    #[test]
    fn only_participants_differ() {
        let a = compute_scene_signature(&scene("Elena confronts Silas", "anger", "galley", "Elena"));
        let b = compute_scene_signature(&scene("Mara confronts Jonah", "anger", "galley", "Mara"));
        assert_eq!(similarity(&a, &b), 0.8);
        assert_eq!(a.shared_fields(&b).len(), 4);
    }
}
