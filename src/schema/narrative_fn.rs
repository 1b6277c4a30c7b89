use serde::{Deserialize, Serialize};

/// A categorical tag assigned to a scene by keyword classification.
///
/// Every tag family has a `Mixed` fallback for scenes where no single
/// label dominates. `Mixed` never counts as a match when comparing scenes.
pub trait SceneTag: Copy + Eq + std::hash::Hash + std::fmt::Debug + 'static {
    /// The concrete labels of this family, in classification order.
    /// `Mixed` is not included.
    const LABELS: &'static [Self];
    /// The fallback label.
    const MIXED: Self;

    /// Display label, matching the serialized form.
    fn label(&self) -> &'static str;

    fn is_mixed(&self) -> bool {
        *self == Self::MIXED
    }

    /// Labels of this family other than `self`, in classification order.
    fn alternatives(&self) -> Vec<Self> {
        Self::LABELS.iter().copied().filter(|l| l != self).collect()
    }
}

/// The narrative job a scene performs.
///
/// This is the most important tag for diversity checks: two scenes with
/// the same function back to back usually read as the same beat twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NarrativeFunction {
    Reveal,
    Bond,
    Conflict,
    Decision,
    Aftermath,
    Pursuit,
    Mixed,
}

impl SceneTag for NarrativeFunction {
    const LABELS: &'static [Self] = &[
        Self::Reveal,
        Self::Bond,
        Self::Conflict,
        Self::Decision,
        Self::Aftermath,
        Self::Pursuit,
    ];
    const MIXED: Self = Self::Mixed;

    fn label(&self) -> &'static str {
        match self {
            Self::Reveal => "REVEAL",
            Self::Bond => "BOND",
            Self::Conflict => "CONFLICT",
            Self::Decision => "DECISION",
            Self::Aftermath => "AFTERMATH",
            Self::Pursuit => "PURSUIT",
            Self::Mixed => "MIXED",
        }
    }
}

/// The dominant emotional register of a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmotionalMode {
    Fear,
    Grief,
    Hope,
    Anger,
    Tenderness,
    Resolve,
    Mixed,
}

impl SceneTag for EmotionalMode {
    const LABELS: &'static [Self] = &[
        Self::Fear,
        Self::Grief,
        Self::Hope,
        Self::Anger,
        Self::Tenderness,
        Self::Resolve,
    ];
    const MIXED: Self = Self::Mixed;

    fn label(&self) -> &'static str {
        match self {
            Self::Fear => "FEAR",
            Self::Grief => "GRIEF",
            Self::Hope => "HOPE",
            Self::Anger => "ANGER",
            Self::Tenderness => "TENDERNESS",
            Self::Resolve => "RESOLVE",
            Self::Mixed => "MIXED",
        }
    }
}

/// How the characters in a scene engage with each other or the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionType {
    Confrontation,
    Intimacy,
    Discovery,
    Planning,
    Bonding,
    Escape,
    Reflection,
    Social,
    Mixed,
}

impl SceneTag for InteractionType {
    const LABELS: &'static [Self] = &[
        Self::Confrontation,
        Self::Intimacy,
        Self::Discovery,
        Self::Planning,
        Self::Bonding,
        Self::Escape,
        Self::Reflection,
        Self::Social,
    ];
    const MIXED: Self = Self::Mixed;

    fn label(&self) -> &'static str {
        match self {
            Self::Confrontation => "confrontation",
            Self::Intimacy => "intimacy",
            Self::Discovery => "discovery",
            Self::Planning => "planning",
            Self::Bonding => "bonding",
            Self::Escape => "escape",
            Self::Reflection => "reflection",
            Self::Social => "social",
            Self::Mixed => "mixed",
        }
    }
}
