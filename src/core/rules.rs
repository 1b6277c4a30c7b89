/// Continuity rule tables: the word lists the continuity gate matches
/// against, loadable from RON so they can be maintained outside the code.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

/// Forbidden keywords that apply only when the world rules mention one
/// of the triggers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingRule {
    /// Lowercase phrases looked for in the configured world rules.
    pub triggers: Vec<String>,
    /// Phrases that contradict the rule when they appear in prose.
    pub forbidden: Vec<String>,
    pub description: String,
}

/// Phrases that signal the prose drifting outside the story design,
/// whatever the roster says.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftPattern {
    pub phrases: Vec<String>,
    pub description: String,
}

/// All word lists used by the continuity engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuityRules {
    /// Trimmed scenes shorter than this many characters are empty.
    #[serde(default = "default_min_scene_chars")]
    pub min_scene_chars: usize,
    /// Verbs that put a character physically on stage when the
    /// character is their subject.
    #[serde(default)]
    pub presence_verbs: Vec<String>,
    /// Sentence fragments that frame a mention as memory or flashback.
    #[serde(default)]
    pub memory_markers: Vec<String>,
    /// Verbs that follow a name when that character dies ("Silas dies").
    #[serde(default)]
    pub death_keywords: Vec<String>,
    /// Phrases that precede a name when that character dies
    /// ("the death of Silas").
    #[serde(default)]
    pub killing_phrases: Vec<String>,
    /// Nouns that follow a possessive name ("Silas's body").
    #[serde(default)]
    pub remains_nouns: Vec<String>,
    #[serde(default)]
    pub setting_rules: Vec<SettingRule>,
    #[serde(default)]
    pub drift_patterns: Vec<DriftPattern>,
}

/// Words allowed between a name and its death keyword
/// ("Silas finally dies", "Silas is slowly killed").
const DEATH_MODIFIERS: &str = r"\w+ly|is|was|finally|then|soon|later|eventually|also";

fn default_min_scene_chars() -> usize {
    20
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for ContinuityRules {
    fn default() -> Self {
        Self {
            min_scene_chars: default_min_scene_chars(),
            presence_verbs: strings(&[
                "walked", "walks", "said", "says", "nodded", "nods", "gasped", "gasps", "touched",
                "touches", "gripped", "grips", "grabbed", "grabs", "stood", "stands", "sat",
                "sits", "ran", "runs", "turned", "turns", "looked", "looks", "smiled", "smiles",
                "laughed", "laughs", "whispered", "whispers", "shouted", "shouts", "reached",
                "reaches", "stepped", "steps", "entered", "enters", "leaned", "leans",
                "shrugged", "shrugs", "frowned", "frowns", "grinned", "grins", "sighed", "sighs",
                "spoke", "speaks", "answered", "answers", "replied", "replies", "asked", "asks",
                "held", "holds", "pulled", "pulls", "pushed", "pushes", "knelt", "kneels",
                "climbed", "climbs", "hugged", "hugs", "kissed", "kisses", "glanced", "glances",
                "stared", "stares", "watched", "watches", "muttered", "mutters", "murmured",
                "murmurs", "yelled", "yells", "screamed", "screams", "coughed", "coughs",
                "blinked", "blinks", "swallowed", "waved", "waves", "pointed", "points",
                "squeezed", "squeezes", "handed", "hands", "arrived", "arrives", "appeared",
                "appears",
            ]),
            memory_markers: strings(&[
                "remembered",
                "remember",
                "recalled",
                "had said",
                "had told",
                "used to",
                "echoed in my memory",
                "echoed in her memory",
                "echoed in his memory",
                "memory of",
                "memories of",
                "dreamed",
                "dreamt",
                "once told",
                "before he died",
                "before she died",
                "before they died",
                "photograph",
                "recording of",
            ]),
            death_keywords: strings(&[
                "dies",
                "died",
                "is killed",
                "was killed",
                "gets killed",
                "is murdered",
                "was murdered",
                "perishes",
                "perished",
                "succumbs",
                "succumbed",
                "bleeds out",
                "does not survive",
            ]),
            killing_phrases: strings(&[
                "death of",
                "killing of",
                "murder of",
                "kills",
                "killed",
                "murders",
                "murdered",
                "executes",
                "executed",
                "body of",
                "corpse of",
            ]),
            remains_nouns: strings(&["death", "body", "corpse", "funeral"]),
            setting_rules: vec![
                SettingRule {
                    triggers: strings(&[
                        "no sunlight",
                        "no natural light",
                        "never sees the sun",
                        "underground",
                        "underwater",
                    ]),
                    forbidden: strings(&[
                        "sunlight",
                        "sunshine",
                        "blue sky",
                        "open sky",
                        "sunset",
                        "sunrise",
                    ]),
                    description: "no natural light reaches this setting".to_string(),
                },
                SettingRule {
                    triggers: strings(&["sealed compartment", "sealed hull", "airtight"]),
                    forbidden: strings(&[
                        "breeze",
                        "fresh air",
                        "open window",
                        "opened the window",
                    ]),
                    description: "compartments are sealed from the outside".to_string(),
                },
                SettingRule {
                    triggers: strings(&["no signal", "no outside contact", "no radio contact"]),
                    forbidden: strings(&["phone rang", "text message", "cell signal"]),
                    description: "there is no contact with the outside world".to_string(),
                },
            ],
            drift_patterns: vec![
                DriftPattern {
                    phrases: strings(&[
                        "wears her face like a stolen uniform",
                        "wears his face like a stolen uniform",
                        "wearing her face",
                        "wearing his face",
                        "her exact double",
                        "his exact double",
                        "a perfect copy of",
                        "clone of",
                        "doppelganger",
                    ]),
                    description: "unplanned double or clone character".to_string(),
                },
                DriftPattern {
                    phrases: strings(&["it was all a dream", "had all been a dream"]),
                    description: "dream reset erases established events".to_string(),
                },
            ],
        }
    }
}

impl ContinuityRules {
    /// Load rule tables from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<ContinuityRules, RulesError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse rule tables from a RON string. Omitted lists are empty, not
    /// defaulted, so a file fully replaces the built-in tables.
    pub fn parse_ron(input: &str) -> Result<ContinuityRules, RulesError> {
        Ok(ron::from_str(input)?)
    }

    pub(crate) fn compile(&self) -> Result<CompiledRules, RulesError> {
        let mut setting_rules = Vec::with_capacity(self.setting_rules.len());
        for rule in &self.setting_rules {
            let mut forbidden = Vec::with_capacity(rule.forbidden.len());
            for phrase in &rule.forbidden {
                forbidden.push((phrase.clone(), phrase_regex(phrase)?));
            }
            setting_rules.push(CompiledSettingRule {
                triggers: rule.triggers.iter().map(|t| t.to_lowercase()).collect(),
                forbidden,
                description: rule.description.clone(),
            });
        }

        let mut drift_patterns = Vec::new();
        for pattern in &self.drift_patterns {
            for phrase in &pattern.phrases {
                drift_patterns.push(CompiledPhrase {
                    phrase: phrase.clone(),
                    regex: phrase_regex(phrase)?,
                    description: pattern.description.clone(),
                });
            }
        }

        Ok(CompiledRules {
            min_scene_chars: self.min_scene_chars,
            memory_markers: self.memory_markers.iter().map(|m| m.to_lowercase()).collect(),
            setting_rules,
            drift_patterns,
        })
    }

    /// Regex matching any of `names` as the subject of a presence verb,
    /// with at most one `-ly` adverb in between.
    pub(crate) fn presence_regex(&self, names: &[&str]) -> Result<Option<Regex>, RulesError> {
        if names.is_empty() || self.presence_verbs.is_empty() {
            return Ok(None);
        }
        let pattern = format!(
            r"\b(?:{})\b(?:\s+\w+ly)?\s+(?:{})\b",
            alternation(names),
            alternation(self.presence_verbs.as_slice())
        );
        Ok(Some(case_insensitive(&pattern)?))
    }

    /// Regex matching a death of any of `names` in outline text. The name
    /// must be the subject of the death keyword or the object of a killing
    /// phrase; a name that merely stands nearby does not match.
    pub(crate) fn named_death_regex(&self, names: &[&str]) -> Result<Option<Regex>, RulesError> {
        if names.is_empty() {
            return Ok(None);
        }
        let names = alternation(names);
        let mut branches = Vec::new();
        if !self.death_keywords.is_empty() {
            branches.push(format!(
                r"\b(?:{names})\b(?:\s+(?:{DEATH_MODIFIERS})){{0,2}}\s+(?:{})\b",
                alternation(self.death_keywords.as_slice())
            ));
        }
        if !self.killing_phrases.is_empty() {
            branches.push(format!(
                r"\b(?:{})\s+(?:\w+\s+)?(?:{names})\b",
                alternation(self.killing_phrases.as_slice())
            ));
        }
        if !self.remains_nouns.is_empty() {
            branches.push(format!(
                r"\b(?:{names})'s\s+(?:{})\b",
                alternation(self.remains_nouns.as_slice())
            ));
        }
        if branches.is_empty() {
            return Ok(None);
        }
        Ok(Some(case_insensitive(&branches.join("|"))?))
    }

    /// Regex matching any death keyword at all, named or not.
    pub(crate) fn any_death_regex(&self) -> Result<Option<Regex>, RulesError> {
        let words: Vec<&String> = self
            .death_keywords
            .iter()
            .chain(self.killing_phrases.iter())
            .collect();
        if words.is_empty() {
            return Ok(None);
        }
        let pattern = format!(r"\b(?:{})\b", alternation(words.as_slice()));
        Ok(Some(case_insensitive(&pattern)?))
    }
}

/// Rule tables in matchable form. Built once per continuity state.
#[derive(Debug, Clone)]
pub(crate) struct CompiledRules {
    pub min_scene_chars: usize,
    pub memory_markers: Vec<String>,
    pub setting_rules: Vec<CompiledSettingRule>,
    pub drift_patterns: Vec<CompiledPhrase>,
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledSettingRule {
    pub triggers: Vec<String>,
    pub forbidden: Vec<(String, Regex)>,
    pub description: String,
}

impl CompiledSettingRule {
    pub fn applies_to(&self, world_rules_lower: &str) -> bool {
        self.triggers.iter().any(|t| world_rules_lower.contains(t.as_str()))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledPhrase {
    pub phrase: String,
    pub regex: Regex,
    pub description: String,
}

impl Default for CompiledRules {
    fn default() -> Self {
        Self {
            min_scene_chars: default_min_scene_chars(),
            memory_markers: Vec::new(),
            setting_rules: Vec::new(),
            drift_patterns: Vec::new(),
        }
    }
}

impl CompiledRules {
    /// True if the sentence frames its content as memory or flashback.
    pub fn is_memory_framed(&self, sentence: &str) -> bool {
        let lower = sentence.to_lowercase();
        self.memory_markers.iter().any(|m| lower.contains(m.as_str()))
    }
}

fn alternation<S: AsRef<str>>(items: &[S]) -> String {
    let mut escaped: Vec<String> = items
        .iter()
        .map(|s| s.as_ref().trim())
        .filter(|s| !s.is_empty())
        .map(|s| regex::escape(s).replace(' ', r"\s+"))
        .collect();
    // Longest first so "Silas Greer" wins over "Silas".
    escaped.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    escaped.dedup();
    escaped.join("|")
}

fn phrase_regex(phrase: &str) -> Result<Regex, RulesError> {
    case_insensitive(&format!(r"\b{}\b", alternation(&[phrase])))
}

fn case_insensitive(pattern: &str) -> Result<Regex, RulesError> {
    Ok(RegexBuilder::new(pattern).case_insensitive(true).build()?)
}
