use serde::{Deserialize, Serialize};
use std::path::Path;

use super::entity::{Character, Role, Roster};
use super::outline::OutlineError;

/// Capitalized words that start sentences or titles rather than names.
const NON_NAMES: &[&str] = &[
    "A", "An", "And", "As", "At", "But", "By", "For", "From", "He", "Her", "His", "I", "In", "It",
    "Its", "Of", "On", "Or", "She", "The", "Their", "They", "This", "To", "Who", "With",
];

/// Honorifics dropped from the front of a name.
const TITLES: &[&str] = &[
    "Captain", "Commander", "Doctor", "Dr", "Lady", "Lord", "Miss", "Mr", "Mrs", "Ms", "Professor",
    "Sir",
];

/// The story-level configuration the continuity engine reads.
///
/// Character fields are free text ("Elena Voss, a salvage diver"); names
/// are pulled out of them by [`extract_names`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoryConfig {
    #[serde(default)]
    pub protagonist: String,
    #[serde(default)]
    pub antagonist: String,
    #[serde(default)]
    pub other_characters: String,
    /// Free-text world rules, e.g. "No sunlight reaches the hab."
    #[serde(default)]
    pub world_rules: String,
}

impl StoryConfig {
    pub fn load_from_ron(path: &Path) -> Result<StoryConfig, OutlineError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<StoryConfig, OutlineError> {
        Ok(ron::from_str(input)?)
    }

    /// Build the roster: the first name found in the protagonist and
    /// antagonist fields, then every name in the supporting text.
    pub fn roster(&self) -> Roster {
        let mut characters = Vec::new();
        if let Some(name) = extract_names(&self.protagonist).into_iter().next() {
            characters.push(Character::new(name, Role::Protagonist));
        }
        if let Some(name) = extract_names(&self.antagonist).into_iter().next() {
            characters.push(Character::new(name, Role::Antagonist));
        }
        for name in extract_names(&self.other_characters) {
            characters.push(Character::new(name, Role::Supporting));
        }
        Roster::new(characters)
    }
}

/// Pull runs of capitalized words out of free text.
///
/// A run ends at any word that is not capitalized or at punctuation
/// other than an apostrophe or hyphen. Leading titles and common
/// sentence-initial words are dropped.
pub fn extract_names(text: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut run: Vec<&str> = Vec::new();

    for raw in text.split_whitespace() {
        let word = raw.trim_start_matches(|c: char| !c.is_alphanumeric());
        let core = word.trim_end_matches(|c: char| !c.is_alphanumeric());
        let breaks_after = core.len() != word.len();

        if is_name_word(core) {
            if !(run.is_empty() && is_title(core)) {
                run.push(core);
            }
        } else {
            flush(&mut run, &mut names);
        }
        if breaks_after {
            flush(&mut run, &mut names);
        }
    }
    flush(&mut run, &mut names);
    names
}

fn is_name_word(word: &str) -> bool {
    let mut chars = word.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_uppercase() && word.chars().all(|c| c.is_alphabetic() || c == '\'' || c == '-')
}

fn is_title(word: &str) -> bool {
    TITLES.contains(&word)
}

fn flush(run: &mut Vec<&str>, names: &mut Vec<String>) {
    while run.first().is_some_and(|w| NON_NAMES.contains(w)) {
        run.remove(0);
    }
    if !run.is_empty() {
        let name = run.join(" ");
        if !names.contains(&name) {
            names.push(name);
        }
    }
    run.clear();
}
