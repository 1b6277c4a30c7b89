use serde::{Deserialize, Serialize};

use super::outline::SceneId;

/// Why a character is on the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Protagonist,
    Antagonist,
    Supporting,
}

/// Lifecycle of a roster entity at a given point in the story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lifecycle {
    Alive,
    /// Dead, with the scene that caused the death.
    Dead { scene: SceneId },
}

/// A named story entity tracked for lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    pub role: Role,
    /// Scene in which the character dies, if the outline kills them.
    pub death: Option<SceneId>,
}

impl Character {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
            death: None,
        }
    }

    /// First whitespace-separated token of the name.
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }

    /// True if `mention` refers to this character by full or first name,
    /// ignoring case.
    pub fn answers_to(&self, mention: &str) -> bool {
        let mention = mention.trim();
        if mention.is_empty() {
            return false;
        }
        mention.eq_ignore_ascii_case(&self.name)
            || mention.eq_ignore_ascii_case(self.first_name())
            || mention
                .split_whitespace()
                .next()
                .is_some_and(|first| first.eq_ignore_ascii_case(self.first_name()))
    }

    /// Lifecycle as seen by a scene. A death only shows from the scene
    /// after the one that caused it.
    pub fn lifecycle_at(&self, scene: SceneId) -> Lifecycle {
        match self.death {
            Some(died) if died < scene => Lifecycle::Dead { scene: died },
            _ => Lifecycle::Alive,
        }
    }
}

/// The fixed set of named characters for one manuscript.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    characters: Vec<Character>,
}

impl Roster {
    /// Build a roster, dropping names that answer to an earlier entry.
    pub fn new(characters: Vec<Character>) -> Self {
        let mut roster = Roster::default();
        for character in characters {
            if roster.resolve(&character.name).is_none() {
                roster.characters.push(character);
            }
        }
        roster
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Character> {
        self.characters.iter()
    }

    /// Find the character a mention refers to. Exact full-name matches
    /// win over first-name matches.
    pub fn resolve(&self, mention: &str) -> Option<&Character> {
        let mention = mention.trim();
        self.characters
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(mention))
            .or_else(|| self.characters.iter().find(|c| c.answers_to(mention)))
    }

    /// Record a death. The earliest recorded death wins; returns false if
    /// no roster entry answers to `mention`.
    pub(crate) fn mark_dead(&mut self, mention: &str, scene: SceneId) -> bool {
        let Some(name) = self.resolve(mention).map(|c| c.name.clone()) else {
            return false;
        };
        if let Some(character) = self.characters.iter_mut().find(|c| c.name == name) {
            match character.death {
                Some(existing) if existing <= scene => {}
                _ => character.death = Some(scene),
            }
        }
        true
    }
}
