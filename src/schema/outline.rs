use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

use super::event::StateChanges;

#[derive(Debug, Error)]
pub enum OutlineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid scene id '{0}': expected ch<NN>_s<NN>")]
    InvalidSceneId(String),
}

/// Position of a scene in the manuscript, rendered as `ch<NN>_s<NN>`.
///
/// Ordering is by chapter, then scene within chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SceneId {
    pub chapter: u32,
    pub scene: u32,
}

impl SceneId {
    pub fn new(chapter: u32, scene: u32) -> Self {
        Self { chapter, scene }
    }

    /// Parse `ch01_s02`. Returns `None` for anything else.
    pub fn parse(input: &str) -> Option<SceneId> {
        let rest = input.trim().strip_prefix("ch")?;
        let (chapter, scene) = rest.split_once("_s")?;
        if chapter.is_empty() || scene.is_empty() {
            return None;
        }
        if !chapter.bytes().all(|b| b.is_ascii_digit()) || !scene.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(SceneId {
            chapter: chapter.parse().ok()?,
            scene: scene.parse().ok()?,
        })
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{:02}_s{:02}", self.chapter, self.scene)
    }
}

impl TryFrom<String> for SceneId {
    type Error = OutlineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SceneId::parse(&value).ok_or(OutlineError::InvalidSceneId(value))
    }
}

impl From<SceneId> for String {
    fn from(id: SceneId) -> Self {
        id.to_string()
    }
}

/// One planned scene. All text fields are free text written by the
/// outline generator; any of them may be empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub central_conflict: String,
    #[serde(default)]
    pub outcome: String,
    #[serde(default)]
    pub emotional_arc: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub pov: String,
    /// Other characters on stage besides the POV character.
    #[serde(default)]
    pub characters: Vec<String>,
    #[serde(default)]
    pub state_changes: Option<StateChanges>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chapter {
    /// Explicit chapter number. Falls back to the chapter's position.
    #[serde(default)]
    pub number: Option<u32>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

/// A chapter → scene outline, in reading order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Outline {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

impl Outline {
    /// Load an outline from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<Outline, OutlineError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse an outline from a RON string.
    pub fn parse_ron(input: &str) -> Result<Outline, OutlineError> {
        Ok(ron::from_str(input)?)
    }

    /// Parse an outline from a JSON string.
    pub fn from_json(input: &str) -> Result<Outline, OutlineError> {
        Ok(serde_json::from_str(input)?)
    }

    /// Flatten the outline into `(scene id, scene)` pairs in file order.
    ///
    /// Scene ids are strictly increasing. A chapter whose number is not
    /// greater than the last accepted chapter's is skipped whole, with a
    /// warning.
    pub fn ordered_scenes(&self) -> Vec<(SceneId, &Scene)> {
        let mut ordered: Vec<(SceneId, &Scene)> = Vec::new();
        let mut last_chapter: Option<u32> = None;
        for (chapter_idx, chapter) in self.chapters.iter().enumerate() {
            let chapter_no = chapter.number.unwrap_or(chapter_idx as u32 + 1);
            if let Some(last) = last_chapter {
                if chapter_no <= last {
                    warn!(
                        chapter = chapter_no,
                        previous = last,
                        scenes = chapter.scenes.len(),
                        "skipping out-of-order chapter"
                    );
                    continue;
                }
            }
            last_chapter = Some(chapter_no);
            for (scene_idx, scene) in chapter.scenes.iter().enumerate() {
                ordered.push((SceneId::new(chapter_no, scene_idx as u32 + 1), scene));
            }
        }
        ordered
    }

    pub fn scene_count(&self) -> usize {
        self.chapters.iter().map(|c| c.scenes.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_id_format_and_parse() {
        let id = SceneId::new(1, 2);
        assert_eq!(id.to_string(), "ch01_s02");
        assert_eq!(SceneId::parse("ch01_s02"), Some(id));
        assert_eq!(SceneId::parse("ch12_s10"), Some(SceneId::new(12, 10)));
        assert_eq!(SceneId::parse("chapter1"), None);
        assert_eq!(SceneId::parse("ch_s01"), None);
        assert_eq!(SceneId::parse("ch01_sxx"), None);
    }

    #[test]
    fn scene_id_ordering() {
        assert!(SceneId::new(1, 9) < SceneId::new(2, 1));
        assert!(SceneId::new(2, 1) < SceneId::new(2, 2));
    }

    #[test]
    fn scene_id_serializes_as_string() {
        let json = serde_json::to_string(&SceneId::new(3, 4)).unwrap();
        assert_eq!(json, "\"ch03_s04\"");
        let back: SceneId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SceneId::new(3, 4));
        assert!(serde_json::from_str::<SceneId>("\"nope\"").is_err());
    }

    #[test]
    fn ordered_scenes_uses_position_when_unnumbered() {
        let outline = Outline::parse_ron(
            r#"(
                chapters: [
                    (scenes: [(purpose: "a"), (purpose: "b")]),
                    (scenes: [(purpose: "c")]),
                ],
            )"#,
        )
        .unwrap();
        let ids: Vec<String> = outline
            .ordered_scenes()
            .iter()
            .map(|(id, _)| id.to_string())
            .collect();
        assert_eq!(ids, vec!["ch01_s01", "ch01_s02", "ch02_s01"]);
        assert_eq!(outline.scene_count(), 3);
    }

    #[test]
    fn ordered_scenes_skips_backwards_chapters() {
        let outline = Outline::parse_ron(
            r#"(
                chapters: [
                    (number: Some(2), scenes: [(purpose: "a")]),
                    (number: Some(1), scenes: [(purpose: "b")]),
                    (number: Some(3), scenes: [(purpose: "c")]),
                ],
            )"#,
        )
        .unwrap();
        let ids: Vec<String> = outline
            .ordered_scenes()
            .iter()
            .map(|(id, _)| id.to_string())
            .collect();
        assert_eq!(ids, vec!["ch02_s01", "ch03_s01"]);
    }

    #[test]
    fn repeated_chapter_number_drops_whole_chapter() {
        let outline = Outline::parse_ron(
            r#"(
                chapters: [
                    (number: Some(1), scenes: [(purpose: "a"), (purpose: "b")]),
                    (number: Some(1), scenes: [(purpose: "x"), (purpose: "y"), (purpose: "z")]),
                    (number: Some(2), scenes: [(purpose: "c")]),
                ],
            )"#,
        )
        .unwrap();
        let scenes: Vec<(String, &str)> = outline
            .ordered_scenes()
            .iter()
            .map(|(id, scene)| (id.to_string(), scene.purpose.as_str()))
            .collect();
        assert_eq!(
            scenes,
            vec![
                ("ch01_s01".to_string(), "a"),
                ("ch01_s02".to_string(), "b"),
                ("ch02_s01".to_string(), "c"),
            ]
        );
    }

    #[test]
    fn outline_from_json() {
        let outline = Outline::from_json(
            r#"{"chapters": [{"scenes": [{"purpose": "Elena finds the log",
                "state_changes": {"deaths": ["Silas Greer"]}}]}]}"#,
        )
        .unwrap();
        let scene = &outline.chapters[0].scenes[0];
        assert_eq!(scene.state_changes.as_ref().unwrap().deaths.len(), 1);
    }
}
