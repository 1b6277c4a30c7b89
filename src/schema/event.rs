use serde::{Deserialize, Serialize};

use super::outline::SceneId;

/// State changes an outline declares for one scene.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateChanges {
    #[serde(default)]
    pub deaths: Vec<String>,
    #[serde(default)]
    pub reveals: Vec<String>,
}

impl StateChanges {
    pub fn is_empty(&self) -> bool {
        self.deaths.is_empty() && self.reveals.is_empty()
    }
}

/// Where a state-change event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventSource {
    /// Listed under the scene's `state_changes`.
    Declared,
    /// Read out of the scene's outcome or purpose text.
    Inferred,
}

/// A resolved state-change event attached to one scene.
///
/// `deaths` only ever holds roster names. A death the outline implies
/// without naming anyone on the roster is counted in `unnamed_deaths`
/// and never touches the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChangeEvent {
    pub scene_id: SceneId,
    pub source: EventSource,
    pub deaths: Vec<String>,
    pub reveals: Vec<String>,
    pub unnamed_deaths: usize,
}

impl StateChangeEvent {
    pub fn new(scene_id: SceneId, source: EventSource) -> Self {
        Self {
            scene_id,
            source,
            deaths: Vec::new(),
            reveals: Vec::new(),
            unnamed_deaths: 0,
        }
    }

    /// True if the event changes nothing.
    pub fn is_noop(&self) -> bool {
        self.deaths.is_empty() && self.reveals.is_empty() && self.unnamed_deaths == 0
    }
}
