/// Continuity context: the grounding block handed to the text generator.

use std::fmt;

use crate::schema::outline::SceneId;

/// Snapshot of roster state as seen by one scene, rendered as plain text
/// for a generation prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextBlock {
    pub scene_id: String,
    /// False when the scene id is not part of the outline. The roster is
    /// then shown as fully alive.
    pub known_scene: bool,
    pub pov: Option<String>,
    pub alive: Vec<String>,
    pub dead: Vec<(String, SceneId)>,
    pub established_facts: Vec<String>,
}

impl ContextBlock {
    /// True if the POV character is listed among the dead.
    pub fn pov_is_dead(&self) -> bool {
        self.pov
            .as_deref()
            .is_some_and(|pov| self.dead.iter().any(|(name, _)| name == pov))
    }
}

impl fmt::Display for ContextBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CONTINUITY CONTEXT (scene {})", self.scene_id)?;
        if !self.known_scene {
            writeln!(f, "Scene is not in the outline; all characters are treated as alive.")?;
        }
        if let Some(pov) = &self.pov {
            if self.pov_is_dead() {
                writeln!(f, "POV: {} (WARNING: this character is dead)", pov)?;
            } else {
                writeln!(f, "POV: {}", pov)?;
            }
        }

        if self.alive.is_empty() {
            writeln!(f, "Alive: (none tracked)")?;
        } else {
            writeln!(f, "Alive: {}", self.alive.join(", "))?;
        }

        if !self.dead.is_empty() {
            let dead: Vec<String> = self
                .dead
                .iter()
                .map(|(name, scene)| format!("{} (died in {})", name, scene))
                .collect();
            writeln!(f, "Dead: {}", dead.join(", "))?;
            writeln!(
                f,
                "Dead characters must not appear, speak, or act; they may only be remembered."
            )?;
        }

        if !self.established_facts.is_empty() {
            writeln!(f, "Established facts:")?;
            for fact in &self.established_facts {
                writeln!(f, "- {}", fact)?;
            }
        }
        Ok(())
    }
}
