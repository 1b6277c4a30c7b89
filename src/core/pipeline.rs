/// The drafting pipeline: context → generate → validate → retry.
///
/// Wires the continuity state to an external text generator, one scene at
/// a time and in outline order.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::continuity::{ContinuityState, ValidationResult};
use crate::schema::outline::SceneId;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("generator failed on {scene_id}: {message}")]
    Generator { scene_id: String, message: String },
    #[error("scene {scene} comes before already drafted scene {last}")]
    OutOfOrder { scene: SceneId, last: SceneId },
}

/// Produces prose for a prompt. Implemented for any
/// `FnMut(&str) -> Result<String, String>`.
pub trait SceneGenerator {
    fn generate(&mut self, prompt: &str) -> Result<String, String>;
}

impl<F> SceneGenerator for F
where
    F: FnMut(&str) -> Result<String, String>,
{
    fn generate(&mut self, prompt: &str) -> Result<String, String> {
        self(prompt)
    }
}

/// One drafted scene. `accepted` is false when every attempt failed
/// validation; `text` is then the last attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftedScene {
    pub scene_id: String,
    pub text: String,
    pub accepted: bool,
    pub attempts: u32,
    pub validation: ValidationResult,
}

/// Drafts scenes against one manuscript's continuity state.
pub struct DraftSession<'a, G> {
    state: &'a ContinuityState,
    generator: G,
    max_attempts: u32,
    last_drafted: Option<SceneId>,
}

impl<'a, G: SceneGenerator> DraftSession<'a, G> {
    pub fn new(state: &'a ContinuityState, generator: G) -> Self {
        Self {
            state,
            generator,
            max_attempts: 3,
            last_drafted: None,
        }
    }

    /// Attempts per scene, including the first. At least one.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn last_drafted(&self) -> Option<SceneId> {
        self.last_drafted
    }

    pub fn into_generator(self) -> G {
        self.generator
    }

    /// Draft one scene from the caller's brief.
    ///
    /// Outline scenes must be drafted in order; redrafting the most recent
    /// scene is allowed. Scene ids outside the outline are always accepted.
    pub fn draft(
        &mut self,
        scene_id: &str,
        pov: &str,
        brief: &str,
    ) -> Result<DraftedScene, PipelineError> {
        let known = self.state.known_scene(scene_id);
        if let (Some(scene), Some(last)) = (known, self.last_drafted) {
            if scene < last {
                return Err(PipelineError::OutOfOrder { scene, last });
            }
        }

        let mut notes: Vec<String> = Vec::new();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let prompt = self.build_prompt(scene_id, pov, brief, &notes);
            let text = self
                .generator
                .generate(&prompt)
                .map_err(|message| PipelineError::Generator {
                    scene_id: scene_id.to_string(),
                    message,
                })?;

            let validation = self.state.validate(scene_id, &text, pov);
            if validation.ok || attempt >= self.max_attempts {
                if validation.ok {
                    info!(scene = %scene_id, attempts = attempt, "scene accepted");
                } else {
                    warn!(
                        scene = %scene_id,
                        attempts = attempt,
                        errors = validation.errors.len(),
                        "scene kept despite continuity errors"
                    );
                }
                if known.is_some() {
                    self.last_drafted = known;
                }
                return Ok(DraftedScene {
                    scene_id: scene_id.to_string(),
                    text,
                    accepted: validation.ok,
                    attempts: attempt,
                    validation,
                });
            }

            debug!(scene = %scene_id, attempt, "retrying scene");
            for note in &validation.retry_notes {
                if !notes.contains(note) {
                    notes.push(note.clone());
                }
            }
        }
    }

    fn build_prompt(&self, scene_id: &str, pov: &str, brief: &str, notes: &[String]) -> String {
        let mut prompt = self.state.build_context_block(scene_id, pov);
        prompt.push('\n');
        prompt.push_str(brief.trim());
        prompt.push('\n');
        if !notes.is_empty() {
            prompt.push_str("\nThe previous attempt was rejected. Fix the following:\n");
            for note in notes {
                prompt.push_str("- ");
                prompt.push_str(note);
                prompt.push('\n');
            }
        }
        prompt
    }
}
