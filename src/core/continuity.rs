/// Continuity state engine: roster lifecycle over scene order, and the
/// content gate that rejects prose contradicting it.

use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::context::ContextBlock;
use crate::core::rules::{CompiledRules, ContinuityRules, RulesError};
use crate::schema::config::StoryConfig;
use crate::schema::entity::{Lifecycle, Roster};
use crate::schema::event::{EventSource, StateChangeEvent};
use crate::schema::outline::{Outline, SceneId};

/// Outcome of validating one generated scene.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub ok: bool,
    pub errors: Vec<String>,
    /// One note per error, phrased as an instruction for a retry prompt.
    pub retry_notes: Vec<String>,
}

impl ValidationResult {
    fn passed() -> Self {
        Self {
            ok: true,
            errors: Vec::new(),
            retry_notes: Vec::new(),
        }
    }

    fn reject(&mut self, error: String, retry_note: String) {
        self.ok = false;
        self.errors.push(error);
        self.retry_notes.push(retry_note);
    }
}

/// Entity lifecycle state for one manuscript.
///
/// Built once from the outline. Queries for a scene see only the events
/// of strictly earlier scenes. Scene ids outside the outline fail open:
/// everyone is alive.
#[derive(Debug, Clone)]
pub struct ContinuityState {
    roster: Roster,
    order: Vec<SceneId>,
    positions: FxHashMap<SceneId, usize>,
    events: Vec<StateChangeEvent>,
    world_rules: String,
    rules: CompiledRules,
    /// Presence pattern per roster name.
    presence: FxHashMap<String, Regex>,
}

impl ContinuityState {
    /// Build state with the built-in rule tables.
    ///
    /// Never fails: if the rule tables cannot be compiled, the returned
    /// state has an empty roster and checks nothing roster-related.
    pub fn from_outline(outline: &Outline, config: &StoryConfig) -> ContinuityState {
        match Self::with_rules(outline, config, &ContinuityRules::default()) {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "continuity rules failed to compile; continuity checks disabled");
                Self::disabled(outline, config)
            }
        }
    }

    /// Build state with caller-supplied rule tables.
    pub fn with_rules(
        outline: &Outline,
        config: &StoryConfig,
        rules: &ContinuityRules,
    ) -> Result<ContinuityState, RulesError> {
        let compiled = rules.compile()?;
        let mut roster = config.roster();
        if roster.is_empty() {
            info!("no character names in configuration; roster checks disabled");
        }

        let mut death_patterns = Vec::with_capacity(roster.len());
        let mut presence = FxHashMap::default();
        for character in roster.iter() {
            let names = name_forms(&character.name, character.first_name());
            if let Some(re) = rules.named_death_regex(&names)? {
                death_patterns.push((character.name.clone(), re));
            }
            if let Some(re) = rules.presence_regex(&names)? {
                presence.insert(character.name.clone(), re);
            }
        }
        let any_death = rules.any_death_regex()?;

        let mut order = Vec::new();
        let mut events = Vec::new();
        for (id, scene) in outline.ordered_scenes() {
            order.push(id);

            let event = match &scene.state_changes {
                Some(changes) if !changes.is_empty() => {
                    let mut event = StateChangeEvent::new(id, EventSource::Declared);
                    for mention in &changes.deaths {
                        match roster.resolve(mention).map(|c| c.name.clone()) {
                            Some(name) => {
                                roster.mark_dead(&name, id);
                                event.deaths.push(name);
                            }
                            None => {
                                warn!(scene = %id, name = %mention, "declared death names no roster character; ignored");
                            }
                        }
                    }
                    event.reveals = changes.reveals.clone();
                    event
                }
                _ => {
                    let mut event = StateChangeEvent::new(id, EventSource::Inferred);
                    let text = format!("{} {}", scene.outcome, scene.purpose);
                    for (name, re) in &death_patterns {
                        if re.is_match(&text) {
                            roster.mark_dead(name, id);
                            event.deaths.push(name.clone());
                        }
                    }
                    if event.deaths.is_empty() && any_death.as_ref().is_some_and(|re| re.is_match(&text)) {
                        event.unnamed_deaths = 1;
                    }
                    event
                }
            };

            if !event.is_noop() {
                debug!(
                    scene = %id,
                    source = ?event.source,
                    deaths = ?event.deaths,
                    unnamed = event.unnamed_deaths,
                    "recorded state change"
                );
                events.push(event);
            }
        }

        let positions = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        info!(
            characters = roster.len(),
            scenes = order.len(),
            events = events.len(),
            "continuity state built"
        );

        Ok(ContinuityState {
            roster,
            order,
            positions,
            events,
            world_rules: config.world_rules.to_lowercase(),
            rules: compiled,
            presence,
        })
    }

    fn disabled(outline: &Outline, config: &StoryConfig) -> ContinuityState {
        let order: Vec<SceneId> = outline.ordered_scenes().into_iter().map(|(id, _)| id).collect();
        let positions = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        ContinuityState {
            roster: Roster::default(),
            order,
            positions,
            events: Vec::new(),
            world_rules: config.world_rules.to_lowercase(),
            rules: CompiledRules::default(),
            presence: FxHashMap::default(),
        }
    }

    /// False when the roster is empty and no lifecycle checks are possible.
    pub fn is_enabled(&self) -> bool {
        !self.roster.is_empty()
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn scene_order(&self) -> &[SceneId] {
        &self.order
    }

    pub fn events(&self) -> &[StateChangeEvent] {
        &self.events
    }

    /// Resolve a scene id string to a scene in the outline.
    pub fn known_scene(&self, scene_id: &str) -> Option<SceneId> {
        SceneId::parse(scene_id).filter(|id| self.positions.contains_key(id))
    }

    /// Position of a scene in the outline order.
    pub fn position(&self, scene_id: &str) -> Option<usize> {
        self.known_scene(scene_id).and_then(|id| self.positions.get(&id).copied())
    }

    /// Roster names alive before `scene_id` executes.
    pub fn alive_at(&self, scene_id: &str) -> FxHashSet<String> {
        let at = self.known_scene(scene_id);
        self.roster
            .iter()
            .filter(|c| match at {
                Some(id) => c.lifecycle_at(id) == Lifecycle::Alive,
                None => true,
            })
            .map(|c| c.name.clone())
            .collect()
    }

    /// Roster names dead before `scene_id` executes, with the scene each
    /// died in.
    pub fn dead_at(&self, scene_id: &str) -> FxHashMap<String, SceneId> {
        match self.known_scene(scene_id) {
            Some(id) => self.dead_before(id).into_iter().collect(),
            None => FxHashMap::default(),
        }
    }

    fn dead_before(&self, id: SceneId) -> Vec<(String, SceneId)> {
        let mut dead: Vec<(String, SceneId)> = self
            .roster
            .iter()
            .filter_map(|c| match c.lifecycle_at(id) {
                Lifecycle::Dead { scene } => Some((c.name.clone(), scene)),
                Lifecycle::Alive => None,
            })
            .collect();
        dead.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        dead
    }

    /// Facts revealed in scenes strictly before `scene_id`.
    pub fn reveals_before(&self, scene_id: &str) -> Vec<&str> {
        let Some(id) = self.known_scene(scene_id) else {
            return Vec::new();
        };
        self.events
            .iter()
            .filter(|e| e.scene_id < id)
            .flat_map(|e| e.reveals.iter().map(String::as_str))
            .collect()
    }

    /// Check generated prose for `scene_id` against continuity state.
    ///
    /// All checks run and all errors are collected. Never mutates state.
    pub fn validate(&self, scene_id: &str, text: &str, pov: &str) -> ValidationResult {
        let mut result = ValidationResult::passed();

        if text.trim().chars().count() < self.rules.min_scene_chars {
            result.reject(
                "Empty scene.".to_string(),
                "The previous attempt produced no usable prose. Write the complete scene."
                    .to_string(),
            );
        }

        let dead = self
            .known_scene(scene_id)
            .map(|id| self.dead_before(id))
            .unwrap_or_default();

        if !dead.is_empty() {
            let sentences = split_sentences(text);
            for (name, died_in) in &dead {
                let Some(re) = self.presence.get(name) else {
                    continue;
                };
                let on_stage = sentences
                    .iter()
                    .any(|s| re.is_match(s) && !self.rules.is_memory_framed(s));
                if on_stage {
                    result.reject(
                        format!(
                            "Dead character present: {} died in {} but acts on-page in this scene.",
                            name, died_in
                        ),
                        format!(
                            "{} died in {}. Do not show them acting or speaking; mention them only in memory or in other characters' words.",
                            name, died_in
                        ),
                    );
                }
            }

            if let Some(pov_character) = self.roster.resolve(pov) {
                if let Some((name, died_in)) = dead.iter().find(|(n, _)| *n == pov_character.name) {
                    result.reject(
                        format!("Dead POV character: {} died in {} and cannot narrate this scene.", name, died_in),
                        format!("Write this scene from the point of view of a living character; {} died in {}.", name, died_in),
                    );
                }
            }
        }

        if !self.world_rules.is_empty() {
            for rule in &self.rules.setting_rules {
                if !rule.applies_to(&self.world_rules) {
                    continue;
                }
                for (phrase, re) in &rule.forbidden {
                    if re.is_match(text) {
                        result.reject(
                            format!("Setting violation: \"{}\" contradicts the world rules ({}).", phrase, rule.description),
                            format!("Remove any mention of \"{}\": {}.", phrase, rule.description),
                        );
                    }
                }
            }
        }

        for pattern in &self.rules.drift_patterns {
            if pattern.regex.is_match(text) {
                result.reject(
                    format!("Design drift: \"{}\" introduces {}.", pattern.phrase, pattern.description),
                    format!("Do not introduce {}; keep to the planned cast and events.", pattern.description),
                );
            }
        }

        if !result.ok {
            debug!(scene = %scene_id, errors = result.errors.len(), "scene failed continuity validation");
        }
        result
    }

    /// Plain-text roster summary for grounding the generator.
    pub fn build_context_block(&self, scene_id: &str, pov: &str) -> String {
        self.context_block(scene_id, pov).to_string()
    }

    /// Structured form of [`build_context_block`](Self::build_context_block).
    pub fn context_block(&self, scene_id: &str, pov: &str) -> ContextBlock {
        let known = self.known_scene(scene_id);
        let dead = known.map(|id| self.dead_before(id)).unwrap_or_default();
        let mut alive: Vec<String> = self.alive_at(scene_id).into_iter().collect();
        alive.sort();
        let pov = self
            .roster
            .resolve(pov)
            .map(|c| c.name.clone())
            .or_else(|| Some(pov.trim().to_string()).filter(|p| !p.is_empty()));

        ContextBlock {
            scene_id: scene_id.to_string(),
            known_scene: known.is_some(),
            pov,
            alive,
            dead,
            established_facts: self.reveals_before(scene_id).into_iter().map(str::to_string).collect(),
        }
    }
}

fn name_forms<'a>(full: &'a str, first: &'a str) -> Vec<&'a str> {
    if full == first {
        vec![full]
    } else {
        vec![full, first]
    }
}

/// Split prose into sentences on terminal punctuation and line breaks.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?' | '\n') {
            let end = i + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}
