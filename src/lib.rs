//! Manuscript Guard: quality gates for long-form generated fiction.
//!
//! Three checks sit between an outline, a text generator and the finished
//! manuscript: outline diversity before drafting, entity-lifecycle
//! continuity on every drafted scene, and a per-run scorecard store that
//! reports regressions between pipeline runs.

pub mod core;
pub mod schema;

pub use crate::core::continuity::{ContinuityState, ValidationResult};
pub use crate::core::diversity::{validate_outline_diversity, DiversityConfig, DiversityReport};
pub use crate::core::regression::{store_and_diff, RunId, ScorecardDiff};
pub use crate::schema::config::StoryConfig;
pub use crate::schema::outline::{Outline, SceneId};
pub use crate::schema::scorecard::{RegressionConfig, Scorecard, WeightsConfig};
