pub mod config;
pub mod entity;
pub mod event;
pub mod narrative_fn;
pub mod outline;
pub mod scorecard;
