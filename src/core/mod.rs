pub mod context;
pub mod continuity;
pub mod diversity;
pub mod pipeline;
pub mod regression;
pub mod rules;
pub mod scoring;
pub mod signature;
