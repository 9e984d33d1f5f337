//! Data types shared across the pipeline stages.

pub mod candidate;
pub mod config;
pub mod content;
pub mod record;
