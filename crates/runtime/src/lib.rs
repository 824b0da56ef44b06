//! Sluice - Runtime
//!
//! Turns a declarative pipeline description into running plugins and
//! supervises their lifecycle: instantiate everything through the type
//! registry, wire streams, spawn producers then consumers, and coordinate
//! ordered shutdown (consumers first, then producers in drop-path order so
//! late drops always find a live receiver).

mod builder;
mod error;
mod supervisor;

pub use builder::{builtin_types, PipelineBuilder};
pub use error::{Result, RuntimeError};
pub use supervisor::{Pipeline, RunningPipeline};
