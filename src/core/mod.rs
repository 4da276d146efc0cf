//! Core domain models for deployment pipelines
//!
//! This module defines the fundamental data structures that represent
//! pipelines, steps, readiness conditions and their configuration.

pub mod condition;
pub mod config;
pub mod pipeline;
pub mod state;
pub mod step;

pub use condition::{Condition, Observation, Probe, Target, WaitReport};
pub use pipeline::*;
pub use state::*;
pub use step::*;
