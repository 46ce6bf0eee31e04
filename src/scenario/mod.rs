//! Scenario drivers for the backend's fraud rules.
//!
//! Two modes: the fixed catalogue (deterministic, preferred for verifying
//! specific rules) and a continuous random generator for soak-style demos.

pub mod catalogue;
pub mod continuous;

pub use catalogue::{build_catalogue, run_catalogue, ScenarioKind, Step, StepOutcome};
pub use continuous::{ContinuousConfig, ContinuousGenerator};
