//! Binary explosion and decompilation pipeline.
//!
//! Recursively unpacks JAR/WAR/EAR archives into a synthesized Maven-style
//! project, classifying each entry by role, and dispatches decompile jobs to
//! a bounded worker pool driving the external decompiler.

pub mod exploder;
pub mod pool;
pub mod project;

pub use exploder::{ExplodeOutcome, Exploder};
pub use pool::{DecompileJob, DecompilerPool, JobFilter};
