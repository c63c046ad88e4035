//! Core data types for the Javelin dependency provider.
//!
//! This crate defines the fundamental types shared by every other Javelin
//! crate: resolved artifacts, the per-build-file dependency DAG, and the
//! provider configuration.
//!
//! This crate is intentionally free of process spawning and archive I/O.

pub mod artifact;
pub mod config;
pub mod graph;

pub use artifact::{Artifact, Packaging};
pub use config::{AnalysisMode, Config};
pub use graph::{DependencyGraph, DependencyNode};
