//! Artifact identification for opaque JARs.
//!
//! Maps a JAR file to Maven coordinates via a tiered strategy: SHA-1 lookup
//! in a compact on-disk index, then embedded `pom.properties` metadata, then
//! inference from the class directory structure. Also hosts the pattern
//! labeler that tags dependencies as open-source or internal.

pub mod identifier;
pub mod index;
pub mod labeler;

pub use identifier::ArtifactIdentifier;
pub use index::ArtifactIndex;
pub use labeler::{Labeler, INTERNAL_LABEL, JAVA_LABEL, OPEN_SOURCE_LABEL};
