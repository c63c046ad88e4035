use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Extract a dependency graph from a Java project or binary artifact.
#[derive(Debug, Parser)]
#[command(name = "javelin", version, about)]
pub struct Args {
    /// A source tree, a JAR/WAR/EAR, or a `mvn://g:a:v[:classifier]@dir`
    /// coordinate to download first.
    pub location: String,

    /// Provider settings file (JSON).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the configured analysis mode.
    #[arg(long, value_enum)]
    pub mode: Option<Mode>,

    /// Path to the decompiler JAR (overrides `fernFlowerPath`).
    #[arg(long)]
    pub decompiler: Option<PathBuf>,

    /// Attach open-source/internal labels to a flattened dependency list.
    #[arg(long)]
    pub label_deps: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = Output::Json)]
    pub output: Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Full,
    SourceOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Output {
    Json,
    Tree,
}

pub fn parse() -> Args {
    Args::parse()
}
