//! Javelin CLI binary.
//!
//! This is the entry point for the `javelin` command-line tool. It
//! initializes logging via `tracing`, parses arguments with `clap`, and
//! runs the analysis pipeline: location rewrite, build-tool detection,
//! optional source resolution, and dependency extraction.

mod cli;

use std::sync::Arc;

use miette::Result;
use serde::Serialize;

use javelin_build::{detect, rewrite_maven_location};
use javelin_core::{AnalysisMode, Config, DependencyGraph};
use javelin_explode::project;
use javelin_identify::Labeler;
use javelin_util::cancel::CancellationToken;
use javelin_util::errors::JavelinError;
use javelin_util::process::{CommandRunner, DefaultCommandRunner};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = cli::parse();
    run(args)
}

fn run(args: cli::Args) -> Result<()> {
    let mut config = match args.config {
        Some(ref path) => Config::from_path(path)?,
        None => Config::default(),
    };
    if let Some(mode) = args.mode {
        config.analysis_mode = match mode {
            cli::Mode::Full => AnalysisMode::Full,
            cli::Mode::SourceOnly => AnalysisMode::SourceOnly,
        };
    }
    if let Some(ref decompiler) = args.decompiler {
        config.fern_flower_path = Some(decompiler.clone());
    }
    let config = Arc::new(config);
    let runner: Arc<dyn CommandRunner> = Arc::new(DefaultCommandRunner);
    let ctx = CancellationToken::new();

    let location = rewrite_maven_location(&args.location, &config, runner.as_ref(), &ctx)?;

    let Some(tool) = detect(&location, Arc::clone(&config), Arc::clone(&runner)) else {
        // No build file at all: fabricate the minimal descriptors so the
        // language server can still open the directory.
        if location.is_dir() {
            project::write_minimal_project_files(&location)?;
            tracing::warn!(
                location = %location.display(),
                "no build tool detected, wrote minimal project descriptors"
            );
        }
        emit(&args, &DependencyGraph::new(), &config)?;
        return Ok(());
    };

    match javelin_build::jdk::probe_java(runner.as_ref()) {
        Ok(major) if major < javelin_build::jdk::MIN_JAVA_MAJOR => {
            tracing::warn!(
                major,
                "java runtime is older than {}; the language server will not launch",
                javelin_build::jdk::MIN_JAVA_MAJOR
            );
        }
        Ok(_) => {}
        Err(err) => {
            tracing::warn!(%err, "could not validate the java runtime");
        }
    }

    if tool.should_resolve() || config.analysis_mode == AnalysisMode::Full {
        match config.fern_flower_path {
            Some(ref decompiler) => {
                tool.resolver(decompiler).resolve_sources(&ctx)?;
            }
            None if tool.should_resolve() => {
                return Err(JavelinError::Config {
                    message: "binary analysis requires fernFlowerPath".into(),
                }
                .into());
            }
            None => {
                tracing::warn!("fernFlowerPath not configured, skipping source resolution");
            }
        }
    }

    let mut graph = DependencyGraph::new();
    for (uri, roots) in tool.get_dependencies(&ctx)? {
        graph.insert(uri, roots);
    }
    emit(&args, &graph, &config)?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct LabeledDependency {
    name: String,
    version: String,
    indirect: bool,
    labels: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    graph: &'a DependencyGraph,
    #[serde(skip_serializing_if = "Option::is_none")]
    dependencies: Option<std::collections::BTreeMap<String, Vec<LabeledDependency>>>,
}

fn emit(args: &cli::Args, graph: &DependencyGraph, config: &Config) -> Result<()> {
    match args.output {
        cli::Output::Tree => {
            print!("{}", graph.render_tree());
            Ok(())
        }
        cli::Output::Json => {
            let dependencies = if args.label_deps {
                Some(labeled_dependencies(graph, config)?)
            } else {
                None
            };
            let report = Report {
                graph,
                dependencies,
            };
            let stdout = std::io::stdout();
            serde_json::to_writer_pretty(stdout.lock(), &report).map_err(|err| {
                JavelinError::Generic {
                    message: format!("failed to serialize graph: {err}"),
                }
            })?;
            println!();
            Ok(())
        }
    }
}

fn labeled_dependencies(
    graph: &DependencyGraph,
    config: &Config,
) -> Result<std::collections::BTreeMap<String, Vec<LabeledDependency>>> {
    let labeler = Labeler::from_config(
        config.dep_open_source_labels_file.as_deref(),
        &config.exclude_packages,
    )?;
    let mut out = std::collections::BTreeMap::new();
    for (uri, flat) in graph.flatten_all() {
        let deps = flat
            .into_iter()
            .filter(|node| !labeler.is_excluded(&node.artifact.display_name()))
            .map(|node| {
                let name = node.artifact.display_name();
                let labels = labeler.label(&name, node.artifact.found_online);
                LabeledDependency {
                    name,
                    version: node.artifact.version,
                    indirect: node.indirect,
                    labels,
                }
            })
            .collect();
        out.insert(uri, deps);
    }
    Ok(out)
}
