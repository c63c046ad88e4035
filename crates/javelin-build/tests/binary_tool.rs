use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use javelin_build::detect;
use javelin_core::Config;
use javelin_util::cancel::CancellationToken;
use javelin_util::errors::JavelinError;
use javelin_util::process::{CommandBuilder, CommandOutput, CommandRunner};
use zip::write::SimpleFileOptions;

const TREE_OUTPUT: &str = "\
[INFO] --- maven-dependency-plugin:3.1.2:tree (default-cli) @ java-project ---
[INFO] io.konveyor:java-project:jar:1.0-SNAPSHOT
[INFO] +- com.google.guava:guava:jar:31.0:compile
[INFO] ------------------------------------------------------------------------
";

/// Stands in for both the decompiler JVM and the Maven binary.
#[derive(Debug, Default)]
struct FakeToolchain {
    java_calls: AtomicUsize,
}

impl CommandRunner for FakeToolchain {
    fn run(&self, cmd: &CommandBuilder) -> Result<CommandOutput, JavelinError> {
        if cmd.program() == "java" {
            self.java_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(CommandOutput {
                code: Some(0),
                ..CommandOutput::default()
            });
        }
        let args = cmd.get_args();
        let stdout = if args.iter().any(|a| a == "dependency:tree") {
            TREE_OUTPUT.to_string()
        } else {
            String::new()
        };
        Ok(CommandOutput {
            code: Some(0),
            stdout,
            stderr: String::new(),
        })
    }
}

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn write_war(path: &Path) {
    let guava = zip_bytes(&[
        (
            "META-INF/maven/com.google.guava/guava/pom.properties",
            b"groupId=com.google.guava\nartifactId=guava\nversion=31.0\n".as_slice(),
        ),
        ("com/google/common/collect/Lists.class", b"".as_slice()),
    ]);
    std::fs::write(
        path,
        zip_bytes(&[
            ("WEB-INF/classes/com/x/A.class", b"\xca\xfe".as_slice()),
            ("WEB-INF/lib/guava-31.jar", guava.as_slice()),
        ]),
    )
    .unwrap();
}

#[test]
fn test_binary_resolution_synthesizes_a_queryable_maven_project() {
    let tmp = tempfile::tempdir().unwrap();
    let input_dir = tmp.path().join("input");
    std::fs::create_dir(&input_dir).unwrap();
    let war = input_dir.join("app.war");
    write_war(&war);

    let config = Arc::new(Config {
        maven_cache_dir: Some(tmp.path().join("m2")),
        ..Config::default()
    });
    let runner = Arc::new(FakeToolchain::default());

    let tool = detect(&war, Arc::clone(&config), runner.clone()).unwrap();
    assert!(tool.should_resolve());

    // Dependencies are unavailable until the resolver has run.
    let ctx = CancellationToken::new();
    assert!(tool.get_dependencies(&ctx).is_err());

    tool.resolver(Path::new("/opt/fernflower.jar"))
        .resolve_sources(&ctx)
        .unwrap();

    // The identified JAR landed in the local repository and the synthesized
    // pom declares it with full coordinates.
    assert!(tmp
        .path()
        .join("m2/com/google/guava/guava/31.0/guava-31.jar")
        .is_file());
    let pom = std::fs::read_to_string(input_dir.join("java-project/pom.xml")).unwrap();
    assert!(pom.contains("<groupId>io.konveyor</groupId>"));
    assert!(pom.contains("<artifactId>guava</artifactId>"));
    assert!(pom.contains("<version>31.0</version>"));

    // The class inside WEB-INF went through the decompiler.
    assert!(runner.java_calls.load(Ordering::SeqCst) >= 1);

    // The binary tool now answers through the synthesized Maven project.
    let map = tool.get_dependencies(&ctx).unwrap();
    let roots = map.values().next().unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].artifact.display_name(), "com.google.guava.guava");
}

#[test]
fn test_resolution_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let war = tmp.path().join("app.war");
    write_war(&war);

    let config = Arc::new(Config {
        maven_cache_dir: Some(tmp.path().join("m2")),
        ..Config::default()
    });
    let runner = Arc::new(FakeToolchain::default());
    let tool = detect(&war, config, runner).unwrap();

    let ctx = CancellationToken::new();
    let resolver = tool.resolver(Path::new("/opt/fernflower.jar"));
    resolver.resolve_sources(&ctx).unwrap();
    // Second run observes the populated slot and does nothing.
    resolver.resolve_sources(&ctx).unwrap();
    assert!(tool.get_dependencies(&ctx).is_ok());
}
