//! Java runtime validation.
//!
//! The decompiler and the Maven/Gradle JVMs run under whatever `java` is on
//! PATH; the downstream language-server launcher additionally needs a
//! modern runtime. Probing once up front turns a confusing late failure
//! into a clear capability downgrade.

use once_cell::sync::Lazy;
use regex::Regex;

use javelin_util::errors::{JavelinError, JavelinResult};
use javelin_util::process::{CommandBuilder, CommandRunner};

/// Minimum major version the language-server launcher accepts.
pub const MIN_JAVA_MAJOR: u32 = 17;

/// First quoted version in a `java -version` banner, e.g.
/// `openjdk version "17.0.2" 2022-01-18` or `java version "1.8.0_312"`.
static JAVA_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"version "(\d+)(?:\.(\d+))?"#).unwrap());

/// Extract the major version from a `java -version` banner.
///
/// Legacy banners report `1.<major>` (Java 8 and older).
pub fn java_major_version(banner: &str) -> Option<u32> {
    let captures = JAVA_VERSION.captures(banner)?;
    let major: u32 = captures[1].parse().ok()?;
    if major == 1 {
        captures.get(2).and_then(|m| m.as_str().parse().ok())
    } else {
        Some(major)
    }
}

/// Run `java -version` and return the major version.
///
/// The banner is printed on stderr; the combined output is parsed.
pub fn probe_java(runner: &dyn CommandRunner) -> JavelinResult<u32> {
    let cmd = CommandBuilder::new("java").arg("-version");
    let output = runner.run(&cmd)?;
    java_major_version(&output.combined()).ok_or_else(|| {
        JavelinError::Parse {
            message: format!("unrecognized java -version banner: {}", output.combined()),
        }
        .into()
    })
}
