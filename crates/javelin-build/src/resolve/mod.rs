//! Source resolvers: make dependency sources available to the language
//! server, downloading them through the build tool where possible and
//! decompiling the remainder.

mod binary;
mod gradle;
mod maven;

pub use binary::BinaryResolver;
pub use gradle::GradleSourcesResolver;
pub use maven::MavenSourcesResolver;

use javelin_util::cancel::CancellationToken;
use javelin_util::errors::JavelinResult;

/// Downloads sources for resolved dependencies and decompiles artifacts
/// that have none.
pub trait Resolver: Send + Sync {
    fn resolve_sources(&self, ctx: &CancellationToken) -> JavelinResult<()>;
}
