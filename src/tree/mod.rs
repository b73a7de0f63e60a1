//! Dependency tree generation.
//!
//! A [`TreeGenerator`] turns a root Maven artifact into a text report whose
//! dependency lines look like `+- group:artifact:packaging:version:scope`.
//! The report is consumed by [`extract_maven_coordinates`].
//!
//! [`extract_maven_coordinates`]: crate::extract::extract_maven_coordinates

mod maven;

pub use maven::{
    filter_tree_output, render_exclusions, render_pom, MavenTreeGenerator, DEFAULT_MVN_COMMAND,
    DEFAULT_TREE_TIMEOUT,
};

use crate::error::Result;
use crate::model::{Exclusion, MavenArtifact};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Produces a dependency tree report for a root artifact.
///
/// Implementations should fail rather than return an empty report: there
/// is no partial tree to scan.
#[async_trait]
pub trait TreeGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    /// # Errors
    ///
    /// Returns an error if the artifact is invalid, the tool cannot be run,
    /// exits unsuccessfully, times out, is cancelled, or reports no tree.
    async fn generate(
        &self,
        artifact: &MavenArtifact,
        exclusions: &[Exclusion],
        cancel: &CancellationToken,
    ) -> Result<String>;
}
