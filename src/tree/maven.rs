use crate::error::{Error, Result};
use crate::model::{Exclusion, MavenArtifact};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_MVN_COMMAND: &str = "mvn";
pub const DEFAULT_TREE_TIMEOUT: Duration = Duration::from_secs(300);

/// Lines of tool output kept in a [`Error::ToolFailed`] message.
const FAILURE_TAIL_LINES: usize = 15;

/// Resolves a dependency tree by running `mvn dependency:tree` against a
/// throwaway POM that declares only the requested artifact.
pub struct MavenTreeGenerator {
    command: String,
    timeout: Duration,
}

impl MavenTreeGenerator {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    async fn run(&self, pom: &std::path::Path, cancel: &CancellationToken) -> Result<String> {
        let child = Command::new(&self.command)
            .arg("dependency:tree")
            .arg("-f")
            .arg(pom)
            .arg("--batch-mode")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::ToolLaunch {
                command: self.command.clone(),
                source,
            })?;
        debug!(command = %self.command, pid = ?child.id(), "spawned dependency tree tool");

        // Dropping the wait future drops the child, which kills it.
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            waited = tokio::time::timeout(self.timeout, child.wait_with_output()) => match waited {
                Ok(output) => output?,
                Err(_) => return Err(Error::ToolTimeout(self.timeout)),
            },
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(Error::ToolFailed {
                status: output.status.to_string(),
                output: tail(&text, FAILURE_TAIL_LINES),
            });
        }
        Ok(text)
    }
}

impl Default for MavenTreeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_MVN_COMMAND, DEFAULT_TREE_TIMEOUT)
    }
}

#[async_trait]
impl super::TreeGenerator for MavenTreeGenerator {
    fn name(&self) -> &'static str {
        "maven dependency:tree"
    }

    async fn generate(
        &self,
        artifact: &MavenArtifact,
        exclusions: &[Exclusion],
        cancel: &CancellationToken,
    ) -> Result<String> {
        artifact.validate()?;

        // The directory and the POM inside it are removed when `workdir` drops.
        let workdir = tempfile::tempdir()?;
        let pom = workdir.path().join("pom.xml");
        tokio::fs::write(&pom, render_pom(artifact, exclusions)).await?;

        info!(artifact = %artifact, exclusions = exclusions.len(), "generating dependency tree");
        let raw = self.run(&pom, cancel).await?;

        let tree = filter_tree_output(&raw);
        if tree.trim().is_empty() {
            warn!(artifact = %artifact, "dependency tree tool produced no tree lines");
            return Err(Error::EmptyTree);
        }
        Ok(tree)
    }
}

/// Builds the temporary project descriptor for `artifact`.
pub fn render_pom(artifact: &MavenArtifact, exclusions: &[Exclusion]) -> String {
    format!(
        r#"<project>
    <modelVersion>4.0.0</modelVersion>
    <groupId>com.example</groupId>
    <artifactId>temp-project</artifactId>
    <version>1.0-SNAPSHOT</version>
    <dependencies>
        <dependency>
            <groupId>{}</groupId>
            <artifactId>{}</artifactId>
            <version>{}</version>
            {}
        </dependency>
    </dependencies>
</project>
"#,
        artifact.group_id,
        artifact.artifact_id,
        artifact.version,
        render_exclusions(exclusions)
    )
}

/// Renders the `<exclusions>` block; incomplete exclusions are skipped and
/// an empty string is returned when none remain.
pub fn render_exclusions(exclusions: &[Exclusion]) -> String {
    let body: String = exclusions
        .iter()
        .filter(|e| e.is_complete())
        .map(|e| {
            format!(
                "<exclusion><groupId>{}</groupId><artifactId>{}</artifactId></exclusion>",
                e.group_id, e.artifact_id
            )
        })
        .collect();

    if body.is_empty() {
        String::new()
    } else {
        format!("<exclusions>{}</exclusions>", body)
    }
}

/// Keeps only tree lines (those drawing a `+-` or `\-` branch) and strips
/// the `[INFO]` log tag in front of them.
pub fn filter_tree_output(raw: &str) -> String {
    raw.lines()
        .filter(|line| line.contains("+-") || line.contains("\\-"))
        .map(|line| match line.strip_prefix("[INFO]") {
            Some(rest) => rest.trim_start(),
            None => line,
        })
        .fold(String::new(), |mut acc, line| {
            acc.push_str(line);
            acc.push('\n');
            acc
        })
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
