use crate::error::{Error, Result};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Maven,
    Npm,
}

impl Ecosystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ecosystem::Maven => "maven",
            Ecosystem::Npm => "npm",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Ecosystem::Maven => "Maven",
            Ecosystem::Npm => "npm",
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Canonical package identifier, `pkg:<ecosystem>/<namespace?>/<name>@<version>`.
///
/// The rendered string is computed once at construction; the value is
/// immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageCoordinate {
    ecosystem: Ecosystem,
    namespace: Option<String>,
    name: String,
    version: String,
    purl: String,
}

impl PackageCoordinate {
    pub fn maven(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        let group_id = group_id.into();
        let artifact_id = artifact_id.into();
        let version = version.into();
        let purl = format!("pkg:maven/{}/{}@{}", group_id, artifact_id, version);
        Self {
            ecosystem: Ecosystem::Maven,
            namespace: Some(group_id),
            name: artifact_id,
            version,
            purl,
        }
    }

    pub fn npm(name: impl Into<String>, version: impl Into<String>) -> Self {
        let name = name.into();
        let version = version.into();
        let purl = format!("pkg:npm/{}@{}", name, version);
        Self {
            ecosystem: Ecosystem::Npm,
            namespace: None,
            name,
            version,
            purl,
        }
    }

    pub fn ecosystem(&self) -> Ecosystem {
        self.ecosystem
    }

    /// The Maven groupId; `None` for npm.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn as_str(&self) -> &str {
        &self.purl
    }
}

impl fmt::Display for PackageCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.purl)
    }
}

impl Serialize for PackageCoordinate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.purl)
    }
}

/// The root Maven artifact a scan starts from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MavenArtifact {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

impl MavenArtifact {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into().trim().to_string(),
            artifact_id: artifact_id.into().trim().to_string(),
            version: version.into().trim().to_string(),
        }
    }

    /// Rejects empty fields and anything outside `[A-Za-z0-9_.-]`.
    ///
    /// The fields end up inside a generated POM, so markup characters must
    /// never get through.
    pub fn validate(&self) -> Result<()> {
        if self.group_id.is_empty() || self.artifact_id.is_empty() || self.version.is_empty() {
            return Err(Error::validation(
                "groupId, artifactId and version must all be provided",
            ));
        }
        for (field, value) in [
            ("groupId", &self.group_id),
            ("artifactId", &self.artifact_id),
            ("version", &self.version),
        ] {
            if !is_maven_token(value) {
                return Err(Error::validation(format!(
                    "{} '{}' contains unsupported characters",
                    field, value
                )));
            }
        }
        Ok(())
    }

    pub fn coordinate(&self) -> PackageCoordinate {
        PackageCoordinate::maven(&self.group_id, &self.artifact_id, &self.version)
    }
}

impl fmt::Display for MavenArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}

/// A transitive dependency to leave out of the resolved tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    pub group_id: String,
    pub artifact_id: String,
}

impl Exclusion {
    pub fn new(group_id: impl Into<String>, artifact_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into().trim().to_string(),
            artifact_id: artifact_id.into().trim().to_string(),
        }
    }

    /// Both fields present and free of markup.
    pub fn is_complete(&self) -> bool {
        is_maven_token(&self.group_id) && is_maven_token(&self.artifact_id)
    }
}

impl FromStr for Exclusion {
    type Err = Error;

    /// Parses `groupId:artifactId`.
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((group, artifact)) => {
                let exclusion = Exclusion::new(group, artifact);
                if exclusion.is_complete() {
                    Ok(exclusion)
                } else {
                    Err(Error::validation(format!("invalid exclusion '{}'", s)))
                }
            }
            None => Err(Error::validation(format!(
                "exclusion '{}' must be written as groupId:artifactId",
                s
            ))),
        }
    }
}

fn is_maven_token(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
