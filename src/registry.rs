//! npm registry lookups with an expiring cache in front.
//!
//! # Cache keys
//!
//! Results are cached under `name` when no version is requested and under
//! `name@version` otherwise. An unversioned lookup therefore resolves
//! "latest" once and keeps serving that answer until the entry expires, even
//! if a newer version is published in the meantime. Versioned and
//! unversioned lookups of the same package never share an entry.

use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::cache::ExpiringCache;
use crate::error::{Error, Result};

pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org/";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Declared dependencies of one npm package version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NpmDependencies {
    /// The registry does not know the package (404 or empty body).
    NotFound,
    /// The package exists but declares no dependencies.
    NoneDeclared,
    /// Dependency name to version range.
    Declared(BTreeMap<String, String>),
}

impl NpmDependencies {
    /// Response document shown to callers.
    pub fn to_json(&self) -> Value {
        match self {
            NpmDependencies::NotFound => json!({ "message": "Package not found" }),
            NpmDependencies::NoneDeclared => {
                json!({ "message": "No known dependencies for this package." })
            }
            NpmDependencies::Declared(deps) => json!(deps),
        }
    }
}

impl Serialize for NpmDependencies {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NpmLookup {
    pub name: String,
    /// Version the lookup resolved to: the requested one, or `dist-tags.latest`.
    pub resolved_version: Option<String>,
    pub dependencies: NpmDependencies,
}

/// Cache key for a lookup: `name`, or `name@version` when a version is given.
pub fn cache_key(name: &str, version: Option<&str>) -> String {
    match version.filter(|v| !v.is_empty()) {
        Some(version) => format!("{}@{}", name, version),
        None => name.to_string(),
    }
}

pub struct NpmRegistry {
    client: reqwest::Client,
    base_url: String,
    cache: Arc<ExpiringCache<NpmLookup>>,
}

impl NpmRegistry {
    pub fn new(cache: Arc<ExpiringCache<NpmLookup>>) -> Result<Self> {
        Self::with_base_url(DEFAULT_REGISTRY_URL, DEFAULT_TIMEOUT, cache)
    }

    /// # Errors
    ///
    /// Returns [`Error::HttpClient`] if the HTTP client cannot be built.
    pub fn with_base_url(
        base_url: impl Into<String>,
        timeout: Duration,
        cache: Arc<ExpiringCache<NpmLookup>>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::HttpClient)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            cache,
        })
    }

    pub fn cache(&self) -> &ExpiringCache<NpmLookup> {
        &self.cache
    }

    /// Looks up the declared dependencies of `name` at `version`, or at the
    /// latest published version when `version` is `None` or empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Registry`] on transport failures and on error statuses
    /// other than 404, and [`Error::Json`] if the document is not JSON.
    pub async fn lookup(&self, name: &str, version: Option<&str>) -> Result<NpmLookup> {
        let version = version.filter(|v| !v.is_empty());
        let key = cache_key(name, version);

        if let Some(hit) = self.cache.lookup(&key) {
            debug!(key = %key, "registry cache hit");
            return Ok(hit);
        }

        let url = self.package_url(name, version);
        debug!(url = %url, "fetching package document");

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Error::Registry(e.to_string()))?;

        let status = response.status();
        let lookup = if status == StatusCode::NOT_FOUND {
            not_found(name, version)
        } else if !status.is_success() {
            return Err(Error::Registry(format!("{} returned {}", url, status)));
        } else {
            let body = response
                .text()
                .await
                .map_err(|e| Error::Registry(e.to_string()))?;
            if body.trim().is_empty() {
                not_found(name, version)
            } else {
                let document: Value = serde_json::from_str(&body)?;
                parse_document(name, version, &document)
            }
        };

        self.cache.store(key, lookup.clone());
        Ok(lookup)
    }

    fn package_url(&self, name: &str, version: Option<&str>) -> String {
        // Scoped packages are addressed as `@scope%2fname`.
        let name = name.replace('/', "%2f");
        let base = self.base_url.trim_end_matches('/');
        match version {
            Some(version) => format!("{}/{}/{}", base, name, version),
            None => format!("{}/{}", base, name),
        }
    }
}

fn not_found(name: &str, version: Option<&str>) -> NpmLookup {
    NpmLookup {
        name: name.to_string(),
        resolved_version: version.map(str::to_string),
        dependencies: NpmDependencies::NotFound,
    }
}

/// Reads the dependency map out of a registry document.
///
/// A version document carries `dependencies` at the top level; a packument
/// (unversioned) carries it under `versions[dist-tags.latest]`.
fn parse_document(name: &str, version: Option<&str>, document: &Value) -> NpmLookup {
    let (resolved_version, dependencies) = match version {
        Some(version) => (Some(version.to_string()), document.get("dependencies")),
        None => {
            let latest = document
                .pointer("/dist-tags/latest")
                .and_then(Value::as_str)
                .map(str::to_string);
            let deps = latest.as_deref().and_then(|latest| {
                document
                    .get("versions")
                    .and_then(|versions| versions.get(latest))
                    .and_then(|manifest| manifest.get("dependencies"))
            });
            (latest, deps)
        }
    };

    NpmLookup {
        name: name.to_string(),
        resolved_version,
        dependencies: match dependencies.and_then(Value::as_object) {
            Some(map) if !map.is_empty() => NpmDependencies::Declared(to_ranges(map)),
            _ => NpmDependencies::NoneDeclared,
        },
    }
}

fn to_ranges(map: &Map<String, Value>) -> BTreeMap<String, String> {
    map.iter()
        .map(|(dep, range)| {
            let range = range
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| range.to_string());
            (dep.clone(), range)
        })
        .collect()
}
