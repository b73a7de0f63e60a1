//! Request orchestration.
//!
//! A Maven scan runs: validate → generate tree → extract coordinates →
//! partition → query → merge. An npm scan checks only the requested package;
//! its dependency tree is not resolved.

use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::batch::{partition, BATCH_SIZE};
use crate::cache::ExpiringCache;
use crate::checker::{BatchDispatcher, OssIndexChecker, QueryMode};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::extract::{extract_maven_coordinates, npm_coordinate};
use crate::model::{Ecosystem, Exclusion, MavenArtifact, PackageCoordinate, Report};
use crate::registry::{NpmDependencies, NpmLookup, NpmRegistry};
use crate::tree::{filter_tree_output, MavenTreeGenerator, TreeGenerator};

/// A Maven scan request.
#[derive(Debug, Clone)]
pub struct MavenRequest {
    pub artifact: MavenArtifact,
    pub exclusions: Vec<Exclusion>,
    /// Already materialised `dependency:tree` output; skips running Maven.
    pub tree_report: Option<String>,
}

impl MavenRequest {
    pub fn new(artifact: MavenArtifact) -> Self {
        Self {
            artifact,
            exclusions: Vec::new(),
            tree_report: None,
        }
    }

    pub fn with_exclusions(mut self, exclusions: Vec<Exclusion>) -> Self {
        self.exclusions = exclusions;
        self
    }

    pub fn with_tree_report(mut self, report: impl Into<String>) -> Self {
        self.tree_report = Some(report.into());
        self
    }
}

pub struct VulnerabilityService {
    tree: Arc<dyn TreeGenerator>,
    registry: NpmRegistry,
    dispatcher: BatchDispatcher,
}

impl VulnerabilityService {
    pub fn new(tree: Arc<dyn TreeGenerator>, registry: NpmRegistry, dispatcher: BatchDispatcher) -> Self {
        Self {
            tree,
            registry,
            dispatcher,
        }
    }

    /// Wires the production collaborators from configuration. The cache is
    /// passed in so one instance can live for the whole process.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HttpClient`] if an HTTP client cannot be built.
    pub fn from_config(config: &Config, cache: Arc<ExpiringCache<NpmLookup>>) -> Result<Self> {
        let checker = OssIndexChecker::with_endpoint(&config.api_url, config.request_timeout())?;
        let registry =
            NpmRegistry::with_base_url(&config.registry_url, config.request_timeout(), cache)?;
        Ok(Self::new(
            Arc::new(MavenTreeGenerator::new(&config.mvn_command, config.tree_timeout())),
            registry,
            BatchDispatcher::new(Arc::new(checker), config.max_in_flight),
        ))
    }

    /// Returns the filtered dependency tree report for a Maven request.
    ///
    /// A supplied report goes through the same line filter as generated
    /// output, so raw `mvn dependency:tree` logs are accepted.
    pub async fn maven_tree(&self, request: &MavenRequest, cancel: &CancellationToken) -> Result<String> {
        request.artifact.validate()?;
        match &request.tree_report {
            Some(report) => {
                let tree = filter_tree_output(report);
                if tree.trim().is_empty() {
                    warn!(artifact = %request.artifact, "supplied tree report has no tree lines");
                    return Err(Error::EmptyTree);
                }
                Ok(tree)
            }
            None => {
                debug!(generator = self.tree.name(), artifact = %request.artifact, "resolving dependency tree");
                self.tree
                    .generate(&request.artifact, &request.exclusions, cancel)
                    .await
            }
        }
    }

    pub async fn fetch_maven(
        &self,
        request: &MavenRequest,
        mode: QueryMode,
        cancel: &CancellationToken,
    ) -> Result<Report> {
        let tree = self.maven_tree(request, cancel).await?;
        let coordinates = extract_maven_coordinates(&tree);
        self.scan(
            request.artifact.coordinate().to_string(),
            Ecosystem::Maven,
            coordinates,
            mode,
            cancel,
        )
        .await
    }

    /// Declared dependencies of an npm package, served from cache when fresh.
    pub async fn npm_dependencies(&self, name: &str, version: Option<&str>) -> Result<NpmLookup> {
        validate_npm(name, version)?;
        self.registry
            .lookup(name.trim(), version.map(str::trim))
            .await
    }

    /// Checks a single npm package. Without a version the latest published
    /// version is resolved through the registry first.
    pub async fn fetch_npm(
        &self,
        name: &str,
        version: Option<&str>,
        mode: QueryMode,
        cancel: &CancellationToken,
    ) -> Result<Report> {
        validate_npm(name, version)?;
        let name = name.trim();

        let version = match version {
            Some(version) => version.trim().to_string(),
            None => {
                let lookup = self.registry.lookup(name, None).await?;
                match (lookup.dependencies, lookup.resolved_version) {
                    (NpmDependencies::NotFound, _) => {
                        return Err(Error::validation(format!(
                            "npm package '{}' was not found",
                            name
                        )))
                    }
                    (_, Some(latest)) => latest,
                    (_, None) => {
                        return Err(Error::validation(format!(
                            "npm package '{}' has no latest version",
                            name
                        )))
                    }
                }
            }
        };

        let coordinate = npm_coordinate(name, &version);
        self.scan(coordinate.to_string(), Ecosystem::Npm, vec![coordinate], mode, cancel)
            .await
    }

    async fn scan(
        &self,
        root: String,
        ecosystem: Ecosystem,
        coordinates: Vec<PackageCoordinate>,
        mode: QueryMode,
        cancel: &CancellationToken,
    ) -> Result<Report> {
        let coordinate_count = coordinates.len();
        let batches = partition(coordinates, BATCH_SIZE);
        let batch_count = batches.len();
        info!(root = %root, coordinates = coordinate_count, batches = batch_count, ?mode, "checking vulnerabilities");

        let entries = self.dispatcher.dispatch(batches, mode, cancel).await?;
        info!(root = %root, entries = entries.len(), "vulnerability check finished");

        Ok(Report {
            root,
            ecosystem,
            coordinate_count,
            batch_count,
            generated_at: Utc::now(),
            entries,
        })
    }
}

fn validate_npm(name: &str, version: Option<&str>) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation("npm package name must be provided"));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(Error::validation(format!(
            "npm package name '{}' must not contain whitespace",
            name
        )));
    }
    if let Some(version) = version {
        let version = version.trim();
        if version.is_empty() || version.chars().any(char::is_whitespace) {
            return Err(Error::validation(format!(
                "invalid version '{}' for npm package '{}'",
                version, name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Batch;
    use crate::checker::VulnerabilityChecker;
    use crate::model::{Finding, QueryEnvelope, ReportEntry};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StaticTree(Option<String>);

    #[async_trait]
    impl TreeGenerator for StaticTree {
        fn name(&self) -> &'static str {
            "static"
        }

        async fn generate(
            &self,
            _artifact: &MavenArtifact,
            _exclusions: &[Exclusion],
            _cancel: &CancellationToken,
        ) -> Result<String> {
            self.0.clone().ok_or(Error::EmptyTree)
        }
    }

    /// Reports one finding per coordinate and counts calls.
    #[derive(Default)]
    struct CountingChecker {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VulnerabilityChecker for CountingChecker {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn query_batch(&self, batch: &Batch) -> QueryEnvelope {
            self.calls.fetch_add(1, Ordering::SeqCst);
            QueryEnvelope::Findings(
                batch
                    .coordinates()
                    .iter()
                    .map(|c| Finding {
                        coordinates: c.to_string(),
                        ..Default::default()
                    })
                    .collect(),
            )
        }
    }

    fn service(tree: Option<&str>, checker: Arc<CountingChecker>) -> VulnerabilityService {
        VulnerabilityService::new(
            Arc::new(StaticTree(tree.map(str::to_string))),
            // Never contacted by these tests.
            NpmRegistry::with_base_url(
                "http://127.0.0.1:9/",
                Duration::from_millis(200),
                Arc::new(ExpiringCache::new()),
            )
            .unwrap(),
            BatchDispatcher::new(checker, 4),
        )
    }

    fn flowable() -> MavenRequest {
        MavenRequest::new(MavenArtifact::new("org.flowable", "flowable-engine", "7.1.0"))
    }

    #[tokio::test]
    async fn test_fetch_maven_end_to_end() {
        let tree = "\\- org.flowable:flowable-engine:jar:7.1.0:compile\n\
                    +- org.flowable:flowable-bpmn-model:jar:7.1.0:compile\n";
        let checker = Arc::new(CountingChecker::default());
        let report = service(Some(tree), checker.clone())
            .fetch_maven(&flowable(), QueryMode::Serial, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.root, "pkg:maven/org.flowable/flowable-engine@7.1.0");
        assert_eq!(report.coordinate_count, 2);
        assert_eq!(report.batch_count, 1);
        assert_eq!(report.entries.len(), 2);
        assert!(matches!(
            &report.entries[1],
            ReportEntry::Finding(f) if f.coordinates == "pkg:maven/org.flowable/flowable-bpmn-model@7.1.0"
        ));
        assert_eq!(checker.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_supplied_tree_report_is_used() {
        let checker = Arc::new(CountingChecker::default());
        let request = flowable().with_tree_report("+- org.yaml:snakeyaml:jar:1.33:compile\n");

        let report = service(None, checker)
            .fetch_maven(&request, QueryMode::Parallel, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.coordinate_count, 1);
    }

    #[tokio::test]
    async fn test_supplied_raw_maven_log_is_filtered() {
        let raw = "[INFO] Scanning for projects...\n\
                   [INFO] --- dependency:3.6.1:tree (default-cli) @ temp-project ---\n\
                   [INFO] com.example:temp-project:jar:1.0-SNAPSHOT\n\
                   [INFO] \\- org.yaml:snakeyaml:jar:1.33:compile\n\
                   [INFO] BUILD SUCCESS\n";
        let checker = Arc::new(CountingChecker::default());
        let request = flowable().with_tree_report(raw);

        let report = service(None, checker.clone())
            .fetch_maven(&request, QueryMode::Serial, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.coordinate_count, 1);
        assert!(matches!(
            &report.entries[0],
            ReportEntry::Finding(f) if f.coordinates == "pkg:maven/org.yaml/snakeyaml@1.33"
        ));
        assert_eq!(checker.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_supplied_tree_report_is_fatal() {
        let checker = Arc::new(CountingChecker::default());
        let svc = service(None, checker.clone());
        let cancel = CancellationToken::new();

        for report in ["", "[INFO] BUILD SUCCESS\n"] {
            let request = flowable().with_tree_report(report);
            let result = svc.fetch_maven(&request, QueryMode::Serial, &cancel).await;
            assert!(matches!(result, Err(Error::EmptyTree)));
        }
        assert_eq!(checker.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_from_config_builds_clients() {
        let config = Config {
            request_timeout_secs: 5,
            ..Config::default()
        };
        assert!(VulnerabilityService::from_config(&config, Arc::new(ExpiringCache::new())).is_ok());
    }

    #[tokio::test]
    async fn test_tree_failure_is_fatal() {
        let checker = Arc::new(CountingChecker::default());
        let result = service(None, checker.clone())
            .fetch_maven(&flowable(), QueryMode::Parallel, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(Error::EmptyTree)));
        assert_eq!(checker.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_maven_request_makes_no_calls() {
        let checker = Arc::new(CountingChecker::default());
        let request = MavenRequest::new(MavenArtifact::new("org.flowable", "flowable-engine", ""));

        let result = service(Some("+- a:b:jar:1.0:compile\n"), checker.clone())
            .fetch_maven(&request, QueryMode::Serial, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(checker.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_npm_with_version_skips_registry() {
        let checker = Arc::new(CountingChecker::default());
        let report = service(None, checker)
            .fetch_npm("lodash", Some("4.17.21"), QueryMode::Serial, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.ecosystem, Ecosystem::Npm);
        assert_eq!(report.root, "pkg:npm/lodash@4.17.21");
        assert_eq!(report.entries.len(), 1);
    }

    #[tokio::test]
    async fn test_npm_validation() {
        let svc = service(None, Arc::new(CountingChecker::default()));
        let cancel = CancellationToken::new();

        assert!(matches!(
            svc.fetch_npm("  ", Some("1.0.0"), QueryMode::Serial, &cancel).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            svc.npm_dependencies("lodash", Some(" ")).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            svc.npm_dependencies("left pad", None).await,
            Err(Error::Validation(_))
        ));
    }
}
