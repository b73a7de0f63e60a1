//! Core data types for coordinates, findings, and scan reports.
//!
//! - [`PackageCoordinate`] - Canonical `pkg:` identifier for one dependency
//! - [`MavenArtifact`] / [`Exclusion`] - Maven request inputs
//! - [`Finding`] - A component report from the vulnerability API
//! - [`QueryEnvelope`] - Outcome of one batch query
//! - [`Report`] - Merged answer to a scan request
//!
//! # Example
//!
//! ```
//! use depscan::model::PackageCoordinate;
//!
//! let coord = PackageCoordinate::maven("org.flowable", "flowable-engine", "7.1.0");
//! assert_eq!(coord.as_str(), "pkg:maven/org.flowable/flowable-engine@7.1.0");
//! ```

mod coordinate;
mod finding;

pub use coordinate::*;
pub use finding::*;
