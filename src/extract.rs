//! Coordinate extraction from `mvn dependency:tree` reports.
//!
//! Each line is matched on its own against a single pattern: optional
//! tree-drawing glyphs, then `group:artifact:packaging[:classifier]:version:scope`,
//! optionally followed by a Maven annotation such as `(optional)`. Lines that
//! do not match in full are skipped.

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::model::PackageCoordinate;

static TREE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[\s|+\\-]*([\w.-]+):([\w.-]+):[\w.-]+(?::[\w.-]+)?:([\w.-]+):[\w.-]+(?:\s+\(.*\))?\s*$",
    )
    .expect("tree line pattern is valid")
});

/// Parses a single report line into a Maven coordinate.
pub fn parse_tree_line(line: &str) -> Option<PackageCoordinate> {
    let caps = TREE_LINE.captures(line)?;
    Some(PackageCoordinate::maven(&caps[1], &caps[2], &caps[3]))
}

/// Extracts every dependency coordinate from a tree report, in line order.
///
/// Coordinates that appear several times in the report are kept each time.
///
/// # Example
///
/// ```
/// use depscan::extract::extract_maven_coordinates;
///
/// let report = "+- org.flowable:flowable-engine:jar:7.1.0:compile\n\
///               |  \\- org.yaml:snakeyaml:jar:2.2:compile\n";
/// let coords = extract_maven_coordinates(report);
/// assert_eq!(coords.len(), 2);
/// assert_eq!(coords[1].as_str(), "pkg:maven/org.yaml/snakeyaml@2.2");
/// ```
pub fn extract_maven_coordinates(report: &str) -> Vec<PackageCoordinate> {
    report
        .lines()
        .filter_map(|line| {
            let coord = parse_tree_line(line)?;
            debug!(coordinate = %coord, "extracted coordinate");
            Some(coord)
        })
        .collect()
}

/// npm lookups are not tree based: the requested package is the only coordinate.
pub fn npm_coordinate(name: &str, version: &str) -> PackageCoordinate {
    PackageCoordinate::npm(name, version)
}
