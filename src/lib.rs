pub mod batch;
pub mod cache;
pub mod checker;
pub mod config;
pub mod error;
pub mod extract;
pub mod model;
pub mod output;
pub mod registry;
pub mod service;
pub mod tree;

pub use cache::ExpiringCache;
pub use config::Config;
pub use error::{Error, Result};
pub use model::{Finding, PackageCoordinate, QueryEnvelope, Report, ReportEntry};
pub use service::{MavenRequest, VulnerabilityService};
