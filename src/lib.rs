pub mod audit;
pub mod cache;
pub mod checker;
pub mod config;
pub mod error;
pub mod manifest;
pub mod model;
pub mod normalize;
pub mod output;
pub mod platform;
pub mod policy;

#[cfg(test)]
mod http_stub;

pub use audit::Auditor;
pub use cache::Cache;
pub use checker::AuditClient;
pub use config::Config;
pub use error::{AuditError, AuditResult};
pub use model::{AuditReport, Coordinate, CoordinateReport, DependencyProject, PolicyResult, Vulnerability};
pub use policy::PolicyEvaluator;
