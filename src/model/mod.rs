//! Core data types for coordinates, audit results, and policy evaluation.
//!
//! This module contains the fundamental types used throughout depaudit:
//!
//! - [`Coordinate`] - A canonical package-URL key for one package version
//! - [`DependencyProject`] - A manifest record before normalization
//! - [`CoordinateReport`] - The audit result for one coordinate
//! - [`AuditReport`] - Complete audit results, ready for rendering
//! - [`PolicyResult`] - The terminal answer of a policy evaluation
//!
//! # Example
//!
//! ```
//! use depaudit::model::{Coordinate, CoordinateReport};
//!
//! let coordinate = Coordinate::new("golang", "github.com/gorilla/websocket", "1.4.0");
//! let report = CoordinateReport::clean(coordinate.as_str());
//!
//! assert!(!report.is_vulnerable());
//! ```

mod coordinate;
mod policy;
mod report;

pub use coordinate::*;
pub use policy::*;
pub use report::*;
