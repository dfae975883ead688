//! Capture and quality analysis of finished prints.
//!
//! The [`Inspector`] trait is the seam the orchestrator calls through;
//! [`CommandInspector`] drives external camera and analysis programs.

mod command;
mod error;
mod traits;
mod types;

pub use command::CommandInspector;
pub use error::InspectionError;
pub use traits::Inspector;
pub use types::QualityReport;
