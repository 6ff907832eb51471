//! Configuration building and validation for usage-limit-reporter.
//!
//! Settings come from the command line and the environment (see
//! [`crate::cli::Cli`]). This module loads the optional report template
//! file and validates everything before any alarm is processed.

mod secret;
mod types;
mod validation;

pub use secret::SecretString;
pub use types::{MAX_TEMPLATE_SIZE, ReporterConfig};
pub use validation::validate_report_template;
