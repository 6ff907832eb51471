//! Report delivery.
//!
//! This module defines the [`Notifier`] trait the pipeline delivers
//! rendered reports through, and the Slack implementation used in
//! production.
//!
//! A notifier makes exactly one delivery attempt per call. Retrying is the
//! pipeline's job; a notifier only has to tell a rate-limit refusal
//! ([`NotifyError::RateLimited`]) apart from any other failure.

pub mod slack;

use crate::error::NotifyError;
use crate::template::RenderedReport;
use async_trait::async_trait;

pub use slack::{DEFAULT_SLACK_API_URL, SlackIdentity, SlackNotifier};

/// Abstract notifier trait for delivering reports to a chat destination.
///
/// Implementations must be `Send + Sync` to be shared behind an `Arc`.
///
/// # Example
///
/// ```ignore
/// use usage_limit_reporter::notify::Notifier;
///
/// struct StdoutNotifier;
///
/// #[async_trait]
/// impl Notifier for StdoutNotifier {
///     fn name(&self) -> &str { "stdout" }
///     fn notifier_type(&self) -> &str { "stdout" }
///     async fn deliver(&self, destination: &str, report: &RenderedReport) -> Result<String, NotifyError> {
///         println!("{}: {:?}", destination, report.text);
///         Ok("0".to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Unique name of this notifier instance.
    fn name(&self) -> &str;

    /// Type of the notifier (e.g., "slack").
    fn notifier_type(&self) -> &str;

    /// Deliver a report to `destination` in a single attempt.
    ///
    /// The report's own parameters may redirect it (for Slack, a `channel`
    /// key overrides `destination`).
    ///
    /// # Returns
    ///
    /// * `Ok(id)` - Destination-assigned id of the delivered message
    /// * `Err(NotifyError::RateLimited)` - Destination asked to retry later
    /// * `Err(NotifyError::SendFailed)` - Any other failure
    async fn deliver(&self, destination: &str, report: &RenderedReport)
    -> Result<String, NotifyError>;
}

impl std::fmt::Debug for dyn Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("name", &self.name())
            .field("type", &self.notifier_type())
            .finish()
    }
}
