//! Reporter configuration and loading.

use super::secret::SecretString;
use super::validation::validate_report_template;
use crate::cli::Cli;
use crate::error::ConfigError;
use crate::pipeline::PipelineConfig;
use std::path::{Path, PathBuf};

/// Largest accepted report template file (1 MiB).
pub const MAX_TEMPLATE_SIZE: u64 = 1024 * 1024;

/// Settings for one reporter run.
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Slack bot token (never logged).
    pub slack_bot_token: SecretString,
    /// Default Slack channel for reports.
    pub slack_channel: String,
    /// Slack Web API base URL.
    pub slack_api_url: String,
    /// Custom report template source, if a template file was given.
    pub template: Option<String>,
    /// Path the custom template was loaded from.
    pub template_path: Option<PathBuf>,
    /// Retries when Slack rate limits a message.
    pub max_retries: u32,
}

impl ReporterConfig {
    /// Build the configuration from parsed command-line arguments.
    ///
    /// Missing token or channel are kept empty here and reported by
    /// [`ReporterConfig::validate`] together with any other problem.
    ///
    /// # Errors
    /// Returns `ConfigError::LoadError` if the template file cannot be read.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let template = cli
            .report_template_file
            .as_deref()
            .map(Self::load_template)
            .transpose()?;

        Ok(Self {
            slack_bot_token: cli.slack_bot_token.clone().unwrap_or_default().into(),
            slack_channel: cli.slack_channel.clone().unwrap_or_default(),
            slack_api_url: cli.slack_api_url.clone(),
            template,
            template_path: cli.report_template_file.clone(),
            max_retries: cli.send_message_max_retry,
        })
    }

    /// Read a report template file.
    ///
    /// # Errors
    /// Returns `ConfigError::LoadError` if the file is missing, larger than
    /// [`MAX_TEMPLATE_SIZE`] or not valid UTF-8.
    pub fn load_template(path: &Path) -> Result<String, ConfigError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            ConfigError::LoadError(format!("{}: {}", path.display(), e))
        })?;
        if metadata.len() > MAX_TEMPLATE_SIZE {
            return Err(ConfigError::LoadError(format!(
                "{}: template is {} bytes, limit is {} bytes",
                path.display(),
                metadata.len(),
                MAX_TEMPLATE_SIZE
            )));
        }

        let source = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadError(format!("{}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), size = source.len(), "Report template loaded");
        Ok(source)
    }

    /// Validate the configuration.
    ///
    /// Collects all errors instead of stopping at the first one.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if self.slack_bot_token.is_blank() {
            errors.push(ConfigError::ValidationError(
                "slack bot token is required (--slack-bot-token or SLACK_BOT_TOKEN)".to_string(),
            ));
        }

        if self.slack_channel.trim().is_empty() {
            errors.push(ConfigError::ValidationError(
                "slack channel is required (--slack-channel or SLACK_CHANNEL)".to_string(),
            ));
        }

        match reqwest::Url::parse(&self.slack_api_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(ConfigError::ValidationError(format!(
                "slack api url '{}' must use http or https, got '{}'",
                self.slack_api_url,
                url.scheme()
            ))),
            Err(e) => errors.push(ConfigError::ValidationError(format!(
                "invalid slack api url '{}': {}",
                self.slack_api_url, e
            ))),
        }

        if let Some(source) = &self.template
            && let Err(message) = validate_report_template(source)
        {
            errors.push(ConfigError::InvalidTemplate {
                source_name: self.template_source_name(),
                message,
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Human-readable name of the report template in use.
    pub fn template_source_name(&self) -> String {
        match (&self.template, &self.template_path) {
            (None, _) => "built-in".to_string(),
            (Some(_), Some(path)) => path.display().to_string(),
            (Some(_), None) => "inline".to_string(),
        }
    }

    /// Settings handed to the report pipeline.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            destination: self.slack_channel.clone(),
            max_retries: self.max_retries,
            template: self.template.clone(),
        }
    }
}
