//! Usage limit lookup.
//!
//! The pipeline only sees the [`UsageLimitFetcher`] trait. The production
//! implementation, [`RedshiftServerlessFetcher`], calls the Redshift
//! Serverless `GetUsageLimit` API through the AWS SDK.

use crate::error::FetchError;
use async_trait::async_trait;
use aws_sdk_redshiftserverless::error::DisplayErrorContext;
use aws_sdk_redshiftserverless::types::{UsageLimit, UsageLimitUsageType};
use serde::{Deserialize, Serialize};

/// What a usage limit measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsageType {
    /// Compute capacity, measured in RPU hours.
    #[serde(rename = "serverless-compute")]
    ServerlessCompute,
    /// Cross-region data sharing, measured in TB.
    #[serde(rename = "cross-region-datasharing")]
    CrossRegionDatasharing,
    #[serde(rename = "unknown", other)]
    Unknown,
}

impl UsageType {
    /// Human-readable unit of the limit amount. Empty for unknown types.
    pub fn amount_unit(&self) -> &'static str {
        match self {
            UsageType::ServerlessCompute => "RPU hours",
            UsageType::CrossRegionDatasharing => "TB",
            UsageType::Unknown => "",
        }
    }
}

impl From<&UsageLimitUsageType> for UsageType {
    fn from(value: &UsageLimitUsageType) -> Self {
        match value {
            UsageLimitUsageType::ServerlessCompute => UsageType::ServerlessCompute,
            UsageLimitUsageType::CrossRegionDatasharing => UsageType::CrossRegionDatasharing,
            _ => UsageType::Unknown,
        }
    }
}

/// Current configuration of a usage limit.
///
/// Serialized with the API's field names, which is how report templates see
/// it (`UsageLimit.Amount`, `UsageLimit.Period`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UsageLimitDetails {
    pub usage_limit_id: String,
    pub usage_limit_arn: Option<String>,
    /// ARN of the workgroup the limit belongs to.
    pub resource_arn: Option<String>,
    pub amount: Option<i64>,
    pub usage_type: UsageType,
    /// `daily`, `weekly` or `monthly`.
    pub period: Option<String>,
    /// `log`, `emit-metric` or `deactivate`.
    pub breach_action: Option<String>,
}

impl UsageLimitDetails {
    /// Build details from an API response entry.
    ///
    /// `requested_id` is used when the response omits the identifier.
    pub fn from_api(limit: &UsageLimit, requested_id: &str) -> Self {
        Self {
            usage_limit_id: limit
                .usage_limit_id()
                .unwrap_or(requested_id)
                .to_string(),
            usage_limit_arn: limit.usage_limit_arn().map(str::to_string),
            resource_arn: limit.resource_arn().map(str::to_string),
            amount: limit.amount(),
            usage_type: limit
                .usage_type()
                .map(UsageType::from)
                .unwrap_or(UsageType::Unknown),
            period: limit.period().map(|p| p.as_str().to_string()),
            breach_action: limit.breach_action().map(|b| b.as_str().to_string()),
        }
    }
}

/// Source of usage limit details.
///
/// Implementations must be `Send + Sync`; the pipeline holds them behind an
/// `Arc` and calls them sequentially.
#[async_trait]
pub trait UsageLimitFetcher: Send + Sync {
    /// Look up the usage limit with the given identifier.
    async fn fetch(&self, usage_limit_id: &str) -> Result<UsageLimitDetails, FetchError>;
}

/// Fetcher backed by the Redshift Serverless API.
#[derive(Debug, Clone)]
pub struct RedshiftServerlessFetcher {
    client: aws_sdk_redshiftserverless::Client,
}

impl RedshiftServerlessFetcher {
    pub fn new(client: aws_sdk_redshiftserverless::Client) -> Self {
        Self { client }
    }

    /// Build a fetcher from a loaded AWS configuration.
    pub fn from_conf(config: &aws_config::SdkConfig) -> Self {
        Self::new(aws_sdk_redshiftserverless::Client::new(config))
    }
}

#[async_trait]
impl UsageLimitFetcher for RedshiftServerlessFetcher {
    async fn fetch(&self, usage_limit_id: &str) -> Result<UsageLimitDetails, FetchError> {
        tracing::debug!(usage_limit_id = %usage_limit_id, "Fetching usage limit");

        let output = self
            .client
            .get_usage_limit()
            .usage_limit_id(usage_limit_id)
            .send()
            .await
            .map_err(|e| FetchError::Api(DisplayErrorContext(&e).to_string()))?;

        let limit = output.usage_limit().ok_or_else(|| FetchError::NotFound {
            usage_limit_id: usage_limit_id.to_string(),
        })?;

        Ok(UsageLimitDetails::from_api(limit, usage_limit_id))
    }
}
