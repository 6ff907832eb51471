//! usage-limit-reporter - Redshift Serverless usage limit alarms to Slack.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use usage_limit_reporter::cli::{Cli, LogFormat};
use usage_limit_reporter::config::ReporterConfig;
use usage_limit_reporter::{
    RedshiftServerlessFetcher, ReportOutcome, ReportPipeline, SlackNotifier,
    register_metric_descriptions,
};

/// Initialize the tracing subscriber with the specified log format.
///
/// - `LogFormat::Text`: Human-readable format
/// - `LogFormat::Json`: Structured JSON format for log aggregation
fn init_logging(format: LogFormat, level: tracing::Level) {
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    match format {
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .flatten_event(true)
                .with_env_filter(filter)
                .init();
        }
    }
}

/// Read the alarm payload from the configured file or stdin.
fn read_payload(cli: &Cli) -> Result<Vec<u8>> {
    if cli.payload_from_stdin() {
        let mut raw = Vec::new();
        std::io::stdin()
            .read_to_end(&mut raw)
            .context("failed to read payload from stdin")?;
        Ok(raw)
    } else {
        std::fs::read(&cli.payload)
            .with_context(|| format!("failed to read payload from {}", cli.payload.display()))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_format, cli.log_level);
    register_metric_descriptions();

    let config = match ReporterConfig::from_cli(&cli) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    // Fail fast before touching any alarm
    if let Err(errors) = config.validate() {
        for e in &errors {
            error!(error = %e, "Configuration validation error");
        }
        error!(
            error_count = errors.len(),
            "Configuration validation failed"
        );
        std::process::exit(1);
    }

    if cli.validate {
        println!("Configuration is valid");
        println!("  Slack API URL: {}", config.slack_api_url);
        println!("  Slack channel: {}", config.slack_channel);
        println!("  Report template: {}", config.template_source_name());
        println!("  Max retries: {}", config.max_retries);
        return Ok(());
    }

    let raw = read_payload(&cli)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run(config, raw))
}

/// Main async entry point.
async fn run(config: ReporterConfig, raw: Vec<u8>) -> Result<()> {
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let notifier = SlackNotifier::new(
        "slack".to_string(),
        &config.slack_api_url,
        config.slack_bot_token.clone(),
        http_client,
    );
    notifier
        .auth_test()
        .await
        .context("failed to initialize slack client")?;

    let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .load()
        .await;
    let fetcher = RedshiftServerlessFetcher::from_conf(&aws_config);

    let pipeline = ReportPipeline::new(
        Arc::new(fetcher),
        Arc::new(notifier),
        config.pipeline_config(),
    );

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c signal");
            return;
        }
        warn!("Received shutdown signal, cancelling remaining work");
        cancel_clone.cancel();
    });

    info!(payload_size = raw.len(), "Processing alarm payload");

    match pipeline.handle(&raw, &cancel).await {
        Ok(outcomes) => {
            let delivered = outcomes
                .iter()
                .filter(|o| matches!(o, ReportOutcome::Delivered { .. }))
                .count();
            info!(
                events = outcomes.len(),
                delivered = delivered,
                skipped = outcomes.len() - delivered,
                "All alarm events processed"
            );
            Ok(())
        }
        Err(e) => {
            for failure in &e.failures {
                error!(
                    index = failure.index,
                    sns_message_id = failure.message_id.as_deref().unwrap_or(""),
                    stage = failure.error.stage(),
                    error = %failure.error,
                    "Alarm event failed"
                );
            }
            error!(
                events = e.total,
                failed = e.failures.len(),
                "Alarm processing finished with errors"
            );
            Err(e.into())
        }
    }
}
