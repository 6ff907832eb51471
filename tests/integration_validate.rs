//! Integration tests for the --validate CLI mode.

use std::path::PathBuf;
use std::process::{Command, Output};

const ENV_VARS: [&str; 6] = [
    "SLACK_BOT_TOKEN",
    "SLACK_CHANNEL",
    "SLACK_API_URL",
    "REPORT_TEMPLATE_FILE",
    "SEND_MESSAGE_MAX_RETRY",
    "PAYLOAD_FILE",
];

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn run_reporter(args: &[&str], envs: &[(&str, &str)]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_usage-limit-reporter"));
    for var in ENV_VARS {
        command.env_remove(var);
    }
    command
        .args(args)
        .envs(envs.iter().copied())
        .output()
        .expect("Failed to run usage-limit-reporter")
}

#[test]
fn validate_valid_config_exits_success() {
    let output = run_reporter(
        &["--validate", "--slack-bot-token", "xoxb-test", "--slack-channel", "C0123"],
        &[],
    );

    assert!(
        output.status.success(),
        "--validate should exit with code 0 for valid config\nstderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Configuration is valid"), "{}", stdout);
    assert!(stdout.contains("Slack channel: C0123"), "{}", stdout);
    assert!(stdout.contains("Report template: built-in"), "{}", stdout);
    assert!(stdout.contains("Max retries: 3"), "{}", stdout);
    assert!(!stdout.contains("xoxb-test"), "token must not be printed");
}

#[test]
fn validate_reads_environment() {
    let template = fixture_path("custom_report.json.j2");
    let output = run_reporter(
        &["--validate"],
        &[
            ("SLACK_BOT_TOKEN", "xoxb-env"),
            ("SLACK_CHANNEL", "C-ENV"),
            ("SEND_MESSAGE_MAX_RETRY", "5"),
            ("REPORT_TEMPLATE_FILE", template.to_str().unwrap()),
        ],
    );

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Slack channel: C-ENV"), "{}", stdout);
    assert!(stdout.contains("custom_report.json.j2"), "{}", stdout);
    assert!(stdout.contains("Max retries: 5"), "{}", stdout);
}

#[test]
fn validate_missing_settings_exits_failure() {
    let output = run_reporter(&["--validate"], &[]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("slack bot token is required"), "{}", stderr);
    assert!(stderr.contains("slack channel is required"), "{}", stderr);
}

#[test]
fn validate_broken_template_exits_failure() {
    let template = fixture_path("broken_report.json.j2");
    let output = run_reporter(
        &[
            "--validate",
            "--slack-bot-token",
            "xoxb-test",
            "--slack-channel",
            "C0123",
            "--report-template-file",
            template.to_str().unwrap(),
        ],
        &[],
    );

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("broken_report.json.j2"), "{}", stderr);
}

#[test]
fn validate_missing_template_file_exits_failure() {
    let output = run_reporter(
        &[
            "--validate",
            "--slack-bot-token",
            "xoxb-test",
            "--slack-channel",
            "C0123",
            "--report-template-file",
            "/nonexistent/report.json.j2",
        ],
        &[],
    );

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to load configuration"), "{}", stderr);
}
