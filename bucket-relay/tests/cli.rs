use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::write;
use tempfile::NamedTempFile;

/// Creates a minimal config file for the CLI to read.
fn create_minimal_config() -> NamedTempFile {
    let config = NamedTempFile::new().expect("Creating temp config file failed");
    write(
        config.path(),
        b"target: \"@relay_channel\"\nbucket: media\nfolders:\n  - alpha\n  - beta\ncategories:\n  alpha: \"#cat\"\n",
    )
    .expect("Writing temp config failed");
    config
}

#[test]
fn validate_succeeds_with_valid_config_and_env() {
    let config = create_minimal_config();
    let mut cmd = Command::cargo_bin("bucket-relay").expect("Binary exists");

    cmd.arg("validate")
        .arg("--config")
        .arg(config.path())
        .env("TELEGRAM_BOT_TOKEN", "123:abc")
        .env("GCS_ACCESS_TOKEN", "ya29.token");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Configuration valid: 2 folder(s)"));
}

#[test]
fn run_refuses_to_start_without_credentials() {
    let config = create_minimal_config();
    let ledger_dir = tempfile::tempdir().expect("temp dir");
    let mut cmd = Command::cargo_bin("bucket-relay").expect("Binary exists");

    cmd.current_dir(ledger_dir.path())
        .arg("run")
        .arg("--config")
        .arg(config.path())
        .env_remove("TELEGRAM_BOT_TOKEN")
        .env_remove("GCS_ACCESS_TOKEN");

    cmd.assert().failure();
    assert!(
        !ledger_dir.path().join("sent_files.txt").exists(),
        "no ledger may be touched before startup validation passes"
    );
}

#[test]
fn validate_fails_for_missing_config_file() {
    let mut cmd = Command::cargo_bin("bucket-relay").expect("Binary exists");
    cmd.arg("validate")
        .arg("--config")
        .arg("does-not-exist.yaml")
        .env("TELEGRAM_BOT_TOKEN", "123:abc")
        .env("GCS_ACCESS_TOKEN", "ya29.token");

    cmd.assert().failure();
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        use std::fmt::Write as FmtWrite;
        let mut msg = String::new();
        let _ = write!(&mut msg, "{:?}", event);
        self.events.lock().unwrap().push(msg);
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use bucket_relay::cli::{run, Cli, Commands};

    let cli = Cli {
        command: Commands::Validate {
            config: std::path::PathBuf::from("dummy.yaml"),
        },
    };

    let _ = run(cli).await;

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
