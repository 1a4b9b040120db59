use async_trait::async_trait;
use parking_lot::Mutex;
use secure_log_sink::capabilities::{Capabilities, StaticCapabilities};
use secure_log_sink::error::DeliveryError;
use secure_log_sink::init::build_pipeline_with_transport;
use secure_log_sink::pre_exec::{report_pre_execution_error, ErrorType, PreExecutionError};
use secure_log_sink::schema::{command_results_value, CommandResult};
use secure_log_sink::webhook::WebhookTransport;
use secure_log_sink::{build_pipeline, Attribute, PipelineConfig, PipelineWriters, SharedWriter};
use std::sync::Arc;
use url::Url;

type Buffer = Arc<Mutex<Vec<u8>>>;

fn buffer() -> Buffer {
    Arc::new(Mutex::new(Vec::new()))
}

fn text(buf: &Buffer) -> String {
    String::from_utf8(buf.lock().clone()).unwrap()
}

fn writer(buf: &Buffer) -> Option<SharedWriter> {
    Some(buf.clone())
}

/// Accepts every POST and keeps the decoded bodies.
#[derive(Default)]
struct RecordingTransport {
    bodies: Mutex<Vec<serde_json::Value>>,
}

#[async_trait]
impl WebhookTransport for RecordingTransport {
    async fn post_json(&self, _url: &Url, body: &[u8]) -> Result<u16, DeliveryError> {
        self.bodies.lock().push(serde_json::from_slice(body).unwrap());
        Ok(200)
    }
}

#[tokio::test]
async fn redirected_run_writes_file_and_text_and_alerts() {
    let (file, output, console) = (buffer(), buffer(), buffer());
    let transport = Arc::new(RecordingTransport::default());
    let caps: Arc<dyn Capabilities> = Arc::new(StaticCapabilities::non_interactive());
    let config = PipelineConfig {
        run_id: "run-123".into(),
        webhook_url: Some("https://hooks.example.com/services/T/B/X".into()),
        ..Default::default()
    };
    let writers = PipelineWriters { log_file: writer(&file), console: writer(&console), output: writer(&output) };

    let pipeline = build_pipeline_with_transport(config, caps, writers, Some(transport.clone())).unwrap();
    let logger = pipeline.logger.with_scope("runner");

    logger
        .info(
            "group finished",
            vec![
                Attribute::new("slack_notify", true),
                Attribute::new("message_type", "command_group_summary"),
                Attribute::new("status", "success"),
                Attribute::new("group", "deploy"),
                Attribute::new("duration_ms", 2000i64),
                Attribute::new(
                    "commands",
                    command_results_value(&[CommandResult {
                        name: "push".into(),
                        exit_code: 0,
                        output: "pushed with token abc".into(),
                        stderr: String::new(),
                    }]),
                ),
                Attribute::new("db_password", "hunter2"),
            ],
        )
        .await
        .unwrap();

    // File: one JSON line with enrichment, scope prefix and redaction applied.
    let file_text = text(&file);
    assert_eq!(pipeline.line_tracker.current(), 1);
    let line: serde_json::Value = serde_json::from_str(file_text.lines().next().unwrap()).unwrap();
    assert_eq!(line["run_id"], "run-123");
    assert_eq!(line["schema_version"], 1);
    assert_eq!(line["runner.group"], "deploy");
    assert_eq!(line["runner.db_password"], "***");
    assert_eq!(line["runner.commands"]["cmd_0"]["output"], "***");
    assert!(!file_text.contains("hunter2"));

    // Text sink is the only console output when redirected.
    let out = text(&output);
    assert!(out.contains("msg=\"group finished\""));
    assert!(out.contains("runner.db_password=***"));
    assert!(text(&console).is_empty());

    // Alert: summary layout, secrets never leave the process.
    let bodies = transport.bodies.lock();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["text"], "✅ SUCCESS deploy");
    assert_eq!(bodies[0]["attachments"][0]["color"], "good");
    assert!(!bodies[0].to_string().contains("abc"));
}

#[tokio::test]
async fn interactive_run_points_hints_at_file_lines() {
    let (file, output, console) = (buffer(), buffer(), buffer());
    let caps: Arc<dyn Capabilities> = Arc::new(StaticCapabilities::interactive(false));
    let writers = PipelineWriters { log_file: writer(&file), console: writer(&console), output: writer(&output) };

    let pipeline = build_pipeline(PipelineConfig::default(), caps, writers).unwrap();
    let logger = pipeline.logger;

    logger.info("starting", Vec::new()).await.unwrap();
    logger.debug("not shown", Vec::new()).await.unwrap();
    logger
        .error(
            "command failed",
            vec![Attribute::new("error", "exit status 2"), Attribute::new("component", "runner")],
        )
        .await
        .unwrap();

    assert_eq!(text(&file).lines().count(), 2);
    let console_text = text(&console);
    let lines: Vec<&str> = console_text.lines().collect();
    assert_eq!(lines.len(), 3);
    // `YYYY-MM-DD HH:MM:SS ` precedes every record line.
    assert_eq!(&lines[0][20..], "[INFO ] starting");
    assert_eq!(&lines[1][20..], "[ERROR] command failed error=exit status 2 component=runner");
    assert_eq!(lines[2], "HINT: Check log file around line 2 for more details");
    assert!(text(&output).is_empty());
}

#[tokio::test]
async fn pre_execution_errors_reach_every_output() {
    let (file, output) = (buffer(), buffer());
    let transport = Arc::new(RecordingTransport::default());
    let caps: Arc<dyn Capabilities> = Arc::new(StaticCapabilities::non_interactive());
    let config = PipelineConfig {
        run_id: "run-5".into(),
        webhook_url: Some("https://hooks.example.com/x".into()),
        ..Default::default()
    };
    let writers = PipelineWriters { log_file: writer(&file), output: writer(&output), ..Default::default() };
    let pipeline = build_pipeline_with_transport(config, caps, writers, Some(transport.clone())).unwrap();

    let err = PreExecutionError::new(ErrorType::FileAccess, "cannot read /etc/runner.toml", "config", "run-5");
    let (mut stderr, mut stdout) = (Vec::new(), Vec::new());
    report_pre_execution_error(Some(&pipeline.logger), &err, &mut stderr, &mut stdout)
        .await
        .unwrap();

    assert!(String::from_utf8(stdout).unwrap().contains("RUN_SUMMARY run_id=run-5 exit_code=1"));
    assert!(String::from_utf8(stderr).unwrap().starts_with("Error: file_access_failed\n"));
    assert!(text(&file).contains("\"error_type\":\"file_access_failed\""));

    let bodies = transport.bodies.lock();
    assert_eq!(bodies[0]["text"], "🚨 Error: file_access_failed");
    assert_eq!(bodies[0]["attachments"][0]["fields"][1]["value"], "config");
}
