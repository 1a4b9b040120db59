use crate::error::SinkError;
use crate::logger::Logger;
use crate::record::Attribute;
use crate::schema;
use std::fmt;
use std::io::Write;
use thiserror::Error;

type Source = Box<dyn std::error::Error + Send + Sync>;

/// What failed before any command ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    ConfigParsing,
    LogFileOpen,
    PrivilegeDrop,
    FileAccess,
    UserInterrupted,
    RequiredArgumentMissing,
    BuildConfig,
    SystemError,
}

impl ErrorType {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorType::ConfigParsing => "config_parsing_failed",
            ErrorType::LogFileOpen => "log_file_open_failed",
            ErrorType::PrivilegeDrop => "privilege_drop_failed",
            ErrorType::FileAccess => "file_access_failed",
            ErrorType::UserInterrupted => "user_interrupted",
            ErrorType::RequiredArgumentMissing => "required_argument_missing",
            ErrorType::BuildConfig => "build_config_error",
            ErrorType::SystemError => "system_error",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure that stops a run before execution starts.
#[derive(Debug, Error)]
#[error("{kind}: {message}{} (component: {component}, run_id: {run_id})", source_suffix(.source))]
pub struct PreExecutionError {
    pub kind: ErrorType,
    pub message: String,
    pub component: String,
    pub run_id: String,
    #[source]
    pub source: Option<Source>,
}

impl PreExecutionError {
    pub fn new(
        kind: ErrorType,
        message: impl Into<String>,
        component: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            component: component.into(),
            run_id: run_id.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<Source>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Failure while commands were running. Reported but never sent as an alert.
#[derive(Debug, Error)]
#[error("{message}{}", source_suffix(.source))]
pub struct ExecutionError {
    pub message: String,
    pub component: String,
    pub run_id: String,
    pub group: Option<String>,
    pub command: Option<String>,
    #[source]
    pub source: Option<Source>,
}

impl ExecutionError {
    /// `group: g, command: c`, or empty when neither is known.
    pub fn context(&self) -> String {
        let mut parts = Vec::new();
        if let Some(group) = &self.group {
            parts.push(format!("group: {}", group));
        }
        if let Some(command) = &self.command {
            parts.push(format!("command: {}", command));
        }
        parts.join(", ")
    }
}

fn source_suffix(source: &Option<Source>) -> String {
    source.as_ref().map(|err| format!(": {}", err)).unwrap_or_default()
}

struct Report<'a> {
    kind: ErrorType,
    message: String,
    component: &'a str,
    run_id: &'a str,
    log_message: &'static str,
    message_type: &'static str,
    status: &'static str,
    notify: bool,
}

/// Report `err` to a human on `stderr`, to the log (flagged for webhook
/// delivery), and as a machine-readable `RUN_SUMMARY` line on `stdout`.
///
/// `logger` is optional because the pipeline may not exist yet. A logging
/// failure is returned after both streams have been written.
pub async fn report_pre_execution_error(
    logger: Option<&Logger>,
    err: &PreExecutionError,
    stderr: &mut (dyn Write + Send),
    stdout: &mut (dyn Write + Send),
) -> Result<(), SinkError> {
    let message = match &err.source {
        Some(source) => format!("{}: {}", err.message, source),
        None => err.message.clone(),
    };
    report(
        logger,
        Report {
            kind: err.kind,
            message,
            component: &err.component,
            run_id: &err.run_id,
            log_message: "Pre-execution error occurred",
            message_type: "pre_execution_error",
            status: "pre_execution_error",
            notify: true,
        },
        stderr,
        stdout,
    )
    .await
}

/// Same three outputs as [`report_pre_execution_error`], with
/// `status=execution_error` and no webhook alert.
pub async fn report_execution_error(
    logger: Option<&Logger>,
    err: &ExecutionError,
    stderr: &mut (dyn Write + Send),
    stdout: &mut (dyn Write + Send),
) -> Result<(), SinkError> {
    let mut message = err.to_string();
    let context = err.context();
    if !context.is_empty() {
        message = format!("{} ({})", message, context);
    }
    report(
        logger,
        Report {
            kind: ErrorType::SystemError,
            message,
            component: &err.component,
            run_id: &err.run_id,
            log_message: "Execution error occurred",
            message_type: "execution_error",
            status: "execution_error",
            notify: false,
        },
        stderr,
        stdout,
    )
    .await
}

async fn report(
    logger: Option<&Logger>,
    report: Report<'_>,
    stderr: &mut (dyn Write + Send),
    stdout: &mut (dyn Write + Send),
) -> Result<(), SinkError> {
    // Each block goes out in one write so concurrent reporters do not interleave.
    let mut block = format!("Error: {}\n", report.kind);
    if !report.component.is_empty() {
        block.push_str(&format!("  Component: {}\n", report.component));
    }
    block.push_str(&format!("  Details: {}\n", report.message));
    if !report.run_id.is_empty() {
        block.push_str(&format!("  Run ID: {}\n", report.run_id));
    }
    stderr.write_all(block.as_bytes())?;
    stderr.flush()?;

    let logged = match logger {
        Some(logger) => {
            logger
                .error(
                    report.log_message,
                    vec![
                        Attribute::new(schema::pre_exec::ERROR_TYPE, report.kind.as_str()),
                        Attribute::new(schema::pre_exec::ERROR_MESSAGE, report.message.as_str()),
                        Attribute::new(schema::pre_exec::COMPONENT, report.component),
                        Attribute::new(schema::RUN_ID, report.run_id),
                        Attribute::new(schema::NOTIFY, report.notify),
                        Attribute::new(schema::MESSAGE_TYPE, report.message_type),
                    ],
                )
                .await
        }
        None => Ok(()),
    };

    let summary = format!(
        "Error: {}\nRUN_SUMMARY run_id={} exit_code=1 status={} duration_ms=0 verified=0 skipped=0 failed=0 warnings=0 errors=1\n",
        report.kind, report.run_id, report.status
    );
    stdout.write_all(summary.as_bytes())?;
    stdout.flush()?;

    logged
}
