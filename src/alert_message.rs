//! Chat-webhook payloads built from alert-worthy records.
//!
//! Wire shape: `{"text": "...", "attachments": [{"color": "danger", "fields": [{"title", "value", "short"}]}]}`.

use crate::record::{format_duration, LogRecord, Value};
use crate::schema::{self, CommandResult};
use serde::Serialize;
use std::time::Duration;

pub const OUTPUT_MAX_LEN: usize = 1000;
pub const STDERR_MAX_LEN: usize = 500;
pub const TRUNCATION_SUFFIX: &str = "...";

const EMOJI_SUCCESS: &str = "✅";
const EMOJI_FAILURE: &str = "❌";
const EMOJI_WARNING: &str = "⚠️";
const EMOJI_ALERT: &str = "🚨";
const ARROW_INDENT: &str = "  ↳";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertMessage {
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub color: AlertColor,
    pub fields: Vec<AttachmentField>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertColor {
    Good,
    Warning,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentField {
    pub title: String,
    pub value: String,
    pub short: bool,
}

impl AttachmentField {
    fn new(title: impl Into<String>, value: impl Into<String>, short: bool) -> Self {
        Self { title: title.into(), value: value.into(), short }
    }
}

/// Builder selected by the record's `message_type` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    CommandGroupSummary,
    PreExecutionError,
    SecurityAlert,
    PrivilegedCommandFailure,
    PrivilegeEscalationFailure,
    /// Anything else: one line, no attachments.
    Generic,
}

impl MessageType {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "command_group_summary" => MessageType::CommandGroupSummary,
            "pre_execution_error" => MessageType::PreExecutionError,
            "security_alert" => MessageType::SecurityAlert,
            "privileged_command_failure" => MessageType::PrivilegedCommandFailure,
            "privilege_escalation_failure" => MessageType::PrivilegeEscalationFailure,
            _ => MessageType::Generic,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::CommandGroupSummary => "command_group_summary",
            MessageType::PreExecutionError => "pre_execution_error",
            MessageType::SecurityAlert => "security_alert",
            MessageType::PrivilegedCommandFailure => "privileged_command_failure",
            MessageType::PrivilegeEscalationFailure => "privilege_escalation_failure",
            MessageType::Generic => "generic",
        }
    }
}

/// Values that come from the sink rather than the record.
#[derive(Debug, Clone, Copy)]
pub struct AlertContext<'a> {
    pub run_id: &'a str,
    pub hostname: &'a str,
}

pub fn build_message(kind: MessageType, record: &LogRecord, ctx: AlertContext<'_>) -> AlertMessage {
    match kind {
        MessageType::CommandGroupSummary => command_group_summary(record, ctx),
        MessageType::PreExecutionError => pre_execution_error(record, ctx),
        MessageType::SecurityAlert => security_alert(record, ctx),
        MessageType::PrivilegedCommandFailure => privileged_command_failure(record, ctx),
        MessageType::PrivilegeEscalationFailure => privilege_escalation_failure(record, ctx),
        MessageType::Generic => AlertMessage {
            text: format!("{}: {} (Run ID: {})", record.level, record.message, ctx.run_id),
            attachments: Vec::new(),
        },
    }
}

/// Cut `text` to at most `max` bytes including [`TRUNCATION_SUFFIX`],
/// never splitting a character.
pub fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut cut = max.saturating_sub(TRUNCATION_SUFFIX.len());
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &text[..cut], TRUNCATION_SUFFIX)
}

fn text_attr(record: &LogRecord, key: &str) -> String {
    record.find_scoped(key).map(Value::to_string).unwrap_or_default()
}

fn int_attr(record: &LogRecord, key: &str) -> i64 {
    record.find_scoped(key).and_then(Value::as_i64).unwrap_or_default()
}

fn code_block(text: &str) -> String {
    format!("```\n{}\n```", text)
}

fn single_attachment(text: String, color: AlertColor, fields: Vec<AttachmentField>) -> AlertMessage {
    AlertMessage { text, attachments: vec![Attachment { color, fields }] }
}

fn command_group_summary(record: &LogRecord, ctx: AlertContext<'_>) -> AlertMessage {
    use schema::group_summary as keys;

    let status = text_attr(record, keys::STATUS);
    let group = text_attr(record, keys::GROUP);
    let duration = Duration::from_millis(u64::try_from(int_attr(record, keys::DURATION_MS)).unwrap_or(0));
    let commands: Vec<CommandResult> = record
        .find_scoped(keys::COMMANDS)
        .map(schema::extract_command_results)
        .unwrap_or_default();

    let (color, icon) = match status.as_str() {
        "success" => (AlertColor::Good, EMOJI_SUCCESS),
        "error" => (AlertColor::Danger, EMOJI_FAILURE),
        _ => (AlertColor::Warning, EMOJI_WARNING),
    };

    let mut fields = vec![
        AttachmentField::new("Command Count", commands.len().to_string(), true),
        AttachmentField::new("Duration", format_duration(duration), true),
        AttachmentField::new("Run ID", ctx.run_id, true),
    ];

    for cmd in &commands {
        let icon = if cmd.exit_code == 0 { EMOJI_SUCCESS } else { EMOJI_FAILURE };
        fields.push(AttachmentField::new(
            "Command",
            format!("{} `{}` (exit: {})", icon, cmd.name, cmd.exit_code),
            false,
        ));
        if !cmd.output.is_empty() {
            fields.push(AttachmentField::new(
                format!("{} Output", ARROW_INDENT),
                code_block(&truncate(&cmd.output, OUTPUT_MAX_LEN)),
                false,
            ));
        }
        if !cmd.stderr.is_empty() && cmd.exit_code != 0 {
            fields.push(AttachmentField::new(
                format!("{} Error", ARROW_INDENT),
                code_block(&truncate(&cmd.stderr, STDERR_MAX_LEN)),
                false,
            ));
        }
    }

    single_attachment(format!("{} {} {}", icon, status.to_uppercase(), group), color, fields)
}

fn pre_execution_error(record: &LogRecord, ctx: AlertContext<'_>) -> AlertMessage {
    use schema::pre_exec as keys;

    single_attachment(
        format!("{} Error: {}", EMOJI_ALERT, text_attr(record, keys::ERROR_TYPE)),
        AlertColor::Danger,
        vec![
            AttachmentField::new("Error Message", text_attr(record, keys::ERROR_MESSAGE), false),
            AttachmentField::new("Component", text_attr(record, keys::COMPONENT), true),
            AttachmentField::new("Hostname", ctx.hostname, true),
            AttachmentField::new("Run ID", ctx.run_id, true),
        ],
    )
}

fn security_alert(record: &LogRecord, ctx: AlertContext<'_>) -> AlertMessage {
    use schema::security_alert as keys;

    let event_type = text_attr(record, keys::EVENT_TYPE);
    let severity = text_attr(record, keys::SEVERITY);
    let color = match severity.as_str() {
        keys::SEVERITY_HIGH => AlertColor::Warning,
        _ => AlertColor::Danger,
    };

    single_attachment(
        format!("{} Security Alert: {}", EMOJI_ALERT, event_type),
        color,
        vec![
            AttachmentField::new("Severity", severity.to_uppercase(), true),
            AttachmentField::new("Event Type", event_type, true),
            AttachmentField::new("Details", text_attr(record, keys::MESSAGE), false),
            AttachmentField::new("Hostname", ctx.hostname, true),
            AttachmentField::new("Run ID", ctx.run_id, true),
        ],
    )
}

fn privileged_command_failure(record: &LogRecord, ctx: AlertContext<'_>) -> AlertMessage {
    use schema::privileged_failure as keys;

    let stderr = truncate(&text_attr(record, keys::STDERR), STDERR_MAX_LEN);
    single_attachment(
        format!(
            "{} Privileged Command Failed: {}",
            EMOJI_FAILURE,
            text_attr(record, keys::COMMAND_NAME)
        ),
        AlertColor::Danger,
        vec![
            AttachmentField::new("Command", format!("`{}`", text_attr(record, keys::COMMAND_PATH)), false),
            AttachmentField::new("Exit Code", int_attr(record, keys::EXIT_CODE).to_string(), true),
            AttachmentField::new("Hostname", ctx.hostname, true),
            AttachmentField::new("Error Output", code_block(&stderr), false),
            AttachmentField::new("Run ID", ctx.run_id, true),
        ],
    )
}

fn privilege_escalation_failure(record: &LogRecord, ctx: AlertContext<'_>) -> AlertMessage {
    use schema::escalation_failure as keys;

    let operation = text_attr(record, keys::OPERATION);
    single_attachment(
        format!("{} Privilege Escalation Failed: {}", EMOJI_WARNING, operation),
        AlertColor::Warning,
        vec![
            AttachmentField::new("Operation", operation, true),
            AttachmentField::new("Command", text_attr(record, keys::COMMAND_NAME), true),
            AttachmentField::new("From UID", int_attr(record, keys::ORIGINAL_UID).to_string(), true),
            AttachmentField::new("To UID", int_attr(record, keys::TARGET_UID).to_string(), true),
            AttachmentField::new("Hostname", ctx.hostname, true),
            AttachmentField::new("Run ID", ctx.run_id, true),
        ],
    )
}
