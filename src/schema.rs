//! Attribute keys shared by the code that emits alert-worthy records and the
//! alert builders that read them back.

use crate::record::{Attribute, Value};

/// Boolean flag that makes a record eligible for webhook delivery.
pub const NOTIFY: &str = "slack_notify";
/// Selects the alert builder; see [`MessageType`](crate::alert_message::MessageType).
pub const MESSAGE_TYPE: &str = "message_type";

pub const RUN_ID: &str = "run_id";
pub const HOSTNAME: &str = "hostname";
pub const PID: &str = "pid";
pub const SCHEMA_VERSION: &str = "schema_version";

/// Version stamped on every line of the JSON log.
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

pub mod group_summary {
    pub const STATUS: &str = "status";
    pub const GROUP: &str = "group";
    /// Integer milliseconds.
    pub const DURATION_MS: &str = "duration_ms";
    /// Group produced by [`command_results_value`](super::command_results_value).
    pub const COMMANDS: &str = "commands";
}

pub mod pre_exec {
    pub const ERROR_TYPE: &str = "error_type";
    pub const ERROR_MESSAGE: &str = "error_message";
    pub const COMPONENT: &str = "component";
}

pub mod security_alert {
    pub const EVENT_TYPE: &str = "event_type";
    /// `critical`, `high`, `medium` or `low`.
    pub const SEVERITY: &str = "severity";
    pub const MESSAGE: &str = "message";

    pub const SEVERITY_CRITICAL: &str = "critical";
    pub const SEVERITY_HIGH: &str = "high";
}

pub mod privileged_failure {
    pub const COMMAND_NAME: &str = "command_name";
    pub const COMMAND_PATH: &str = "command_path";
    pub const STDERR: &str = "stderr";
    pub const EXIT_CODE: &str = "exit_code";
}

pub mod escalation_failure {
    pub const OPERATION: &str = "operation";
    pub const COMMAND_NAME: &str = "command_name";
    pub const ORIGINAL_UID: &str = "original_uid";
    pub const TARGET_UID: &str = "target_uid";
}

/// Keys inside one command entry.
pub mod command {
    pub const NAME: &str = "name";
    pub const EXIT_CODE: &str = "exit_code";
    pub const OUTPUT: &str = "output";
    pub const STDERR: &str = "stderr";
}

/// Upper bound on command entries carried by one record.
pub const MAX_LOGGED_COMMANDS: usize = 100;

const TOTAL_COUNT: &str = "total_count";
const TRUNCATED: &str = "truncated";
const ENTRY_PREFIX: &str = "cmd_";

/// Outcome of one command, as logged in a group summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub name: String,
    pub exit_code: i64,
    pub output: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn to_attrs(&self) -> Vec<Attribute> {
        vec![
            Attribute::new(command::NAME, self.name.as_str()),
            Attribute::new(command::EXIT_CODE, self.exit_code),
            Attribute::new(command::OUTPUT, self.output.as_str()),
            Attribute::new(command::STDERR, self.stderr.as_str()),
        ]
    }

    /// Missing keys fall back to empty strings and exit code 0.
    pub fn from_attrs(attrs: &[Attribute]) -> Self {
        let mut result = CommandResult::default();
        for attr in attrs {
            match attr.key.as_str() {
                command::NAME => result.name = attr.value.to_string(),
                command::EXIT_CODE => result.exit_code = attr.value.as_i64().unwrap_or_default(),
                command::OUTPUT => result.output = attr.value.to_string(),
                command::STDERR => result.stderr = attr.value.to_string(),
                _ => {}
            }
        }
        result
    }
}

/// Encode results as a group: `total_count`, `truncated`, then at most
/// [`MAX_LOGGED_COMMANDS`] entries named `cmd_0`, `cmd_1`, ...
pub fn command_results_value(results: &[CommandResult]) -> Value {
    let logged = &results[..results.len().min(MAX_LOGGED_COMMANDS)];
    let mut attrs = Vec::with_capacity(logged.len() + 2);
    attrs.push(Attribute::new(TOTAL_COUNT, results.len() as i64));
    attrs.push(Attribute::new(TRUNCATED, results.len() > MAX_LOGGED_COMMANDS));
    attrs.extend(
        logged
            .iter()
            .enumerate()
            .map(|(i, result)| Attribute::group(format!("{}{}", ENTRY_PREFIX, i), result.to_attrs())),
    );
    Value::Group(attrs)
}

/// Inverse of [`command_results_value`]. Non-group values yield nothing.
pub fn extract_command_results(value: &Value) -> Vec<CommandResult> {
    let Some(attrs) = value.as_group() else {
        return Vec::new();
    };
    attrs
        .iter()
        .filter(|attr| attr.key.starts_with(ENTRY_PREFIX))
        .filter_map(|attr| attr.value.as_group())
        .map(CommandResult::from_attrs)
        .collect()
}
