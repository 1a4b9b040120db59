use crate::record::{key_matches, Attribute, Level, LogRecord};

/// Renders records for human-facing output.
pub trait MessageFormatter: Send + Sync {
    /// `<timestamp> <level-tag> <message> [k=v ...]` with every attribute.
    fn format_full(&self, record: &LogRecord, use_color: bool) -> String;

    /// Level tag and message plus a few attributes worth reading on a console.
    fn format_interactive(&self, record: &LogRecord, use_color: bool) -> String;

    /// Pointer into the log file; empty for non-positive line numbers.
    fn format_hint(&self, line: i64, use_color: bool) -> String;
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const MAX_INTERACTIVE_ATTRS: usize = 3;

// Bookkeeping keys that add nothing on a console.
const SKIP_KEYS: &[&str] = &[
    "time",
    "level",
    "msg",
    "run_id",
    "hostname",
    "pid",
    "schema_version",
    "duration_ms",
    "verified_files",
    "skipped_files",
    "total_files",
    "interactive_mode",
    "color_support",
    "slack_enabled",
];

mod ansi {
    pub const GRAY: &str = "90";
    pub const RED: &str = "31";
    pub const GREEN: &str = "32";
    pub const YELLOW: &str = "33";
    pub const CYAN: &str = "36";

    pub fn paint(code: &str, text: &str) -> String {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    }
}

/// Plain-symbol formatter; ANSI color only when asked for.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMessageFormatter;

impl DefaultMessageFormatter {
    pub fn new() -> Self {
        Self
    }

    fn level_tag(&self, level: Level, use_color: bool) -> String {
        if use_color {
            match level {
                Level::DEBUG => ansi::paint(ansi::GRAY, "* DEBUG"),
                Level::INFO => ansi::paint(ansi::GREEN, "+ INFO "),
                Level::WARN => ansi::paint(ansi::YELLOW, "! WARN "),
                Level::ERROR => ansi::paint(ansi::RED, "X ERROR"),
                other => ansi::paint(ansi::GRAY, &format!("> {}", other)),
            }
        } else {
            match level {
                Level::DEBUG => "[DEBUG]".to_string(),
                Level::INFO => "[INFO ]".to_string(),
                Level::WARN => "[WARN ]".to_string(),
                Level::ERROR => "[ERROR]".to_string(),
                other => format!("[{}]", other.to_string().to_uppercase()),
            }
        }
    }

    /// stderr joins the list from WARN up, stdout only at DEBUG.
    fn priority_keys(level: Level) -> Vec<&'static str> {
        let mut keys = vec!["error"];
        if level >= Level::WARN {
            keys.push("stderr");
        }
        keys.extend(["group", "command", "file", "component", "variable"]);
        if level == Level::DEBUG {
            keys.push("stdout");
        }
        keys
    }

    fn interactive_attrs<'a>(&self, record: &'a LogRecord) -> Vec<&'a Attribute> {
        let mut found: Vec<&Attribute> = Self::priority_keys(record.level)
            .into_iter()
            .filter_map(|wanted| record.attrs.iter().find(|attr| key_matches(&attr.key, wanted)))
            .collect();

        if found.is_empty() {
            found = record
                .attrs
                .iter()
                .filter(|attr| !SKIP_KEYS.contains(&attr.key.as_str()))
                .take(MAX_INTERACTIVE_ATTRS)
                .collect();
        }
        found
    }
}

fn push_attrs<'a>(out: &mut String, attrs: impl IntoIterator<Item = &'a Attribute>) {
    for (i, attr) in attrs.into_iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&attr.key);
        out.push('=');
        out.push_str(&attr.value.to_string());
    }
}

impl MessageFormatter for DefaultMessageFormatter {
    fn format_full(&self, record: &LogRecord, use_color: bool) -> String {
        let mut out = record.timestamp.format(TIMESTAMP_FORMAT).to_string();
        out.push(' ');
        out.push_str(&self.level_tag(record.level, use_color));
        out.push(' ');
        out.push_str(&record.message);
        if !record.attrs.is_empty() {
            out.push(' ');
            push_attrs(&mut out, &record.attrs);
        }
        out
    }

    fn format_interactive(&self, record: &LogRecord, use_color: bool) -> String {
        let mut out = self.level_tag(record.level, use_color);
        out.push(' ');
        out.push_str(&record.message);
        let attrs = self.interactive_attrs(record);
        if !attrs.is_empty() {
            out.push(' ');
            push_attrs(&mut out, attrs);
        }
        out
    }

    fn format_hint(&self, line: i64, use_color: bool) -> String {
        if line <= 0 {
            return String::new();
        }
        let marker = if use_color { ansi::paint(ansi::CYAN, "* ") } else { "HINT: ".to_string() };
        format!("{}Check log file around line {} for more details", marker, line)
    }
}
