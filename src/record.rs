use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;
use std::time::Duration;

/// Severity of a [`LogRecord`].
///
/// Levels are plain integers so callers can define custom severities
/// between or above the four named ones. Ordering follows the integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Level(i32);

impl Level {
    pub const DEBUG: Level = Level(-4);
    pub const INFO: Level = Level(0);
    pub const WARN: Level = Level(4);
    pub const ERROR: Level = Level(8);

    pub const fn new(value: i32) -> Self {
        Level(value)
    }

    pub const fn value(self) -> i32 {
        self.0
    }

    /// Parse one of the named levels, case-insensitively.
    pub fn parse(name: &str) -> Option<Level> {
        match name.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(Level::DEBUG),
            "info" => Some(Level::INFO),
            "warn" | "warning" => Some(Level::WARN),
            "error" => Some(Level::ERROR),
            _ => None,
        }
    }

    /// True for the four levels that have a fixed name.
    pub fn is_named(self) -> bool {
        matches!(self, Level::DEBUG | Level::INFO | Level::WARN | Level::ERROR)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (base, name) = if self.0 < Level::INFO.0 {
            (Level::DEBUG.0, "DEBUG")
        } else if self.0 < Level::WARN.0 {
            (Level::INFO.0, "INFO")
        } else if self.0 < Level::ERROR.0 {
            (Level::WARN.0, "WARN")
        } else {
            (Level::ERROR.0, "ERROR")
        };
        let offset = self.0 - base;
        if offset == 0 {
            f.write_str(name)
        } else {
            write!(f, "{}{:+}", name, offset)
        }
    }
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level(Level::DEBUG.0 - 4),
            tracing::Level::DEBUG => Level::DEBUG,
            tracing::Level::INFO => Level::INFO,
            tracing::Level::WARN => Level::WARN,
            tracing::Level::ERROR => Level::ERROR,
        }
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Typed attribute value. `Group` nests further attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Duration(Duration),
    Time(DateTime<Utc>),
    Group(Vec<Attribute>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&[Attribute]> {
        match self {
            Value::Group(attrs) => Some(attrs),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Duration(d) => f.write_str(&format_duration(*d)),
            Value::Time(t) => f.write_str(&t.to_rfc3339_opts(SecondsFormat::Secs, true)),
            Value::Group(attrs) => {
                f.write_str("{")?;
                for (i, attr) in attrs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}={}", attr.key, attr.value)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::String(s) => serializer.serialize_str(s),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Duration(d) => {
                serializer.serialize_u64(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            }
            Value::Time(t) => serializer.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Nanos, true)),
            Value::Group(attrs) => {
                let mut map = serializer.serialize_map(Some(attrs.len()))?;
                for attr in attrs {
                    map.serialize_entry(&attr.key, &attr.value)?;
                }
                map.end()
            }
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Duration> for Value {
    fn from(v: Duration) -> Self {
        Value::Duration(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Time(v)
    }
}

impl From<Vec<Attribute>> for Value {
    fn from(v: Vec<Attribute>) -> Self {
        Value::Group(v)
    }
}

/// A key and its typed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub key: String,
    pub value: Value,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { key: key.into(), value: value.into() }
    }

    pub fn group(key: impl Into<String>, attrs: Vec<Attribute>) -> Self {
        Self { key: key.into(), value: Value::Group(attrs) }
    }
}

/// One log call. Sinks receive their own copy by value.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    pub attrs: Vec<Attribute>,
}

impl LogRecord {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            attrs: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.push(Attribute::new(key, value));
        self
    }

    pub fn with_attrs(mut self, attrs: impl IntoIterator<Item = Attribute>) -> Self {
        self.attrs.extend(attrs);
        self
    }

    /// Last top-level attribute with the given key.
    pub fn find(&self, key: &str) -> Option<&Value> {
        self.attrs.iter().rev().find(|a| a.key == key).map(|a| &a.value)
    }

    /// Like [`find`](Self::find), but also matches keys that were prefixed
    /// by a scope chain (`grp.key`).
    pub fn find_scoped(&self, key: &str) -> Option<&Value> {
        self.attrs
            .iter()
            .rev()
            .find(|a| key_matches(&a.key, key))
            .map(|a| &a.value)
    }
}

/// `key` equals `wanted`, or ends with `.wanted`.
pub(crate) fn key_matches(key: &str, wanted: &str) -> bool {
    key == wanted
        || key
            .strip_suffix(wanted)
            .map_or(false, |head| head.ends_with('.'))
}

/// Render a duration the way operators read them: `250ms`, `1.5s`, `2m30s`, `1h0m5s`.
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < 1_000 {
        return format!("{}ns", nanos);
    }
    if nanos < 1_000_000 {
        return format!("{}µs", trim_fraction(nanos as f64 / 1_000.0));
    }
    if nanos < 1_000_000_000 {
        return format!("{}ms", trim_fraction(nanos as f64 / 1_000_000.0));
    }

    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = (total_secs % 60) as f64 + f64::from(d.subsec_nanos()) / 1e9;
    let secs = trim_fraction(secs);
    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

fn trim_fraction(v: f64) -> String {
    let s = format!("{:.9}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_and_offsets() {
        assert_eq!(Level::DEBUG.to_string(), "DEBUG");
        assert_eq!(Level::WARN.to_string(), "WARN");
        assert_eq!(Level::new(10).to_string(), "ERROR+2");
        assert_eq!(Level::new(-1).to_string(), "DEBUG+3");
        assert!(Level::new(12) > Level::ERROR);
        assert_eq!(Level::parse("Warning"), Some(Level::WARN));
        assert_eq!(Level::parse("verbose"), None);
    }

    #[test]
    fn durations_render_in_human_units() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(150)), "2m30s");
        assert_eq!(format_duration(Duration::from_secs(3605)), "1h0m5s");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn group_values_render_recursively() {
        let value = Value::Group(vec![
            Attribute::new("a", 1i64),
            Attribute::group("b", vec![Attribute::new("c", "x")]),
        ]);
        assert_eq!(value.to_string(), "{a=1,b={c=x}}");
        assert_eq!(Value::Group(Vec::new()).to_string(), "{}");
    }

    #[test]
    fn find_returns_last_match() {
        let record = LogRecord::new(Level::INFO, "m")
            .with_attr("k", "first")
            .with_attr("k", "second");
        assert_eq!(record.find("k"), Some(&Value::from("second")));
        assert_eq!(record.find("missing"), None);
    }
}
