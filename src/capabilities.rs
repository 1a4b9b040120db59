use std::io::IsTerminal;

/// Terminal capability query consumed by the console-facing sinks.
pub trait Capabilities: Send + Sync {
    fn is_interactive(&self) -> bool;
    fn supports_color(&self) -> bool;
    fn has_explicit_preference(&self) -> bool;
}

/// Fixed answers. Used when the caller already knows the environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaticCapabilities {
    pub interactive: bool,
    pub color: bool,
    pub explicit_preference: bool,
}

impl StaticCapabilities {
    pub fn interactive(color: bool) -> Self {
        Self { interactive: true, color, explicit_preference: false }
    }

    pub fn non_interactive() -> Self {
        Self::default()
    }
}

impl Capabilities for StaticCapabilities {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn supports_color(&self) -> bool {
        self.color
    }

    fn has_explicit_preference(&self) -> bool {
        self.explicit_preference
    }
}

/// Command-line overrides for detection.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectOptions {
    pub force_interactive: bool,
    pub force_non_interactive: bool,
    /// `Some(true)` / `Some(false)` for `--color` / `--no-color`.
    pub color: Option<bool>,
}

/// Capabilities detected once from the process environment.
#[derive(Debug, Clone, Copy)]
pub struct TerminalCapabilities {
    interactive: bool,
    color: bool,
    explicit_preference: bool,
}

impl TerminalCapabilities {
    pub fn detect(options: DetectOptions) -> Self {
        Self::detect_with(options, std::io::stderr().is_terminal(), |key| std::env::var(key).ok())
    }

    fn detect_with(
        options: DetectOptions,
        stderr_is_tty: bool,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let interactive = if options.force_non_interactive {
            false
        } else if options.force_interactive {
            true
        } else {
            stderr_is_tty && env("CI").map_or(true, |v| v.is_empty() || v == "false")
        };

        // Precedence: flag, CLICOLOR_FORCE, NO_COLOR, CLICOLOR.
        let preference = options
            .color
            .or_else(|| env("CLICOLOR_FORCE").filter(|v| !v.is_empty() && v != "0").map(|_| true))
            .or_else(|| env("NO_COLOR").filter(|v| !v.is_empty()).map(|_| false))
            .or_else(|| env("CLICOLOR").filter(|v| v == "0").map(|_| false));

        let color = match preference {
            Some(choice) => choice,
            None => {
                interactive
                    && env("TERM").map_or(false, |term| !term.is_empty() && term != "dumb")
            }
        };

        Self { interactive, color, explicit_preference: preference.is_some() }
    }
}

impl Capabilities for TerminalCapabilities {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn supports_color(&self) -> bool {
        self.color
    }

    fn has_explicit_preference(&self) -> bool {
        self.explicit_preference
    }
}
