//! Configuration validation.
//!
//! Structural problems that would make the relay misbehave are errors and
//! abort startup; suspicious-but-usable settings are warnings.

use secrecy::ExposeSecret;

use crate::schema::{MirrorConfig, RedirectConfig};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "missing", "invalid-id", "invalid-value", "ineffective"
    pub category: &'static str,
    /// Dotted path, e.g. "redirects[0].sources"
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.severity, self.category, self.path, self.message
        )
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    /// Error diagnostics joined into one line, for fatal startup errors.
    #[must_use]
    pub fn error_summary(&self) -> String {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .map(|d| format!("{}: {}", d.path, d.message))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn push(
        &mut self,
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.diagnostics.push(Diagnostic {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate a loaded configuration.
#[must_use]
pub fn validate(config: &MirrorConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    if config.token.expose_secret().trim().is_empty() {
        result.push(Severity::Error, "missing", "token", "bot token is empty");
    }

    if config.redirects.is_empty() {
        result.push(
            Severity::Warning,
            "missing",
            "redirects",
            "no redirects configured, nothing will be relayed",
        );
    }

    for (idx, redirect) in config.redirects.iter().enumerate() {
        validate_redirect(&mut result, idx, redirect);
    }

    let relay = &config.relay;
    if relay.flush_interval_secs == 0 {
        result.push(
            Severity::Error,
            "invalid-value",
            "relay.flushIntervalSecs",
            "must be at least 1 second",
        );
    }
    if relay.poll_page_size == 0 || relay.poll_page_size > 100 {
        result.push(
            Severity::Error,
            "invalid-value",
            "relay.pollPageSize",
            "must be between 1 and 100",
        );
    }
    if relay.webhook_name.trim().is_empty() {
        result.push(
            Severity::Error,
            "invalid-value",
            "relay.webhookName",
            "webhook name must not be empty",
        );
    }

    result
}

fn validate_redirect(result: &mut ValidationResult, idx: usize, redirect: &RedirectConfig) {
    let base = format!("redirects[{idx}]");

    for (field, ids) in [
        ("sources", &redirect.sources),
        ("destinations", &redirect.destinations),
    ] {
        if ids.is_empty() {
            result.push(
                Severity::Error,
                "missing",
                format!("{base}.{field}"),
                format!("redirect has no `{field}`"),
            );
        }
        for (i, id) in ids.iter().enumerate() {
            if id.trim().parse::<u64>().is_err() {
                result.push(
                    Severity::Error,
                    "invalid-id",
                    format!("{base}.{field}[{i}]"),
                    format!("`{id}` is not a channel id"),
                );
            }
        }
    }

    let opts = &redirect.options;
    let opt_path = |name: &str| format!("{base}.options.{name}");

    if opts.tracks_changes() && opts.edit_tracking_max_msg == 0 {
        result.push(
            Severity::Warning,
            "ineffective",
            opt_path("editTrackingMaxMsg"),
            "edit/delete tracking is enabled but the table size is 0",
        );
    }
    if !opts.webhook {
        for (set, name) in [
            (opts.webhook_username.is_some(), "webhookUsername"),
            (opts.webhook_avatar_url.is_some(), "webhookAvatarURL"),
            (opts.webhook_username_channel, "webhookUsernameChannel"),
        ] {
            if set {
                result.push(
                    Severity::Warning,
                    "ineffective",
                    opt_path(name),
                    "has no effect unless `webhook` is enabled",
                );
            }
        }
    }
    if opts.min_length == Some(0) {
        result.push(
            Severity::Warning,
            "ineffective",
            opt_path("minLength"),
            "a minimum length of 0 filters nothing",
        );
    }
}
