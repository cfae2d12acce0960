//! Error report construction.
//!
//! [`ErrorReporter::create_error_report`] turns a caught error into an
//! [`ErrorReport`]. Construction is total: every missing input degrades to a
//! documented default, so reporting can never add a failure of its own.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ReporterConfig;
use crate::environment::{EnvironmentSnapshot, EnvironmentSource};

/// The error being reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaughtError {
    /// Human-readable description.
    pub message: String,
    /// Raw stack trace, if one was captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl CaughtError {
    /// Create an error with only a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    /// Attach a stack trace.
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Capture a standard error.
    ///
    /// The message is the error's `Display` output. The stack lists the
    /// `source()` chain, one `caused by:` line per cause, and is absent when
    /// the error has no causes.
    #[must_use]
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut current = error.source();
        while let Some(cause) = current {
            causes.push(format!("caused by: {cause}"));
            current = cause.source();
        }

        Self {
            message: error.to_string(),
            stack: (!causes.is_empty()).then(|| causes.join("\n")),
        }
    }
}

/// Supplementary information about where the error surfaced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Structural trace of the component tree, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_stack: Option<String>,
}

impl ErrorInfo {
    /// Create error info carrying a component stack.
    #[must_use]
    pub fn with_component_stack(component_stack: impl Into<String>) -> Self {
        Self {
            component_stack: Some(component_stack.into()),
        }
    }
}

/// Inputs to [`ErrorReporter::create_error_report`].
#[derive(Debug, Clone)]
pub struct ReportParams {
    /// Caller-supplied correlation identifier.
    pub error_id: Option<String>,
    /// The error being reported.
    pub error: CaughtError,
    /// Supplementary error information.
    pub error_info: ErrorInfo,
    /// Collaborators overriding the reporter's ambient ones.
    pub environment_source: Option<EnvironmentSource>,
}

impl ReportParams {
    /// Parameters for `error` with no id, info or environment overrides.
    #[must_use]
    pub fn new(error: CaughtError) -> Self {
        Self {
            error_id: None,
            error,
            error_info: ErrorInfo::default(),
            environment_source: None,
        }
    }

    /// Set the correlation identifier.
    #[must_use]
    pub fn with_error_id(mut self, error_id: impl Into<String>) -> Self {
        self.error_id = Some(error_id.into());
        self
    }

    /// Set the error info.
    #[must_use]
    pub fn with_error_info(mut self, error_info: ErrorInfo) -> Self {
        self.error_info = error_info;
        self
    }

    /// Set the environment overrides.
    #[must_use]
    pub fn with_environment(mut self, source: EnvironmentSource) -> Self {
        self.environment_source = Some(source);
        self
    }
}

/// A structured error report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    /// Caller-supplied correlation identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_id: Option<String>,
    /// Error message, verbatim.
    pub message: String,
    /// Stack trace, verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Component stack, verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_stack: Option<String>,
    /// ISO-8601 instant with millisecond precision.
    pub timestamp: String,
    /// Environment at the time of the report.
    pub environment: EnvironmentSnapshot,
}

/// Format an instant the way reports carry it: `2024-01-02T03:04:05.000Z`.
#[must_use]
pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Builds error reports against a set of ambient collaborators.
#[derive(Debug, Clone, Default)]
pub struct ErrorReporter {
    ambient: EnvironmentSource,
}

impl ErrorReporter {
    /// Create a reporter with the given ambient collaborators.
    #[must_use]
    pub fn new(ambient: EnvironmentSource) -> Self {
        Self { ambient }
    }

    /// Create a reporter with no ambient collaborators.
    ///
    /// Every field a report does not supply resolves to its sentinel, and
    /// timestamps come from the wall clock.
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }

    /// Create a reporter using this process's ambient collaborators.
    #[must_use]
    pub fn from_config(config: &ReporterConfig) -> Self {
        Self::new(EnvironmentSource::ambient(config))
    }

    /// The ambient collaborators.
    #[must_use]
    pub fn ambient(&self) -> &EnvironmentSource {
        &self.ambient
    }

    /// Resolve the environment, with `source` taking precedence over the
    /// ambient collaborators.
    #[must_use]
    pub fn resolve_environment(&self, source: Option<&EnvironmentSource>) -> EnvironmentSnapshot {
        self.merged(source.cloned()).resolve()
    }

    /// Build a report for `params`.
    #[must_use]
    pub fn create_error_report(&self, params: ReportParams) -> ErrorReport {
        let ReportParams {
            error_id,
            error,
            error_info,
            environment_source,
        } = params;

        let source = self.merged(environment_source);
        let environment = source.resolve();
        let timestamp = format_timestamp(source.now());

        ErrorReport {
            error_id,
            message: error.message,
            stack: error.stack,
            component_stack: error_info.component_stack,
            timestamp,
            environment,
        }
    }

    fn merged(&self, source: Option<EnvironmentSource>) -> EnvironmentSource {
        match source {
            Some(source) => source.merge_over(&self.ambient),
            None => self.ambient.clone(),
        }
    }
}

/// Resolve the environment against this process's default ambient
/// collaborators.
#[must_use]
pub fn resolve_environment(source: Option<&EnvironmentSource>) -> EnvironmentSnapshot {
    ErrorReporter::from_config(&ReporterConfig::default()).resolve_environment(source)
}

/// Build a report against this process's default ambient collaborators.
#[must_use]
pub fn create_error_report(params: ReportParams) -> ErrorReport {
    ErrorReporter::from_config(&ReporterConfig::default()).create_error_report(params)
}
