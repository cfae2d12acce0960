//! Error handling pipeline.
//!
//! The [`ErrorHandler`] builds a report for each error it is given, classifies
//! it, logs it at a severity-dependent level and forwards it to a
//! [`ReportSink`]. It also keeps per-fingerprint statistics and decides
//! whether network failures should be retried.

use std::any::Any;
use std::collections::HashMap;
use std::panic::Location;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::classify::{Classifier, ErrorKind, Severity};
use crate::config::{Config, HandlerConfig};
use crate::incident::{Context, Incident};
use crate::reporter::{CaughtError, ErrorReporter, ReportParams};
use crate::sink::{ReportSink, TracingSink};

/// Occurrence statistics for one fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorStats {
    /// Message of the first occurrence.
    pub message: String,
    /// Times this error was handled.
    pub occurrences: u32,
    /// Retries recorded for this error.
    pub retries: u32,
}

/// Builds, classifies, logs and forwards error reports.
pub struct ErrorHandler {
    config: Mutex<HandlerConfig>,
    reporter: ErrorReporter,
    classifier: Classifier,
    sink: Box<dyn ReportSink>,
    stats: Mutex<HashMap<String, ErrorStats>>,
}

impl std::fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandler")
            .field("config", &self.config)
            .field("reporter", &self.reporter)
            .field("classifier", &self.classifier)
            .field("sink", &self.sink.name())
            .finish_non_exhaustive()
    }
}

impl ErrorHandler {
    /// Create a handler from its parts.
    #[must_use]
    pub fn new(
        config: HandlerConfig,
        reporter: ErrorReporter,
        classifier: Classifier,
        sink: Box<dyn ReportSink>,
    ) -> Self {
        Self {
            config: Mutex::new(config),
            reporter,
            classifier,
            sink,
            stats: Mutex::new(HashMap::new()),
        }
    }

    /// Create a handler from application configuration, reporting to `sink`.
    #[must_use]
    pub fn from_config(config: &Config, sink: Box<dyn ReportSink>) -> Self {
        Self::new(
            config.handler.clone(),
            ErrorReporter::from_config(&config.reporter),
            Classifier::with_config(&config.classifier),
            sink,
        )
    }

    /// Create a handler with default configuration that reports through
    /// `tracing`.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::from_config(&Config::default(), Box::new(TracingSink))
    }

    /// The reporter used to build reports.
    #[must_use]
    pub fn reporter(&self) -> &ErrorReporter {
        &self.reporter
    }

    /// The classifier used to categorise reports.
    #[must_use]
    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// A copy of the current configuration.
    #[must_use]
    pub fn config(&self) -> HandlerConfig {
        lock(&self.config).clone()
    }

    /// Replace the configuration.
    pub fn update_config(&self, config: HandlerConfig) {
        *lock(&self.config) = config;
    }

    /// Handle an error.
    ///
    /// Never fails: sink errors are logged and swallowed.
    pub fn handle(&self, params: ReportParams) -> Incident {
        self.handle_with_context(params, Context::new())
    }

    /// Report an error the caller caught itself, with extra context.
    pub fn report_manual(&self, error: CaughtError, context: Context) -> Incident {
        self.handle_with_context(ReportParams::new(error), context)
    }

    /// Handle an error, attaching `context` to the incident.
    pub fn handle_with_context(&self, params: ReportParams, context: Context) -> Incident {
        let report = self.reporter.create_error_report(params);
        let kind = self.classifier.classify(&report.message);
        let incident = Incident::new(report, kind, context);

        self.count_occurrence(&incident);
        log_incident(&incident);

        if self.config().enable_reporting {
            if let Err(e) = self.sink.submit(&incident) {
                warn!(
                    sink = self.sink.name(),
                    fingerprint = incident.short_fingerprint(),
                    error = %e,
                    "Failed to submit error report"
                );
            }
        }

        incident
    }

    fn count_occurrence(&self, incident: &Incident) {
        lock(&self.stats)
            .entry(incident.fingerprint.clone())
            .or_insert_with(|| ErrorStats {
                message: incident.message().to_string(),
                occurrences: 0,
                retries: 0,
            })
            .occurrences += 1;
    }

    /// Check whether the operation that produced `incident` should be
    /// retried.
    #[must_use]
    pub fn should_retry(&self, incident: &Incident) -> bool {
        let config = self.config();
        if !config.enable_auto_retry || incident.kind != ErrorKind::Network {
            return false;
        }
        let retries = lock(&self.stats)
            .get(&incident.fingerprint)
            .map_or(0, |s| s.retries);
        retries < config.max_retries
    }

    /// Record a retry of `incident` and return how long to wait before it.
    ///
    /// The delay grows linearly: zero before the first retry, one base delay
    /// before the second, and so on.
    pub fn record_retry(&self, incident: &Incident) -> Duration {
        let base = self.config().retry_delay();
        let mut stats = lock(&self.stats);
        let entry = stats
            .entry(incident.fingerprint.clone())
            .or_insert_with(|| ErrorStats {
                message: incident.message().to_string(),
                occurrences: 0,
                retries: 0,
            });
        let previous = entry.retries;
        entry.retries += 1;
        info!(
            fingerprint = incident.short_fingerprint(),
            attempt = entry.retries,
            "Retrying after error"
        );
        base * previous
    }

    /// Statistics per fingerprint.
    #[must_use]
    pub fn error_stats(&self) -> HashMap<String, ErrorStats> {
        lock(&self.stats).clone()
    }

    /// Forget all statistics.
    pub fn clear_error_stats(&self) {
        lock(&self.stats).clear();
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn log_incident(incident: &Incident) {
    let report = &incident.report;
    let env = &report.environment;
    macro_rules! emit {
        ($level:ident, $msg:literal) => {
            $level!(
                kind = %incident.kind,
                severity = %incident.severity,
                fingerprint = incident.short_fingerprint(),
                error_id = report.error_id.as_deref(),
                user_id = %env.user_id,
                url = %env.url,
                error_message = %report.message,
                $msg
            )
        };
    }

    match incident.severity {
        Severity::Critical => emit!(error, "Critical error"),
        Severity::High => emit!(error, "High severity error"),
        Severity::Medium => emit!(warn, "Medium severity error"),
        Severity::Low => emit!(info, "Low severity error"),
    }
}

/// Route unhandled panics through `handler`.
///
/// The previously installed hook still runs afterwards, so the default panic
/// message keeps appearing on stderr.
pub fn install_panic_hook(handler: Arc<ErrorHandler>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        handler.handle(ReportParams::new(caught_panic(info.payload(), info.location())));
        previous(info);
    }));
}

/// Describe a panic as a caught error.
///
/// The stack holds the panic location followed by a backtrace, when
/// `RUST_BACKTRACE` enables one.
#[must_use]
pub fn caught_panic(payload: &(dyn Any + Send), location: Option<&Location<'_>>) -> CaughtError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic with non-string payload".to_string());

    let mut stack = String::new();
    if let Some(location) = location {
        stack.push_str(&format!(
            "at {}:{}:{}",
            location.file(),
            location.line(),
            location.column()
        ));
    }
    let backtrace = std::backtrace::Backtrace::capture();
    if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
        if !stack.is_empty() {
            stack.push('\n');
        }
        stack.push_str(&backtrace.to_string());
    }

    let caught = CaughtError::new(message);
    if stack.is_empty() {
        caught
    } else {
        caught.with_stack(stack)
    }
}
