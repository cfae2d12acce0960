//! Classified error reports.
//!
//! An [`Incident`] is what the handler emits: the report itself plus the
//! classification, a fingerprint grouping repeated occurrences, and any
//! caller-supplied context.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::classify::{ErrorKind, Severity};
use crate::reporter::ErrorReport;

/// Extra context attached to an incident.
pub type Context = BTreeMap<String, serde_json::Value>;

/// A classified, fingerprinted error report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// The underlying report.
    #[serde(flatten)]
    pub report: ErrorReport,

    /// Category of the error.
    pub kind: ErrorKind,

    /// Severity derived from the kind.
    pub severity: Severity,

    /// BLAKE3 digest grouping repeated occurrences of the same error.
    pub fingerprint: String,

    /// Caller-supplied context.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: Context,
}

impl Incident {
    /// Wrap a report with its classification.
    #[must_use]
    pub fn new(report: ErrorReport, kind: ErrorKind, context: Context) -> Self {
        let fingerprint = Self::compute_fingerprint(&report.message, report.stack.as_deref());
        Self {
            report,
            kind,
            severity: kind.severity(),
            fingerprint,
            context,
        }
    }

    /// Compute the fingerprint of an error.
    ///
    /// Only the message and the first stack line take part, so the same
    /// failure raised from different call depths still groups together.
    #[must_use]
    pub fn compute_fingerprint(message: &str, stack: Option<&str>) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(message.as_bytes());
        if let Some(first) = stack.and_then(|s| s.lines().next()) {
            hasher.update(b"\n");
            hasher.update(first.trim().as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }

    /// The error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.report.message
    }

    /// A short prefix of the fingerprint, for log lines.
    #[must_use]
    pub fn short_fingerprint(&self) -> &str {
        self.fingerprint.get(..12).unwrap_or(&self.fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::EnvironmentSnapshot;

    fn report(message: &str, stack: Option<&str>) -> ErrorReport {
        ErrorReport {
            error_id: None,
            message: message.to_string(),
            stack: stack.map(String::from),
            component_stack: None,
            timestamp: "2024-01-02T03:04:05.000Z".to_string(),
            environment: EnvironmentSnapshot {
                user_agent: "A/1".to_string(),
                url: "https://example.com".to_string(),
                user_id: "anonymous".to_string(),
            },
        }
    }

    #[test]
    fn test_new_derives_severity() {
        let incident = Incident::new(report("x", None), ErrorKind::Server, Context::new());
        assert_eq!(incident.severity, Severity::Critical);
        assert_eq!(incident.message(), "x");
    }

    #[test]
    fn test_fingerprint_consistency() {
        let a = Incident::compute_fingerprint("boom", Some("at a\nat b"));
        let b = Incident::compute_fingerprint("boom", Some("at a\nat c\nat d"));
        assert_eq!(a, b);

        assert_ne!(a, Incident::compute_fingerprint("boom", Some("at z")));
        assert_ne!(a, Incident::compute_fingerprint("boom", None));
        assert_ne!(a, Incident::compute_fingerprint("other", Some("at a")));
    }

    #[test]
    fn test_short_fingerprint() {
        let incident = Incident::new(report("x", None), ErrorKind::Unknown, Context::new());
        assert_eq!(incident.short_fingerprint().len(), 12);
        assert!(incident.fingerprint.starts_with(incident.short_fingerprint()));
    }

    #[test]
    fn test_serialization_flattens_report() {
        let mut context = Context::new();
        context.insert("page".to_string(), serde_json::json!("donations"));
        let incident = Incident::new(report("boom", None), ErrorKind::Network, context);

        let json = serde_json::to_value(&incident).unwrap();
        assert_eq!(json["message"], "boom");
        assert_eq!(json["environment"]["userAgent"], "A/1");
        assert_eq!(json["kind"], "network");
        assert_eq!(json["severity"], "medium");
        assert_eq!(json["context"]["page"], "donations");

        let back: Incident = serde_json::from_value(json).unwrap();
        assert_eq!(back, incident);
    }

    #[test]
    fn test_empty_context_is_omitted() {
        let incident = Incident::new(report("boom", None), ErrorKind::Unknown, Context::new());
        let json = serde_json::to_value(&incident).unwrap();
        assert!(json.get("context").is_none());
    }
}
