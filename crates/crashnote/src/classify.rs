//! Error classification.
//!
//! Assigns an [`ErrorKind`] to an error message using ordered regex rules,
//! and derives a [`Severity`] and a user-facing message from the kind.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::config::{ClassifierConfig, RuleConfig};

/// Broad category of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connectivity problems, failed fetches, timeouts.
    Network,
    /// Rejected input.
    Validation,
    /// Missing or expired credentials.
    Authentication,
    /// Valid credentials without the required rights.
    Authorization,
    /// A requested resource does not exist.
    NotFound,
    /// The backend failed.
    Server,
    /// The client itself misbehaved.
    Client,
    /// Nothing matched.
    Unknown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::Validation => "validation",
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::NotFound => "not_found",
            Self::Server => "server",
            Self::Client => "client",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

impl ErrorKind {
    /// The severity errors of this kind are reported at.
    #[must_use]
    pub fn severity(self) -> Severity {
        match self {
            Self::Authentication | Self::Authorization => Severity::High,
            Self::Server => Severity::Critical,
            Self::Validation | Self::NotFound => Severity::Low,
            Self::Network | Self::Client | Self::Unknown => Severity::Medium,
        }
    }

    /// A message suitable for showing to the person who hit the error.
    #[must_use]
    pub fn user_message(self) -> &'static str {
        match self {
            Self::Network => {
                "A connection error occurred. Please check your internet connection."
            }
            Self::Authentication => "Your session has expired. Please sign in again.",
            Self::Authorization => "You do not have permission to perform this action.",
            Self::Validation => "Some of the information entered is invalid. Please check it.",
            Self::NotFound => "The page you are looking for could not be found.",
            Self::Server => "A server error occurred. Please try again later.",
            Self::Client | Self::Unknown => {
                "An unexpected error occurred. Please refresh the page."
            }
        }
    }
}

/// How urgently an error needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Expected, user-recoverable.
    Low,
    /// Degraded but working.
    Medium,
    /// Blocks the user.
    High,
    /// Blocks everyone.
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A compiled classification rule.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Kind assigned on match.
    pub kind: ErrorKind,
    /// Pattern matched case-insensitively against the message.
    pub regex: Regex,
}

/// Built-in keyword rules, in priority order.
const BUILTIN_RULES: &[(ErrorKind, &str)] = &[
    (ErrorKind::Network, r"network|fetch|timeout"),
    (ErrorKind::Validation, r"validation|invalid"),
    (ErrorKind::Authentication, r"unauthorized|authentication"),
    (ErrorKind::Authorization, r"forbidden|permission"),
    (ErrorKind::NotFound, r"not found|404"),
    (ErrorKind::Server, r"server|500"),
];

/// Ordered rule set mapping messages to kinds.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier {
    /// Create a classifier with the built-in rules only.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&ClassifierConfig::default())
    }

    /// Create a classifier with custom rules checked before the built-in
    /// ones. Custom rules whose pattern does not compile are skipped.
    #[must_use]
    pub fn with_config(config: &ClassifierConfig) -> Self {
        let custom = config.custom_rules.iter().filter_map(compile_custom);
        let builtin = BUILTIN_RULES.iter().filter_map(|(kind, pattern)| {
            compile(pattern).ok().map(|regex| Rule { kind: *kind, regex })
        });

        Self {
            rules: custom.chain(builtin).collect(),
        }
    }

    /// The rules in the order they are checked.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Classify an error message. The first matching rule wins.
    #[must_use]
    pub fn classify(&self, message: &str) -> ErrorKind {
        let kind = self
            .rules
            .iter()
            .find(|rule| rule.regex.is_match(message))
            .map_or(ErrorKind::Unknown, |rule| rule.kind);
        trace!(%kind, "Classified error message");
        kind
    }
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

fn compile_custom(rule: &RuleConfig) -> Option<Rule> {
    match compile(&rule.pattern) {
        Ok(regex) => Some(Rule {
            kind: rule.kind,
            regex,
        }),
        Err(e) => {
            warn!(pattern = %rule.pattern, error = %e, "Invalid custom classifier rule");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_rules_compile() {
        assert_eq!(Classifier::new().rules().len(), BUILTIN_RULES.len());
    }

    #[test]
    fn test_classify_keywords() {
        let classifier = Classifier::new();
        let cases = [
            ("Network request failed", ErrorKind::Network),
            ("Failed to fetch", ErrorKind::Network),
            ("Request TIMEOUT after 30s", ErrorKind::Network),
            ("Validation failed for field tc_no", ErrorKind::Validation),
            ("Invalid IBAN", ErrorKind::Validation),
            ("401 Unauthorized", ErrorKind::Authentication),
            ("Authentication required", ErrorKind::Authentication),
            ("403 Forbidden", ErrorKind::Authorization),
            ("Missing permission: donations.write", ErrorKind::Authorization),
            ("Document not found", ErrorKind::NotFound),
            ("HTTP 404", ErrorKind::NotFound),
            ("Internal Server Error", ErrorKind::Server),
            ("status 500", ErrorKind::Server),
            ("undefined is not a function", ErrorKind::Unknown),
        ];
        for (message, expected) in cases {
            assert_eq!(classifier.classify(message), expected, "{message}");
        }
    }

    #[test]
    fn test_first_rule_wins() {
        let classifier = Classifier::new();
        assert_eq!(
            classifier.classify("network error: invalid response from server"),
            ErrorKind::Network
        );
        assert_eq!(
            classifier.classify("invalid permission set"),
            ErrorKind::Validation
        );
    }

    #[test]
    fn test_custom_rules_take_precedence() {
        let config = ClassifierConfig {
            custom_rules: vec![RuleConfig {
                kind: ErrorKind::Client,
                pattern: r"quota|timeout".to_string(),
            }],
        };
        let classifier = Classifier::with_config(&config);
        assert_eq!(classifier.classify("Storage quota exceeded"), ErrorKind::Client);
        assert_eq!(classifier.classify("timeout"), ErrorKind::Client);
        assert_eq!(classifier.classify("failed to fetch"), ErrorKind::Network);
    }

    #[test]
    fn test_custom_rule_ignores_case() {
        let config = ClassifierConfig {
            custom_rules: vec![
                RuleConfig {
                    kind: ErrorKind::Client,
                    pattern: "ECONNRESET".to_string(),
                },
                RuleConfig {
                    kind: ErrorKind::Server,
                    pattern: r"Bad\s+Gateway".to_string(),
                },
            ],
        };
        let classifier = Classifier::with_config(&config);
        assert_eq!(classifier.classify("read ECONNRESET"), ErrorKind::Client);
        assert_eq!(classifier.classify("socket econnreset"), ErrorKind::Client);
        assert_eq!(classifier.classify("502 BAD GATEWAY"), ErrorKind::Server);
    }

    #[test]
    fn test_invalid_custom_rule_is_skipped() {
        let config = ClassifierConfig {
            custom_rules: vec![RuleConfig {
                kind: ErrorKind::Client,
                pattern: "[unclosed".to_string(),
            }],
        };
        let classifier = Classifier::with_config(&config);
        assert_eq!(classifier.rules().len(), BUILTIN_RULES.len());
    }

    #[test]
    fn test_severity_mapping() {
        assert_eq!(ErrorKind::Authentication.severity(), Severity::High);
        assert_eq!(ErrorKind::Authorization.severity(), Severity::High);
        assert_eq!(ErrorKind::Server.severity(), Severity::Critical);
        assert_eq!(ErrorKind::Network.severity(), Severity::Medium);
        assert_eq!(ErrorKind::Validation.severity(), Severity::Low);
        assert_eq!(ErrorKind::NotFound.severity(), Severity::Low);
        assert_eq!(ErrorKind::Client.severity(), Severity::Medium);
        assert_eq!(ErrorKind::Unknown.severity(), Severity::Medium);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_user_messages_are_distinct_for_main_kinds() {
        let kinds = [
            ErrorKind::Network,
            ErrorKind::Authentication,
            ErrorKind::Authorization,
            ErrorKind::Validation,
            ErrorKind::NotFound,
            ErrorKind::Server,
            ErrorKind::Unknown,
        ];
        let mut messages: Vec<_> = kinds.iter().map(|k| k.user_message()).collect();
        messages.sort_unstable();
        messages.dedup();
        assert_eq!(messages.len(), kinds.len());
    }

    #[test]
    fn test_display_matches_serde() {
        for kind in [ErrorKind::NotFound, ErrorKind::Network, ErrorKind::Unknown] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
        assert_eq!(Severity::Critical.to_string(), "critical");
        assert_eq!(
            serde_json::to_string(&Severity::Medium).unwrap(),
            "\"medium\""
        );
    }
}
