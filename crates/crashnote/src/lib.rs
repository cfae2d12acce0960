//! `crashnote` - structured error reports with environment capture
//!
//! This library builds serializable error reports from a caught error, the
//! environment it happened in, and a clock. Every unavailable input resolves
//! to a documented default, so building a report never fails. On top of that
//! it provides classification, a handling pipeline with pluggable sinks, and
//! a panic hook.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod classify;
pub mod cli;
pub mod config;
pub mod environment;
pub mod error;
pub mod handler;
pub mod incident;
pub mod logging;
pub mod reporter;
pub mod sink;
pub mod storage;

pub use classify::{Classifier, ErrorKind, Severity};
pub use config::Config;
pub use environment::{EnvironmentSnapshot, EnvironmentSource, Location, Navigator};
pub use error::{Error, Result};
pub use handler::{install_panic_hook, ErrorHandler};
pub use incident::Incident;
pub use logging::init_logging;
pub use reporter::{
    create_error_report, resolve_environment, CaughtError, ErrorInfo, ErrorReport, ErrorReporter,
    ReportParams,
};
pub use sink::ReportSink;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
