//! Destinations for handled incidents.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use tracing::info;

use crate::error::{Error, Result};
use crate::incident::Incident;

/// Something that accepts incidents.
pub trait ReportSink: Send + Sync {
    /// The name of this sink (for logging/debugging).
    fn name(&self) -> &'static str;

    /// Accept one incident.
    ///
    /// # Errors
    ///
    /// Returns an error if the incident could not be delivered.
    fn submit(&self, incident: &Incident) -> Result<()>;
}

/// Writes each incident as one compact JSON object per line.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Wrap a writer.
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Consume the sink and return the writer.
    ///
    /// # Errors
    ///
    /// Returns an error if a writer thread panicked while holding the lock.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|_| Error::sink("json-lines", "writer lock poisoned"))
    }
}

impl JsonLinesSink<std::fs::File> {
    /// Append to the file at `path`, creating it and its parent
    /// directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created.
    pub fn append_to(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }
}

impl<W: Write + Send> ReportSink for JsonLinesSink<W> {
    fn name(&self) -> &'static str {
        "json-lines"
    }

    fn submit(&self, incident: &Incident) -> Result<()> {
        let line = serde_json::to_string(incident)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| Error::sink(self.name(), "writer lock poisoned"))?;
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}

/// Emits each incident as an `INFO` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn submit(&self, incident: &Incident) -> Result<()> {
        let json = serde_json::to_string(incident)?;
        info!(
            fingerprint = incident.short_fingerprint(),
            incident = %json,
            "Error reported"
        );
        Ok(())
    }
}

/// Keeps incidents in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    incidents: Mutex<Vec<Incident>>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of every incident received so far.
    #[must_use]
    pub fn incidents(&self) -> Vec<Incident> {
        self.incidents
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Number of incidents received so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.incidents.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    /// Check if no incident has been received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReportSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn submit(&self, incident: &Incident) -> Result<()> {
        self.incidents
            .lock()
            .map_err(|_| Error::sink(self.name(), "incident lock poisoned"))?
            .push(incident.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorKind;
    use crate::environment::EnvironmentSnapshot;
    use crate::incident::Context;
    use crate::reporter::ErrorReport;

    fn incident(message: &str) -> Incident {
        let report = ErrorReport {
            error_id: Some("e-1".to_string()),
            message: message.to_string(),
            stack: None,
            component_stack: None,
            timestamp: "2024-01-02T03:04:05.000Z".to_string(),
            environment: EnvironmentSnapshot {
                user_agent: "unknown".to_string(),
                url: "unknown".to_string(),
                user_id: "anonymous".to_string(),
            },
        };
        Incident::new(report, ErrorKind::Unknown, Context::new())
    }

    #[test]
    fn test_json_lines_sink_writes_one_line_per_incident() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.submit(&incident("first")).unwrap();
        sink.submit(&incident("second")).unwrap();

        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["message"], "first");
        assert_eq!(first["errorId"], "e-1");
    }

    #[test]
    fn test_json_lines_sink_append_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/incidents.jsonl");

        JsonLinesSink::append_to(&path)
            .unwrap()
            .submit(&incident("a"))
            .unwrap();
        JsonLinesSink::append_to(&path)
            .unwrap()
            .submit(&incident("b"))
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());
        sink.submit(&incident("a")).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.incidents()[0].message(), "a");
    }

    #[test]
    fn test_tracing_sink_accepts() {
        crate::logging::init_test_logging();
        assert!(TracingSink.submit(&incident("a")).is_ok());
        assert_eq!(TracingSink.name(), "tracing");
    }
}
