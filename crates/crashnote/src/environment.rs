//! Environment capture for error reports.
//!
//! An [`EnvironmentSource`] bundles the optional collaborators the reporter
//! consults: who is calling (user agent), where they are (location), who they
//! are (a key-value store holding `user_id`) and what time it is (a clock).
//! Resolving a source yields an [`EnvironmentSnapshot`] in which every field
//! holds either a real value or a sentinel default.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ReporterConfig;
use crate::storage::{FileStore, KeyValueStore};

/// Sentinel for an unavailable user agent or URL.
pub const UNKNOWN: &str = "unknown";

/// Sentinel for an unavailable user identifier.
pub const ANONYMOUS: &str = "anonymous";

/// Store key under which the current user identifier is kept.
pub const USER_ID_KEY: &str = "user_id";

/// Component name attached to diagnostics emitted while resolving.
const COMPONENT: &str = "ErrorReporter";

/// Client identification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Navigator {
    /// The user agent string, if the client exposes one.
    pub user_agent: Option<String>,
}

impl Navigator {
    /// Create a navigator reporting the given user agent.
    #[must_use]
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: Some(user_agent.into()),
        }
    }

    /// The user agent of this process: `crashnote/<version> (<os>; <arch>)`.
    #[must_use]
    pub fn process() -> Self {
        Self::new(format!(
            "{}/{} ({}; {})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS,
            std::env::consts::ARCH,
        ))
    }
}

/// Current navigation location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    /// The full location, if known.
    pub href: Option<String>,
}

impl Location {
    /// Create a location pointing at `href`.
    #[must_use]
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: Some(href.into()),
        }
    }

    /// The working directory of this process as a `file://` location.
    ///
    /// Returns `None` if the working directory cannot be determined.
    #[must_use]
    pub fn working_dir() -> Option<Self> {
        std::env::current_dir()
            .ok()
            .map(|dir| Self::new(format!("file://{}", dir.display())))
    }
}

/// A source of the current instant.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

impl<F> Clock for F
where
    F: Fn() -> DateTime<Utc> + Send + Sync,
{
    fn now(&self) -> DateTime<Utc> {
        self()
    }
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that always returns the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(
    /// The instant every call returns.
    pub DateTime<Utc>,
);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Optional collaborators consulted when building a report.
///
/// Every field is independently optional. When sources are merged, a present
/// collaborator always wins over a fallback one, even if the collaborator
/// itself carries no value (a `Navigator` without a user agent still hides
/// the fallback navigator).
#[derive(Clone, Default)]
pub struct EnvironmentSource {
    /// User agent provider.
    pub navigator: Option<Navigator>,
    /// Location provider.
    pub location: Option<Location>,
    /// Store holding the current user identifier.
    pub storage: Option<Arc<dyn KeyValueStore>>,
    /// Clock used for report timestamps.
    pub clock: Option<Arc<dyn Clock>>,
}

impl fmt::Debug for EnvironmentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentSource")
            .field("navigator", &self.navigator)
            .field("location", &self.location)
            .field("storage", &self.storage.as_ref().map(|s| s.name()))
            .field("clock", &self.clock.as_ref().map(|_| "<clock>"))
            .finish()
    }
}

impl EnvironmentSource {
    /// An empty source with no collaborators.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The ambient collaborators of this process.
    ///
    /// Configured values take precedence over what the process reports
    /// about itself. The file store is only attached when enabled.
    #[must_use]
    pub fn ambient(config: &ReporterConfig) -> Self {
        let navigator = Some(
            config
                .user_agent
                .clone()
                .map_or_else(Navigator::process, Navigator::new),
        );
        let location = config
            .url
            .clone()
            .map(Location::new)
            .or_else(Location::working_dir);
        let storage = config.storage_enabled.then(|| {
            let path = config.storage_path.clone().unwrap_or_else(default_store_path);
            Arc::new(FileStore::new(path)) as Arc<dyn KeyValueStore>
        });

        Self {
            navigator,
            location,
            storage,
            clock: Some(Arc::new(SystemClock)),
        }
    }

    /// Set the navigator.
    #[must_use]
    pub fn with_navigator(mut self, navigator: Navigator) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Set the navigator from a user agent string.
    #[must_use]
    pub fn with_user_agent(self, user_agent: impl Into<String>) -> Self {
        self.with_navigator(Navigator::new(user_agent))
    }

    /// Set the location.
    #[must_use]
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Set the location from an href.
    #[must_use]
    pub fn with_href(self, href: impl Into<String>) -> Self {
        self.with_location(Location::new(href))
    }

    /// Set the key-value store.
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Set the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Fill every absent collaborator from `fallback`.
    #[must_use]
    pub fn merge_over(self, fallback: &EnvironmentSource) -> Self {
        Self {
            navigator: self.navigator.or_else(|| fallback.navigator.clone()),
            location: self.location.or_else(|| fallback.location.clone()),
            storage: self.storage.or_else(|| fallback.storage.clone()),
            clock: self.clock.or_else(|| fallback.clock.clone()),
        }
    }

    /// The current instant according to this source's clock, or the wall
    /// clock if none is attached.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.as_ref().map_or_else(Utc::now, |clock| clock.now())
    }

    /// Resolve this source into a snapshot.
    ///
    /// Never fails. A store read error is logged once at `WARN` and the user
    /// identifier falls back to [`ANONYMOUS`].
    #[must_use]
    pub fn resolve(&self) -> EnvironmentSnapshot {
        let user_agent = self
            .navigator
            .as_ref()
            .and_then(|n| n.user_agent.as_deref())
            .and_then(non_blank)
            .unwrap_or(UNKNOWN);

        let url = self
            .location
            .as_ref()
            .and_then(|l| l.href.as_deref())
            .and_then(non_blank)
            .unwrap_or(UNKNOWN);

        let user_id = self.read_user_id();

        EnvironmentSnapshot {
            user_agent: user_agent.to_string(),
            url: url.to_string(),
            user_id: user_id.unwrap_or_else(|| ANONYMOUS.to_string()),
        }
    }

    fn read_user_id(&self) -> Option<String> {
        let storage = self.storage.as_ref()?;
        match storage.get_item(USER_ID_KEY) {
            Ok(value) => value.filter(|v| non_blank(v).is_some()),
            Err(error) => {
                warn!(
                    component = COMPONENT,
                    store = storage.name(),
                    error = %error,
                    "Failed to read user id from storage"
                );
                None
            }
        }
    }
}

/// Default location of the ambient file store.
#[must_use]
pub fn default_store_path() -> PathBuf {
    crate::config::Config::default_data_dir().join("session.json")
}

/// Returns `value` if it is non-empty after trimming whitespace.
fn non_blank(value: &str) -> Option<&str> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Environment facts captured at the moment an error is reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSnapshot {
    /// Client identification, or `"unknown"`.
    pub user_agent: String,
    /// Current location, or `"unknown"`.
    pub url: String,
    /// Current user, or `"anonymous"`.
    pub user_id: String,
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::TimeZone;
    use tracing::field::{Field, Visit};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer};
    use tracing_subscriber::prelude::*;

    use super::*;
    use crate::storage::{MemoryStore, StoreError, StoreResult};

    /// A store whose reads always fail.
    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn get_item(&self, _key: &str) -> StoreResult<Option<String>> {
            Err(StoreError::unavailable("access denied"))
        }
    }

    /// Records every event as `(level, "field=value ...")`.
    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<(Level, String)>>>);

    struct FieldText(String);

    impl Visit for FieldText {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.0.push_str(&format!("{}={:?} ", field.name(), value));
        }
    }

    impl<S: Subscriber> Layer<S> for Recorder {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut text = FieldText(String::new());
            event.record(&mut text);
            self.0
                .lock()
                .unwrap()
                .push((*event.metadata().level(), text.0));
        }
    }

    fn recording<T>(f: impl FnOnce() -> T) -> (T, Vec<(Level, String)>) {
        let recorder = Recorder::default();
        let subscriber = tracing_subscriber::registry().with(recorder.clone());
        let out = tracing::subscriber::with_default(subscriber, f);
        let events = recorder.0.lock().unwrap().clone();
        (out, events)
    }

    fn store(value: &str) -> Arc<dyn KeyValueStore> {
        Arc::new(MemoryStore::with_items([(USER_ID_KEY, value)]))
    }

    #[test]
    fn test_custom_source_resolves_verbatim() {
        let source = EnvironmentSource::new()
            .with_user_agent("CustomAgent/1.0")
            .with_href("https://example.com/path")
            .with_storage(store("user-123"));

        assert_eq!(
            source.resolve(),
            EnvironmentSnapshot {
                user_agent: "CustomAgent/1.0".to_string(),
                url: "https://example.com/path".to_string(),
                user_id: "user-123".to_string(),
            }
        );
    }

    #[test]
    fn test_blank_and_missing_fields_use_sentinels() {
        let source = EnvironmentSource::new()
            .with_navigator(Navigator::default())
            .with_href("   ")
            .with_storage(Arc::new(MemoryStore::new()));

        assert_eq!(
            source.resolve(),
            EnvironmentSnapshot {
                user_agent: UNKNOWN.to_string(),
                url: UNKNOWN.to_string(),
                user_id: ANONYMOUS.to_string(),
            }
        );
    }

    #[test]
    fn test_empty_source_uses_sentinels() {
        let snapshot = EnvironmentSource::new().resolve();
        assert_eq!(snapshot.user_agent, UNKNOWN);
        assert_eq!(snapshot.url, UNKNOWN);
        assert_eq!(snapshot.user_id, ANONYMOUS);
    }

    #[test]
    fn test_empty_and_whitespace_values() {
        for blank in ["", " ", "\t\n"] {
            let snapshot = EnvironmentSource::new()
                .with_user_agent(blank)
                .with_href(blank)
                .with_storage(store(blank))
                .resolve();
            assert_eq!(snapshot.user_agent, UNKNOWN);
            assert_eq!(snapshot.url, UNKNOWN);
            assert_eq!(snapshot.user_id, ANONYMOUS);
        }
    }

    #[test]
    fn test_falsy_looking_values_are_kept() {
        let snapshot = EnvironmentSource::new()
            .with_user_agent("0")
            .with_href("false")
            .with_storage(store("0"))
            .resolve();
        assert_eq!(snapshot.user_agent, "0");
        assert_eq!(snapshot.url, "false");
        assert_eq!(snapshot.user_id, "0");
    }

    #[test]
    fn test_values_are_not_trimmed() {
        let snapshot = EnvironmentSource::new()
            .with_user_agent(" Agent/2 ")
            .resolve();
        assert_eq!(snapshot.user_agent, " Agent/2 ");
    }

    #[test]
    fn test_failing_store_falls_back_and_warns_once() {
        let source = EnvironmentSource::new().with_storage(Arc::new(FailingStore));

        let (snapshot, events) = recording(|| source.resolve());

        assert_eq!(snapshot.user_id, ANONYMOUS);
        let warnings: Vec<_> = events
            .iter()
            .filter(|(level, _)| *level == Level::WARN)
            .collect();
        assert_eq!(warnings.len(), 1);
        let text = &warnings[0].1;
        assert!(text.contains("access denied"), "{text}");
        assert!(text.contains(COMPONENT), "{text}");
    }

    #[test]
    fn test_successful_read_emits_no_warning() {
        let source = EnvironmentSource::new().with_storage(store("user-1"));
        let (_, events) = recording(|| source.resolve());
        assert!(events.iter().all(|(level, _)| *level != Level::WARN));
    }

    #[test]
    fn test_corrupt_file_store_falls_back_and_warns_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();
        let source = EnvironmentSource::new().with_storage(Arc::new(FileStore::new(&path)));

        let (snapshot, events) = recording(|| source.resolve());

        assert_eq!(snapshot.user_id, ANONYMOUS);
        let warnings: Vec<_> = events
            .iter()
            .filter(|(level, _)| *level == Level::WARN)
            .collect();
        assert_eq!(warnings.len(), 1);
        let text = &warnings[0].1;
        assert!(text.contains("corrupt"), "{text}");
        assert!(text.contains("\"file\""), "{text}");
        assert!(text.contains(COMPONENT), "{text}");
    }

    #[test]
    fn test_merge_prefers_explicit() {
        let ambient = EnvironmentSource::new()
            .with_user_agent("Ambient/1")
            .with_href("https://ambient")
            .with_storage(store("ambient-user"));
        let explicit = EnvironmentSource::new().with_user_agent("Explicit/1");

        let snapshot = explicit.merge_over(&ambient).resolve();
        assert_eq!(snapshot.user_agent, "Explicit/1");
        assert_eq!(snapshot.url, "https://ambient");
        assert_eq!(snapshot.user_id, "ambient-user");
    }

    #[test]
    fn test_merge_present_but_empty_navigator_wins() {
        let ambient = EnvironmentSource::new().with_user_agent("Ambient/1");
        let explicit = EnvironmentSource::new().with_navigator(Navigator::default());

        let snapshot = explicit.merge_over(&ambient).resolve();
        assert_eq!(snapshot.user_agent, UNKNOWN);
    }

    #[test]
    fn test_clock_fallback_and_override() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let source = EnvironmentSource::new().with_clock(Arc::new(FixedClock(instant)));
        assert_eq!(source.now(), instant);

        let closure = EnvironmentSource::new().with_clock(Arc::new(move || instant));
        assert_eq!(closure.now(), instant);

        let before = Utc::now();
        let wall = EnvironmentSource::new().now();
        assert!(wall >= before);
    }

    #[test]
    fn test_ambient_uses_config_overrides() {
        let config = ReporterConfig {
            user_agent: Some("Panel/3.1".to_string()),
            url: Some("https://panel.example.org/donations".to_string()),
            storage_enabled: false,
            storage_path: None,
        };
        let ambient = EnvironmentSource::ambient(&config);
        assert!(ambient.storage.is_none());
        assert!(ambient.clock.is_some());

        let snapshot = ambient.resolve();
        assert_eq!(snapshot.user_agent, "Panel/3.1");
        assert_eq!(snapshot.url, "https://panel.example.org/donations");
        assert_eq!(snapshot.user_id, ANONYMOUS);
    }

    #[test]
    fn test_ambient_reads_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        FileStore::new(&path).set_item(USER_ID_KEY, "volunteer-7").unwrap();

        let config = ReporterConfig {
            storage_path: Some(path),
            ..ReporterConfig::default()
        };
        let snapshot = EnvironmentSource::ambient(&config).resolve();
        assert_eq!(snapshot.user_id, "volunteer-7");
        assert!(snapshot.user_agent.starts_with("crashnote/"));
        assert_ne!(snapshot.url, UNKNOWN);
    }

    #[test]
    fn test_process_navigator() {
        let navigator = Navigator::process();
        let agent = navigator.user_agent.unwrap();
        assert!(agent.contains(std::env::consts::OS));
        assert!(agent.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let snapshot = EnvironmentSnapshot {
            user_agent: "a".to_string(),
            url: "b".to_string(),
            user_id: "c".to_string(),
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["userAgent"], "a");
        assert_eq!(json["url"], "b");
        assert_eq!(json["userId"], "c");
    }

    #[test]
    fn test_source_debug_hides_collaborators() {
        let source = EnvironmentSource::new().with_storage(Arc::new(MemoryStore::new()));
        let debug = format!("{source:?}");
        assert!(debug.contains("memory"));
    }
}
