use std::time::Duration;

/// Provider configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    /// Tenant namespace prepended to every key. Surrounding whitespace is
    /// dropped; an empty prefix disables isolation.
    pub prefix: String,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(mut self, prefix: impl AsRef<str>) -> Self {
        self.prefix = prefix.as_ref().trim().to_string();
        self
    }
}

/// SQLite connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout: Duration,
    /// Page cache size in KiB (`PRAGMA cache_size = -N`).
    pub cache_size_kb: i64,
    /// Minimum time between expired-key purges run from write transactions.
    /// `None` disables the periodic purge.
    pub autovacuum_interval: Option<Duration>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(5000),
            cache_size_kb: 64 * 1024,
            autovacuum_interval: Some(Duration::from_secs(60)),
        }
    }
}

impl StoreOptions {
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn cache_size_kb(mut self, kb: i64) -> Self {
        self.cache_size_kb = kb;
        self
    }

    pub fn autovacuum_interval(mut self, interval: Option<Duration>) -> Self {
        self.autovacuum_interval = interval;
        self
    }
}
