//! Defaults and runtime configuration for the port watcher

use std::path::PathBuf;
use std::time::Duration;

use crate::notify::RetryPolicy;

/// Port specification scanned when none is given
pub const DEFAULT_PORT_SPEC: &str = "1-1024";

/// State file path, relative to the working directory
pub const DEFAULT_STATE_FILE: &str = "port_state.json";

/// Seconds between the start of two scan passes
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Per-probe connect timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// [`DEFAULT_TIMEOUT`] as given on the command line
pub const DEFAULT_TIMEOUT_SECS: &str = "1.0";

/// Maximum probes in flight during one scan pass
pub const DEFAULT_CONCURRENCY: usize = 50;

// ====== Notification ======

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Per-attempt HTTP timeout for the bot API
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Parse a positive number of seconds that fits in a [`Duration`].
pub fn parse_timeout_secs(s: &str) -> Result<Duration, String> {
    let v: f64 = s.trim().parse().map_err(|e| format!("{s:?}: {e}"))?;
    if v <= 0.0 {
        return Err(format!("{s} is not a positive number of seconds"));
    }
    Duration::try_from_secs_f64(v).map_err(|e| format!("{s} seconds: {e}"))
}

/// Everything one watch loop needs besides its notifier.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub host: String,
    pub ports: Vec<u16>,
    pub state_file: PathBuf,
    pub interval: Duration,
    pub timeout: Duration,
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl WatchConfig {
    /// Config with the default interval, timeout, concurrency and retry policy.
    pub fn new(host: impl Into<String>, ports: Vec<u16>, state_file: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            ports,
            state_file: state_file.into(),
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            timeout: DEFAULT_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
        }
    }
}
