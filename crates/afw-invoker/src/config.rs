use tracing::warn;

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

pub const HISTORY_CAPACITY_ENV: &str = "AFW_HISTORY_CAPACITY";
pub const UNDO_NOTIFICATIONS_ENV: &str = "AFW_UNDO_NOTIFICATIONS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Maximum retained entries; the oldest are evicted first.
    pub capacity: usize,
    /// Schedule the show-undo operation for mappings that carry a message.
    pub notify: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_HISTORY_CAPACITY,
            notify: true,
        }
    }
}

impl HistoryConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_notify(mut self, notify: bool) -> Self {
        self.notify = notify;
        self
    }

    /// Reads overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Malformed values are logged and replaced by the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(raw) = lookup(HISTORY_CAPACITY_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(capacity) if capacity > 0 => config.capacity = capacity,
                _ => warn!(var = HISTORY_CAPACITY_ENV, value = %raw, "ignoring invalid history capacity"),
            }
        }
        if let Some(raw) = lookup(UNDO_NOTIFICATIONS_ENV) {
            match parse_flag(&raw) {
                Some(notify) => config.notify = notify,
                None => warn!(var = UNDO_NOTIFICATIONS_ENV, value = %raw, "ignoring invalid flag"),
            }
        }
        config
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
