//! Collector configuration.
//!
//! Defaults can be overridden from the environment:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `TETHER_COLLECTOR_BACKGROUND` | `0`, `false`, `off` or `no` disables the worker thread |
//! | `TETHER_COLLECTOR_THREAD_NAME` | name of the worker thread |

/// Environment variable toggling the background worker.
pub const BACKGROUND_ENV: &str = "TETHER_COLLECTOR_BACKGROUND";

/// Environment variable naming the worker thread.
pub const THREAD_NAME_ENV: &str = "TETHER_COLLECTOR_THREAD_NAME";

const DEFAULT_THREAD_NAME: &str = "tether-collector";

/// Configuration for a [`DeferredCollector`](crate::DeferredCollector).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectorConfig {
    /// Spawn a worker thread that drains released lifecycles as they arrive.
    ///
    /// When off, queued lifecycles are only disposed by
    /// [`collect_pending`](crate::DeferredCollector::collect_pending).
    pub background: bool,
    /// Name given to the worker thread.
    pub thread_name: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        CollectorConfig {
            background: true,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

impl CollectorConfig {
    /// Defaults overridden by `TETHER_COLLECTOR_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(value) = lookup(BACKGROUND_ENV) {
            match parse_flag(&value) {
                Some(flag) => config.background = flag,
                None => tracing::warn!(
                    var = BACKGROUND_ENV,
                    %value,
                    "unrecognized flag value, keeping default"
                ),
            }
        }
        if let Some(name) = lookup(THREAD_NAME_ENV).filter(|n| !n.trim().is_empty()) {
            config.thread_name = name;
        }
        config
    }

    /// Collector drained only on explicit request.
    pub fn manual() -> Self {
        Self::default().with_background(false)
    }

    #[must_use]
    pub fn with_background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_string())
        }
    }

    #[test]
    fn defaults_without_env() {
        assert_eq!(CollectorConfig::from_lookup(|_| None), CollectorConfig::default());
        assert!(CollectorConfig::default().background);
    }

    #[test]
    fn background_can_be_disabled() {
        for off in ["0", "false", "OFF", " no "] {
            let config = CollectorConfig::from_lookup(lookup(&[(BACKGROUND_ENV, off)]));
            assert!(!config.background, "{off:?} should disable the worker");
        }
    }

    #[test]
    fn unknown_flag_keeps_default() {
        let config = CollectorConfig::from_lookup(lookup(&[(BACKGROUND_ENV, "maybe")]));
        assert!(config.background);
    }

    #[test]
    fn thread_name_override() {
        let config = CollectorConfig::from_lookup(lookup(&[(THREAD_NAME_ENV, "reaper")]));
        assert_eq!(config.thread_name, "reaper");

        let blank = CollectorConfig::from_lookup(lookup(&[(THREAD_NAME_ENV, "  ")]));
        assert_eq!(blank.thread_name, DEFAULT_THREAD_NAME);
    }

    #[test]
    fn builders() {
        let config = CollectorConfig::manual().with_thread_name("x");
        assert_eq!(
            config,
            CollectorConfig {
                background: false,
                thread_name: "x".to_string(),
            }
        );
    }
}
