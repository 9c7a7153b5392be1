//! Tracing subscriber setup.
//!
//! Filter comes from `HARNESS_LOG`, then `RUST_LOG`, defaulting to `info`.
//! `HARNESS_LOG_FORMAT=json` switches to JSON lines. Installation is
//! idempotent, so every test may call [`init_for_tests`].

use tracing_subscriber::EnvFilter;

/// Filter variable checked before `RUST_LOG`
pub const LOG_ENV: &str = "HARNESS_LOG";

/// Output format variable (`json` or `text`)
pub const LOG_FORMAT_ENV: &str = "HARNESS_LOG_FORMAT";

const DEFAULT_DIRECTIVE: &str = "info";

/// Output format of the subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable, compact
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Filter directive from the given environment lookup
pub fn filter_directive<F>(lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(LOG_ENV)
        .or_else(|| lookup("RUST_LOG"))
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_string())
}

fn env_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Install the global subscriber; returns `false` if one was already set
pub fn init() -> bool {
    let filter = env_filter(&filter_directive(env));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    match LogFormat::parse(env(LOG_FORMAT_ENV).as_deref()) {
        LogFormat::Json => builder.json().try_init().is_ok(),
        LogFormat::Text => builder.compact().try_init().is_ok(),
    }
}

/// Subscriber that writes through the test harness' captured output
pub fn init_for_tests() {
    let filter = env_filter(&filter_directive(env));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    mod directive_tests {
        use super::*;

        #[test]
        fn test_default_is_info() {
            assert_eq!(filter_directive(lookup(&[])), "info");
        }

        #[test]
        fn test_harness_log_wins() {
            let vars = [("HARNESS_LOG", "toolshop_harness=debug"), ("RUST_LOG", "warn")];
            assert_eq!(filter_directive(lookup(&vars)), "toolshop_harness=debug");
        }

        #[test]
        fn test_rust_log_fallback() {
            assert_eq!(filter_directive(lookup(&[("RUST_LOG", "warn")])), "warn");
        }

        #[test]
        fn test_blank_value_ignored() {
            assert_eq!(filter_directive(lookup(&[("HARNESS_LOG", "  ")])), "info");
        }
    }

    mod format_tests {
        use super::*;

        #[test]
        fn test_format_parse() {
            assert_eq!(LogFormat::parse(Some("JSON")), LogFormat::Json);
            assert_eq!(LogFormat::parse(Some("text")), LogFormat::Text);
            assert_eq!(LogFormat::parse(None), LogFormat::Text);
        }

        #[test]
        fn test_init_is_idempotent() {
            init_for_tests();
            init_for_tests();
            assert!(!init());
        }
    }
}
