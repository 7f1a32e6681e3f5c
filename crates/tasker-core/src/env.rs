//! Environment variable helpers used by the runtime configuration
//!
//! ```ignore
//! use tasker_core::env::{env_get, env_get_bool, env_get_micros};
//!
//! let stack: usize = env_get("TASKER_STACK_SIZE", 0);
//! let backoff = env_get_micros("TASKER_LOCK_BACKOFF_US", 50);
//! let flush = env_get_bool("TASKER_FLUSH_EPRINT", false);
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Parse `key` as `T`, falling back to `default` when unset or unparsable
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Boolean flag: "1", "true", "yes", "on" (any case) are true, any other
/// value is false, unset returns `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// `Some(T)` only when `key` is set and parses
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Duration given in microseconds
#[inline]
pub fn env_get_micros(key: &str, default_us: u64) -> Duration {
    Duration::from_micros(env_get(key, default_us))
}

#[inline]
pub fn env_is_set(key: &str) -> bool {
    std::env::var(key).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Priority;

    #[test]
    fn test_unset_returns_default() {
        let val: usize = env_get("__TASKER_TEST_UNSET__", 42);
        assert_eq!(val, 42);
        assert!(env_get_bool("__TASKER_TEST_UNSET__", true));
        assert_eq!(env_get_opt::<u32>("__TASKER_TEST_UNSET__"), None);
        assert_eq!(env_get_str("__TASKER_TEST_UNSET__", "tasker"), "tasker");
        assert!(!env_is_set("__TASKER_TEST_UNSET__"));
    }

    #[test]
    fn test_parse_typed_values() {
        std::env::set_var("__TASKER_TEST_PRIO__", " high ");
        assert_eq!(env_get("__TASKER_TEST_PRIO__", Priority::Normal), Priority::High);
        std::env::remove_var("__TASKER_TEST_PRIO__");

        std::env::set_var("__TASKER_TEST_US__", "250");
        assert_eq!(env_get_micros("__TASKER_TEST_US__", 50), Duration::from_micros(250));
        std::env::remove_var("__TASKER_TEST_US__");
    }

    #[test]
    fn test_invalid_parse_falls_back() {
        std::env::set_var("__TASKER_TEST_BAD__", "not_a_number");
        let val: u32 = env_get("__TASKER_TEST_BAD__", 99);
        assert_eq!(val, 99);
        std::env::remove_var("__TASKER_TEST_BAD__");
    }

    #[test]
    fn test_bool_variants() {
        let cases = [("1", true), ("TRUE", true), ("on", true), ("0", false), ("garbage", false)];
        for (raw, want) in cases {
            std::env::set_var("__TASKER_TEST_BOOL__", raw);
            assert_eq!(env_get_bool("__TASKER_TEST_BOOL__", !want), want, "value {raw}");
        }
        std::env::remove_var("__TASKER_TEST_BOOL__");
    }
}
