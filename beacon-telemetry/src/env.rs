// Environment variable access

use std::collections::HashMap;
use std::env;

/// Source of environment variables.
///
/// Resolution code reads the environment only through this trait, so tests can
/// supply a map instead of mutating the process environment.
pub trait EnvSource: Send + Sync {
    /// Raw lookup.
    fn get(&self, key: &str) -> Option<String>;

    /// Lookup that treats an empty or whitespace-only value as absent.
    fn non_empty(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// First non-empty value among `aliases`, in order.
    fn first_of(&self, aliases: &[&str]) -> Option<String> {
        aliases.iter().find_map(|key| self.non_empty(key))
    }

    /// Whether any of `keys` is set to a non-empty value.
    fn any_set(&self, keys: &[&str]) -> bool {
        keys.iter().any(|key| self.non_empty(key).is_some())
    }
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

impl EnvSource for HashMap<&'static str, &'static str> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).map(|v| v.to_string())
    }
}
