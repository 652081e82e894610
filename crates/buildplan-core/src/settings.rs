//! Resolver settings with built-in defaults.

use serde::{Deserialize, Serialize};

/// Keys every plan must carry unless the caller says otherwise.
pub const DEFAULT_REQUIRED_KEYS: &[&str] = &["sdk", "android.application_id"];

/// Key fragments that mark a value as secret.
pub const DEFAULT_SECRET_KEYS: &[&str] = &[
    "password",
    "token",
    "secret",
    "private_key",
    "api_key",
    "credential",
];

/// Settings that shape resolution but are not part of any descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverSettings {
    /// Dotted paths that must resolve to a non-blank value, checked in order.
    #[serde(default = "default_required_keys")]
    pub required_keys: Vec<String>,

    /// Case-insensitive key fragments whose values are redacted on output.
    #[serde(default = "default_secret_keys")]
    pub secret_keys: Vec<String>,
}

fn default_required_keys() -> Vec<String> {
    DEFAULT_REQUIRED_KEYS.iter().map(|k| k.to_string()).collect()
}

fn default_secret_keys() -> Vec<String> {
    DEFAULT_SECRET_KEYS.iter().map(|k| k.to_string()).collect()
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            required_keys: default_required_keys(),
            secret_keys: default_secret_keys(),
        }
    }
}

impl ResolverSettings {
    /// Add a required key (ignored if already present).
    pub fn with_required_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if !self.required_keys.contains(&key) {
            self.required_keys.push(key);
        }
        self
    }

    /// Replace the required keys.
    pub fn with_required_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Whether a key name looks like it holds a secret.
    pub fn is_secret_key(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.secret_keys
            .iter()
            .any(|fragment| key.contains(&fragment.to_lowercase()))
    }
}
