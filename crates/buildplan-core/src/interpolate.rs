//! `${...}` reference expansion in string values.
//!
//! `${a.b}` is replaced with the scalar at path `a.b` of the merged tree,
//! `${env:NAME}` with an environment variable from the injected lookup.
//! `$${` produces a literal `${`.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use regex_lite::Regex;
use serde_json::{Map, Value};

use crate::descriptor::value_type;
use crate::error::ConfigError;
use crate::path::{join, lookup_path};

/// Prefix selecting an environment variable reference.
pub const ENV_PREFIX: &str = "env:";

/// Longest chain of references followed before giving up.
const MAX_DEPTH: usize = 32;

/// Environment variable lookup, injected by the caller.
pub trait EnvLookup {
    fn var(&self, name: &str) -> Option<String>;
}

/// An environment with no variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEnv;

impl EnvLookup for NoEnv {
    fn var(&self, _name: &str) -> Option<String> {
        None
    }
}

impl EnvLookup for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl EnvLookup for BTreeMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl<T: EnvLookup + ?Sized> EnvLookup for &T {
    fn var(&self, name: &str) -> Option<String> {
        (**self).var(name)
    }
}

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\$\{|\$\{([^{}]*)\}").expect("reference pattern is a valid regex")
    })
}

/// True if `s` contains anything interpolation would rewrite.
pub fn has_references(s: &str) -> bool {
    s.contains("${")
}

/// Escape `s` so that expansion yields it unchanged.
pub fn escape(s: &str) -> String {
    s.replace("${", "$${")
}

/// Expands references against a fixed snapshot of the merged tree.
pub struct Interpolator<'a> {
    root: &'a Map<String, Value>,
    env: &'a dyn EnvLookup,
}

impl<'a> Interpolator<'a> {
    pub fn new(root: &'a Map<String, Value>, env: &'a dyn EnvLookup) -> Self {
        Self { root, env }
    }

    /// Expand every string inside `value`; `key` is its path, for errors.
    pub fn expand_value(&self, key: &str, value: &mut Value) -> Result<(), ConfigError> {
        match value {
            Value::String(s) => {
                if has_references(s) {
                    *s = self.expand_str(key, s)?;
                }
            }
            Value::Array(items) => {
                for (index, item) in items.iter_mut().enumerate() {
                    self.expand_value(&format!("{key}[{index}]"), item)?;
                }
            }
            Value::Object(map) => {
                for (child, item) in map.iter_mut() {
                    self.expand_value(&join(key, child), item)?;
                }
            }
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
        Ok(())
    }

    /// Expand the references in a single string found at `key`.
    pub fn expand_str(&self, key: &str, input: &str) -> Result<String, ConfigError> {
        let mut stack = Vec::new();
        self.expand_with(key, input, &mut stack)
    }

    fn expand_with(
        &self,
        key: &str,
        input: &str,
        stack: &mut Vec<String>,
    ) -> Result<String, ConfigError> {
        let mut out = String::with_capacity(input.len());
        let mut last = 0;
        for caps in reference_pattern().captures_iter(input) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            out.push_str(&input[last..whole.start()]);
            last = whole.end();
            match caps.get(1) {
                None => out.push_str("${"),
                Some(reference) => {
                    let resolved = self.resolve_reference(key, reference.as_str().trim(), stack)?;
                    out.push_str(&resolved);
                }
            }
        }
        out.push_str(&input[last..]);
        Ok(out)
    }

    fn resolve_reference(
        &self,
        key: &str,
        reference: &str,
        stack: &mut Vec<String>,
    ) -> Result<String, ConfigError> {
        if reference.is_empty() {
            return Err(ConfigError::unresolvable(reference, key, "empty reference"));
        }

        if let Some(name) = reference.strip_prefix(ENV_PREFIX) {
            return self.env.var(name.trim()).ok_or_else(|| {
                ConfigError::unresolvable(reference, key, "environment variable is not set")
            });
        }

        if stack.iter().any(|seen| seen == reference) || stack.len() >= MAX_DEPTH {
            return Err(ConfigError::unresolvable(reference, key, "reference cycle"));
        }

        let target = lookup_path(self.root, reference)
            .ok_or_else(|| ConfigError::unresolvable(reference, key, "no such key"))?;

        match target {
            Value::String(s) => {
                stack.push(reference.to_string());
                let expanded = self.expand_with(reference, s, stack);
                stack.pop();
                expanded
            }
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(ConfigError::unresolvable(
                reference,
                key,
                format!("refers to a {}, not a scalar", value_type(other)),
            )),
        }
    }
}

/// Expand every value of `tree` against a snapshot of itself.
pub fn interpolate_tree(tree: &mut Map<String, Value>, env: &dyn EnvLookup) -> Result<(), ConfigError> {
    let snapshot = tree.clone();
    let interpolator = Interpolator::new(&snapshot, env);
    for (key, value) in tree.iter_mut() {
        interpolator.expand_value(key, value)?;
    }
    Ok(())
}
