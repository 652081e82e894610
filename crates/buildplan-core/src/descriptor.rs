//! Parsed build descriptors.
//!
//! A descriptor is one unit of declarative build configuration: a table of
//! keys to scalar, list, or nested-table values. Plugin and dependency
//! declarations are split out at parse time so that version pinning can be
//! checked separately from the ordinary last-wins merge.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::merge::deep_merge;

/// Top-level flag marking a descriptor as an override layer.
pub const OVERRIDE_KEY: &str = "override";

/// Section holding plugin declarations.
pub const PLUGINS_KEY: &str = "plugins";

/// Section holding dependency declarations.
pub const DEPENDENCIES_KEY: &str = "dependencies";

/// Section holding repository names or URLs.
pub const REPOSITORIES_KEY: &str = "repositories";

/// Short alias accepted for [`REPOSITORIES_KEY`].
pub const REPOS_ALIAS: &str = "repos";

/// Section listing included subprojects.
pub const INCLUDE_KEY: &str = "include";

/// Section holding SDK paths.
pub const SDK_KEY: &str = "sdk";

/// How a descriptor participates in version pinning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DescriptorKind {
    /// Ordinary layer. Re-pinning a version to a different value is a conflict.
    #[default]
    Base,
    /// Local override layer. May replace any pinned version.
    Override,
}

/// A plugin or dependency declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declaration {
    /// Pinned version, if this declaration pins one.
    pub version: Option<String>,

    /// Whether the plugin is applied (plugins only).
    pub apply: Option<bool>,

    /// Dependency configuration such as `implementation` (dependencies only).
    pub configuration: Option<String>,

    /// Explicit `override = true`: replaces a previously pinned version.
    pub force: bool,
}

impl Declaration {
    /// A declaration that only pins a version.
    pub fn version(version: impl Into<String>) -> Self {
        Self {
            version: Some(version.into()),
            ..Default::default()
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDeclaration {
    Version(String),
    Table(DeclarationTable),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DeclarationTable {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    apply: Option<bool>,
    #[serde(default)]
    configuration: Option<String>,
    #[serde(default, rename = "override")]
    force: bool,
}

impl From<RawDeclaration> for Declaration {
    fn from(raw: RawDeclaration) -> Self {
        match raw {
            RawDeclaration::Version(version) => Declaration::version(version),
            RawDeclaration::Table(table) => Declaration {
                version: table.version,
                apply: table.apply,
                configuration: table.configuration,
                force: table.force,
            },
        }
    }
}

/// One parsed, immutable descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    origin: String,
    kind: DescriptorKind,
    plugins: BTreeMap<String, Declaration>,
    dependencies: BTreeMap<String, Declaration>,
    entries: Map<String, Value>,
}

impl Descriptor {
    /// Parse a descriptor from an already-decoded document.
    ///
    /// `origin` labels the descriptor in error messages (usually a file path).
    pub fn from_value(origin: impl Into<String>, value: Value) -> Result<Self, ConfigError> {
        let origin = origin.into();
        let mut entries = match value {
            Value::Object(map) => map,
            other => {
                return Err(ConfigError::malformed(
                    &origin,
                    format!("expected a table at the top level, found {}", value_type(&other)),
                ))
            }
        };

        let kind = match entries.remove(OVERRIDE_KEY) {
            None | Some(Value::Bool(false)) => DescriptorKind::Base,
            Some(Value::Bool(true)) => DescriptorKind::Override,
            Some(other) => {
                return Err(ConfigError::malformed(
                    &origin,
                    format!("'{OVERRIDE_KEY}' must be a boolean, found {}", value_type(&other)),
                ))
            }
        };

        let mut plugins = match entries.remove(PLUGINS_KEY) {
            Some(section) => parse_declarations(&origin, PLUGINS_KEY, section)?,
            None => BTreeMap::new(),
        };
        if let Some((id, declaration)) = take_plugin_shorthand(&origin, &mut entries)? {
            if plugins.contains_key(&id) {
                return Err(ConfigError::malformed(
                    &origin,
                    format!("plugin '{id}' is declared twice"),
                ));
            }
            plugins.insert(id, declaration);
        }
        if let Some((id, _)) = plugins.iter().find(|(_, d)| d.configuration.is_some()) {
            return Err(ConfigError::malformed(
                &origin,
                format!("plugin '{id}': 'configuration' only applies to dependencies"),
            ));
        }

        let dependencies = match entries.remove(DEPENDENCIES_KEY) {
            Some(section) => parse_declarations(&origin, DEPENDENCIES_KEY, section)?,
            None => BTreeMap::new(),
        };
        if let Some((id, _)) = dependencies.iter().find(|(_, d)| d.apply.is_some()) {
            return Err(ConfigError::malformed(
                &origin,
                format!("dependency '{id}': 'apply' only applies to plugins"),
            ));
        }

        if let Some(repos) = entries.remove(REPOS_ALIAS) {
            let merged = match entries.remove(REPOSITORIES_KEY) {
                Some(existing) => deep_merge(existing, repos),
                None => repos,
            };
            entries.insert(REPOSITORIES_KEY.to_string(), merged);
        }
        check_string_list(&origin, &entries, REPOSITORIES_KEY)?;
        check_string_list(&origin, &entries, INCLUDE_KEY)?;
        check_sdk(&origin, &entries)?;

        Ok(Self {
            origin,
            kind,
            plugins,
            dependencies,
            entries,
        })
    }

    /// Parse a descriptor from JSON text.
    pub fn from_json_str(origin: impl Into<String>, content: &str) -> Result<Self, ConfigError> {
        let origin = origin.into();
        let value: Value = serde_json::from_str(content)
            .map_err(|e| ConfigError::malformed(&origin, format!("JSON parse error: {e}")))?;
        Self::from_value(origin, value)
    }

    /// Return the same descriptor with a different kind.
    pub fn with_kind(mut self, kind: DescriptorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    pub fn is_override(&self) -> bool {
        self.kind == DescriptorKind::Override
    }

    pub fn plugins(&self) -> &BTreeMap<String, Declaration> {
        &self.plugins
    }

    pub fn dependencies(&self) -> &BTreeMap<String, Declaration> {
        &self.dependencies
    }

    /// Everything except plugin and dependency declarations.
    pub fn entries(&self) -> &Map<String, Value> {
        &self.entries
    }

    /// Look up a top-level entry.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }
}

fn parse_declarations(
    origin: &str,
    section: &str,
    value: Value,
) -> Result<BTreeMap<String, Declaration>, ConfigError> {
    let table = match value {
        Value::Object(table) => table,
        Value::Null => {
            return Err(ConfigError::malformed(
                origin,
                format!("'{section}' cannot be removed with null; pinned versions are never unpinned"),
            ))
        }
        other => {
            return Err(ConfigError::malformed(
                origin,
                format!("'{section}' must be a table, found {}", value_type(&other)),
            ))
        }
    };

    let mut declarations = BTreeMap::new();
    for (id, raw) in table {
        if id.trim().is_empty() {
            return Err(ConfigError::malformed(
                origin,
                format!("'{section}' contains an empty id"),
            ));
        }
        if raw.is_null() {
            return Err(ConfigError::malformed(
                origin,
                format!("'{section}.{id}' cannot be removed with null; pinned versions are never unpinned"),
            ));
        }
        let raw: RawDeclaration = serde_json::from_value(raw).map_err(|_| {
            ConfigError::malformed(
                origin,
                format!(
                    "'{section}.{id}' must be a version string or a table of \
                     version/apply/configuration/override"
                ),
            )
        })?;
        declarations.insert(id, Declaration::from(raw));
    }
    Ok(declarations)
}

/// `{ plugin = "x", version = "1.0" }` declares a single plugin.
fn take_plugin_shorthand(
    origin: &str,
    entries: &mut Map<String, Value>,
) -> Result<Option<(String, Declaration)>, ConfigError> {
    let id = match entries.remove("plugin") {
        None => return Ok(None),
        Some(Value::String(id)) if !id.trim().is_empty() => id,
        Some(_) => {
            return Err(ConfigError::malformed(
                origin,
                "'plugin' must be a non-empty string",
            ))
        }
    };
    let version = match entries.remove("version") {
        None => None,
        Some(Value::String(version)) => Some(version),
        Some(other) => {
            return Err(ConfigError::malformed(
                origin,
                format!("'version' must be a string, found {}", value_type(&other)),
            ))
        }
    };
    Ok(Some((
        id,
        Declaration {
            version,
            ..Default::default()
        },
    )))
}

/// `null` is accepted: it removes the inherited list during the merge.
fn check_string_list(origin: &str, entries: &Map<String, Value>, key: &str) -> Result<(), ConfigError> {
    match entries.get(key) {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Array(items)) if items.iter().all(Value::is_string) => Ok(()),
        Some(_) => Err(ConfigError::malformed(
            origin,
            format!("'{key}' must be a list of strings"),
        )),
    }
}

fn check_sdk(origin: &str, entries: &Map<String, Value>) -> Result<(), ConfigError> {
    match entries.get(SDK_KEY) {
        None | Some(Value::Null) | Some(Value::String(_)) => Ok(()),
        Some(Value::Object(paths))
            if paths.values().all(|path| path.is_string() || path.is_null()) =>
        {
            Ok(())
        }
        Some(_) => Err(ConfigError::malformed(
            origin,
            format!("'{SDK_KEY}' must be a path or a table of paths"),
        )),
    }
}

/// Short human name for a JSON value's type.
pub(crate) fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "table",
    }
}
