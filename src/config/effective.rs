//! Effective plan with full provenance
//!
//! The effective plan captures the resolved build plan plus information
//! about which descriptors contributed to it.

use std::fmt::Write as _;
use std::path::PathBuf;

use buildplan_core::{
    ConfigError, Descriptor, DescriptorKind, EnvLookup, ResolvedPlan, Resolver, ResolverSettings,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::defaults::BuiltinDefaults;
use crate::loader::{expand_paths, load_descriptor, DescriptorSource, FileSystem};

/// Schema version for effective_plan
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "buildplan/effective_plan@1";

/// Environment variable naming a local override descriptor.
pub const OVERRIDE_ENV_VAR: &str = "BUILDPLAN_OVERRIDE";

/// Replacement text for redacted values.
pub const REDACTED: &str = "[REDACTED]";

/// What to resolve and how.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    /// Descriptor files or directories, lowest precedence first.
    pub paths: Vec<PathBuf>,

    /// Local override descriptor, applied last.
    pub override_path: Option<PathBuf>,

    pub settings: ResolverSettings,

    /// Start from [`BuiltinDefaults`] (default: true)
    pub builtin_defaults: bool,

    /// Leave secret values in the output (default: false)
    pub show_secrets: bool,
}

impl PlanRequest {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            override_path: None,
            settings: ResolverSettings::default(),
            builtin_defaults: true,
            show_secrets: false,
        }
    }

    pub fn with_override(mut self, path: impl Into<PathBuf>) -> Self {
        self.override_path = Some(path.into());
        self
    }

    pub fn with_settings(mut self, settings: ResolverSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn without_defaults(mut self) -> Self {
        self.builtin_defaults = false;
        self
    }

    pub fn show_secrets(mut self, show: bool) -> Self {
        self.show_secrets = show;
        self
    }
}

/// Effective plan with full provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectivePlan {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// When this plan was computed
    pub created_at: DateTime<Utc>,

    /// The resolved plan, with secrets redacted
    pub plan: Value,

    /// Contributing sources in precedence order
    pub sources: Vec<DescriptorSource>,

    /// Redacted key paths
    pub redactions: Vec<String>,

    #[serde(skip)]
    resolved: ResolvedPlan,
}

impl EffectivePlan {
    /// Load every descriptor the request names and resolve them.
    ///
    /// Layer order: builtin defaults, then `paths` (directories expanded),
    /// then the override descriptor from the request or from
    /// [`OVERRIDE_ENV_VAR`].
    pub fn build(
        request: &PlanRequest,
        fs: &dyn FileSystem,
        env: &dyn EnvLookup,
    ) -> Result<Self, ConfigError> {
        let mut descriptors: Vec<Descriptor> = Vec::new();
        let mut sources = Vec::new();

        if request.builtin_defaults {
            descriptors.push(BuiltinDefaults::default().to_descriptor()?);
            sources.push(DescriptorSource::builtin());
        }

        for path in expand_paths(fs, &request.paths)? {
            let loaded = load_descriptor(fs, &path, DescriptorKind::Base)?;
            descriptors.push(loaded.descriptor);
            sources.push(loaded.source);
        }

        if let Some((path, named_by)) = override_path(request, env) {
            let loaded = load_descriptor(fs, &path, DescriptorKind::Override)
                .map_err(|e| named_reference(e, named_by))?;
            descriptors.push(loaded.descriptor);
            sources.push(loaded.source);
        }

        if descriptors.is_empty() {
            return Err(ConfigError::NoDescriptors);
        }

        let resolver = Resolver::new(request.settings.clone()).with_env(env);
        let resolved = resolver.resolve(&descriptors)?;

        let mut plan = resolved.to_value()?;
        let redactions = if request.show_secrets {
            Vec::new()
        } else {
            redact_secrets(&mut plan, &request.settings)
        };

        tracing::info!(
            sources = sources.len(),
            redactions = redactions.len(),
            "built effective plan"
        );

        Ok(Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            plan,
            sources,
            redactions,
            resolved,
        })
    }

    /// The resolved plan, secrets included.
    pub fn resolved(&self) -> &ResolvedPlan {
        &self.resolved
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Get a plan value by path (dot-separated, dotted keys matched first)
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.plan
            .as_object()
            .and_then(|plan| buildplan_core::lookup_path(plan, path))
    }

    /// Get a plan value as string
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|v| v.as_str())
    }

    /// Short summary for terminals.
    pub fn to_human(&self) -> String {
        let plan = &self.resolved;
        let mut out = String::new();

        let _ = writeln!(out, "Plan resolved from {} source(s)", self.sources.len());
        for source in &self.sources {
            match &source.path {
                Some(path) => {
                    let _ = writeln!(out, "  - {:?}: {}", source.origin, path);
                }
                None => {
                    let _ = writeln!(out, "  - {:?}", source.origin);
                }
            }
        }

        for (name, path) in &plan.sdk {
            let _ = writeln!(out, "SDK {}: {}", name, path);
        }
        if let Some(id) = &plan.android.application_id {
            let _ = writeln!(out, "Application: {}", id);
        }
        if let Some(compile) = plan.android.compile_sdk {
            let _ = writeln!(out, "Compile SDK: {}", compile);
        }
        if !plan.repositories.is_empty() {
            let _ = writeln!(out, "Repositories: {}", plan.repositories.join(", "));
        }
        if !plan.include.is_empty() {
            let _ = writeln!(out, "Modules: {}", plan.include.join(", "));
        }
        if !plan.plugins.is_empty() {
            let _ = writeln!(out, "Plugins:");
            for (id, plugin) in &plan.plugins {
                let applied = if plugin.apply { "" } else { " (not applied)" };
                let _ = writeln!(out, "  {} {}{}", id, plugin.version, applied);
            }
        }
        if !plan.dependencies.is_empty() {
            let _ = writeln!(out, "Dependencies:");
            for (id, dependency) in &plan.dependencies {
                match &dependency.version {
                    Some(version) => {
                        let _ = writeln!(out, "  {} {}:{}", dependency.configuration, id, version);
                    }
                    None => {
                        let _ = writeln!(out, "  {} {}", dependency.configuration, id);
                    }
                }
            }
        }
        for (name, build_type) in &plan.build_types {
            let mut flags = Vec::new();
            if build_type.debuggable {
                flags.push("debuggable".to_string());
            }
            if build_type.minify {
                flags.push("minify".to_string());
            }
            if build_type.shrink_resources {
                flags.push("shrink".to_string());
            }
            if let Some(signing) = &build_type.signing_config {
                flags.push(format!("signing: {}", signing));
            }
            let _ = writeln!(out, "Build type {}: {}", name, flags.join(", "));
        }
        if !self.redactions.is_empty() {
            let _ = writeln!(out, "Redacted: {}", self.redactions.join(", "));
        }
        out
    }
}

/// The override path and the name of whatever supplied it.
fn override_path(request: &PlanRequest, env: &dyn EnvLookup) -> Option<(PathBuf, &'static str)> {
    if let Some(path) = &request.override_path {
        return Some((path.clone(), "--override"));
    }
    env.var(OVERRIDE_ENV_VAR)
        .filter(|p| !p.trim().is_empty())
        .map(|p| (PathBuf::from(p), OVERRIDE_ENV_VAR))
}

fn named_reference(err: ConfigError, named_by: &str) -> ConfigError {
    match err {
        ConfigError::UnresolvableReference {
            reference, reason, ..
        } => ConfigError::UnresolvableReference {
            reference,
            key: named_by.to_string(),
            reason,
        },
        other => other,
    }
}

/// Redact secrets in the plan, returning list of redacted paths
fn redact_secrets(value: &mut Value, settings: &ResolverSettings) -> Vec<String> {
    let mut redactions = Vec::new();
    redact_recursive(value, String::new(), settings, &mut redactions);
    redactions
}

fn redact_recursive(
    value: &mut Value,
    path: String,
    settings: &ResolverSettings,
    redactions: &mut Vec<String>,
) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                let current_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };

                if settings.is_secret_key(key) && !val.is_object() && !val.is_array() {
                    *val = Value::String(REDACTED.to_string());
                    redactions.push(current_path);
                } else {
                    redact_recursive(val, current_path, settings, redactions);
                }
            }
        }
        Value::Array(arr) => {
            for (i, val) in arr.iter_mut().enumerate() {
                let current_path = format!("{}[{}]", path, i);
                redact_recursive(val, current_path, settings, redactions);
            }
        }
        _ => {}
    }
}
