//! The resolved build plan.
//!
//! A plan is produced once per resolution and is read-only afterwards. Its
//! serialized form is itself a valid descriptor, so a plan can be fed back
//! through the resolver and comes out unchanged.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::descriptor::{
    value_type, Declaration, Descriptor, INCLUDE_KEY, REPOSITORIES_KEY, SDK_KEY,
};
use crate::error::ConfigError;
use crate::interpolate::escape;
use crate::path::join;

/// SDK name used when a descriptor gives `sdk` as a single path.
pub const ROOT_SDK: &str = "root";

/// Signing config every Android project has without declaring it.
pub const DEBUG_SIGNING_CONFIG: &str = "debug";

/// Configuration used for dependencies that do not name one.
pub const DEFAULT_CONFIGURATION: &str = "implementation";

/// Origin label of a descriptor rebuilt from a plan.
pub const PLAN_ORIGIN: &str = "resolved-plan";

const ANDROID_KEY: &str = "android";
const BUILD_TYPES_KEY: &str = "build_types";
const SIGNING_CONFIGS_KEY: &str = "signing_configs";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPlugin {
    pub version: String,
    #[serde(default = "default_apply")]
    pub apply: bool,
}

fn default_apply() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDependency {
    #[serde(default = "default_configuration")]
    pub configuration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

fn default_configuration() -> String {
    DEFAULT_CONFIGURATION.to_string()
}

/// Android module settings (`android { defaultConfig { ... } }`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AndroidConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile_sdk: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_sdk: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_sdk: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ndk_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_code: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multidex: Option<bool>,

    /// Java source/target compatibility and Kotlin `jvmTarget`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java_version: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl AndroidConfig {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildType {
    #[serde(default)]
    pub minify: bool,

    #[serde(default)]
    pub shrink_resources: bool,

    #[serde(default)]
    pub debuggable: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub proguard_files: Vec<String>,

    /// Name of the signing config used for this build type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_config: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SigningConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_alias: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_password: Option<String>,
}

/// Fully merged, validated build configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPlan {
    /// SDK name to path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sdk: BTreeMap<String, String>,

    /// Repositories in first-seen order, without duplicates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<String>,

    /// Included subprojects.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub plugins: BTreeMap<String, ResolvedPlugin>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, ResolvedDependency>,

    #[serde(default, skip_serializing_if = "AndroidConfig::is_empty")]
    pub android: AndroidConfig,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub build_types: BTreeMap<String, BuildType>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub signing_configs: BTreeMap<String, SigningConfig>,

    /// Everything else, carried through verbatim.
    #[serde(flatten)]
    pub properties: BTreeMap<String, Value>,
}

impl ResolvedPlan {
    /// Build a plan from the merged tree and the merged version declarations.
    pub fn assemble(
        mut tree: Map<String, Value>,
        plugins: BTreeMap<String, Declaration>,
        dependencies: BTreeMap<String, Declaration>,
    ) -> Result<Self, ConfigError> {
        let sdk = take_sdk(&mut tree)?;
        let repositories = take_section(&mut tree, REPOSITORIES_KEY)?.unwrap_or_default();
        let include = take_section(&mut tree, INCLUDE_KEY)?.unwrap_or_default();
        let android = take_section(&mut tree, ANDROID_KEY)?.unwrap_or_default();
        let build_types = take_section(&mut tree, BUILD_TYPES_KEY)?.unwrap_or_default();
        let signing_configs = take_section(&mut tree, SIGNING_CONFIGS_KEY)?.unwrap_or_default();

        let plugins = plugins
            .into_iter()
            .map(|(id, declaration)| -> Result<(String, ResolvedPlugin), ConfigError> {
                let version = declaration.version.ok_or_else(|| {
                    ConfigError::unresolvable(
                        id.as_str(),
                        join("plugins", &id),
                        "no version declared for plugin",
                    )
                })?;
                let plugin = ResolvedPlugin {
                    version,
                    apply: declaration.apply.unwrap_or(true),
                };
                Ok((id, plugin))
            })
            .collect::<Result<BTreeMap<_, _>, ConfigError>>()?;

        let dependencies = dependencies
            .into_iter()
            .map(|(id, declaration)| {
                let dependency = ResolvedDependency {
                    configuration: declaration.configuration.unwrap_or_else(default_configuration),
                    version: declaration.version,
                };
                (id, dependency)
            })
            .collect();

        Ok(Self {
            sdk,
            repositories,
            include,
            plugins,
            dependencies,
            android,
            build_types,
            signing_configs,
            properties: tree.into_iter().collect(),
        })
    }

    /// Cross-field checks that no single descriptor can see.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, build_type) in &self.build_types {
            let key = join(BUILD_TYPES_KEY, name);
            if build_type.shrink_resources && !build_type.minify {
                return Err(ConfigError::invalid(
                    join(&key, "shrink_resources"),
                    "resource shrinking requires minify",
                ));
            }
            if let Some(signing) = &build_type.signing_config {
                if signing != DEBUG_SIGNING_CONFIG && !self.signing_configs.contains_key(signing) {
                    return Err(ConfigError::unresolvable(
                        signing.as_str(),
                        join(&key, "signing_config"),
                        "no such signing config",
                    ));
                }
            }
        }

        let android = &self.android;
        if let (Some(min), Some(target)) = (android.min_sdk, android.target_sdk) {
            if min > target {
                return Err(ConfigError::invalid(
                    "android.min_sdk",
                    format!("{min} exceeds target_sdk {target}"),
                ));
            }
        }
        if let Some(compile) = android.compile_sdk {
            for (field, level) in [("min_sdk", android.min_sdk), ("target_sdk", android.target_sdk)] {
                if let Some(level) = level.filter(|level| *level > compile) {
                    return Err(ConfigError::invalid(
                        join(ANDROID_KEY, field),
                        format!("{level} exceeds compile_sdk {compile}"),
                    ));
                }
            }
        }
        if android.version_code == Some(0) {
            return Err(ConfigError::invalid(
                "android.version_code",
                "must be a positive integer",
            ));
        }
        Ok(())
    }

    /// Look up a plugin version.
    pub fn plugin_version(&self, id: &str) -> Option<&str> {
        self.plugins.get(id).map(|p| p.version.as_str())
    }

    /// Plugins that are applied, in id order.
    pub fn applied_plugins(&self) -> impl Iterator<Item = (&str, &ResolvedPlugin)> {
        self.plugins
            .iter()
            .filter(|(_, plugin)| plugin.apply)
            .map(|(id, plugin)| (id.as_str(), plugin))
    }

    /// The plan as a descriptor-shaped document.
    pub fn to_value(&self) -> Result<Value, ConfigError> {
        serde_json::to_value(self).map_err(|e| ConfigError::invalid("plan", e.to_string()))
    }

    /// Rebuild a single descriptor that resolves back to this plan.
    pub fn to_descriptor(&self) -> Result<Descriptor, ConfigError> {
        let mut value = self.to_value()?;
        escape_strings(&mut value);
        Descriptor::from_value(PLAN_ORIGIN, value)
    }
}

fn take_section<T: DeserializeOwned>(
    tree: &mut Map<String, Value>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    tree.remove(key)
        .map(|value| {
            serde_json::from_value(value).map_err(|e| ConfigError::invalid(key, e.to_string()))
        })
        .transpose()
}

fn take_sdk(tree: &mut Map<String, Value>) -> Result<BTreeMap<String, String>, ConfigError> {
    match tree.remove(SDK_KEY) {
        None => Ok(BTreeMap::new()),
        Some(Value::String(path)) => Ok(BTreeMap::from([(ROOT_SDK.to_string(), path)])),
        Some(Value::Object(paths)) => paths
            .into_iter()
            .map(|(name, path)| match path {
                Value::String(path) => Ok((name, path)),
                other => Err(ConfigError::invalid(
                    join(SDK_KEY, &name),
                    format!("expected a path, found {}", value_type(&other)),
                )),
            })
            .collect(),
        Some(other) => Err(ConfigError::invalid(
            SDK_KEY,
            format!("expected a path or a table of paths, found {}", value_type(&other)),
        )),
    }
}

fn escape_strings(value: &mut Value) {
    match value {
        Value::String(s) => *s = escape(s),
        Value::Array(items) => items.iter_mut().for_each(escape_strings),
        Value::Object(map) => map.values_mut().for_each(escape_strings),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_assemble_sections() {
        let plan = ResolvedPlan::assemble(
            tree(json!({
                "sdk": "/opt/flutter",
                "repositories": ["google"],
                "include": [":app"],
                "android": {"namespace": "com.x", "compile_sdk": 35, "flavor_dimensions": ["env"]},
                "build_types": {"release": {"minify": true, "shrink_resources": true}},
                "flutter": {"source": "../.."}
            })),
            BTreeMap::from([("x".to_string(), Declaration::version("1.0"))]),
            BTreeMap::from([("g:a".to_string(), Declaration::default())]),
        )
        .unwrap();

        assert_eq!(plan.sdk["root"], "/opt/flutter");
        assert_eq!(plan.repositories, vec!["google"]);
        assert_eq!(plan.include, vec![":app"]);
        assert_eq!(plan.android.namespace.as_deref(), Some("com.x"));
        assert_eq!(plan.android.compile_sdk, Some(35));
        assert_eq!(plan.android.extra["flavor_dimensions"], json!(["env"]));
        assert!(plan.build_types["release"].minify);
        assert_eq!(plan.plugin_version("x"), Some("1.0"));
        assert!(plan.plugins["x"].apply);
        assert_eq!(plan.dependencies["g:a"].configuration, "implementation");
        assert_eq!(plan.dependencies["g:a"].version, None);
        assert_eq!(plan.properties["flutter"], json!({"source": "../.."}));
    }

    #[test]
    fn test_plugin_without_version_is_unresolvable() {
        let apply_only = Declaration {
            apply: Some(true),
            ..Default::default()
        };
        let err = ResolvedPlan::assemble(
            Map::new(),
            BTreeMap::from([("dev.flutter.flutter-gradle-plugin".to_string(), apply_only)]),
            BTreeMap::new(),
        )
        .unwrap_err();

        assert_eq!(err.kind(), "UnresolvableReferenceError");
        assert!(err.to_string().contains("dev.flutter.flutter-gradle-plugin"));
    }

    #[test]
    fn test_wrong_section_shape_is_invalid() {
        let err = ResolvedPlan::assemble(
            tree(json!({"android": {"compile_sdk": "thirty-five"}})),
            BTreeMap::new(),
            BTreeMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "android"));

        let err = ResolvedPlan::assemble(
            tree(json!({"signing_configs": {"upload": {"store_fiel": "x"}}})),
            BTreeMap::new(),
            BTreeMap::new(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "InvalidValueError");
    }

    #[test]
    fn test_shrink_requires_minify() {
        let plan = ResolvedPlan {
            build_types: BTreeMap::from([(
                "release".to_string(),
                BuildType {
                    shrink_resources: true,
                    ..Default::default()
                },
            )]),
            ..Default::default()
        };
        let err = plan.validate().unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: "build_types.release.shrink_resources".to_string(),
                reason: "resource shrinking requires minify".to_string(),
            }
        );
    }

    #[test]
    fn test_signing_config_reference() {
        let mut plan = ResolvedPlan {
            build_types: BTreeMap::from([(
                "release".to_string(),
                BuildType {
                    signing_config: Some("debug".to_string()),
                    ..Default::default()
                },
            )]),
            ..Default::default()
        };
        assert!(plan.validate().is_ok());

        plan.build_types.get_mut("release").unwrap().signing_config = Some("upload".to_string());
        let err = plan.validate().unwrap_err();
        assert_eq!(err.kind(), "UnresolvableReferenceError");

        plan.signing_configs
            .insert("upload".to_string(), SigningConfig::default());
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn test_sdk_level_ordering() {
        let mut plan = ResolvedPlan::default();
        plan.android.min_sdk = Some(23);
        plan.android.target_sdk = Some(35);
        plan.android.compile_sdk = Some(35);
        assert!(plan.validate().is_ok());

        plan.android.min_sdk = Some(36);
        let err = plan.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "android.min_sdk"));

        plan.android.min_sdk = Some(21);
        plan.android.compile_sdk = Some(34);
        let err = plan.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "android.target_sdk"));
    }

    #[test]
    fn test_applied_plugins() {
        let plan = ResolvedPlan {
            plugins: BTreeMap::from([
                (
                    "a".to_string(),
                    ResolvedPlugin {
                        version: "1".to_string(),
                        apply: false,
                    },
                ),
                (
                    "b".to_string(),
                    ResolvedPlugin {
                        version: "2".to_string(),
                        apply: true,
                    },
                ),
            ]),
            ..Default::default()
        };
        let applied: Vec<&str> = plan.applied_plugins().map(|(id, _)| id).collect();
        assert_eq!(applied, vec!["b"]);
    }

    #[test]
    fn test_to_value_shape() {
        let plan = ResolvedPlan {
            sdk: BTreeMap::from([("flutter".to_string(), "/opt/flutter".to_string())]),
            properties: BTreeMap::from([("flutter_source".to_string(), json!("../.."))]),
            ..Default::default()
        };
        let value = plan.to_value().unwrap();
        assert_eq!(value, json!({"sdk": {"flutter": "/opt/flutter"}, "flutter_source": "../.."}));
    }

    #[test]
    fn test_to_descriptor_escapes_literal_references() {
        let plan = ResolvedPlan {
            properties: BTreeMap::from([("template".to_string(), json!("${HOME}"))]),
            ..Default::default()
        };
        let descriptor = plan.to_descriptor().unwrap();
        assert_eq!(descriptor.origin(), PLAN_ORIGIN);
        assert_eq!(descriptor.get("template"), Some(&json!("$${HOME}")));
    }
}
