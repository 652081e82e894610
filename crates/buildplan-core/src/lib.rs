//! Resolution core for declarative build descriptors.
//!
//! Takes an ordered sequence of descriptors (settings, project, module,
//! local overrides), merges them, checks version pins and required keys,
//! and produces a single [`ResolvedPlan`]. Nothing here touches the
//! filesystem or the process environment; both arrive through the caller.

mod descriptor;
mod error;
mod interpolate;
mod merge;
mod path;
mod plan;
mod settings;
mod versions;

pub use descriptor::{
    Declaration, Descriptor, DescriptorKind, DEPENDENCIES_KEY, INCLUDE_KEY, OVERRIDE_KEY,
    PLUGINS_KEY, REPOSITORIES_KEY, REPOS_ALIAS, SDK_KEY,
};
pub use error::{ConfigError, ErrorReport};
pub use interpolate::{escape, interpolate_tree, EnvLookup, Interpolator, NoEnv, ENV_PREFIX};
pub use merge::{deep_merge, merge_layers, merge_maps, ordered_union};
pub use path::{is_blank, lookup_path};
pub use plan::{
    AndroidConfig, BuildType, ResolvedDependency, ResolvedPlan, ResolvedPlugin, SigningConfig,
    DEBUG_SIGNING_CONFIG, DEFAULT_CONFIGURATION, PLAN_ORIGIN, ROOT_SDK,
};
pub use settings::{ResolverSettings, DEFAULT_REQUIRED_KEYS, DEFAULT_SECRET_KEYS};
pub use versions::{Pinned, VersionTable};

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use interpolate::has_references;

/// Stateless descriptor resolver.
///
/// Safe to share between threads when the environment lookup is.
#[derive(Debug, Clone)]
pub struct Resolver<E = NoEnv> {
    settings: ResolverSettings,
    env: E,
}

impl Resolver<NoEnv> {
    pub fn new(settings: ResolverSettings) -> Self {
        Self {
            settings,
            env: NoEnv,
        }
    }
}

impl Default for Resolver<NoEnv> {
    fn default() -> Self {
        Self::new(ResolverSettings::default())
    }
}

impl<E: EnvLookup> Resolver<E> {
    /// Use `env` for `${env:NAME}` references.
    pub fn with_env<F: EnvLookup>(self, env: F) -> Resolver<F> {
        Resolver {
            settings: self.settings,
            env,
        }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Resolve `descriptors` (lowest precedence first) into a plan.
    pub fn resolve(&self, descriptors: &[Descriptor]) -> Result<ResolvedPlan, ConfigError> {
        if descriptors.is_empty() {
            return Err(ConfigError::NoDescriptors);
        }

        let merged = merge_layers(descriptors.iter().map(|d| d.entries().clone()));

        // A version is compared as written in its own layer: references see
        // the tree merged up to that layer, falling back to the full tree
        // for keys only a later layer defines.
        let mut plugins = VersionTable::new(PLUGINS_KEY);
        let mut dependencies = VersionTable::new(DEPENDENCIES_KEY);
        let mut visible = Map::new();
        for descriptor in descriptors {
            visible = merge_maps(visible, descriptor.entries().clone());
            let layers = LayerTrees {
                visible: Interpolator::new(&visible, &self.env),
                merged: Interpolator::new(&merged, &self.env),
            };
            let declared = layers.expand_versions(PLUGINS_KEY, descriptor.plugins())?;
            plugins.declare_all(&declared, descriptor)?;
            let declared = layers.expand_versions(DEPENDENCIES_KEY, descriptor.dependencies())?;
            dependencies.declare_all(&declared, descriptor)?;
        }
        let plugins = declarations(plugins);
        let dependencies = declarations(dependencies);

        let mut tree = merged;
        interpolate_tree(&mut tree, &self.env)?;

        self.check_required(&tree)?;

        let plan = ResolvedPlan::assemble(tree, plugins, dependencies)?;
        plan.validate()?;

        tracing::debug!(
            descriptors = descriptors.len(),
            plugins = plan.plugins.len(),
            repositories = plan.repositories.len(),
            "resolved build plan"
        );
        Ok(plan)
    }

    fn check_required(&self, tree: &Map<String, Value>) -> Result<(), ConfigError> {
        for key in &self.settings.required_keys {
            match lookup_path(tree, key) {
                Some(value) if !is_blank(value) => {}
                _ => return Err(ConfigError::MissingRequiredKey { key: key.clone() }),
            }
        }
        Ok(())
    }
}

/// Interpolators for one layer's declarations.
struct LayerTrees<'a> {
    visible: Interpolator<'a>,
    merged: Interpolator<'a>,
}

impl LayerTrees<'_> {
    fn expand_versions(
        &self,
        section: &str,
        declarations: &BTreeMap<String, Declaration>,
    ) -> Result<BTreeMap<String, Declaration>, ConfigError> {
        declarations
            .iter()
            .map(|(id, declaration)| -> Result<(String, Declaration), ConfigError> {
                let mut declaration = declaration.clone();
                if let Some(version) = declaration.version.as_mut() {
                    if has_references(version) {
                        let key = format!("{section}.{id}.version");
                        *version = match self.visible.expand_str(&key, version) {
                            Ok(expanded) => expanded,
                            Err(ConfigError::UnresolvableReference { .. }) => {
                                self.merged.expand_str(&key, version)?
                            }
                            Err(e) => return Err(e),
                        };
                    }
                }
                Ok((id.clone(), declaration))
            })
            .collect()
    }
}

fn declarations(table: VersionTable) -> BTreeMap<String, Declaration> {
    table
        .into_entries()
        .into_iter()
        .map(|(id, pinned)| (id, pinned.declaration))
        .collect()
}

/// Resolve with default settings and no environment.
pub fn resolve(descriptors: &[Descriptor]) -> Result<ResolvedPlan, ConfigError> {
    Resolver::new(ResolverSettings::default()).resolve(descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn descriptors(values: Vec<Value>) -> Vec<Descriptor> {
        values
            .into_iter()
            .enumerate()
            .map(|(i, v)| Descriptor::from_value(format!("descriptor[{i}]"), v).unwrap())
            .collect()
    }

    fn base() -> Value {
        json!({
            "sdk": {"flutter": "/opt/flutter"},
            "android": {"application_id": "com.gridnote.app"}
        })
    }

    fn lenient() -> Resolver {
        Resolver::new(ResolverSettings::default().with_required_keys(Vec::<String>::new()))
    }

    #[test]
    fn test_empty_input_rejected() {
        assert_eq!(resolve(&[]), Err(ConfigError::NoDescriptors));
    }

    #[test]
    fn test_blank_sdk_is_missing() {
        let err = resolve(&descriptors(vec![json!({"sdk": ""})])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingRequiredKey {
                key: "sdk".to_string()
            }
        );
    }

    #[test]
    fn test_missing_application_id() {
        let err = resolve(&descriptors(vec![json!({"sdk": "/opt/flutter"})])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingRequiredKey {
                key: "android.application_id".to_string()
            }
        );
    }

    #[test]
    fn test_plugin_version_conflict() {
        let err = resolve(&descriptors(vec![
            json!({"plugin": "x", "version": "1.0"}),
            json!({"plugin": "x", "version": "2.0"}),
        ]))
        .unwrap_err();

        match err {
            ConfigError::VersionConflict {
                id,
                existing,
                incoming,
                ..
            } => {
                assert_eq!(id, "x");
                assert_eq!(existing, "1.0");
                assert_eq!(incoming, "2.0");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_override_marker_allows_new_version() {
        let plan = lenient()
            .resolve(&descriptors(vec![
                json!({"plugins": {"x": "1.0"}}),
                json!({"plugins": {"x": {"version": "2.0", "override": true}}}),
            ]))
            .unwrap();
        assert_eq!(plan.plugin_version("x"), Some("2.0"));

        let plan = lenient()
            .resolve(&descriptors(vec![
                json!({"plugins": {"x": "1.0"}}),
                json!({"override": true, "plugins": {"x": "2.0"}}),
            ]))
            .unwrap();
        assert_eq!(plan.plugin_version("x"), Some("2.0"));
    }

    #[test]
    fn test_dependency_conflict() {
        let err = lenient()
            .resolve(&descriptors(vec![
                json!({"dependencies": {"com.android.tools:desugar_jdk_libs": "2.1.5"}}),
                json!({"dependencies": {"com.android.tools:desugar_jdk_libs": "2.0.4"}}),
            ]))
            .unwrap_err();
        assert_eq!(err.kind(), "VersionConflictError");
    }

    #[test]
    fn test_repository_union() {
        let plan = lenient()
            .resolve(&descriptors(vec![
                json!({"repos": ["a", "b"]}),
                json!({"repos": ["b", "c"]}),
            ]))
            .unwrap();
        assert_eq!(plan.repositories, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_override_law() {
        let mut first = base();
        first["android"]["compile_sdk"] = json!(34);
        let mut second = json!({});
        second["android"] = json!({"compile_sdk": 35});

        let plan = resolve(&descriptors(vec![first, second])).unwrap();
        assert_eq!(plan.android.compile_sdk, Some(35));
        assert_eq!(plan.android.application_id.as_deref(), Some("com.gridnote.app"));
    }

    #[test]
    fn test_deterministic() {
        let input = descriptors(vec![
            base(),
            json!({
                "repositories": ["google", "mavenCentral"],
                "plugins": {"com.android.application": "8.9.1"},
                "build_types": {"release": {"signing_config": "debug"}}
            }),
        ]);
        let resolver = Resolver::new(ResolverSettings::default());
        assert_eq!(resolver.resolve(&input).unwrap(), resolver.resolve(&input).unwrap());
    }

    #[test]
    fn test_interpolation_with_env() {
        let env: HashMap<String, String> =
            [("KOTLIN_VERSION".to_string(), "2.1.0".to_string())].into();
        let resolver = Resolver::new(ResolverSettings::default()).with_env(env);

        let plan = resolver
            .resolve(&descriptors(vec![
                json!({"flutter.sdk": "/opt/flutter"}),
                json!({
                    "sdk": {"flutter": "${flutter.sdk}"},
                    "android": {"application_id": "com.x"},
                    "include_build": "${sdk.flutter}/packages/flutter_tools/gradle",
                    "plugins": {"org.jetbrains.kotlin.android": "${env:KOTLIN_VERSION}"}
                }),
            ]))
            .unwrap();

        assert_eq!(plan.sdk["flutter"], "/opt/flutter");
        assert_eq!(
            plan.properties["include_build"],
            "/opt/flutter/packages/flutter_tools/gradle"
        );
        assert_eq!(plan.plugin_version("org.jetbrains.kotlin.android"), Some("2.1.0"));
    }

    #[test]
    fn test_interpolated_version_matches_literal_pin() {
        let env: HashMap<String, String> = [("AGP".to_string(), "8.9.1".to_string())].into();
        let plan = lenient()
            .with_env(env)
            .resolve(&descriptors(vec![
                json!({"plugins": {"x": "${env:AGP}"}}),
                json!({"plugins": {"x": "8.9.1"}}),
            ]))
            .unwrap();
        assert_eq!(plan.plugin_version("x"), Some("8.9.1"));
    }

    #[test]
    fn test_interpolated_version_change_conflicts() {
        let err = lenient()
            .resolve(&descriptors(vec![
                json!({"agp": "8.9.1", "plugins": {"x": "${agp}"}}),
                json!({"agp": "9.0.0", "plugins": {"x": "${agp}"}}),
            ]))
            .unwrap_err();

        match err {
            ConfigError::VersionConflict {
                id,
                existing,
                incoming,
                existing_origin,
                incoming_origin,
            } => {
                assert_eq!(id, "x");
                assert_eq!(existing, "8.9.1");
                assert_eq!(incoming, "9.0.0");
                assert_eq!(existing_origin, "descriptor[0]");
                assert_eq!(incoming_origin, "descriptor[1]");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_interpolated_dependency_versions() {
        let err = lenient()
            .resolve(&descriptors(vec![
                json!({"desugar": "2.1.5", "dependencies": {"g:a": "${desugar}"}}),
                json!({"dependencies": {"g:a": "2.0.4"}}),
            ]))
            .unwrap_err();
        assert_eq!(err.kind(), "VersionConflictError");

        let plan = lenient()
            .resolve(&descriptors(vec![
                json!({"desugar": "2.1.5", "dependencies": {"g:a": "${desugar}"}}),
                json!({"dependencies": {"g:a": "2.1.5"}}),
            ]))
            .unwrap();
        assert_eq!(plan.dependencies["g:a"].version.as_deref(), Some("2.1.5"));
    }

    #[test]
    fn test_version_reference_to_later_layer() {
        let plan = lenient()
            .resolve(&descriptors(vec![
                json!({"plugins": {"x": "${kotlin}"}}),
                json!({"kotlin": "2.1.0"}),
            ]))
            .unwrap();
        assert_eq!(plan.plugin_version("x"), Some("2.1.0"));

        let err = lenient()
            .resolve(&descriptors(vec![json!({"plugins": {"x": "${kotlin}"}})]))
            .unwrap_err();
        assert_eq!(err.kind(), "UnresolvableReferenceError");
    }

    #[test]
    fn test_override_layer_removes_sdk_and_repositories() {
        let plan = lenient()
            .resolve(&descriptors(vec![
                json!({
                    "sdk": {"flutter": "/opt/flutter", "android": "/opt/android"},
                    "repositories": ["google"],
                    "include": [":app"]
                }),
                json!({"override": true, "sdk": {"android": null}, "repositories": null}),
            ]))
            .unwrap();
        assert_eq!(plan.sdk.get("flutter").map(String::as_str), Some("/opt/flutter"));
        assert!(!plan.sdk.contains_key("android"));
        assert!(plan.repositories.is_empty());
        assert_eq!(plan.include, vec![":app"]);

        let plan = lenient()
            .resolve(&descriptors(vec![
                json!({"sdk": "/opt/flutter"}),
                json!({"sdk": null}),
            ]))
            .unwrap();
        assert!(plan.sdk.is_empty());
    }

    #[test]
    fn test_sdk_from_unresolved_reference() {
        let err = resolve(&descriptors(vec![json!({
            "sdk": "${flutter.sdk}",
            "android": {"application_id": "com.x"}
        })]))
        .unwrap_err();
        assert_eq!(err.kind(), "UnresolvableReferenceError");
    }

    #[test]
    fn test_round_trip() {
        let plan = resolve(&descriptors(vec![
            base(),
            json!({
                "repositories": ["google", "mavenCentral"],
                "include": [":app"],
                "plugins": {
                    "com.android.application": {"version": "8.9.1", "apply": false},
                    "dev.flutter.flutter-plugin-loader": "1.0.0"
                },
                "dependencies": {
                    "com.android.tools:desugar_jdk_libs": {
                        "configuration": "coreLibraryDesugaring",
                        "version": "2.1.5"
                    },
                    "org.jetbrains.kotlin:kotlin-stdlib-jdk8": {}
                },
                "android": {"compile_sdk": 35, "java_version": "17"},
                "build_types": {"release": {"minify": true, "shrink_resources": true}},
                "template": "$${literal}"
            }),
        ]))
        .unwrap();

        let again = resolve(&[plan.to_descriptor().unwrap()]).unwrap();
        assert_eq!(again, plan);
        assert_eq!(plan.properties["template"], "${literal}");
    }

    #[test]
    fn test_resolver_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Resolver>();
        assert_send_sync::<Resolver<HashMap<String, String>>>();
    }
}
