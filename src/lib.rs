//! buildplan - declarative build configuration resolver
//!
//! Loads layered build descriptors (settings, project, module, local
//! properties, local overrides), resolves them with [`buildplan_core`], and
//! reports the effective plan with provenance.

pub mod config;
pub mod loader;

pub use buildplan_core::{
    resolve, ConfigError, Declaration, Descriptor, DescriptorKind, EnvLookup, ErrorReport, NoEnv,
    ResolvedPlan, Resolver, ResolverSettings,
};
pub use config::{BuiltinDefaults, EffectivePlan, PlanRequest, OVERRIDE_ENV_VAR};
pub use loader::{
    expand_paths, load_descriptor, DescriptorFormat, DescriptorSource, FileSystem,
    LoadedDescriptor, MemoryFileSystem, OsFileSystem, ProcessEnv, SourceOrigin,
};
