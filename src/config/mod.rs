//! Effective plan assembly
//!
//! Layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. Descriptor files and directories, in the order given
//! 3. Local override (`--override` or `BUILDPLAN_OVERRIDE`)

mod defaults;
mod effective;

pub use defaults::{BuiltinDefaults, BUILTIN_ORIGIN};
pub use effective::{
    EffectivePlan, PlanRequest, OVERRIDE_ENV_VAR, REDACTED, SCHEMA_ID, SCHEMA_VERSION,
};
