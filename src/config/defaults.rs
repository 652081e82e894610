//! Built-in defaults (lowest-precedence layer)
//!
//! Every project gets a `debug` and a `release` build type unless a
//! descriptor changes them.

use buildplan_core::{ConfigError, Descriptor};
use serde::{Deserialize, Serialize};

/// Origin label of the builtin layer.
pub const BUILTIN_ORIGIN: &str = "builtin";

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Debug builds are debuggable (default: true)
    pub debug_debuggable: bool,

    /// Release builds run code shrinking (default: false)
    pub release_minify: bool,

    /// Release builds shrink resources (default: false, requires minify)
    pub release_shrink_resources: bool,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            debug_debuggable: true,
            release_minify: false,
            release_shrink_resources: false,
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "build_types": {
                "debug": {
                    "debuggable": self.debug_debuggable
                },
                "release": {
                    "minify": self.release_minify,
                    "shrink_resources": self.release_shrink_resources
                }
            }
        })
    }

    /// The defaults as the first descriptor of a resolution.
    pub fn to_descriptor(&self) -> Result<Descriptor, ConfigError> {
        Descriptor::from_value(BUILTIN_ORIGIN, self.to_value())
    }
}
