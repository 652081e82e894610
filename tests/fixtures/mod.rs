//! Descriptor fixtures shared by the integration tests
//!
//! - `android/`: a Flutter Android project (settings, project, module,
//!   local.properties)
//! - `overrides/`: local override descriptors applied on top of it

#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// Path to the Android project fixture
pub fn android_project_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/android")
}

/// Path to an override descriptor fixture
pub fn override_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/overrides")
        .join(name)
}
