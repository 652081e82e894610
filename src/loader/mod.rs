//! Descriptor loading
//!
//! Reads descriptor files through a [`FileSystem`] and parses them into
//! [`Descriptor`]s. The format is chosen by file extension: `.toml`,
//! `.json`, or `.properties`. Directories expand to the descriptors they
//! contain, shallowest first.

mod properties;

pub use properties::parse_properties;

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use buildplan_core::{ConfigError, Descriptor, DescriptorKind, EnvLookup};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use walkdir::{DirEntry, WalkDir};

/// Read access to descriptor files.
pub trait FileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    fn is_dir(&self, path: &Path) -> bool;

    /// Every regular file beneath `dir` with its depth (1 for direct
    /// children). Hidden files and anything under a hidden directory are
    /// left out.
    fn list_files(&self, dir: &Path) -> io::Result<Vec<(usize, PathBuf)>>;
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list_files(&self, dir: &Path) -> io::Result<Vec<(usize, PathBuf)>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| !is_hidden(e))
        {
            let entry = entry?;
            if entry.file_type().is_file() {
                files.push((entry.depth(), entry.into_path()));
            }
        }
        Ok(files)
    }
}

/// In-memory files, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    files: HashMap<PathBuf, Vec<u8>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), content.into());
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) -> Self {
        self.insert(path, content);
        self
    }
}

impl FileSystem for MemoryFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path.display()))
        })
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.files
            .keys()
            .any(|file| file != path && file.starts_with(path))
    }

    fn list_files(&self, dir: &Path) -> io::Result<Vec<(usize, PathBuf)>> {
        let mut files = Vec::new();
        for file in self.files.keys() {
            let Ok(relative) = file.strip_prefix(dir) else {
                continue;
            };
            let names: Vec<_> = relative
                .components()
                .filter_map(|c| match c {
                    Component::Normal(name) => Some(name),
                    _ => None,
                })
                .collect();
            let hidden = names
                .iter()
                .any(|name| name.to_str().map(|n| n.starts_with('.')).unwrap_or(false));
            if !names.is_empty() && !hidden {
                files.push((names.len(), file.clone()));
            }
        }
        Ok(files)
    }
}

/// Environment variables of the running process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Supported descriptor encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptorFormat {
    Toml,
    Json,
    Properties,
}

impl DescriptorFormat {
    /// Pick a format from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            "properties" => Some(Self::Properties),
            _ => None,
        }
    }

    /// Parse `content` into a JSON tree.
    pub fn parse(self, origin: &str, content: &str) -> Result<Value, ConfigError> {
        match self {
            Self::Toml => {
                let value: toml::Value = toml::from_str(content).map_err(|e| {
                    malformed(origin, format!("TOML parse error: {}", e.message()))
                })?;
                toml_to_json(origin, value)
            }
            Self::Json => serde_json::from_str(content)
                .map_err(|e| malformed(origin, format!("JSON parse error: {e}"))),
            Self::Properties => Ok(Value::Object(parse_properties(content))),
        }
    }
}

/// Where a layer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceOrigin {
    Builtin,
    File,
    Override,
}

/// A contributing descriptor with provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorSource {
    pub origin: SourceOrigin,

    /// File path (None for builtin)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<DescriptorFormat>,

    /// SHA-256 digest of raw file bytes (None for builtin)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl DescriptorSource {
    pub fn builtin() -> Self {
        Self {
            origin: SourceOrigin::Builtin,
            path: None,
            format: None,
            digest: None,
        }
    }
}

/// A parsed descriptor plus where it was read from.
#[derive(Debug, Clone)]
pub struct LoadedDescriptor {
    pub descriptor: Descriptor,
    pub source: DescriptorSource,
}

/// Read and parse one descriptor file.
///
/// Loading as [`DescriptorKind::Override`] forces override semantics; a
/// file can also mark itself with a top-level `override = true`.
///
/// A file that does not exist is an unresolvable reference to its path;
/// any other read or parse failure makes the descriptor malformed.
pub fn load_descriptor(
    fs: &dyn FileSystem,
    path: &Path,
    kind: DescriptorKind,
) -> Result<LoadedDescriptor, ConfigError> {
    let origin = path.display().to_string();
    let format = DescriptorFormat::from_path(path).ok_or_else(|| {
        malformed(
            &origin,
            "unsupported descriptor format (expected .toml, .json or .properties)",
        )
    })?;

    let bytes = fs.read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ConfigError::UnresolvableReference {
            reference: origin.clone(),
            key: "path".to_string(),
            reason: "descriptor file not found".to_string(),
        },
        _ => malformed(&origin, format!("read failed: {e}")),
    })?;

    let digest = sha256_hex(&bytes);
    let content =
        String::from_utf8(bytes).map_err(|e| malformed(&origin, format!("invalid UTF-8: {e}")))?;

    let value = format.parse(&origin, &content)?;
    let mut descriptor = Descriptor::from_value(origin.clone(), value)?;
    if kind == DescriptorKind::Override {
        descriptor = descriptor.with_kind(kind);
    }
    let kind = descriptor.kind();

    tracing::debug!(path = %origin, ?format, ?kind, %digest, "loaded descriptor");

    let origin_kind = match kind {
        DescriptorKind::Base => SourceOrigin::File,
        DescriptorKind::Override => SourceOrigin::Override,
    };
    Ok(LoadedDescriptor {
        descriptor,
        source: DescriptorSource {
            origin: origin_kind,
            path: Some(origin),
            format: Some(format),
            digest: Some(digest),
        },
    })
}

/// Expand directories into the descriptor files beneath them.
///
/// Files found under a directory are ordered by depth, then by path, so a
/// project descriptor precedes the module descriptors nested below it.
/// Hidden files and directories are skipped. Non-directory paths are kept
/// as given, in order.
pub fn expand_paths(fs: &dyn FileSystem, paths: &[PathBuf]) -> Result<Vec<PathBuf>, ConfigError> {
    let mut expanded = Vec::new();
    for path in paths {
        if !fs.is_dir(path) {
            expanded.push(path.clone());
            continue;
        }

        let mut found: Vec<_> = fs
            .list_files(path)
            .map_err(|e| {
                malformed(&path.display().to_string(), format!("directory walk failed: {e}"))
            })?
            .into_iter()
            .filter(|(_, file)| DescriptorFormat::from_path(file).is_some())
            .collect();
        found.sort();

        tracing::debug!(dir = %path.display(), files = found.len(), "expanded descriptor directory");
        expanded.extend(found.into_iter().map(|(_, p)| p));
    }
    Ok(expanded)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

fn malformed(origin: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::MalformedDescriptor {
        origin: origin.to_string(),
        reason: reason.into(),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Convert TOML Value to JSON Value
///
/// JSON has no NaN or infinity, so a non-finite float makes the descriptor
/// malformed.
pub fn toml_to_json(origin: &str, toml: toml::Value) -> Result<Value, ConfigError> {
    convert_toml(origin, "", toml)
}

fn convert_toml(origin: &str, key: &str, toml: toml::Value) -> Result<Value, ConfigError> {
    Ok(match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => match serde_json::Number::from_f64(f) {
            Some(n) => Value::Number(n),
            None => return Err(malformed(origin, format!("non-finite float at '{key}'"))),
        },
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(
            arr.into_iter()
                .enumerate()
                .map(|(i, v)| convert_toml(origin, &format!("{key}[{i}]"), v))
                .collect::<Result<_, _>>()?,
        ),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| {
                    let child = if key.is_empty() { k.clone() } else { format!("{key}.{k}") };
                    convert_toml(origin, &child, v).map(|v| (k, v))
                })
                .collect::<Result<_, _>>()?,
        ),
    })
}
