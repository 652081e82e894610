//! Version pinning for plugins and dependencies.
//!
//! Unlike ordinary keys, a pinned version is not silently replaced by a later
//! descriptor. Re-pinning to a different version needs an explicit override:
//! either `override = true` on the declaration or an override-layer descriptor.

use std::collections::BTreeMap;

use crate::descriptor::{Declaration, Descriptor};
use crate::error::ConfigError;

/// A declaration merged across descriptors, with the origin of its version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pinned {
    pub declaration: Declaration,
    pub version_origin: Option<String>,
}

/// Accumulates declarations for one section (`plugins` or `dependencies`).
#[derive(Debug, Clone)]
pub struct VersionTable {
    section: &'static str,
    entries: BTreeMap<String, Pinned>,
}

impl VersionTable {
    pub fn new(section: &'static str) -> Self {
        Self {
            section,
            entries: BTreeMap::new(),
        }
    }

    pub fn section(&self) -> &'static str {
        self.section
    }

    /// Fold one declaration from `descriptor` into the table.
    pub fn declare(
        &mut self,
        id: &str,
        incoming: &Declaration,
        descriptor: &Descriptor,
    ) -> Result<(), ConfigError> {
        let Some(pinned) = self.entries.get_mut(id) else {
            self.entries.insert(
                id.to_string(),
                Pinned {
                    declaration: Declaration {
                        force: false,
                        ..incoming.clone()
                    },
                    version_origin: incoming
                        .version
                        .as_ref()
                        .map(|_| descriptor.origin().to_string()),
                },
            );
            return Ok(());
        };

        if let Some(version) = &incoming.version {
            match pinned.declaration.version.clone() {
                Some(existing) if existing == *version => {}
                Some(existing) => {
                    if !(incoming.force || descriptor.is_override()) {
                        return Err(ConfigError::VersionConflict {
                            id: id.to_string(),
                            existing,
                            existing_origin: pinned.version_origin.clone().unwrap_or_default(),
                            incoming: version.clone(),
                            incoming_origin: descriptor.origin().to_string(),
                        });
                    }
                    tracing::debug!(
                        section = self.section,
                        id,
                        from = %existing,
                        to = %version,
                        origin = descriptor.origin(),
                        "version overridden"
                    );
                    pinned.declaration.version = Some(version.clone());
                    pinned.version_origin = Some(descriptor.origin().to_string());
                }
                None => {
                    pinned.declaration.version = Some(version.clone());
                    pinned.version_origin = Some(descriptor.origin().to_string());
                }
            }
        }

        if incoming.apply.is_some() {
            pinned.declaration.apply = incoming.apply;
        }
        if incoming.configuration.is_some() {
            pinned.declaration.configuration = incoming.configuration.clone();
        }
        Ok(())
    }

    /// Fold every declaration of `descriptor` from the given section.
    pub fn declare_all<'a, I>(&mut self, declarations: I, descriptor: &Descriptor) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (&'a String, &'a Declaration)>,
    {
        for (id, declaration) in declarations {
            self.declare(id, declaration, descriptor)?;
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Pinned> {
        self.entries.get(id)
    }

    pub fn into_entries(self) -> BTreeMap<String, Pinned> {
        self.entries
    }
}
