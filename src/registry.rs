use log::warn;
use std::collections::HashMap;

use crate::applet::{AppletKind, ChatHistoryApplet};

/// Name and alias lookup table for applet variants
///
/// Registries are plain values: build one at startup and hand a reference
/// to whoever needs to resolve applets.
#[derive(Clone, Debug, Default)]
pub struct AppletRegistry {
    kinds: Vec<AppletKind>,
    by_name: HashMap<&'static str, usize>,
    aliases: HashMap<&'static str, &'static str>,
}

impl AppletRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in applets
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(ChatHistoryApplet::KIND);
        registry
    }

    /// Add a variant under its name and aliases
    ///
    /// Registering a name twice replaces the earlier variant but keeps its
    /// position in [`keys`](Self::keys). Aliases are last-write-wins too.
    ///
    /// # Arguments
    /// * `kind` - Descriptor with the name, aliases and factory of the variant
    pub fn register(&mut self, kind: AppletKind) {
        for &alias in kind.aliases {
            if let Some(previous) = self.aliases.insert(alias, kind.name) {
                if previous != kind.name {
                    warn!(
                        "applet alias '{}' moved from '{}' to '{}'",
                        alias, previous, kind.name
                    );
                }
            }
        }

        match self.by_name.get(kind.name) {
            Some(&index) => {
                warn!("applet '{}' registered twice, replacing", kind.name);
                self.kinds[index] = kind;
            }
            None => {
                self.by_name.insert(kind.name, self.kinds.len());
                self.kinds.push(kind);
            }
        }
    }

    /// Look up a variant by alias first, then by name
    ///
    /// # Arguments
    /// * `key` - Name or alias as typed by the user
    ///
    /// # Returns
    /// * `Option<&AppletKind>` - The variant, or `None` if nothing matches
    pub fn resolve(&self, key: &str) -> Option<&AppletKind> {
        let name = self.aliases.get(key).copied().unwrap_or(key);
        self.by_name.get(name).map(|&index| &self.kinds[index])
    }

    /// Registered names in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.kinds.iter().map(|kind| kind.name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AppletKind> {
        self.kinds.iter()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
