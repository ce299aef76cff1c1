//! Module namespaces and the plugin metadata block

use serde::{Deserialize, Serialize};
use std::any::Any;

/// A value exported by a module under a symbol name.
pub type NamespaceValue = Box<dyn Any + Send + Sync>;

/// Snapshot of a module's exported top-level symbols.
///
/// Entries keep insertion order, which makes "the first value of a given
/// type" well defined when a namespace carries more than one candidate.
#[derive(Default)]
pub struct ModuleNamespace {
    entries: Vec<(String, NamespaceValue)>,
}

impl ModuleNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export `value` under `symbol`, replacing any previous export with
    /// the same name.
    pub fn insert<T: Any + Send + Sync>(&mut self, symbol: &str, value: T) {
        if let Some(entry) = self.entries.iter_mut().find(|(name, _)| name == symbol) {
            entry.1 = Box::new(value);
        } else {
            self.entries.push((symbol.to_string(), Box::new(value)));
        }
    }

    /// Look up an exported value by symbol name.
    pub fn get(&self, symbol: &str) -> Option<&NamespaceValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == symbol)
            .map(|(_, value)| value)
    }

    /// Look up an exported value by symbol name, downcast to `T`.
    pub fn get_as<T: Any>(&self, symbol: &str) -> Option<&T> {
        self.get(symbol).and_then(|value| value.downcast_ref())
    }

    /// First exported value of type `T`, in insertion order.
    pub fn find<T: Any>(&self) -> Option<&T> {
        self.entries
            .iter()
            .find_map(|(_, value)| value.downcast_ref())
    }

    /// Exported symbol names, in insertion order.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ModuleNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleNamespace")
            .field("symbols", &self.symbols().collect::<Vec<_>>())
            .finish()
    }
}

/// Metadata block a plugin may export to describe itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub verbose_name: Option<String>,
    pub author: Option<String>,
    pub version: Option<String>,
    pub url: Option<String>,
}

impl PluginInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            verbose_name: None,
            author: None,
            version: None,
            url: None,
        }
    }

    pub fn with_verbose_name(mut self, verbose_name: impl Into<String>) -> Self {
        self.verbose_name = Some(verbose_name.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Human-facing name: the verbose name when set, the short name
    /// otherwise.
    pub fn display_name(&self) -> &str {
        self.verbose_name.as_deref().unwrap_or(&self.name)
    }
}
