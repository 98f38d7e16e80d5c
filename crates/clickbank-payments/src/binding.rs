//! Product Bindings
//!
//! Maps store products to ClickBank item codes. Each item code belongs to at
//! most one product; a conflicting write is rejected and leaves the mapping
//! untouched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{PaymentError, Result};

/// Internal product identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub u64);

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a binding write
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingChange {
    /// Product now points at the given item code
    Bound,
    /// Nothing to do (same binding, or clearing an unbound product)
    Unchanged,
    /// Product's entry was removed
    Cleared,
}

/// The persisted product → item code mapping
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductBindings {
    items: BTreeMap<ProductId, String>,
}

impl ProductBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item_for(&self, product: ProductId) -> Option<&str> {
        self.items.get(&product).map(String::as_str)
    }

    /// Reverse lookup, exact match on the bound value
    pub fn product_for(&self, item: &str) -> Option<ProductId> {
        self.items
            .iter()
            .find(|(_, bound)| bound.as_str() == item)
            .map(|(product, _)| *product)
    }

    /// Set or clear a product's item code. Blank input clears.
    ///
    /// Item codes end up in the order form host name, so only ASCII letters
    /// and digits are accepted.
    pub fn apply(&mut self, product: ProductId, item: Option<&str>) -> Result<BindingChange> {
        let item = item.map(str::trim).filter(|i| !i.is_empty());

        let Some(item) = item else {
            return Ok(if self.items.remove(&product).is_some() {
                BindingChange::Cleared
            } else {
                BindingChange::Unchanged
            });
        };

        if !is_item_code(item) {
            return Err(PaymentError::InvalidField {
                field: "item",
                value: item.to_string(),
            });
        }

        match self.product_for(item) {
            Some(owner) if owner == product => Ok(BindingChange::Unchanged),
            Some(owner) => Err(PaymentError::ItemAlreadyBound {
                item: item.to_string(),
                owner,
            }),
            None => {
                self.items.insert(product, item.to_string());
                Ok(BindingChange::Bound)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<ProductId, String> {
        &self.items
    }
}

fn is_item_code(item: &str) -> bool {
    item.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Binding storage trait
pub trait BindingStore: Send + Sync {
    /// Item code bound to a product
    fn item_for(&self, product: ProductId) -> Result<Option<String>>;

    /// Product bound to an item code
    fn product_for(&self, item: &str) -> Result<Option<ProductId>>;

    /// Set (Some) or clear (None/blank) a product's item code
    fn set_item(&self, product: ProductId, item: Option<&str>) -> Result<BindingChange>;

    /// Snapshot of every binding
    fn all(&self) -> Result<BTreeMap<ProductId, String>>;
}

fn poisoned<T>(_: T) -> PaymentError {
    PaymentError::Storage("binding lock poisoned".into())
}

/// In-memory binding store (for development and tests)
#[derive(Default)]
pub struct MemoryBindingStore {
    bindings: RwLock<ProductBindings>,
}

impl MemoryBindingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BindingStore for MemoryBindingStore {
    fn item_for(&self, product: ProductId) -> Result<Option<String>> {
        let bindings = self.bindings.read().map_err(poisoned)?;
        Ok(bindings.item_for(product).map(str::to_string))
    }

    fn product_for(&self, item: &str) -> Result<Option<ProductId>> {
        let bindings = self.bindings.read().map_err(poisoned)?;
        Ok(bindings.product_for(item))
    }

    fn set_item(&self, product: ProductId, item: Option<&str>) -> Result<BindingChange> {
        let mut bindings = self.bindings.write().map_err(poisoned)?;
        bindings.apply(product, item)
    }

    fn all(&self) -> Result<BTreeMap<ProductId, String>> {
        let bindings = self.bindings.read().map_err(poisoned)?;
        Ok(bindings.as_map().clone())
    }
}

/// Binding store persisted as a single JSON object on disk
///
/// The whole mapping is rewritten on every change through a synced temp file
/// in the same directory, then renamed over the target.
pub struct FileBindingStore {
    path: PathBuf,
    bindings: RwLock<ProductBindings>,
}

impl FileBindingStore {
    /// Open the store, starting empty if the file does not exist yet.
    ///
    /// An existing but empty file is an error: the store never writes one,
    /// so it means the mapping was lost.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bindings = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                return Err(PaymentError::Storage(format!(
                    "bindings file {} is empty",
                    path.display()
                )));
            }
            serde_json::from_str(&raw)?
        } else {
            ProductBindings::new()
        };

        tracing::debug!(path = %path.display(), count = bindings.len(), "Loaded product bindings");

        Ok(Self {
            path,
            bindings: RwLock::new(bindings),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, bindings: &ProductBindings) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&serde_json::to_vec_pretty(bindings)?)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| PaymentError::from(e.error))?;

        tracing::debug!(
            path = %self.path.display(),
            count = bindings.len(),
            "Saved product bindings"
        );
        Ok(())
    }
}

impl BindingStore for FileBindingStore {
    fn item_for(&self, product: ProductId) -> Result<Option<String>> {
        let bindings = self.bindings.read().map_err(poisoned)?;
        Ok(bindings.item_for(product).map(str::to_string))
    }

    fn product_for(&self, item: &str) -> Result<Option<ProductId>> {
        let bindings = self.bindings.read().map_err(poisoned)?;
        Ok(bindings.product_for(item))
    }

    fn set_item(&self, product: ProductId, item: Option<&str>) -> Result<BindingChange> {
        let mut bindings = self.bindings.write().map_err(poisoned)?;
        let mut updated = bindings.clone();
        let change = updated.apply(product, item)?;

        if change != BindingChange::Unchanged {
            self.persist(&updated)?;
            *bindings = updated;
        }

        Ok(change)
    }

    fn all(&self) -> Result<BTreeMap<ProductId, String>> {
        let bindings = self.bindings.read().map_err(poisoned)?;
        Ok(bindings.as_map().clone())
    }
}
