use crate::error::{Result, TextStoreError};
use crate::record::{Record, RecordType};
use crate::registry::TypeRegistry;
use crate::store::Store;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Template for index entries: `<path> <record-type-name>` lines. Member
/// store paths must not contain whitespace.
const ENTRY_TEMPLATE: &str = r"{path:'\S+'} {type:'\w+'}";

/// A store of stores: each entry names a member store's file path and record
/// type, and resolves to a live [`Store`] on demand. The index reuses the
/// Store machinery for its own file, so file format, validation, and
/// mutation semantics are uniform across both layers.
///
/// The index tracks member files; it does not own them. Deleting a member's
/// file is only done through [`StoreIndex::delete_store`], which also drops
/// the entry.
pub struct StoreIndex {
    file: Store,
    dir: PathBuf,
    registry: Arc<TypeRegistry>,
}

impl StoreIndex {
    /// Open an index backed by `index_path`, with member store files created
    /// under `dir`. Both are created when absent.
    pub fn open(
        index_path: impl Into<PathBuf>,
        dir: impl Into<PathBuf>,
        registry: Arc<TypeRegistry>,
    ) -> Result<StoreIndex> {
        let entry_type = RecordType::new("IndexEntry", ENTRY_TEMPLATE)?;
        let file = Store::open(index_path, Arc::new(entry_type))?;
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(StoreIndex {
            file,
            dir,
            registry,
        })
    }

    /// Create a member store named `name` with record type `type_name`,
    /// creating its backing file and registering it in the index. Fails with
    /// `UnknownRecordType` when the registry lacks `type_name` and with
    /// `DuplicateName` when the name is already taken.
    pub fn add_store(&self, name: &str, type_name: &str) -> Result<Store> {
        let record_type = self.registry.get(type_name)?;
        if self.contains(name)? {
            return Err(TextStoreError::DuplicateName(name.to_string()));
        }
        let path = self.dir.join(format!("{name}.txt"));
        let entry = format!("{} {}", path.display(), type_name);
        // prove the entry is representable before the member file exists, so
        // a whitespace path or an odd type name cannot leave an orphaned,
        // untracked file behind
        let representable = self
            .file
            .record_type()
            .parse(&entry)
            .map(|r| r.text() == entry)
            .unwrap_or(false);
        if !representable {
            return Err(TextStoreError::Schema(format!(
                "index cannot represent entry {entry:?}: store paths must not contain whitespace"
            )));
        }
        let store = Store::open(&path, record_type)?;
        self.file.add([entry])?;
        log::debug!(
            "registered store '{name}' ({type_name}) at {}",
            path.display()
        );
        Ok(store)
    }

    /// Drop the index entry for `name`, keeping the underlying file.
    pub fn remove_store(&self, name: &str) -> Result<()> {
        let entry = self.require(name)?;
        self.file.remove([entry.canonical()])
    }

    /// Delete the underlying store's file, then drop its index entry.
    pub fn delete_store(&self, name: &str) -> Result<()> {
        let entry = self.require(name)?;
        self.resolve(&entry)?.delete()?;
        self.file.remove([entry.canonical()])?;
        log::debug!("deleted store '{name}'");
        Ok(())
    }

    /// Resolve `name` to a live store. `NotFound` when absent.
    pub fn lookup(&self, name: &str) -> Result<Store> {
        let entry = self.require(name)?;
        self.resolve(&entry)
    }

    pub fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.entry_for(name)?.is_some())
    }

    /// All member stores keyed by derived name (file basename without
    /// extension).
    pub fn by_name(&self) -> Result<BTreeMap<String, Store>> {
        let mut stores = BTreeMap::new();
        for entry in self.file.entries()? {
            let store = self.resolve(&entry)?;
            stores.insert(store.name(), store);
        }
        Ok(stores)
    }

    /// All member stores, index order.
    pub fn stores(&self) -> Result<Vec<Store>> {
        self.file
            .entries()?
            .iter()
            .map(|entry| self.resolve(entry))
            .collect()
    }

    pub fn len(&self) -> Result<usize> {
        self.file.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.file.is_empty()
    }

    /// Every record of every member store, index order.
    pub fn entries(&self) -> Result<Vec<Record>> {
        let mut all = Vec::new();
        for store in self.stores()? {
            all.extend(store.entries()?);
        }
        Ok(all)
    }

    /// The index's own backing store.
    pub fn file(&self) -> &Store {
        &self.file
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_for(&self, name: &str) -> Result<Option<Record>> {
        Ok(self
            .file
            .entries()?
            .into_iter()
            .find(|entry| entry.get("path").map(derived_name).as_deref() == Some(name)))
    }

    fn require(&self, name: &str) -> Result<Record> {
        self.entry_for(name)?
            .ok_or_else(|| TextStoreError::NotFound(name.to_string()))
    }

    fn resolve(&self, entry: &Record) -> Result<Store> {
        let path = entry
            .get("path")
            .ok_or_else(|| TextStoreError::Schema("index entry is missing a path".into()))?;
        let type_name = entry
            .get("type")
            .ok_or_else(|| TextStoreError::Schema("index entry is missing a type".into()))?;
        let record_type = self.registry.get(type_name)?;
        Store::open(path, record_type)
    }
}

fn derived_name(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
