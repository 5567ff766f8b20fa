use crate::error::{Result, TextStoreError};
use crate::record::{Record, RecordType};
use fs2::FileExt;
use regex::Regex;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A file-backed, homogeneous collection of records of one [`RecordType`].
///
/// Contents are whatever the type's `find_all` recognizes in the file's full
/// text, in file order. Nothing is cached: every operation re-reads the file.
/// Mutations are whole-file read-modify-write cycles executed under an
/// advisory lock and persisted by renaming a temp file into place, so a
/// failure mid-operation leaves the previous contents intact.
pub struct Store {
    path: PathBuf,
    record_type: Arc<RecordType>,
}

impl Store {
    /// Open a store, creating parent directories and an empty backing file
    /// when absent.
    pub fn open(path: impl Into<PathBuf>, record_type: Arc<RecordType>) -> Result<Store> {
        let path = path.into();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            File::create(&path)?;
            log::debug!("created store file {}", path.display());
        }
        Ok(Store { path, record_type })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record_type(&self) -> &Arc<RecordType> {
        &self.record_type
    }

    /// Store name: the file's basename without extension.
    pub fn name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// All records currently in the file, oldest first.
    pub fn entries(&self) -> Result<Vec<Record>> {
        let text = self.read()?;
        Ok(self.record_type.find_all(&text).collect())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.entries()?.is_empty())
    }

    /// Whether an entry with this canonical text is present.
    pub fn contains(&self, item: impl AsRef<str>) -> Result<bool> {
        let item = item.as_ref();
        Ok(self.entries()?.iter().any(|r| r.canonical() == item))
    }

    /// Entries whose canonical text matches `pattern`.
    pub fn find(&self, pattern: &str) -> Result<Vec<Record>> {
        let regex = Regex::new(pattern).map_err(|e| {
            TextStoreError::Schema(format!("invalid search pattern {pattern:?}: {e}"))
        })?;
        Ok(self
            .entries()?
            .into_iter()
            .filter(|r| regex.is_match(r.canonical()))
            .collect())
    }

    /// Validate and append entries. Every item is checked before anything is
    /// written; the first invalid item fails the whole call with
    /// `InvalidEntry` and the file is left untouched. Each entry's canonical
    /// text goes in as its own line.
    pub fn add<I, S>(&self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut records = Vec::new();
        for item in items {
            records.push(self.validate(item.as_ref())?);
        }
        if records.is_empty() {
            return Ok(());
        }
        self.mutate(|text| {
            let mut text = text.to_string();
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            for record in &records {
                text.push_str(record.canonical());
                text.push('\n');
            }
            Ok(text)
        })?;
        log::debug!("added {} entries to {}", records.len(), self.path.display());
        Ok(())
    }

    /// Remove entries by canonical text. An item removes the first line whose
    /// content equals it; `EntryNotFound` when no line matches, in which case
    /// the file is left untouched.
    pub fn remove<I, S>(&self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let targets: Vec<Record> = items
            .into_iter()
            .map(|item| self.validate(item.as_ref()))
            .collect::<Result<_>>()?;
        self.mutate(|text| {
            let mut text = text.to_string();
            for target in &targets {
                text = remove_line(&text, target.canonical()).ok_or_else(|| {
                    TextStoreError::EntryNotFound(target.canonical().to_string())
                })?;
            }
            Ok(text)
        })?;
        log::debug!(
            "removed {} entries from {}",
            targets.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Replace `old` with `new` in place, preserving ordering position.
    /// Both must be valid entries; `EntryNotFound` when `old`'s line is
    /// absent.
    pub fn replace(&self, old: impl AsRef<str>, new: impl AsRef<str>) -> Result<()> {
        let old = self.validate(old.as_ref())?;
        let new = self.validate(new.as_ref())?;
        self.mutate(|text| {
            replace_line(text, old.canonical(), new.canonical())
                .ok_or_else(|| TextStoreError::EntryNotFound(old.canonical().to_string()))
        })
    }

    /// Delete the backing file. Index entries referencing this store are the
    /// caller's responsibility.
    pub fn delete(&self) -> Result<()> {
        let lock = self.lock()?;
        fs::remove_file(&self.path)?;
        let _ = fs::remove_file(self.lock_path());
        drop(lock);
        log::debug!("deleted store file {}", self.path.display());
        Ok(())
    }

    /// An item is a valid entry when the anchored match consumes it whole.
    /// Zero-length items are rejected; they could never come back from
    /// `find_all`. So are items containing `\r` or `\n`: entries are whole
    /// lines, and an item spanning or terminating a line could be written
    /// but never located again by `remove`/`replace`.
    fn validate(&self, item: &str) -> Result<Record> {
        let invalid = || TextStoreError::InvalidEntry {
            type_name: self.record_type.name().to_string(),
            text: item.to_string(),
        };
        if item.is_empty() || item.contains(['\r', '\n']) {
            return Err(invalid());
        }
        let record = self.record_type.parse(item).map_err(|_| invalid())?;
        if record.text() != item {
            return Err(invalid());
        }
        Ok(record)
    }

    /// One locked read-modify-write cycle: read the current text, compute the
    /// next text, atomically rename it into place. Nothing is written when
    /// `f` fails.
    fn mutate<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&str) -> Result<String>,
    {
        let _lock = self.lock()?;
        let text = self.read()?;
        let next = f(&text)?;
        if next != text {
            self.write_atomic(&next)?;
        }
        // lock is released when the file handle drops
        Ok(())
    }

    fn read(&self) -> Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_atomic(&self, text: &str) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(text.as_bytes())?;
        tmp.persist(&self.path)
            .map_err(|e| TextStoreError::Io(e.error))?;
        Ok(())
    }

    fn lock(&self) -> Result<File> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .open(self.lock_path())?;
        file.lock_exclusive()?;
        Ok(file)
    }

    /// The lock lives in a sidecar file, never the data file: the data
    /// file's inode is replaced on every write.
    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }
}

/// Remove the first line whose content equals `target`. `None` when no line
/// matches.
fn remove_line(text: &str, target: &str) -> Option<String> {
    splice_line(text, target, None)
}

/// Rewrite the first line whose content equals `target` to `replacement`,
/// keeping the line's terminator. `None` when no line matches.
fn replace_line(text: &str, target: &str, replacement: &str) -> Option<String> {
    splice_line(text, target, Some(replacement))
}

fn splice_line(text: &str, target: &str, replacement: Option<&str>) -> Option<String> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let content = line.strip_suffix('\n').unwrap_or(line);
        let content = content.strip_suffix('\r').unwrap_or(content);
        if content == target {
            let terminator = &line[content.len()..];
            let mut out = String::with_capacity(text.len());
            out.push_str(&text[..offset]);
            if let Some(replacement) = replacement {
                out.push_str(replacement);
                out.push_str(terminator);
            }
            out.push_str(&text[offset + line.len()..]);
            return Some(out);
        }
        offset += line.len();
    }
    None
}
