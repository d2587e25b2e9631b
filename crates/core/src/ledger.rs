use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use csv::{ReaderBuilder, WriterBuilder};
use fs2::FileExt;
use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AnnotateError, Result};
use crate::schema::LabelGroup;

const RESULT_HEADER: [&str; 3] = ["file", "label", "value"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow {
    pub file: String,
    pub label: String,
    pub value: String,
}

/// What an upsert did to the row for one (item, label) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Inserted,
    Updated,
    Unchanged,
    Removed,
    Absent,
}

type RowKey = (String, String);

/// Authoritative (item, label) -> value table mirrored to a CSV file.
pub struct ResultLedger {
    path: PathBuf,
    lock_path: PathBuf,
    rows: Mutex<IndexMap<RowKey, String>>,
}

impl ResultLedger {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let ledger = Self {
            lock_path: lock_path_for(&path),
            path,
            rows: Mutex::new(IndexMap::new()),
        };
        if ledger.path.exists() {
            let rows = read_rows(&ledger.path)?;
            info!("path" = %ledger.path.display(), "rows" = rows.len(), "results loaded");
            *ledger.rows.lock() = rows;
        } else {
            ledger.persist()?;
            info!("path" = %ledger.path.display(), "created empty results file");
        }
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn value(&self, item: &str, label: &str) -> Option<String> {
        self.rows
            .lock()
            .get(&(item.to_string(), label.to_string()))
            .cloned()
    }

    pub fn get_values(&self, item: &str, group: &LabelGroup) -> IndexSet<String> {
        self.value(item, &group.name)
            .map(|stored| group.decode(&stored))
            .unwrap_or_default()
    }

    /// Applies a selection in memory only.
    pub fn upsert(&self, item: &str, group: &LabelGroup, values: &[String]) -> Result<Change> {
        let encoded = group.encode(values)?;
        let mut rows = self.rows.lock();
        Ok(apply(&mut rows, item, &group.name, encoded))
    }

    /// Applies a selection and writes the ledger while holding the row lock.
    ///
    /// When the write fails the in-memory change is kept and the error is
    /// returned, so the caller knows the file may be stale.
    pub fn record(&self, item: &str, group: &LabelGroup, values: &[String]) -> Result<Change> {
        let encoded = group.encode(values)?;
        let mut rows = self.rows.lock();
        let change = apply(&mut rows, item, &group.name, encoded);
        debug!("item" = %item, "label" = %group.name, "change" = ?change, "annotation applied");
        write_rows(&self.path, &self.lock_path, &rows)?;
        Ok(change)
    }

    pub fn persist(&self) -> Result<()> {
        let rows = self.rows.lock();
        write_rows(&self.path, &self.lock_path, &rows)
    }

    /// Number of distinct items with at least one stored label.
    pub fn completion_count(&self) -> usize {
        self.rows.lock().keys().map(|(file, _)| file).unique().count()
    }

    pub fn label_counts(&self) -> IndexMap<String, usize> {
        let rows = self.rows.lock();
        let mut counts = IndexMap::new();
        for (_, label) in rows.keys() {
            *counts.entry(label.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn rows(&self) -> Vec<ResultRow> {
        self.rows
            .lock()
            .iter()
            .map(|((file, label), value)| ResultRow {
                file: file.clone(),
                label: label.clone(),
                value: value.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }
}

fn apply(
    rows: &mut IndexMap<RowKey, String>,
    item: &str,
    label: &str,
    encoded: Option<String>,
) -> Change {
    let key = (item.to_string(), label.to_string());
    match encoded {
        Some(value) => match rows.get_mut(&key) {
            Some(existing) if *existing == value => Change::Unchanged,
            Some(existing) => {
                *existing = value;
                Change::Updated
            }
            None => {
                rows.insert(key, value);
                Change::Inserted
            }
        },
        None => {
            if rows.shift_remove(&key).is_some() {
                Change::Removed
            } else {
                Change::Absent
            }
        }
    }
}

fn read_rows(path: &Path) -> Result<IndexMap<RowKey, String>> {
    let mut reader = ReaderBuilder::new().from_path(path)?;
    let mut rows = IndexMap::new();
    for record in reader.deserialize::<ResultRow>() {
        let row = record?;
        if row.value.is_empty() {
            debug!("item" = %row.file, "label" = %row.label, "dropping empty result row");
            continue;
        }
        let key = (row.file, row.label);
        if rows.contains_key(&key) {
            warn!("item" = %key.0, "label" = %key.1, "duplicate result row, keeping the last one");
        }
        rows.insert(key, row.value);
    }
    Ok(rows)
}

fn write_rows(path: &Path, lock_path: &Path, rows: &IndexMap<RowKey, String>) -> Result<()> {
    let write = || -> anyhow::Result<()> {
        let _lock = ResultsLock::acquire(lock_path)?;
        let bytes = render_csv(rows)?;
        write_atomic(path, &bytes)
    };
    write().map_err(|err| AnnotateError::Persist {
        path: path.to_path_buf(),
        reason: format!("{err:#}"),
    })
}

fn render_csv(rows: &IndexMap<RowKey, String>) -> anyhow::Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(RESULT_HEADER)?;
    for ((file, label), value) in rows {
        writer.write_record([file.as_str(), label.as_str(), value.as_str()])?;
    }
    writer
        .into_inner()
        .map_err(|err| anyhow::anyhow!("flush results csv: {}", err.error()))
}

fn lock_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("results");
    path.with_file_name(format!("{name}.lock"))
}

/// Exclusive advisory lock on the results sidecar, released on drop.
struct ResultsLock {
    file: File,
}

impl ResultsLock {
    fn acquire(lock_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create results dir {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(lock_path)
            .with_context(|| format!("open results lock {}", lock_path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("lock results {}", lock_path.display()))?;
        Ok(Self { file })
    }
}

impl Drop for ResultsLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let tmp = parent.join(format!(
        ".{}.tmp-{}",
        path.file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("results"),
        std::process::id()
    ));

    let written = (|| -> anyhow::Result<()> {
        let mut file =
            File::create(&tmp).with_context(|| format!("create tmp {}", tmp.display()))?;
        file.write_all(bytes)
            .with_context(|| format!("write tmp {}", tmp.display()))?;
        file.sync_all()
            .with_context(|| format!("sync tmp {}", tmp.display()))?;
        drop(file);
        fs::rename(&tmp, path)
            .with_context(|| format!("rename tmp {} -> {}", tmp.display(), path.display()))
    })();
    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written
}
