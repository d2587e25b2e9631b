use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use csv::{ByteRecord, ReaderBuilder};
use glob::Pattern;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

pub const DEFAULT_PATTERNS: &str = "*.txt,*.md";
pub const DEFAULT_MAX_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    pub ordinal: usize,
    pub identifier: String,
    pub text: String,
    pub read_error: Option<String>,
}

impl Item {
    fn readable(ordinal: usize, identifier: String, text: String) -> Self {
        Self {
            ordinal,
            identifier,
            text,
            read_error: None,
        }
    }

    fn unreadable(ordinal: usize, identifier: String, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            ordinal,
            text: format!("[unable to read {identifier}: {reason}]"),
            identifier,
            read_error: Some(reason),
        }
    }

    pub fn is_readable(&self) -> bool {
        self.read_error.is_none()
    }
}

/// Immutable, ordered collection of annotatable items.
pub trait ItemStore: Send + Sync {
    fn items(&self) -> &[Item];

    fn describe(&self) -> String;

    fn get(&self, ordinal: usize) -> Option<&Item> {
        self.items().get(ordinal)
    }

    fn count(&self) -> usize {
        self.items().len()
    }

    fn is_empty(&self) -> bool {
        self.items().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemSource {
    Directory {
        path: PathBuf,
        patterns: String,
        max_bytes: u64,
    },
    Table {
        path: PathBuf,
    },
    None,
}

impl ItemSource {
    pub fn resolve(files_dir: &Path, table: &Path, patterns: &str, max_bytes: u64) -> Self {
        let has_dir = files_dir.is_dir();
        let has_table = table.is_file();
        if has_dir && has_table {
            warn!(
                "dir" = %files_dir.display(),
                "table" = %table.display(),
                "both item sources present, using the directory"
            );
        }
        if has_dir {
            ItemSource::Directory {
                path: files_dir.to_path_buf(),
                patterns: patterns.to_string(),
                max_bytes,
            }
        } else if has_table {
            ItemSource::Table {
                path: table.to_path_buf(),
            }
        } else {
            ItemSource::None
        }
    }
}

pub fn open_store(source: &ItemSource) -> Box<dyn ItemStore> {
    let loaded: Result<Box<dyn ItemStore>> = match source {
        ItemSource::Directory {
            path,
            patterns,
            max_bytes,
        } => DirectoryStore::load(path, patterns, *max_bytes)
            .map(|store| Box::new(store) as Box<dyn ItemStore>),
        ItemSource::Table { path } => {
            TableStore::load(path).map(|store| Box::new(store) as Box<dyn ItemStore>)
        }
        ItemSource::None => {
            info!("no item source found, nothing to label");
            return Box::new(EmptyStore);
        }
    };
    match loaded {
        Ok(store) => {
            info!("items" = store.count(), "source" = %store.describe(), "items loaded");
            store
        }
        Err(err) => {
            let reason = format!("{err:#}");
            error!("item_source_error" = %reason, "falling back to an empty item set");
            Box::new(EmptyStore)
        }
    }
}

#[derive(Debug, Default)]
pub struct EmptyStore;

impl ItemStore for EmptyStore {
    fn items(&self) -> &[Item] {
        &[]
    }

    fn describe(&self) -> String {
        "no items".to_string()
    }
}

#[derive(Debug)]
pub struct DirectoryStore {
    root: PathBuf,
    items: Vec<Item>,
}

impl DirectoryStore {
    pub fn load(root: &Path, patterns: &str, max_bytes: u64) -> Result<Self> {
        if !root.is_dir() {
            return Err(anyhow!("item directory {} does not exist", root.display()));
        }
        let patterns = build_patterns(patterns)?;
        let mut files: Vec<(String, std::result::Result<PathBuf, String>)> = Vec::new();
        for entry in WalkDir::new(root)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let name = err
                        .path()
                        .and_then(|p| p.file_name())
                        .map(|n| n.to_string_lossy().into_owned());
                    match name {
                        Some(name) if matches_patterns(&patterns, &name) => {
                            warn!("file" = %name, "error" = %err, "item entry is unreadable");
                            files.push((name, Err(err.to_string())));
                        }
                        _ => warn!("error" = %err, "skipping unreadable directory entry"),
                    }
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !matches_patterns(&patterns, &name) {
                debug!("file" = %name, "skipping file outside item patterns");
                continue;
            }
            files.push((name, Ok(entry.path().to_path_buf())));
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));
        let items = files
            .into_iter()
            .enumerate()
            .map(|(ordinal, (name, path))| match path {
                Ok(path) => read_file_item(ordinal, name, &path, max_bytes),
                Err(reason) => Item::unreadable(ordinal, name, reason),
            })
            .collect();
        Ok(Self {
            root: root.to_path_buf(),
            items,
        })
    }
}

impl ItemStore for DirectoryStore {
    fn items(&self) -> &[Item] {
        &self.items
    }

    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }
}

fn read_file_item(ordinal: usize, identifier: String, path: &Path, max_bytes: u64) -> Item {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(err) => return Item::unreadable(ordinal, identifier, err.to_string()),
    };
    if size > max_bytes {
        warn!("file" = %identifier, "bytes" = size, "limit" = max_bytes, "item exceeds size limit");
        return Item::unreadable(
            ordinal,
            identifier,
            format!("file is {size} bytes, limit is {max_bytes}"),
        );
    }
    match fs::read(path) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(text) => Item::readable(ordinal, identifier, text),
            Err(_) => {
                warn!("file" = %identifier, "item is not valid UTF-8");
                Item::unreadable(ordinal, identifier, "not valid UTF-8")
            }
        },
        Err(err) => Item::unreadable(ordinal, identifier, err.to_string()),
    }
}

fn matches_patterns(patterns: &[Pattern], name: &str) -> bool {
    let lower = name.to_lowercase();
    patterns.is_empty() || patterns.iter().any(|pat| pat.matches(&lower))
}

fn build_patterns(pattern: &str) -> Result<Vec<Pattern>> {
    let mut patterns = Vec::new();
    for raw in pattern.split(',') {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        patterns.push(Pattern::new(&trimmed.to_lowercase()).map_err(|e| anyhow!(e.msg))?);
    }
    Ok(patterns)
}

#[derive(Debug)]
pub struct TableStore {
    path: PathBuf,
    items: Vec<Item>,
}

impl TableStore {
    pub fn load(path: &Path) -> Result<Self> {
        let delimiter = match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
            _ => b',',
        };
        let file = fs::File::open(path)
            .with_context(|| format!("failed to open item table {}", path.display()))?;
        let items = read_table(file, delimiter, path)?;
        Ok(Self {
            path: path.to_path_buf(),
            items,
        })
    }
}

impl ItemStore for TableStore {
    fn items(&self) -> &[Item] {
        &self.items
    }

    fn describe(&self) -> String {
        format!("table {}", self.path.display())
    }
}

fn read_table<R: io::Read>(input: R, delimiter: u8, path: &Path) -> Result<Vec<Item>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(input);
    let headers = reader
        .byte_headers()
        .with_context(|| format!("missing headers in {}", path.display()))?
        .clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|cell| String::from_utf8_lossy(cell).trim().eq_ignore_ascii_case(name))
    };
    let text_col = column("text")
        .ok_or_else(|| anyhow!("item table {} has no text column", path.display()))?;
    let id_col = column("id");

    let mut items: Vec<Item> = Vec::new();
    let mut record = ByteRecord::new();
    loop {
        match reader.read_byte_record(&mut record) {
            Ok(false) => break,
            Ok(true) => items.push(row_item(items.len(), &record, text_col, id_col)),
            Err(err) => {
                error!(
                    "table" = %path.display(),
                    "row" = items.len(),
                    "error" = %err,
                    "stopped reading item table"
                );
                break;
            }
        }
    }

    let mut seen = HashSet::new();
    for item in &items {
        if !seen.insert(item.identifier.as_str()) {
            warn!("identifier" = %item.identifier, "duplicate item identifier shares annotations");
        }
    }
    Ok(items)
}

fn row_item(ordinal: usize, record: &ByteRecord, text_col: usize, id_col: Option<usize>) -> Item {
    let identifier = id_col
        .and_then(|col| record.get(col))
        .map(|cell| String::from_utf8_lossy(cell).trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| ordinal.to_string());
    match record.get(text_col) {
        Some(cell) => match std::str::from_utf8(cell) {
            Ok(text) => Item::readable(ordinal, identifier, text.to_string()),
            Err(_) => Item::unreadable(ordinal, identifier, "text is not valid UTF-8"),
        },
        None => Item::unreadable(ordinal, identifier, "row has no text cell"),
    }
}
