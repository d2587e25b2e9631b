use std::collections::HashSet;
use std::fs;
use std::path::Path;

use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{AnnotateError, Result};

/// Separator used to store a multiple-choice selection in a single cell.
pub const MULTI_VALUE_SEPARATOR: &str = ", ";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelKind {
    #[default]
    Single,
    Multiple,
}

impl LabelKind {
    pub fn from_str(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "single" => Some(LabelKind::Single),
            "multiple" => Some(LabelKind::Multiple),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LabelKind::Single => "single",
            LabelKind::Multiple => "multiple",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelOption {
    pub value: String,
    pub shortcut_index: usize,
}

impl LabelOption {
    pub fn shortcut_key(&self) -> Option<char> {
        shortcut_key(self.shortcut_index)
    }
}

/// Keyboard key for a shortcut index: `1`-`9`, then `a`-`z`.
pub fn shortcut_key(index: usize) -> Option<char> {
    match index {
        0..=8 => char::from_digit(index as u32 + 1, 10),
        9..=34 => Some((b'a' + (index - 9) as u8) as char),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelGroup {
    pub name: String,
    pub kind: LabelKind,
    pub options: Vec<LabelOption>,
}

impl LabelGroup {
    pub fn has_option(&self, value: &str) -> bool {
        self.options.iter().any(|opt| opt.value == value)
    }

    /// Validates a selection and renders it as a stored value.
    ///
    /// Multiple selections are written in option order, so the same set always
    /// produces the same cell. An empty selection yields `None`.
    pub fn encode(&self, values: &[String]) -> Result<Option<String>> {
        let mut selected = IndexSet::new();
        for value in values {
            if !self.has_option(value) {
                return Err(AnnotateError::InvalidValue {
                    label: self.name.clone(),
                    value: value.clone(),
                });
            }
            selected.insert(value.as_str());
        }
        if self.kind == LabelKind::Single && selected.len() > 1 {
            return Err(AnnotateError::TooManyValues {
                label: self.name.clone(),
                count: selected.len(),
            });
        }
        if selected.is_empty() {
            return Ok(None);
        }
        let encoded = self
            .options
            .iter()
            .map(|opt| opt.value.as_str())
            .filter(|value| selected.contains(value))
            .join(MULTI_VALUE_SEPARATOR);
        Ok(Some(encoded))
    }

    pub fn decode(&self, stored: &str) -> IndexSet<String> {
        match self.kind {
            LabelKind::Single => std::iter::once(stored.to_string()).collect(),
            LabelKind::Multiple => stored
                .split(MULTI_VALUE_SEPARATOR)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawGroup {
    Detailed {
        options: Vec<String>,
        #[serde(default, rename = "type")]
        kind: Option<String>,
    },
    Flat(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSchema {
    groups: IndexMap<String, LabelGroup>,
}

impl LabelSchema {
    /// Loads the schema file, falling back to an empty schema when the file is
    /// absent or unusable.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            info!("path" = %path.display(), "no label schema found, labels disabled");
            return Self::default();
        }
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                error!("path" = %path.display(), "error" = %err, "failed to read label schema");
                return Self::default();
            }
        };
        match Self::from_json_str(&raw) {
            Ok(schema) => {
                info!(
                    "path" = %path.display(),
                    "groups" = schema.len(),
                    "options" = schema.total_options(),
                    "label schema loaded"
                );
                schema
            }
            Err(err) => {
                error!("path" = %path.display(), "error" = %err, "invalid label schema");
                Self::default()
            }
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let top: IndexMap<String, Value> = serde_json::from_str(raw)?;
        let mut groups = IndexMap::new();
        let mut next_index = 0usize;
        for (name, value) in top {
            let (kind, values) = match parse_group(value) {
                Ok(parsed) => parsed,
                Err(reason) => {
                    warn!("label" = %name, "reason" = %reason, "skipping label group");
                    continue;
                }
            };
            if kind == LabelKind::Multiple && values.iter().any(|v| v.contains(MULTI_VALUE_SEPARATOR)) {
                warn!("label" = %name, "option contains the value separator, stored selections will be ambiguous");
            }
            let options = values
                .into_iter()
                .map(|value| {
                    let option = LabelOption {
                        value,
                        shortcut_index: next_index,
                    };
                    next_index += 1;
                    option
                })
                .collect();
            groups.insert(
                name.clone(),
                LabelGroup {
                    name,
                    kind,
                    options,
                },
            );
        }
        Ok(Self { groups })
    }

    pub fn get(&self, name: &str) -> Option<&LabelGroup> {
        self.groups.get(name)
    }

    pub fn groups(&self) -> impl Iterator<Item = &LabelGroup> {
        self.groups.values()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn total_options(&self) -> usize {
        self.groups.values().map(|g| g.options.len()).sum()
    }

    pub fn indexed_options(&self) -> IndexMap<String, Vec<(String, usize)>> {
        self.groups
            .values()
            .map(|group| {
                let options = group
                    .options
                    .iter()
                    .map(|opt| (opt.value.clone(), opt.shortcut_index))
                    .collect();
                (group.name.clone(), options)
            })
            .collect()
    }
}

fn parse_group(value: Value) -> std::result::Result<(LabelKind, Vec<String>), String> {
    let raw: RawGroup = serde_json::from_value(value).map_err(|_| {
        "expected a list of options or an object with an options list".to_string()
    })?;
    let (kind, options) = match raw {
        RawGroup::Flat(options) => (LabelKind::Single, options),
        RawGroup::Detailed { options, kind } => {
            let kind = match kind.as_deref() {
                None => LabelKind::Single,
                Some(raw) => {
                    LabelKind::from_str(raw).ok_or_else(|| format!("unknown label type {raw:?}"))?
                }
            };
            (kind, options)
        }
    };
    if options.is_empty() {
        return Err("options list is empty".to_string());
    }
    let mut seen = HashSet::new();
    for option in &options {
        if option.trim().is_empty() {
            return Err("options must not be blank".to_string());
        }
        if !seen.insert(option.as_str()) {
            return Err(format!("duplicate option {option:?}"));
        }
    }
    Ok((kind, options))
}
