use std::path::Path;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::info;

use crate::error::{AnnotateError, Result};
use crate::items::{open_store, ItemSource, ItemStore};
use crate::ledger::ResultLedger;
use crate::pagination::{self, Navigation};
use crate::schema::{LabelKind, LabelSchema};

pub const NOTHING_TO_LABEL: &str =
    "No items to label found. Add text files to the items directory or provide an items table.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// 1-based position of the current item, 0 when there are no items.
    pub position: usize,
    pub total: usize,
    pub annotated: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionView {
    pub value: String,
    pub shortcut_index: usize,
    pub shortcut_key: Option<char>,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelView {
    pub name: String,
    pub kind: LabelKind,
    pub options: Vec<OptionView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemView {
    pub ordinal: usize,
    pub identifier: String,
    pub text: String,
    pub read_error: Option<String>,
    pub labels: Vec<LabelView>,
    pub navigation: Navigation,
    pub stats: Stats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageView {
    Empty { message: String },
    Item(Box<ItemView>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub ordinal: usize,
    pub label: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnreadableItem {
    pub ordinal: usize,
    pub identifier: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub source: String,
    pub total: usize,
    pub annotated: usize,
    pub label_counts: IndexMap<String, usize>,
    pub unreadable: Vec<UnreadableItem>,
}

/// Process-wide annotation state shared by every request.
pub struct Annotator {
    items: Box<dyn ItemStore>,
    schema: LabelSchema,
    ledger: ResultLedger,
}

impl Annotator {
    pub fn new(items: Box<dyn ItemStore>, schema: LabelSchema, ledger: ResultLedger) -> Self {
        Self {
            items,
            schema,
            ledger,
        }
    }

    pub fn open(source: &ItemSource, labels: &Path, results: &Path) -> Result<Self> {
        let items = open_store(source);
        let schema = LabelSchema::load(labels);
        let ledger = ResultLedger::open(results)?;
        Ok(Self::new(items, schema, ledger))
    }

    pub fn items(&self) -> &dyn ItemStore {
        self.items.as_ref()
    }

    pub fn schema(&self) -> &LabelSchema {
        &self.schema
    }

    pub fn ledger(&self) -> &ResultLedger {
        &self.ledger
    }

    pub fn stats(&self, ordinal: usize) -> Stats {
        let total = self.items.count();
        Stats {
            position: if total == 0 { 0 } else { ordinal + 1 },
            total,
            annotated: self.ledger.completion_count(),
        }
    }

    pub fn view(&self, ordinal: usize) -> Result<PageView> {
        if self.items.is_empty() {
            return Ok(PageView::Empty {
                message: NOTHING_TO_LABEL.to_string(),
            });
        }
        let navigation = Navigation::new(ordinal, self.items.count())?;
        let item = self.item(ordinal)?;
        let labels = self
            .schema
            .groups()
            .map(|group| {
                let selected = self.ledger.get_values(&item.identifier, group);
                LabelView {
                    name: group.name.clone(),
                    kind: group.kind,
                    options: group
                        .options
                        .iter()
                        .map(|opt| OptionView {
                            value: opt.value.clone(),
                            shortcut_index: opt.shortcut_index,
                            shortcut_key: opt.shortcut_key(),
                            selected: selected.contains(&opt.value),
                        })
                        .collect(),
                }
            })
            .collect();
        Ok(PageView::Item(Box::new(ItemView {
            ordinal,
            identifier: item.identifier.clone(),
            text: item.text.clone(),
            read_error: item.read_error.clone(),
            labels,
            navigation,
            stats: self.stats(ordinal),
        })))
    }

    pub fn submit(&self, submission: &Submission) -> Result<Stats> {
        let ordinal = pagination::resolve(submission.ordinal, self.items.count())?;
        let group = self
            .schema
            .get(&submission.label)
            .ok_or_else(|| AnnotateError::UnknownLabel(submission.label.clone()))?;
        let item = self.item(ordinal)?;
        let change = self
            .ledger
            .record(&item.identifier, group, &submission.values)?;
        info!(
            "item" = %item.identifier,
            "label" = %group.name,
            "change" = ?change,
            "annotation saved"
        );
        Ok(self.stats(ordinal))
    }

    pub fn summary(&self) -> Summary {
        let unreadable = self
            .items
            .items()
            .iter()
            .filter_map(|item| {
                item.read_error.as_ref().map(|reason| UnreadableItem {
                    ordinal: item.ordinal,
                    identifier: item.identifier.clone(),
                    reason: reason.clone(),
                })
            })
            .collect();
        Summary {
            source: self.items.describe(),
            total: self.items.count(),
            annotated: self.ledger.completion_count(),
            label_counts: self.ledger.label_counts(),
            unreadable,
        }
    }

    fn item(&self, ordinal: usize) -> Result<&crate::items::Item> {
        self.items.get(ordinal).ok_or(AnnotateError::OutOfRange {
            ordinal,
            count: self.items.count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::EmptyStore;
    use std::fs;
    use tempfile::tempdir;

    fn annotator_with_files(dir: &Path, files: &[(&str, &str)]) -> Annotator {
        let files_dir = dir.join("files");
        fs::create_dir_all(&files_dir).unwrap();
        for (name, text) in files {
            fs::write(files_dir.join(name), text).unwrap();
        }
        let labels = dir.join("labels.json");
        fs::write(
            &labels,
            r#"{"sentiment": {"options": ["pos", "neg"]}, "topics": {"options": ["a", "b"], "type": "multiple"}}"#,
        )
        .unwrap();
        let source = ItemSource::resolve(
            &files_dir,
            &dir.join("items.csv"),
            crate::items::DEFAULT_PATTERNS,
            crate::items::DEFAULT_MAX_BYTES,
        );
        Annotator::open(&source, &labels, &dir.join("results.csv")).unwrap()
    }

    #[test]
    fn view_reports_selection_and_navigation() {
        let dir = tempdir().unwrap();
        let annotator = annotator_with_files(dir.path(), &[("a.txt", "alpha"), ("b.txt", "beta")]);
        annotator
            .submit(&Submission {
                ordinal: 1,
                label: "topics".into(),
                values: vec!["b".into()],
            })
            .unwrap();

        let PageView::Item(view) = annotator.view(1).unwrap() else {
            panic!("expected an item view");
        };
        assert_eq!(view.identifier, "b.txt");
        assert_eq!(view.text, "beta");
        assert!(view.navigation.has_previous());
        assert!(!view.navigation.has_next());
        assert_eq!(
            view.stats,
            Stats {
                position: 2,
                total: 2,
                annotated: 1
            }
        );
        let topics = &view.labels[1];
        assert_eq!(topics.name, "topics");
        let selected: Vec<_> = topics.options.iter().map(|o| o.selected).collect();
        assert_eq!(selected, vec![false, true]);
        assert_eq!(topics.options[0].shortcut_key, Some('3'));
    }

    #[test]
    fn submit_rejects_bad_requests_without_mutation() {
        let dir = tempdir().unwrap();
        let annotator = annotator_with_files(dir.path(), &[("a.txt", "alpha")]);
        let bad_ordinal = annotator.submit(&Submission {
            ordinal: 5,
            label: "sentiment".into(),
            values: vec!["pos".into()],
        });
        assert!(matches!(bad_ordinal, Err(AnnotateError::OutOfRange { .. })));
        let bad_label = annotator.submit(&Submission {
            ordinal: 0,
            label: "color".into(),
            values: vec!["red".into()],
        });
        assert!(matches!(bad_label, Err(AnnotateError::UnknownLabel(_))));
        assert!(annotator.ledger().is_empty());
    }

    #[test]
    fn empty_item_set_yields_placeholder_view() {
        let dir = tempdir().unwrap();
        let annotator = Annotator::new(
            Box::new(EmptyStore),
            LabelSchema::default(),
            ResultLedger::open(dir.path().join("results.csv")).unwrap(),
        );
        assert_eq!(
            annotator.view(0).unwrap(),
            PageView::Empty {
                message: NOTHING_TO_LABEL.to_string()
            }
        );
        assert_eq!(annotator.stats(0).position, 0);
        assert!(annotator
            .submit(&Submission {
                ordinal: 0,
                label: "sentiment".into(),
                values: vec![],
            })
            .is_err());
    }

    #[test]
    fn view_out_of_range_is_an_error() {
        let dir = tempdir().unwrap();
        let annotator = annotator_with_files(dir.path(), &[("a.txt", "alpha")]);
        assert!(matches!(
            annotator.view(1),
            Err(AnnotateError::OutOfRange { ordinal: 1, count: 1 })
        ));
    }

    #[test]
    fn summary_lists_unreadable_items() {
        let dir = tempdir().unwrap();
        let files_dir = dir.path().join("files");
        fs::create_dir_all(&files_dir).unwrap();
        fs::write(files_dir.join("a.txt"), "alpha").unwrap();
        fs::write(files_dir.join("b.txt"), [0xc3u8, 0x28]).unwrap();
        let annotator = Annotator::open(
            &ItemSource::Directory {
                path: files_dir,
                patterns: "*.txt".into(),
                max_bytes: 1024,
            },
            &dir.path().join("labels.json"),
            &dir.path().join("results.csv"),
        )
        .unwrap();
        let summary = annotator.summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.unreadable.len(), 1);
        assert_eq!(summary.unreadable[0].identifier, "b.txt");
        assert!(annotator.schema().is_empty());
    }
}
