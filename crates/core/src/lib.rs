mod annotator;
mod error;
mod items;
mod ledger;
pub mod pagination;
mod schema;

pub use annotator::{
    Annotator, ItemView, LabelView, OptionView, PageView, Stats, Submission, Summary,
    UnreadableItem, NOTHING_TO_LABEL,
};
pub use error::{AnnotateError, Result};
pub use items::{
    open_store, DirectoryStore, EmptyStore, Item, ItemSource, ItemStore, TableStore,
    DEFAULT_MAX_BYTES, DEFAULT_PATTERNS,
};
pub use ledger::{Change, ResultLedger, ResultRow};
pub use pagination::Navigation;
pub use schema::{
    shortcut_key, LabelGroup, LabelKind, LabelOption, LabelSchema, MULTI_VALUE_SEPARATOR,
};
