use serde::Serialize;

use crate::error::{AnnotateError, Result};

/// Checks a 0-based ordinal against the item count.
pub fn resolve(ordinal: usize, count: usize) -> Result<usize> {
    if ordinal < count {
        Ok(ordinal)
    } else {
        Err(AnnotateError::OutOfRange { ordinal, count })
    }
}

pub fn has_previous(ordinal: usize) -> bool {
    ordinal > 0
}

pub fn has_next(ordinal: usize, count: usize) -> bool {
    ordinal + 1 < count
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Navigation {
    pub ordinal: usize,
    pub previous: Option<usize>,
    pub next: Option<usize>,
}

impl Navigation {
    pub fn new(ordinal: usize, count: usize) -> Result<Self> {
        let ordinal = resolve(ordinal, count)?;
        Ok(Self {
            ordinal,
            previous: has_previous(ordinal).then(|| ordinal - 1),
            next: has_next(ordinal, count).then(|| ordinal + 1),
        })
    }

    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }

    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }
}
