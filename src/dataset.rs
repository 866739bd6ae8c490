//! Append-only dataset accumulation

use std::collections::HashSet;

use crate::types::{Page, Record};

/// The ordered concatenation of all pages fetched in one run.
///
/// Append-only and owned exclusively by the run that produced it: records
/// are stored in fetch order and never reordered, deduplicated, or dropped.
/// The union of field names is tracked in first-seen order for the CSV
/// header.
#[derive(Debug, Default)]
pub struct Dataset {
    records: Vec<Record>,
    fields: Vec<String>,
    seen_fields: HashSet<String>,
    pages: u32,
}

impl Dataset {
    /// Create an empty dataset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a page in fetch order.
    ///
    /// Ragged schemas are tolerated: new field names extend the union,
    /// and each record keeps exactly the fields it arrived with.
    pub fn append(&mut self, page: Page) {
        for record in &page.records {
            for key in record.keys() {
                if !self.seen_fields.contains(key) {
                    self.seen_fields.insert(key.clone());
                    self.fields.push(key.clone());
                }
            }
        }
        self.records.extend(page.records);
        self.pages += 1;
    }

    /// Records in insertion order.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Union of field names in first-seen order.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Number of accumulated records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no records have been accumulated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of pages appended so far.
    #[must_use]
    pub fn pages(&self) -> u32 {
        self.pages
    }
}
