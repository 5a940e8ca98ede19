//! Mapping between journal entries and LED addresses
//!
//! Entries get a *logical index*: their rank in chronological order across the
//! whole, unfiltered journal. The logical grid is then folded onto the strip
//! wiring to obtain the *physical index*.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};

use crate::models::Color;

/// The part of a journal entry the LED grid cares about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub id: String,
    pub creation_date: DateTime<Utc>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "crate::color::serialize_optional_hex",
        deserialize_with = "crate::color::deserialize_optional_hex"
    )]
    pub color: Option<Color>,
}

impl JournalEntry {
    pub fn new(id: impl Into<String>, creation_date: DateTime<Utc>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            creation_date,
            kind: kind.into(),
            color: None,
        }
    }
}

fn chronological<'e>(all_entries: &'e [JournalEntry]) -> Vec<&'e JournalEntry> {
    let mut sorted: Vec<_> = all_entries.iter().collect();
    // Ties on the timestamp are broken by id so the order never depends on input order
    sorted.sort_by(|a, b| {
        a.creation_date
            .cmp(&b.creation_date)
            .then_with(|| a.id.cmp(&b.id))
    });
    sorted
}

/// Rank of `entry` (matched by id) in the chronological order of `all_entries`
///
/// `all_entries` must be the full journal, never a filtered subset, otherwise indices
/// shift whenever the filter changes.
pub fn logical_index_of(entry: &JournalEntry, all_entries: &[JournalEntry]) -> Option<usize> {
    chronological(all_entries)
        .iter()
        .position(|candidate| candidate.id == entry.id)
}

/// Logical indices of every entry, keyed by entry id
pub fn logical_indices(all_entries: &[JournalEntry]) -> HashMap<String, usize> {
    chronological(all_entries)
        .into_iter()
        .enumerate()
        .map(|(index, entry)| (entry.id.clone(), index))
        .collect()
}

/// Serpentine transform: even rows run left to right, odd rows right to left
///
/// Returns `None` when `logical_index` falls outside the grid.
pub fn physical_index_of(logical_index: usize, rows: usize, cols: usize) -> Option<usize> {
    if cols == 0 || logical_index >= rows * cols {
        return None;
    }

    let row = logical_index / cols;
    let col = logical_index % cols;
    let physical_col = if row % 2 == 0 { col } else { cols - 1 - col };

    Some(row * cols + physical_col)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub rows: usize,
    pub cols: usize,
    pub serpentine: bool,
}

impl GridLayout {
    pub fn capacity(&self) -> usize {
        self.rows * self.cols
    }

    pub fn physical_index(&self, logical_index: usize) -> Option<usize> {
        if self.serpentine {
            physical_index_of(logical_index, self.rows, self.cols)
        } else if logical_index < self.capacity() {
            Some(logical_index)
        } else {
            None
        }
    }

    /// Builds a physical pixel buffer from logical cells, skipping off-grid ones
    pub fn render(&self, cells: impl IntoIterator<Item = (usize, Color)>) -> Vec<Color> {
        let mut pixels = vec![crate::color::BLACK; self.capacity()];

        for (logical_index, color) in cells {
            match self.physical_index(logical_index) {
                Some(physical_index) => pixels[physical_index] = color,
                None => {
                    trace!(logical_index, capacity = self.capacity(), "skipping off-grid entry");
                }
            }
        }

        pixels
    }
}
