use std::path::PathBuf;

use super::{Record, RecordHandle};

/// Records of one session in discovery order.
#[derive(Debug)]
pub struct RecordStore<H> {
    records: Vec<Record<H>>,
}

/// One line of the image listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSummary {
    pub file_name: String,
    pub path: PathBuf,
    pub series_uid: String,
}

impl<H> Default for RecordStore<H> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<H: RecordHandle> RecordStore<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: Record<H>) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first(&self) -> Option<&Record<H>> {
        self.records.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record<H>> {
        self.records.iter()
    }

    pub fn as_slice(&self) -> &[Record<H>] {
        &self.records
    }

    pub fn as_mut_slice(&mut self) -> &mut [Record<H>] {
        &mut self.records
    }

    pub fn items(&self) -> Vec<ItemSummary> {
        self.records
            .iter()
            .map(|record| ItemSummary {
                file_name: record.file_name(),
                path: record.path().to_path_buf(),
                series_uid: record.series_uid().to_string(),
            })
            .collect()
    }
}

impl<H: RecordHandle> FromIterator<Record<H>> for RecordStore<H> {
    fn from_iter<I: IntoIterator<Item = Record<H>>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl<'a, H> IntoIterator for &'a RecordStore<H> {
    type Item = &'a Record<H>;
    type IntoIter = std::slice::Iter<'a, Record<H>>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
