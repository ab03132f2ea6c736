use std::collections::HashMap;

use crate::record::{Field, Record, RecordHandle};

/// Records sharing one series instance UID. Derived from a store snapshot and
/// never updated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesGroup {
    pub series_uid: String,
    /// Series description of the first record seen with this key.
    pub description: Option<String>,
    /// Positions of the member records in the input slice.
    pub members: Vec<usize>,
}

impl SeriesGroup {
    pub fn image_count(&self) -> usize {
        self.members.len()
    }
}

/// Partition records by series UID. Groups come out in order of first
/// appearance; records without a UID share the `unknown` group.
pub fn group_into_series<H: RecordHandle>(records: &[Record<H>]) -> Vec<SeriesGroup> {
    let mut groups: Vec<SeriesGroup> = Vec::new();
    let mut by_uid: HashMap<&str, usize> = HashMap::new();

    for (index, record) in records.iter().enumerate() {
        let uid = record.series_uid();
        match by_uid.get(uid) {
            Some(&slot) => groups[slot].members.push(index),
            None => {
                by_uid.insert(uid, groups.len());
                groups.push(SeriesGroup {
                    series_uid: uid.to_string(),
                    description: record.field(Field::SeriesDescription).map(str::to_string),
                    members: vec![index],
                });
            }
        }
    }

    groups
}
