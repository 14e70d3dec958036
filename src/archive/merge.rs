//! Attribute-level "newer wins" merge reducer.
//!
//! Later inputs are assumed
//! to carry fresher, better information. For records sharing an `id`, each
//! attribute of the newer record overwrites the older one *unless* the new
//! value is blank — blank never overwrites, and attributes the newer record
//! doesn't mention are never dropped.

use super::record::Record;
use std::collections::BTreeMap;

/// Merge N ordered record streams into one map keyed by `id`. Order encodes
/// "newness": iterators later in `streams` win on conflicting attributes.
pub fn merge<I>(streams: I) -> Vec<Record>
where
    I: IntoIterator<Item = Vec<Record>>,
{
    let mut by_id: BTreeMap<String, Record> = BTreeMap::new();
    let mut order: Vec<String> = Vec::new();
    for records in streams {
        for new_record in records {
            match by_id.get_mut(&new_record.id) {
                Some(old_record) => {
                    for (k, v) in &new_record.attrs {
                        if v.trim().is_empty() {
                            continue;
                        }
                        old_record.attrs.insert(k.clone(), v.clone());
                    }
                    if new_record.thumb.is_some() {
                        old_record.thumb = new_record.thumb;
                    }
                }
                None => {
                    order.push(new_record.id.clone());
                    by_id.insert(new_record.id.clone(), new_record);
                }
            }
        }
    }
    order.into_iter().filter_map(|id| by_id.remove(&id)).collect()
}
