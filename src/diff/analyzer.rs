use crate::diff::results::{ChangeEntry, ChangeSet};
use crate::pkg::manifest::Manifest;

/// Classifies every package name in either manifest as removed, changed,
/// added or unchanged, and returns the non-unchanged ones sorted by name.
pub fn get_diff_between(before: &Manifest, after: &Manifest) -> ChangeSet {
    let mut entries = Vec::new();

    for (name, previous_version) in before.iter() {
        match after.get(name) {
            None => entries.push(ChangeEntry {
                name: name.clone(),
                before: Some(previous_version.clone()),
                after: None,
            }),
            Some(current_version) if current_version.ne(previous_version) => {
                entries.push(ChangeEntry {
                    name: name.clone(),
                    before: Some(previous_version.clone()),
                    after: Some(current_version.to_string()),
                })
            }
            Some(_) => {}
        }
    }

    for (name, current_version) in after.iter() {
        if !before.contains(name) {
            entries.push(ChangeEntry {
                name: name.clone(),
                before: None,
                after: Some(current_version.clone()),
            });
        }
    }

    ChangeSet::from_unsorted(entries)
}
