use std::slice::Iter;
use strum_macros::Display;

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    #[strum(serialize = "added")]
    Added,
    #[strum(serialize = "removed")]
    Removed,
    #[strum(serialize = "changed")]
    Changed,
}

/// One package whose version differs between two manifests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEntry {
    pub name: String,
    pub before: Option<String>,
    pub after: Option<String>,
}

impl ChangeEntry {
    pub fn kind(&self) -> ChangeKind {
        match (&self.before, &self.after) {
            (Some(_), None) => ChangeKind::Removed,
            (None, Some(_)) => ChangeKind::Added,
            _ => ChangeKind::Changed,
        }
    }

    pub fn before_or_empty(&self) -> &str {
        self.before.as_deref().unwrap_or_default()
    }

    pub fn after_or_empty(&self) -> &str {
        self.after.as_deref().unwrap_or_default()
    }
}

/// Changes sorted by package name, one entry per name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    entries: Vec<ChangeEntry>,
}

impl ChangeSet {
    pub(crate) fn from_unsorted(mut entries: Vec<ChangeEntry>) -> Self {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        ChangeSet { entries }
    }

    pub fn iter(&self) -> Iter<'_, ChangeEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count_of(&self, kind: ChangeKind) -> usize {
        self.entries.iter().filter(|entry| entry.kind() == kind).count()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a ChangeEntry;
    type IntoIter = Iter<'a, ChangeEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
