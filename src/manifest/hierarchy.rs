//! Directory listing emulation over the flat names of an image manifest

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::{ManifestError, Result};
use crate::sorting::natural_cmp;

/// Parameters of one listing request
#[derive(Debug, Clone, Default)]
pub struct HierarchyQuery<'a> {
    /// Maximum number of entries per page
    pub page_size: usize,
    /// Joined in front of every manifest name before matching
    pub manifest_prefix: Option<&'a str>,
    /// Directory being listed, `""` for the root; text after the last `/`
    /// filters names within that directory
    pub prefix: &'a str,
    /// Location the listing should open at when it lies below `prefix`
    pub default_prefix: Option<&'a str>,
    /// Position of the first entry of this page
    pub start_index: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryKind {
    Dir,
    Reg,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

impl ListingEntry {
    fn dir(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: EntryKind::Dir,
        }
    }

    fn file(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: EntryKind::Reg,
        }
    }
}

/// One page of a listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HierarchyPage {
    pub content: Vec<ListingEntry>,
    /// Start index of the following page, if any
    pub next: Option<usize>,
}

/// List the immediate children of `query.prefix` among `names`.
///
/// Directories come first, then files, each in natural order.
pub fn emulate_hierarchical_structure<I, S>(names: I, query: &HierarchyQuery<'_>) -> Result<HierarchyPage>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    if query.page_size == 0 {
        return Err(ManifestError::InvalidInput(
            "page_size must be greater than zero".to_string(),
        ));
    }

    let prefix = query.prefix;
    let mut search_prefix = prefix;

    if let Some(default_prefix) = query.default_prefix {
        if !prefix.starts_with(default_prefix) && !default_prefix.starts_with(prefix) {
            return Ok(HierarchyPage::default());
        }
        if let Some(tail) = default_prefix.strip_prefix(prefix).filter(|t| !t.is_empty()) {
            if let Some((dir, _)) = tail.split_once('/').filter(|(dir, _)| !dir.is_empty()) {
                return Ok(HierarchyPage {
                    content: vec![ListingEntry::dir(dir)],
                    next: None,
                });
            }
            search_prefix = default_prefix;
        }
    }

    // names are reported relative to the directory part of the prefix
    let directory_len = prefix.rfind('/').map_or(0, |i| i + 1);

    let mut dirs = BTreeSet::new();
    let mut files = Vec::new();
    for name in names {
        let name = match query.manifest_prefix {
            Some(manifest_prefix) if !manifest_prefix.is_empty() => {
                format!("{}/{}", manifest_prefix.trim_end_matches('/'), name.as_ref())
            }
            _ => name.as_ref().to_string(),
        };
        if !name.starts_with(search_prefix) {
            continue;
        }
        let relative = &name[directory_len..];
        match relative.split_once('/') {
            Some((dir, _)) => {
                dirs.insert(dir.to_string());
            }
            None => files.push(relative.to_string()),
        }
    }

    let mut dirs: Vec<String> = dirs.into_iter().collect();
    dirs.sort_by(|a, b| natural_cmp(a, b));
    files.sort_by(|a, b| natural_cmp(a, b));

    let start = query.start_index.unwrap_or(0);
    let end = start.saturating_add(query.page_size);
    let total = dirs.len() + files.len();

    let content = dirs
        .iter()
        .map(|d| ListingEntry::dir(d))
        .chain(files.iter().map(|f| ListingEntry::file(f)))
        .skip(start)
        .take(query.page_size)
        .collect();

    Ok(HierarchyPage {
        content,
        next: (total > end).then_some(end),
    })
}
