//! Keyword tag catalog.

use std::collections::BTreeSet;

use crate::models::{TagDefinition, TagKind};

/// The configured tags, matched against article titles.
#[derive(Debug, Clone, Default)]
pub struct TagCatalog {
    tags: Vec<TagDefinition>,
}

impl TagCatalog {
    /// Build a catalog, dropping blank names and duplicates.
    pub fn new(tags: impl IntoIterator<Item = TagDefinition>) -> Self {
        let mut seen = BTreeSet::new();
        let tags = tags
            .into_iter()
            .filter_map(|tag| {
                let name = tag.name.trim().to_string();
                if name.is_empty() || !seen.insert(name.clone()) {
                    return None;
                }
                Some(TagDefinition { name, ..tag })
            })
            .collect();
        Self { tags }
    }

    /// Names of all tags contained in `title`.
    pub fn match_title(&self, title: &str) -> BTreeSet<String> {
        self.tags
            .iter()
            .filter(|tag| title.contains(tag.name.as_str()))
            .map(|tag| tag.name.clone())
            .collect()
    }

    /// Tags whose name contains `name` (case-insensitive) and/or have the given kind.
    pub fn filter(&self, name: Option<&str>, kind: Option<TagKind>) -> Vec<&TagDefinition> {
        let needle = name.map(str::to_lowercase);
        self.tags
            .iter()
            .filter(|tag| {
                needle
                    .as_deref()
                    .is_none_or(|n| tag.name.to_lowercase().contains(n))
            })
            .filter(|tag| kind.is_none_or(|k| tag.kind == k))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
