use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::domain::{CatalogItem, is_wildcard_category};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CategoryMode {
    /// Groups are whatever concrete categories appear in the catalog.
    #[default]
    Dynamic,
    /// Groups are exactly these keys; other categories are not displayed.
    Fixed(Vec<String>),
}

impl CategoryMode {
    pub fn fixed<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let keys = keys
            .into_iter()
            .map(|key| key.as_ref().trim().to_string())
            .filter(|key| !key.is_empty() && !is_wildcard_category(key))
            .filter(|key| seen.insert(key.clone()))
            .collect();
        CategoryMode::Fixed(keys)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryGroup {
    pub key: String,
    pub items: Vec<CatalogItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CategoryGroups {
    groups: Vec<CategoryGroup>,
}

impl CategoryGroups {
    pub fn get(&self, key: &str) -> Option<&[CatalogItem]> {
        self.groups
            .iter()
            .find(|group| group.key == key)
            .map(|group| group.items.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|group| group.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn into_vec(self) -> Vec<CategoryGroup> {
        self.groups
    }
}

pub fn group(items: &[CatalogItem], mode: &CategoryMode) -> CategoryGroups {
    let mut own: HashMap<&str, Vec<CatalogItem>> = HashMap::new();
    let mut discovered: Vec<&str> = Vec::new();
    let mut wildcard = Vec::new();

    for item in items {
        if !item.has_category() {
            continue;
        }
        let category = item.category.trim();
        if item.is_wildcard() {
            wildcard.push(item.clone());
            continue;
        }
        own.entry(category)
            .or_insert_with(|| {
                discovered.push(category);
                Vec::new()
            })
            .push(item.clone());
    }

    let universe: Vec<String> = match mode {
        CategoryMode::Dynamic => discovered.iter().map(|key| key.to_string()).collect(),
        CategoryMode::Fixed(keys) => keys.clone(),
    };

    let mut groups = universe
        .into_iter()
        .filter_map(|key| {
            let mut items = own.remove(key.as_str()).unwrap_or_default();
            items.extend(wildcard.iter().cloned());
            (!items.is_empty()).then_some(CategoryGroup { key, items })
        })
        .collect::<Vec<_>>();

    sort_groups(&mut groups);
    CategoryGroups { groups }
}

fn sort_groups(groups: &mut [CategoryGroup]) {
    let numeric = groups
        .iter()
        .map(|group| group.key.parse::<i64>().ok())
        .collect::<Option<Vec<_>>>();
    match numeric {
        Some(_) => groups.sort_by_key(|group| group.key.parse::<i64>().unwrap_or_default()),
        None => groups.sort_by(|a, b| a.key.cmp(&b.key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed(keys: &[&str]) -> Vec<CategoryGroup> {
        keys.iter()
            .map(|key| CategoryGroup {
                key: key.to_string(),
                items: Vec::new(),
            })
            .collect()
    }

    #[test]
    fn numeric_keys_sort_by_value() {
        let mut groups = keyed(&["10", "9", "11"]);
        sort_groups(&mut groups);
        let keys = groups.iter().map(|g| g.key.as_str()).collect::<Vec<_>>();
        assert_eq!(keys, vec!["9", "10", "11"]);
    }

    #[test]
    fn mixed_keys_sort_lexically() {
        let mut groups = keyed(&["10", "9", "b", "a"]);
        sort_groups(&mut groups);
        let keys = groups.iter().map(|g| g.key.as_str()).collect::<Vec<_>>();
        assert_eq!(keys, vec!["10", "9", "a", "b"]);
    }

    #[test]
    fn fixed_mode_drops_blank_duplicate_and_wildcard_keys() {
        let mode = CategoryMode::fixed(["9", " 10 ", "", "ALL", "9"]);
        assert_eq!(
            mode,
            CategoryMode::Fixed(vec!["9".to_string(), "10".to_string()])
        );
    }
}
