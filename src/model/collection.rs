use serde::{Deserialize, Serialize};

/// One page of results with the total hit count and the cursor of the next page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageableCollection<T> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_after: Option<String>,
    pub limit: usize,
    pub total: usize,
}

impl<T> PageableCollection<T> {
    pub fn new(items: Vec<T>, search_after: Option<String>, limit: usize, total: usize) -> Self {
        Self {
            items,
            search_after,
            limit,
            total,
        }
    }

    pub fn empty(limit: usize) -> Self {
        Self::new(Vec::new(), None, limit, 0)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageableCollection<U> {
        PageableCollection {
            items: self.items.into_iter().map(f).collect(),
            search_after: self.search_after,
            limit: self.limit,
            total: self.total,
        }
    }
}

impl<T> IntoIterator for PageableCollection<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
