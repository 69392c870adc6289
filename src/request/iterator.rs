use crate::error::ApiResult;
use crate::model::PageableCollection;
use crate::request::{Request, RequestBuilder, SearchResourceRequestBuilder};

/// Pages through every match of a search by re-issuing it with the previous cursor.
///
/// The total reported by the first page bounds the iteration; it stops early on
/// an empty page or a page without a cursor.
pub struct SearchResourceRequestIterator<'a, B, C> {
    builder: B,
    context: &'a C,
    search_after: Option<String>,
    total: Option<usize>,
    visited: usize,
    done: bool,
}

impl<'a, B, C, T> SearchResourceRequestIterator<'a, B, C>
where
    B: SearchResourceRequestBuilder + RequestBuilder + Clone,
    B::Request: Request<C, Output = PageableCollection<T>>,
    C: Sync,
{
    pub fn new(builder: B, context: &'a C) -> Self {
        Self {
            builder,
            context,
            search_after: None,
            total: None,
            visited: 0,
            done: false,
        }
    }

    pub async fn next_page(&mut self) -> ApiResult<Option<PageableCollection<T>>> {
        if self.done {
            return Ok(None);
        }

        let request = self
            .builder
            .clone()
            .set_search_after(self.search_after.clone())
            .build();
        let page = request.execute(self.context).await?;

        let total = *self.total.get_or_insert(page.total);
        if page.is_empty() {
            self.done = true;
            return Ok(None);
        }

        self.visited += page.len();
        self.search_after = page.search_after.clone();
        if self.visited >= total || self.search_after.is_none() {
            self.done = true;
        }
        Ok(Some(page))
    }

    pub fn visited(&self) -> usize {
        self.visited
    }

    pub async fn collect_all(mut self) -> ApiResult<Vec<T>> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page);
        }
        Ok(items)
    }
}
