use serde_json::Value;

use crate::context::{BranchContext, BranchScope, ServiceProvider};
use crate::error::{ApiError, ApiResult};
use crate::model::{KnnFilter, Options, PageableCollection, TermFilter};
use crate::request::expand::parse_expand;
use crate::request::Request;
use crate::store::{Doc, Expression, Hits, KnnQuery, Query, SortBy};

/// Option key shared by every search: ids of the documents to return.
pub const OPTION_ID: &str = "id";

/// Paging, projection, expansion and filter parameters of a search request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchParams {
    pub limit: Option<usize>,
    pub search_after: Option<String>,
    pub fields: Vec<String>,
    pub sort: Vec<SortBy>,
    /// Raw `expand` parameter, parsed at execution time.
    pub expand: Option<String>,
    /// Already parsed expansions, merged over `expand`.
    pub expand_options: Options,
    pub locales: Vec<String>,
    pub options: Options,
    pub term: Option<TermFilter>,
    pub knn: Option<KnnFilter>,
}

impl SearchParams {
    pub fn ids(&self) -> Vec<String> {
        self.options.get_strings(OPTION_ID)
    }

    /// Requested expansions keyed by expander name.
    pub fn expand(&self) -> ApiResult<Options> {
        let mut expand = match &self.expand {
            Some(raw) => parse_expand(raw)?,
            None => Options::new(),
        };
        for (key, value) in self.expand_options.iter() {
            expand.put(key.clone(), value.clone());
        }
        Ok(expand)
    }
}

/// Rewrites a `@key(value1,value2)` term into the equivalent option filter.
pub fn rewrite_special_option_keys(params: &SearchParams, keys: &[&str]) -> ApiResult<SearchParams> {
    let Some(term) = &params.term else {
        return Ok(params.clone());
    };
    let text = term.term().trim();
    let Some(shorthand) = text.strip_prefix('@') else {
        return Ok(params.clone());
    };

    let malformed = || {
        ApiError::bad_request(format!(
            "Special option key term '{}' should have the form '@key(value1,value2)'.",
            text
        ))
    };
    let (key, rest) = shorthand.split_once('(').ok_or_else(malformed)?;
    let values = rest.strip_suffix(')').ok_or_else(malformed)?;

    if !keys.contains(&key) {
        return Err(ApiError::bad_request(format!(
            "Special option key '@{}' is not supported. Supported keys are: {}.",
            key,
            keys.join(", ")
        )));
    }

    let values: Vec<Value> = values
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(Value::from)
        .collect();
    if values.is_empty() {
        return Err(malformed());
    }

    let mut rewritten = params.clone();
    rewritten.term = None;
    rewritten.options.put(key, Value::Array(values));
    Ok(rewritten)
}

/// Per-document-type search behavior plugged into `SearchIndexResourceRequest`.
#[async_trait::async_trait]
pub trait SearchIndexResource: Send + Sync {
    type Document: Doc;
    type Item: Send;

    /// Option keys that may be addressed with the `@key(values)` term shorthand.
    fn special_option_keys(&self) -> &'static [&'static str] {
        &[OPTION_ID]
    }

    /// Fields loaded even when the caller asks for a subset.
    fn required_fields(&self) -> &'static [&'static str] {
        &[]
    }

    fn default_sort(&self) -> Vec<SortBy> {
        vec![SortBy::field("id", true)]
    }

    fn supports_knn(&self) -> bool {
        false
    }

    /// Filter expression of the search, `None` when the result is known to be empty.
    async fn prepare_query(&self, context: &BranchContext, params: &SearchParams) -> ApiResult<Option<Expression>>;

    async fn to_collection(
        &self,
        context: &BranchContext,
        hits: Hits<Self::Document>,
        params: &SearchParams,
    ) -> ApiResult<PageableCollection<Self::Item>>;
}

pub struct SearchIndexResourceRequest<S> {
    strategy: S,
    params: SearchParams,
}

impl<S> SearchIndexResourceRequest<S> {
    pub fn new(strategy: S, params: SearchParams) -> Self {
        Self { strategy, params }
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }
}

#[async_trait::async_trait]
impl<C, S> Request<C> for SearchIndexResourceRequest<S>
where
    C: BranchScope,
    S: SearchIndexResource,
{
    type Output = PageableCollection<S::Item>;

    async fn execute(&self, context: &C) -> ApiResult<Self::Output> {
        let params = rewrite_special_option_keys(&self.params, self.strategy.special_option_keys())?;
        let context = context.branch_context();
        let limit = params
            .limit
            .unwrap_or(context.services().config().default_page_size);

        let Some(expression) = self.strategy.prepare_query(context, &params).await? else {
            return self.strategy.to_collection(context, Hits::empty(limit), &params).await;
        };

        let fields: Vec<String> = if params.fields.is_empty() {
            Vec::new()
        } else {
            params
                .fields
                .iter()
                .cloned()
                .chain(self.strategy.required_fields().iter().map(|field| field.to_string()))
                .collect()
        };

        let hits = match &params.knn {
            Some(knn) => {
                if !self.strategy.supports_knn() {
                    return Err(ApiError::bad_request(format!(
                        "Knn search is not supported for '{}' documents.",
                        S::Document::TYPE
                    )));
                }
                let query = KnnQuery {
                    doc_type: S::Document::TYPE.to_string(),
                    field: knn.field().to_string(),
                    query_vector: knn.query_vector().to_vec(),
                    k: knn.k().min(limit),
                    num_candidates: knn.get_num_candidates(),
                    filter: expression,
                    similarity: knn.get_similarity(),
                    fields,
                };
                context.searcher().knn::<S::Document>(&query).await?
            }
            None => {
                let sort = if !params.sort.is_empty() {
                    params.sort.clone()
                } else if params.term.is_some() {
                    vec![SortBy::score()]
                } else {
                    self.strategy.default_sort()
                };
                let query = Query::select::<S::Document>()
                    .filter(expression)
                    .sort_by(sort)
                    .limit(limit)
                    .search_after(params.search_after.clone())
                    .fields(fields)
                    .track_scores(params.term.is_some());
                context.searcher().search::<S::Document>(&query).await?
            }
        };

        self.strategy.to_collection(context, hits, &params).await
    }
}

/// Fluent setters shared by every search request builder.
pub trait SearchResourceRequestBuilder: Sized {
    fn params_mut(&mut self) -> &mut SearchParams;

    fn set_limit(mut self, limit: usize) -> Self {
        self.params_mut().limit = Some(limit);
        self
    }

    fn set_search_after(mut self, search_after: Option<String>) -> Self {
        self.params_mut().search_after = search_after;
        self
    }

    fn set_fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        self.params_mut().fields = fields.into_iter().map(Into::into).collect();
        self
    }

    fn sort_by(mut self, sort: Vec<SortBy>) -> Self {
        self.params_mut().sort = sort;
        self
    }

    fn set_expand(mut self, expand: impl Into<String>) -> Self {
        self.params_mut().expand = Some(expand.into());
        self
    }

    fn set_expand_options(mut self, expand: Options) -> Self {
        self.params_mut().expand_options = expand;
        self
    }

    fn set_locales<I, L>(mut self, locales: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        self.params_mut().locales = locales.into_iter().map(Into::into).collect();
        self
    }

    fn filter_by_term(self, term: impl Into<String>) -> Self {
        self.filter_by_term_filter(TermFilter::match_term(term))
    }

    fn filter_by_term_filter(mut self, term: TermFilter) -> Self {
        self.params_mut().term = Some(term);
        self
    }

    fn filter_by_knn(mut self, knn: KnnFilter) -> Self {
        self.params_mut().knn = Some(knn);
        self
    }

    fn filter_by_id(self, id: impl Into<String>) -> Self {
        self.filter_by_ids([id.into()])
    }

    fn filter_by_ids<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<Value> = ids.into_iter().map(|id| Value::String(id.into())).collect();
        self.set_option(OPTION_ID, Value::Array(ids))
    }

    fn set_option(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params_mut().options.put(key, value);
        self
    }

    fn set_options(mut self, options: Options) -> Self {
        for (key, value) in options.iter() {
            self.params_mut().options.put(key.clone(), value.clone());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn special_keys_become_options() {
        let params = SearchParams {
            term: Some(TermFilter::match_term("@id(a, b)")),
            ..Default::default()
        };
        let rewritten = rewrite_special_option_keys(&params, &["id", "url"]).unwrap();
        assert!(rewritten.term.is_none());
        assert_eq!(rewritten.options.get("id"), Some(&json!(["a", "b"])));
    }

    #[test]
    fn plain_terms_are_untouched() {
        let params = SearchParams {
            term: Some(TermFilter::match_term("fracture")),
            ..Default::default()
        };
        assert_eq!(rewrite_special_option_keys(&params, &["id"]).unwrap(), params);
    }

    #[test]
    fn unknown_or_malformed_special_keys() {
        let unknown = SearchParams {
            term: Some(TermFilter::match_term("@owner(x)")),
            ..Default::default()
        };
        assert!(matches!(
            rewrite_special_option_keys(&unknown, &["id"]),
            Err(ApiError::BadRequest(_))
        ));

        let malformed = SearchParams {
            term: Some(TermFilter::match_term("@id(")),
            ..Default::default()
        };
        assert!(rewrite_special_option_keys(&malformed, &["id"]).is_err());
    }
}
