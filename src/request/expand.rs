//! Expansion of nested data into search results.
//!
//! The `expand` parameter is a comma separated list of expansions, each with
//! optional arguments: `versions(limit:5, sort:"effectiveTime:desc")`,
//! `descendants(direct:true, expand(bundleAncestors()))`.

use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::context::{BranchContext, BranchScope};
use crate::error::{ApiError, ApiResult};
use crate::model::concept::fields as concept_fields;
use crate::model::resource::fields as resource_fields;
use crate::model::{Concept, Options, Resource, ResourceDocument, ResourceLabel, ROOT_ID};
use crate::request::{
    ConceptBranchSearchRequestBuilder, ConceptSearchFilters, Request, RequestBuilder, ResourceSearchRequestBuilder,
    SearchResourceRequestBuilder, VersionSearchRequestBuilder,
};
use crate::store::{Expression, Query, SortBy};

pub const OPTION_EXPAND: &str = "expand";
pub const OPTION_LIMIT: &str = "limit";
pub const OPTION_SORT: &str = "sort";
pub const OPTION_DIRECT: &str = "direct";

struct ExpandParser<'a> {
    source: &'a str,
    chars: Vec<char>,
    position: usize,
}

impl<'a> ExpandParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            position: 0,
        }
    }

    fn error(&self, message: &str) -> ApiError {
        ApiError::bad_request(format!(
            "Malformed expand parameter '{}' at position {}: {}.",
            self.source, self.position, message
        ))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.position += 1;
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(expected) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> ApiResult<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", expected)))
        }
    }

    fn name(&mut self) -> ApiResult<String> {
        self.skip_whitespace();
        let start = self.position;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            self.position += 1;
        }
        if start == self.position {
            return Err(self.error("expected a name"));
        }
        Ok(self.chars[start..self.position].iter().collect())
    }

    /// `name[(arguments)]` items separated by commas.
    fn expansions(&mut self) -> ApiResult<Options> {
        let mut expansions = Options::new();
        loop {
            let name = self.name()?;
            let arguments = if self.eat('(') {
                let arguments = self.arguments()?;
                self.expect(')')?;
                arguments
            } else {
                Options::new()
            };
            expansions.put(name, Value::from(arguments));
            if !self.eat(',') {
                return Ok(expansions);
            }
        }
    }

    /// `key:value` pairs and nested `key(expansions)` lists, possibly empty.
    fn arguments(&mut self) -> ApiResult<Options> {
        let mut arguments = Options::new();
        self.skip_whitespace();
        if self.peek() == Some(')') {
            return Ok(arguments);
        }
        loop {
            let name = self.name()?;
            if self.eat(':') {
                let value = self.value()?;
                arguments.put(name, value);
            } else if self.eat('(') {
                self.skip_whitespace();
                let nested = if self.peek() == Some(')') {
                    Options::new()
                } else {
                    self.expansions()?
                };
                self.expect(')')?;
                arguments.put(name, Value::from(nested));
            } else {
                return Err(self.error(&format!("expected ':' or '(' after '{}'", name)));
            }
            if !self.eat(',') {
                return Ok(arguments);
            }
        }
    }

    fn value(&mut self) -> ApiResult<Value> {
        self.skip_whitespace();
        if self.peek() == Some('"') {
            self.position += 1;
            let start = self.position;
            while self.peek().is_some_and(|c| c != '"') {
                self.position += 1;
            }
            if self.peek().is_none() {
                return Err(self.error("unterminated string"));
            }
            let text: String = self.chars[start..self.position].iter().collect();
            self.position += 1;
            return Ok(Value::String(text));
        }

        let start = self.position;
        while self.peek().is_some_and(|c| c != ',' && c != ')') {
            self.position += 1;
        }
        let raw: String = self.chars[start..self.position].iter().collect();
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(self.error("expected a value"));
        }
        Ok(match raw {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => raw
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(raw.to_string())),
        })
    }
}

/// Parses an `expand` parameter into expansion name -> argument options.
pub fn parse_expand(expand: &str) -> ApiResult<Options> {
    if expand.trim().is_empty() {
        return Ok(Options::new());
    }
    let mut parser = ExpandParser::new(expand);
    let expansions = parser.expansions()?;
    parser.skip_whitespace();
    if parser.position < parser.chars.len() {
        return Err(parser.error("unexpected input"));
    }
    Ok(expansions)
}

fn sort_option(options: &Options) -> ApiResult<Option<SortBy>> {
    options
        .get_string(OPTION_SORT)
        .map(|sort| SortBy::parse(&sort).map_err(ApiError::bad_request))
        .transpose()
}

fn required_direct(options: &Options) -> ApiResult<bool> {
    options.get_bool(OPTION_DIRECT).ok_or_else(|| {
        ApiError::bad_request("The 'direct' parameter is required for the descendants expansion.")
    })
}

/// Attaches related data to a page of already loaded items.
#[async_trait::async_trait]
pub trait ResourceExpander<T>: Send + Sync {
    /// Key of the expansion in the `expand` parameter.
    fn name(&self) -> &'static str;

    async fn expand(
        &self,
        context: &BranchContext,
        items: &mut [T],
        options: &Options,
        locales: &[String],
    ) -> ApiResult<()>;
}

/// Runs every expander whose name was requested. Unknown names are ignored.
pub async fn expand_items<T: Send>(
    context: &BranchContext,
    expanders: &[Arc<dyn ResourceExpander<T>>],
    items: &mut [T],
    expand: &Options,
    locales: &[String],
) -> ApiResult<()> {
    if items.is_empty() || expand.is_empty() {
        return Ok(());
    }
    for expander in expanders {
        if expand.contains_key(expander.name()) {
            let options = expand.get_options(expander.name());
            expander.expand(context, items, &options, locales).await?;
        }
    }
    Ok(())
}

/// `bundleAncestors`: id and title of every bundle above each resource.
#[derive(Debug, Default)]
pub struct BundleAncestorsExpander;

#[async_trait::async_trait]
impl ResourceExpander<Resource> for BundleAncestorsExpander {
    fn name(&self) -> &'static str {
        "bundleAncestors"
    }

    async fn expand(
        &self,
        context: &BranchContext,
        items: &mut [Resource],
        _options: &Options,
        _locales: &[String],
    ) -> ApiResult<()> {
        let ids: BTreeSet<String> = items
            .iter()
            .flat_map(|item| item.document.bundle_ancestor_ids.iter())
            .filter(|id| id.as_str() != ROOT_ID)
            .cloned()
            .collect();

        let titles: HashMap<String, String> = if ids.is_empty() {
            HashMap::new()
        } else {
            let query = Query::select::<ResourceDocument>()
                .filter(Expression::ids(ids.iter().cloned()))
                .fields(vec![resource_fields::TITLE.to_string()])
                .limit(ids.len());
            context
                .searcher()
                .search::<ResourceDocument>(&query)
                .await?
                .values()
                .into_iter()
                .map(|bundle| (bundle.id, bundle.title))
                .collect()
        };

        for item in items.iter_mut() {
            let labels = item
                .document
                .bundle_ancestor_ids
                .iter()
                .filter_map(|id| {
                    titles.get(id).map(|title| ResourceLabel {
                        id: id.clone(),
                        title: title.clone(),
                    })
                })
                .collect();
            item.bundle_ancestors = Some(labels);
        }
        Ok(())
    }
}

/// `versions(limit, sort)`: versions of terminology resources.
#[derive(Debug, Default)]
pub struct VersionsExpander;

#[async_trait::async_trait]
impl ResourceExpander<Resource> for VersionsExpander {
    fn name(&self) -> &'static str {
        "versions"
    }

    async fn expand(
        &self,
        context: &BranchContext,
        items: &mut [Resource],
        options: &Options,
        locales: &[String],
    ) -> ApiResult<()> {
        let sort = sort_option(options)?;
        let limit = options.get_usize(OPTION_LIMIT);

        for item in items
            .iter_mut()
            .filter(|item| item.document.resource_type.is_terminology())
        {
            let mut builder = VersionSearchRequestBuilder::new()
                .filter_by_resource(&item.resource_uri)
                .set_locales(locales.to_vec());
            if let Some(limit) = limit {
                builder = builder.set_limit(limit);
            }
            if let Some(sort) = &sort {
                builder = builder.sort_by(vec![sort.clone()]);
            }
            item.versions = Some(builder.build().execute(context).await?);
        }
        Ok(())
    }
}

/// `descendants(direct, limit, expand)`: resources below each bundle.
#[derive(Debug, Default)]
pub struct ResourceDescendantsExpander;

#[async_trait::async_trait]
impl ResourceExpander<Resource> for ResourceDescendantsExpander {
    fn name(&self) -> &'static str {
        "descendants"
    }

    async fn expand(
        &self,
        context: &BranchContext,
        items: &mut [Resource],
        options: &Options,
        locales: &[String],
    ) -> ApiResult<()> {
        let direct = required_direct(options)?;
        let limit = options.get_usize(OPTION_LIMIT);
        let nested = options.get_options(OPTION_EXPAND);

        for item in items.iter_mut().filter(|item| item.document.is_bundle()) {
            let builder = ResourceSearchRequestBuilder::new();
            let mut builder = if direct {
                builder.filter_by_bundle_id(item.id())
            } else {
                builder.filter_by_bundle_ancestor_id(item.id())
            }
            .set_expand_options(nested.clone())
            .set_locales(locales.to_vec());
            if let Some(limit) = limit {
                builder = builder.set_limit(limit);
            }
            item.descendants = Some(builder.build().execute(context).await?);
        }
        Ok(())
    }
}

/// `descendants(direct, limit, expand)`: concepts below each concept, on the same branch.
#[derive(Debug, Default)]
pub struct ConceptDescendantsExpander;

#[async_trait::async_trait]
impl ResourceExpander<Concept> for ConceptDescendantsExpander {
    fn name(&self) -> &'static str {
        "descendants"
    }

    async fn expand(
        &self,
        context: &BranchContext,
        items: &mut [Concept],
        options: &Options,
        locales: &[String],
    ) -> ApiResult<()> {
        let direct = required_direct(options)?;
        let limit = options.get_usize(OPTION_LIMIT);
        let nested = options.get_options(OPTION_EXPAND);

        for item in items.iter_mut() {
            let builder = ConceptBranchSearchRequestBuilder::new(item.code_system.clone());
            let mut builder = if direct {
                builder.filter_by_parent(item.id.clone())
            } else {
                builder.filter_by_ancestor(item.id.clone())
            }
            .set_expand_options(nested.clone())
            .set_locales(locales.to_vec())
            .sort_by(vec![SortBy::field(concept_fields::ID, true)]);
            if let Some(limit) = limit {
                builder = builder.set_limit(limit);
            }
            item.descendants = Some(builder.build().execute(context).await?);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_expansions() {
        let expand = parse_expand("bundleAncestors(), versions").unwrap();
        assert_eq!(expand.get("bundleAncestors"), Some(&json!({})));
        assert_eq!(expand.get("versions"), Some(&json!({})));
    }

    #[test]
    fn arguments_and_nesting() {
        let expand = parse_expand(
            r#"descendants(direct:true, limit:10, expand(versions(sort:"effectiveTime:desc"), bundleAncestors()))"#,
        )
        .unwrap();
        let descendants = expand.get_options("descendants");
        assert_eq!(descendants.get_bool("direct"), Some(true));
        assert_eq!(descendants.get_usize("limit"), Some(10));

        let nested = descendants.get_options("expand");
        assert_eq!(
            nested.get_options("versions").get_string("sort"),
            Some("effectiveTime:desc".to_string())
        );
        assert!(nested.contains_key("bundleAncestors"));
    }

    #[test]
    fn malformed_expansions_are_bad_requests() {
        for malformed in ["versions(", "versions(limit)", "(x)", "a b", r#"x(s:"open)"#] {
            assert!(
                matches!(parse_expand(malformed), Err(ApiError::BadRequest(_))),
                "{} should be rejected",
                malformed
            );
        }
    }

    #[test]
    fn blank_expand_is_empty() {
        assert!(parse_expand("  ").unwrap().is_empty());
    }

    #[test]
    fn descendants_require_direct() {
        assert!(required_direct(&Options::new()).is_err());
        assert!(!required_direct(&Options::new().with("direct", false)).unwrap());
    }
}
