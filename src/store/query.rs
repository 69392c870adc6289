//! Query model evaluated by revision stores.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::model::TermFilter;
use crate::store::{Doc, IndexError};

pub const SCORE_FIELD: &str = "_score";
const ID_FIELD: &str = "id";

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    MatchAll,
    MatchNone,
    Exact { field: String, value: Value },
    ExactAny { field: String, values: Vec<Value> },
    Prefix { field: String, prefix: String },
    Exists { field: String },
    Range {
        field: String,
        gte: Option<Value>,
        lte: Option<Value>,
    },
    Text { field: String, filter: TermFilter },
    Bool(BoolExpression),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolExpression {
    pub must: Vec<Expression>,
    pub should: Vec<Expression>,
    pub must_not: Vec<Expression>,
    pub min_should_match: Option<usize>,
}

impl Expression {
    pub fn exact(field: &str, value: impl Into<Value>) -> Self {
        Expression::Exact {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn exact_any<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Expression::ExactAny {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn ids<V: Into<Value>>(ids: impl IntoIterator<Item = V>) -> Self {
        Self::exact_any(ID_FIELD, ids)
    }

    pub fn prefix(field: &str, prefix: impl Into<String>) -> Self {
        Expression::Prefix {
            field: field.to_string(),
            prefix: prefix.into(),
        }
    }

    pub fn exists(field: &str) -> Self {
        Expression::Exists {
            field: field.to_string(),
        }
    }

    pub fn range(field: &str, gte: Option<Value>, lte: Option<Value>) -> Self {
        Expression::Range {
            field: field.to_string(),
            gte,
            lte,
        }
    }

    pub fn text(field: &str, filter: TermFilter) -> Self {
        Expression::Text {
            field: field.to_string(),
            filter,
        }
    }

    pub fn bool() -> BoolBuilder {
        BoolBuilder::default()
    }

    /// Rejects malformed query strings embedded in text clauses.
    pub fn validate(&self) -> Result<(), IndexError> {
        match self {
            Expression::Text { filter, .. } => filter.validate().map_err(IndexError::BadQuery),
            Expression::Bool(bool) => bool
                .must
                .iter()
                .chain(bool.should.iter())
                .chain(bool.must_not.iter())
                .try_for_each(Expression::validate),
            _ => Ok(()),
        }
    }

    /// Score of `document` if it matches. Only text clauses contribute to the score.
    pub fn evaluate(&self, document: &Value) -> Option<f32> {
        match self {
            Expression::MatchAll => Some(0.0),
            Expression::MatchNone => None,
            Expression::Exact { field, value } => values_at(document, field)
                .into_iter()
                .any(|candidate| candidate == value)
                .then_some(0.0),
            Expression::ExactAny { field, values } => values_at(document, field)
                .into_iter()
                .any(|candidate| values.contains(candidate))
                .then_some(0.0),
            Expression::Prefix { field, prefix } => values_at(document, field)
                .into_iter()
                .any(|candidate| candidate.as_str().map_or(false, |s| s.starts_with(prefix.as_str())))
                .then_some(0.0),
            Expression::Exists { field } => (!values_at(document, field).is_empty()).then_some(0.0),
            Expression::Range { field, gte, lte } => values_at(document, field)
                .into_iter()
                .any(|candidate| {
                    gte.as_ref()
                        .map_or(true, |gte| compare_values(candidate, gte) != Ordering::Less)
                        && lte
                            .as_ref()
                            .map_or(true, |lte| compare_values(candidate, lte) != Ordering::Greater)
                })
                .then_some(0.0),
            Expression::Text { field, filter } => values_at(document, field)
                .into_iter()
                .filter_map(|candidate| candidate.as_str().and_then(|text| filter.score(text)))
                .fold(None, |best: Option<f32>, score| {
                    Some(best.map_or(score, |best| best.max(score)))
                }),
            Expression::Bool(bool) => bool.evaluate(document),
        }
    }
}

impl BoolExpression {
    fn evaluate(&self, document: &Value) -> Option<f32> {
        let mut score = 0.0;
        for clause in &self.must {
            score += clause.evaluate(document)?;
        }
        if self.must_not.iter().any(|clause| clause.evaluate(document).is_some()) {
            return None;
        }

        let required = self.min_should_match.unwrap_or(
            if self.must.is_empty() && !self.should.is_empty() { 1 } else { 0 },
        );
        let mut matched = 0;
        for clause in &self.should {
            if let Some(clause_score) = clause.evaluate(document) {
                matched += 1;
                score += clause_score;
            }
        }
        (matched >= required).then_some(score)
    }
}

#[derive(Debug, Default)]
pub struct BoolBuilder {
    expression: BoolExpression,
}

impl BoolBuilder {
    pub fn must(mut self, expression: Expression) -> Self {
        self.expression.must.push(expression);
        self
    }

    pub fn should(mut self, expression: Expression) -> Self {
        self.expression.should.push(expression);
        self
    }

    pub fn must_not(mut self, expression: Expression) -> Self {
        self.expression.must_not.push(expression);
        self
    }

    pub fn min_should_match(mut self, min_should_match: usize) -> Self {
        self.expression.min_should_match = Some(min_should_match);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.expression.must.is_empty()
            && self.expression.should.is_empty()
            && self.expression.must_not.is_empty()
    }

    pub fn build(self) -> Expression {
        if self.is_empty() {
            Expression::MatchAll
        } else {
            Expression::Bool(self.expression)
        }
    }
}

/// Values found at a dotted field path, arrays are flattened at every step.
pub fn values_at<'a>(document: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![document];
    for segment in path.split('.') {
        current = current
            .into_iter()
            .filter_map(|value| value.get(segment))
            .flat_map(flatten)
            .collect();
    }
    current.into_iter().filter(|value| !value.is_null()).collect()
}

fn flatten(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(values) => values.iter().collect(),
        other => vec![other],
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values used for sorting and ranges.
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Bool(l), Value::Bool(r)) => l.cmp(r),
        (Value::Number(l), Value::Number(r)) => {
            let l = l.as_f64().unwrap_or(0.0);
            let r = r.as_f64().unwrap_or(0.0);
            l.partial_cmp(&r).unwrap_or(Ordering::Equal)
        }
        (Value::String(l), Value::String(r)) => l.cmp(r),
        _ => type_rank(left).cmp(&type_rank(right)),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SortField {
    Field(String),
    Score,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortBy {
    pub field: SortField,
    pub ascending: bool,
}

impl SortBy {
    pub fn field(field: &str, ascending: bool) -> Self {
        Self {
            field: SortField::Field(field.to_string()),
            ascending,
        }
    }

    pub fn score() -> Self {
        Self {
            field: SortField::Score,
            ascending: false,
        }
    }

    /// Parses `field[:asc|:desc]`; `_score` sorts by relevance.
    pub fn parse(value: &str) -> Result<Self, String> {
        let (field, order) = match value.split_once(':') {
            Some((field, order)) => (field.trim(), Some(order.trim())),
            None => (value.trim(), None),
        };
        if field.is_empty() {
            return Err(format!("Missing sort field in '{}'", value));
        }
        let ascending = match order.map(str::to_lowercase).as_deref() {
            None => field != SCORE_FIELD,
            Some("asc") => true,
            Some("desc") => false,
            Some(other) => return Err(format!("Unknown sort order '{}'", other)),
        };
        Ok(if field == SCORE_FIELD {
            Self {
                field: SortField::Score,
                ascending,
            }
        } else {
            Self::field(field, ascending)
        })
    }

    pub fn is_score(&self) -> bool {
        self.field == SortField::Score
    }

    fn key(&self, document: &Value, score: f32) -> Value {
        match &self.field {
            SortField::Score => Value::from(score as f64),
            SortField::Field(field) => values_at(document, field)
                .into_iter()
                .next()
                .cloned()
                .unwrap_or(Value::Null),
        }
    }
}

/// Sort keys of a hit in the order of `sort`, followed by the document id.
pub fn sort_values(sort: &[SortBy], document: &Value, id: &str, score: f32) -> Vec<Value> {
    sort.iter()
        .map(|sort| sort.key(document, score))
        .chain(std::iter::once(Value::from(id)))
        .collect()
}

pub fn compare_sort_values(sort: &[SortBy], left: &[Value], right: &[Value]) -> Ordering {
    for (index, (l, r)) in left.iter().zip(right.iter()).enumerate() {
        let ordering = compare_values(l, r);
        let ordering = match sort.get(index) {
            Some(sort) if !sort.ascending => ordering.reverse(),
            _ => ordering,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

pub fn encode_search_after(values: &[Value]) -> String {
    URL_SAFE_NO_PAD.encode(Value::Array(values.to_vec()).to_string())
}

pub fn decode_search_after(token: &str) -> Result<Vec<Value>, IndexError> {
    let invalid = || IndexError::BadQuery(format!("Invalid searchAfter parameter '{}'.", token));
    let bytes = URL_SAFE_NO_PAD.decode(token).map_err(|_| invalid())?;
    match serde_json::from_slice(&bytes).map_err(|_| invalid())? {
        Value::Array(values) => Ok(values),
        _ => Err(invalid()),
    }
}

/// Keeps the requested top-level fields of a document, plus its id.
pub fn project(document: &Value, fields: &[String]) -> Value {
    if fields.is_empty() {
        return document.clone();
    }
    let Value::Object(source) = document else {
        return document.clone();
    };

    let mut projected = Map::new();
    for field in fields
        .iter()
        .map(|field| field.split('.').next().unwrap_or(field.as_str()))
        .chain(std::iter::once(ID_FIELD))
    {
        if let Some(value) = source.get(field) {
            projected.insert(field.to_string(), value.clone());
        }
    }
    Value::Object(projected)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub doc_type: String,
    pub expression: Expression,
    pub sort: Vec<SortBy>,
    pub limit: usize,
    pub search_after: Option<String>,
    pub fields: Vec<String>,
    pub track_scores: bool,
}

impl Query {
    pub fn select<D: Doc>() -> Self {
        Self::select_type(D::TYPE)
    }

    pub fn select_type(doc_type: &str) -> Self {
        Self {
            doc_type: doc_type.to_string(),
            expression: Expression::MatchAll,
            sort: Vec::new(),
            limit: usize::MAX,
            search_after: None,
            fields: Vec::new(),
            track_scores: false,
        }
    }

    pub fn filter(mut self, expression: Expression) -> Self {
        self.expression = expression;
        self
    }

    pub fn sort_by(mut self, sort: Vec<SortBy>) -> Self {
        self.sort = sort;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn search_after(mut self, search_after: Option<String>) -> Self {
        self.search_after = search_after;
        self
    }

    pub fn fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    pub fn track_scores(mut self, track_scores: bool) -> Self {
        self.track_scores = track_scores;
        self
    }
}

/// k-nearest-neighbour search over a dense vector field.
#[derive(Debug, Clone, PartialEq)]
pub struct KnnQuery {
    pub doc_type: String,
    pub field: String,
    pub query_vector: Vec<f32>,
    pub k: usize,
    pub num_candidates: usize,
    pub filter: Expression,
    pub similarity: Option<f32>,
    pub fields: Vec<String>,
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> Option<f32> {
    if left.len() != right.len() || left.is_empty() {
        return None;
    }
    let dot: f32 = left.iter().zip(right).map(|(l, r)| l * r).sum();
    let norm = |vector: &[f32]| vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    let denominator = norm(left) * norm(right);
    if denominator == 0.0 {
        return Some(0.0);
    }
    Some(dot / denominator)
}

pub fn vector_at(document: &Value, field: &str) -> Option<Vec<f32>> {
    let values = values_at(document, field);
    if values.is_empty() {
        return None;
    }
    values
        .into_iter()
        .map(|value| value.as_f64().map(|value| value as f32))
        .collect()
}

/// Bucket counts of the values found at `field` among matching documents.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationQuery {
    pub doc_type: String,
    pub filter: Expression,
    pub field: String,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct Aggregation {
    pub buckets: BTreeMap<String, usize>,
}

pub fn bucket_key(value: &Value) -> String {
    match value {
        Value::String(value) => value.clone(),
        other => other.to_string(),
    }
}

/// A search hit with its typed source.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit<T> {
    pub id: String,
    pub value: T,
    pub score: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hits<T> {
    pub hits: Vec<Hit<T>>,
    pub total: usize,
    pub limit: usize,
    pub search_after: Option<String>,
}

impl<T> Hits<T> {
    pub fn empty(limit: usize) -> Self {
        Self {
            hits: Vec::new(),
            total: 0,
            limit,
            search_after: None,
        }
    }

    pub fn try_map<U, E>(self, mut f: impl FnMut(T) -> Result<U, E>) -> Result<Hits<U>, E> {
        let hits = self
            .hits
            .into_iter()
            .map(|hit| {
                Ok(Hit {
                    id: hit.id,
                    value: f(hit.value)?,
                    score: hit.score,
                })
            })
            .collect::<Result<Vec<_>, E>>()?;
        Ok(Hits {
            hits,
            total: self.total,
            limit: self.limit,
            search_after: self.search_after,
        })
    }

    pub fn values(self) -> Vec<T> {
        self.hits.into_iter().map(|hit| hit.value).collect()
    }
}
