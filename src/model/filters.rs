//! Match strategies shared by request builders and the index evaluator.

use crate::error::{ApiError, ApiResult};

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on",
    "or", "the", "to", "with",
];

#[derive(Debug, Clone, PartialEq)]
pub enum MatchType {
    /// Every query token must prefix a token of the text.
    Match,
    /// The whole text must equal the term.
    Exact,
    /// Every query token must be within an edit distance of a token of the text.
    Fuzzy,
    /// The term is a query string with quoted phrases, `-` exclusions and `*` prefixes.
    Parsed,
    /// At least `min_should_match` query tokens must match.
    AnyTokens { min_should_match: usize },
}

/// Immutable description of how a term is matched against a text field.
#[derive(Debug, Clone, PartialEq)]
pub struct TermFilter {
    term: String,
    match_type: MatchType,
    case_sensitive: bool,
    ignore_stopwords: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Clause {
    Token(String),
    Prefix(String),
    Phrase(Vec<String>),
    Not(Box<Clause>),
}

impl TermFilter {
    fn of(term: impl Into<String>, match_type: MatchType) -> Self {
        Self {
            term: term.into(),
            match_type,
            case_sensitive: false,
            ignore_stopwords: false,
        }
    }

    pub fn match_term(term: impl Into<String>) -> Self {
        Self::of(term, MatchType::Match)
    }

    pub fn exact(term: impl Into<String>) -> Self {
        Self::of(term, MatchType::Exact)
    }

    pub fn fuzzy(term: impl Into<String>) -> Self {
        Self::of(term, MatchType::Fuzzy)
    }

    pub fn parsed(term: impl Into<String>) -> Self {
        Self::of(term, MatchType::Parsed)
    }

    pub fn min_term_match(term: impl Into<String>, min_should_match: usize) -> ApiResult<Self> {
        if min_should_match < 1 {
            return Err(ApiError::bad_request(format!(
                "minShouldMatch must be greater than or equal to 1, got {}.",
                min_should_match
            )));
        }
        Ok(Self::of(term, MatchType::AnyTokens { min_should_match }))
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn ignore_stopwords(mut self, ignore_stopwords: bool) -> Self {
        self.ignore_stopwords = ignore_stopwords;
        self
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn match_type(&self) -> &MatchType {
        &self.match_type
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn with_term(&self, term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            ..self.clone()
        }
    }

    /// Checks query string syntax; only `Parsed` filters can fail.
    pub fn validate(&self) -> Result<(), String> {
        if self.match_type == MatchType::Parsed {
            self.parse_clauses()?;
        }
        Ok(())
    }

    /// Relevance score of `text`, `None` if it does not match.
    pub fn score(&self, text: &str) -> Option<f32> {
        let normalized_text = self.normalize(text);
        if self.match_type == MatchType::Exact {
            return (normalized_text == self.normalize(&self.term)).then_some(2.0);
        }

        let text_tokens = self.tokens(&normalized_text);
        let exact_bonus = if normalized_text == self.normalize(&self.term) { 1.0 } else { 0.0 };

        match &self.match_type {
            MatchType::Exact => None,
            MatchType::Match => {
                let query = self.tokens(&self.normalize(&self.term));
                if query.is_empty() {
                    return Some(0.0);
                }
                query
                    .iter()
                    .all(|q| text_tokens.iter().any(|t| t.starts_with(q.as_str())))
                    .then(|| relevance(query.len(), text_tokens.len()) + exact_bonus)
            }
            MatchType::Fuzzy => {
                let query = self.tokens(&self.normalize(&self.term));
                if query.is_empty() {
                    return Some(0.0);
                }
                query
                    .iter()
                    .all(|q| {
                        text_tokens
                            .iter()
                            .any(|t| edit_distance(q, t) <= max_edits(q))
                    })
                    .then(|| relevance(query.len(), text_tokens.len()) + exact_bonus)
            }
            MatchType::AnyTokens { min_should_match } => {
                let query = self.tokens(&self.normalize(&self.term));
                let matched = query
                    .iter()
                    .filter(|q| text_tokens.iter().any(|t| t.starts_with(q.as_str())))
                    .count();
                (matched >= *min_should_match)
                    .then(|| relevance(matched, text_tokens.len()) + exact_bonus)
            }
            MatchType::Parsed => {
                let clauses = self.parse_clauses().ok()?;
                let mut positive = 0;
                for clause in &clauses {
                    match clause {
                        Clause::Not(inner) => {
                            if clause_matches(inner, &text_tokens) {
                                return None;
                            }
                        }
                        other => {
                            if !clause_matches(other, &text_tokens) {
                                return None;
                            }
                            positive += 1;
                        }
                    }
                }
                Some(relevance(positive, text_tokens.len()) + exact_bonus)
            }
        }
    }

    fn normalize(&self, value: &str) -> String {
        if self.case_sensitive {
            value.to_string()
        } else {
            value.to_lowercase()
        }
    }

    fn tokens(&self, value: &str) -> Vec<String> {
        let tokens: Vec<String> = value
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect();

        if !self.ignore_stopwords {
            return tokens;
        }

        let filtered: Vec<String> = tokens
            .iter()
            .filter(|token| !STOPWORDS.contains(&token.to_lowercase().as_str()))
            .cloned()
            .collect();
        // a term made only of stopwords still has to match something
        if filtered.is_empty() {
            tokens
        } else {
            filtered
        }
    }

    fn parse_clauses(&self) -> Result<Vec<Clause>, String> {
        let query = self.normalize(&self.term);
        let mut clauses = Vec::new();
        let mut chars = query.chars().peekable();

        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                chars.next();
                continue;
            }

            let negated = c == '-';
            if negated {
                chars.next();
            }

            let clause = if chars.peek() == Some(&'"') {
                chars.next();
                let mut phrase = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '"' {
                        closed = true;
                        break;
                    }
                    phrase.push(c);
                }
                if !closed {
                    return Err(format!("Unbalanced quote in query '{}'", self.term));
                }
                let tokens = self.tokens(&phrase);
                if tokens.is_empty() {
                    return Err(format!("Empty phrase in query '{}'", self.term));
                }
                Clause::Phrase(tokens)
            } else {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                match word.strip_suffix('*') {
                    Some(prefix) => {
                        if prefix.is_empty() || prefix.contains('*') {
                            return Err(format!("Invalid wildcard in query '{}'", self.term));
                        }
                        Clause::Prefix(prefix.to_string())
                    }
                    None => {
                        if word.is_empty() || word.contains('*') {
                            return Err(format!("Invalid token in query '{}'", self.term));
                        }
                        Clause::Token(word)
                    }
                }
            };

            clauses.push(if negated {
                Clause::Not(Box::new(clause))
            } else {
                clause
            });
        }

        if clauses.iter().all(|clause| matches!(clause, Clause::Not(_))) {
            return Err(format!("Query '{}' has no positive clause", self.term));
        }
        Ok(clauses)
    }
}

fn clause_matches(clause: &Clause, text_tokens: &[String]) -> bool {
    match clause {
        Clause::Token(token) => text_tokens.iter().any(|t| t == token),
        Clause::Prefix(prefix) => text_tokens.iter().any(|t| t.starts_with(prefix.as_str())),
        Clause::Phrase(phrase) => text_tokens
            .windows(phrase.len())
            .any(|window| window == phrase.as_slice()),
        Clause::Not(inner) => !clause_matches(inner, text_tokens),
    }
}

fn relevance(matched: usize, text_len: usize) -> f32 {
    1.0 + matched as f32 / text_len.max(1) as f32
}

fn max_edits(token: &str) -> usize {
    match token.chars().count() {
        0..=2 => 0,
        3..=5 => 1,
        _ => 2,
    }
}

/// Optimal string alignment distance: insertions, deletions, substitutions and
/// swaps of adjacent characters each cost one edit.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut before_previous: Vec<usize> = vec![0; b.len() + 1];
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    for i in 0..a.len() {
        let mut current = vec![i + 1; b.len() + 1];
        for j in 0..b.len() {
            let substitution = previous[j] + usize::from(a[i] != b[j]);
            let mut distance = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
            if i > 0 && j > 0 && a[i] == b[j - 1] && a[i - 1] == b[j] {
                distance = distance.min(before_previous[j - 1] + 1);
            }
            current[j + 1] = distance;
        }
        before_previous = std::mem::replace(&mut previous, current);
    }
    previous[b.len()]
}

/// k-nearest-neighbour match against a dense vector field.
#[derive(Debug, Clone, PartialEq)]
pub struct KnnFilter {
    field: String,
    query_vector: Vec<f32>,
    k: usize,
    num_candidates: usize,
    similarity: Option<f32>,
}

impl KnnFilter {
    pub fn new(field: impl Into<String>, query_vector: Vec<f32>, k: usize) -> ApiResult<Self> {
        if query_vector.is_empty() {
            return Err(ApiError::bad_request("Knn query vector must not be empty."));
        }
        if k < 1 {
            return Err(ApiError::bad_request("Knn 'k' must be greater than or equal to 1."));
        }
        Ok(Self {
            field: field.into(),
            query_vector,
            k,
            num_candidates: (k * 10).max(100),
            similarity: None,
        })
    }

    pub fn num_candidates(mut self, num_candidates: usize) -> ApiResult<Self> {
        if num_candidates < self.k {
            return Err(ApiError::bad_request(format!(
                "Knn 'numCandidates' ({}) must be greater than or equal to 'k' ({}).",
                num_candidates, self.k
            )));
        }
        self.num_candidates = num_candidates;
        Ok(self)
    }

    pub fn similarity(mut self, similarity: f32) -> Self {
        self.similarity = Some(similarity);
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn query_vector(&self) -> &[f32] {
        &self.query_vector
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn get_num_candidates(&self) -> usize {
        self.num_candidates
    }

    pub fn get_similarity(&self) -> Option<f32> {
        self.similarity
    }
}
