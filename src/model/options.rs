use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Generic key-value bag used for search filters and expansion parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options(BTreeMap<String, Value>);

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.put(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|value| !value.is_null())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(value) => Some(value.clone()),
            Value::Number(value) => Some(value.to_string()),
            Value::Bool(value) => Some(value.to_string()),
            _ => None,
        }
    }

    /// Single values are returned as a one-element collection.
    pub fn get_strings(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(|value| match value {
                    Value::String(value) => Some(value.clone()),
                    Value::Number(value) => Some(value.to_string()),
                    _ => None,
                })
                .collect(),
            Some(_) => self.get_string(key).into_iter().collect(),
            None => Vec::new(),
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(value) => Some(*value),
            Value::String(value) => value.parse().ok(),
            _ => None,
        }
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        match self.get(key)? {
            Value::Number(value) => value.as_u64().map(|value| value as usize),
            Value::String(value) => value.parse().ok(),
            _ => None,
        }
    }

    /// Nested options, e.g. the parameters of a single expansion.
    pub fn get_options(&self, key: &str) -> Options {
        match self.get(key) {
            Some(Value::Object(map)) => Options::from(map.clone()),
            _ => Options::default(),
        }
    }
}

impl From<Map<String, Value>> for Options {
    fn from(map: Map<String, Value>) -> Self {
        Self(map.into_iter().collect())
    }
}

impl From<Options> for Value {
    fn from(options: Options) -> Self {
        Value::Object(options.0.into_iter().collect())
    }
}

impl FromIterator<(String, Value)> for Options {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn typed_getters() {
        let options = Options::new()
            .with("ids", json!(["a", "b"]))
            .with("id", "c")
            .with("limit", 5)
            .with("direct", "true")
            .with("nested", json!({"limit": 2}))
            .with("cleared", Value::Null);

        assert_eq!(options.get_strings("ids"), vec!["a", "b"]);
        assert_eq!(options.get_strings("id"), vec!["c"]);
        assert_eq!(options.get_usize("limit"), Some(5));
        assert_eq!(options.get_bool("direct"), Some(true));
        assert_eq!(options.get_options("nested").get_usize("limit"), Some(2));
        assert!(!options.contains_key("cleared"));
        assert!(options.get_options("missing").is_empty());
    }
}
