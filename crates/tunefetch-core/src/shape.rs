//! Ordered extractors for heterogeneous upstream JSON shapes.

use serde_json::Value;

type Extractor<T> = Box<dyn Fn(&Value) -> Option<T> + Send + Sync>;

/// Extractors tried in order against one body; the first `Some` wins.
pub struct Extractors<T> {
    chain: Vec<(&'static str, Extractor<T>)>,
}

impl<T> Default for Extractors<T> {
    fn default() -> Self {
        Self { chain: Vec::new() }
    }
}

impl<T> std::fmt::Debug for Extractors<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.chain.iter().map(|(name, _)| name))
            .finish()
    }
}

impl<T> Extractors<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F>(mut self, name: &'static str, extractor: F) -> Self
    where
        F: Fn(&Value) -> Option<T> + Send + Sync + 'static,
    {
        self.chain.push((name, Box::new(extractor)));
        self
    }

    pub fn first_match(&self, body: &Value) -> Option<T> {
        self.chain.iter().find_map(|(name, extractor)| {
            let extracted = extractor(body)?;
            tracing::trace!(shape = name, "upstream shape recognized");
            Some(extracted)
        })
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

/// Non-empty string at `key`, accepting numbers as their decimal text.
pub fn text(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_owned()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// First of `keys` holding non-empty text.
pub fn first_text(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| text(value, key))
}

/// Truthy flag: `true`, `"true"`, `1` or `"1"`.
pub fn flag(value: &Value, keys: &[&str]) -> bool {
    keys.iter().any(|key| match value.get(*key) {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => text == "true" || text == "1",
        Some(Value::Number(number)) => number.as_u64().is_some_and(|n| n > 0),
        _ => false,
    })
}

/// Non-empty array at `value`.
pub fn non_empty_array(value: &Value) -> Option<&Vec<Value>> {
    value.as_array().filter(|items| !items.is_empty())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn first_matching_extractor_wins() {
        let extractors = Extractors::new()
            .with("wrapped", |body: &Value| body.get("data").and_then(Value::as_u64))
            .with("bare", Value::as_u64);

        assert_eq!(extractors.first_match(&json!({ "data": 7 })), Some(7));
        assert_eq!(extractors.first_match(&json!(9)), Some(9));
        assert_eq!(extractors.first_match(&json!("nine")), None);
        assert_eq!(extractors.len(), 2);
    }

    #[test]
    fn text_helpers_skip_blank_and_accept_numbers() {
        let body = json!({ "song": " ", "name": "Kesariya", "year": 2022, "has_lyrics": "true" });

        assert_eq!(first_text(&body, &["song", "name"]), Some(String::from("Kesariya")));
        assert_eq!(text(&body, "year"), Some(String::from("2022")));
        assert!(flag(&body, &["has_lyrics", "hasLyrics"]));
        assert!(!flag(&body, &["missing"]));
    }
}
