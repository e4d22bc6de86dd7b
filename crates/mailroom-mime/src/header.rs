//! Message header handling.

use indexmap::IndexMap;
use serde::Deserialize;
use std::fmt;

/// Ordered collection of message headers.
///
/// Names are kept exactly as given. Setting an existing name replaces its
/// value in place, so the first insertion decides the serialization order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Headers {
    headers: IndexMap<String, String>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header value, replacing any existing value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    /// Gets the value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Returns true if the header is set.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }

    /// Removes a header, keeping the order of the others.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.headers.shift_remove(name)
    }

    /// Returns the number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Returns true if no header is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Returns an iterator over all headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Serializes the headers as `Name: value` lines joined by CRLF.
    ///
    /// There is no trailing line break.
    #[must_use]
    pub fn to_block(&self) -> String {
        self.iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<_>>()
            .join("\r\n")
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_block())
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        headers.extend(iter);
        headers
    }
}

impl<N: Into<String>, V: Into<String>> Extend<(N, V)> for Headers {
    fn extend<I: IntoIterator<Item = (N, V)>>(&mut self, iter: I) {
        for (name, value) in iter {
            self.set(name, value);
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_new() {
        let headers = Headers::new();
        assert!(headers.is_empty());
        assert_eq!(headers.to_block(), "");
    }

    #[test]
    fn test_headers_set_get() {
        let mut headers = Headers::new();
        headers.set("Content-Type", "text/plain");
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(headers.get("content-type"), None);
    }

    #[test]
    fn test_set_keeps_position() {
        let mut headers: Headers = [("From", "a@b"), ("To", "c@d")].into_iter().collect();
        headers.set("From", "e@f");
        assert_eq!(headers.to_block(), "From: e@f\r\nTo: c@d");
    }

    #[test]
    fn test_headers_remove() {
        let mut headers: Headers = [("A", "1"), ("B", "2"), ("C", "3")].into_iter().collect();
        assert_eq!(headers.remove("B"), Some("2".to_string()));
        assert_eq!(headers.remove("B"), None);
        assert_eq!(headers.to_block(), "A: 1\r\nC: 3");
    }

    #[test]
    fn test_headers_deserialize() {
        let headers: Headers = serde_json::from_str(r#"{"X-Zeta": "z", "X-Alpha": "a"}"#).unwrap();
        let names: Vec<_> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["X-Zeta", "X-Alpha"]);
        assert_eq!(headers.len(), 2);
        assert!(headers.contains("X-Alpha"));
    }
}
