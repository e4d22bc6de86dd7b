//! RFC 2822 grammar tokens.
//!
//! Holds the ABNF productions needed to check generated Content-IDs
//! (`id-left "@" id-right`) as regular expression fragments.

use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

/// Grammar token override supplied at construction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TokenOverride {
    /// Replaces the fragment.
    Replace(String),
    /// Appends the fragments to the existing one.
    Extend(Vec<String>),
}

impl From<&str> for TokenOverride {
    fn from(value: &str) -> Self {
        Self::Replace(value.to_string())
    }
}

/// RFC 2822 token name to regular expression fragment mapping.
#[derive(Debug, Clone)]
pub struct Grammar {
    tokens: IndexMap<String, String>,
    id_pattern: OnceLock<Option<Regex>>,
}

impl Default for Grammar {
    fn default() -> Self {
        Self::new()
    }
}

impl Grammar {
    /// Creates the grammar with the built-in RFC 2822 productions.
    #[must_use]
    pub fn new() -> Self {
        let no_ws_ctl = r"[\x01-\x08\x0B\x0C\x0E-\x19\x7F]".to_string();
        let text = r"[\x00-\x08\x0B\x0C\x0E-\x7F]".to_string();
        let quoted_pair = format!(r"(?:\\{text})");
        let qtext = format!(r"(?:{no_ws_ctl}|[\x21\x23-\x5B\x5D-\x7E])");
        let atext = r"[a-zA-Z0-9!#\$%&'\*\+\-\/=\?\^_`\{\}\|~]".to_string();
        let dot_atom_text = format!(r"(?:{atext}+(\.{atext}+)*)");
        let no_fold_quote = format!(r#"(?:"(?:{qtext}|{quoted_pair})*")"#);
        let dtext = format!(r"(?:{no_ws_ctl}|[\x21-\x5A\x5E-\x7E])");
        let no_fold_literal = format!(r"(?:\[(?:{dtext}|{quoted_pair})*\])");
        let id_left = format!("(?:{dot_atom_text}|{no_fold_quote})");
        let id_right = format!("(?:{dot_atom_text}|{no_fold_literal})");

        let tokens = [
            ("NO-WS-CTL", no_ws_ctl),
            ("text", text),
            ("quoted-pair", quoted_pair),
            ("qtext", qtext),
            ("atext", atext),
            ("dot-atom-text", dot_atom_text),
            ("no-fold-quote", no_fold_quote),
            ("dtext", dtext),
            ("no-fold-literal", no_fold_literal),
            ("id-left", id_left),
            ("id-right", id_right),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();

        Self {
            tokens,
            id_pattern: OnceLock::new(),
        }
    }

    /// Creates the grammar and merges caller supplied tokens into it.
    ///
    /// A [`TokenOverride::Replace`] value replaces a fragment of the same
    /// name, a [`TokenOverride::Extend`] value appends to it.
    #[must_use]
    pub fn with_overrides<I, K>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, TokenOverride)>,
        K: Into<String>,
    {
        let mut grammar = Self::new();
        grammar.apply(overrides);
        grammar
    }

    /// Merges overrides into the current tokens.
    pub fn apply<I, K>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (K, TokenOverride)>,
        K: Into<String>,
    {
        for (key, value) in overrides {
            let key = key.into();
            match value {
                TokenOverride::Replace(fragment) => {
                    self.tokens.insert(key, fragment);
                }
                TokenOverride::Extend(fragments) => {
                    let entry = self.tokens.entry(key).or_default();
                    for fragment in fragments {
                        entry.push_str(&fragment);
                    }
                }
            }
        }
        self.id_pattern = OnceLock::new();
    }

    /// Returns all tokens.
    #[must_use]
    pub const fn tokens(&self) -> &IndexMap<String, String> {
        &self.tokens
    }

    /// Returns the fragment for a token, if defined.
    #[must_use]
    pub fn token(&self, key: &str) -> Option<&str> {
        self.tokens.get(key).map(String::as_str)
    }

    /// Sets the fragment for a token.
    pub fn set_token(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tokens.insert(key.into(), value.into());
        self.id_pattern = OnceLock::new();
    }

    /// Checks if the id complies with the RFC 2822 `msg-id` content grammar.
    #[must_use]
    pub fn is_valid_id(&self, id: &str) -> bool {
        self.id_pattern
            .get_or_init(|| {
                let left = self.token("id-left").unwrap_or_default();
                let right = self.token("id-right").unwrap_or_default();
                match Regex::new(&format!("^{left}@{right}$")) {
                    Ok(pattern) => Some(pattern),
                    Err(e) => {
                        tracing::warn!(error = %e, "Content-ID grammar does not compile");
                        None
                    }
                }
            })
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(id))
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
    use proptest::prelude::*;

    #[test]
    fn test_token_lookup() {
        let grammar = Grammar::with_overrides([("foo", "bar".into()), ("baz", "qux".into())]);
        assert!(grammar.token("NO-WS-CTL").is_some());
        assert!(grammar.token("nonexistent").is_none());
        assert_eq!(grammar.token("foo"), Some("bar"));
        assert_eq!(grammar.token("baz"), Some("qux"));

        let tokens = grammar.tokens();
        assert_eq!(tokens.get("foo").map(String::as_str), Some("bar"));
        assert_eq!(tokens.get("baz").map(String::as_str), Some("qux"));
    }

    #[test]
    fn test_set_token() {
        let mut grammar = Grammar::new();
        grammar.set_token("extra", "value");
        assert_eq!(grammar.token("extra"), Some("value"));
        assert!(grammar.tokens().contains_key("extra"));
    }

    #[test]
    fn test_extend_override_appends() {
        let atext = Grammar::new().token("atext").unwrap().to_string();
        let grammar = Grammar::with_overrides([(
            "atext",
            TokenOverride::Extend(vec!["+".to_string()]),
        )]);
        assert_eq!(grammar.token("atext"), Some(format!("{atext}+").as_str()));
    }

    #[test]
    fn test_is_valid_id() {
        let grammar = Grammar::new();
        for id in [
            "a@b",
            "example@host",
            "1234567890@mailroom.generated",
            "123{}$#!+|^%@mailroom.generated",
            "\"quoted.left\"@host",
            "left@[literal]",
        ] {
            assert!(grammar.is_valid_id(id), "{id} should be valid");
        }
        for id in ["a@b@c", "a@@b", "a<@b", "a>@b", "a\"@b", "", "@b", "a@"] {
            assert!(!grammar.is_valid_id(id), "{id} should be invalid");
        }
    }

    #[test]
    fn test_set_token_recompiles_pattern() {
        let mut grammar = Grammar::new();
        assert!(grammar.is_valid_id("a@b"));
        grammar.set_token("id-right", "x");
        assert!(!grammar.is_valid_id("a@b"));
        assert!(grammar.is_valid_id("a@x"));
    }

    #[test]
    fn test_broken_override_rejects_everything() {
        let grammar = Grammar::with_overrides([("id-left", "(".into())]);
        assert!(!grammar.is_valid_id("a@b"));
    }

    proptest! {
        #[test]
        fn dot_atoms_are_valid(left in "[a-z0-9]{1,12}(\\.[a-z0-9]{1,8}){0,2}", right in "[a-z0-9]{1,12}(\\.[a-z]{2,6}){0,2}") {
            let grammar = Grammar::new();
            let id = format!("{left}@{right}");
            prop_assert!(grammar.is_valid_id(&id));
        }

        #[test]
        fn angle_brackets_are_rejected(left in "[a-z]{1,8}", right in "[a-z]{1,8}") {
            let grammar = Grammar::new();
            let opening = format!("{left}<@{right}");
            let closing = format!("{left}@{right}>");
            prop_assert!(!grammar.is_valid_id(&opening));
            prop_assert!(!grammar.is_valid_id(&closing));
        }
    }
}
