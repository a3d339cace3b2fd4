//! Topic keyword lists.
//!
//! Lists are configuration data: plain text (one term per line, `#` starts a
//! comment line) or a YAML / JSON array of strings. Terms are normalised the
//! same way document text is, so matching is a plain substring search plus
//! a word-boundary check.

use litscreen_common::{LitscreenError, Result};
use std::path::Path;

/// Lowercase and collapse every whitespace run to a single space.
pub fn normalise(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.extend(word.chars().flat_map(char::to_lowercase));
    }
    out
}

/// A named, de-duplicated set of normalised terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordSet {
    name: String,
    terms: Vec<String>,
}

impl KeywordSet {
    pub fn from_terms<I, S>(name: impl Into<String>, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for term in terms {
            let t = normalise(term.as_ref());
            if !t.is_empty() && !out.contains(&t) {
                out.push(t);
            }
        }
        Self { name: name.into(), terms: out }
    }

    /// Load a keyword list. A missing, unparsable or empty list is a
    /// configuration error.
    pub fn load(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let name = name.into();
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LitscreenError::Config(format!("cannot read keyword list '{name}' at {}: {e}", path.display()))
        })?;

        let raw: Vec<String> = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)?,
            _ => content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string)
                .collect(),
        };

        let set = Self::from_terms(name, raw);
        if set.is_empty() {
            return Err(LitscreenError::Config(format!(
                "keyword list '{}' at {} has no terms", set.name, path.display()
            )));
        }
        tracing::info!(list = %set.name, terms = set.len(), path = %path.display(), "Keyword list loaded");
        Ok(set)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}
