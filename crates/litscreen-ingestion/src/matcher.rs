//! Topic matching using an Aho-Corasick automaton.
//!
//! Both keyword sets are compiled into a single automaton so every document
//! is scanned once. Matching rule:
//! - text and terms are normalised with [`keywords::normalise`]
//! - a hit counts only if no alphanumeric character touches either end
//! - overlapping search, so a short term inside a longer one is still seen

use crate::keywords::{normalise, KeywordSet};
use aho_corasick::AhoCorasick;
use litscreen_common::{Document, LitscreenError, MatchRecord, Result, Topic};
use tracing::info;

/// Compiled matcher for the two topic lists.
pub struct KeywordMatcher {
    automaton: AhoCorasick,
    /// Pattern index -> (topic, index into that topic's terms)
    pattern_info: Vec<(Topic, usize)>,
    topic_a: KeywordSet,
    topic_b: KeywordSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatcherStats {
    pub topic_a_terms: usize,
    pub topic_b_terms: usize,
    pub total_patterns: usize,
}

impl KeywordMatcher {
    pub fn new(topic_a: KeywordSet, topic_b: KeywordSet) -> Result<Self> {
        if topic_a.is_empty() || topic_b.is_empty() {
            return Err(LitscreenError::Config(
                "both topic keyword lists need at least one term".to_string(),
            ));
        }

        let mut patterns: Vec<&str> = Vec::new();
        let mut pattern_info = Vec::new();
        for (topic, set) in [(Topic::A, &topic_a), (Topic::B, &topic_b)] {
            for (i, term) in set.terms().iter().enumerate() {
                patterns.push(term.as_str());
                pattern_info.push((topic, i));
            }
        }

        let automaton = AhoCorasick::new(&patterns)
            .map_err(|e| LitscreenError::Config(format!("cannot compile keyword automaton: {e}")))?;

        info!(
            topic_a = topic_a.name(),
            topic_b = topic_b.name(),
            patterns = pattern_info.len(),
            "Keyword matcher ready"
        );

        Ok(Self { automaton, pattern_info, topic_a, topic_b })
    }

    pub fn stats(&self) -> MatcherStats {
        MatcherStats {
            topic_a_terms: self.topic_a.len(),
            topic_b_terms: self.topic_b.len(),
            total_patterns: self.pattern_info.len(),
        }
    }

    pub fn match_document(&self, doc: &Document) -> MatchRecord {
        self.match_normalised(&doc.identifier, &normalise(&doc.raw_text))
    }

    /// Match text that has already been through [`normalise`].
    pub fn match_normalised(&self, document_id: &str, text: &str) -> MatchRecord {
        let mut hit_a = vec![false; self.topic_a.len()];
        let mut hit_b = vec![false; self.topic_b.len()];

        for mat in self.automaton.find_overlapping_iter(text) {
            if !is_whole_word(text, mat.start(), mat.end()) {
                continue;
            }
            match self.pattern_info[mat.pattern().as_usize()] {
                (Topic::A, i) => hit_a[i] = true,
                (Topic::B, i) => hit_b[i] = true,
            }
        }

        let collect = |hits: &[bool], set: &KeywordSet| -> Vec<String> {
            hits.iter()
                .zip(set.terms())
                .filter(|(hit, _)| **hit)
                .map(|(_, term)| term.clone())
                .collect()
        };
        let terms_a = collect(&hit_a, &self.topic_a);
        let terms_b = collect(&hit_b, &self.topic_b);

        MatchRecord {
            document_id: document_id.to_string(),
            matched_topic_a: !terms_a.is_empty(),
            matched_topic_b: !terms_b.is_empty(),
            terms_a,
            terms_b,
        }
    }
}

fn is_whole_word(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
}
