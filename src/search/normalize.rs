//! Text normalization: markdown source in, weighted term vector out.
//!
//! The pipeline runs in three steps:
//! 1. strip markdown formatting down to plain text
//! 2. expand English contractions ("don't" -> "do not")
//! 3. case-fold, split on word boundaries, drop stop words and stem

use std::collections::BTreeMap;

use pulldown_cmark::{Event, Options, Parser, TagEnd};
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};

use crate::error::{CardError, CardResult};

pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 1024 * 1024;

const MAX_TOKEN_CHARS: usize = 50;

const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "all", "am", "an", "and", "any", "are", "as", "at",
    "be", "because", "been", "before", "being", "below", "between", "both", "but", "by", "can",
    "cannot", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just",
    "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once",
    "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she",
    "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves",
];

/// Whole-word contractions whose expansion is not a plain suffix rule.
const IRREGULAR_CONTRACTIONS: &[(&str, &str)] = &[
    ("can't", "cannot"),
    ("won't", "will not"),
    ("shan't", "shall not"),
    ("ain't", "is not"),
    ("let's", "let us"),
    ("it's", "it is"),
    ("that's", "that is"),
    ("there's", "there is"),
    ("what's", "what is"),
    ("he's", "he is"),
    ("she's", "she is"),
    ("who's", "who is"),
    ("where's", "where is"),
    ("y'all", "you all"),
];

const SUFFIX_CONTRACTIONS: &[(&str, &str)] = &[
    ("n't", " not"),
    ("'re", " are"),
    ("'ve", " have"),
    ("'ll", " will"),
    ("'m", " am"),
    ("'d", " would"),
];

/// How a term vector weighs each token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeightScheme {
    /// Raw occurrence count
    Raw,
    /// Occurrence count divided by the document's token count
    #[default]
    Normalized,
}

/// Mapping from stemmed token to weight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermVector(BTreeMap<String, f64>);

impl TermVector {
    pub fn from_tokens(tokens: &[String], scheme: WeightScheme) -> Self {
        let mut counts: BTreeMap<String, f64> = BTreeMap::new();
        for token in tokens {
            *counts.entry(token.clone()).or_default() += 1.0;
        }
        if scheme == WeightScheme::Normalized && !tokens.is_empty() {
            let total = tokens.len() as f64;
            for weight in counts.values_mut() {
                *weight /= total;
            }
        }
        Self(counts)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, token: &str) -> Option<f64> {
        self.0.get(token).copied()
    }

    pub fn insert(&mut self, token: impl Into<String>, weight: f64) {
        self.0.insert(token.into(), weight);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, f64)> {
        self.0.iter().map(|(token, weight)| (token, *weight))
    }

    pub fn tokens(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn dot(&self, other: &TermVector) -> f64 {
        self.0
            .iter()
            .filter_map(|(token, weight)| other.get(token).map(|w| weight * w))
            .sum()
    }

    /// Number of distinct tokens present in both vectors.
    pub fn overlap(&self, other: &TermVector) -> usize {
        self.0.keys().filter(|token| other.0.contains_key(*token)).count()
    }
}

impl FromIterator<(String, f64)> for TermVector {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

pub struct Normalizer {
    stemmer: Stemmer,
    scheme: WeightScheme,
    max_bytes: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(WeightScheme::default(), DEFAULT_MAX_DOCUMENT_BYTES)
    }
}

impl Normalizer {
    pub fn new(scheme: WeightScheme, max_bytes: usize) -> Self {
        Self {
            stemmer: Stemmer::create(Algorithm::English),
            scheme,
            max_bytes,
        }
    }

    pub fn scheme(&self) -> WeightScheme {
        self.scheme
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Full pipeline: strip, expand, tokenize, weigh.
    pub fn features(&self, markdown: &str) -> CardResult<TermVector> {
        let plain = self.strip_markdown(markdown)?;
        let expanded = expand_contractions(&plain);
        let tokens = self.tokenize(&expanded);
        Ok(TermVector::from_tokens(&tokens, self.scheme))
    }

    /// Reduce markdown to plain text. Code text, link text and image alt text
    /// are kept; URLs, raw HTML and math are dropped.
    pub fn strip_markdown(&self, markdown: &str) -> CardResult<String> {
        if markdown.len() > self.max_bytes {
            return Err(CardError::FormatStrip(format!(
                "document is {} bytes, limit is {}",
                markdown.len(),
                self.max_bytes
            )));
        }
        check_math_blocks(markdown)?;

        let options = Options::ENABLE_MATH
            | Options::ENABLE_TABLES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS;

        let mut plain = String::with_capacity(markdown.len());
        for event in Parser::new_ext(markdown, options) {
            match event {
                Event::Text(text) | Event::Code(text) => plain.push_str(&text),
                Event::SoftBreak | Event::HardBreak | Event::Rule => plain.push('\n'),
                Event::End(
                    TagEnd::Paragraph
                    | TagEnd::Heading(_)
                    | TagEnd::Item
                    | TagEnd::CodeBlock
                    | TagEnd::TableCell
                    | TagEnd::TableRow,
                ) => plain.push('\n'),
                Event::InlineMath(_) | Event::DisplayMath(_) => plain.push(' '),
                _ => {}
            }
        }
        Ok(plain)
    }

    /// Case-fold, split on anything that is not alphanumeric, drop stop
    /// words, stem.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|word| (1..=MAX_TOKEN_CHARS).contains(&word.chars().count()))
            .map(|word| word.to_lowercase())
            .filter(|word| !STOP_WORDS.contains(&word.as_str()))
            .map(|word| self.stemmer.stem(&word).into_owned())
            .collect()
    }
}

/// Expand English contractions word by word. Surrounding punctuation is kept.
pub fn expand_contractions(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);

    for (i, chunk) in text.split_whitespace().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let start = chunk
            .find(|c: char| c.is_alphanumeric())
            .unwrap_or(chunk.len());
        let end = chunk
            .rfind(|c: char| c.is_alphanumeric())
            .map(|i| i + chunk[i..].chars().next().map_or(1, char::len_utf8))
            .unwrap_or(start);
        let (prefix, rest) = chunk.split_at(start);
        let (word, suffix) = rest.split_at(end.max(start) - start);

        out.push_str(prefix);
        out.push_str(&expand_word(word));
        out.push_str(suffix);
    }
    out
}

fn expand_word(word: &str) -> String {
    let lower = word.to_lowercase().replace('\u{2019}', "'");
    if !lower.contains('\'') {
        return word.to_string();
    }
    if let Some((_, expansion)) = IRREGULAR_CONTRACTIONS.iter().find(|(c, _)| *c == lower) {
        return expansion.to_string();
    }
    for (suffix, expansion) in SUFFIX_CONTRACTIONS {
        if let Some(stem) = lower.strip_suffix(suffix) {
            if !stem.is_empty() {
                return format!("{}{}", stem, expansion);
            }
        }
    }
    word.to_string()
}

fn fence_marker(line: &str) -> Option<&'static str> {
    if line.starts_with("```") {
        Some("```")
    } else if line.starts_with("~~~") {
        Some("~~~")
    } else {
        None
    }
}

/// A `$$` display-math block must be closed before the document ends.
fn check_math_blocks(markdown: &str) -> CardResult<()> {
    let mut fence: Option<&'static str> = None;
    let mut math_opened_at: Option<usize> = None;

    for (number, line) in markdown.lines().enumerate() {
        let trimmed = line.trim();

        if math_opened_at.is_none() {
            if let Some(marker) = fence_marker(trimmed) {
                match fence {
                    None => fence = Some(marker),
                    Some(open) if open == marker => fence = None,
                    Some(_) => {}
                }
                continue;
            }
        }
        if fence.is_some() {
            continue;
        }

        match math_opened_at {
            None => {
                if let Some(rest) = trimmed.strip_prefix("$$") {
                    if !rest.ends_with("$$") {
                        math_opened_at = Some(number + 1);
                    }
                }
            }
            Some(_) => {
                if trimmed.ends_with("$$") {
                    math_opened_at = None;
                }
            }
        }
    }

    match math_opened_at {
        Some(line) => Err(CardError::FormatStrip(format!(
            "math block opened on line {} is never closed",
            line
        ))),
        None => Ok(()),
    }
}
