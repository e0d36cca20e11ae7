//! Corpus sentences and interface-level normalization.
//!
//! Full Unicode normalization happens upstream; this module only applies
//! the whitespace handling the trainer's symbol boundaries depend on:
//! collapsing, escaping to the `▁` meta symbol, and optional
//! whitespace-splitting of sentences into words.

use crate::spec::NormalizerSpec;
use ahash::{AHashMap, AHashSet};

/// The whitespace meta symbol.
pub const WHITESPACE_SYMBOL: char = '▁';

/// One normalized text unit with a non-negative weight
/// (repetition count / sampling weight).
#[derive(Debug, Clone, PartialEq)]
pub struct Sentence {
    pub text: String,
    pub weight: f64,
}

impl Sentence {
    pub fn new(text: impl Into<String>, weight: f64) -> Self {
        Self {
            text: text.into(),
            weight,
        }
    }
}

/// Apply the normalizer's whitespace handling to one raw line.
pub fn normalize(raw: &str, normalizer: &NormalizerSpec) -> String {
    let mut text = if normalizer.remove_extra_whitespaces {
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    } else {
        raw.to_string()
    };
    if normalizer.add_dummy_prefix && !text.is_empty() {
        text.insert(0, ' ');
    }
    if normalizer.escape_whitespaces {
        text = text.replace(' ', &WHITESPACE_SYMBOL.to_string());
    }
    text
}

/// Split sentences into whitespace-delimited words, merging duplicates by
/// summing weights. Each word keeps its leading `▁` marker.
pub fn split_by_whitespace(sentences: &[Sentence]) -> Vec<Sentence> {
    let mut counts: AHashMap<String, f64> = AHashMap::new();
    let mut order: Vec<String> = Vec::new();
    for sentence in sentences {
        for word in sentence.text.split(WHITESPACE_SYMBOL) {
            if word.is_empty() {
                continue;
            }
            let mut token = String::with_capacity(word.len() + 3);
            token.push(WHITESPACE_SYMBOL);
            token.push_str(word);
            match counts.get_mut(&token) {
                Some(w) => *w += sentence.weight,
                None => {
                    counts.insert(token.clone(), sentence.weight);
                    order.push(token);
                }
            }
        }
    }
    order
        .into_iter()
        .map(|token| {
            let weight = counts[&token];
            Sentence::new(token, weight)
        })
        .collect()
}

/// Merge duplicate sentences by summing weights, preserving first-seen order.
pub fn dedup(sentences: Vec<Sentence>) -> Vec<Sentence> {
    let mut counts: AHashMap<String, f64> = AHashMap::new();
    let mut order: Vec<String> = Vec::new();
    for sentence in sentences {
        match counts.get_mut(&sentence.text) {
            Some(w) => *w += sentence.weight,
            None => {
                counts.insert(sentence.text.clone(), sentence.weight);
                order.push(sentence.text);
            }
        }
    }
    order
        .into_iter()
        .map(|text| {
            let weight = counts[&text];
            Sentence::new(text, weight)
        })
        .collect()
}

/// Determine the required alphabet: the most frequent characters until
/// `coverage` of the corpus character mass is reached, plus all characters
/// in `required` and the whitespace symbol.
pub fn required_chars(
    sentences: &[Sentence],
    coverage: f64,
    required: &str,
) -> AHashSet<char> {
    let mut counts: AHashMap<char, f64> = AHashMap::new();
    let mut total = 0.0;
    for sentence in sentences {
        for c in sentence.text.chars() {
            *counts.entry(c).or_insert(0.0) += sentence.weight;
            total += sentence.weight;
        }
    }

    let mut ranked: Vec<(char, f64)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut chars: AHashSet<char> = required.chars().collect();
    chars.insert(WHITESPACE_SYMBOL);
    let mut covered = 0.0;
    for (c, count) in ranked {
        if total > 0.0 && covered / total >= coverage {
            break;
        }
        covered += count;
        chars.insert(c);
    }
    chars
}
