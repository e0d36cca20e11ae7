//! Seed candidate generation.
//!
//! Training starts from a large candidate set: every corpus character plus
//! the highest-value substrings up to the configured piece length, scored by
//! `frequency × length` and converted to log probabilities. The
//! `train_extremely_large_corpus` flag widens the occurrence counters from
//! 32 to 64 bits.

use crate::corpus::{Sentence, WHITESPACE_SYMBOL};
use crate::spec::TrainerSpec;
use ahash::{AHashMap, AHashSet};
use compact_str::CompactString;
use unipiece_core::{Piece, PieceKind, Result, TrainerError};

/// Occurrence counter abstraction; selected by `train_extremely_large_corpus`.
trait SeedCounter: Copy + Default {
    fn add(&mut self, weight: f64);
    fn get(self) -> f64;
}

impl SeedCounter for u32 {
    fn add(&mut self, weight: f64) {
        *self = self.saturating_add(weight.round() as u32);
    }
    fn get(self) -> f64 {
        self as f64
    }
}

impl SeedCounter for u64 {
    fn add(&mut self, weight: f64) {
        *self = self.saturating_add(weight.round() as u64);
    }
    fn get(self) -> f64 {
        self as f64
    }
}

/// A candidate surface is usable as a piece when the whitespace marker only
/// appears word-initially.
fn is_valid_piece(chars: &[char]) -> bool {
    if chars.is_empty() {
        return false;
    }
    !chars[1..].contains(&WHITESPACE_SYMBOL)
}

/// Build the full seed vocabulary: reserved meta pieces, control and
/// user-defined symbols, byte pieces when requested, then scored normal
/// candidates. Deduplicated by surface, first occurrence wins.
pub fn make_seed_pieces(spec: &TrainerSpec, sentences: &[Sentence]) -> Result<Vec<Piece>> {
    if sentences.is_empty() {
        return Err(TrainerError::Precondition(
            "cannot seed from an empty corpus".into(),
        ));
    }

    let candidates = if spec.train_extremely_large_corpus {
        seed_candidates::<u64>(spec, sentences)
    } else {
        seed_candidates::<u32>(spec, sentences)
    };

    let mut pieces: Vec<Piece> = Vec::with_capacity(candidates.len() + 300);
    let mut seen: AHashSet<CompactString> = AHashSet::new();
    let mut push = |pieces: &mut Vec<Piece>, piece: Piece| {
        if seen.insert(piece.surface.clone()) {
            pieces.push(piece);
        }
    };

    for (_, surface, is_unk) in spec.reserved_pieces() {
        let kind = if is_unk {
            PieceKind::Unknown
        } else {
            PieceKind::Control
        };
        push(&mut pieces, Piece::pinned(&surface, kind));
    }
    for symbol in &spec.control_symbols {
        push(&mut pieces, Piece::pinned(symbol, PieceKind::Control));
    }
    for symbol in &spec.user_defined_symbols {
        push(&mut pieces, Piece::pinned(symbol, PieceKind::UserDefined));
    }
    if spec.byte_fallback {
        for byte in 0u16..256 {
            push(
                &mut pieces,
                Piece::pinned(&format!("<0x{:02X}>", byte), PieceKind::Byte),
            );
        }
    }
    for (surface, score) in candidates {
        push(&mut pieces, Piece::normal(&surface, score));
    }
    Ok(pieces)
}

/// Enumerate and score normal candidates, already converted to log probs.
fn seed_candidates<C: SeedCounter>(
    spec: &TrainerSpec,
    sentences: &[Sentence],
) -> Vec<(String, f64)> {
    let mut char_counts: AHashMap<char, C> = AHashMap::new();
    let mut substr_counts: AHashMap<String, C> = AHashMap::new();

    for sentence in sentences {
        let chars: Vec<char> = sentence.text.chars().collect();
        for (i, &c) in chars.iter().enumerate() {
            char_counts.entry(c).or_default().add(sentence.weight);
            let max_len = spec.max_sentencepiece_length.min(chars.len() - i);
            for len in 2..=max_len {
                let window = &chars[i..i + len];
                if !is_valid_piece(window) {
                    break;
                }
                substr_counts
                    .entry(window.iter().collect())
                    .or_default()
                    .add(sentence.weight);
            }
        }
    }

    // Every corpus character is a candidate; substrings compete by
    // frequency × length for the remaining seed slots.
    let mut selected: Vec<(String, f64)> = Vec::new();
    let mut chars_ranked: Vec<(String, f64)> = char_counts
        .into_iter()
        .map(|(c, count)| (c.to_string(), count.get()))
        .collect();
    chars_ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    selected.extend(chars_ranked);

    let mut substr_ranked: Vec<(String, f64)> = substr_counts
        .into_iter()
        .map(|(s, count)| {
            let score = count.get() * s.chars().count() as f64;
            (s, score)
        })
        .collect();
    substr_ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    for entry in substr_ranked {
        if selected.len() >= spec.seed_sentencepiece_size {
            break;
        }
        selected.push(entry);
    }

    to_log_prob(&mut selected);
    selected
}

/// Renormalize raw scores into log probabilities.
fn to_log_prob(candidates: &mut [(String, f64)]) {
    let sum: f64 = candidates.iter().map(|(_, score)| score).sum();
    let logsum = sum.ln();
    for (_, score) in candidates.iter_mut() {
        *score = score.ln() - logsum;
    }
}
