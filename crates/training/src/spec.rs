//! Trainer and normalizer specifications.
//!
//! These are plain configuration structs populated by the caller (the CLI
//! builds them from flags). Defaults are pure `Default` impls; there is no
//! process-wide default-spec instance.

use serde::{Deserialize, Serialize};
use unipiece_core::{Result, TrainerError};

/// Model algorithm requested by a spec.
///
/// Only [`ModelType::Unigram`] is trainable by this crate; the other
/// variants exist so that a mismatched spec fails as a precondition rather
/// than silently training the wrong model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    Unigram,
    Bpe,
    Word,
    Char,
}

/// Training parameters for one vocabulary side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerSpec {
    /// Model algorithm; must be `Unigram`.
    pub model_type: ModelType,
    /// Final vocabulary size, including meta pieces.
    pub vocab_size: usize,
    /// Fraction of corpus character mass the alphabet must cover.
    pub character_coverage: f64,
    /// Number of seed candidate pieces before EM starts.
    pub seed_sentencepiece_size: usize,
    /// Fraction of removable pieces kept per prune round.
    pub shrinking_factor: f64,
    /// Worker threads for the E-step; `<= 1` forces the sequential path.
    pub num_threads: usize,
    /// EM sub-iterations per round. Fixed budget, no convergence early-exit.
    pub num_sub_iterations: usize,
    /// Maximum piece length in symbols.
    pub max_sentencepiece_length: usize,
    /// Split sentences into whitespace-delimited words before training.
    pub split_by_whitespace: bool,
    /// Control symbols (pinned, never match raw text).
    pub control_symbols: Vec<String>,
    /// User-defined symbols (pinned, always segmented as one token).
    pub user_defined_symbols: Vec<String>,
    /// Characters always kept in the alphabet regardless of coverage.
    pub required_chars: String,
    /// Add `<0xNN>` byte pieces to the vocabulary.
    pub byte_fallback: bool,
    /// Use 64-bit seed counters for very large corpora.
    pub train_extremely_large_corpus: bool,
    /// Fail if the corpus cannot fill `vocab_size`; otherwise shrink.
    pub hard_vocab_limit: bool,
    /// Write scores into the `.vocab` file.
    pub vocabulary_output_piece_score: bool,
    /// Reserved id for the unknown piece; must be `>= 0`.
    pub unk_id: i32,
    /// Reserved id for bos, `-1` to disable.
    pub bos_id: i32,
    /// Reserved id for eos, `-1` to disable.
    pub eos_id: i32,
    /// Reserved id for pad, `-1` to disable.
    pub pad_id: i32,
    pub unk_piece: String,
    pub bos_piece: String,
    pub eos_piece: String,
    pub pad_piece: String,
    /// Output prefix for persistence (`<prefix>.model.json`, `<prefix>.vocab`).
    pub model_prefix: String,
}

impl Default for TrainerSpec {
    fn default() -> Self {
        Self {
            model_type: ModelType::Unigram,
            vocab_size: 8000,
            character_coverage: 0.9995,
            seed_sentencepiece_size: 1_000_000,
            shrinking_factor: 0.75,
            num_threads: 4,
            num_sub_iterations: 2,
            max_sentencepiece_length: 16,
            split_by_whitespace: true,
            control_symbols: Vec::new(),
            user_defined_symbols: Vec::new(),
            required_chars: String::new(),
            byte_fallback: false,
            train_extremely_large_corpus: false,
            hard_vocab_limit: true,
            vocabulary_output_piece_score: true,
            unk_id: 0,
            bos_id: 1,
            eos_id: 2,
            pad_id: -1,
            unk_piece: "<unk>".into(),
            bos_piece: "<s>".into(),
            eos_piece: "</s>".into(),
            pad_piece: "<pad>".into(),
            model_prefix: String::new(),
        }
    }
}

impl TrainerSpec {
    /// Check the spec before any corpus work starts.
    pub fn validate(&self) -> Result<()> {
        if self.model_type != ModelType::Unigram {
            return Err(TrainerError::Precondition(format!(
                "model_type must be unigram, got {:?}",
                self.model_type
            )));
        }
        if self.vocab_size == 0 {
            return Err(TrainerError::Precondition("vocab_size must be > 0".into()));
        }
        if !(self.shrinking_factor > 0.0 && self.shrinking_factor < 1.0) {
            return Err(TrainerError::Precondition(format!(
                "shrinking_factor must be in (0, 1), got {}",
                self.shrinking_factor
            )));
        }
        if self.num_sub_iterations == 0 {
            return Err(TrainerError::Precondition(
                "num_sub_iterations must be > 0".into(),
            ));
        }
        if self.max_sentencepiece_length == 0 {
            return Err(TrainerError::Precondition(
                "max_sentencepiece_length must be > 0".into(),
            ));
        }
        if self.unk_id < 0 {
            return Err(TrainerError::Precondition(
                "unk_id is required and must be >= 0".into(),
            ));
        }
        let mut reserved: Vec<i32> = [self.unk_id, self.bos_id, self.eos_id, self.pad_id]
            .into_iter()
            .filter(|&id| id >= 0)
            .collect();
        reserved.sort_unstable();
        let count = reserved.len();
        reserved.dedup();
        if reserved.len() != count {
            return Err(TrainerError::Precondition(
                "reserved piece ids must be distinct".into(),
            ));
        }
        if reserved.iter().any(|&id| id as usize >= self.vocab_size) {
            return Err(TrainerError::Precondition(
                "reserved piece ids must be < vocab_size".into(),
            ));
        }
        Ok(())
    }

    /// The reserved meta pieces in id order: `(id, surface, is_unknown)`.
    pub(crate) fn reserved_pieces(&self) -> Vec<(usize, String, bool)> {
        let mut metas = Vec::new();
        metas.push((self.unk_id as usize, self.unk_piece.clone(), true));
        if self.bos_id >= 0 {
            metas.push((self.bos_id as usize, self.bos_piece.clone(), false));
        }
        if self.eos_id >= 0 {
            metas.push((self.eos_id as usize, self.eos_piece.clone(), false));
        }
        if self.pad_id >= 0 {
            metas.push((self.pad_id as usize, self.pad_piece.clone(), false));
        }
        metas.sort_by_key(|&(id, _, _)| id);
        metas
    }
}

/// Normalizer settings this core depends on.
///
/// The normalization engine itself is an external collaborator; the trainer
/// only relies on these interface-level flags for symbol-boundary
/// consistency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerSpec {
    /// Normalization rule name (informational, echoed into the saved model).
    pub name: String,
    /// Prepend a dummy whitespace to every sentence.
    pub add_dummy_prefix: bool,
    /// Strip leading/trailing and collapse internal whitespace runs.
    pub remove_extra_whitespaces: bool,
    /// Replace whitespace with the meta symbol `▁`. The joint driver
    /// requires this.
    pub escape_whitespaces: bool,
}

impl Default for NormalizerSpec {
    fn default() -> Self {
        Self {
            name: "nmt_nfkc".into(),
            add_dummy_prefix: true,
            remove_extra_whitespaces: true,
            escape_whitespaces: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_spec_is_valid() {
        assert!(TrainerSpec::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_unigram() {
        let spec = TrainerSpec {
            model_type: ModelType::Bpe,
            ..Default::default()
        };
        assert!(matches!(
            spec.validate(),
            Err(TrainerError::Precondition(_))
        ));
    }

    #[test]
    fn test_rejects_bad_shrinking_factor() {
        for factor in [0.0, 1.0, -0.5, 1.5] {
            let spec = TrainerSpec {
                shrinking_factor: factor,
                ..Default::default()
            };
            assert!(spec.validate().is_err());
        }
    }

    #[test]
    fn test_rejects_clashing_reserved_ids() {
        let spec = TrainerSpec {
            bos_id: 0,
            ..Default::default()
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_reserved_pieces_in_id_order() {
        let spec = TrainerSpec {
            unk_id: 2,
            bos_id: 0,
            eos_id: 1,
            pad_id: -1,
            ..Default::default()
        };
        let metas = spec.reserved_pieces();
        assert_eq!(metas[0].0, 0);
        assert_eq!(metas[1].0, 1);
        assert_eq!(metas[2].0, 2);
        assert!(metas[2].2); // unk
    }
}
