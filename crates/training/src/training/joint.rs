//! Joint training of a source and a target vocabulary.
//!
//! Both sides run their EM rounds every iteration, but pruning is gated per
//! side: a side that already fits its desired size keeps training without
//! shrinking while the other catches up. The loop only ends once both sides
//! are within budget, so neither vocabulary is finalized against a stale
//! counterpart.

use crate::corpus::Sentence;
use crate::spec::{NormalizerSpec, TrainerSpec};
use crate::training::trainer::{TrainedModel, Trainer};
use log::{info, warn};
use unipiece_core::{Result, TrainerError};

/// Decides which sides shrink in one lockstep round.
///
/// The driver calls this after both sides have run EM and at least one is
/// over budget. Implementations must leave a side untouched when it is
/// already within budget.
pub trait JointPruningPolicy {
    fn prune_round(&self, src: &mut Trainer, tgt: &mut Trainer) -> Result<()>;
}

/// Default policy: each over-budget side prunes independently.
pub struct IndependentPruning;

impl JointPruningPolicy for IndependentPruning {
    fn prune_round(&self, src: &mut Trainer, tgt: &mut Trainer) -> Result<()> {
        if src.over_budget() {
            src.prune_round()?;
        }
        if tgt.over_budget() {
            tgt.prune_round()?;
        }
        Ok(())
    }
}

/// Train two unigram vocabularies in lockstep with independent pruning.
pub fn train_joint(
    spec_src: &TrainerSpec,
    spec_tgt: &TrainerSpec,
    normalizer: &NormalizerSpec,
    corpus_src: Vec<Sentence>,
    corpus_tgt: Vec<Sentence>,
) -> Result<(TrainedModel, TrainedModel)> {
    train_joint_with_policy(
        spec_src,
        spec_tgt,
        normalizer,
        corpus_src,
        corpus_tgt,
        &IndependentPruning,
    )
}

/// Train two unigram vocabularies in lockstep with a caller-supplied
/// pruning policy.
pub fn train_joint_with_policy<P: JointPruningPolicy>(
    spec_src: &TrainerSpec,
    spec_tgt: &TrainerSpec,
    normalizer: &NormalizerSpec,
    corpus_src: Vec<Sentence>,
    corpus_tgt: Vec<Sentence>,
    policy: &P,
) -> Result<(TrainedModel, TrainedModel)> {
    // Validate both sides before touching either corpus, so a bad target
    // spec cannot waste a source seeding pass.
    spec_src.validate()?;
    spec_tgt.validate()?;
    if !normalizer.escape_whitespaces {
        return Err(TrainerError::Precondition(
            "joint training requires escaped whitespace".into(),
        ));
    }

    let mut src = Trainer::with_label(spec_src.clone(), normalizer.clone(), "src")?;
    let mut tgt = Trainer::with_label(spec_tgt.clone(), normalizer.clone(), "tgt")?;
    src.feed(corpus_src)?;
    tgt.feed(corpus_tgt)?;
    src.seed()?;
    tgt.seed()?;

    loop {
        src.run_em_round()?;
        tgt.run_em_round()?;
        if !src.over_budget() && !tgt.over_budget() {
            break;
        }
        let before = (src.vocab_len(), tgt.vocab_len());
        policy.prune_round(&mut src, &mut tgt)?;
        let after = (src.vocab_len(), tgt.vocab_len());
        info!(
            "joint round: src {} -> {} (desired {}), tgt {} -> {} (desired {})",
            before.0,
            after.0,
            src.desired_vocab_size(),
            before.1,
            after.1,
            tgt.desired_vocab_size()
        );
        if after == before {
            warn!("joint round: neither side can shrink further; stopping");
            break;
        }
    }

    let model_src = src.finalize()?;
    let model_tgt = tgt.finalize()?;
    Ok((model_src, model_tgt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::ModelType;
    use unipiece_core::PieceKind;

    fn corpus(texts: &[&str]) -> Vec<Sentence> {
        texts.iter().map(|t| Sentence::new(*t, 1.0)).collect()
    }

    fn small_spec(vocab_size: usize) -> TrainerSpec {
        TrainerSpec {
            vocab_size,
            seed_sentencepiece_size: 100,
            max_sentencepiece_length: 4,
            num_threads: 1,
            bos_id: -1,
            eos_id: -1,
            ..Default::default()
        }
    }

    fn plain_normalizer() -> NormalizerSpec {
        NormalizerSpec {
            add_dummy_prefix: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_joint_respects_both_budgets() {
        let src_corpus = corpus(&["lower", "lowest", "newer", "newest"]);
        let tgt_corpus = corpus(&["tiefer", "tiefste", "neuer", "neuste"]);
        let (src, tgt) = train_joint(
            &small_spec(16),
            &small_spec(14),
            &plain_normalizer(),
            src_corpus,
            tgt_corpus,
        )
        .unwrap();
        assert_eq!(src.pieces.len(), 16);
        assert_eq!(tgt.pieces.len(), 14);
        assert_eq!(src.pieces[0].kind, PieceKind::Unknown);
        assert_eq!(tgt.pieces[0].kind, PieceKind::Unknown);
    }

    #[test]
    fn test_joint_sides_use_their_own_specs() {
        let src_corpus = corpus(&["abc", "abd", "acd"]);
        let tgt_corpus = corpus(&["xyz", "xyw", "xzw"]);
        let src_spec = TrainerSpec {
            user_defined_symbols: vec!["<src-tag>".into()],
            ..small_spec(14)
        };
        let (src, tgt) = train_joint(
            &src_spec,
            &small_spec(12),
            &plain_normalizer(),
            src_corpus,
            tgt_corpus,
        )
        .unwrap();
        assert!(src.pieces.iter().any(|p| p.surface == "<src-tag>"));
        assert!(!tgt.pieces.iter().any(|p| p.surface == "<src-tag>"));
    }

    #[test]
    fn test_joint_rejects_non_unigram_side() {
        let bad = TrainerSpec {
            model_type: ModelType::Bpe,
            ..small_spec(12)
        };
        let result = train_joint(
            &small_spec(12),
            &bad,
            &plain_normalizer(),
            corpus(&["ab"]),
            corpus(&["cd"]),
        );
        assert!(matches!(result, Err(TrainerError::Precondition(_))));
    }

    #[test]
    fn test_joint_rejects_unescaped_whitespace() {
        let normalizer = NormalizerSpec {
            escape_whitespaces: false,
            ..Default::default()
        };
        let result = train_joint(
            &small_spec(12),
            &small_spec(12),
            &normalizer,
            corpus(&["ab"]),
            corpus(&["cd"]),
        );
        assert!(matches!(result, Err(TrainerError::Precondition(_))));
    }

    #[test]
    fn test_joint_rejects_empty_side() {
        let result = train_joint(
            &small_spec(12),
            &small_spec(12),
            &plain_normalizer(),
            corpus(&["ab"]),
            Vec::new(),
        );
        assert!(matches!(result, Err(TrainerError::Precondition(_))));
    }
}
