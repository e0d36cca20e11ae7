//! Single-side unigram trainer.
//!
//! Owns one vocabulary's lifecycle: corpus intake, seeding, the EM+prune
//! loop, and finalization to the requested output size. The loop structure
//! is: run exactly `num_sub_iterations` E/M rounds, check the size, prune if
//! still over budget, repeat. The fixed sub-iteration budget is deliberate;
//! there is no convergence-based early exit.

use crate::corpus::{self, Sentence};
use crate::spec::{NormalizerSpec, TrainerSpec};
use crate::training::em::{run_e_step, run_m_step};
use crate::training::pruner::prune_pieces;
use crate::training::seed::make_seed_pieces;
use ahash::AHashSet;
use compact_str::CompactString;
use log::{debug, info, warn};
use unipiece_core::{Piece, PieceKind, PieceVocab, Result, TrainerError};

/// Desired size during EM is the requested size inflated by this margin, to
/// leave pruning headroom. Hardcoded by design.
const VOCAB_HEADROOM_NUM: usize = 11;
const VOCAB_HEADROOM_DEN: usize = 10;

/// Score offset applied to required characters missing from the trained
/// vocabulary at finalization.
const MISSING_CHAR_PENALTY_DELTA: f64 = 0.0001;

/// Lifecycle state of a [`Trainer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerState {
    /// Constructed; corpus may still be fed.
    Init,
    /// Seed vocabulary built.
    Seeded,
    /// Inside the EM+prune loop.
    Training,
    /// Finalized; the trainer is spent.
    Done,
}

/// A finalized vocabulary: piece index equals the assigned id.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub pieces: Vec<Piece>,
    pub normalizer: NormalizerSpec,
}

impl TrainedModel {
    /// Build a segmentation vocabulary from the finalized pieces.
    pub fn vocab(&self) -> Result<PieceVocab> {
        PieceVocab::from_pieces(self.pieces.clone())
    }
}

/// Trains one unigram vocabulary.
pub struct Trainer {
    spec: TrainerSpec,
    normalizer: NormalizerSpec,
    label: String,
    sentences: Vec<Sentence>,
    vocab: PieceVocab,
    required: AHashSet<char>,
    desired_vocab_size: usize,
    state: TrainerState,
}

impl Trainer {
    /// Create a trainer; fails fast on a malformed spec.
    pub fn new(spec: TrainerSpec, normalizer: NormalizerSpec) -> Result<Self> {
        Self::with_label(spec, normalizer, "unigram")
    }

    /// Create a trainer with a label used to tag its log events
    /// (the joint driver uses "src"/"tgt").
    pub fn with_label(
        spec: TrainerSpec,
        normalizer: NormalizerSpec,
        label: &str,
    ) -> Result<Self> {
        spec.validate()?;
        let desired_vocab_size = spec.vocab_size * VOCAB_HEADROOM_NUM / VOCAB_HEADROOM_DEN;
        Ok(Self {
            spec,
            normalizer,
            label: label.to_string(),
            sentences: Vec::new(),
            vocab: PieceVocab::from_pieces(Vec::new())?,
            required: AHashSet::new(),
            desired_vocab_size,
            state: TrainerState::Init,
        })
    }

    /// Feed raw sentences. Normalization-engine output is expected; this
    /// only applies the whitespace handling of the normalizer spec.
    pub fn feed<I>(&mut self, raw: I) -> Result<()>
    where
        I: IntoIterator<Item = Sentence>,
    {
        if self.state != TrainerState::Init {
            return Err(TrainerError::Precondition(
                "cannot feed sentences after seeding".into(),
            ));
        }
        for sentence in raw {
            let text = corpus::normalize(&sentence.text, &self.normalizer);
            if text.is_empty() {
                continue;
            }
            self.sentences.push(Sentence::new(text, sentence.weight));
        }
        Ok(())
    }

    /// Current vocabulary size.
    pub fn vocab_len(&self) -> usize {
        self.vocab.len()
    }

    /// Desired (headroom-inflated) size the loop shrinks towards.
    pub fn desired_vocab_size(&self) -> usize {
        self.desired_vocab_size
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TrainerState {
        self.state
    }

    /// Whether the vocabulary still exceeds the desired size.
    pub fn over_budget(&self) -> bool {
        self.vocab.len() > self.desired_vocab_size
    }

    /// Build the seed vocabulary.
    pub fn seed(&mut self) -> Result<()> {
        if self.state != TrainerState::Init {
            return Err(TrainerError::Precondition("trainer already seeded".into()));
        }
        if self.sentences.is_empty() {
            return Err(TrainerError::Precondition(
                "no input sentences; corpus must be non-empty".into(),
            ));
        }
        if self.spec.split_by_whitespace {
            self.sentences = corpus::split_by_whitespace(&self.sentences);
        } else {
            self.sentences = corpus::dedup(std::mem::take(&mut self.sentences));
        }
        self.required = corpus::required_chars(
            &self.sentences,
            self.spec.character_coverage,
            &self.spec.required_chars,
        );

        let pieces = make_seed_pieces(&self.spec, &self.sentences)?;
        self.vocab = PieceVocab::from_pieces(pieces)?;
        self.state = TrainerState::Seeded;
        info!(
            "{}: using {} seed pieces on {} sentences for EM training",
            self.label,
            self.vocab.len(),
            self.sentences.len()
        );
        Ok(())
    }

    /// Run one EM round: exactly `num_sub_iterations` E/M sub-iterations.
    pub fn run_em_round(&mut self) -> Result<()> {
        if self.state != TrainerState::Seeded && self.state != TrainerState::Training {
            return Err(TrainerError::Precondition(
                "run_em_round requires a seeded trainer".into(),
            ));
        }
        self.state = TrainerState::Training;
        for sub_iter in 0..self.spec.num_sub_iterations {
            let expected = run_e_step(&self.vocab, &self.sentences, self.spec.num_threads)?;
            let pieces = run_m_step(self.vocab.pieces(), &expected)?;
            self.vocab = PieceVocab::from_pieces(pieces)?;
            info!(
                "{}: EM sub_iter={} size={} obj={:.6} num_tokens={} num_tokens/piece={:.4}",
                self.label,
                sub_iter,
                self.vocab.len(),
                expected.objective,
                expected.num_tokens,
                expected.num_tokens as f64 / self.vocab.len() as f64
            );
        }
        Ok(())
    }

    /// Run one prune round. Returns whether the vocabulary shrank.
    pub fn prune_round(&mut self) -> Result<bool> {
        if self.state != TrainerState::Training {
            return Err(TrainerError::Precondition(
                "prune_round requires a training trainer".into(),
            ));
        }
        let before = self.vocab.len();
        let pieces = prune_pieces(
            &self.vocab,
            &self.sentences,
            self.desired_vocab_size,
            self.spec.shrinking_factor,
            &self.required,
        )?;
        self.vocab = PieceVocab::from_pieces(pieces)?;
        let after = self.vocab.len();
        debug_assert!(after <= before);
        info!(
            "{}: prune size={} desired={}",
            self.label, after, self.desired_vocab_size
        );
        Ok(after < before)
    }

    /// Run the full EM+prune loop and finalize.
    pub fn train(&mut self) -> Result<TrainedModel> {
        self.seed()?;
        loop {
            self.run_em_round()?;
            if !self.over_budget() {
                break;
            }
            if !self.prune_round()? {
                warn!(
                    "{}: pruning cannot shrink below {} pieces (desired {}); stopping",
                    self.label,
                    self.vocab.len(),
                    self.desired_vocab_size
                );
                break;
            }
        }
        self.finalize()
    }

    /// Sort, truncate to the requested (non-inflated) size, and assign
    /// final ids, with reserved ids for the meta pieces.
    pub fn finalize(&mut self) -> Result<TrainedModel> {
        if self.state != TrainerState::Training && self.state != TrainerState::Seeded {
            return Err(TrainerError::Precondition(
                "finalize requires a trained vocabulary".into(),
            ));
        }
        debug!("{}: finalizing to {} pieces", self.label, self.spec.vocab_size);

        let metas = self.spec.reserved_pieces();
        let mut fixed: Vec<Piece> = Vec::new();
        let mut seen: AHashSet<CompactString> = metas
            .iter()
            .map(|(_, surface, _)| CompactString::new(surface))
            .collect();
        for piece in self.vocab.pieces() {
            if piece.kind != PieceKind::Normal && !seen.contains(&piece.surface) {
                seen.insert(piece.surface.clone());
                fixed.push(piece.clone());
            }
        }

        // Required characters survive truncation even when EM starved them;
        // missing ones enter just above the minimum score.
        let mut scored: Vec<Piece> = Vec::new();
        let mut required: Vec<char> = self.required.iter().copied().collect();
        required.sort_unstable();
        let mut missing_penalty = 0.0;
        for c in required {
            let surface = CompactString::new(c.to_string());
            if seen.contains(&surface) {
                continue;
            }
            seen.insert(surface.clone());
            match self.vocab.id_of(&surface).and_then(|id| self.vocab.get(id)) {
                Some(piece) => scored.push(piece.clone()),
                None => {
                    scored.push(Piece::normal(
                        &surface,
                        self.vocab.min_score() + missing_penalty,
                    ));
                    missing_penalty += MISSING_CHAR_PENALTY_DELTA;
                }
            }
        }

        let budget = self
            .spec
            .vocab_size
            .checked_sub(metas.len() + fixed.len() + scored.len())
            .ok_or_else(|| {
                TrainerError::Precondition(format!(
                    "vocab_size {} too small for {} meta pieces and {} required chars",
                    self.spec.vocab_size,
                    metas.len() + fixed.len(),
                    scored.len()
                ))
            })?;

        let mut remaining: Vec<Piece> = self
            .vocab
            .pieces()
            .iter()
            .filter(|p| p.kind == PieceKind::Normal && !seen.contains(&p.surface))
            .cloned()
            .collect();
        remaining.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.surface.cmp(&b.surface))
        });
        remaining.truncate(budget);
        scored.extend(remaining);
        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.surface.cmp(&b.surface))
        });

        let total = metas.len() + fixed.len() + scored.len();
        if self.spec.hard_vocab_limit && total < self.spec.vocab_size {
            return Err(TrainerError::Precondition(format!(
                "vocab_size {} unreachable: only {} pieces available; \
                 lower vocab_size or disable hard_vocab_limit",
                self.spec.vocab_size, total
            )));
        }

        // Interleave: reserved ids go to meta pieces, everything else fills
        // the gaps in order (fixed pinned pieces, then scored pieces).
        let mut rest = fixed.into_iter().chain(scored);
        let mut meta_iter = metas.into_iter().peekable();
        let mut final_pieces: Vec<Piece> = Vec::with_capacity(total);
        for id in 0..total {
            if meta_iter.peek().is_some_and(|&(mid, _, _)| mid == id) {
                let (_, surface, is_unk) = meta_iter
                    .next()
                    .ok_or_else(|| TrainerError::InvalidVocab("meta iterator drained".into()))?;
                let kind = if is_unk {
                    PieceKind::Unknown
                } else {
                    PieceKind::Control
                };
                final_pieces.push(Piece::pinned(&surface, kind));
            } else if let Some(piece) = rest.next() {
                final_pieces.push(piece);
            }
        }
        // With hard_vocab_limit off an underfilled vocabulary can leave a
        // reserved id past the end; those metas go last.
        for (_, surface, is_unk) in meta_iter {
            let kind = if is_unk {
                PieceKind::Unknown
            } else {
                PieceKind::Control
            };
            final_pieces.push(Piece::pinned(&surface, kind));
        }

        self.state = TrainerState::Done;
        info!("{}: finalized vocabulary size={}", self.label, final_pieces.len());
        Ok(TrainedModel {
            pieces: final_pieces,
            normalizer: self.normalizer.clone(),
        })
    }
}
