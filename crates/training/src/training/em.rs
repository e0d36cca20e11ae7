//! The EM inner loop: expectation (E-step) and re-estimation (M-step).

use crate::corpus::Sentence;
use rayon::prelude::*;
use unipiece_core::{Lattice, Piece, PieceVocab, Result, TrainerError};

/// Score floor offset for pieces with zero expected count. They keep their
/// membership (pruning may make them useful again) but must never receive
/// `ln(0)`.
const ZERO_COUNT_PENALTY: f64 = 10.0;

/// One E-step snapshot: produced once per pass over the corpus, consumed
/// once by the matching M-step.
#[derive(Debug, Clone)]
pub struct ExpectedCounts {
    /// Expected occurrence count per piece id.
    pub freq: Vec<f64>,
    /// Average negative log-likelihood per corpus weight unit.
    pub objective: f64,
    /// Tokens on the Viterbi paths, for the tokens-per-piece diagnostic.
    pub num_tokens: u64,
    /// Total symbols processed.
    pub num_symbols: u64,
}

/// Run one E-step over the full corpus.
///
/// With `num_threads > 1` sentences are processed by a rayon worker pool;
/// each worker accumulates into a thread-local partial count vector and the
/// partials are reduced before returning, so the caller never observes a
/// partially-reduced map. `num_threads <= 1` uses the sequential path, which
/// is bit-deterministic.
pub fn run_e_step(
    vocab: &PieceVocab,
    sentences: &[Sentence],
    num_threads: usize,
) -> Result<ExpectedCounts> {
    if sentences.is_empty() {
        return Err(TrainerError::DegenerateCounts(
            "E-step invoked on an empty corpus".into(),
        ));
    }
    let total_weight: f64 = sentences.iter().map(|s| s.weight).sum();
    if total_weight <= 0.0 {
        return Err(TrainerError::DegenerateCounts(
            "corpus has zero total weight".into(),
        ));
    }

    if num_threads > 1 {
        run_e_step_parallel(vocab, sentences, total_weight)
    } else {
        run_e_step_sequential(vocab, sentences, total_weight)
    }
}

fn evaluate_sentence(
    vocab: &PieceVocab,
    sentence: &Sentence,
    freq: &mut [f64],
) -> Result<(f64, u64, u64)> {
    let mut lattice = Lattice::new(&sentence.text);
    vocab.populate(&mut lattice);
    let z = lattice.populate_marginal(sentence.weight, freq)?;
    let num_tokens = lattice.viterbi()?.len() as u64;
    Ok((z, num_tokens, lattice.len() as u64))
}

fn run_e_step_sequential(
    vocab: &PieceVocab,
    sentences: &[Sentence],
    total_weight: f64,
) -> Result<ExpectedCounts> {
    let mut counts = ExpectedCounts {
        freq: vec![0.0; vocab.len()],
        objective: 0.0,
        num_tokens: 0,
        num_symbols: 0,
    };
    for sentence in sentences {
        let (z, num_tokens, num_symbols) =
            evaluate_sentence(vocab, sentence, &mut counts.freq)?;
        counts.objective -= z / total_weight;
        counts.num_tokens += num_tokens;
        counts.num_symbols += num_symbols;
    }
    Ok(counts)
}

fn run_e_step_parallel(
    vocab: &PieceVocab,
    sentences: &[Sentence],
    total_weight: f64,
) -> Result<ExpectedCounts> {
    let n = vocab.len();
    sentences
        .par_iter()
        .map(|sentence| {
            let mut counts = ExpectedCounts {
                freq: vec![0.0; n],
                objective: 0.0,
                num_tokens: 0,
                num_symbols: 0,
            };
            let (z, num_tokens, num_symbols) =
                evaluate_sentence(vocab, sentence, &mut counts.freq)?;
            counts.objective -= z / total_weight;
            counts.num_tokens = num_tokens;
            counts.num_symbols = num_symbols;
            Ok(counts)
        })
        .try_reduce(
            || ExpectedCounts {
                freq: vec![0.0; n],
                objective: 0.0,
                num_tokens: 0,
                num_symbols: 0,
            },
            |mut acc, partial| {
                for (a, b) in acc.freq.iter_mut().zip(&partial.freq) {
                    *a += *b;
                }
                acc.objective += partial.objective;
                acc.num_tokens += partial.num_tokens;
                acc.num_symbols += partial.num_symbols;
                Ok(acc)
            },
        )
}

/// Run one M-step: maximum-likelihood renormalization of expected counts.
///
/// Membership is unchanged; only scores move. Pieces with zero expected
/// count get a floor score below the smallest observed one. Fails rather
/// than producing NaN/infinite scores when the counts degenerate.
pub fn run_m_step(pieces: &[Piece], expected: &ExpectedCounts) -> Result<Vec<Piece>> {
    if pieces.len() != expected.freq.len() {
        return Err(TrainerError::InvalidVocab(format!(
            "expected counts for {} pieces, vocabulary has {}",
            expected.freq.len(),
            pieces.len()
        )));
    }
    let sum: f64 = expected.freq.iter().sum();
    if !(sum > 0.0) || !sum.is_finite() {
        return Err(TrainerError::DegenerateCounts(format!(
            "total expected count is {sum}"
        )));
    }
    let logsum = sum.ln();

    let mut min_score = f64::INFINITY;
    let mut new_pieces: Vec<Piece> = pieces.to_vec();
    for (piece, &freq) in new_pieces.iter_mut().zip(&expected.freq) {
        if freq > 0.0 {
            piece.score = freq.ln() - logsum;
            if piece.score < min_score {
                min_score = piece.score;
            }
        }
    }
    let floor = if min_score.is_finite() {
        min_score - ZERO_COUNT_PENALTY
    } else {
        -ZERO_COUNT_PENALTY
    };
    for (piece, &freq) in new_pieces.iter_mut().zip(&expected.freq) {
        if freq <= 0.0 {
            piece.score = floor;
        }
    }
    Ok(new_pieces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use unipiece_core::{Piece, PieceKind};

    fn vocab(entries: &[(&str, f64)]) -> PieceVocab {
        let pieces = entries
            .iter()
            .map(|&(s, score)| Piece::normal(s, score))
            .collect();
        PieceVocab::from_pieces(pieces).unwrap()
    }

    #[test]
    fn test_e_step_expected_counts() {
        let v = vocab(&[("a", -1.0), ("b", -1.0), ("ab", -1.0)]);
        let sentences = vec![Sentence::new("ab", 1.0)];
        let counts = run_e_step(&v, &sentences, 1).unwrap();
        // "ab" strongly preferred: score -1.0 vs -2.0 for "a"+"b".
        assert!(counts.freq[2] > counts.freq[0]);
        assert!(counts.objective > 0.0);
        assert_eq!(counts.num_tokens, 1);
        assert_eq!(counts.num_symbols, 2);
    }

    #[test]
    fn test_e_step_empty_corpus_fails() {
        let v = vocab(&[("a", -1.0)]);
        assert!(matches!(
            run_e_step(&v, &[], 1),
            Err(TrainerError::DegenerateCounts(_))
        ));
    }

    #[test]
    fn test_e_step_parallel_matches_sequential_totals() {
        let v = vocab(&[("a", -1.5), ("b", -1.5), ("ab", -1.2), ("ba", -2.0)]);
        let sentences: Vec<Sentence> = ["abab", "ba", "aab"]
            .iter()
            .map(|t| Sentence::new(*t, 1.0))
            .collect();
        let seq = run_e_step(&v, &sentences, 1).unwrap();
        let par = run_e_step(&v, &sentences, 4).unwrap();
        assert_eq!(seq.num_tokens, par.num_tokens);
        assert!((seq.objective - par.objective).abs() < 1e-9);
        for (a, b) in seq.freq.iter().zip(&par.freq) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_m_step_renormalizes() {
        let pieces = vec![Piece::normal("a", -1.0), Piece::normal("b", -1.0)];
        let expected = ExpectedCounts {
            freq: vec![3.0, 1.0],
            objective: 0.0,
            num_tokens: 0,
            num_symbols: 0,
        };
        let new_pieces = run_m_step(&pieces, &expected).unwrap();
        assert!((new_pieces[0].score - (0.75f64).ln()).abs() < 1e-9);
        assert!((new_pieces[1].score - (0.25f64).ln()).abs() < 1e-9);
        // Valid log probabilities.
        let total: f64 = new_pieces.iter().map(|p| p.score.exp()).sum();
        assert!(total <= 1.0 + 1e-9);
    }

    #[test]
    fn test_m_step_zero_count_gets_floor_not_neg_infinity() {
        let pieces = vec![
            Piece::pinned("<unk>", PieceKind::Unknown),
            Piece::normal("a", -1.0),
            Piece::normal("b", -1.0),
        ];
        let expected = ExpectedCounts {
            freq: vec![0.0, 2.0, 0.0],
            objective: 0.0,
            num_tokens: 0,
            num_symbols: 0,
        };
        let new_pieces = run_m_step(&pieces, &expected).unwrap();
        assert_eq!(new_pieces.len(), 3); // membership unchanged
        assert!(new_pieces[2].score.is_finite());
        assert!(new_pieces[2].score < new_pieces[1].score);
    }

    #[test]
    fn test_m_step_degenerate_counts_fail() {
        let pieces = vec![Piece::normal("a", -1.0)];
        let expected = ExpectedCounts {
            freq: vec![0.0],
            objective: 0.0,
            num_tokens: 0,
            num_symbols: 0,
        };
        assert!(matches!(
            run_m_step(&pieces, &expected),
            Err(TrainerError::DegenerateCounts(_))
        ));
    }

    #[test]
    fn test_m_step_length_mismatch() {
        let pieces = vec![Piece::normal("a", -1.0)];
        let expected = ExpectedCounts {
            freq: vec![1.0, 1.0],
            objective: 0.0,
            num_tokens: 0,
            num_symbols: 0,
        };
        assert!(run_m_step(&pieces, &expected).is_err());
    }
}
