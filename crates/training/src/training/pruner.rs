//! Loss-based vocabulary pruning.
//!
//! For every removable piece the pruner estimates how much the corpus
//! likelihood would drop if the piece were deleted and its occurrences were
//! re-segmented with the second-best alternatives. Only sentences that
//! actually touch the piece enter the estimate; exact re-scoring of the full
//! corpus per candidate would be intractable.

use crate::corpus::Sentence;
use ahash::AHashSet;
use log::debug;
use unipiece_core::{Lattice, Piece, PieceVocab, Result, TrainerError};

/// Prune the vocabulary by marginal loss.
///
/// Keeps `max(desired_size, len × shrinking_factor)` pieces, so one round
/// never drops more than the shrinking factor allows and never shrinks past
/// `desired_size`. Pinned pieces and single-character pieces of the required
/// alphabet are always retained.
pub fn prune_pieces(
    vocab: &PieceVocab,
    sentences: &[Sentence],
    desired_size: usize,
    shrinking_factor: f64,
    required: &AHashSet<char>,
) -> Result<Vec<Piece>> {
    let pieces = vocab.pieces();
    let n = pieces.len();

    // How each piece would be re-segmented without itself: the second-best
    // segmentation of its own surface.
    let mut always_keep = vec![true; n];
    let mut alternatives: Vec<Vec<u32>> = vec![Vec::new(); n];
    for (id, piece) in pieces.iter().enumerate() {
        if piece.is_pinned() {
            continue;
        }
        let mut lattice = Lattice::new(&piece.surface);
        vocab.populate(&mut lattice);
        let nbests = lattice.nbest(2)?;
        if nbests.len() == 1 {
            // No alternative segmentation exists at all.
            always_keep[id] = true;
        } else if nbests[0].len() >= 2 {
            // The piece is not even its own best segmentation; removable.
            always_keep[id] = false;
        } else if nbests[0].len() == 1 {
            always_keep[id] = true;
            for &node in &nbests[1] {
                alternatives[id].push(lattice.piece_id(node));
            }
        }
    }

    // Viterbi-segment the corpus: per-piece frequency and an inverted index
    // of the sentences each piece appears in.
    let mut vsum = 0.0;
    let mut freq = vec![0.0f64; n];
    let mut inverted: Vec<Vec<u32>> = vec![Vec::new(); n];
    for (i, sentence) in sentences.iter().enumerate() {
        let mut lattice = Lattice::new(&sentence.text);
        vocab.populate(&mut lattice);
        vsum += sentence.weight;
        for &node in &lattice.viterbi()? {
            let id = lattice.piece_id(node) as usize;
            freq[id] += sentence.weight;
            inverted[id].push(i as u32);
        }
    }

    let sum: f64 = freq.iter().sum();
    if !(sum > 0.0) {
        return Err(TrainerError::DegenerateCounts(
            "no piece appears on any Viterbi path".into(),
        ));
    }
    let logsum = sum.ln();

    let is_required_char = |piece: &Piece| {
        let mut chars = piece.surface.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => required.contains(&c),
            _ => false,
        }
    };

    // The likelihood delta from removing piece i, assuming its occurrences
    // are re-assigned to alternatives[i].
    let mut new_pieces: Vec<Piece> = Vec::with_capacity(desired_size);
    let mut candidates: Vec<(usize, f64)> = Vec::new();
    for (id, piece) in pieces.iter().enumerate() {
        if piece.is_pinned() || is_required_char(piece) {
            new_pieces.push(piece.clone());
            continue;
        }
        if freq[id] == 0.0 && !always_keep[id] {
            // Never used in a Viterbi path; safe to drop immediately.
            continue;
        }
        if alternatives[id].is_empty() {
            new_pieces.push(piece.clone());
            continue;
        }

        let mut f: f64 = inverted[id]
            .iter()
            .map(|&i| sentences[i as usize].weight)
            .sum();
        if f == 0.0 || f.is_nan() {
            continue;
        }
        f /= vsum;

        let logprob_piece = freq[id].ln() - logsum;
        // After removal, freq[id] is re-assigned to the alternatives:
        // new_sum = sum + freq[id] * (alternatives - 1)
        let logsum_alt = (sum + freq[id] * (alternatives[id].len() - 1) as f64).ln();
        let mut logprob_alt = 0.0;
        for &alt in &alternatives[id] {
            logprob_alt += (freq[alt as usize] + freq[id]).ln() - logsum_alt;
        }

        let loss = f * (logprob_piece - logprob_alt);
        let loss = if loss.is_finite() { loss } else { 0.0 };
        candidates.push((id, loss));
    }

    let pruned_size = desired_size.max((n as f64 * shrinking_factor) as usize);
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    for (id, _loss) in candidates {
        if new_pieces.len() >= pruned_size {
            break;
        }
        new_pieces.push(pieces[id].clone());
    }

    debug!(
        "prune: {} -> {} pieces (desired {})",
        n,
        new_pieces.len(),
        desired_size
    );
    Ok(new_pieces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use unipiece_core::PieceKind;

    fn vocab(pieces: Vec<Piece>) -> PieceVocab {
        PieceVocab::from_pieces(pieces).unwrap()
    }

    fn alphabet(chars: &str) -> AHashSet<char> {
        chars.chars().collect()
    }

    #[test]
    fn test_prune_never_below_desired_size() {
        let v = vocab(vec![
            Piece::normal("a", -2.0),
            Piece::normal("b", -2.0),
            Piece::normal("ab", -1.5),
            Piece::normal("ba", -4.0),
            Piece::normal("aba", -3.5),
        ]);
        let sentences = vec![Sentence::new("abab", 10.0), Sentence::new("aba", 2.0)];
        let pruned =
            prune_pieces(&v, &sentences, 4, 0.1, &alphabet("ab")).unwrap();
        assert!(pruned.len() >= 4.min(v.len()));
        assert!(pruned.len() <= v.len());
    }

    #[test]
    fn test_prune_keeps_pinned_pieces() {
        let v = vocab(vec![
            Piece::pinned("<unk>", PieceKind::Unknown),
            Piece::pinned("<s>", PieceKind::Control),
            Piece::normal("a", -1.0),
            Piece::normal("b", -1.0),
            Piece::normal("ab", -1.0),
        ]);
        let sentences = vec![Sentence::new("ab", 1.0)];
        let pruned = prune_pieces(&v, &sentences, 3, 0.5, &alphabet("ab")).unwrap();
        assert!(pruned.iter().any(|p| p.surface == "<unk>"));
        assert!(pruned.iter().any(|p| p.surface == "<s>"));
    }

    #[test]
    fn test_prune_keeps_required_single_chars() {
        // "b" never wins a Viterbi path but is required for coverage.
        let v = vocab(vec![
            Piece::normal("a", -1.0),
            Piece::normal("b", -8.0),
            Piece::normal("ab", -1.0),
        ]);
        let sentences = vec![Sentence::new("ab", 5.0)];
        let pruned = prune_pieces(&v, &sentences, 2, 0.5, &alphabet("ab")).unwrap();
        assert!(pruned.iter().any(|p| p.surface == "a"));
        assert!(pruned.iter().any(|p| p.surface == "b"));
    }

    #[test]
    fn test_prune_drops_unused_pieces() {
        let v = vocab(vec![
            Piece::normal("a", -1.0),
            Piece::normal("b", -1.0),
            Piece::normal("ab", -0.5),
            // never on a Viterbi path and second-best for itself
            Piece::normal("ba", -9.0),
        ]);
        let sentences = vec![Sentence::new("ab", 3.0)];
        let pruned = prune_pieces(&v, &sentences, 2, 0.9, &alphabet("")).unwrap();
        assert!(!pruned.iter().any(|p| p.surface == "ba"));
    }

    #[test]
    fn test_prune_size_is_monotone() {
        let v = vocab(vec![
            Piece::normal("a", -2.0),
            Piece::normal("b", -2.0),
            Piece::normal("c", -2.0),
            Piece::normal("ab", -1.5),
            Piece::normal("bc", -1.5),
            Piece::normal("abc", -1.2),
        ]);
        let sentences = vec![Sentence::new("abcabc", 4.0)];
        let pruned = prune_pieces(&v, &sentences, 1, 0.5, &alphabet("")).unwrap();
        assert!(pruned.len() <= v.len());
    }
}
