//! Piece vocabulary with trie-backed lattice population.
//!
//! A `PieceVocab` is an immutable snapshot of the vocabulary: an ordered
//! piece list unique by surface, a surface-to-id map, and a character trie
//! for common-prefix search. Training never mutates a snapshot in place —
//! each M-step and prune round builds a fresh `PieceVocab` and swaps it in,
//! so an expectation snapshot always refers to exactly one vocabulary.

use crate::error::{Result, TrainerError};
use crate::lattice::Lattice;
use crate::piece::{Piece, PieceKind};
use crate::trie::Trie;
use ahash::AHashMap;
use compact_str::CompactString;

/// An immutable scored piece vocabulary.
#[derive(Debug, Clone)]
pub struct PieceVocab {
    pieces: Vec<Piece>,
    ids: AHashMap<CompactString, u32>,
    trie: Trie,
    min_score: f64,
}

impl PieceVocab {
    /// Build a vocabulary from an ordered piece list.
    ///
    /// Fails if two pieces share a surface.
    pub fn from_pieces(pieces: Vec<Piece>) -> Result<Self> {
        let mut ids = AHashMap::with_capacity(pieces.len());
        let mut trie = Trie::new();
        let mut min_score = 0.0f64;
        for (id, piece) in pieces.iter().enumerate() {
            if ids.insert(piece.surface.clone(), id as u32).is_some() {
                return Err(TrainerError::InvalidVocab(format!(
                    "duplicate piece {:?}",
                    piece.surface
                )));
            }
            // Control pieces never match raw text, keep them out of the trie.
            if piece.kind != PieceKind::Control && piece.kind != PieceKind::Unknown {
                trie.insert(&piece.surface, id as u32);
            }
            if piece.kind == PieceKind::Normal && piece.score < min_score {
                min_score = piece.score;
            }
        }
        Ok(Self {
            pieces,
            ids,
            trie,
            min_score,
        })
    }

    /// Number of pieces.
    #[inline]
    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    /// Whether the vocabulary is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// The ordered piece list.
    #[inline]
    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    /// Piece by id.
    #[inline]
    pub fn get(&self, id: u32) -> Option<&Piece> {
        self.pieces.get(id as usize)
    }

    /// Id of a piece by surface.
    #[inline]
    pub fn id_of(&self, surface: &str) -> Option<u32> {
        self.ids.get(surface).copied()
    }

    /// Lowest score among normal pieces.
    #[inline]
    pub fn min_score(&self) -> f64 {
        self.min_score
    }

    /// Insert every matching piece as an edge into the lattice.
    pub fn populate(&self, lattice: &mut Lattice) {
        let chars: Vec<char> = lattice.chars().to_vec();
        for pos in 0..chars.len() {
            for (id, len) in self.trie.common_prefix_search(&chars[pos..]) {
                let score = self.pieces[id as usize].score;
                lattice.insert(pos, len, score, id);
            }
        }
    }

    /// Segment `text` into piece ids along the max-score path.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let mut lattice = Lattice::new(text);
        self.populate(&mut lattice);
        let path = lattice.viterbi()?;
        Ok(path.iter().map(|&n| lattice.piece_id(n)).collect())
    }

    /// Segment `text` into piece surfaces along the max-score path.
    pub fn encode_pieces(&self, text: &str) -> Result<Vec<&str>> {
        let ids = self.encode(text)?;
        Ok(ids
            .iter()
            .map(|&id| self.pieces[id as usize].surface.as_str())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab(entries: &[(&str, f64)]) -> PieceVocab {
        let pieces = entries
            .iter()
            .map(|&(s, score)| Piece::normal(s, score))
            .collect();
        PieceVocab::from_pieces(pieces).unwrap()
    }

    #[test]
    fn test_encode_prefers_high_score_path() {
        let v = vocab(&[("a", -2.0), ("b", -2.0), ("c", -2.0), ("ab", -1.0)]);
        assert_eq!(v.encode("abc").unwrap(), vec![3, 2]);
        assert_eq!(v.encode_pieces("abc").unwrap(), vec!["ab", "c"]);
    }

    #[test]
    fn test_duplicate_surface_rejected() {
        let pieces = vec![Piece::normal("a", -1.0), Piece::normal("a", -2.0)];
        assert!(matches!(
            PieceVocab::from_pieces(pieces),
            Err(TrainerError::InvalidVocab(_))
        ));
    }

    #[test]
    fn test_control_pieces_never_match_text() {
        let pieces = vec![
            Piece::pinned("<unk>", PieceKind::Unknown),
            Piece::pinned("<s>", PieceKind::Control),
            Piece::normal("<", -1.0),
            Piece::normal("s", -1.0),
            Piece::normal(">", -1.0),
        ];
        let v = PieceVocab::from_pieces(pieces).unwrap();
        // "<s>" segments through the normal single chars, not the control piece.
        assert_eq!(v.encode("<s>").unwrap(), vec![2, 3, 4]);
    }

    #[test]
    fn test_encode_coverage_gap() {
        let v = vocab(&[("a", -1.0)]);
        assert!(matches!(
            v.encode("ab"),
            Err(TrainerError::CoverageGap { pos: 1, .. })
        ));
    }

    #[test]
    fn test_min_score_ignores_pinned() {
        let pieces = vec![
            Piece::pinned("<unk>", PieceKind::Unknown),
            Piece::normal("a", -3.0),
            Piece::normal("b", -1.0),
        ];
        let v = PieceVocab::from_pieces(pieces).unwrap();
        assert_eq!(v.min_score(), -3.0);
    }
}
