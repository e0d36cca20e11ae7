//! Sentence pieces: interned subword units with a log-probability score.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Category of a sentence piece.
///
/// Every kind except `Normal` is *pinned*: pinned pieces participate in
/// segmentation scoring but are exempt from pruning, and re-estimation
/// never drops them regardless of their expected count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PieceKind {
    /// Regular piece learned from the corpus.
    Normal,
    /// Piece supplied by the user; always segmented as a whole token.
    UserDefined,
    /// Control symbol (e.g. bos/eos/pad); never matches input text.
    Control,
    /// The unknown piece.
    Unknown,
    /// Byte fallback piece (`<0xNN>`).
    Byte,
}

impl PieceKind {
    /// Pinned pieces are exempt from pruning.
    #[inline]
    pub fn is_pinned(self) -> bool {
        !matches!(self, PieceKind::Normal)
    }
}

/// A sentence piece: surface string, log-probability score, and category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Piece {
    /// The token surface.
    pub surface: CompactString,
    /// Log probability under the current unigram model.
    pub score: f64,
    /// Category flag controlling pruning/re-estimation exemptions.
    pub kind: PieceKind,
}

impl Piece {
    /// Create a normal (prunable) piece.
    pub fn normal(surface: &str, score: f64) -> Self {
        Self {
            surface: CompactString::new(surface),
            score,
            kind: PieceKind::Normal,
        }
    }

    /// Create a pinned piece of the given kind with a zero score.
    pub fn pinned(surface: &str, kind: PieceKind) -> Self {
        Self {
            surface: CompactString::new(surface),
            score: 0.0,
            kind,
        }
    }

    /// Whether this piece is exempt from pruning.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.kind.is_pinned()
    }

    /// Surface length in Unicode symbols.
    #[inline]
    pub fn char_len(&self) -> usize {
        self.surface.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pinned_kinds() {
        assert!(!PieceKind::Normal.is_pinned());
        assert!(PieceKind::UserDefined.is_pinned());
        assert!(PieceKind::Control.is_pinned());
        assert!(PieceKind::Unknown.is_pinned());
        assert!(PieceKind::Byte.is_pinned());
    }

    #[test]
    fn test_char_len() {
        assert_eq!(Piece::normal("abc", -1.0).char_len(), 3);
        assert_eq!(Piece::normal("▁あい", -1.0).char_len(), 3);
    }
}
