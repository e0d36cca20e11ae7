//! Unipiece-core - Unigram segmentation model
//!
//! This crate provides the data model and segmentation machinery shared by
//! the unigram trainers:
//!
//! - Scored sentence pieces with pinning categories ([`Piece`], [`PieceKind`])
//! - Trie-backed piece vocabularies with atomic-replace semantics
//!   ([`PieceVocab`])
//! - The segmentation lattice: Viterbi decoding, forward-backward expected
//!   counts, and n-best enumeration ([`Lattice`])
//! - Error handling with detailed diagnostics
//!
//! # Example
//!
//! ```rust
//! use unipiece_core::{Piece, PieceVocab};
//!
//! let vocab = PieceVocab::from_pieces(vec![
//!     Piece::normal("lo", -1.2),
//!     Piece::normal("w", -2.0),
//! ])?;
//! assert_eq!(vocab.encode_pieces("low")?, vec!["lo", "w"]);
//! # Ok::<(), unipiece_core::TrainerError>(())
//! ```

pub mod error;
pub use error::{Result, TrainerError};

pub mod piece;
pub use piece::{Piece, PieceKind};

pub mod trie;
pub use trie::Trie;

pub mod lattice;
pub use lattice::Lattice;

pub mod vocab;
pub use vocab::PieceVocab;
