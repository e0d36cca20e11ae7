//! Unigram sentence-piece training.
//!
//! This crate turns a corpus into a scored piece vocabulary with the
//! classic unigram recipe: enumerate seed candidates, alternate EM
//! re-estimation with loss-based pruning until the vocabulary fits, then
//! finalize ids. [`train_joint`] drives two vocabularies (for example the
//! two sides of a translation corpus) through the loop in lockstep so both
//! reach their budgets together.
//!
//! ```no_run
//! use unipiece_training::{NormalizerSpec, Sentence, Trainer, TrainerSpec};
//!
//! # fn main() -> unipiece_core::Result<()> {
//! let spec = TrainerSpec {
//!     vocab_size: 8000,
//!     ..Default::default()
//! };
//! let mut trainer = Trainer::new(spec, NormalizerSpec::default())?;
//! trainer.feed(vec![Sentence::new("hello world", 1.0)])?;
//! let model = trainer.train()?;
//! println!("{} pieces", model.pieces.len());
//! # Ok(())
//! # }
//! ```

pub mod corpus;
pub mod persist;
pub mod spec;
pub mod training;

pub use corpus::{Sentence, WHITESPACE_SYMBOL};
pub use persist::{load_model, save_model, SavedModel};
pub use spec::{ModelType, NormalizerSpec, TrainerSpec};
pub use training::{
    train_joint, train_joint_with_policy, IndependentPruning, JointPruningPolicy, TrainedModel,
    Trainer, TrainerState,
};
pub use unipiece_core::{Result, TrainerError};
