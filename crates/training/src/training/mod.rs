//! The unigram training pipeline: seeding, EM, pruning, and the joint
//! lockstep driver.

pub mod em;
pub mod joint;
pub mod pruner;
pub mod seed;
pub mod trainer;

pub use em::{run_e_step, run_m_step, ExpectedCounts};
pub use joint::{train_joint, train_joint_with_policy, IndependentPruning, JointPruningPolicy};
pub use pruner::prune_pieces;
pub use seed::make_seed_pieces;
pub use trainer::{TrainedModel, Trainer, TrainerState};
