//! CLI commands for the unipiece trainer.

pub mod encode;
pub mod train;
pub mod train_joint;

pub use encode::EncodeCommand;
pub use train::TrainCommand;
pub use train_joint::TrainJointCommand;
