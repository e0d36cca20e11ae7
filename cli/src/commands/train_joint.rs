//! Joint train command implementation.

use clap::Parser;

use crate::commands::train::SpecArgs;

/// Joint train command arguments. Per-side inputs and sizes; the remaining
/// trainer flags are shared by both sides.
#[derive(Parser)]
pub struct TrainJointCommand {
    /// Path to the source-side training data file
    #[arg(long)]
    pub src_input: String,

    /// Path to the target-side training data file
    #[arg(long)]
    pub tgt_input: String,

    /// Output prefix for the source-side model
    #[arg(long)]
    pub src_model_prefix: String,

    /// Output prefix for the target-side model
    #[arg(long)]
    pub tgt_model_prefix: String,

    /// Source-side vocabulary size
    #[arg(long, default_value_t = 8000)]
    pub src_vocab_size: usize,

    /// Target-side vocabulary size
    #[arg(long, default_value_t = 8000)]
    pub tgt_vocab_size: usize,

    #[command(flatten)]
    pub spec: SpecArgs,
}

use crate::commands::train::read_corpus;
use anyhow::Result as AnyhowResult;
use std::time::Instant;
use unipiece_training::{save_model, train_joint, NormalizerSpec};

pub fn run(cmd: TrainJointCommand) -> AnyhowResult<()> {
    let spec_src = cmd.spec.to_spec(cmd.src_vocab_size, &cmd.src_model_prefix);
    let spec_tgt = cmd.spec.to_spec(cmd.tgt_vocab_size, &cmd.tgt_model_prefix);

    let corpus_src = read_corpus(&cmd.src_input, cmd.spec.input_tsv)?;
    let corpus_tgt = read_corpus(&cmd.tgt_input, cmd.spec.input_tsv)?;
    println!(
        "Read {} source and {} target sentences",
        corpus_src.len(),
        corpus_tgt.len()
    );

    let start = Instant::now();
    let (model_src, model_tgt) = train_joint(
        &spec_src,
        &spec_tgt,
        &NormalizerSpec::default(),
        corpus_src,
        corpus_tgt,
    )?;
    println!(
        "Trained {} + {} pieces in {:.2}s",
        model_src.pieces.len(),
        model_tgt.pieces.len(),
        start.elapsed().as_secs_f64()
    );

    save_model(&model_src, &spec_src, &cmd.src_model_prefix)?;
    save_model(&model_tgt, &spec_tgt, &cmd.tgt_model_prefix)?;
    println!(
        "Models saved to {}.model.json and {}.model.json",
        cmd.src_model_prefix, cmd.tgt_model_prefix
    );
    Ok(())
}
