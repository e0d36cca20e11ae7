//! Train command implementation.

use clap::{ArgAction, Args, Parser};

/// Trainer flags shared by single and joint training.
#[derive(Args)]
pub struct SpecArgs {
    /// Fraction of corpus character mass the alphabet must cover
    #[arg(long, default_value_t = 0.9995)]
    pub character_coverage: f64,

    /// Number of seed candidate pieces before EM starts
    #[arg(long, default_value_t = 1_000_000)]
    pub seed_sentencepiece_size: usize,

    /// Fraction of removable pieces kept per prune round
    #[arg(long, default_value_t = 0.75)]
    pub shrinking_factor: f64,

    /// EM sub-iterations per round
    #[arg(long, default_value_t = 2)]
    pub num_sub_iterations: usize,

    /// Maximum piece length in symbols
    #[arg(long, default_value_t = 16)]
    pub max_sentencepiece_length: usize,

    /// Worker threads for the E-step
    #[arg(long, default_value_t = 4)]
    pub num_threads: usize,

    /// Split sentences into whitespace-delimited words before training
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    pub split_by_whitespace: bool,

    /// Comma-separated control symbols
    #[arg(long, value_delimiter = ',')]
    pub control_symbols: Vec<String>,

    /// Comma-separated user-defined symbols
    #[arg(long, value_delimiter = ',')]
    pub user_defined_symbols: Vec<String>,

    /// Characters always kept in the alphabet
    #[arg(long, default_value = "")]
    pub required_chars: String,

    /// Add <0xNN> byte pieces to the vocabulary
    #[arg(long, default_value_t = false)]
    pub byte_fallback: bool,

    /// Use 64-bit seed counters for very large corpora
    #[arg(long, default_value_t = false)]
    pub train_extremely_large_corpus: bool,

    /// Fail if the corpus cannot fill vocab_size
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    pub hard_vocab_limit: bool,

    /// Write scores into the .vocab file
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    pub vocabulary_output_piece_score: bool,

    /// Input is tab-separated "sentence\tweight" instead of plain lines
    #[arg(long, default_value_t = false)]
    pub input_tsv: bool,
}

/// Train command arguments.
#[derive(Parser)]
pub struct TrainCommand {
    /// Path to the training data file (one sentence per line)
    #[arg(short, long)]
    pub input: String,

    /// Output prefix for <prefix>.model.json and <prefix>.vocab
    #[arg(short, long)]
    pub model_prefix: String,

    /// Target vocabulary size
    #[arg(short, long, default_value_t = 8000)]
    pub vocab_size: usize,

    #[command(flatten)]
    pub spec: SpecArgs,
}

use anyhow::{Context, Result as AnyhowResult};
use std::fs;
use std::time::Instant;
use unipiece_training::{save_model, NormalizerSpec, Sentence, Trainer, TrainerSpec};

impl SpecArgs {
    pub fn to_spec(&self, vocab_size: usize, model_prefix: &str) -> TrainerSpec {
        TrainerSpec {
            vocab_size,
            character_coverage: self.character_coverage,
            seed_sentencepiece_size: self.seed_sentencepiece_size,
            shrinking_factor: self.shrinking_factor,
            num_threads: self.num_threads,
            num_sub_iterations: self.num_sub_iterations,
            max_sentencepiece_length: self.max_sentencepiece_length,
            split_by_whitespace: self.split_by_whitespace,
            control_symbols: self.control_symbols.clone(),
            user_defined_symbols: self.user_defined_symbols.clone(),
            required_chars: self.required_chars.clone(),
            byte_fallback: self.byte_fallback,
            train_extremely_large_corpus: self.train_extremely_large_corpus,
            hard_vocab_limit: self.hard_vocab_limit,
            vocabulary_output_piece_score: self.vocabulary_output_piece_score,
            model_prefix: model_prefix.to_string(),
            ..Default::default()
        }
    }
}

/// Read a corpus file: plain lines, or "sentence\tweight" when `tsv`.
pub fn read_corpus(path: &str, tsv: bool) -> AnyhowResult<Vec<Sentence>> {
    let data = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let mut sentences = Vec::new();
    for (lineno, line) in data.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        if tsv {
            let (text, weight) = line
                .rsplit_once('\t')
                .with_context(|| format!("{path}:{}: missing weight column", lineno + 1))?;
            let weight: f64 = weight
                .parse()
                .with_context(|| format!("{path}:{}: bad weight {weight:?}", lineno + 1))?;
            sentences.push(Sentence::new(text, weight));
        } else {
            sentences.push(Sentence::new(line, 1.0));
        }
    }
    Ok(sentences)
}

pub fn run(cmd: TrainCommand) -> AnyhowResult<()> {
    let spec = cmd.spec.to_spec(cmd.vocab_size, &cmd.model_prefix);
    let sentences = read_corpus(&cmd.input, cmd.spec.input_tsv)?;
    println!("Read {} sentences from {}", sentences.len(), cmd.input);

    let start = Instant::now();
    let mut trainer = Trainer::new(spec.clone(), NormalizerSpec::default())?;
    trainer.feed(sentences)?;
    let model = trainer.train()?;
    println!(
        "Trained {} pieces in {:.2}s",
        model.pieces.len(),
        start.elapsed().as_secs_f64()
    );

    save_model(&model, &spec, &cmd.model_prefix)?;
    println!("Model saved to {}.model.json", cmd.model_prefix);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> TrainCommand {
        let base = ["train", "--input", "corpus.txt", "--model-prefix", "m"];
        TrainCommand::try_parse_from(base.iter().chain(args)).unwrap()
    }

    #[test]
    fn test_true_default_flags_can_be_disabled() {
        let cmd = parse(&[]);
        assert!(cmd.spec.split_by_whitespace);
        assert!(cmd.spec.hard_vocab_limit);
        assert!(cmd.spec.vocabulary_output_piece_score);

        let cmd = parse(&[
            "--split-by-whitespace",
            "false",
            "--hard-vocab-limit",
            "false",
            "--vocabulary-output-piece-score",
            "false",
        ]);
        assert!(!cmd.spec.split_by_whitespace);
        assert!(!cmd.spec.hard_vocab_limit);
        assert!(!cmd.spec.vocabulary_output_piece_score);

        let spec = cmd.spec.to_spec(100, "m");
        assert!(!spec.split_by_whitespace);
        assert!(!spec.hard_vocab_limit);
        assert!(!spec.vocabulary_output_piece_score);
    }

    #[test]
    fn test_false_default_flags_are_switches() {
        let cmd = parse(&["--byte-fallback", "--input-tsv"]);
        assert!(cmd.spec.byte_fallback);
        assert!(cmd.spec.input_tsv);
    }
}
