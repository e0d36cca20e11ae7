//! Encode command implementation.

use clap::Parser;

/// Encode command arguments.
#[derive(Parser)]
pub struct EncodeCommand {
    /// Path to the trained model (.model.json)
    #[arg(short, long)]
    pub model: String,

    /// Text to encode ("-" reads stdin)
    #[arg(short, long)]
    pub input: String,

    /// Print piece ids instead of surfaces
    #[arg(long, default_value_t = false)]
    pub ids: bool,
}

use anyhow::Result as AnyhowResult;
use std::path::Path;
use unipiece_training::{corpus, load_model};

pub fn run(cmd: EncodeCommand) -> AnyhowResult<()> {
    let model = load_model(Path::new(&cmd.model))?;
    let vocab = model.vocab()?;

    let input_text = if cmd.input == "-" {
        use std::io::Read;
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        cmd.input
    };

    for line in input_text.lines() {
        let text = corpus::normalize(line, &model.normalizer);
        if text.is_empty() {
            println!();
            continue;
        }
        let output = if cmd.ids {
            let ids = vocab.encode(&text)?;
            ids.iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        } else {
            vocab.encode_pieces(&text)?.join(" ")
        };
        println!("{output}");
    }
    Ok(())
}
