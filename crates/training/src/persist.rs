//! Model persistence.
//!
//! A trained model is written as two files under a common prefix:
//! `<prefix>.model.json` carries everything needed to reload the model, and
//! `<prefix>.vocab` is a human-readable tab-separated listing in id order.

use crate::spec::{ModelType, NormalizerSpec, TrainerSpec};
use crate::training::trainer::TrainedModel;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use unipiece_core::{Piece, Result, TrainerError};

const MODEL_FORMAT_VERSION: u32 = 1;

/// On-disk model representation.
#[derive(Debug, Serialize, Deserialize)]
pub struct SavedModel {
    pub version: u32,
    pub model_type: ModelType,
    pub normalizer: NormalizerSpec,
    pub pieces: Vec<Piece>,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> TrainerError + '_ {
    move |source| TrainerError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write `<prefix>.model.json` and `<prefix>.vocab`.
pub fn save_model(model: &TrainedModel, spec: &TrainerSpec, prefix: &str) -> Result<()> {
    let saved = SavedModel {
        version: MODEL_FORMAT_VERSION,
        model_type: ModelType::Unigram,
        normalizer: model.normalizer.clone(),
        pieces: model.pieces.clone(),
    };

    let model_path = PathBuf::from(format!("{prefix}.model.json"));
    let file = File::create(&model_path).map_err(io_err(&model_path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &saved)?;
    writer.flush().map_err(io_err(&model_path))?;

    let vocab_path = PathBuf::from(format!("{prefix}.vocab"));
    let file = File::create(&vocab_path).map_err(io_err(&vocab_path))?;
    let mut writer = BufWriter::new(file);
    for piece in &model.pieces {
        if spec.vocabulary_output_piece_score {
            writeln!(writer, "{}\t{}", piece.surface, piece.score)
                .map_err(io_err(&vocab_path))?;
        } else {
            writeln!(writer, "{}", piece.surface).map_err(io_err(&vocab_path))?;
        }
    }
    writer.flush().map_err(io_err(&vocab_path))?;
    Ok(())
}

/// Load a model previously written by [`save_model`].
pub fn load_model(path: &Path) -> Result<TrainedModel> {
    let file = File::open(path).map_err(io_err(path))?;
    let saved: SavedModel = serde_json::from_reader(BufReader::new(file))?;
    if saved.version != MODEL_FORMAT_VERSION {
        return Err(TrainerError::InvalidVocab(format!(
            "unsupported model version {}",
            saved.version
        )));
    }
    if saved.model_type != ModelType::Unigram {
        return Err(TrainerError::InvalidVocab(format!(
            "unsupported model type {:?}",
            saved.model_type
        )));
    }
    Ok(TrainedModel {
        pieces: saved.pieces,
        normalizer: saved.normalizer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use unipiece_core::PieceKind;

    fn sample_model() -> TrainedModel {
        TrainedModel {
            pieces: vec![
                Piece::pinned("<unk>", PieceKind::Unknown),
                Piece::normal("▁a", -1.2),
                Piece::normal("b", -2.3),
            ],
            normalizer: NormalizerSpec::default(),
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = std::env::temp_dir().join("unipiece-persist-test");
        std::fs::create_dir_all(&dir).unwrap();
        let prefix = dir.join("m").to_string_lossy().into_owned();

        let model = sample_model();
        save_model(&model, &TrainerSpec::default(), &prefix).unwrap();

        let loaded = load_model(Path::new(&format!("{prefix}.model.json"))).unwrap();
        assert_eq!(loaded.pieces.len(), model.pieces.len());
        for (a, b) in loaded.pieces.iter().zip(&model.pieces) {
            assert_eq!(a.surface, b.surface);
            assert_eq!(a.kind, b.kind);
            assert_eq!(a.score.to_bits(), b.score.to_bits());
        }

        let vocab = std::fs::read_to_string(format!("{prefix}.vocab")).unwrap();
        assert!(vocab.lines().next().unwrap().starts_with("<unk>\t"));
        assert_eq!(vocab.lines().count(), 3);
    }

    #[test]
    fn test_vocab_without_scores() {
        let dir = std::env::temp_dir().join("unipiece-persist-test-noscore");
        std::fs::create_dir_all(&dir).unwrap();
        let prefix = dir.join("m").to_string_lossy().into_owned();

        let spec = TrainerSpec {
            vocabulary_output_piece_score: false,
            ..Default::default()
        };
        save_model(&sample_model(), &spec, &prefix).unwrap();
        let vocab = std::fs::read_to_string(format!("{prefix}.vocab")).unwrap();
        assert_eq!(vocab.lines().next().unwrap(), "<unk>");
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = load_model(Path::new("/nonexistent/unipiece.model.json"));
        assert!(matches!(result, Err(TrainerError::Io { .. })));
    }
}
