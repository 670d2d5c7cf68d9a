use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the classification core.
///
/// `Decode` is the only per-request kind; the rest are startup
/// preconditions and must prevent the process from serving.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("could not load model from '{path}': {source}")]
    ModelLoad {
        path: PathBuf,
        source: tensorflow::Status,
    },

    #[error("model produced {got} scores but the label set has {expected} entries")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("could not read labels from '{path}': {source}")]
    Labels { path: PathBuf, source: io::Error },

    #[error("label set is empty")]
    EmptyLabels,

    #[error("inference failed: {0}")]
    Inference(#[from] tensorflow::Status),
}
