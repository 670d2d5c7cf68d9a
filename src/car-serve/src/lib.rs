//! Core library for the car model classification service.
//!
//! Decodes an uploaded image, preprocesses it into the tensor shape a
//! frozen 7-class network expects, runs one forward pass and maps the
//! arg-max index through an ordered label list. Transport adapters
//! (HTTP server, chat webhook, CLI) live in sibling crates.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use image::DynamicImage;
use log::{debug, info};
use serde::{Deserialize, Serialize};

pub mod error;
pub mod labels;
pub mod model;
pub mod preprocess;

pub use error::ClassifyError;
pub use labels::LabelSet;
pub use model::SavedModel;

pub struct Timer {
    name: String,
    tstamp: Option<DateTime<Utc>>,
}

impl Timer {
    pub fn new_start(name: &str) -> Self {
        info!("{}: starting", name);
        Timer {
            name: name.to_owned(),
            tstamp: Some(Utc::now()),
        }
    }

    /// Stop the timer, logging the elapsed time.
    pub fn stop(&mut self) -> Duration {
        match self.tstamp.take() {
            None => {
                debug!("{}: not running!", self.name);
                Duration::zero()
            }
            Some(tstamp) => {
                let d = Utc::now() - tstamp;
                info!("{} duration: {} msec", self.name, d.num_milliseconds());
                d
            }
        }
    }
}

/// Result of one classification: the winning class name only. No
/// top-k, no confidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub class_name: String,
}

/// The shared classifier: frozen model plus its ordered label set.
///
/// Immutable after construction; safe to share across request handlers
/// behind an `Arc` without further synchronization.
pub struct ImageClassifier {
    model: SavedModel,
    labels: LabelSet,
}

impl ImageClassifier {
    /// Load the model and validate that its output cardinality matches
    /// the label set. Any failure here means the process cannot serve.
    pub fn new(export_dir: &Path, labels: LabelSet) -> Result<Self, ClassifyError> {
        let model = SavedModel::load(export_dir)?;

        // Warm-up pass on a zero tensor. Catches a weights/label-set
        // mismatch at startup instead of on the first request.
        let scores = model.forward(&vec![0f32; preprocess::input_len()])?;
        if scores.len() != labels.len() {
            return Err(ClassifyError::ShapeMismatch {
                expected: labels.len(),
                got: scores.len(),
            });
        }

        info!(
            "classifier ready: {} classes, model at {}",
            labels.len(),
            export_dir.display()
        );

        Ok(ImageClassifier { model, labels })
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Classify a decoded image: preprocess, forward pass, arg-max,
    /// label lookup. Deterministic for fixed weights.
    pub fn classify(&self, image: &DynamicImage) -> Result<Prediction, ClassifyError> {
        let mut t = Timer::new_start("Preprocessing image");
        let tensor = preprocess::transform_image(image);
        t.stop();

        let scores = self.model.forward(&tensor)?;
        let class_name = self.labels.best_match(&scores)?;

        debug!("predicted class: {}", class_name);

        Ok(Prediction {
            class_name: class_name.to_owned(),
        })
    }

    /// Classify raw request bytes. Undecodable bytes surface as a
    /// `Decode` error for the caller to report; nothing here panics.
    pub fn classify_bytes(&self, data: &[u8]) -> Result<Prediction, ClassifyError> {
        let mut t = Timer::new_start("Decoding image");
        let image = preprocess::decode_image(data)?;
        t.stop();

        self.classify(&image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prediction_serializes_to_class_name_object() {
        let prediction = Prediction {
            class_name: "プリウス".to_owned(),
        };
        let json = serde_json::to_value(&prediction).unwrap();
        assert_eq!(json, serde_json::json!({ "class_name": "プリウス" }));
    }

    #[test]
    fn timer_stop_without_start_is_zero() {
        let mut t = Timer {
            name: "idle".to_owned(),
            tstamp: None,
        };
        assert_eq!(t.stop(), Duration::zero());
    }
}
