use std::path::{Path, PathBuf};

use log::info;
use tensorflow::{Graph, SavedModelBundle, SessionOptions, SessionRunArgs, Tensor};

use crate::error::ClassifyError;
use crate::preprocess::{input_len, INPUT_SHAPE};
use crate::Timer;

const INPUT_OP: &str = "serving_default_input_1";
const OUTPUT_OP: &str = "StatefulPartitionedCall";

/// A frozen SavedModel bundle. Read-only after load; one forward pass
/// per call, no batching.
pub struct SavedModel {
    graph: Graph,
    session: tensorflow::Session,
    export_dir: PathBuf,
}

impl SavedModel {
    /// Load the model artifact from its export directory. A missing or
    /// unreadable artifact is fatal at startup.
    pub fn load(export_dir: &Path) -> Result<Self, ClassifyError> {
        let mut t = Timer::new_start("Loading saved model");

        let mut graph = Graph::new();
        let session =
            SavedModelBundle::load(&SessionOptions::new(), &["serve"], &mut graph, export_dir)
                .map_err(|source| ClassifyError::ModelLoad {
                    path: export_dir.to_path_buf(),
                    source,
                })?
                .session;

        t.stop();
        info!("model loaded from {}", export_dir.display());

        Ok(SavedModel {
            graph,
            session,
            export_dir: export_dir.to_path_buf(),
        })
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    /// Run one forward pass over a preprocessed (1, 3, 224, 224)
    /// tensor and return the raw score vector.
    pub fn forward(&self, input: &[f32]) -> Result<Vec<f32>, ClassifyError> {
        debug_assert_eq!(input.len(), input_len());

        let mut t = Timer::new_start("Running session");

        let input_tensor = Tensor::new(&INPUT_SHAPE).with_values(input)?;

        let mut args = SessionRunArgs::new();
        args.add_feed(
            &self.graph.operation_by_name_required(INPUT_OP)?,
            0,
            &input_tensor,
        );
        let fetch = args.request_fetch(&self.graph.operation_by_name_required(OUTPUT_OP)?, 0);

        self.session.run(&mut args)?;
        let output: Tensor<f32> = args.fetch(fetch)?;

        t.stop();

        Ok(output.iter().copied().collect())
    }
}
