use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::ClassifyError;

/// Index of the largest score. Ties go to the lowest index.
pub fn arg_max(scores: &[f32]) -> usize {
    let mut best = 0;
    for (idx, score) in scores.iter().enumerate().skip(1) {
        if *score > scores[best] {
            best = idx;
        }
    }
    best
}

/// Ordered, fixed list of class names. The model's output index is a
/// direct offset into this list, so order is part of the contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    pub fn new(labels: Vec<String>) -> Result<Self, ClassifyError> {
        if labels.is_empty() {
            return Err(ClassifyError::EmptyLabels);
        }
        Ok(LabelSet { labels })
    }

    /// Read labels from a text file, one class name per line.
    /// Blank lines are skipped; surrounding whitespace is trimmed.
    pub fn from_file(path: &Path) -> Result<Self, ClassifyError> {
        let file = File::open(path).map_err(|source| ClassifyError::Labels {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file), path)
    }

    fn from_reader<R: BufRead>(reader: R, path: &Path) -> Result<Self, ClassifyError> {
        let mut labels = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(|source| ClassifyError::Labels {
                path: path.to_path_buf(),
                source,
            })?;
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                labels.push(trimmed.to_owned());
            }
        }
        Self::new(labels)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// Map a score vector to its winning label. A vector whose length
    /// differs from the label count is a configuration defect.
    pub fn best_match(&self, scores: &[f32]) -> Result<&str, ClassifyError> {
        if scores.len() != self.labels.len() {
            return Err(ClassifyError::ShapeMismatch {
                expected: self.labels.len(),
                got: scores.len(),
            });
        }
        Ok(&self.labels[arg_max(scores)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn toyota_labels() -> LabelSet {
        LabelSet::new(
            [
                "86",
                "ハリアー",
                "ハイエース",
                "ノア",
                "プリウス",
                "シエンタ",
                "ステップワゴン",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        )
        .unwrap()
    }

    #[test]
    fn arg_max_picks_largest() {
        assert_eq!(arg_max(&[0.1, 0.7, 0.2]), 1);
        assert_eq!(arg_max(&[3.0, -1.0, 2.0]), 0);
    }

    #[test]
    fn arg_max_tie_goes_to_lowest_index() {
        assert_eq!(arg_max(&[0.5, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0]), 0);
        assert_eq!(arg_max(&[0.0, 0.4, 0.4]), 1);
    }

    #[test]
    fn tie_maps_to_first_label() {
        let labels = toyota_labels();
        let scores = [0.5, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0];
        assert_eq!(labels.best_match(&scores).unwrap(), "86");
    }

    #[test]
    fn best_match_uses_index_as_offset() {
        let labels = toyota_labels();
        let scores = [0.0, 0.1, 0.0, 0.9, 0.2, 0.0, 0.1];
        assert_eq!(labels.best_match(&scores).unwrap(), "ノア");
    }

    #[test]
    fn cardinality_mismatch_is_an_error() {
        let labels = toyota_labels();
        let scores = [0.1, 0.2, 0.3];
        match labels.best_match(&scores) {
            Err(ClassifyError::ShapeMismatch { expected, got }) => {
                assert_eq!(expected, 7);
                assert_eq!(got, 3);
            }
            other => panic!("expected shape mismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn parses_one_label_per_line() {
        let input = "86\nハリアー\n\n  プリウス  \n";
        let labels = LabelSet::from_reader(Cursor::new(input), &PathBuf::from("test")).unwrap();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels.get(0), Some("86"));
        assert_eq!(labels.get(2), Some("プリウス"));
    }

    #[test]
    fn empty_label_file_is_rejected() {
        let result = LabelSet::from_reader(Cursor::new("\n\n"), &PathBuf::from("test"));
        assert!(matches!(result, Err(ClassifyError::EmptyLabels)));
    }
}
