use std::{fs, path::Path};

use serde::Serialize;
use tensorflow::{
    Graph, ImportGraphDefOptions, Session, SessionOptions, SessionRunArgs, Status, Tensor,
};
use thiserror::Error;

use crate::{
    labels::{label_for_index, IndexOutOfRange, Label},
    preprocess::ImageTensor,
};

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("tensorflow: {0}")]
    Tensorflow(String),
    #[error("operation '{0}' not found in graph")]
    MissingOperation(String),
    #[error("model produced {actual} scores but {expected} labels are known")]
    OutputWidth { expected: usize, actual: usize },
    #[error("model produced a non-finite score at index {0}")]
    NonFinite(usize),
    #[error(transparent)]
    Label(#[from] IndexOutOfRange),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read model file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to import graph: {0}")]
    Tensorflow(String),
    #[error("operation '{0}' not found in graph")]
    MissingOperation(String),
}

// Status wraps a raw pointer; only its message crosses threads.
impl From<Status> for InferenceError {
    fn from(status: Status) -> Self {
        InferenceError::Tensorflow(status.to_string())
    }
}

impl From<Status> for LoadError {
    fn from(status: Status) -> Self {
        LoadError::Tensorflow(status.to_string())
    }
}

/// A loaded model. Shared read-only across requests.
pub trait Classifier: Send + Sync {
    /// Returns one score per label, in catalog order.
    fn infer(&self, tensor: &ImageTensor) -> Result<Vec<f32>, InferenceError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub label: Label,
    pub confidence: f32,
    pub all: Vec<f32>,
    pub recommendations: &'static [&'static str],
}

/// Picks the highest score; ties go to the lowest index.
pub fn select_prediction(distribution: Vec<f32>) -> Result<Prediction, InferenceError> {
    if distribution.len() != Label::COUNT {
        return Err(InferenceError::OutputWidth {
            expected: Label::COUNT,
            actual: distribution.len(),
        });
    }

    if let Some(i) = distribution.iter().position(|score| !score.is_finite()) {
        return Err(InferenceError::NonFinite(i));
    }

    let mut best = 0;
    for (i, &score) in distribution.iter().enumerate().skip(1) {
        if score > distribution[best] {
            best = i;
        }
    }

    let label = label_for_index(best)?;
    Ok(Prediction {
        label,
        confidence: distribution[best],
        recommendations: label.recommendations(),
        all: distribution,
    })
}

/// Frozen TensorFlow graph taking `[1, 224, 224, 3]` f32 input.
pub struct TfModel {
    session: Session,
    graph: Graph,
    input_op: String,
    output_op: String,
}

impl TfModel {
    pub fn load(
        model_path: impl AsRef<Path>,
        input_op: &str,
        output_op: &str,
    ) -> Result<Self, LoadError> {
        let model_bytes = fs::read(model_path)?;

        let mut graph = Graph::new();
        graph.import_graph_def(&model_bytes, &ImportGraphDefOptions::new())?;

        for name in [input_op, output_op] {
            if graph.operation_by_name(name)?.is_none() {
                return Err(LoadError::MissingOperation(name.to_string()));
            }
        }

        let session = Session::new(&SessionOptions::new(), &graph)?;

        Ok(TfModel {
            session,
            graph,
            input_op: input_op.to_string(),
            output_op: output_op.to_string(),
        })
    }

    fn operation(&self, name: &str) -> Result<tensorflow::Operation, InferenceError> {
        self.graph
            .operation_by_name(name)?
            .ok_or_else(|| InferenceError::MissingOperation(name.to_string()))
    }
}

impl Classifier for TfModel {
    fn infer(&self, tensor: &ImageTensor) -> Result<Vec<f32>, InferenceError> {
        let input_tensor = Tensor::<f32>::new(&ImageTensor::SHAPE).with_values(tensor.as_slice())?;

        let input_operation = self.operation(&self.input_op)?;
        let output_operation = self.operation(&self.output_op)?;

        let mut args = SessionRunArgs::new();
        args.add_feed(&input_operation, 0, &input_tensor);
        let output_token = args.request_fetch(&output_operation, 0);
        self.session.run(&mut args)?;

        let output_tensor: Tensor<f32> = args.fetch(output_token)?;
        Ok(output_tensor.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spread(weights: &[(usize, f32)]) -> Vec<f32> {
        let mut distribution = vec![0.0; Label::COUNT];
        for &(i, w) in weights {
            distribution[i] = w;
        }
        distribution
    }

    #[test]
    fn selects_highest_score() {
        let prediction = select_prediction(spread(&[(2, 0.1), (8, 0.85), (10, 0.05)])).unwrap();
        assert_eq!(prediction.label, Label::Healthy);
        assert_eq!(prediction.confidence, 0.85);
        assert_eq!(prediction.all.len(), Label::COUNT);
        assert_eq!(prediction.recommendations, Label::Healthy.recommendations());
    }

    #[test]
    fn ties_resolve_to_lowest_index() {
        let prediction = select_prediction(spread(&[(0, 0.4), (1, 0.4), (2, 0.2)])).unwrap();
        assert_eq!(prediction.label, Label::Anthracnose);
        assert_eq!(prediction.confidence, 0.4);

        let prediction = select_prediction(spread(&[(3, 0.3), (7, 0.3), (9, 0.3)])).unwrap();
        assert_eq!(prediction.label, Label::Canker);
    }

    #[test]
    fn last_label_is_reachable() {
        let prediction = select_prediction(spread(&[(10, 0.9)])).unwrap();
        assert_eq!(prediction.label, Label::SpiderMites);
    }

    #[test]
    fn mismatched_output_width_fails() {
        let err = select_prediction(vec![0.4, 0.4, 0.2]).unwrap_err();
        assert!(matches!(
            err,
            InferenceError::OutputWidth {
                expected: 11,
                actual: 3
            }
        ));
        assert!(select_prediction(Vec::new()).is_err());
        assert!(select_prediction(vec![0.0; 12]).is_err());
    }

    #[test]
    fn non_finite_scores_fail() {
        let mut distribution = spread(&[(4, 0.7)]);
        distribution[0] = f32::NAN;
        assert!(matches!(
            select_prediction(distribution).unwrap_err(),
            InferenceError::NonFinite(0)
        ));

        let mut distribution = spread(&[(4, 0.7)]);
        distribution[9] = f32::INFINITY;
        assert!(matches!(
            select_prediction(distribution).unwrap_err(),
            InferenceError::NonFinite(9)
        ));
    }

    #[test]
    fn missing_model_file_fails_to_load() {
        let err = TfModel::load("./does/not/exist.pb", "x", "Identity")
            .err()
            .unwrap();
        assert!(matches!(err, LoadError::Io(_)));
    }
}
