//! Permutation feature importance.
//!
//! The importance of a feature group is the drop in validation score when the
//! group's columns are shuffled, which breaks their relationship with the
//! labels while keeping their marginal distribution.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use sluice_graph::ModelInputs;

use crate::config::CascadeConfig;
use crate::error::{BoxedError, CascadeError, CascadeResult};
use crate::matrix::{CsrMatrix, FeatureMatrix};
use crate::score::FeatureScores;

/// Tracing target for importance estimation.
pub const TRACING_TARGET: &str = "sluice_cascade::importance";

/// Trains, applies and scores the model a pipeline feeds.
pub trait CascadeTrainer {
    /// Trained model.
    type Model;

    /// Fits a model on `x` and `y`.
    fn train(&self, x: &FeatureMatrix, y: &[f64]) -> Result<Self::Model, BoxedError>;

    /// Predicts one value per row of `x`.
    fn predict(&self, model: &Self::Model, x: &FeatureMatrix) -> Result<Vec<f64>, BoxedError>;

    /// Scores predictions against labels; higher is better.
    fn score(&self, y: &[f64], predictions: &[f64]) -> Result<f64, BoxedError>;
}

/// Features and labels the training pipeline is fitted on.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingData {
    x: FeatureMatrix,
    y: Vec<f64>,
}

impl TrainingData {
    /// Pairs features with labels.
    pub fn new(x: impl Into<FeatureMatrix>, y: Vec<f64>) -> CascadeResult<Self> {
        let x = x.into();
        if x.n_rows() != y.len() {
            return Err(CascadeError::MatrixShape(format!(
                "{} feature rows but {} labels",
                x.n_rows(),
                y.len()
            )));
        }
        Ok(Self { x, y })
    }

    /// Flat feature matrix, laid out as the model's input attribution says.
    pub fn x(&self) -> &FeatureMatrix {
        &self.x
    }

    /// One label per row.
    pub fn y(&self) -> &[f64] {
        &self.y
    }
}

/// Estimates the importance of every feature group in `inputs`.
///
/// Rows are split once into training and validation sets with a seeded
/// shuffle; the validation set holds `ceil(validation_fraction * rows)` rows.
/// A single baseline model is trained, then each group's columns are shuffled
/// in a copy of the validation features and the importance is recorded as
/// `baseline_score - shuffled_score`.
pub fn feature_importances<T: CascadeTrainer>(
    data: &TrainingData,
    trainer: &T,
    inputs: &ModelInputs,
    config: &CascadeConfig,
) -> CascadeResult<FeatureScores> {
    let (x, y) = (data.x(), data.y());
    let rows = x.n_rows();
    let valid_rows = (config.validation_fraction * rows as f64).ceil() as usize;
    if valid_rows == 0 || valid_rows >= rows {
        return Err(CascadeError::InsufficientRows { rows });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut order: Vec<usize> = (0..rows).collect();
    order.shuffle(&mut rng);
    let (valid_index, train_index) = order.split_at(valid_rows);

    let train_x = x.select_rows(train_index)?;
    let train_y: Vec<f64> = train_index.iter().map(|&row| y[row]).collect();
    let valid_x = x.select_rows(valid_index)?;
    let valid_y: Vec<f64> = valid_index.iter().map(|&row| y[row]).collect();

    let model = trainer
        .train(&train_x, &train_y)
        .map_err(CascadeError::Training)?;
    let base_predictions = trainer
        .predict(&model, &valid_x)
        .map_err(CascadeError::Training)?;
    let base_score = trainer
        .score(&valid_y, &base_predictions)
        .map_err(CascadeError::Training)?;
    tracing::debug!(
        target: TRACING_TARGET,
        train_rows = train_index.len(),
        valid_rows,
        base_score,
        "baseline model scored",
    );

    let dense_valid = valid_x.to_dense();
    let mut importances = FeatureScores::new();
    for (node, indices) in inputs.groups() {
        let mut shuffled = dense_valid.clone();
        for column in indices.columns() {
            shuffled.shuffle_column(column, &mut rng)?;
        }
        let shuffled = if valid_x.is_sparse() {
            FeatureMatrix::Sparse(CsrMatrix::from_dense(&shuffled))
        } else {
            FeatureMatrix::Dense(shuffled)
        };

        let predictions = trainer
            .predict(&model, &shuffled)
            .map_err(CascadeError::Training)?;
        let score = trainer
            .score(&valid_y, &predictions)
            .map_err(CascadeError::Training)?;
        let importance = base_score - score;
        tracing::debug!(
            target: TRACING_TARGET,
            node = %node,
            indices = %indices,
            importance,
            "feature group scored",
        );
        importances.insert(indices, importance);
    }

    Ok(importances)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use sluice_graph::{FeatureIndices, InputSlot, NodeId};

    use super::*;
    use crate::matrix::DenseMatrix;

    /// Predicts the first column and scores by accuracy.
    struct FirstColumn {
        trained: Cell<usize>,
    }

    impl CascadeTrainer for FirstColumn {
        type Model = ();

        fn train(&self, _x: &FeatureMatrix, _y: &[f64]) -> Result<(), BoxedError> {
            self.trained.set(self.trained.get() + 1);
            Ok(())
        }

        fn predict(&self, _model: &(), x: &FeatureMatrix) -> Result<Vec<f64>, BoxedError> {
            let dense = x.to_dense();
            Ok((0..dense.n_rows()).map(|row| dense.row(row)[0]).collect())
        }

        fn score(&self, y: &[f64], predictions: &[f64]) -> Result<f64, BoxedError> {
            let hits = y.iter().zip(predictions).filter(|(a, b)| a == b).count();
            Ok(hits as f64 / y.len() as f64)
        }
    }

    fn data(sparse: bool) -> TrainingData {
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|row| vec![(row % 2) as f64, 0.5, (row % 3) as f64])
            .collect();
        let y = rows.iter().map(|row| row[0]).collect();
        let dense = DenseMatrix::from_rows(&rows).unwrap();
        if sparse {
            TrainingData::new(CsrMatrix::from_dense(&dense), y).unwrap()
        } else {
            TrainingData::new(dense, y).unwrap()
        }
    }

    fn inputs() -> ModelInputs {
        ModelInputs::new([
            (NodeId::new(0), InputSlot::Range { start: 0, end: 1 }),
            (NodeId::new(1), InputSlot::Named(vec![("noise".into(), 1), ("mod".into(), 2)])),
        ])
    }

    #[test]
    fn informative_group_dominates() {
        let trainer = FirstColumn {
            trained: Cell::new(0),
        };
        let scores =
            feature_importances(&data(false), &trainer, &inputs(), &CascadeConfig::default())
                .unwrap();

        let informative = scores.get(&FeatureIndices::Range(0, 1)).unwrap();
        let noise = scores.get(&FeatureIndices::Columns(vec![1, 2])).unwrap();
        assert!(informative > 0.0);
        assert_eq!(noise, 0.0);
        assert_eq!(trainer.trained.get(), 1);
    }

    #[test]
    fn sparse_and_dense_inputs_agree() {
        let trainer = FirstColumn {
            trained: Cell::new(0),
        };
        let config = CascadeConfig::default();
        let dense = feature_importances(&data(false), &trainer, &inputs(), &config).unwrap();
        let sparse = feature_importances(&data(true), &trainer, &inputs(), &config).unwrap();
        assert_eq!(dense, sparse);
    }

    #[test]
    fn same_seed_same_scores() {
        let trainer = FirstColumn {
            trained: Cell::new(0),
        };
        let config = CascadeConfig::default();
        let first = feature_importances(&data(false), &trainer, &inputs(), &config).unwrap();
        let second = feature_importances(&data(false), &trainer, &inputs(), &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn labels_must_match_rows() {
        let dense = DenseMatrix::from_rows(&[vec![1.0], vec![0.0]]).unwrap();
        let result = TrainingData::new(dense.clone(), vec![1.0]);
        assert!(matches!(result, Err(CascadeError::MatrixShape(_))));

        let data = TrainingData::new(dense, vec![1.0, 0.0]).unwrap();
        assert_eq!(data.x().n_rows(), data.y().len());
    }

    #[test]
    fn too_few_rows_fail() {
        let trainer = FirstColumn {
            trained: Cell::new(0),
        };
        let one_row = TrainingData::new(DenseMatrix::from_rows(&[vec![1.0]]).unwrap(), vec![1.0])
            .unwrap();
        let result = feature_importances(&one_row, &trainer, &inputs(), &CascadeConfig::default());
        assert!(matches!(result, Err(CascadeError::InsufficientRows { rows: 1 })));
    }
}
