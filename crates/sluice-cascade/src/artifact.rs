//! Persisted record connecting the training and serving rewrites.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use sluice_graph::ModelInputs;
use strum::{AsRefStr, IntoStaticStr};

use crate::error::{CascadeError, CascadeResult};
use crate::score::FeatureScores;

/// Tracing target for artifact persistence.
pub const TRACING_TARGET: &str = "sluice_cascade::artifact";

/// Slot a trained model is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ModelSlot {
    /// Model trained on every feature.
    BigModel,
    /// Model trained on the important tier only.
    SmallModel,
}

/// Importances, costs and trained models of one cascade.
///
/// The training rewrite records importances and costs directly; the models
/// are stored by the rewritten program when it runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CascadeArtifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    feature_importances: Option<FeatureScores>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    indices_to_costs_map: Option<FeatureScores>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    big_model: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    small_model: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trained_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    budget_fraction: Option<f64>,
}

impl CascadeArtifact {
    /// Creates an empty artifact.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the scores computed by a training rewrite.
    pub fn record_scores(
        &mut self,
        importances: FeatureScores,
        costs: FeatureScores,
        budget_fraction: f64,
    ) {
        self.feature_importances = Some(importances);
        self.indices_to_costs_map = Some(costs);
        self.budget_fraction = Some(budget_fraction);
        self.trained_at = Some(Timestamp::now());
    }

    /// Stores a trained model.
    pub fn store_model(&mut self, slot: ModelSlot, model: serde_json::Value) {
        match slot {
            ModelSlot::BigModel => self.big_model = Some(model),
            ModelSlot::SmallModel => self.small_model = Some(model),
        }
    }

    /// Permutation importance per feature group.
    pub fn feature_importances(&self) -> CascadeResult<&FeatureScores> {
        self.feature_importances
            .as_ref()
            .ok_or(CascadeError::MissingArtifactKey("feature_importances"))
    }

    /// Per-row cost per feature group.
    pub fn indices_to_costs(&self) -> CascadeResult<&FeatureScores> {
        self.indices_to_costs_map
            .as_ref()
            .ok_or(CascadeError::MissingArtifactKey("indices_to_costs_map"))
    }

    /// A stored model.
    pub fn model(&self, slot: ModelSlot) -> CascadeResult<&serde_json::Value> {
        let model = match slot {
            ModelSlot::BigModel => self.big_model.as_ref(),
            ModelSlot::SmallModel => self.small_model.as_ref(),
        };
        model.ok_or(CascadeError::MissingArtifactKey(slot.into()))
    }

    /// When the scores were recorded.
    pub fn trained_at(&self) -> Option<Timestamp> {
        self.trained_at
    }

    /// Budget fraction in effect when the scores were recorded.
    pub fn budget_fraction(&self) -> Option<f64> {
        self.budget_fraction
    }

    /// Checks that the artifact can drive a serving rewrite.
    pub fn validate_for_serving(&self) -> CascadeResult<()> {
        self.feature_importances()?;
        self.indices_to_costs()?;
        self.model(ModelSlot::BigModel)?;
        self.model(ModelSlot::SmallModel)?;
        Ok(())
    }

    /// Checks that every group of `inputs` has an importance and a cost.
    pub fn validate_inputs(&self, inputs: &ModelInputs) -> CascadeResult<()> {
        let importances = self.feature_importances()?;
        let costs = self.indices_to_costs()?;
        for (_, indices) in inputs.groups() {
            if importances.get(&indices).is_none() || costs.get(&indices).is_none() {
                return Err(CascadeError::MissingFeatureGroup { indices });
            }
        }
        Ok(())
    }

    /// Writes the artifact to `path` as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> CascadeResult<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        tracing::info!(target: TRACING_TARGET, path = %path.display(), "cascade artifact saved");
        Ok(())
    }

    /// Reads an artifact from `path`.
    pub fn load(path: impl AsRef<Path>) -> CascadeResult<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let artifact: Self = serde_json::from_reader(reader)?;
        tracing::info!(
            target: TRACING_TARGET,
            path = %path.display(),
            groups = artifact.feature_importances.as_ref().map_or(0, FeatureScores::len),
            "cascade artifact loaded",
        );
        Ok(artifact)
    }
}
