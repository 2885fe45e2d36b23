//! Prediction service
//!
//! Routes a batch to the detection model, the classification model or both,
//! and shapes the output for the transport layer.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::batch::Batch;
use crate::error::{PredictionError, Result};
use crate::model::{Probabilities, ScoringModel};

/// Per-row output of the combined mode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinedPrediction {
    pub attack_probability: f64,
    pub attack_category: String,
    pub category_probability: f64,
    pub score: f64,
}

/// Prediction output, serialized without a wrapper tag
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Predictions {
    Scalars(Vec<f64>),
    /// Hard labels of a model whose classes are all integers
    ClassIds(Vec<i64>),
    Labels(Vec<String>),
    Records(Vec<CombinedPrediction>),
    /// Column name to per-row values
    Columns(BTreeMap<String, Vec<f64>>),
}

impl Predictions {
    pub fn len(&self) -> usize {
        match self {
            Predictions::Scalars(v) => v.len(),
            Predictions::ClassIds(v) => v.len(),
            Predictions::Labels(v) => v.len(),
            Predictions::Records(v) => v.len(),
            Predictions::Columns(map) => map.values().next().map(Vec::len).unwrap_or(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Prediction modes, used for routing and metric labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Detection,
    DetectionProba,
    Classification,
    ClassificationProba,
    Combined,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Detection => "detection",
            Mode::DetectionProba => "detection_proba",
            Mode::Classification => "classification",
            Mode::ClassificationProba => "classification_proba",
            Mode::Combined => "combined",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PredictionService {
    detection: Option<Arc<ScoringModel>>,
    classification: Option<Arc<ScoringModel>>,
}

impl PredictionService {
    pub fn new(
        detection: Option<Arc<ScoringModel>>,
        classification: Option<Arc<ScoringModel>>,
    ) -> Self {
        Self {
            detection,
            classification,
        }
    }

    pub fn has_detection(&self) -> bool {
        self.detection.is_some()
    }

    pub fn has_classification(&self) -> bool {
        self.classification.is_some()
    }

    /// Dispatch a batch to the given mode
    pub fn predict(&self, mode: Mode, batch: &Batch) -> Result<Predictions> {
        debug!(mode = mode.as_str(), rows = batch.num_rows(), "Dispatching batch");
        match mode {
            Mode::Detection => self.predict_detection(batch),
            Mode::DetectionProba => self.predict_detection_proba(batch),
            Mode::Classification => self.predict_classification(batch),
            Mode::ClassificationProba => self.predict_classification_proba(batch),
            Mode::Combined => self.predict_combined(batch),
        }
    }

    pub fn predict_detection(&self, batch: &Batch) -> Result<Predictions> {
        let model = self.detection()?;
        Ok(hard_labels(model, model.predict(batch)?))
    }

    pub fn predict_detection_proba(&self, batch: &Batch) -> Result<Predictions> {
        Ok(Predictions::Scalars(self.attack_probabilities(batch)?))
    }

    pub fn predict_classification(&self, batch: &Batch) -> Result<Predictions> {
        let model = self.classification()?;
        Ok(hard_labels(model, model.predict(batch)?))
    }

    pub fn predict_classification_proba(&self, batch: &Batch) -> Result<Predictions> {
        let model = self.classification()?;
        match model.predict_proba(batch)? {
            Probabilities::Multiclass { classes, rows } => {
                let mut columns: BTreeMap<String, Vec<f64>> = classes
                    .iter()
                    .map(|c| (c.clone(), Vec::with_capacity(rows.len())))
                    .collect();
                for row in &rows {
                    for (class, p) in classes.iter().zip(row) {
                        if let Some(column) = columns.get_mut(class) {
                            column.push(*p);
                        }
                    }
                }
                Ok(Predictions::Columns(columns))
            }
            Probabilities::Binary(positive) => {
                // a binary classifier still answers per class
                let negative = positive.iter().map(|p| 1.0 - p).collect();
                let classes = model.classes();
                let mut columns = BTreeMap::new();
                columns.insert(classes[0].clone(), negative);
                columns.insert(classes[1].clone(), positive);
                Ok(Predictions::Columns(columns))
            }
        }
    }

    /// Attack probability times the probability of the predicted category
    pub fn predict_combined(&self, batch: &Batch) -> Result<Predictions> {
        let attack = self.attack_probabilities(batch)?;
        let categories = self.classification()?.class_scores(batch)?;

        let category_probs: Vec<f64> = categories.iter().map(|c| c.probability).collect();
        let scores = combine_scores(&attack, &category_probs)?;

        let records = attack
            .into_iter()
            .zip(categories)
            .zip(scores)
            .map(|((attack_probability, category), score)| CombinedPrediction {
                attack_probability,
                attack_category: category.label,
                category_probability: category.probability,
                score,
            })
            .collect();

        Ok(Predictions::Records(records))
    }

    fn attack_probabilities(&self, batch: &Batch) -> Result<Vec<f64>> {
        match self.detection()?.predict_proba(batch)? {
            Probabilities::Binary(p) => Ok(p),
            Probabilities::Multiclass { .. } => Err(PredictionError::Scoring(
                "detection model must be binary".to_string(),
            )),
        }
    }

    fn detection(&self) -> Result<&ScoringModel> {
        self.detection
            .as_deref()
            .ok_or_else(|| PredictionError::ModelUnavailable("detection".to_string()))
    }

    fn classification(&self) -> Result<&ScoringModel> {
        self.classification
            .as_deref()
            .ok_or_else(|| PredictionError::ModelUnavailable("classification".to_string()))
    }
}

/// Integer ids when every class label of the model is an integer, text otherwise
fn hard_labels(model: &ScoringModel, labels: Vec<String>) -> Predictions {
    let numeric = model.classes().iter().all(|c| c.parse::<i64>().is_ok());
    if numeric {
        let ids: std::result::Result<Vec<i64>, _> = labels.iter().map(|l| l.parse::<i64>()).collect();
        if let Ok(ids) = ids {
            return Predictions::ClassIds(ids);
        }
    }
    Predictions::Labels(labels)
}

/// Elementwise product of detection and classification probabilities
pub fn combine_scores(detection: &[f64], classification: &[f64]) -> Result<Vec<f64>> {
    if detection.len() != classification.len() {
        return Err(PredictionError::Alignment {
            detection: detection.len(),
            classification: classification.len(),
        });
    }

    Ok(detection
        .iter()
        .zip(classification)
        .map(|(d, c)| d * c)
        .collect())
}
