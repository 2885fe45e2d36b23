//! Scoring model: a loaded tree ensemble behind its feature pipeline

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::batch::{Batch, ColumnValues};
use crate::catalog::CategoryCatalog;
use crate::error::{ModelError, PredictionError, Result};
use crate::gbdt::{FeatureKind, FeatureSpec, FeatureValue, Objective, TreeEnsemble};
use crate::pipeline::{FeaturePipeline, FeatureSchema};

/// Probability output of a model
#[derive(Debug, Clone, PartialEq)]
pub enum Probabilities {
    /// Positive-class probability per row
    Binary(Vec<f64>),
    /// Probability of every class per row, in `classes` order
    Multiclass {
        classes: Vec<String>,
        rows: Vec<Vec<f64>>,
    },
}

impl Probabilities {
    pub fn len(&self) -> usize {
        match self {
            Probabilities::Binary(p) => p.len(),
            Probabilities::Multiclass { rows, .. } => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Predicted label together with its probability
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassScore {
    pub label: String,
    pub probability: f64,
}

/// A loaded, immutable model safe to share across concurrent requests
#[derive(Debug)]
pub struct ScoringModel {
    name: String,
    ensemble: TreeEnsemble,
    pipeline: FeaturePipeline,
}

impl ScoringModel {
    /// Load an artifact from disk; its embedded feature list becomes the schema
    pub fn load<P: AsRef<Path>>(
        name: &str,
        path: P,
        catalog: Arc<CategoryCatalog>,
    ) -> std::result::Result<Self, ModelError> {
        let path = path.as_ref();
        let ensemble = TreeEnsemble::load_json(path)?;

        info!(
            model = name,
            path = %path.display(),
            features = ensemble.features.len(),
            trees = ensemble.num_trees(),
            classes = ensemble.classes.len(),
            "Model loaded"
        );

        Ok(Self::from_ensemble(name, ensemble, catalog))
    }

    pub fn from_ensemble(name: &str, ensemble: TreeEnsemble, catalog: Arc<CategoryCatalog>) -> Self {
        let schema = FeatureSchema::new(ensemble.feature_names());
        Self {
            name: name.to_string(),
            pipeline: FeaturePipeline::new(catalog, Some(schema)),
            ensemble,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> Option<&FeatureSchema> {
        self.pipeline.schema()
    }

    pub fn objective(&self) -> Objective {
        self.ensemble.objective
    }

    pub fn classes(&self) -> &[String] {
        &self.ensemble.classes
    }

    /// Hard class label per row
    pub fn predict(&self, batch: &Batch) -> Result<Vec<String>> {
        Ok(self
            .class_scores(batch)?
            .into_iter()
            .map(|score| score.label)
            .collect())
    }

    /// Positive-class probability for binary models, full distribution otherwise
    pub fn predict_proba(&self, batch: &Batch) -> Result<Probabilities> {
        let rows = self.probability_rows(batch)?;
        Ok(match self.ensemble.objective {
            Objective::Binary => Probabilities::Binary(rows.into_iter().map(|p| p[1]).collect()),
            Objective::Multiclass => Probabilities::Multiclass {
                classes: self.ensemble.classes.clone(),
                rows,
            },
        })
    }

    /// Most probable label and its probability per row
    pub fn class_scores(&self, batch: &Batch) -> Result<Vec<ClassScore>> {
        self.probability_rows(batch)?
            .into_iter()
            .map(|probs| -> Result<ClassScore> {
                let (index, probability) = probs
                    .iter()
                    .copied()
                    .enumerate()
                    // ties resolve to the lowest class index
                    .fold((0usize, f64::NEG_INFINITY), |best, (i, p)| {
                        if p > best.1 {
                            (i, p)
                        } else {
                            best
                        }
                    });
                let label = self.ensemble.classes.get(index).cloned().ok_or_else(|| {
                    PredictionError::Scoring(format!("{}: no class label for output {}", self.name, index))
                })?;
                Ok(ClassScore { label, probability })
            })
            .collect()
    }

    fn probability_rows(&self, batch: &Batch) -> Result<Vec<Vec<f64>>> {
        let processed = self.pipeline.process(batch)?;
        let rows = self.feature_rows(&processed)?;

        let probabilities = rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                self.ensemble.probabilities(row).map_err(|e| {
                    PredictionError::Scoring(format!("{}: row {}: {}", self.name, i, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if probabilities.len() != batch.num_rows() {
            return Err(PredictionError::Scoring(format!(
                "{}: {} predictions for {} rows",
                self.name,
                probabilities.len(),
                batch.num_rows()
            )));
        }

        debug!(model = %self.name, rows = probabilities.len(), "Batch scored");
        Ok(probabilities)
    }

    /// Row-major feature values in the ensemble's feature order
    fn feature_rows(&self, processed: &Batch) -> Result<Vec<Vec<FeatureValue>>> {
        let num_rows = processed.num_rows();
        let mut rows: Vec<Vec<FeatureValue>> = (0..num_rows)
            .map(|_| Vec::with_capacity(self.ensemble.features.len()))
            .collect();

        for FeatureSpec { name, kind } in &self.ensemble.features {
            let column = processed.column(name).ok_or_else(|| {
                PredictionError::Scoring(format!("{}: feature '{}' missing after preprocessing", self.name, name))
            })?;

            match (kind, &column.values) {
                (FeatureKind::Numeric, ColumnValues::Float32(values)) => {
                    for (row, value) in rows.iter_mut().zip(values) {
                        row.push(FeatureValue::Numeric(value.unwrap_or(f32::NAN)));
                    }
                }
                (FeatureKind::Categorical, ColumnValues::Categorical(values)) => {
                    for (row, value) in rows.iter_mut().zip(values) {
                        row.push(FeatureValue::Category(value.clone()));
                    }
                }
                (kind, values) => {
                    return Err(PredictionError::Scoring(format!(
                        "{}: feature '{}' is declared {:?} but preprocessing produced {}",
                        self.name,
                        name,
                        kind,
                        values.kind()
                    )))
                }
            }
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Column;
    use crate::gbdt::{Node, Tree, FORMAT_VERSION};

    fn numeric(name: &str) -> FeatureSpec {
        FeatureSpec {
            name: name.to_string(),
            kind: FeatureKind::Numeric,
        }
    }

    fn categorical(name: &str) -> FeatureSpec {
        FeatureSpec {
            name: name.to_string(),
            kind: FeatureKind::Categorical,
        }
    }

    fn leaf(value: f64) -> Node {
        Node::Leaf { value }
    }

    /// Attack when the flow is not tcp or moves a lot of data
    fn detection() -> ScoringModel {
        let ensemble = TreeEnsemble {
            format_version: FORMAT_VERSION,
            features: vec![categorical("proto"), numeric("sload")],
            objective: Objective::Binary,
            classes: vec!["0".to_string(), "1".to_string()],
            base_scores: vec![0.0],
            trees: vec![
                Tree::new(
                    0,
                    vec![
                        Node::Categorical {
                            feature: 0,
                            categories: vec!["tcp".to_string()],
                            left: 1,
                            right: 2,
                        },
                        leaf(-1.5),
                        leaf(1.5),
                    ],
                ),
                Tree::new(
                    0,
                    vec![
                        Node::Numeric {
                            feature: 1,
                            threshold: 10.0,
                            left: 1,
                            right: 2,
                            missing_left: true,
                        },
                        leaf(-0.5),
                        leaf(2.5),
                    ],
                ),
            ],
        };
        ScoringModel::from_ensemble("detection", ensemble, Arc::new(CategoryCatalog::default()))
    }

    fn classification() -> ScoringModel {
        let ensemble = TreeEnsemble {
            format_version: FORMAT_VERSION,
            features: vec![categorical("service"), numeric("Ratio of Data Flow")],
            objective: Objective::Multiclass,
            classes: vec!["DoS".to_string(), "Exploits".to_string(), "Generic".to_string()],
            base_scores: vec![0.0, 0.0, 0.0],
            trees: vec![
                Tree::new(
                    1,
                    vec![
                        Node::Categorical {
                            feature: 0,
                            categories: vec!["http".to_string()],
                            left: 1,
                            right: 2,
                        },
                        leaf(2.0),
                        leaf(0.0),
                    ],
                ),
                Tree::new(
                    2,
                    vec![
                        Node::Numeric {
                            feature: 1,
                            threshold: 0.1,
                            left: 1,
                            right: 2,
                            missing_left: false,
                        },
                        leaf(1.0),
                        leaf(-1.0),
                    ],
                ),
            ],
        };
        ScoringModel::from_ensemble("classification", ensemble, Arc::new(CategoryCatalog::default()))
    }

    fn flows() -> Batch {
        Batch::new(vec![
            Column::utf8("proto", vec![Some("tcp"), Some("udp"), Some("tcp")]),
            Column::utf8("service", vec![Some("http"), Some("dns"), Some("zzz")]),
            Column::int64("sbytes", vec![Some(1000), Some(100), Some(100)]),
            Column::int64("dbytes", vec![Some(5000), Some(0), Some(0)]),
            Column::float64("sload", vec![Some(1.0), Some(1.0), Some(1.0e6)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_schema_comes_from_artifact() {
        let model = detection();
        assert_eq!(
            model.schema().unwrap().columns(),
            &["proto".to_string(), "sload".to_string()]
        );
    }

    #[test]
    fn test_detection_predict() {
        let model = detection();
        let labels = model.predict(&flows()).unwrap();
        assert_eq!(labels, vec!["0", "1", "1"]);
    }

    #[test]
    fn test_detection_predict_proba_selects_positive_class() {
        let model = detection();
        match model.predict_proba(&flows()).unwrap() {
            Probabilities::Binary(p) => {
                assert_eq!(p.len(), 3);
                // tcp with low load: raw score -2.0
                assert!((p[0] - 1.0 / (1.0 + 2.0f64.exp())).abs() < 1e-12);
                assert!(p.iter().all(|x| (0.0..=1.0).contains(x)));
            }
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    fn test_classification_predict() {
        let model = classification();
        let labels = model.predict(&flows()).unwrap();
        // http -> Exploits; dns/unknown with zero data ratio -> Generic
        assert_eq!(labels, vec!["Exploits", "Generic", "Generic"]);

        match model.predict_proba(&flows()).unwrap() {
            Probabilities::Multiclass { classes, rows } => {
                assert_eq!(classes.len(), 3);
                assert_eq!(rows.len(), 3);
                for row in rows {
                    assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
                }
            }
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    fn test_row_order_is_preserved() {
        let model = detection();
        let batch = flows();
        let forward = model.class_scores(&batch).unwrap();
        let reversed = model.class_scores(&batch.take_rows(&[2, 1, 0])).unwrap();

        let mut expected = forward.clone();
        expected.reverse();
        assert_eq!(reversed, expected);
    }

    #[test]
    fn test_missing_required_column_is_schema_error() {
        let batch = Batch::new(vec![Column::utf8("proto", vec![Some("tcp")])]).unwrap();
        let err = detection().predict(&batch).unwrap_err();
        assert!(matches!(err, PredictionError::Schema { columns, .. } if columns == vec!["sload".to_string()]));
    }

    #[test]
    fn test_declared_kind_mismatch_is_scoring_error() {
        let mut ensemble = classification().ensemble;
        // sbytes is numeric after preprocessing but declared categorical here
        ensemble.features[0] = categorical("sbytes");
        let model = ScoringModel::from_ensemble("classification", ensemble, Arc::new(CategoryCatalog::default()));

        assert!(matches!(
            model.predict(&flows()),
            Err(PredictionError::Scoring(_))
        ));
    }

    #[test]
    fn test_empty_batch_yields_no_predictions() {
        let batch = flows().take_rows(&[]);
        assert!(detection().predict(&batch).unwrap().is_empty());
    }
}
