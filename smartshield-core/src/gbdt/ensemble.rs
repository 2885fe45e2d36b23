//! Gradient-boosted tree ensemble artifact
//!
//! An artifact is a JSON document embedding the ordered feature list the
//! model was trained on, the objective, the class labels and the trees.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::tree::{FeatureValue, Node, Tree};
use crate::error::ModelError;

/// Artifact format version understood by this crate
pub const FORMAT_VERSION: u32 = 1;

/// Declared kind of a model feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Numeric,
    Categorical,
}

/// A model input column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    pub kind: FeatureKind,
}

/// Training objective, which decides how raw scores become probabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// One raw score, sigmoid link; `classes` holds `[negative, positive]`
    Binary,
    /// One raw score per class, softmax link
    Multiclass,
}

/// Tree ensemble with its embedded feature schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub format_version: u32,
    pub features: Vec<FeatureSpec>,
    pub objective: Objective,
    pub classes: Vec<String>,
    /// Initial raw score per output
    pub base_scores: Vec<f64>,
    pub trees: Vec<Tree>,
}

impl TreeEnsemble {
    /// Load and validate an artifact from a JSON file
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ModelError> {
        let ensemble: TreeEnsemble = serde_json::from_str(json)?;
        ensemble.validate()?;
        Ok(ensemble)
    }

    /// Number of raw scores produced per row
    pub fn num_outputs(&self) -> usize {
        match self.objective {
            Objective::Binary => 1,
            Objective::Multiclass => self.classes.len(),
        }
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }

    /// Validate model structure
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.format_version != FORMAT_VERSION {
            return Err(ModelError::ValidationFailed(format!(
                "Unsupported model format version: {}",
                self.format_version
            )));
        }

        match self.objective {
            Objective::Binary if self.classes.len() != 2 => {
                return Err(ModelError::ValidationFailed(format!(
                    "Binary model needs 2 class labels, found {}",
                    self.classes.len()
                )))
            }
            Objective::Multiclass if self.classes.len() < 2 => {
                return Err(ModelError::ValidationFailed(format!(
                    "Multiclass model needs at least 2 class labels, found {}",
                    self.classes.len()
                )))
            }
            _ => {}
        }

        if self.base_scores.len() != self.num_outputs() {
            return Err(ModelError::ValidationFailed(format!(
                "Expected {} base scores, found {}",
                self.num_outputs(),
                self.base_scores.len()
            )));
        }

        let mut labels = HashSet::new();
        for class in &self.classes {
            if !labels.insert(class.as_str()) {
                return Err(ModelError::ValidationFailed(format!(
                    "Duplicate class label '{}'",
                    class
                )));
            }
        }

        let mut seen = HashSet::new();
        for feature in &self.features {
            if !seen.insert(feature.name.as_str()) {
                return Err(ModelError::ValidationFailed(format!(
                    "Duplicate feature '{}'",
                    feature.name
                )));
            }
        }

        for (i, tree) in self.trees.iter().enumerate() {
            if tree.output >= self.num_outputs() {
                return Err(ModelError::ValidationFailed(format!(
                    "Tree {} targets output {} but the model has {}",
                    i,
                    tree.output,
                    self.num_outputs()
                )));
            }

            tree.validate(self.features.len()).map_err(|e| {
                ModelError::ValidationFailed(format!("Tree {} validation failed: {}", i, e))
            })?;

            for node in &tree.nodes {
                let (feature, expected) = match node {
                    Node::Numeric { feature, .. } => (*feature, FeatureKind::Numeric),
                    Node::Categorical { feature, .. } => (*feature, FeatureKind::Categorical),
                    Node::Leaf { .. } => continue,
                };
                if self.features[feature].kind != expected {
                    return Err(ModelError::ValidationFailed(format!(
                        "Tree {} splits on '{}' as {:?}, but it is declared {:?}",
                        i, self.features[feature].name, expected, self.features[feature].kind
                    )));
                }
            }
        }

        Ok(())
    }

    /// Sum of base score and tree contributions, per output
    pub fn raw_scores(&self, row: &[FeatureValue]) -> Result<Vec<f64>, String> {
        let mut scores = self.base_scores.clone();
        for tree in &self.trees {
            scores[tree.output] += tree.evaluate(row)?;
        }
        Ok(scores)
    }

    /// Class probabilities in `classes` order
    pub fn probabilities(&self, row: &[FeatureValue]) -> Result<Vec<f64>, String> {
        let raw = self.raw_scores(row)?;
        Ok(match self.objective {
            Objective::Binary => {
                let positive = sigmoid(raw[0]);
                vec![1.0 - positive, positive]
            }
            Objective::Multiclass => softmax(&raw),
        })
    }

    /// Get number of trees in the ensemble
    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn softmax(raw: &[f64]) -> Vec<f64> {
    let max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = raw.iter().map(|x| (x - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
