//! Decision tree structures for ensemble inference

use serde::{Deserialize, Serialize};

/// One input value of a feature row
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    /// Numeric value; NaN marks a missing cell
    Numeric(f32),
    /// Categorical value; `None` marks a missing cell
    Category(Option<String>),
}

/// A decision tree node
///
/// Child indices point into the owning tree's node list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    /// Go left when `value < threshold`; missing values follow `missing_left`
    Numeric {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
        #[serde(default)]
        missing_left: bool,
    },
    /// Go left when the value is one of `categories`
    Categorical {
        feature: usize,
        categories: Vec<String>,
        left: usize,
        right: usize,
    },
    Leaf { value: f64 },
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    fn children(&self) -> Option<(usize, usize)> {
        match self {
            Node::Numeric { left, right, .. } | Node::Categorical { left, right, .. } => {
                Some((*left, *right))
            }
            Node::Leaf { .. } => None,
        }
    }

    fn feature(&self) -> Option<usize> {
        match self {
            Node::Numeric { feature, .. } | Node::Categorical { feature, .. } => Some(*feature),
            Node::Leaf { .. } => None,
        }
    }
}

/// A single regression tree contributing to one model output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    /// Output dimension (class index for multi-class models, 0 for binary)
    #[serde(default)]
    pub output: usize,

    /// Tree nodes (node 0 is the root)
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn new(output: usize, nodes: Vec<Node>) -> Self {
        Self { output, nodes }
    }

    /// Evaluate this tree on a feature row, returning the reached leaf value
    pub fn evaluate(&self, row: &[FeatureValue]) -> Result<f64, String> {
        let mut idx = 0usize;

        // A valid tree reaches a leaf in at most nodes.len() steps
        for _ in 0..=self.nodes.len() {
            let node = self
                .nodes
                .get(idx)
                .ok_or_else(|| format!("Node index {} out of range", idx))?;

            idx = match node {
                Node::Leaf { value } => return Ok(*value),
                Node::Numeric {
                    feature,
                    threshold,
                    left,
                    right,
                    missing_left,
                } => match row.get(*feature) {
                    Some(FeatureValue::Numeric(v)) if v.is_nan() => {
                        if *missing_left {
                            *left
                        } else {
                            *right
                        }
                    }
                    Some(FeatureValue::Numeric(v)) => {
                        if *v < *threshold {
                            *left
                        } else {
                            *right
                        }
                    }
                    Some(FeatureValue::Category(_)) => {
                        return Err(format!("Feature {} is categorical, expected numeric", feature))
                    }
                    None => return Err(format!("Feature {} missing from row", feature)),
                },
                Node::Categorical {
                    feature,
                    categories,
                    left,
                    right,
                } => match row.get(*feature) {
                    Some(FeatureValue::Category(value)) => {
                        let member = value
                            .as_deref()
                            .map(|v| categories.iter().any(|c| c == v))
                            .unwrap_or(false);
                        if member {
                            *left
                        } else {
                            *right
                        }
                    }
                    Some(FeatureValue::Numeric(_)) => {
                        return Err(format!("Feature {} is numeric, expected categorical", feature))
                    }
                    None => return Err(format!("Feature {} missing from row", feature)),
                },
            };
        }

        Err("Tree traversal did not reach a leaf".to_string())
    }

    /// Validate tree structure against the number of model features
    pub fn validate(&self, num_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("Tree has no nodes".to_string());
        }

        for (i, node) in self.nodes.iter().enumerate() {
            if let Some(feature) = node.feature() {
                if feature >= num_features {
                    return Err(format!(
                        "Node {} splits on feature {} but the model has {} features",
                        i, feature, num_features
                    ));
                }
            }
            if let Some((left, right)) = node.children() {
                // Children must come after their parent, which rules out cycles
                if left <= i || right <= i {
                    return Err(format!("Node {} has a child pointing backwards", i));
                }
                if left >= self.nodes.len() || right >= self.nodes.len() {
                    return Err(format!("Node {} has a child index out of range", i));
                }
            }
        }

        Ok(())
    }

    /// Get the root node
    pub fn root(&self) -> Option<&Node> {
        self.nodes.first()
    }
}
