//! Gradient-boosted decision tree inference
//!
//! Models are serialized as JSON with the following structure:
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "features": [
//!     {"name": "proto", "kind": "categorical"},
//!     {"name": "sload", "kind": "numeric"}
//!   ],
//!   "objective": "binary",
//!   "classes": ["0", "1"],
//!   "base_scores": [0.0],
//!   "trees": [
//!     {
//!       "output": 0,
//!       "nodes": [
//!         {"kind": "numeric", "feature": 1, "threshold": 10.0, "left": 1, "right": 2},
//!         {"kind": "leaf", "value": -0.8},
//!         {"kind": "leaf", "value": 1.2}
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! The `features` list is the model's feature schema: the preprocessed batch
//! is projected onto exactly these columns, in this order, before scoring.

pub mod ensemble;
pub mod tree;

pub use ensemble::{FeatureKind, FeatureSpec, Objective, TreeEnsemble, FORMAT_VERSION};
pub use tree::{FeatureValue, Node, Tree};
