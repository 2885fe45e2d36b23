//! Reference data for the feature pipeline
//!
//! The catalog holds the accepted values of the categorical columns, the
//! columns that receive a `log1p` transform, and the derived features built
//! from raw flow counters. It is loaded once at startup and shared read-only.

use serde::{Deserialize, Serialize};

/// Marker substituted for any categorical value outside its whitelist
pub const CATCH_ALL: &str = "-";

/// Additive constant keeping ratio denominators away from zero
pub const RATIO_EPSILON: f64 = 1e-10;

/// Accepted values for one categorical column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryWhitelist {
    /// Column name in the raw batch
    pub column: String,
    /// Values kept as-is; everything else becomes the catch-all marker
    pub values: Vec<String>,
}

impl CategoryWhitelist {
    pub fn new(column: &str, values: &[&str]) -> Self {
        Self {
            column: column.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Check whether a raw value is kept as-is
    pub fn contains(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }
}

/// A feature computed from raw numeric columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DerivedFeature {
    /// `log1p(numerator / (denominator + epsilon))`
    Ratio {
        name: String,
        numerator: String,
        denominator: String,
    },
    /// `log1p(sum of columns)`
    Sum { name: String, columns: Vec<String> },
}

impl DerivedFeature {
    pub fn name(&self) -> &str {
        match self {
            DerivedFeature::Ratio { name, .. } | DerivedFeature::Sum { name, .. } => name,
        }
    }

    /// Raw columns this feature reads
    pub fn sources(&self) -> Vec<&str> {
        match self {
            DerivedFeature::Ratio {
                numerator,
                denominator,
                ..
            } => vec![numerator.as_str(), denominator.as_str()],
            DerivedFeature::Sum { columns, .. } => columns.iter().map(String::as_str).collect(),
        }
    }

    /// Compute the feature for one row of source values (in `sources()` order)
    pub fn compute(&self, values: &[f64]) -> f64 {
        match self {
            DerivedFeature::Ratio { .. } => (values[0] / (values[1] + RATIO_EPSILON)).ln_1p(),
            DerivedFeature::Sum { .. } => values.iter().sum::<f64>().ln_1p(),
        }
    }
}

/// Static reference data consumed by the feature pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryCatalog {
    /// Whitelists for the categorical columns
    pub categorical: Vec<CategoryWhitelist>,
    /// Columns replaced by `log1p(value)` when present
    pub log_features: Vec<String>,
    /// Features computed before selection
    pub derived: Vec<DerivedFeature>,
    /// Replacement for values outside a whitelist
    pub catch_all: String,
}

impl CategoryCatalog {
    /// Names of all categorical columns
    pub fn categorical_columns(&self) -> impl Iterator<Item = &str> {
        self.categorical.iter().map(|w| w.column.as_str())
    }

    pub fn is_categorical(&self, column: &str) -> bool {
        self.categorical.iter().any(|w| w.column == column)
    }

    pub fn whitelist(&self, column: &str) -> Option<&CategoryWhitelist> {
        self.categorical.iter().find(|w| w.column == column)
    }

    pub fn is_log_feature(&self, column: &str) -> bool {
        self.log_features.iter().any(|c| c == column)
    }

    /// Canonical form of a categorical value: itself when whitelisted,
    /// the catch-all marker otherwise (including nulls)
    pub fn canonicalize<'a>(&'a self, whitelist: &CategoryWhitelist, value: Option<&'a str>) -> &'a str {
        match value {
            Some(v) if v == self.catch_all || whitelist.contains(v) => v,
            _ => &self.catch_all,
        }
    }

    /// Validate catalog consistency
    pub fn validate(&self) -> Result<(), String> {
        if self.catch_all.is_empty() {
            return Err("Catch-all marker cannot be empty".to_string());
        }

        for whitelist in &self.categorical {
            if whitelist.column.is_empty() {
                return Err("Categorical column name cannot be empty".to_string());
            }
            if self.is_log_feature(&whitelist.column) {
                return Err(format!(
                    "Column '{}' cannot be both categorical and log-transformed",
                    whitelist.column
                ));
            }
        }

        for derived in &self.derived {
            if derived.sources().is_empty() {
                return Err(format!("Derived feature '{}' has no source columns", derived.name()));
            }
            if self.is_categorical(derived.name()) {
                return Err(format!(
                    "Derived feature '{}' shadows a categorical column",
                    derived.name()
                ));
            }
        }

        Ok(())
    }
}

impl Default for CategoryCatalog {
    /// Values the UNSW-NB15 models were trained with
    fn default() -> Self {
        Self {
            categorical: vec![
                CategoryWhitelist::new("proto", &["tcp", "udp", "unas", "arp", "ospf", "sctp"]),
                CategoryWhitelist::new(
                    "service",
                    &["-", "dns", "http", "smtp", "ftp-data", "ftp", "ssh", "pop3"],
                ),
                CategoryWhitelist::new("state", &["INT", "FIN", "CON", "REQ", "RST"]),
            ],
            log_features: [
                "smean",
                "spkts",
                "dpkts",
                "sloss",
                "dloss",
                "response_body_len",
                "sinpkt",
                "dinpkt",
                "sload",
                "dload",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
            derived: vec![
                DerivedFeature::Ratio {
                    name: "Ratio of Data Flow".to_string(),
                    numerator: "dbytes".to_string(),
                    denominator: "sbytes".to_string(),
                },
                DerivedFeature::Ratio {
                    name: "Ratio of Packet Flow".to_string(),
                    numerator: "dpkts".to_string(),
                    denominator: "spkts".to_string(),
                },
                DerivedFeature::Sum {
                    name: "Total Page Errors".to_string(),
                    columns: vec!["sloss".to_string(), "dloss".to_string()],
                },
                DerivedFeature::Sum {
                    name: "Network Bytes".to_string(),
                    columns: vec!["sbytes".to_string(), "dbytes".to_string()],
                },
            ],
            catch_all: CATCH_ALL.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_is_valid() {
        let catalog = CategoryCatalog::default();
        assert!(catalog.validate().is_ok());
        assert_eq!(
            catalog.categorical_columns().collect::<Vec<_>>(),
            vec!["proto", "service", "state"]
        );
        assert_eq!(catalog.log_features.len(), 10);
    }

    #[test]
    fn test_canonicalize() {
        let catalog = CategoryCatalog::default();
        let service = catalog.whitelist("service").unwrap();

        assert_eq!(catalog.canonicalize(service, Some("dns")), "dns");
        assert_eq!(catalog.canonicalize(service, Some("zzz-unknown")), "-");
        assert_eq!(catalog.canonicalize(service, Some("-")), "-");
        assert_eq!(catalog.canonicalize(service, None), "-");

        // Whitelists are case sensitive
        let state = catalog.whitelist("state").unwrap();
        assert_eq!(catalog.canonicalize(state, Some("con")), "-");
    }

    #[test]
    fn test_ratio_of_data_flow() {
        let catalog = CategoryCatalog::default();
        let ratio = &catalog.derived[0];
        assert_eq!(ratio.name(), "Ratio of Data Flow");
        assert_eq!(ratio.sources(), vec!["dbytes", "sbytes"]);

        assert_eq!(ratio.compute(&[0.0, 100.0]), 0.0);
        // Zero denominator stays finite
        assert!(ratio.compute(&[10.0, 0.0]).is_finite());
    }

    #[test]
    fn test_sum_feature() {
        let feature = DerivedFeature::Sum {
            name: "Total Page Errors".to_string(),
            columns: vec!["sloss".to_string(), "dloss".to_string()],
        };
        assert!((feature.compute(&[1.0, 2.0]) - 4.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let mut catalog = CategoryCatalog::default();
        catalog.log_features.push("proto".to_string());
        assert!(catalog.validate().is_err());

        let mut catalog = CategoryCatalog::default();
        catalog.catch_all.clear();
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let value = serde_json::json!({
            "catch_all": "other",
            "categorical": [{"column": "proto", "values": ["tcp"]}],
            "derived": [{
                "kind": "ratio",
                "name": "Ratio of Data Flow",
                "numerator": "dbytes",
                "denominator": "sbytes"
            }]
        });
        let catalog: CategoryCatalog = serde_json::from_value(value).unwrap();

        assert_eq!(catalog.catch_all, "other");
        assert_eq!(catalog.categorical.len(), 1);
        assert_eq!(catalog.derived[0].name(), "Ratio of Data Flow");
        // Omitted sections fall back to the training-time values
        assert_eq!(catalog.log_features, CategoryCatalog::default().log_features);
    }
}
