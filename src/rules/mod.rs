//! Keyword rule table for route and dosage-form inference
//!
//! The table is an immutable value: two categories, each an explicitly
//! ordered list of `(label, keywords)`. Order in the list is priority order;
//! the first rule with a matching keyword wins.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Rule table errors
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Failed to read rule table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse rule table: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Rule {label:?} in {category} has an empty keyword")]
    EmptyKeyword { category: Category, label: String },

    #[error("Rule {label:?} in {category} has no keywords")]
    NoKeywords { category: Category, label: String },

    #[error("Rule in {0} has an empty label")]
    EmptyLabel(Category),
}

pub type RuleResult<T> = Result<T, RuleError>;

/// Inference category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Route,
    DosageForm,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Route => write!(f, "route"),
            Category::DosageForm => write!(f, "dosage_form"),
        }
    }
}

/// One canonical label and the keywords that select it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub label: String,
    pub keywords: Vec<String>,
}

impl Rule {
    pub fn new(label: impl Into<String>, keywords: &[&str]) -> Self {
        Self {
            label: label.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Ordered rules for both categories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTable {
    pub route: Vec<Rule>,
    pub dosage_form: Vec<Rule>,
}

impl RuleTable {
    /// Build a table, rejecting rules that could never (or would always) match
    pub fn new(route: Vec<Rule>, dosage_form: Vec<Rule>) -> RuleResult<Self> {
        let table = Self { route, dosage_form };
        table.validate()?;
        Ok(table)
    }

    pub fn from_yaml_str(yaml: &str) -> RuleResult<Self> {
        let table: RuleTable = serde_yaml::from_str(yaml)?;
        table.validate()?;
        debug!(
            "Loaded rule table: {} route rules, {} dosage_form rules",
            table.route.len(),
            table.dosage_form.len()
        );
        Ok(table)
    }

    pub fn from_path(path: impl AsRef<Path>) -> RuleResult<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| RuleError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn to_yaml_string(&self) -> RuleResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn rules(&self, category: Category) -> &[Rule] {
        match category {
            Category::Route => &self.route,
            Category::DosageForm => &self.dosage_form,
        }
    }

    fn validate(&self) -> RuleResult<()> {
        for category in [Category::Route, Category::DosageForm] {
            for rule in self.rules(category) {
                if rule.label.trim().is_empty() {
                    return Err(RuleError::EmptyLabel(category));
                }
                if rule.keywords.is_empty() {
                    return Err(RuleError::NoKeywords {
                        category,
                        label: rule.label.clone(),
                    });
                }
                if rule.keywords.iter().any(|k| k.trim().is_empty()) {
                    return Err(RuleError::EmptyKeyword {
                        category,
                        label: rule.label.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for RuleTable {
    /// Built-in vocabulary, identical to `config/text_rules.yaml`
    fn default() -> Self {
        Self {
            route: vec![
                Rule::new(
                    "Intravenous",
                    &["intravenous", "intravenously", "i.v.", "iv infusion", "iv bolus", "iv push", "iv drip"],
                ),
                Rule::new("Subcutaneous", &["subcutaneous", "subcutaneously", "s.c.", "sub-q", "subq"]),
                Rule::new("Intramuscular", &["intramuscular", "intramuscularly", "i.m."]),
                Rule::new("Inhalation", &["inhaled", "inhalation", "inhale", "nebulized", "nebuliser", "nebulizer"]),
                Rule::new("Intranasal", &["intranasal", "intranasally", "nasal"]),
                Rule::new("Sublingual", &["sublingual", "sublingually", "under the tongue"]),
                Rule::new("Oral", &["oral", "orally", "by mouth", "p.o.", "swallow"]),
                Rule::new("Transdermal", &["transdermal", "transdermally"]),
                Rule::new("Topical", &["topical", "topically", "applied to the skin"]),
                Rule::new("Ophthalmic", &["ophthalmic", "eye drop", "intraocular", "intravitreal"]),
                Rule::new("Rectal", &["rectal", "rectally"]),
                Rule::new("Vaginal", &["vaginal", "vaginally", "intravaginal"]),
            ],
            dosage_form: vec![
                Rule::new("Tablet", &["tablet"]),
                Rule::new("Capsule", &["capsule"]),
                Rule::new("Injection", &["injection", "injectable", "syringe"]),
                Rule::new("Suspension", &["suspension"]),
                Rule::new("Solution", &["solution"]),
                Rule::new("Syrup", &["syrup"]),
                Rule::new("Cream", &["cream"]),
                Rule::new("Ointment", &["ointment"]),
                Rule::new("Gel", &["gel"]),
                Rule::new("Patch", &["patch"]),
                Rule::new("Inhaler", &["inhaler"]),
                Rule::new("Spray", &["spray"]),
                Rule::new("Drops", &["drops"]),
                Rule::new("Powder", &["powder"]),
                Rule::new("Suppository", &["suppository"]),
                Rule::new("Lozenge", &["lozenge"]),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_shipped_file() {
        let shipped = include_str!("../../config/text_rules.yaml");
        let table = RuleTable::from_yaml_str(shipped).unwrap();
        assert_eq!(table, RuleTable::default());
    }

    #[test]
    fn test_yaml_order_is_priority_order() {
        let yaml = r#"
route:
  - label: Oral
    keywords: [oral]
  - label: Intravenous
    keywords: [iv]
dosage_form: []
"#;
        let table = RuleTable::from_yaml_str(yaml).unwrap();
        let labels: Vec<_> = table.route.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["Oral", "Intravenous"]);
        assert!(table.dosage_form.is_empty());
    }

    #[test]
    fn test_empty_keyword_rejected() {
        let yaml = r#"
route:
  - label: Oral
    keywords: ["oral", "  "]
dosage_form: []
"#;
        assert!(matches!(
            RuleTable::from_yaml_str(yaml),
            Err(RuleError::EmptyKeyword { category: Category::Route, .. })
        ));
    }

    #[test]
    fn test_rule_without_keywords_rejected() {
        let result = RuleTable::new(vec![], vec![Rule::new("Tablet", &[])]);
        assert!(matches!(result, Err(RuleError::NoKeywords { category: Category::DosageForm, .. })));
    }

    #[test]
    fn test_missing_file() {
        let err = RuleTable::from_path("/nonexistent/rules.yaml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/rules.yaml"));
    }

    #[test]
    fn test_yaml_round_trip_keeps_order() {
        let table = RuleTable::default();
        let yaml = table.to_yaml_string().unwrap();
        assert_eq!(RuleTable::from_yaml_str(&yaml).unwrap(), table);
    }
}
