//! Rule-based route / dosage-form inference

use crate::rules::{Category, Rule, RuleTable};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Sentinel for "no rule matched"
pub const UNKNOWN: &str = "Unknown";

/// Inferred route and dosage form; each a rule label or [`UNKNOWN`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inference {
    pub route: String,
    pub dosage_form: String,
}

impl Inference {
    pub fn unknown() -> Self {
        Self {
            route: UNKNOWN.to_string(),
            dosage_form: UNKNOWN.to_string(),
        }
    }
}

/// A rule with its keywords lower-cased once
#[derive(Debug, Clone)]
struct CompiledRule {
    label: String,
    keywords: Vec<String>,
}

impl CompiledRule {
    fn compile(rule: &Rule) -> Self {
        Self {
            label: rule.label.clone(),
            keywords: rule.keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    fn matches(&self, haystack: &str) -> bool {
        self.keywords.iter().any(|k| haystack.contains(k.as_str()))
    }
}

/// Pure keyword matcher compiled from a [`RuleTable`]
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    route: Vec<CompiledRule>,
    dosage_form: Vec<CompiledRule>,
}

impl InferenceEngine {
    pub fn new(table: Arc<RuleTable>) -> Self {
        let compile = |category: Category| -> Vec<CompiledRule> {
            table.rules(category).iter().map(CompiledRule::compile).collect()
        };
        let route = compile(Category::Route);
        let dosage_form = compile(Category::DosageForm);
        Self { route, dosage_form }
    }

    /// Infer both categories from free text.
    ///
    /// Absent or blank text yields `Unknown` for both.
    pub fn infer(&self, text: Option<&str>) -> Inference {
        let text = match text.map(str::trim) {
            Some(t) if !t.is_empty() => t.to_lowercase(),
            _ => return Inference::unknown(),
        };
        Inference {
            route: first_match(&self.route, &text),
            dosage_form: first_match(&self.dosage_form, &text),
        }
    }

    /// Infer a single category
    pub fn infer_category(&self, category: Category, text: &str) -> String {
        let text = text.trim().to_lowercase();
        if text.is_empty() {
            return UNKNOWN.to_string();
        }
        let rules = match category {
            Category::Route => &self.route,
            Category::DosageForm => &self.dosage_form,
        };
        first_match(rules, &text)
    }
}

impl Default for InferenceEngine {
    fn default() -> Self {
        Self::new(Arc::new(RuleTable::default()))
    }
}

fn first_match(rules: &[CompiledRule], text: &str) -> String {
    rules
        .iter()
        .find(|rule| rule.matches(text))
        .map_or_else(|| UNKNOWN.to_string(), |rule| rule.label.clone())
}
