//! Graph statistics, description coverage and inference coverage

use crate::graph::{EdgeType, GraphStore, PropertyValue};
use crate::loader::schema::STUDIED_IN;
use crate::model::{CanonicalDrug, CanonicalStudy, RawStudy};
use crate::transform::{normalize_name, UNKNOWN};
use indexmap::IndexMap;
use serde::Serialize;

/// How many `STUDIED_IN` relationships carry an inferred route / dosage form
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InferenceCoverage {
    pub total: usize,
    pub with_route: usize,
    pub with_dosage_form: usize,
    pub with_both: usize,
    pub with_any: usize,
}

impl InferenceCoverage {
    pub fn from_store(store: &GraphStore) -> Self {
        let mut coverage = Self::default();
        for edge in store.get_edges_by_type(&EdgeType::new(STUDIED_IN)) {
            let route = is_inferred(edge.get_property("route"));
            let form = is_inferred(edge.get_property("dosage_form"));

            coverage.total += 1;
            coverage.with_route += usize::from(route);
            coverage.with_dosage_form += usize::from(form);
            coverage.with_both += usize::from(route && form);
            coverage.with_any += usize::from(route || form);
        }
        coverage
    }

    /// `part` as a percentage of `total` (0 when empty)
    pub fn percent(&self, part: usize) -> f64 {
        ratio(part, self.total)
    }
}

/// Description quality of the drug mentions seen during a run.
///
/// Counts only drugs with a usable name, i.e. those that reach the graph.
/// Inference counts are a subset of `with_description`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DescriptionCoverage {
    pub total: usize,
    pub null_description: usize,
    pub blank_description: usize,
    pub with_description: usize,
    pub route_inferred: usize,
    pub dosage_form_inferred: usize,
    pub both_inferred: usize,
}

impl DescriptionCoverage {
    /// Add the drugs of one study, pairing each raw mention with its cleaned form
    pub fn add_study(&mut self, raw: &RawStudy, study: &CanonicalStudy) {
        let named = raw
            .drugs
            .iter()
            .filter(|drug| normalize_name(drug.name.as_deref()).is_some());
        for (raw_drug, drug) in named.zip(&study.drugs) {
            self.add_drug(raw_drug.description.as_deref(), drug);
        }
    }

    pub fn add_drug(&mut self, description: Option<&str>, drug: &CanonicalDrug) {
        self.total += 1;
        match description {
            None => self.null_description += 1,
            Some(text) if text.trim().is_empty() => self.blank_description += 1,
            Some(_) => self.with_description += 1,
        }

        let route = drug.route != UNKNOWN;
        let form = drug.dosage_form != UNKNOWN;
        self.route_inferred += usize::from(route);
        self.dosage_form_inferred += usize::from(form);
        self.both_inferred += usize::from(route && form);
    }

    pub fn merge(&mut self, other: &Self) {
        self.total += other.total;
        self.null_description += other.null_description;
        self.blank_description += other.blank_description;
        self.with_description += other.with_description;
        self.route_inferred += other.route_inferred;
        self.dosage_form_inferred += other.dosage_form_inferred;
        self.both_inferred += other.both_inferred;
    }

    /// `part` as a percentage of all drugs (0 when empty)
    pub fn percent(&self, part: usize) -> f64 {
        ratio(part, self.total)
    }

    /// `part` as a percentage of the drugs that have a description
    pub fn percent_of_described(&self, part: usize) -> f64 {
        ratio(part, self.with_description)
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

fn is_inferred(value: Option<&PropertyValue>) -> bool {
    match value.and_then(PropertyValue::as_string) {
        Some(v) => v != UNKNOWN,
        None => false,
    }
}

/// Node counts per label and edge counts per type, sorted by name
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphSummary {
    pub nodes: usize,
    pub edges: usize,
    pub labels: IndexMap<String, usize>,
    pub edge_types: IndexMap<String, usize>,
    pub coverage: InferenceCoverage,
}

impl GraphSummary {
    pub fn from_store(store: &GraphStore) -> Self {
        Self {
            nodes: store.node_count(),
            edges: store.edge_count(),
            labels: store
                .label_counts()
                .into_iter()
                .map(|(label, count)| (label.as_str().to_string(), count))
                .collect(),
            edge_types: store
                .edge_type_counts()
                .into_iter()
                .map(|(edge_type, count)| (edge_type.as_str().to_string(), count))
                .collect(),
            coverage: InferenceCoverage::from_store(store),
        }
    }
}
