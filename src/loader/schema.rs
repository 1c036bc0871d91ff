//! Graph vocabulary and schema of the trial graph

use crate::graph::SchemaOp;

pub const TRIAL: &str = "Trial";
pub const DRUG: &str = "Drug";
pub const CONDITION: &str = "Condition";
pub const ORGANIZATION: &str = "Organization";

pub const STUDIED_IN: &str = "STUDIED_IN";
pub const STUDIES_CONDITION: &str = "STUDIES_CONDITION";
pub const SPONSORED_BY: &str = "SPONSORED_BY";

pub const NCT_ID: &str = "nct_id";
pub const NAME: &str = "name";

/// A named schema declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaStatement {
    pub name: &'static str,
    pub op: SchemaOp,
}

/// Natural-key constraints first, then the secondary indexes on Trial
pub fn trial_graph_schema() -> Vec<SchemaStatement> {
    vec![
        SchemaStatement {
            name: "trial_nct_id",
            op: SchemaOp::unique(TRIAL, NCT_ID),
        },
        SchemaStatement {
            name: "drug_name",
            op: SchemaOp::unique(DRUG, NAME),
        },
        SchemaStatement {
            name: "condition_name",
            op: SchemaOp::unique(CONDITION, NAME),
        },
        SchemaStatement {
            name: "org_name",
            op: SchemaOp::unique(ORGANIZATION, NAME),
        },
        SchemaStatement {
            name: "trial_phase",
            op: SchemaOp::index(TRIAL, "phase"),
        },
        SchemaStatement {
            name: "trial_status",
            op: SchemaOp::index(TRIAL, "status"),
        },
    ]
}
