//! Cypher rendering of schema statements and upserts
//!
//! Used for debug logging and the CLI `schema` command. The rendered text is
//! what a Cypher-speaking backend would run for the same operation.

use super::schema::SchemaStatement;
use crate::graph::{NodeKey, PropertyMap, PropertyValue, SchemaOp, UpsertOp};

/// `CREATE CONSTRAINT ... IF NOT EXISTS` / `CREATE INDEX ... IF NOT EXISTS`
pub fn schema_statement(statement: &SchemaStatement) -> String {
    match &statement.op {
        SchemaOp::UniqueConstraint { label, property } => format!(
            "CREATE CONSTRAINT {} IF NOT EXISTS FOR (n:{}) REQUIRE n.{} IS UNIQUE",
            statement.name, label, property
        ),
        SchemaOp::Index { label, property } => format!(
            "CREATE INDEX {} IF NOT EXISTS FOR (n:{}) ON (n.{})",
            statement.name, label, property
        ),
    }
}

/// `MERGE` by natural key followed by `SET` of every property
pub fn upsert(op: &UpsertOp) -> String {
    match op {
        UpsertOp::MergeNode { key, properties } => {
            let mut out = format!("MERGE {}", pattern("n", key));
            push_set(&mut out, "n", properties, Some(&key.property));
            out
        }
        UpsertOp::MergeEdge {
            edge_type,
            from,
            to,
            properties,
        } => {
            let mut out = format!(
                "MATCH {}, {} MERGE (a)-[r:{}]->(b)",
                pattern("a", from),
                pattern("b", to),
                edge_type
            );
            push_set(&mut out, "r", properties, None);
            out
        }
    }
}

/// Render a property value as a Cypher literal
pub fn literal(value: &PropertyValue) -> String {
    match value {
        PropertyValue::String(s) => {
            let mut out = String::with_capacity(s.len() + 2);
            out.push('\'');
            for c in s.chars() {
                match c {
                    '\\' => out.push_str("\\\\"),
                    '\'' => out.push_str("\\'"),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\t' => out.push_str("\\t"),
                    c => out.push(c),
                }
            }
            out.push('\'');
            out
        }
        PropertyValue::Integer(i) => i.to_string(),
        PropertyValue::Float(f) => format!("{:?}", f),
        PropertyValue::Boolean(b) => b.to_string(),
        PropertyValue::Null => "null".to_string(),
    }
}

fn pattern(var: &str, key: &NodeKey) -> String {
    format!("({}:{} {{{}: {}}})", var, key.label, key.property, literal(&key.value))
}

fn push_set(out: &mut String, var: &str, properties: &PropertyMap, skip: Option<&str>) {
    let mut keys: Vec<&String> = properties
        .keys()
        .filter(|k| Some(k.as_str()) != skip)
        .collect();
    if keys.is_empty() {
        return;
    }
    keys.sort();

    let assignments: Vec<String> = keys
        .into_iter()
        .map(|k| format!("{}.{} = {}", var, k, literal(&properties[k])))
        .collect();
    out.push_str(" SET ");
    out.push_str(&assignments.join(", "));
}
