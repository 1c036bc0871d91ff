//! Raw and canonical study records

use serde::{Deserialize, Deserializer, Serialize};

/// One study as delivered by the extraction query. Every field may be
/// absent or null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawStudy {
    #[serde(default)]
    pub nct_id: Option<String>,
    #[serde(default)]
    pub brief_title: Option<String>,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub overall_status: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub drugs: Vec<RawDrug>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub conditions: Vec<Option<String>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sponsors: Vec<RawSponsor>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDrug {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSponsor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A cleaned study, ready to be loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalStudy {
    pub nct_id: String,
    pub title: String,
    pub phase: String,
    pub status: String,
    pub drugs: Vec<CanonicalDrug>,
    pub conditions: Vec<CanonicalCondition>,
    pub sponsors: Vec<CanonicalSponsor>,
}

/// Drug mention with inferred route and dosage form (never absent)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalDrug {
    pub name: String,
    pub route: String,
    pub dosage_form: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalCondition {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalSponsor {
    pub name: String,
    pub class: String,
}
