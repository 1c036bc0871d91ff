//! Raw record -> canonical record

use super::inference::{InferenceEngine, UNKNOWN};
use super::normalize::{normalize_name, normalize_scalar};
use crate::model::{CanonicalCondition, CanonicalDrug, CanonicalSponsor, CanonicalStudy, RawStudy};
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CleanError {
    #[error("Malformed record: missing or blank {field}")]
    MalformedRecord { field: &'static str },
}

pub type CleanResult<T> = Result<T, CleanError>;

/// Produces one canonical record per raw study
#[derive(Debug, Clone, Default)]
pub struct RecordCleaner {
    engine: InferenceEngine,
}

impl RecordCleaner {
    pub fn new(engine: InferenceEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    pub fn clean(&self, raw: &RawStudy) -> CleanResult<CanonicalStudy> {
        let nct_id = raw
            .nct_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(CleanError::MalformedRecord { field: "nct_id" })?
            .to_string();

        let drugs = raw
            .drugs
            .iter()
            .filter_map(|drug| {
                let name = normalize_name(drug.name.as_deref())?;
                let inference = self.engine.infer(drug.description.as_deref());
                Some(CanonicalDrug {
                    name,
                    route: inference.route,
                    dosage_form: inference.dosage_form,
                })
            })
            .collect();

        let mut seen = FxHashSet::default();
        let conditions = raw
            .conditions
            .iter()
            .filter_map(|c| normalize_name(c.as_deref()))
            .filter(|name| seen.insert(name.to_lowercase()))
            .map(|name| CanonicalCondition { name })
            .collect();

        let sponsors = raw
            .sponsors
            .iter()
            .filter_map(|sponsor| {
                let name = normalize_name(sponsor.name.as_deref())?;
                let class = sponsor
                    .class
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .unwrap_or(UNKNOWN)
                    .to_string();
                Some(CanonicalSponsor { name, class })
            })
            .collect();

        Ok(CanonicalStudy {
            nct_id,
            title: normalize_scalar(raw.brief_title.as_deref()),
            phase: normalize_scalar(raw.phase.as_deref()),
            status: normalize_scalar(raw.overall_status.as_deref()),
            drugs,
            conditions,
            sponsors,
        })
    }

    /// Clean a slice, one result per input, in input order
    pub fn clean_all(&self, raws: &[RawStudy], parallel: bool) -> Vec<CleanResult<CanonicalStudy>> {
        if parallel {
            raws.par_iter().map(|raw| self.clean(raw)).collect()
        } else {
            raws.iter().map(|raw| self.clean(raw)).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RawDrug, RawSponsor};

    fn readme_raw() -> RawStudy {
        serde_json::from_value(serde_json::json!({
            "nct_id": "NCT00000102",
            "brief_title": "Study of Drug X in Condition Y",
            "phase": "PHASE3",
            "overall_status": "COMPLETED",
            "drugs": [{"name": "Drug X", "description": "Oral tablet administered daily"}],
            "conditions": ["Condition Y"],
            "sponsors": [{"name": "Example Pharma Inc", "class": "INDUSTRY"}]
        }))
        .unwrap()
    }

    #[test]
    fn test_readme_example() {
        let clean = RecordCleaner::default().clean(&readme_raw()).unwrap();

        assert_eq!(clean.nct_id, "NCT00000102");
        assert_eq!(
            clean.drugs,
            vec![CanonicalDrug {
                name: "Drug X".into(),
                route: "Oral".into(),
                dosage_form: "Tablet".into(),
            }]
        );
        assert_eq!(clean.conditions, vec![CanonicalCondition { name: "Condition Y".into() }]);
        assert_eq!(
            clean.sponsors,
            vec![CanonicalSponsor {
                name: "Example Pharma Inc".into(),
                class: "INDUSTRY".into(),
            }]
        );
        assert_eq!(clean.phase, "Phase3");
        assert_eq!(clean.status, "Completed");
    }

    #[test]
    fn test_missing_nct_id() {
        let cleaner = RecordCleaner::default();
        let mut raw = readme_raw();
        raw.nct_id = None;
        assert_eq!(
            cleaner.clean(&raw),
            Err(CleanError::MalformedRecord { field: "nct_id" })
        );
        raw.nct_id = Some("   ".into());
        assert!(cleaner.clean(&raw).is_err());
    }

    #[test]
    fn test_nct_id_trimmed_not_recased() {
        let mut raw = readme_raw();
        raw.nct_id = Some("  nct00000102 ".into());
        assert_eq!(RecordCleaner::default().clean(&raw).unwrap().nct_id, "nct00000102");
    }

    #[test]
    fn test_conditions_deduplicated_case_insensitively() {
        let raw = RawStudy {
            nct_id: Some("NCT1".into()),
            conditions: vec![
                Some("Alzheimer Disease".into()),
                Some("alzheimer disease".into()),
                None,
                Some("  ".into()),
                Some("Dementia".into()),
                Some("ALZHEIMER DISEASE".into()),
            ],
            ..Default::default()
        };
        let clean = RecordCleaner::default().clean(&raw).unwrap();
        let names: Vec<_> = clean.conditions.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Alzheimer Disease", "Dementia"]);
    }

    #[test]
    fn test_drugs_keep_placebo_and_skip_nameless() {
        let raw = RawStudy {
            nct_id: Some("NCT1".into()),
            drugs: vec![
                RawDrug {
                    name: Some("aspirin".into()),
                    description: Some("take one tablet orally".into()),
                },
                RawDrug {
                    name: Some("Placebo".into()),
                    description: None,
                },
                RawDrug {
                    name: None,
                    description: Some("oral tablet".into()),
                },
            ],
            ..Default::default()
        };
        let clean = RecordCleaner::default().clean(&raw).unwrap();

        assert_eq!(clean.drugs.len(), 2);
        assert_eq!(clean.drugs[0].name, "Aspirin");
        assert_eq!((clean.drugs[0].route.as_str(), clean.drugs[0].dosage_form.as_str()), ("Oral", "Tablet"));
        assert_eq!(clean.drugs[1].name, "Placebo");
        assert_eq!((clean.drugs[1].route.as_str(), clean.drugs[1].dosage_form.as_str()), (UNKNOWN, UNKNOWN));
    }

    #[test]
    fn test_sponsor_class_defaults_to_unknown() {
        let raw = RawStudy {
            nct_id: Some("NCT1".into()),
            sponsors: vec![
                RawSponsor {
                    name: Some(" national cancer institute ".into()),
                    class: None,
                },
                RawSponsor {
                    name: Some("".into()),
                    class: Some("OTHER".into()),
                },
            ],
            ..Default::default()
        };
        let clean = RecordCleaner::default().clean(&raw).unwrap();
        assert_eq!(
            clean.sponsors,
            vec![CanonicalSponsor {
                name: "National Cancer Institute".into(),
                class: UNKNOWN.into(),
            }]
        );
    }

    #[test]
    fn test_absent_scalars_become_empty() {
        let raw = RawStudy {
            nct_id: Some("NCT1".into()),
            ..Default::default()
        };
        let clean = RecordCleaner::default().clean(&raw).unwrap();
        assert_eq!(clean.title, "");
        assert_eq!(clean.phase, "");
        assert!(clean.drugs.is_empty());
    }

    #[test]
    fn test_clean_all_preserves_order() {
        let cleaner = RecordCleaner::default();
        let raws: Vec<RawStudy> = (0..64)
            .map(|i| RawStudy {
                nct_id: if i % 10 == 3 { None } else { Some(format!("NCT{:08}", i)) },
                ..Default::default()
            })
            .collect();

        let parallel = cleaner.clean_all(&raws, true);
        assert_eq!(parallel, cleaner.clean_all(&raws, false));
        assert_eq!(parallel.len(), 64);
        assert!(parallel[3].is_err());
        assert_eq!(parallel[5].as_ref().unwrap().nct_id, "NCT00000005");
    }
}
