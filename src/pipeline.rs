//! Extract -> clean -> load orchestration
//!
//! Raw records are read in chunks of `batch_size`, cleaned (optionally in
//! parallel), and regrouped into load batches of exactly `batch_size`
//! canonical records; only the last batch may be shorter. Batches are
//! committed strictly one after another.

use crate::config::{MalformedPolicy, PipelineConfig};
use crate::loader::{GraphBackend, GraphLoader, LoadError, SchemaReport};
use crate::model::{CanonicalStudy, RawStudy};
use crate::source::{RecordSource, SourceError};
use crate::stats::DescriptionCoverage;
use crate::transform::{CleanError, RecordCleaner};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Source error: {0}")]
    Source(#[source] SourceError),

    #[error("Malformed record #{record}: {source}")]
    Malformed {
        record: usize,
        #[source]
        source: CleanError,
    },

    #[error("Unreadable record #{record}: {source}")]
    Unreadable {
        record: usize,
        #[source]
        source: SourceError,
    },

    #[error(transparent)]
    Load(#[from] LoadError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Totals of one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub records_read: usize,
    pub records_cleaned: usize,
    pub records_skipped: usize,
    pub records_loaded: usize,
    pub batches: usize,
    pub nodes_created: usize,
    pub edges_created: usize,
    pub properties_set: usize,
    pub descriptions: DescriptionCoverage,
    pub schema: Option<SchemaReport>,
}

pub struct Pipeline<B: GraphBackend> {
    config: PipelineConfig,
    cleaner: RecordCleaner,
    loader: GraphLoader<B>,
}

impl<B: GraphBackend> Pipeline<B> {
    pub fn new(config: PipelineConfig, cleaner: RecordCleaner, backend: B) -> Self {
        Self {
            config,
            cleaner,
            loader: GraphLoader::new(backend),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn loader(&self) -> &GraphLoader<B> {
        &self.loader
    }

    /// Bootstrap the schema, then clean and load every record of `source`.
    ///
    /// A failing batch ends the run; batches before it stay committed.
    pub async fn run<S: RecordSource>(&self, source: S) -> PipelineResult<RunSummary> {
        let mut summary = RunSummary {
            schema: Some(self.loader.bootstrap_schema().await?),
            ..Default::default()
        };

        let batch_size = self.config.batch_size.max(1);
        let mut pending: Vec<CanonicalStudy> = Vec::with_capacity(batch_size);
        let mut chunks = Chunks::new(source, self.config.limit, batch_size);

        while let Some(chunk) = chunks.next_chunk() {
            pending.extend(self.clean_chunk(chunk, &mut summary)?);
            while pending.len() >= batch_size {
                let batch: Vec<CanonicalStudy> = pending.drain(..batch_size).collect();
                self.load(&batch, &mut summary).await?;
            }
        }
        if !pending.is_empty() {
            self.load(&pending, &mut summary).await?;
        }

        info!(
            "Run complete: {} read, {} loaded, {} skipped in {} batches",
            summary.records_read, summary.records_loaded, summary.records_skipped, summary.batches
        );
        Ok(summary)
    }

    /// Clean without loading; nothing touches the graph.
    pub fn dry_run<S: RecordSource>(&self, source: S) -> PipelineResult<(Vec<CanonicalStudy>, RunSummary)> {
        let mut summary = RunSummary::default();
        let mut cleaned = Vec::new();
        let mut chunks = Chunks::new(source, self.config.limit, self.config.batch_size.max(1));

        while let Some(chunk) = chunks.next_chunk() {
            cleaned.extend(self.clean_chunk(chunk, &mut summary)?);
        }
        Ok((cleaned, summary))
    }

    pub async fn close(&self) -> PipelineResult<()> {
        Ok(self.loader.close().await?)
    }

    async fn load(&self, batch: &[CanonicalStudy], summary: &mut RunSummary) -> PipelineResult<()> {
        let result = self.loader.load_batch(summary.batches, batch).await?;
        summary.batches += 1;
        summary.records_loaded += result.records;
        summary.nodes_created += result.nodes_created;
        summary.edges_created += result.edges_created;
        summary.properties_set += result.properties_set;
        info!(
            "Committed batch {} ({} records, {} nodes / {} edges created); {} records loaded so far",
            result.batch_index, result.records, result.nodes_created, result.edges_created,
            summary.records_loaded
        );
        Ok(())
    }

    fn clean_chunk(&self, chunk: Chunk, summary: &mut RunSummary) -> PipelineResult<Vec<CanonicalStudy>> {
        let Chunk { first_record, items } = chunk;
        summary.records_read += items.len();

        let mut raws: Vec<(usize, RawStudy)> = Vec::with_capacity(items.len());
        for (offset, item) in items.into_iter().enumerate() {
            let record = first_record + offset;
            match item {
                Ok(raw) => raws.push((record, raw)),
                Err(SourceError::Io(e)) => return Err(PipelineError::Source(SourceError::Io(e))),
                Err(source) => self.reject(summary, PipelineError::Unreadable { record, source })?,
            }
        }

        let (positions, raws): (Vec<usize>, Vec<RawStudy>) = raws.into_iter().unzip();
        let results = self.cleaner.clean_all(&raws, self.config.parallel_clean);

        let mut cleaned = Vec::with_capacity(results.len());
        for ((record, raw), result) in positions.into_iter().zip(&raws).zip(results) {
            match result {
                Ok(study) => {
                    summary.descriptions.add_study(raw, &study);
                    cleaned.push(study);
                }
                Err(source) => self.reject(summary, PipelineError::Malformed { record, source })?,
            }
        }
        summary.records_cleaned += cleaned.len();
        debug!("Cleaned {} of {} records", cleaned.len(), summary.records_read);
        Ok(cleaned)
    }

    fn reject(&self, summary: &mut RunSummary, error: PipelineError) -> PipelineResult<()> {
        match self.config.on_malformed {
            MalformedPolicy::Abort => Err(error),
            MalformedPolicy::Skip => {
                warn!("Skipping record: {}", error);
                summary.records_skipped += 1;
                Ok(())
            }
        }
    }
}

struct Chunk {
    /// 1-based position of the first item in the source
    first_record: usize,
    items: Vec<Result<RawStudy, SourceError>>,
}

/// Splits a source into chunks of `size`, honouring `limit`
struct Chunks<S> {
    source: S,
    remaining: usize,
    size: usize,
    next_record: usize,
}

impl<S: RecordSource> Chunks<S> {
    fn new(source: S, limit: Option<usize>, size: usize) -> Self {
        Self {
            source,
            remaining: limit.unwrap_or(usize::MAX),
            size,
            next_record: 1,
        }
    }

    fn next_chunk(&mut self) -> Option<Chunk> {
        let want = self.size.min(self.remaining);
        let items: Vec<_> = self.source.by_ref().take(want).collect();
        if items.is_empty() {
            return None;
        }
        let chunk = Chunk {
            first_record: self.next_record,
            items,
        };
        self.remaining -= chunk.items.len();
        self.next_record += chunk.items.len();
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::EmbeddedBackend;
    use crate::source::SourceResult;

    fn raw(nct_id: Option<&str>) -> SourceResult<RawStudy> {
        Ok(RawStudy {
            nct_id: nct_id.map(str::to_string),
            ..Default::default()
        })
    }

    fn pipeline(config: PipelineConfig) -> Pipeline<EmbeddedBackend> {
        Pipeline::new(config, RecordCleaner::default(), EmbeddedBackend::in_memory())
    }

    fn ids(n: usize) -> Vec<SourceResult<RawStudy>> {
        (0..n).map(|i| raw(Some(&format!("NCT{:08}", i)))).collect()
    }

    #[tokio::test]
    async fn test_batches_honour_size_and_limit() {
        let p = pipeline(PipelineConfig {
            batch_size: 3,
            limit: Some(8),
            ..Default::default()
        });
        let summary = p.run(ids(20).into_iter()).await.unwrap();

        assert_eq!(summary.records_read, 8);
        assert_eq!(summary.records_cleaned, 8);
        assert_eq!(summary.batches, 3);
        assert_eq!(summary.records_loaded, 8);
        assert_eq!(summary.nodes_created, 8);
        assert_eq!(p.loader().backend().store().read().await.node_count(), 8);
    }

    #[tokio::test]
    async fn test_skip_policy_counts_malformed() {
        let p = pipeline(PipelineConfig {
            batch_size: 2,
            ..Default::default()
        });
        let source = vec![raw(Some("A")), raw(None), raw(Some("  ")), raw(Some("B"))];
        let summary = p.run(source.into_iter()).await.unwrap();

        assert_eq!(summary.records_read, 4);
        assert_eq!(summary.records_skipped, 2);
        assert_eq!(summary.records_cleaned, 2);
        assert_eq!(summary.batches, 1);
    }

    #[tokio::test]
    async fn test_abort_policy_fails_run() {
        let p = pipeline(PipelineConfig {
            batch_size: 2,
            on_malformed: MalformedPolicy::Abort,
            ..Default::default()
        });
        let source = vec![raw(Some("A")), raw(Some("B")), raw(None)];
        let err = p.run(source.into_iter()).await.unwrap_err();

        assert!(matches!(err, PipelineError::Malformed { record: 3, .. }));
        // The first full batch was already committed
        assert_eq!(p.loader().backend().store().read().await.node_count(), 2);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let p = pipeline(PipelineConfig {
            batch_size: 4,
            ..Default::default()
        });
        let first = p.run(ids(10).into_iter()).await.unwrap();
        let second = p.run(ids(10).into_iter()).await.unwrap();

        assert_eq!(first.nodes_created, 10);
        assert_eq!(second.nodes_created, 0);
        assert_eq!(second.schema, Some(SchemaReport { created: 0, existing: 6 }));
    }

    #[tokio::test]
    async fn test_description_coverage_spans_chunks() {
        let p = pipeline(PipelineConfig {
            batch_size: 1,
            ..Default::default()
        });
        let study = |id: Option<&str>, description: Option<&str>| -> SourceResult<RawStudy> {
            Ok(RawStudy {
                nct_id: id.map(str::to_string),
                drugs: vec![crate::model::RawDrug {
                    name: Some("Aspirin".into()),
                    description: description.map(str::to_string),
                }],
                ..Default::default()
            })
        };
        let source = vec![
            study(Some("A"), Some("oral tablet")),
            study(Some("B"), None),
            study(None, Some("oral tablet")),
            study(Some("C"), Some("")),
        ];
        let summary = p.run(source.into_iter()).await.unwrap();

        let d = summary.descriptions;
        assert_eq!((d.total, d.null_description, d.blank_description, d.with_description), (3, 1, 1, 1));
        assert_eq!(d.both_inferred, 1);
    }

    #[test]
    fn test_dry_run_does_not_load() {
        let p = pipeline(PipelineConfig {
            parallel_clean: false,
            ..Default::default()
        });
        let (cleaned, summary) = p.dry_run(vec![raw(Some(" NCT1 ")), raw(None)].into_iter()).unwrap();

        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].nct_id, "NCT1");
        assert_eq!(summary.records_skipped, 1);
        assert_eq!(summary.batches, 0);
        assert!(summary.schema.is_none());
    }
}
