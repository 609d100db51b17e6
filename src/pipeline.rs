//! One upload attempt: decode, validate, and commit only if every row passed.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

use crate::commit::BatchCommitter;
use crate::config::IngestConfig;
use crate::decode::decode_rows;
use crate::io::open_upload;
use crate::report::IngestionResult;
use crate::store::DocumentStore;
use crate::validate::{validate_rows, RowValidator, SchemaValidator};
use crate::IngestResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Decoding,
    Validating,
    Committing,
    Done,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    /// Legal moves of a single attempt. Nothing leaves a terminal stage.
    pub fn can_advance_to(self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, next),
            (Idle, Decoding)
                | (Decoding, Validating)
                | (Decoding, Failed)
                | (Validating, Committing)
                | (Validating, Failed)
                | (Committing, Done)
                | (Committing, Failed)
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Idle => "idle",
            Stage::Decoding => "decoding",
            Stage::Validating => "validating",
            Stage::Committing => "committing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(s)
    }
}

struct Attempt {
    stage: Stage,
}

impl Attempt {
    fn new() -> Self {
        Self { stage: Stage::Idle }
    }

    fn enter(&mut self, next: Stage) {
        debug_assert!(
            self.stage.can_advance_to(next),
            "illegal stage move {} -> {}",
            self.stage,
            next
        );
        debug!(from = %self.stage, to = %next, "ingest stage");
        self.stage = next;
    }

    fn finish(&mut self, result: IngestionResult) -> IngestionResult {
        self.enter(if result.success {
            Stage::Done
        } else {
            Stage::Failed
        });
        result
    }
}

/// Runs upload attempts against a store.
///
/// Attempts are independent: concurrent calls each produce their own batch
/// and nothing is deduplicated between them.
pub struct Ingestor<S: ?Sized, V = SchemaValidator> {
    committer: BatchCommitter<S>,
    validator: V,
    delimiter: u8,
}

impl<S: DocumentStore + ?Sized> Ingestor<S, SchemaValidator> {
    pub fn new(store: Arc<S>, config: &IngestConfig) -> IngestResult<Self> {
        Self::with_validator(store, config, SchemaValidator)
    }
}

impl<S: DocumentStore + ?Sized, V: RowValidator> Ingestor<S, V> {
    /// Fails only when the configured delimiter cannot be used as a byte.
    pub fn with_validator(
        store: Arc<S>,
        config: &IngestConfig,
        validator: V,
    ) -> IngestResult<Self> {
        Ok(Self {
            committer: BatchCommitter::new(store, config.collection.clone()),
            validator,
            delimiter: config.delimiter_byte()?,
        })
    }

    pub async fn ingest_str(&self, content: &str) -> IngestionResult {
        self.ingest_reader(content.as_bytes()).await
    }

    /// Runs one attempt over already-opened, UTF-8 content.
    pub async fn ingest_reader<R>(&self, reader: R) -> IngestionResult
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut attempt = Attempt::new();

        attempt.enter(Stage::Decoding);
        let decoded = match decode_rows(reader, self.delimiter).await {
            Ok(d) => d,
            Err(errors) => {
                warn!(errors = errors.len(), "upload rejected: malformed rows");
                return attempt.finish(IngestionResult::parse_failed(errors));
            }
        };
        info!(
            rows = decoded.rows.len(),
            columns = decoded.headers.len(),
            digest = %format!("{:08x}", decoded.digest),
            "upload decoded"
        );

        attempt.enter(Stage::Validating);
        let (valid, errors) = validate_rows(&self.validator, &decoded.rows);
        if !errors.is_empty() {
            warn!(
                invalid = errors.len(),
                valid = valid.len(),
                "upload rejected: validation errors"
            );
            return attempt.finish(IngestionResult::validation_failed(errors));
        }
        if valid.is_empty() {
            info!("upload contained no offering rows");
            return attempt.finish(IngestionResult::no_records());
        }

        attempt.enter(Stage::Committing);
        let result = match self.committer.commit(&valid).await {
            Ok(records) => IngestionResult::added(records.len()),
            Err(e) => IngestionResult::commit_failed(&e.to_string()),
        };
        attempt.finish(result)
    }

    /// Opens a local file through intake and runs an attempt on it.
    /// Intake refusals (extension, size, unreadable) come back as `Err`.
    pub async fn ingest_path(
        &self,
        path: &Path,
        config: &IngestConfig,
    ) -> IngestResult<IngestionResult> {
        let (reader, meta) = open_upload(path, config).await?;
        info!(
            upload = %meta.name_hint,
            collection = %self.committer.collection(),
            "ingesting upload"
        );
        Ok(self.ingest_reader(reader).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::IngestError;

    #[test]
    fn stage_graph() {
        assert!(Stage::Idle.can_advance_to(Stage::Decoding));
        assert!(Stage::Validating.can_advance_to(Stage::Failed));
        assert!(!Stage::Idle.can_advance_to(Stage::Committing));
        assert!(!Stage::Decoding.can_advance_to(Stage::Committing));
        for s in [Stage::Done, Stage::Failed] {
            assert!(s.is_terminal());
            assert!(!s.can_advance_to(Stage::Idle));
        }
    }

    #[test]
    fn unusable_delimiter_is_refused_up_front() {
        let config = IngestConfig {
            delimiter: 'é',
            ..Default::default()
        };
        let built = Ingestor::new(Arc::new(MemoryStore::new()), &config);
        assert!(matches!(built, Err(IngestError::Config { .. })));
    }
}
