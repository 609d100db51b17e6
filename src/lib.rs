//! Bulk offering ingestion.
//!
//! An uploaded CSV of donation records goes through a strictly linear
//! pipeline: intake, decode, validate, then one atomic batch commit.
//! Any decode or validation error rejects the whole file; nothing is
//! written unless every row passed.
//!
//! Data shape:
//! - CSV header `name,email,amount,date,type` (any column order)
//! - Result: [`IngestionResult`] `{ success, message, addedCount, errors? }`
//! - Store: anything implementing [`DocumentStore`]
#![cfg_attr(docsrs, feature(doc_cfg))]
//
mod codec;
mod commit;
pub mod config;
mod decode;
mod file_store;
mod io;
mod offerings;
mod pipeline;
mod record;
mod report;
pub mod store;
mod validate;

pub use crate::commit::BatchCommitter;
pub use crate::config::IngestConfig;
pub use crate::decode::{decode_rows, ColumnMap, DecodedFile};
pub use crate::file_store::FileStore;
pub use crate::io::{
    build_upload_reader, classify_upload, open_upload, Compression, UploadMeta,
};
pub use crate::offerings::{OfferingBook, OfferingTotals, RecordError};
pub use crate::pipeline::{Ingestor, Stage};
pub use crate::record::{
    Field, NewOffering, OfferingRecord, OfferingType, RawRow, RowError,
};
pub use crate::report::IngestionResult;
pub use crate::store::{Document, DocumentStore, MemoryStore, OrderBy, StoreError};
pub use crate::validate::{validate_rows, RowValidator, SchemaValidator};

use thiserror::Error;

/// Errors raised outside the pipeline boundary (intake, config, store setup).
/// Failures inside an attempt are reported through [`IngestionResult`].
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Unsupported file type: '{0}'. Please upload a CSV file.")]
    UnsupportedFile(String),
    #[error("Upload is {size} bytes, over the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },
    #[error("Invalid configuration for '{field}': {message}")]
    Config { field: String, message: String },
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;
