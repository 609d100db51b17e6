use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::store::{
    check_collection, new_document_id, Document, DocumentStore, MonotonicClock, OrderBy,
    StoreResult,
};

/// Durable store: one JSON array per collection at `<root>/<collection>.json`.
///
/// Writes go to `<collection>.json.tmp` and are renamed over the live file,
/// so a batch is either fully on disk or the previous file is untouched.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    clock: MonotonicClock,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            clock: MonotonicClock::new(),
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{collection}.json"))
    }

    async fn load(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let path = self.collection_path(collection);
        let bytes = match fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let docs: Vec<Document> = serde_json::from_slice(&bytes)?;
        if let Some(latest) = docs.iter().map(|d| d.created_at).max() {
            self.clock.observe(latest);
        }
        Ok(docs)
    }

    async fn replace(&self, collection: &str, docs: &[Document]) -> StoreResult<()> {
        let path = self.collection_path(collection);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(docs)?;

        let mut file = fs::File::create(&tmp).await?;
        if let Err(e) = async {
            file.write_all(&body).await?;
            file.sync_all().await
        }
        .await
        {
            warn!(path = %tmp.display(), error = %e, "discarding partial collection write");
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        drop(file);
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn put(&self, collection: &str, fields: Value) -> StoreResult<Document> {
        let mut docs = self.batch_put(collection, vec![fields]).await?;
        docs.pop().ok_or_else(|| {
            crate::store::StoreError::Unavailable("empty write result".into())
        })
    }

    async fn batch_put(&self, collection: &str, docs: Vec<Value>) -> StoreResult<Vec<Document>> {
        check_collection(collection)?;
        let _guard = self.write_lock.lock().await;

        let mut existing = self.load(collection).await?;
        let written: Vec<Document> = docs
            .into_iter()
            .map(|fields| Document {
                id: new_document_id(),
                created_at: self.clock.next(),
                fields,
            })
            .collect();
        existing.extend(written.iter().cloned());
        self.replace(collection, &existing).await?;

        debug!(
            collection,
            written = written.len(),
            total = existing.len(),
            "file store batch committed"
        );
        Ok(written)
    }

    async fn query(&self, collection: &str, order_by: &OrderBy) -> StoreResult<Vec<Document>> {
        check_collection(collection)?;
        let mut docs = self.load(collection).await?;
        order_by.sort(&mut docs);
        Ok(docs)
    }
}
